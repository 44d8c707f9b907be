//! Service name / website → candidate logo domain.

/// Well-known brands whose normalized name does not guess cleanly to
/// `<name>.com`.
const BRAND_DICTIONARY: &[(&str, &str)] = &[
    ("google", "google.com"),
    ("github", "github.com"),
    ("amazon", "amazon.com"),
    ("apple", "apple.com"),
    ("facebook", "facebook.com"),
    ("meta", "facebook.com"),
    ("linkedin", "linkedin.com"),
    ("twitter", "twitter.com"),
    ("x", "twitter.com"),
    ("netflix", "netflix.com"),
    ("spotify", "spotify.com"),
    ("slack", "slack.com"),
    ("discord", "discord.com"),
    ("dropbox", "dropbox.com"),
    ("microsoft", "microsoft.com"),
    ("outlook", "outlook.com"),
    ("gmail", "google.com"),
    ("adobe", "adobe.com"),
    ("figma", "figma.com"),
    ("notion", "notion.so"),
    ("zoom", "zoom.us"),
    ("reddit", "reddit.com"),
    ("paypal", "paypal.com"),
    ("stripe", "stripe.com"),
    ("binance", "binance.com"),
    ("coinbase", "coinbase.com"),
    ("openai", "openai.com"),
    ("whatsapp", "whatsapp.com"),
    ("telegram", "telegram.org"),
    ("signal", "signal.org"),
];

/// Pick the domain to fetch a logo for. An explicit website wins; then
/// the brand dictionary; then a plain `<normalized-name>.com` guess.
/// Returns `None` only when the name normalizes to nothing.
pub fn resolve_domain(service_name: &str, website: Option<&str>) -> Option<String> {
    if let Some(host) = website.and_then(extract_host) {
        return Some(host);
    }

    let clean = normalize(service_name);
    if clean.is_empty() {
        return None;
    }
    if let Some((_, domain)) = BRAND_DICTIONARY.iter().find(|(name, _)| *name == clean) {
        return Some((*domain).to_owned());
    }
    Some(format!("{clean}.com"))
}

/// Lowercase alphanumerics only: "My  Bank!" → "mybank".
fn normalize(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Host part of a URL-ish string: scheme, `www.` prefix, port and path
/// are all stripped. Tolerates bare hostnames.
fn extract_host(url: &str) -> Option<String> {
    let trimmed = url.trim();
    if trimmed.is_empty() {
        return None;
    }
    let after_scheme = match trimmed.split_once("://") {
        Some((_, rest)) => rest,
        None => trimmed,
    };
    let host = after_scheme
        .split(['/', '?', '#'])
        .next()
        .unwrap_or_default()
        .split('@')
        .last()
        .unwrap_or_default()
        .split(':')
        .next()
        .unwrap_or_default()
        .trim()
        .to_lowercase();
    if host.is_empty() {
        return None;
    }
    Some(host.strip_prefix("www.").unwrap_or(&host).to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn website_beats_dictionary_and_guess() {
        assert_eq!(
            resolve_domain("Google", Some("https://accounts.example.org/login")),
            Some("accounts.example.org".into())
        );
    }

    #[test]
    fn host_extraction_strips_scheme_www_port_and_path() {
        assert_eq!(extract_host("https://www.example.com:8443/a?b#c"), Some("example.com".into()));
        assert_eq!(extract_host("Example.COM/login"), Some("example.com".into()));
        assert_eq!(extract_host("   "), None);
    }

    #[test]
    fn dictionary_covers_non_com_brands() {
        assert_eq!(resolve_domain("Notion", None), Some("notion.so".into()));
        assert_eq!(resolve_domain("Zoom", None), Some("zoom.us".into()));
        assert_eq!(resolve_domain("Gmail", None), Some("google.com".into()));
    }

    #[test]
    fn fallback_guesses_normalized_dot_com() {
        assert_eq!(resolve_domain("My  Bank!", None), Some("mybank.com".into()));
        assert_eq!(resolve_domain("!!!", None), None);
    }
}

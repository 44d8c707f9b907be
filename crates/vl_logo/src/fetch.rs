//! Network side of logo resolution: source list, validation, download.

use std::time::Duration;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";
const ACCEPT: &str = "image/avif,image/webp,image/apng,image/svg+xml,image/*,*/*;q=0.8";

/// Per-source request timeout.
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(4);

/// Anything smaller is a tracking pixel or an error body, not a logo.
const MIN_LOGO_BYTES: usize = 500;

/// Logo providers in priority order; the first validated response wins.
pub fn source_urls(domain: &str) -> [String; 3] {
    [
        format!("https://logo.clearbit.com/{domain}?size=128"),
        format!("https://www.google.com/s2/favicons?sz=128&domain={domain}"),
        format!("https://icons.duckduckgo.com/ip3/{domain}.ico"),
    ]
}

pub fn build_client() -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder().timeout(FETCH_TIMEOUT).build()
}

/// Try each source in order; return the first response body that passes
/// validation. `None` means every source failed — the caller records the
/// domain as dead.
pub async fn fetch_logo(client: &reqwest::Client, domain: &str) -> Option<Vec<u8>> {
    for url in source_urls(domain) {
        let response = match client
            .get(&url)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .header(reqwest::header::ACCEPT, ACCEPT)
            .send()
            .await
        {
            Ok(r) => r,
            Err(err) => {
                tracing::debug!(%url, %err, "logo source unreachable");
                continue;
            }
        };
        if response.status() != reqwest::StatusCode::OK {
            continue;
        }
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_lowercase();
        let body = match response.bytes().await {
            Ok(b) => b.to_vec(),
            Err(_) => continue,
        };
        if validate(&content_type, &body) {
            tracing::debug!(domain, %url, bytes = body.len(), "logo fetched");
            return Some(body);
        }
    }
    None
}

/// Reject error pages and tracking pixels: a real logo is over
/// [`MIN_LOGO_BYTES`], declares an image content type, and starts with
/// the magic bytes of a known image format.
pub fn validate(content_type: &str, body: &[u8]) -> bool {
    if body.len() < MIN_LOGO_BYTES {
        return false;
    }
    if !content_type.contains("image") && !content_type.contains("application/octet-stream") {
        return false;
    }
    has_image_magic(body)
}

/// PNG, JPEG, ICO, WEBP or SVG signature within the first bytes.
fn has_image_magic(body: &[u8]) -> bool {
    let head = &body[..body.len().min(12)];
    let lowered: Vec<u8> = head.iter().map(|b| b.to_ascii_lowercase()).collect();
    head.starts_with(b"\x89PNG")
        || head.starts_with(b"\xff\xd8\xff")
        || head.starts_with(b"\x00\x00\x01\x00")
        || contains(&lowered, b"webp")
        || contains(&lowered, b"<svg")
        || contains(&lowered, b"<?xml")
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

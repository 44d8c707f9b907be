//! Cache orchestration: memory map, disk cache, negative cache, and
//! de-duplicated background fetches.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use crate::{domain, fetch};

#[derive(Debug, thiserror::Error)]
pub enum LogoError {
    #[error("cache directory: {0}")]
    Io(#[from] std::io::Error),
    #[error("http client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Emitted by background fetch tasks. `Ready` carries the service name
/// the lookup was keyed on, so a UI can refresh the right row.
#[derive(Debug, Clone)]
pub enum LogoEvent {
    Ready {
        service_name: String,
        domain: String,
        path: PathBuf,
    },
    Failed {
        domain: String,
    },
}

struct CacheState {
    /// Domain → cached file, for hits already proven this process.
    resolved: HashMap<String, PathBuf>,
    /// Domains every source failed for. Never retried this process.
    failed: HashSet<String>,
    /// In-flight fetches, to collapse duplicate lookups.
    pending: HashSet<String>,
}

/// Clone-cheap handle; all clones share one state and one event channel.
#[derive(Clone)]
pub struct LogoCache {
    state: Arc<Mutex<CacheState>>,
    cache_dir: PathBuf,
    client: reqwest::Client,
    events: mpsc::UnboundedSender<LogoEvent>,
}

impl LogoCache {
    /// Open a cache rooted at `cache_dir` (created if missing). The
    /// receiver yields one event per completed background fetch.
    pub fn open(
        cache_dir: impl Into<PathBuf>,
    ) -> Result<(Self, mpsc::UnboundedReceiver<LogoEvent>), LogoError> {
        let cache_dir = cache_dir.into();
        std::fs::create_dir_all(&cache_dir)?;
        let (tx, rx) = mpsc::unbounded_channel();
        let cache = Self {
            state: Arc::new(Mutex::new(CacheState {
                resolved: HashMap::new(),
                failed: HashSet::new(),
                pending: HashSet::new(),
            })),
            cache_dir,
            client: fetch::build_client()?,
            events: tx,
        };
        Ok((cache, rx))
    }

    /// Resolve a logo from local state only. `Some` is an immediate hit;
    /// `None` means "show initials" — and, unless the domain is already
    /// known-dead or being fetched, a background fetch has been started
    /// whose outcome arrives on the event channel.
    ///
    /// Must be called from within a tokio runtime (fetches are spawned).
    pub fn resolve(&self, service_name: &str, website: Option<&str>) -> Option<PathBuf> {
        let domain = domain::resolve_domain(service_name, website)?;

        {
            let mut state = self.state.lock().expect("logo cache poisoned");
            if let Some(path) = state.resolved.get(&domain) {
                return Some(path.clone());
            }
            if state.failed.contains(&domain) {
                return None;
            }

            let path = self.cache_path(&domain);
            match disk_entry(&path) {
                DiskEntry::Valid => {
                    state.resolved.insert(domain, path.clone());
                    return Some(path);
                }
                DiskEntry::Corrupt => {
                    // Truncated by a crash mid-write; refetch.
                    let _ = std::fs::remove_file(&path);
                }
                DiskEntry::Missing => {}
            }

            if !state.pending.insert(domain.clone()) {
                return None;
            }
        }

        self.spawn_fetch(domain, service_name.to_owned());
        None
    }

    /// Content-addressed location for a domain's logo.
    pub fn cache_path(&self, domain: &str) -> PathBuf {
        let digest = blake3::hash(domain.as_bytes());
        self.cache_dir.join(format!("{}.png", hex::encode(digest.as_bytes())))
    }

    fn spawn_fetch(&self, domain: String, service_name: String) {
        let cache = self.clone();
        tokio::spawn(async move {
            let outcome = cache.fetch_and_store(&domain).await;

            let mut state = cache.state.lock().expect("logo cache poisoned");
            state.pending.remove(&domain);
            let event = match outcome {
                Some(path) => {
                    state.resolved.insert(domain.clone(), path.clone());
                    LogoEvent::Ready { service_name, domain, path }
                }
                None => {
                    state.failed.insert(domain.clone());
                    tracing::debug!(%domain, "logo fetch failed on all sources");
                    LogoEvent::Failed { domain }
                }
            };
            drop(state);
            // Receiver gone means nobody is listening; fine either way.
            let _ = cache.events.send(event);
        });
    }

    /// Download, then write atomically: temp file in the same directory,
    /// rename over the final path.
    async fn fetch_and_store(&self, domain: &str) -> Option<PathBuf> {
        let body = fetch::fetch_logo(&self.client, domain).await?;
        let path = self.cache_path(domain);
        let tmp = path.with_extension("png.tmp");
        if tokio::fs::write(&tmp, &body).await.is_err() {
            return None;
        }
        match tokio::fs::rename(&tmp, &path).await {
            Ok(()) => Some(path),
            Err(_) => {
                let _ = tokio::fs::remove_file(&tmp).await;
                None
            }
        }
    }
}

enum DiskEntry {
    Valid,
    Corrupt,
    Missing,
}

/// A cached file under the minimum logo size is a crash artifact.
fn disk_entry(path: &Path) -> DiskEntry {
    match std::fs::metadata(path) {
        Ok(meta) if meta.len() > 500 => DiskEntry::Valid,
        Ok(_) => DiskEntry::Corrupt,
        Err(_) => DiskEntry::Missing,
    }
}

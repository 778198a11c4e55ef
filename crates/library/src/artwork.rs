use std::collections::HashMap;
use std::sync::Arc;

use common::content_id;
use parking_lot::Mutex;
use tracing::debug;

const URL_SCHEME: &str = "artwork://";
const DEFAULT_MIME: &str = "application/octet-stream";

#[derive(Debug, Clone, PartialEq)]
pub struct Artwork {
    pub data: Vec<u8>,
    pub mime: String,
}

/// Issues opaque `artwork://` URLs for in-memory images.
///
/// Every URL handed out by [`ArtworkPool::create`] stays resolvable until it is
/// revoked, and revoking succeeds exactly once.
#[derive(Clone, Default)]
pub struct ArtworkPool {
    inner: Arc<Mutex<PoolState>>,
}

#[derive(Default)]
struct PoolState {
    next: u64,
    live: HashMap<String, Arc<Artwork>>,
}

impl ArtworkPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self, data: Vec<u8>, mime: Option<String>) -> String {
        let digest = content_id(&data);
        let mut state = self.inner.lock();
        state.next += 1;
        let url = format!("{}{}/{}", URL_SCHEME, state.next, &digest[..16]);
        let artwork = Artwork {
            data,
            mime: mime.unwrap_or_else(|| DEFAULT_MIME.to_string()),
        };
        state.live.insert(url.clone(), Arc::new(artwork));
        url
    }

    pub fn get(&self, url: &str) -> Option<Arc<Artwork>> {
        self.inner.lock().live.get(url).cloned()
    }

    pub fn revoke(&self, url: &str) -> bool {
        let removed = self.inner.lock().live.remove(url).is_some();
        if !removed {
            debug!("Artwork URL {} was already revoked", url);
        }
        removed
    }

    pub fn revoke_all(&self) -> usize {
        let mut state = self.inner.lock();
        let count = state.live.len();
        state.live.clear();
        count
    }

    pub fn live_count(&self) -> usize {
        self.inner.lock().live.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_are_unique_even_for_identical_bytes() {
        let pool = ArtworkPool::new();
        let first = pool.create(vec![1, 2, 3], Some("image/png".to_string()));
        let second = pool.create(vec![1, 2, 3], None);
        assert_ne!(first, second);
        assert!(first.starts_with(URL_SCHEME));
        assert_eq!(pool.get(&first).unwrap().mime, "image/png");
        assert_eq!(pool.get(&second).unwrap().mime, DEFAULT_MIME);
        assert_eq!(pool.live_count(), 2);
    }

    #[test]
    fn revoke_succeeds_exactly_once() {
        let pool = ArtworkPool::new();
        let url = pool.create(vec![9], None);
        assert!(pool.revoke(&url));
        assert!(!pool.revoke(&url));
        assert!(pool.get(&url).is_none());
        assert_eq!(pool.live_count(), 0);
    }

    #[test]
    fn clones_share_the_pool() {
        let pool = ArtworkPool::new();
        let other = pool.clone();
        let url = pool.create(vec![4, 5], None);
        assert!(other.get(&url).is_some());
        assert_eq!(other.revoke_all(), 1);
        assert!(pool.get(&url).is_none());
    }
}

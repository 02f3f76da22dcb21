//! Session registry with keyed per-session locks
//!
//! Each session sits behind its own `tokio::sync::Mutex`; the map itself is
//! a sharded `DashMap`, so runs on different sessions never contend.

use super::session::{ConversationSession, DEFAULT_MAX_TURNS};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

pub const DEFAULT_MAX_SESSIONS: usize = 1000;
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 30 * 60;

pub type SessionHandle = Arc<Mutex<ConversationSession>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionStoreConfig {
    pub max_turns: usize,
    pub max_sessions: usize,
    pub idle_timeout: Duration,
}

impl Default for SessionStoreConfig {
    fn default() -> Self {
        Self {
            max_turns: DEFAULT_MAX_TURNS,
            max_sessions: DEFAULT_MAX_SESSIONS,
            idle_timeout: Duration::from_secs(DEFAULT_IDLE_TIMEOUT_SECS),
        }
    }
}

#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: DashMap<String, SessionHandle>,
    config: SessionStoreConfig,
}

impl SessionStore {
    pub fn new(config: SessionStoreConfig) -> Self {
        Self {
            sessions: DashMap::new(),
            config,
        }
    }

    pub fn config(&self) -> &SessionStoreConfig {
        &self.config
    }

    /// Returns the session for `id`, creating it when absent or unknown.
    /// A missing or blank id gets a fresh UUID v4.
    pub fn resolve(&self, id: Option<&str>) -> (String, SessionHandle) {
        let id = match id.map(str::trim) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => Uuid::new_v4().to_string(),
        };

        if let Some(handle) = self.get(&id) {
            return (id, handle);
        }

        if self.sessions.len() >= self.config.max_sessions {
            self.evict_least_recent();
        }

        let max_turns = self.config.max_turns;
        let handle = self
            .sessions
            .entry(id.clone())
            .or_insert_with(|| {
                debug!(session_id = %id, "Creating session");
                Arc::new(Mutex::new(ConversationSession::new(id.clone(), max_turns)))
            })
            .value()
            .clone();
        (id, handle)
    }

    pub fn get(&self, id: &str) -> Option<SessionHandle> {
        self.sessions.get(id).map(|entry| Arc::clone(entry.value()))
    }

    pub fn remove(&self, id: &str) -> bool {
        self.sessions.remove(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Drops sessions idle longer than the configured timeout. Sessions that
    /// a caller still holds a handle to are never evicted.
    pub fn evict_idle(&self) -> usize {
        let timeout = self.config.idle_timeout;
        let expired: Vec<String> = self
            .sessions
            .iter()
            .filter(|entry| idle_if_unclaimed(entry.value()).map_or(false, |idle| idle > timeout))
            .map(|entry| entry.key().clone())
            .collect();

        let mut evicted = 0;
        for id in expired {
            let removed = self.sessions.remove_if(&id, |_, handle| {
                idle_if_unclaimed(handle).map_or(false, |idle| idle > timeout)
            });
            if removed.is_some() {
                debug!(session_id = %id, "Evicted idle session");
                evicted += 1;
            }
        }
        evicted
    }

    fn evict_least_recent(&self) {
        let oldest = self
            .sessions
            .iter()
            .filter_map(|entry| Some((entry.key().clone(), idle_if_unclaimed(entry.value())?)))
            .max_by_key(|(_, idle)| *idle)
            .map(|(id, _)| id);

        let removed = oldest.and_then(|id| {
            self.sessions
                .remove_if(&id, |_, handle| idle_if_unclaimed(handle).is_some())
        });
        match removed {
            Some((id, _)) => debug!(session_id = %id, "Evicted least recently used session"),
            None => warn!(
                sessions = self.sessions.len(),
                "Session limit reached but every session is in use"
            ),
        }
    }
}

/// Idle time of a session nobody outside the store holds.
///
/// `resolve` hands out clones of the handle while the map shard is locked,
/// and removal re-checks under the shard's write lock, so a handle that has
/// been handed out cannot be evicted before its run records the turn.
fn idle_if_unclaimed(handle: &SessionHandle) -> Option<Duration> {
    if Arc::strong_count(handle) > 1 {
        return None;
    }
    handle.try_lock().ok().map(|session| session.idle_for())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(max_sessions: usize, idle_timeout: Duration) -> SessionStoreConfig {
        SessionStoreConfig {
            max_turns: 5,
            max_sessions,
            idle_timeout,
        }
    }

    #[test]
    fn test_resolve_creates_uuid_session() {
        let store = SessionStore::default();
        let (id, _) = store.resolve(None);
        assert!(Uuid::parse_str(&id).is_ok());
        assert_eq!(store.len(), 1);

        let (blank, _) = store.resolve(Some("  "));
        assert_ne!(blank, id);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_resolve_reuses_existing_session() {
        let store = SessionStore::default();
        let (id, first) = store.resolve(Some("abc"));
        let (again, second) = store.resolve(Some("abc"));
        assert_eq!(id, "abc");
        assert_eq!(again, "abc");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_capacity_evicts_least_recent() {
        let store = SessionStore::new(config(2, Duration::from_secs(60)));
        store.resolve(Some("a"));
        std::thread::sleep(Duration::from_millis(5));
        store.resolve(Some("b"));
        store.resolve(Some("c"));

        assert_eq!(store.len(), 2);
        assert!(store.get("a").is_none());
        assert!(store.get("b").is_some());
        assert!(store.get("c").is_some());
    }

    #[test]
    fn test_evict_idle() {
        let store = SessionStore::new(config(10, Duration::from_millis(1)));
        store.resolve(Some("old"));
        std::thread::sleep(Duration::from_millis(10));

        assert_eq!(store.evict_idle(), 1);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_busy_session_is_not_evicted() {
        let store = SessionStore::new(config(10, Duration::from_millis(1)));
        let (_, handle) = store.resolve(Some("busy"));
        let _guard = handle.lock().await;
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(store.evict_idle(), 0);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_handed_out_session_survives_eviction() {
        let store = SessionStore::new(config(1, Duration::from_millis(1)));
        let (_, handle) = store.resolve(Some("claimed"));
        std::thread::sleep(Duration::from_millis(10));

        assert_eq!(store.evict_idle(), 0);

        // At capacity, a new session may not displace the claimed one
        store.resolve(Some("newcomer"));
        assert!(store.get("claimed").is_some());
        assert!(Arc::ptr_eq(&store.get("claimed").unwrap(), &handle));

        drop(handle);
        std::thread::sleep(Duration::from_millis(10));
        assert_eq!(store.evict_idle(), 2);
    }

    #[test]
    fn test_remove() {
        let store = SessionStore::default();
        store.resolve(Some("x"));
        assert!(store.remove("x"));
        assert!(!store.remove("x"));
    }
}

//! Sessions.
//!
//! # Responsibilities
//! - In-memory engine session store, keyed by the session cookie
//! - One legacy `SessionRecord` per engine session, stored under a fixed key
//! - Lazy derived fields (id, creation time, ...) memoized in the record
//! - Engine-side eviction of sessions idle past the configured timeout
//!
//! # Design Decisions
//! - Each read or write takes the record lock for that call only; two
//!   requests on the same session may interleave between calls
//! - No persistence or replication; the legacy `max_inactive_interval` is
//!   informational and independent of engine eviction
//! - `invalidate` wipes the record and drops the engine session, so identity
//!   is regenerated on next read and the store does not grow
//! - `is_new` is never cleared by the bridge

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::time;
use uuid::Uuid;

/// Key under which the legacy record lives in the engine session.
pub const SESSION_RECORD_KEY: &str = "spark-session";

/// Default inactivity timeout reported when none was set, in seconds.
pub const DEFAULT_MAX_INACTIVE_INTERVAL: u32 = 1800;

/// Opaque attribute value held by an engine session.
pub type SessionValue = Arc<dyn Any + Send + Sync>;

/// One engine-side session: an id plus an untyped attribute map.
#[derive(Debug)]
pub struct ServerSession {
    id: String,
    attributes: Mutex<HashMap<String, SessionValue>>,
    last_access: Mutex<Instant>,
}

impl ServerSession {
    fn new(id: String) -> Self {
        Self {
            id,
            attributes: Mutex::new(HashMap::new()),
            last_access: Mutex::new(Instant::now()),
        }
    }

    fn touch(&self) {
        *self.last_access.lock().unwrap_or_else(PoisonError::into_inner) = Instant::now();
    }

    /// Time since the session was created or last looked up.
    pub fn idle_for(&self) -> Duration {
        self.last_access
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .elapsed()
    }

    /// Engine session id (the cookie value).
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn attribute(&self, key: &str) -> Option<SessionValue> {
        self.lock().get(key).cloned()
    }

    pub fn set_attribute(&self, key: impl Into<String>, value: SessionValue) {
        self.lock().insert(key.into(), value);
    }

    /// Return the attribute under `key`, inserting `init()` first if absent.
    pub fn attribute_or_insert_with(
        &self,
        key: &str,
        init: impl FnOnce() -> SessionValue,
    ) -> SessionValue {
        self.lock()
            .entry(key.to_string())
            .or_insert_with(init)
            .clone()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, SessionValue>> {
        self.attributes.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// The engine's session store.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: DashMap<String, Arc<ServerSession>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a session, refreshing its idle clock.
    pub fn get(&self, id: &str) -> Option<Arc<ServerSession>> {
        let session = self.sessions.get(id).map(|entry| Arc::clone(entry.value()))?;
        session.touch();
        Some(session)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.sessions.contains_key(id)
    }

    /// Create and store a fresh session.
    pub fn create(&self) -> Arc<ServerSession> {
        let session = Arc::new(ServerSession::new(Uuid::new_v4().simple().to_string()));
        self.sessions
            .insert(session.id.clone(), Arc::clone(&session));
        tracing::trace!(session_id = %session.id, "Engine session created");
        session
    }

    pub fn remove(&self, id: &str) -> Option<Arc<ServerSession>> {
        self.sessions.remove(id).map(|(_, session)| session)
    }

    /// Drop every session idle for at least `max_idle`. Returns how many went.
    pub fn evict_idle(&self, max_idle: Duration) -> usize {
        let before = self.sessions.len();
        self.sessions
            .retain(|_, session| session.idle_for() < max_idle);
        before.saturating_sub(self.sessions.len())
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

/// Legacy session state. Derived fields are `None` until first read.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionRecord {
    attributes: HashMap<String, Value>,
    creation_time: Option<i64>,
    session_id: Option<String>,
    last_accessed_time: Option<i64>,
    max_inactive_interval: Option<u32>,
    is_new: Option<bool>,
}

impl SessionRecord {
    fn resolve<T: Clone>(slot: &mut Option<T>, init: impl FnOnce() -> T) -> T {
        slot.get_or_insert_with(init).clone()
    }
}

/// Evict idle sessions from `store` every `every` until `shutdown` resolves.
pub(crate) async fn run_eviction(
    store: Arc<SessionStore>,
    max_idle: Duration,
    every: Duration,
    shutdown: impl Future<Output = ()>,
) {
    let mut ticker = time::interval(every);
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let evicted = store.evict_idle(max_idle);
                if evicted > 0 {
                    tracing::debug!(evicted, remaining = store.len(), "Evicted idle sessions");
                }
            }
            _ = &mut shutdown => break,
        }
    }
}

#[derive(Debug, Clone)]
struct EngineBinding {
    store: Arc<SessionStore>,
    id: String,
}

/// Legacy session view over a shared `SessionRecord`.
#[derive(Debug, Clone)]
pub struct Session {
    record: Arc<Mutex<SessionRecord>>,
    engine: Option<EngineBinding>,
}

impl Session {
    pub(crate) fn attach(store: &Arc<SessionStore>, engine_session: &ServerSession) -> Self {
        let value = engine_session.attribute_or_insert_with(SESSION_RECORD_KEY, || {
            Arc::new(Mutex::new(SessionRecord::default())) as SessionValue
        });
        let record = match value.downcast::<Mutex<SessionRecord>>() {
            Ok(record) => record,
            Err(_) => {
                // Something else owns the key; start over with our own record.
                tracing::warn!(key = SESSION_RECORD_KEY, "Replacing foreign session attribute");
                let record = Arc::new(Mutex::new(SessionRecord::default()));
                engine_session.set_attribute(SESSION_RECORD_KEY, record.clone());
                record
            }
        };
        Self {
            record,
            engine: Some(EngineBinding {
                store: Arc::clone(store),
                id: engine_session.id().to_string(),
            }),
        }
    }

    /// A session not bound to any engine store.
    pub fn detached() -> Self {
        Self {
            record: Arc::new(Mutex::new(SessionRecord::default())),
            engine: None,
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionRecord> {
        self.record.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn attribute(&self, name: &str) -> Option<Value> {
        self.lock().attributes.get(name).cloned()
    }

    /// Attribute deserialized into `T`; `None` when missing or of another shape.
    pub fn attribute_as<T: DeserializeOwned>(&self, name: &str) -> Option<T> {
        self.attribute(name)
            .and_then(|value| serde_json::from_value(value).ok())
    }

    pub fn set_attribute(&self, name: impl Into<String>, value: impl Into<Value>) {
        self.lock().attributes.insert(name.into(), value.into());
    }

    pub fn remove_attribute(&self, name: &str) {
        self.lock().attributes.remove(name);
    }

    /// Attribute names, sorted.
    pub fn attributes(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lock().attributes.keys().cloned().collect();
        names.sort();
        names
    }

    /// Milliseconds since the epoch at first read.
    pub fn creation_time(&self) -> i64 {
        let mut record = self.lock();
        SessionRecord::resolve(&mut record.creation_time, now_millis)
    }

    pub fn id(&self) -> String {
        let mut record = self.lock();
        SessionRecord::resolve(&mut record.session_id, || Uuid::new_v4().to_string())
    }

    pub fn last_accessed_time(&self) -> i64 {
        let mut record = self.lock();
        SessionRecord::resolve(&mut record.last_accessed_time, now_millis)
    }

    /// Seconds; [`DEFAULT_MAX_INACTIVE_INTERVAL`] unless set.
    pub fn max_inactive_interval(&self) -> u32 {
        let mut record = self.lock();
        SessionRecord::resolve(&mut record.max_inactive_interval, || {
            DEFAULT_MAX_INACTIVE_INTERVAL
        })
    }

    pub fn set_max_inactive_interval(&self, seconds: u32) {
        self.lock().max_inactive_interval = Some(seconds);
    }

    /// Clear every attribute and derived field and drop the engine session.
    pub fn invalidate(&self) {
        *self.lock() = SessionRecord::default();
        if let Some(engine) = &self.engine {
            engine.store.remove(&engine.id);
            tracing::trace!(session_id = %engine.id, "Engine session invalidated");
        }
    }

    pub fn is_new(&self) -> bool {
        self.lock().is_new.unwrap_or(true)
    }

    pub fn mark_not_new(&self) {
        self.lock().is_new = Some(false);
    }
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_is_memoized() {
        let session = Session::detached();
        let first = session.id();
        assert_eq!(session.id(), first);
        assert_eq!(session.creation_time(), session.creation_time());
    }

    #[test]
    fn views_on_same_engine_session_share_record() {
        let store = Arc::new(SessionStore::new());
        let engine = store.create();

        let a = Session::attach(&store, &engine);
        a.set_attribute("count", 1);
        let id = a.id();

        let b = Session::attach(&store, &store.get(engine.id()).unwrap());
        assert_eq!(b.id(), id);
        assert_eq!(b.attribute_as::<i32>("count"), Some(1));
    }

    #[test]
    fn invalidate_resets_identity() {
        let session = Session::detached();
        session.set_attribute("user", "alice");
        session.set_max_inactive_interval(60);
        let id = session.id();

        session.invalidate();

        assert!(session.attributes().is_empty());
        assert_eq!(session.max_inactive_interval(), DEFAULT_MAX_INACTIVE_INTERVAL);
        assert_ne!(session.id(), id);
    }

    #[test]
    fn is_new_stays_true_unless_marked() {
        let session = Session::detached();
        let _ = session.id();
        session.set_attribute("x", true);
        assert!(session.is_new());

        session.mark_not_new();
        assert!(!session.is_new());
    }

    #[test]
    fn typed_attribute_shape_mismatch_is_none() {
        let session = Session::detached();
        session.set_attribute("name", "bob");
        assert_eq!(session.attribute_as::<i64>("name"), None);
        assert_eq!(session.attribute_as::<String>("name").as_deref(), Some("bob"));
        assert_eq!(session.attributes(), vec!["name".to_string()]);
        session.remove_attribute("name");
        assert!(session.attribute("name").is_none());
    }

    #[test]
    fn invalidate_drops_the_engine_session() {
        let store = Arc::new(SessionStore::new());
        for _ in 0..100 {
            let engine = store.create();
            let session = Session::attach(&store, &engine);
            session.set_attribute("user", "alice");
            session.invalidate();
            assert!(!store.contains(engine.id()));
        }
        assert!(store.is_empty());
    }

    #[test]
    fn evict_idle_keeps_recent_sessions() {
        let store = SessionStore::new();
        let stale = store.create();
        std::thread::sleep(Duration::from_millis(30));
        let fresh = store.create();

        assert_eq!(store.evict_idle(Duration::from_millis(20)), 1);
        assert!(!store.contains(stale.id()));
        assert!(store.contains(fresh.id()));
        assert_eq!(store.evict_idle(Duration::from_secs(60)), 0);
    }

    #[tokio::test]
    async fn eviction_task_sweeps_until_shutdown() {
        let store = Arc::new(SessionStore::new());
        store.create();
        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
        let task = tokio::spawn(run_eviction(
            Arc::clone(&store),
            Duration::from_millis(10),
            Duration::from_millis(5),
            async move {
                let _ = stop_rx.await;
            },
        ));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(store.is_empty());

        let _ = stop_tx.send(());
        task.await.unwrap();
    }

    #[test]
    fn store_create_and_remove() {
        let store = SessionStore::new();
        let session = store.create();
        assert_eq!(store.len(), 1);
        assert!(store.get(session.id()).is_some());
        store.remove(session.id());
        assert!(store.is_empty());
    }
}

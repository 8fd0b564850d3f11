use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use super::error::AuthError;
use super::record::UserRecord;
use super::token;

const SESSION_FILE_VERSION: u32 = 1;

/// Name of the session-presence cookie checked by the route gate.
pub const AUTH_COOKIE: &str = "pb_auth";

/// Client-held view of the current identity.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Session {
    pub token: Option<String>,
    pub user: Option<UserRecord>,
}

impl Session {
    /// Token present and not expired.
    pub fn is_valid(&self) -> bool {
        self.token
            .as_deref()
            .map(|t| token::is_token_valid(t, Utc::now()))
            .unwrap_or(false)
    }

    pub fn is_empty(&self) -> bool {
        self.token.is_none() && self.user.is_none()
    }
}

/// Persisted form of a [`Session`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredSession {
    pub token: String,
    pub model: Option<UserRecord>,
}

/// Storage abstraction behind the session store.
pub trait SessionPersistence: Send + Sync {
    fn load(&self) -> Result<Option<StoredSession>, AuthError>;
    fn save(&self, session: &StoredSession) -> Result<(), AuthError>;
    fn clear(&self) -> Result<(), AuthError>;
}

/// Keeps the session for the lifetime of the process only.
#[derive(Debug, Default)]
pub struct MemoryPersistence {
    slot: Mutex<Option<StoredSession>>,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session(session: StoredSession) -> Self {
        Self {
            slot: Mutex::new(Some(session)),
        }
    }
}

impl SessionPersistence for MemoryPersistence {
    fn load(&self) -> Result<Option<StoredSession>, AuthError> {
        let slot = self
            .slot
            .lock()
            .map_err(|_| AuthError::Io("session slot poisoned".to_string()))?;
        Ok(slot.clone())
    }

    fn save(&self, session: &StoredSession) -> Result<(), AuthError> {
        let mut slot = self
            .slot
            .lock()
            .map_err(|_| AuthError::Io("session slot poisoned".to_string()))?;
        *slot = Some(session.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), AuthError> {
        let mut slot = self
            .slot
            .lock()
            .map_err(|_| AuthError::Io("session slot poisoned".to_string()))?;
        *slot = None;
        Ok(())
    }
}

/// JSON file persistence, written atomically with owner-only permissions.
///
/// # Example
/// ```no_run
/// use quillpad::auth::store::{FileSessionPersistence, SessionStore};
/// use std::sync::Arc;
///
/// let persistence = FileSessionPersistence::new_default();
/// let store = SessionStore::open(Arc::new(persistence))?;
/// println!("signed in: {}", store.is_valid());
/// # Ok::<(), quillpad::auth::AuthError>(())
/// ```
#[derive(Debug, Clone)]
pub struct FileSessionPersistence {
    path: PathBuf,
}

impl FileSessionPersistence {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn new_default() -> Self {
        Self::new(default_session_path())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace the session file in one rename. The temp file is created
    /// next to it (so the rename stays on one filesystem) with mode 0600.
    fn replace_file(&self, data: &[u8]) -> Result<(), AuthError> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)?;

        let mut staged = NamedTempFile::new_in(dir)?;
        staged.write_all(data)?;
        staged.as_file().sync_all()?;
        staged
            .persist(&self.path)
            .map_err(|err| AuthError::Io(format!("{}: {}", self.path.display(), err.error)))?;
        Ok(())
    }
}

impl SessionPersistence for FileSessionPersistence {
    fn load(&self) -> Result<Option<StoredSession>, AuthError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(AuthError::Io(err.to_string())),
        };
        let file: SessionFile = serde_json::from_str(&raw)?;
        if file.version != SESSION_FILE_VERSION {
            return Err(AuthError::Serialization(format!(
                "Unsupported session file version {} at {}",
                file.version,
                self.path.display()
            )));
        }
        Ok(Some(file.session))
    }

    fn save(&self, session: &StoredSession) -> Result<(), AuthError> {
        let file = SessionFile {
            version: SESSION_FILE_VERSION,
            session: session.clone(),
            saved_at: Utc::now(),
        };
        let serialized = serde_json::to_vec_pretty(&file)?;
        self.replace_file(&serialized)
    }

    fn clear(&self) -> Result<(), AuthError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(AuthError::Io(err.to_string())),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct SessionFile {
    version: u32,
    #[serde(flatten)]
    session: StoredSession,
    saved_at: DateTime<Utc>,
}

type Listener = Arc<dyn Fn(&Session) + Send + Sync>;

#[derive(Default)]
struct ListenerRegistry {
    entries: Mutex<Vec<(u64, Listener)>>,
    next_id: AtomicU64,
}

impl ListenerRegistry {
    fn add(&self, listener: Listener) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut entries) = self.entries.lock() {
            entries.push((id, listener));
        }
        id
    }

    fn remove(&self, id: u64) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.retain(|(entry_id, _)| *entry_id != id);
        }
    }

    fn snapshot(&self) -> Vec<Listener> {
        self.entries
            .lock()
            .map(|entries| entries.iter().map(|(_, l)| l.clone()).collect())
            .unwrap_or_default()
    }

    fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }
}

/// Handle for a change listener; dropping it unregisters the listener.
#[must_use = "dropping a Subscription unregisters its listener"]
pub struct Subscription {
    registry: Weak<ListenerRegistry>,
    id: u64,
}

impl Subscription {
    /// Unregister now instead of at drop.
    pub fn cancel(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(self.id);
        }
    }
}

/// Process-wide session state, shared as `Arc<SessionStore>`.
///
/// Listeners run synchronously inside the mutating call, after the new
/// session is visible to readers. They must not mutate the store.
pub struct SessionStore {
    session: RwLock<Session>,
    listeners: Arc<ListenerRegistry>,
    persistence: Arc<dyn SessionPersistence>,
    write_lock: Mutex<()>,
}

impl SessionStore {
    /// Open a store, seeding it from `persistence`.
    pub fn open(persistence: Arc<dyn SessionPersistence>) -> Result<Self, AuthError> {
        let session = persistence
            .load()?
            .map(session_from_stored)
            .unwrap_or_default();
        Ok(Self {
            session: RwLock::new(session),
            listeners: Arc::new(ListenerRegistry::default()),
            persistence,
            write_lock: Mutex::new(()),
        })
    }

    /// Empty store that forgets everything on exit.
    pub fn in_memory() -> Self {
        Self {
            session: RwLock::new(Session::default()),
            listeners: Arc::new(ListenerRegistry::default()),
            persistence: Arc::new(MemoryPersistence::new()),
            write_lock: Mutex::new(()),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.session().is_valid()
    }

    pub fn current_user(&self) -> Option<UserRecord> {
        self.read(|s| s.user.clone())
    }

    pub fn token(&self) -> Option<String> {
        self.read(|s| s.token.clone())
    }

    pub fn session(&self) -> Session {
        self.read(Session::clone)
    }

    /// Register a listener fired on every session transition.
    pub fn on_change<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&Session) + Send + Sync + 'static,
    {
        let id = self.listeners.add(Arc::new(listener));
        Subscription {
            registry: Arc::downgrade(&self.listeners),
            id,
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Store a fresh token and user (login, registration, OAuth).
    pub fn save(&self, token: impl Into<String>, user: Option<UserRecord>) -> Result<(), AuthError> {
        let _guard = self.lock_writes()?;
        let next = Session {
            token: Some(token.into()),
            user,
        };
        self.persist(&next)?;
        tracing::debug!(
            user_id = next.user.as_ref().map(|u| u.id.as_str()),
            "session saved"
        );
        self.replace_and_notify(next);
        Ok(())
    }

    /// Replace the cached user while keeping the current token.
    pub fn save_user(&self, user: UserRecord) -> Result<(), AuthError> {
        let _guard = self.lock_writes()?;
        let token = self.token().ok_or(AuthError::NotLoggedIn)?;
        let next = Session {
            token: Some(token),
            user: Some(user),
        };
        self.persist(&next)?;
        self.replace_and_notify(next);
        Ok(())
    }

    /// Drop the session. Listeners fire only if there was one.
    ///
    /// The in-memory session is cleared even when persistence fails; the
    /// persistence error is still returned.
    pub fn clear(&self) -> Result<(), AuthError> {
        let _guard = self.lock_writes()?;
        let persisted = self.persistence.clear();
        if let Err(err) = &persisted {
            tracing::warn!(error = %err, "failed to clear persisted session");
        }
        if !self.read(Session::is_empty) {
            tracing::debug!("session cleared");
            self.replace_and_notify(Session::default());
        }
        persisted
    }

    /// Re-read persistence, picking up writes made by another process.
    ///
    /// Returns `true` when the session changed.
    pub fn reload(&self) -> Result<bool, AuthError> {
        let _guard = self.lock_writes()?;
        let next = self
            .persistence
            .load()?
            .map(session_from_stored)
            .unwrap_or_default();
        if self.read(|current| *current == next) {
            return Ok(false);
        }
        tracing::debug!("session changed externally");
        self.replace_and_notify(next);
        Ok(true)
    }

    /// `Set-Cookie` value mirroring the session for edge route checks.
    ///
    /// Returns `None` when there is no valid session.
    pub fn export_cookie(&self) -> Option<String> {
        let session = self.session();
        if !session.is_valid() {
            return None;
        }
        let token = session.token.unwrap_or_default();
        let payload = serde_json::json!({ "token": token, "model": session.user });
        let mut cookie = format!(
            "{AUTH_COOKIE}={}; Path=/; Secure; HttpOnly; SameSite=Strict",
            urlencoding::encode(&payload.to_string())
        );
        if let Some(expires) = token::expires_at(&token) {
            cookie.push_str(&format!(
                "; Expires={}",
                expires.format("%a, %d %b %Y %H:%M:%S GMT")
            ));
        }
        Some(cookie)
    }

    /// `Set-Cookie` value that removes the session cookie.
    pub fn clear_cookie() -> String {
        format!("{AUTH_COOKIE}=; Path=/; Max-Age=0")
    }

    fn read<T>(&self, f: impl FnOnce(&Session) -> T) -> T {
        match self.session.read() {
            Ok(guard) => f(&guard),
            Err(poisoned) => f(&poisoned.into_inner()),
        }
    }

    fn lock_writes(&self) -> Result<std::sync::MutexGuard<'_, ()>, AuthError> {
        self.write_lock
            .lock()
            .map_err(|_| AuthError::Io("session write lock poisoned".to_string()))
    }

    fn persist(&self, session: &Session) -> Result<(), AuthError> {
        match &session.token {
            Some(token) => self.persistence.save(&StoredSession {
                token: token.clone(),
                model: session.user.clone(),
            }),
            None => self.persistence.clear(),
        }
    }

    fn replace_and_notify(&self, next: Session) {
        match self.session.write() {
            Ok(mut guard) => *guard = next.clone(),
            Err(poisoned) => *poisoned.into_inner() = next.clone(),
        }
        for listener in self.listeners.snapshot() {
            listener(&next);
        }
    }
}

fn session_from_stored(stored: StoredSession) -> Session {
    Session {
        token: Some(stored.token),
        user: stored.model,
    }
}

/// `~/.quillpad/session.json`, or a relative `.quillpad/session.json` without a home dir.
pub fn default_session_path() -> PathBuf {
    directories::UserDirs::new()
        .map(|dirs| dirs.home_dir().join(".quillpad"))
        .unwrap_or_else(|| PathBuf::from(".quillpad"))
        .join("session.json")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::token::test_jwt;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;
    use tempfile::TempDir;

    fn live_token() -> String {
        test_jwt(json!({"id": "u1", "exp": Utc::now().timestamp() + 3600}))
    }

    #[test]
    fn save_notifies_after_state_is_visible() {
        let store = Arc::new(SessionStore::in_memory());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_for_listener = seen.clone();
        let store_for_listener = store.clone();
        let _sub = store.on_change(move |session| {
            let visible = store_for_listener.current_user().map(|u| u.id);
            seen_for_listener
                .lock()
                .unwrap()
                .push((session.is_valid(), visible));
        });

        store
            .save(live_token(), Some(UserRecord::new("u1", "a@b.c")))
            .unwrap();

        assert!(store.is_valid());
        assert_eq!(*seen.lock().unwrap(), vec![(true, Some("u1".to_string()))]);
    }

    #[test]
    fn dropping_subscription_stops_notifications() {
        let store = SessionStore::in_memory();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let sub = store.on_change(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(store.listener_count(), 1);

        store.save(live_token(), None).unwrap();
        sub.cancel();
        store.clear().unwrap();

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(store.listener_count(), 0);
    }

    #[test]
    fn clear_on_empty_store_is_silent() {
        let store = SessionStore::in_memory();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let _sub = store.on_change(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        store.clear().unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn save_user_requires_token() {
        let store = SessionStore::in_memory();
        let err = store.save_user(UserRecord::new("u1", "a@b.c")).unwrap_err();
        assert!(matches!(err, AuthError::NotLoggedIn));
    }

    #[test]
    fn file_persistence_round_trip_and_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("session.json");
        let persistence = Arc::new(FileSessionPersistence::new(&path));

        let store = SessionStore::open(persistence.clone()).unwrap();
        assert!(!store.is_valid());
        let token = live_token();
        store
            .save(token.clone(), Some(UserRecord::new("u1", "a@b.c")))
            .unwrap();

        let reopened = SessionStore::open(persistence.clone()).unwrap();
        assert_eq!(reopened.token().as_deref(), Some(token.as_str()));
        assert_eq!(reopened.current_user().map(|u| u.id), Some("u1".to_string()));

        // Another process signs out.
        persistence.clear().unwrap();
        assert!(reopened.reload().unwrap());
        assert!(!reopened.is_valid());
        assert!(!reopened.reload().unwrap());
    }

    #[cfg(unix)]
    #[test]
    fn session_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("session.json");
        let persistence = FileSessionPersistence::new(&path);
        persistence
            .save(&StoredSession {
                token: live_token(),
                model: None,
            })
            .unwrap();
        let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
    }

    #[test]
    fn rewrite_leaves_only_the_session_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("session.json");
        let persistence = FileSessionPersistence::new(&path);
        for id in ["u1", "u2"] {
            persistence
                .save(&StoredSession {
                    token: live_token(),
                    model: Some(UserRecord::new(id, "a@b.c")),
                })
                .unwrap();
        }

        let entries: Vec<_> = fs::read_dir(path.parent().unwrap())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(entries, vec![std::ffi::OsString::from("session.json")]);
        let loaded = persistence.load().unwrap().unwrap();
        assert_eq!(loaded.model.map(|u| u.id), Some("u2".to_string()));
    }

    #[test]
    fn export_cookie_only_for_valid_session() {
        let store = SessionStore::in_memory();
        assert!(store.export_cookie().is_none());

        store.save(live_token(), None).unwrap();
        let cookie = store.export_cookie().unwrap();
        assert!(cookie.starts_with("pb_auth="));
        assert!(cookie.contains("SameSite=Strict"));
        assert!(cookie.contains("Expires="));
        assert_eq!(SessionStore::clear_cookie(), "pb_auth=; Path=/; Max-Age=0");
    }
}

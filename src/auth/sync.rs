//! Derives the authenticated/unauthenticated view from the session store
//! and publishes it to dependents.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::json;
use strum::{Display, EnumString};
use tokio::sync::watch;

use super::error::AuthError;
use super::record::UserRecord;
use super::store::{Session, SessionStore, Subscription};
use super::validation::{validate_email, validate_login, validate_registration};
use crate::api::{ApiError, AuthResponse, FileUpload, RecordApi};
use crate::notice::{Notice, Notifier};

const NOT_UNIQUE: &str = "validation_not_unique";
const AVATAR_FIELD: &str = "avatar";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum AuthState {
    Unauthenticated,
    Authenticated,
}

/// What dependents render from.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthSnapshot {
    pub state: AuthState,
    pub is_authenticated: bool,
    pub user: Option<UserRecord>,
}

impl AuthSnapshot {
    pub fn unauthenticated() -> Self {
        Self {
            state: AuthState::Unauthenticated,
            is_authenticated: false,
            user: None,
        }
    }

    /// Authenticated only with a valid token and a user record.
    pub fn from_session(session: &Session) -> Self {
        match &session.user {
            Some(user) if session.is_valid() => Self {
                state: AuthState::Authenticated,
                is_authenticated: true,
                user: Some(user.clone()),
            },
            _ => Self::unauthenticated(),
        }
    }
}

impl Default for AuthSnapshot {
    fn default() -> Self {
        Self::unauthenticated()
    }
}

/// Fields a user may change on their own record. `None` leaves a field
/// as it is.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub email: Option<String>,
    /// New profile picture; stored in the record's `avatar` field.
    pub avatar: Option<FileUpload>,
}

impl ProfileUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.email.is_none() && self.avatar.is_none()
    }
}

/// Keeps an [`AuthSnapshot`] in step with a [`SessionStore`].
///
/// Every operation reports success as a `bool`. Failures leave the session
/// untouched and surface as a [`Notice`] instead of an error.
pub struct AuthSynchronizer {
    store: Arc<SessionStore>,
    api: Arc<dyn RecordApi>,
    notifier: Arc<dyn Notifier>,
    users_collection: String,
    state: Arc<watch::Sender<AuthSnapshot>>,
    subscription: Mutex<Option<Subscription>>,
    busy: AtomicBool,
}

impl AuthSynchronizer {
    /// Compute the initial snapshot from `store` and start following it.
    pub fn init(
        store: Arc<SessionStore>,
        api: Arc<dyn RecordApi>,
        notifier: Arc<dyn Notifier>,
    ) -> Arc<Self> {
        Self::init_for_collection(store, api, notifier, "users")
    }

    pub fn init_for_collection(
        store: Arc<SessionStore>,
        api: Arc<dyn RecordApi>,
        notifier: Arc<dyn Notifier>,
        users_collection: impl Into<String>,
    ) -> Arc<Self> {
        let (tx, _rx) = watch::channel(AuthSnapshot::from_session(&store.session()));
        let state = Arc::new(tx);

        let publisher = state.clone();
        let subscription = store.on_change(move |session| {
            let next = AuthSnapshot::from_session(session);
            publisher.send_if_modified(|current| {
                if *current == next {
                    return false;
                }
                *current = next;
                true
            });
        });

        let sync = Arc::new(Self {
            store,
            api,
            notifier,
            users_collection: users_collection.into(),
            state,
            subscription: Mutex::new(Some(subscription)),
            busy: AtomicBool::new(false),
        });
        tracing::debug!(
            authenticated = sync.snapshot().is_authenticated,
            "auth synchronizer initialized"
        );
        sync
    }

    /// Stop following the store. Later store changes are not published.
    pub fn teardown(&self) {
        let subscription = self.subscription.lock().ok().and_then(|mut s| s.take());
        if subscription.is_some() {
            tracing::debug!("auth synchronizer torn down");
        }
    }

    pub fn is_active(&self) -> bool {
        self.subscription
            .lock()
            .map(|s| s.is_some())
            .unwrap_or(false)
    }

    pub fn snapshot(&self) -> AuthSnapshot {
        self.state.borrow().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.borrow().is_authenticated
    }

    pub fn watch(&self) -> watch::Receiver<AuthSnapshot> {
        self.state.subscribe()
    }

    /// Whether an operation is running; forms disable submission meanwhile.
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    pub async fn login(&self, email: &str, password: &str) -> bool {
        let _busy = BusyGuard::enter(&self.busy);
        match self.try_login(email, password).await {
            Ok(user) => {
                tracing::info!(user_id = %user.id, "logged in");
                self.notifier.notify(Notice::success(
                    "Welcome Back",
                    "You have logged in successfully",
                ));
                true
            }
            Err(err) => {
                tracing::warn!(error = %err, "login failed");
                self.notifier
                    .notify(Notice::destructive("Error", describe(&err, "Failed to login")));
                false
            }
        }
    }

    /// Create the user record, then sign in with the same credentials.
    pub async fn register(&self, email: &str, password: &str, password_confirm: &str) -> bool {
        let _busy = BusyGuard::enter(&self.busy);
        match self.try_register(email, password, password_confirm).await {
            Ok(user) => {
                tracing::info!(user_id = %user.id, "registered");
                self.notifier.notify(Notice::success(
                    "Welcome!",
                    "Your account has been created successfully",
                ));
                true
            }
            Err(err) => {
                tracing::warn!(error = %err, "registration failed");
                self.notifier.notify(Notice::destructive(
                    "Registration Error",
                    describe(&err, "Failed to create account"),
                ));
                false
            }
        }
    }

    pub fn logout(&self) {
        if let Err(err) = self.store.clear() {
            tracing::warn!(error = %err, "session cleared in memory only");
        }
        tracing::info!("logged out");
        self.notifier.notify(Notice::success(
            "Success",
            "You have logged out successfully",
        ));
    }

    /// Update the signed-in user's record and refresh the cached copy.
    ///
    /// With an avatar the update goes out as one multipart body.
    pub async fn update_profile(&self, update: ProfileUpdate) -> bool {
        let _busy = BusyGuard::enter(&self.busy);
        match self.try_update_profile(update).await {
            Ok(user) => {
                tracing::info!(user_id = %user.id, "profile updated");
                self.notifier.notify(Notice::success(
                    "Profile Updated",
                    "Your profile has been successfully updated.",
                ));
                true
            }
            Err(AuthError::NotLoggedIn) => {
                self.notifier.notify(Notice::destructive(
                    "Error",
                    "You must be logged in to update your profile.",
                ));
                false
            }
            Err(err) => {
                tracing::warn!(error = %err, "profile update failed");
                self.notifier.notify(Notice::destructive(
                    "Update Error",
                    describe(&err, "Failed to update profile"),
                ));
                false
            }
        }
    }

    /// Drop the session if its token has expired.
    ///
    /// Returns whether the session is still valid.
    pub fn revalidate(&self) -> bool {
        let session = self.store.session();
        if session.is_valid() {
            return true;
        }
        if session.token.is_some() {
            tracing::info!("session token expired");
            if let Err(err) = self.store.clear() {
                tracing::warn!(error = %err, "session cleared in memory only");
            }
        }
        false
    }

    async fn try_login(&self, email: &str, password: &str) -> Result<UserRecord, AuthError> {
        validate_login(email, password)?;
        let response = self
            .api
            .auth_with_password(&self.users_collection, email, password)
            .await
            .map_err(credentials_error)?;
        self.accept(response)
    }

    async fn try_register(
        &self,
        email: &str,
        password: &str,
        password_confirm: &str,
    ) -> Result<UserRecord, AuthError> {
        validate_registration(email, password, password_confirm)?;
        self.api
            .create(
                &self.users_collection,
                json!({
                    "email": email,
                    "password": password,
                    "passwordConfirm": password_confirm,
                }),
            )
            .await
            .map_err(|err| {
                if err.has_field_code(NOT_UNIQUE) {
                    AuthError::Conflict("An account with this email already exists".to_string())
                } else {
                    err.into()
                }
            })?;
        let response = self
            .api
            .auth_with_password(&self.users_collection, email, password)
            .await
            .map_err(credentials_error)?;
        self.accept(response)
    }

    async fn try_update_profile(&self, update: ProfileUpdate) -> Result<UserRecord, AuthError> {
        if !self.store.is_valid() {
            return Err(AuthError::NotLoggedIn);
        }
        let current = self.store.current_user().ok_or(AuthError::NotLoggedIn)?;
        let mut body = serde_json::Map::new();
        if let Some(name) = update.name {
            body.insert("name".to_string(), json!(name.trim()));
        }
        if let Some(email) = update.email {
            validate_email(&email)?;
            body.insert("email".to_string(), json!(email.trim()));
        }
        let updated = match update.avatar {
            Some(avatar) => {
                let avatar = FileUpload {
                    field: AVATAR_FIELD.to_string(),
                    ..avatar
                };
                self.api
                    .update_with_files(
                        &self.users_collection,
                        &current.id,
                        body.into(),
                        vec![avatar],
                    )
                    .await?
            }
            None => {
                self.api
                    .update(&self.users_collection, &current.id, body.into())
                    .await?
            }
        };
        let user: UserRecord = serde_json::from_value(updated)?;
        self.store.save_user(user.clone())?;
        Ok(user)
    }

    fn accept(&self, response: AuthResponse) -> Result<UserRecord, AuthError> {
        let user = response
            .record
            .ok_or_else(|| AuthError::InvalidResponse("missing user record".to_string()))?;
        self.store.save(response.token, Some(user.clone()))?;
        Ok(user)
    }
}

impl Drop for AuthSynchronizer {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Password auth answers 400 for unknown identity or wrong password.
fn credentials_error(err: ApiError) -> AuthError {
    match err.status() {
        Some(400) => AuthError::InvalidCredentials,
        _ => err.into(),
    }
}

fn describe(err: &AuthError, fallback: &str) -> String {
    let message = err.user_message();
    if message.trim().is_empty() {
        fallback.to_string()
    } else {
        message
    }
}

struct BusyGuard<'a>(&'a AtomicBool);

impl<'a> BusyGuard<'a> {
    fn enter(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::Release);
        Self(flag)
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

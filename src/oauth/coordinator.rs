//! Drives one OAuth2 popup sign-in to a single outcome.
//!
//! Three signals race for every attempt: the provider response, the user
//! closing the popup (noticed by polling), and a hard timeout. Whichever
//! settles first decides the outcome; the others are dropped together with
//! their timers. Once the provider has redirected back with a code, a
//! closed popup no longer counts: only the code exchange or the timeout
//! can settle the attempt. A caller-supplied [`CancellationToken`] covers
//! the UI control going away mid-attempt.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::flight::{FlightPermit, SingleFlight};
use super::popup::{PopupOpener, PopupRequest, PopupSlot};
use crate::api::{ApiError, AuthResponse, BeforeOpen, OAuth2Request, OnRedirect, RecordApi};
use crate::auth::error::AuthError;
use crate::auth::record::UserRecord;
use crate::auth::store::SessionStore;
use crate::notice::{Notice, Notifier};

/// Shortest popup poll period; zero would spin the ticker.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Poll and timeout settings for popup attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OAuthTimings {
    /// How often the popup is checked for having been closed. Raised to
    /// [`MIN_POLL_INTERVAL`] when smaller.
    pub poll_interval: Duration,
    /// Upper bound on the whole attempt.
    pub timeout: Duration,
}

impl OAuthTimings {
    fn normalized(self) -> Self {
        Self {
            poll_interval: self.poll_interval.max(MIN_POLL_INTERVAL),
            timeout: self.timeout,
        }
    }
}

impl Default for OAuthTimings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            timeout: Duration::from_secs(6),
        }
    }
}

/// How an attempt ended. Only [`OAuthOutcome::Authenticated`] counts as
/// success.
#[derive(Debug, Clone, PartialEq)]
pub enum OAuthOutcome {
    Authenticated(UserRecord),
    /// The popup was closed before the provider answered.
    Cancelled,
    TimedOut,
    /// The provider or backend reported an error.
    Failed(String),
    /// The initiating control went away; nothing was written or announced.
    Aborted,
}

impl OAuthOutcome {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated(_))
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Authenticated(_) => "authenticated",
            Self::Cancelled => "cancelled",
            Self::TimedOut => "timed_out",
            Self::Failed(_) => "failed",
            Self::Aborted => "aborted",
        }
    }
}

/// First settle wins; later settles report `false`.
#[derive(Debug, Default)]
struct AttemptGuard {
    resolved: AtomicBool,
}

impl AttemptGuard {
    fn settle(&self) -> bool {
        self.resolved
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn is_resolved(&self) -> bool {
        self.resolved.load(Ordering::Acquire)
    }
}

/// Closes the attempt's popup on every exit, including the attempt future
/// being dropped mid-race.
struct PopupCleanup(PopupSlot);

impl Drop for PopupCleanup {
    fn drop(&mut self) {
        self.0.close();
    }
}

enum Race {
    Response(Result<AuthResponse, ApiError>),
    PopupClosed,
    TimedOut,
    Aborted,
}

/// Popup sign-in coordinator, single-flight per provider.
///
/// # Example
/// ```no_run
/// use std::sync::Arc;
/// use quillpad::api::PocketBaseClient;
/// use quillpad::auth::store::SessionStore;
/// use quillpad::notice::TracingNotifier;
/// use quillpad::oauth::{OAuthCoordinator, PopupOpener};
///
/// # async fn example(opener: Arc<dyn PopupOpener>) -> Result<(), quillpad::auth::AuthError> {
/// let store = Arc::new(SessionStore::in_memory());
/// let api = Arc::new(PocketBaseClient::new("http://127.0.0.1:8090").with_session(store.clone()));
/// let coordinator = OAuthCoordinator::new(api, store, opener, Arc::new(TracingNotifier));
/// let outcome = coordinator.authenticate("github").await?;
/// println!("signed in: {}", outcome.is_authenticated());
/// # Ok(())
/// # }
/// ```
pub struct OAuthCoordinator {
    api: Arc<dyn RecordApi>,
    store: Arc<SessionStore>,
    opener: Arc<dyn PopupOpener>,
    notifier: Arc<dyn Notifier>,
    collection: String,
    timings: OAuthTimings,
    create_data: Option<Value>,
    flights: SingleFlight,
}

impl OAuthCoordinator {
    pub fn new(
        api: Arc<dyn RecordApi>,
        store: Arc<SessionStore>,
        opener: Arc<dyn PopupOpener>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            api,
            store,
            opener,
            notifier,
            collection: "users".to_string(),
            timings: OAuthTimings::default(),
            create_data: Some(json!({ "emailVisibility": true })),
            flights: SingleFlight::new(),
        }
    }

    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = collection.into();
        self
    }

    pub fn with_timings(mut self, timings: OAuthTimings) -> Self {
        self.timings = timings.normalized();
        self
    }

    /// Fields applied to the user record when a sign-in creates one.
    pub fn with_create_data(mut self, create_data: Option<Value>) -> Self {
        self.create_data = create_data;
        self
    }

    pub fn timings(&self) -> OAuthTimings {
        self.timings
    }

    /// Whether an attempt for `provider` is unresolved. UI controls for
    /// that provider should stay disabled while this is `true`.
    pub fn is_pending(&self, provider: &str) -> bool {
        self.flights.is_active(provider)
    }

    /// Run one attempt to completion.
    ///
    /// # Errors
    ///
    /// Only [`AuthError::AttemptInFlight`], when `provider` already has an
    /// unresolved attempt. Every other failure is reported through the
    /// returned [`OAuthOutcome`].
    pub async fn authenticate(&self, provider: &str) -> Result<OAuthOutcome, AuthError> {
        self.authenticate_until(provider, CancellationToken::new())
            .await
    }

    /// Like [`authenticate`](Self::authenticate), aborting when `cancel`
    /// fires.
    pub async fn authenticate_until(
        &self,
        provider: &str,
        cancel: CancellationToken,
    ) -> Result<OAuthOutcome, AuthError> {
        let permit = self.claim(provider)?;
        Ok(self.run(permit, cancel).await)
    }

    /// Start an attempt on a background task.
    ///
    /// The single-flight slot is claimed before this returns, so a second
    /// call for the same provider fails immediately. Dropping the handle
    /// aborts the attempt.
    pub fn spawn(self: &Arc<Self>, provider: &str) -> Result<OAuthHandle, AuthError> {
        let permit = self.claim(provider)?;
        let cancel = CancellationToken::new();
        let coordinator = Arc::clone(self);
        let task_cancel = cancel.clone();
        let task = tokio::spawn(async move { coordinator.run(permit, task_cancel).await });
        Ok(OAuthHandle {
            task: Some(task),
            cancel,
        })
    }

    fn claim(&self, provider: &str) -> Result<FlightPermit, AuthError> {
        self.flights.try_acquire(provider).ok_or_else(|| {
            tracing::debug!(provider, "oauth attempt already in flight");
            AuthError::AttemptInFlight {
                provider: provider.to_string(),
            }
        })
    }

    async fn run(&self, permit: FlightPermit, cancel: CancellationToken) -> OAuthOutcome {
        let provider = permit.key().to_string();
        let attempt_id = Uuid::new_v4();
        let attempt = Arc::new(AttemptGuard::default());
        let popup = PopupSlot::default();
        let _cleanup = PopupCleanup(popup.clone());
        let redirected = CancellationToken::new();
        tracing::info!(%provider, %attempt_id, "oauth attempt started");

        let request = OAuth2Request::new(
            provider.clone(),
            self.before_open(&provider, popup.clone(), attempt.clone()),
        )
        .with_create_data(self.create_data.clone())
        .with_on_redirect(on_redirect(&provider, redirected.clone()));

        let race = tokio::select! {
            biased;
            _ = cancel.cancelled() => Race::Aborted,
            result = self.api.auth_with_oauth2(&self.collection, request) => Race::Response(result),
            _ = wait_for_close(&popup, &redirected, self.timings.poll_interval) => Race::PopupClosed,
            _ = time::sleep(self.timings.timeout) => Race::TimedOut,
        };

        if !attempt.settle() {
            // The race above yields once; a second settle means a bug upstream.
            tracing::error!(%provider, %attempt_id, "oauth attempt settled twice");
        }
        popup.close();

        let outcome = match race {
            Race::Response(result) => self.accept_response(result),
            Race::PopupClosed => OAuthOutcome::Cancelled,
            Race::TimedOut => OAuthOutcome::TimedOut,
            Race::Aborted => OAuthOutcome::Aborted,
        };
        tracing::info!(%provider, %attempt_id, outcome = outcome.label(), "oauth attempt resolved");
        self.announce(&provider, &outcome);
        drop(permit);
        outcome
    }

    fn before_open(
        &self,
        provider: &str,
        popup: PopupSlot,
        attempt: Arc<AttemptGuard>,
    ) -> BeforeOpen {
        let opener = self.opener.clone();
        let provider = provider.to_string();
        Box::new(move |url: String| match opener.open(&PopupRequest::new(url)) {
            Ok(window) => {
                if attempt.is_resolved() {
                    window.close();
                } else {
                    popup.set(window);
                }
            }
            Err(err) => {
                tracing::warn!(%provider, error = %err, "failed to open oauth popup");
            }
        })
    }

    fn accept_response(&self, result: Result<AuthResponse, ApiError>) -> OAuthOutcome {
        match result {
            Ok(AuthResponse {
                token,
                record: Some(record),
                ..
            }) => match self.store.save(token, Some(record.clone())) {
                Ok(()) => OAuthOutcome::Authenticated(record),
                Err(err) => OAuthOutcome::Failed(err.to_string()),
            },
            Ok(_) => OAuthOutcome::Failed("The provider did not return a user".to_string()),
            Err(err) => OAuthOutcome::Failed(AuthError::from(err).user_message()),
        }
    }

    fn announce(&self, provider: &str, outcome: &OAuthOutcome) {
        let notice = match outcome {
            OAuthOutcome::Authenticated(_) => Notice::success(
                "Welcome!",
                format!("Successfully signed in with {provider}"),
            ),
            OAuthOutcome::Cancelled => {
                Notice::info("Authentication Cancelled", "Sign in process was cancelled")
            }
            OAuthOutcome::TimedOut => Notice::info(
                "Authentication Cancelled",
                format!("Sign in with {provider} timed out"),
            ),
            OAuthOutcome::Failed(message) if !message.is_empty() => {
                Notice::destructive("Authentication Error", message.clone())
            }
            OAuthOutcome::Failed(_) => Notice::destructive(
                "Authentication Error",
                format!("Failed to sign in with {provider}"),
            ),
            OAuthOutcome::Aborted => return,
        };
        self.notifier.notify(notice);
    }
}

fn on_redirect(provider: &str, redirected: CancellationToken) -> OnRedirect {
    let provider = provider.to_string();
    Box::new(move || {
        tracing::debug!(%provider, "oauth redirect received, exchanging code");
        redirected.cancel();
    })
}

/// Resolves when the user closes the popup before the provider redirects
/// back. After the redirect it never resolves.
async fn wait_for_close(popup: &PopupSlot, redirected: &CancellationToken, every: Duration) {
    let every = every.max(MIN_POLL_INTERVAL);
    let mut ticker = time::interval_at(Instant::now() + every, every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        if redirected.is_cancelled() {
            return std::future::pending().await;
        }
        if popup.get().is_some_and(|window| window.is_closed()) {
            return;
        }
    }
}

/// Handle to an attempt started with [`OAuthCoordinator::spawn`].
///
/// Dropping the handle before the attempt resolves aborts it: timers are
/// cleared, the popup is closed, and the session is left untouched.
pub struct OAuthHandle {
    task: Option<JoinHandle<OAuthOutcome>>,
    cancel: CancellationToken,
}

impl OAuthHandle {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Wait for the attempt's outcome.
    pub async fn outcome(mut self) -> OAuthOutcome {
        match self.task.take() {
            Some(task) => task.await.unwrap_or(OAuthOutcome::Aborted),
            None => OAuthOutcome::Aborted,
        }
    }
}

impl Drop for OAuthHandle {
    fn drop(&mut self) {
        if self.task.is_some() {
            self.cancel.cancel();
        }
    }
}

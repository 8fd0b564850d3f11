//! Wires the session store, backend client and services together.

use std::sync::Arc;

use crate::api::{PocketBaseClient, RecordApi};
use crate::auth::store::{FileSessionPersistence, SessionStore};
use crate::auth::sync::AuthSynchronizer;
use crate::config::QuillConfig;
use crate::error::Result;
use crate::gate::RouteGate;
use crate::notice::Notifier;
use crate::oauth::{OAuthCoordinator, PopupOpener};
use crate::posts::PostService;

/// One shared session plus everything that reads or writes it.
///
/// # Example
/// ```no_run
/// use std::sync::Arc;
/// use quillpad::app::Quillpad;
/// use quillpad::config::QuillConfig;
/// use quillpad::notice::TracingNotifier;
/// use quillpad::oauth::PopupOpener;
///
/// # async fn example(opener: Arc<dyn PopupOpener>) -> quillpad::error::Result<()> {
/// let app = Quillpad::open(QuillConfig::from_env()?, opener, Arc::new(TracingNotifier))?;
/// if app.auth().login("ada@example.com", "hunter22").await {
///     println!("{} posts", app.posts().list_all().await?.len());
/// }
/// # Ok(())
/// # }
/// ```
pub struct Quillpad {
    config: QuillConfig,
    store: Arc<SessionStore>,
    api: Arc<dyn RecordApi>,
    auth: Arc<AuthSynchronizer>,
    oauth: Arc<OAuthCoordinator>,
    posts: PostService,
    gate: RouteGate,
}

impl Quillpad {
    /// Open the persisted session and connect the HTTP client to it.
    pub fn open(
        config: QuillConfig,
        opener: Arc<dyn PopupOpener>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self> {
        let persistence = FileSessionPersistence::new(config.session_path());
        let store = Arc::new(SessionStore::open(Arc::new(persistence))?);
        let api = Arc::new(PocketBaseClient::new(config.base_url()).with_session(store.clone()));
        tracing::debug!(base_url = config.base_url(), "quillpad opened");
        Ok(Self::from_parts(config, store, api, opener, notifier))
    }

    /// Assemble from existing parts, e.g. a non-HTTP [`RecordApi`].
    pub fn from_parts(
        config: QuillConfig,
        store: Arc<SessionStore>,
        api: Arc<dyn RecordApi>,
        opener: Arc<dyn PopupOpener>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let auth = AuthSynchronizer::init_for_collection(
            store.clone(),
            api.clone(),
            notifier.clone(),
            config.users_collection(),
        );
        let oauth = Arc::new(
            OAuthCoordinator::new(api.clone(), store.clone(), opener, notifier)
                .with_collection(config.users_collection())
                .with_timings(config.oauth_timings()),
        );
        let posts = PostService::new(api.clone()).with_collection(config.posts_collection());
        Self {
            config,
            store,
            api,
            auth,
            oauth,
            posts,
            gate: RouteGate::new(),
        }
    }

    pub fn config(&self) -> &QuillConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    pub fn api(&self) -> &Arc<dyn RecordApi> {
        &self.api
    }

    pub fn auth(&self) -> &Arc<AuthSynchronizer> {
        &self.auth
    }

    pub fn oauth(&self) -> &Arc<OAuthCoordinator> {
        &self.oauth
    }

    pub fn posts(&self) -> &PostService {
        &self.posts
    }

    pub fn gate(&self) -> &RouteGate {
        &self.gate
    }

    /// Public URL of the signed-in user's avatar.
    pub fn avatar_url(&self) -> Option<String> {
        self.store
            .current_user()
            .and_then(|user| user.avatar_url(self.config.base_url()))
    }
}

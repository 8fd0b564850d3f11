//! Convenience re-exports.

pub use crate::api::{ApiError, ListOptions, PocketBaseClient, RecordApi};
pub use crate::app::Quillpad;
pub use crate::auth::{
    AuthError, AuthSnapshot, AuthState, AuthSynchronizer, ProfileUpdate, SessionStore, UserRecord,
};
pub use crate::config::QuillConfig;
pub use crate::error::{QuillError, Result};
pub use crate::gate::{Access, GateDecision, RouteGate};
pub use crate::notice::{Notice, NoticeLevel, Notifier, TracingNotifier};
pub use crate::oauth::{OAuthCoordinator, OAuthOutcome, OAuthTimings, PopupOpener, PopupWindow};
pub use crate::posts::{BlogPost, PostDraft, PostService};

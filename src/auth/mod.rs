//! Client session, credential validation and the auth-state synchronizer.

pub mod error;
pub mod record;
pub mod store;
pub mod sync;
pub mod token;
pub mod validation;

pub use error::{AuthError, ValidationError};
pub use record::UserRecord;
pub use store::{
    FileSessionPersistence, MemoryPersistence, Session, SessionPersistence, SessionStore,
    StoredSession, Subscription, AUTH_COOKIE,
};
pub use sync::{AuthSnapshot, AuthState, AuthSynchronizer, ProfileUpdate};

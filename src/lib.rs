//! Quillpad: client core for a PocketBase-backed blog.
//!
//! Holds the signed-in session, keeps an authenticated/unauthenticated view
//! in step with it, and coordinates OAuth2 popup sign-ins so each attempt
//! resolves exactly once. Thin typed services cover the blog post and
//! profile records the UI reads and writes.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use quillpad::prelude::*;
//!
//! # async fn example() -> quillpad::error::Result<()> {
//! let store = Arc::new(SessionStore::in_memory());
//! let api = Arc::new(PocketBaseClient::new("http://127.0.0.1:8090").with_session(store.clone()));
//! let auth = AuthSynchronizer::init(store, api, Arc::new(TracingNotifier));
//!
//! if auth.login("ada@example.com", "hunter22").await {
//!     println!("hello {}", auth.snapshot().user.map(|u| u.email).unwrap_or_default());
//! }
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod app;
pub mod auth;
pub mod config;
pub mod error;
pub mod gate;
pub mod notice;
pub mod oauth;
pub mod posts;
pub mod prelude;

#[cfg(feature = "cli")]
pub mod cli;

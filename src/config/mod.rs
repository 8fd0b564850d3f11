//! Configuration system (layered: code > env > defaults).

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::auth::store::default_session_path;
use crate::error::{QuillError, Result};
use crate::oauth::OAuthTimings;

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8090";
pub const DEFAULT_USERS_COLLECTION: &str = "users";
pub const DEFAULT_POSTS_COLLECTION: &str = "Blogs";

/// Environment variable bounding each OAuth2 popup attempt, in milliseconds.
pub const OAUTH_TIMEOUT_ENV: &str = "QUILLPAD_OAUTH_TIMEOUT_MS";

/// Settings shared by the session store, the backend client and the
/// services built on them.
#[derive(Clone, PartialEq, Eq)]
pub struct QuillConfig {
    base_url: String,
    users_collection: String,
    posts_collection: String,
    oauth_timings: OAuthTimings,
    session_file: Option<PathBuf>,
}

impl fmt::Debug for QuillConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuillConfig")
            .field("base_url", &self.base_url)
            .field("users_collection", &self.users_collection)
            .field("posts_collection", &self.posts_collection)
            .field("oauth_timings", &self.oauth_timings)
            .field("session_file", &self.session_path())
            .finish()
    }
}

impl Default for QuillConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl QuillConfig {
    pub fn new() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            users_collection: DEFAULT_USERS_COLLECTION.to_string(),
            posts_collection: DEFAULT_POSTS_COLLECTION.to_string(),
            oauth_timings: OAuthTimings::default(),
            session_file: None,
        }
    }

    /// Load from environment variables, reading `.env` first if present.
    ///
    /// Recognized: `QUILLPAD_BASE_URL` (or `POCKETBASE_URL`),
    /// `QUILLPAD_USERS_COLLECTION`, `QUILLPAD_POSTS_COLLECTION`,
    /// `QUILLPAD_OAUTH_POLL_MS`, `QUILLPAD_OAUTH_TIMEOUT_MS`,
    /// `QUILLPAD_SESSION_FILE`.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv(); // load .env if present, ignore error
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env) with an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let mut config = Self::new();

        if let Some(url) = var("QUILLPAD_BASE_URL").or_else(|| var("POCKETBASE_URL")) {
            config = config.with_base_url(url);
        }
        if let Some(collection) = var("QUILLPAD_USERS_COLLECTION") {
            config.users_collection = collection;
        }
        if let Some(collection) = var("QUILLPAD_POSTS_COLLECTION") {
            config.posts_collection = collection;
        }
        if let Some(raw) = var("QUILLPAD_OAUTH_POLL_MS") {
            config.oauth_timings.poll_interval = parse_millis("QUILLPAD_OAUTH_POLL_MS", &raw)?;
        }
        if let Some(raw) = var(OAUTH_TIMEOUT_ENV) {
            config.oauth_timings.timeout = parse_millis(OAUTH_TIMEOUT_ENV, &raw)?;
        }
        if let Some(path) = var("QUILLPAD_SESSION_FILE") {
            config.session_file = Some(PathBuf::from(path));
        }

        Ok(config)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_users_collection(mut self, collection: impl Into<String>) -> Self {
        self.users_collection = collection.into();
        self
    }

    pub fn with_posts_collection(mut self, collection: impl Into<String>) -> Self {
        self.posts_collection = collection.into();
        self
    }

    pub fn with_oauth_timings(mut self, timings: OAuthTimings) -> Self {
        self.oauth_timings = timings;
        self
    }

    pub fn with_session_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.session_file = Some(path.into());
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn users_collection(&self) -> &str {
        &self.users_collection
    }

    pub fn posts_collection(&self) -> &str {
        &self.posts_collection
    }

    pub fn oauth_timings(&self) -> OAuthTimings {
        self.oauth_timings
    }

    /// Where the session is persisted.
    pub fn session_path(&self) -> PathBuf {
        self.session_file
            .clone()
            .unwrap_or_else(default_session_path)
    }
}

fn parse_millis(key: &str, raw: &str) -> Result<Duration> {
    let millis: u64 = raw.trim().parse().map_err(|_| {
        QuillError::Configuration(format!("{key} must be a number of milliseconds, got {raw:?}"))
    })?;
    if millis == 0 {
        return Err(QuillError::Configuration(format!(
            "{key} must be greater than zero"
        )));
    }
    Ok(Duration::from_millis(millis))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_without_env() {
        let config = QuillConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config.base_url(), DEFAULT_BASE_URL);
        assert_eq!(config.users_collection(), "users");
        assert_eq!(config.posts_collection(), "Blogs");
        assert_eq!(config.oauth_timings(), OAuthTimings::default());
        assert!(config.session_path().ends_with("session.json"));
    }

    #[test]
    fn env_overrides_defaults() {
        let config = QuillConfig::from_lookup(lookup(&[
            ("POCKETBASE_URL", "https://pb.example.com/"),
            ("QUILLPAD_POSTS_COLLECTION", "posts"),
            ("QUILLPAD_OAUTH_POLL_MS", "250"),
            ("QUILLPAD_OAUTH_TIMEOUT_MS", "60000"),
            ("QUILLPAD_SESSION_FILE", "/tmp/qp.json"),
        ]))
        .unwrap();
        assert_eq!(config.base_url(), "https://pb.example.com");
        assert_eq!(config.posts_collection(), "posts");
        assert_eq!(config.oauth_timings().poll_interval, Duration::from_millis(250));
        assert_eq!(config.oauth_timings().timeout, Duration::from_secs(60));
        assert_eq!(config.session_path(), PathBuf::from("/tmp/qp.json"));
    }

    #[test]
    fn quillpad_url_wins_over_pocketbase_url() {
        let config = QuillConfig::from_lookup(lookup(&[
            ("QUILLPAD_BASE_URL", "http://a"),
            ("POCKETBASE_URL", "http://b"),
        ]))
        .unwrap();
        assert_eq!(config.base_url(), "http://a");
    }

    #[test]
    fn bad_durations_are_configuration_errors() {
        for value in ["soon", "0"] {
            let err =
                QuillConfig::from_lookup(lookup(&[("QUILLPAD_OAUTH_TIMEOUT_MS", value)])).unwrap_err();
            assert!(matches!(err, QuillError::Configuration(_)), "{value}");
        }
    }

    #[test]
    fn code_overrides_env() {
        let config = QuillConfig::from_lookup(lookup(&[("QUILLPAD_USERS_COLLECTION", "members")]))
            .unwrap()
            .with_users_collection("admins");
        assert_eq!(config.users_collection(), "admins");
    }
}

//! Route protection based on the session-presence cookie.
//!
//! Edge requests only see cookies, so [`RouteGate::decide`] checks that the
//! auth cookie exists and nothing more. Pages that render protected content
//! call [`RouteGate::guard`], which checks the session store itself.

use crate::auth::record::UserRecord;
use crate::auth::store::{SessionStore, AUTH_COOKIE};
use crate::notice::{Notice, Notifier};

/// What to do with a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    Next,
    Redirect(String),
}

/// Result of a client-side access check.
#[derive(Debug, Clone, PartialEq)]
pub enum Access {
    Granted(Option<UserRecord>),
    Denied { redirect: String },
}

impl Access {
    pub fn is_granted(&self) -> bool {
        matches!(self, Self::Granted(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteGate {
    cookie_name: String,
    public_paths: Vec<String>,
    protected_prefixes: Vec<String>,
    login_path: String,
    home_path: String,
}

impl Default for RouteGate {
    fn default() -> Self {
        Self {
            cookie_name: AUTH_COOKIE.to_string(),
            public_paths: vec!["/login".to_string(), "/register".to_string()],
            protected_prefixes: vec!["/dashboard".to_string()],
            login_path: "/login".to_string(),
            home_path: "/dashboard".to_string(),
        }
    }
}

impl RouteGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cookie_name(mut self, name: impl Into<String>) -> Self {
        self.cookie_name = name.into();
        self
    }

    /// Also protect `prefix` and everything below it.
    pub fn protect(mut self, prefix: impl Into<String>) -> Self {
        self.protected_prefixes.push(normalize(&prefix.into()).to_string());
        self
    }

    pub fn login_path(&self) -> &str {
        &self.login_path
    }

    /// Whether the gate has an opinion about `path` at all.
    pub fn matches(&self, path: &str) -> bool {
        let path = normalize(path);
        self.is_public(path) || self.is_protected(path)
    }

    /// Decide a request from its path and raw `Cookie` header.
    pub fn decide(&self, path: &str, cookie_header: Option<&str>) -> GateDecision {
        let path = normalize(path);
        if !self.matches(path) {
            return GateDecision::Next;
        }
        let signed_in = cookie_header.is_some_and(|header| self.has_auth_cookie(header));
        let public = self.is_public(path);
        let decision = match (public, signed_in) {
            (true, true) => GateDecision::Redirect(self.home_path.clone()),
            (false, false) => GateDecision::Redirect(self.login_path.clone()),
            _ => GateDecision::Next,
        };
        if let GateDecision::Redirect(target) = &decision {
            tracing::debug!(path, target = %target, "route gate redirect");
        }
        decision
    }

    /// Whether the `Cookie` header carries the auth cookie, whatever its value.
    pub fn has_auth_cookie(&self, cookie_header: &str) -> bool {
        cookie_header
            .split(';')
            .filter_map(|pair| pair.split_once('=').map(|(name, _)| name))
            .any(|name| name.trim() == self.cookie_name)
    }

    /// Client-side check for protected content.
    ///
    /// Denies when the session is not valid and tells the user why.
    pub fn guard(&self, store: &SessionStore, notifier: &dyn Notifier) -> Access {
        if store.is_valid() {
            return Access::Granted(store.current_user());
        }
        notifier.notify(Notice::destructive(
            "Authentication Required",
            "Please login to access this page",
        ));
        Access::Denied {
            redirect: self.login_path.clone(),
        }
    }

    fn is_public(&self, path: &str) -> bool {
        self.public_paths.iter().any(|p| p == path)
    }

    fn is_protected(&self, path: &str) -> bool {
        self.protected_prefixes.iter().any(|prefix| {
            path == prefix
                || path
                    .strip_prefix(prefix.as_str())
                    .is_some_and(|rest| rest.starts_with('/'))
        })
    }
}

fn normalize(path: &str) -> &str {
    let path = path.split(['?', '#']).next().unwrap_or(path);
    if path.len() > 1 {
        path.trim_end_matches('/')
    } else {
        path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::token::test_jwt;
    use crate::notice::NoticeLog;
    use chrono::Utc;
    use serde_json::json;

    const COOKIE: &str = "theme=dark; pb_auth=%7B%22token%22%3A%22x%22%7D";

    #[test]
    fn protected_paths_need_the_cookie() {
        let gate = RouteGate::new();
        assert_eq!(
            gate.decide("/dashboard", None),
            GateDecision::Redirect("/login".to_string())
        );
        assert_eq!(
            gate.decide("/dashboard/edit/abc", Some("theme=dark")),
            GateDecision::Redirect("/login".to_string())
        );
        assert_eq!(gate.decide("/dashboard/edit/abc", Some(COOKIE)), GateDecision::Next);
    }

    #[test]
    fn public_paths_bounce_signed_in_users() {
        let gate = RouteGate::new();
        assert_eq!(
            gate.decide("/login", Some(COOKIE)),
            GateDecision::Redirect("/dashboard".to_string())
        );
        assert_eq!(
            gate.decide("/register/", Some(COOKIE)),
            GateDecision::Redirect("/dashboard".to_string())
        );
        assert_eq!(gate.decide("/register", None), GateDecision::Next);
    }

    #[test]
    fn unmatched_paths_always_pass() {
        let gate = RouteGate::new();
        for path in ["/", "/blog/42", "/dashboards", "/profile"] {
            assert_eq!(gate.decide(path, None), GateDecision::Next, "{path}");
            assert!(!gate.matches(path));
        }
        assert!(gate.protect("/profile").matches("/profile?tab=1"));
    }

    #[test]
    fn cookie_name_must_match_exactly() {
        let gate = RouteGate::new();
        assert!(!gate.has_auth_cookie("pb_auth_old=1; other=2"));
        assert!(gate.has_auth_cookie("other=2;pb_auth="));
    }

    #[test]
    fn guard_checks_the_store() {
        let gate = RouteGate::new();
        let store = SessionStore::in_memory();
        let notices = NoticeLog::new();

        assert_eq!(
            gate.guard(&store, &notices),
            Access::Denied {
                redirect: "/login".to_string()
            }
        );
        assert_eq!(notices.titles(), vec!["Authentication Required"]);

        let token = test_jwt(json!({"id": "u1", "exp": Utc::now().timestamp() + 60}));
        store
            .save(token, Some(UserRecord::new("u1", "a@b.c")))
            .unwrap();
        assert!(gate.guard(&store, &notices).is_granted());
        assert_eq!(notices.notices().len(), 1);
    }
}

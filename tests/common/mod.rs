//! Shared test helpers: in-memory backend, scripted popups, token minting.
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use serde_json::{json, Value};

use quillpad::api::{
    ApiError, AuthResponse, FileUpload, ListOptions, ListResult, OAuth2Request, RecordApi,
};
use quillpad::auth::{AuthError, SessionStore, UserRecord};
use quillpad::notice::NoticeLog;
use quillpad::oauth::{OAuthCoordinator, OAuthTimings, PopupOpener, PopupRequest, PopupWindow};

pub const USERS: &str = "users";

/// Unsigned JWT with the given claims; the signature is never checked client-side.
pub fn jwt(claims: Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{header}.{payload}.sig")
}

/// Token for `user_id` that expires in an hour.
pub fn live_token(user_id: &str) -> String {
    jwt(json!({"id": user_id, "type": "auth", "exp": Utc::now().timestamp() + 3600}))
}

pub fn expired_token(user_id: &str) -> String {
    jwt(json!({"id": user_id, "type": "auth", "exp": Utc::now().timestamp() - 60}))
}

pub fn auth_response(user: &UserRecord) -> AuthResponse {
    AuthResponse {
        token: live_token(&user.id),
        record: Some(user.clone()),
        meta: None,
    }
}

pub fn status_error(status: u16, message: &str, data: Value) -> ApiError {
    ApiError::Status {
        status,
        message: message.to_string(),
        data,
    }
}

/// How one scripted OAuth2 handshake behaves.
pub struct OAuthScript {
    /// Delay before the authorization URL is handed to `before_open`.
    pub open_after: Duration,
    /// Delay until the provider redirects back, and the exchange result;
    /// `None` never answers.
    pub respond: Option<(Duration, Result<AuthResponse, ApiError>)>,
    /// How long the code exchange takes after the redirect.
    pub exchange_takes: Duration,
}

impl OAuthScript {
    pub fn never_answers() -> Self {
        Self {
            open_after: Duration::ZERO,
            respond: None,
            exchange_takes: Duration::ZERO,
        }
    }

    pub fn answers_after(delay: Duration, result: Result<AuthResponse, ApiError>) -> Self {
        Self {
            open_after: Duration::ZERO,
            respond: Some((delay, result)),
            exchange_takes: Duration::ZERO,
        }
    }

    /// Redirect after `delay`, then spend `exchange` swapping the code.
    pub fn redirects_after(
        delay: Duration,
        exchange: Duration,
        result: Result<AuthResponse, ApiError>,
    ) -> Self {
        Self {
            open_after: Duration::ZERO,
            respond: Some((delay, result)),
            exchange_takes: exchange,
        }
    }
}

/// In-memory stand-in for the record backend.
#[derive(Default)]
pub struct FakeRecordApi {
    records: Mutex<HashMap<String, Vec<Value>>>,
    passwords: Mutex<HashMap<String, String>>,
    oauth: Mutex<VecDeque<OAuthScript>>,
    calls: Mutex<Vec<String>>,
    next_id: AtomicUsize,
}

impl FakeRecordApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Seed a user that can sign in with `password`.
    pub fn add_user(&self, email: &str, password: &str) -> UserRecord {
        let id = self.fresh_id("u");
        let user = UserRecord::new(&id, email);
        let mut record = serde_json::to_value(&user).unwrap();
        record["collectionName"] = json!(USERS);
        self.records
            .lock()
            .unwrap()
            .entry(USERS.to_string())
            .or_default()
            .push(record.clone());
        self.passwords
            .lock()
            .unwrap()
            .insert(email.to_string(), password.to_string());
        serde_json::from_value(record).unwrap()
    }

    pub fn seed(&self, collection: &str, record: Value) {
        self.records
            .lock()
            .unwrap()
            .entry(collection.to_string())
            .or_default()
            .push(record);
    }

    pub fn script_oauth(&self, script: OAuthScript) {
        self.oauth.lock().unwrap().push_back(script);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn records(&self, collection: &str) -> Vec<Value> {
        self.records
            .lock()
            .unwrap()
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn fresh_id(&self, prefix: &str) -> String {
        format!("{prefix}{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
    }

    fn find(&self, collection: &str, id: &str) -> Option<Value> {
        self.records(collection)
            .into_iter()
            .find(|r| r["id"] == json!(id))
    }

    fn filtered(&self, collection: &str, options: &ListOptions) -> Vec<Value> {
        let mut items: Vec<Value> = self
            .records(collection)
            .into_iter()
            .filter(|r| options.filter.as_deref().map_or(true, |f| matches_filter(r, f)))
            .collect();
        if options.sort.as_deref() == Some("-created") {
            items.reverse();
        }
        items
    }
}

/// Understands `field = "value"` only.
fn matches_filter(record: &Value, filter: &str) -> bool {
    let Some((field, value)) = filter.split_once(" = ") else {
        return true;
    };
    record[field.trim()] == json!(value.trim().trim_matches('"'))
}

#[async_trait]
impl RecordApi for FakeRecordApi {
    async fn create(&self, collection: &str, data: Value) -> Result<Value, ApiError> {
        self.record(format!("create {collection}"));
        let mut record = data;
        if collection == USERS {
            let email = record["email"].as_str().unwrap_or_default().to_string();
            if self.passwords.lock().unwrap().contains_key(&email) {
                return Err(status_error(
                    400,
                    "Failed to create record.",
                    json!({"email": {"code": "validation_not_unique", "message": "Value must be unique."}}),
                ));
            }
            let password = record["password"].as_str().unwrap_or_default().to_string();
            self.passwords.lock().unwrap().insert(email, password);
            if let Some(fields) = record.as_object_mut() {
                fields.remove("password");
                fields.remove("passwordConfirm");
            }
            record["collectionName"] = json!(USERS);
        }
        let id = self.fresh_id("r");
        record["id"] = json!(id);
        record["created"] = json!(format!("2024-01-01 00:00:{:02}.000Z", self.next_id.load(Ordering::SeqCst)));
        self.seed(collection, record.clone());
        Ok(record)
    }

    async fn update(&self, collection: &str, id: &str, data: Value) -> Result<Value, ApiError> {
        self.record(format!("update {collection}/{id}"));
        let mut records = self.records.lock().unwrap();
        let entry = records
            .get_mut(collection)
            .and_then(|items| items.iter_mut().find(|r| r["id"] == json!(id)))
            .ok_or_else(|| status_error(404, "The requested resource wasn't found.", Value::Null))?;
        if let (Some(target), Some(patch)) = (entry.as_object_mut(), data.as_object()) {
            for (key, value) in patch {
                target.insert(key.clone(), value.clone());
            }
        }
        Ok(entry.clone())
    }

    async fn update_with_files(
        &self,
        collection: &str,
        id: &str,
        data: Value,
        files: Vec<FileUpload>,
    ) -> Result<Value, ApiError> {
        self.record(format!("update-with-files {collection}/{id}"));
        let mut records = self.records.lock().unwrap();
        let entry = records
            .get_mut(collection)
            .and_then(|items| items.iter_mut().find(|r| r["id"] == json!(id)))
            .ok_or_else(|| status_error(404, "The requested resource wasn't found.", Value::Null))?;
        if let (Some(target), Some(patch)) = (entry.as_object_mut(), data.as_object()) {
            for (key, value) in patch {
                target.insert(key.clone(), value.clone());
            }
        }
        // The backend stores uploads under a generated name; the original
        // name is close enough here.
        for file in files {
            entry[file.field.as_str()] = json!(file.file_name);
        }
        Ok(entry.clone())
    }

    async fn get_one(&self, collection: &str, id: &str) -> Result<Value, ApiError> {
        self.record(format!("get {collection}/{id}"));
        self.find(collection, id)
            .ok_or_else(|| status_error(404, "The requested resource wasn't found.", Value::Null))
    }

    async fn get_list(
        &self,
        collection: &str,
        page: u32,
        per_page: u32,
        options: &ListOptions,
    ) -> Result<ListResult<Value>, ApiError> {
        self.record(format!("list {collection}"));
        let all = self.filtered(collection, options);
        let total = all.len() as i64;
        let items = all
            .into_iter()
            .skip(((page - 1) * per_page) as usize)
            .take(per_page as usize)
            .collect();
        Ok(ListResult {
            page,
            per_page,
            total_items: total,
            total_pages: (total + per_page as i64 - 1) / per_page as i64,
            items,
        })
    }

    async fn get_full_list(
        &self,
        collection: &str,
        options: &ListOptions,
    ) -> Result<Vec<Value>, ApiError> {
        self.record(format!("full-list {collection}"));
        Ok(self.filtered(collection, options))
    }

    async fn auth_with_password(
        &self,
        collection: &str,
        identity: &str,
        password: &str,
    ) -> Result<AuthResponse, ApiError> {
        self.record(format!("auth-with-password {collection}"));
        let known = self.passwords.lock().unwrap().get(identity).cloned();
        if known.as_deref() != Some(password) {
            return Err(status_error(400, "Failed to authenticate.", json!({})));
        }
        let record = self
            .records(collection)
            .into_iter()
            .find(|r| r["email"] == json!(identity))
            .ok_or_else(|| status_error(400, "Failed to authenticate.", json!({})))?;
        let user: UserRecord = serde_json::from_value(record)?;
        Ok(auth_response(&user))
    }

    async fn auth_with_oauth2(
        &self,
        collection: &str,
        request: OAuth2Request,
    ) -> Result<AuthResponse, ApiError> {
        self.record(format!("auth-with-oauth2 {collection} {}", request.provider));
        let script = self
            .oauth
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(OAuthScript::never_answers);
        tokio::time::sleep(script.open_after).await;
        (request.before_open)(format!(
            "https://idp.example.com/auth?provider={}&state=client-1",
            request.provider
        ));
        match script.respond {
            Some((delay, result)) => {
                tokio::time::sleep(delay).await;
                if let Some(on_redirect) = request.on_redirect {
                    on_redirect();
                }
                if !script.exchange_takes.is_zero() {
                    tokio::time::sleep(script.exchange_takes).await;
                }
                result
            }
            None => futures::future::pending().await,
        }
    }
}

/// A popup the test can close, as a user would.
#[derive(Debug, Default)]
pub struct FakePopup {
    closed: AtomicBool,
    close_calls: AtomicUsize,
}

impl FakePopup {
    /// Close the popup from the user's side.
    pub fn user_close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }
}

impl PopupWindow for FakePopup {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn close(&self) {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct FakeOpener {
    requests: Mutex<Vec<PopupRequest>>,
    popups: Mutex<Vec<Arc<FakePopup>>>,
    blocked: AtomicBool,
}

impl FakeOpener {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make every open fail, as a popup blocker would.
    pub fn block(&self) {
        self.blocked.store(true, Ordering::SeqCst);
    }

    pub fn opened(&self) -> usize {
        self.popups.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<PopupRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn last(&self) -> Option<Arc<FakePopup>> {
        self.popups.lock().unwrap().last().cloned()
    }
}

impl PopupOpener for FakeOpener {
    fn open(&self, request: &PopupRequest) -> Result<Arc<dyn PopupWindow>, AuthError> {
        if self.blocked.load(Ordering::SeqCst) {
            return Err(AuthError::Unsupported("popups are blocked".to_string()));
        }
        self.requests.lock().unwrap().push(request.clone());
        let popup = Arc::new(FakePopup::default());
        self.popups.lock().unwrap().push(popup.clone());
        Ok(popup)
    }
}

/// Everything an OAuth test needs, sharing one session store.
pub struct Harness {
    pub api: Arc<FakeRecordApi>,
    pub store: Arc<SessionStore>,
    pub opener: Arc<FakeOpener>,
    pub notices: Arc<NoticeLog>,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            api: FakeRecordApi::new(),
            store: Arc::new(SessionStore::in_memory()),
            opener: FakeOpener::new(),
            notices: Arc::new(NoticeLog::new()),
        }
    }

    pub fn coordinator(&self) -> Arc<OAuthCoordinator> {
        self.coordinator_with(OAuthTimings::default())
    }

    pub fn coordinator_with(&self, timings: OAuthTimings) -> Arc<OAuthCoordinator> {
        Arc::new(
            OAuthCoordinator::new(
                self.api.clone(),
                self.store.clone(),
                self.opener.clone(),
                self.notices.clone(),
            )
            .with_timings(timings),
        )
    }
}

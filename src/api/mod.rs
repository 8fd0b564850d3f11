//! Record backend interface and its PocketBase HTTP implementation.

pub mod error;
pub mod http;
mod realtime;

pub use error::ApiError;
pub use http::PocketBaseClient;

use async_trait::async_trait;
use bon::Builder;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::auth::record::UserRecord;

/// Hook that receives the provider authorization URL once the handshake is
/// ready for the user, typically to open a popup window.
pub type BeforeOpen = Box<dyn FnOnce(String) + Send>;

/// Hook fired once the provider has redirected back with a code, before
/// the code is exchanged for a session.
pub type OnRedirect = Box<dyn FnOnce() + Send>;

/// Filter and sort options for list queries.
#[derive(Debug, Clone, Default, Builder)]
pub struct ListOptions {
    #[builder(into)]
    pub filter: Option<String>,
    #[builder(into)]
    pub sort: Option<String>,
}

/// One page of records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListResult<T> {
    pub page: u32,
    pub per_page: u32,
    #[serde(default)]
    pub total_items: i64,
    #[serde(default)]
    pub total_pages: i64,
    pub items: Vec<T>,
}

impl ListResult<Value> {
    /// Decode every item into `T`.
    pub fn decode<T: DeserializeOwned>(self) -> Result<ListResult<T>, ApiError> {
        let items = self
            .items
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<T>, _>>()?;
        Ok(ListResult {
            page: self.page,
            per_page: self.per_page,
            total_items: self.total_items,
            total_pages: self.total_pages,
            items,
        })
    }
}

/// A file sent with a record write, for file fields such as `avatar`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileUpload {
    /// Record field the file belongs to.
    pub field: String,
    pub file_name: String,
    /// MIME type; the backend sniffs the content when absent.
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl FileUpload {
    pub fn new(field: impl Into<String>, file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            field: field.into(),
            file_name: file_name.into(),
            content_type: None,
            bytes,
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

/// Successful password or OAuth2 authentication.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthResponse {
    pub token: String,
    #[serde(default)]
    pub record: Option<UserRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

/// Parameters of an OAuth2 sign-in.
pub struct OAuth2Request {
    pub provider: String,
    /// Extra fields for the user record when the sign-in creates one.
    pub create_data: Option<Value>,
    pub before_open: BeforeOpen,
    pub on_redirect: Option<OnRedirect>,
}

impl OAuth2Request {
    pub fn new(provider: impl Into<String>, before_open: BeforeOpen) -> Self {
        Self {
            provider: provider.into(),
            create_data: None,
            before_open,
            on_redirect: None,
        }
    }

    pub fn with_create_data(mut self, create_data: Option<Value>) -> Self {
        self.create_data = create_data;
        self
    }

    pub fn with_on_redirect(mut self, on_redirect: OnRedirect) -> Self {
        self.on_redirect = Some(on_redirect);
        self
    }
}

impl std::fmt::Debug for OAuth2Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuth2Request")
            .field("provider", &self.provider)
            .field("create_data", &self.create_data)
            .field("before_open", &"..")
            .field("on_redirect", &self.on_redirect.is_some())
            .finish()
    }
}

/// The backend-as-a-service as seen by this crate.
#[async_trait]
pub trait RecordApi: Send + Sync {
    async fn create(&self, collection: &str, data: Value) -> Result<Value, ApiError>;

    async fn update(&self, collection: &str, id: &str, data: Value) -> Result<Value, ApiError>;

    /// Update a record together with file fields, sent as one multipart body.
    async fn update_with_files(
        &self,
        collection: &str,
        id: &str,
        data: Value,
        files: Vec<FileUpload>,
    ) -> Result<Value, ApiError>;

    async fn get_one(&self, collection: &str, id: &str) -> Result<Value, ApiError>;

    async fn get_list(
        &self,
        collection: &str,
        page: u32,
        per_page: u32,
        options: &ListOptions,
    ) -> Result<ListResult<Value>, ApiError>;

    async fn get_full_list(
        &self,
        collection: &str,
        options: &ListOptions,
    ) -> Result<Vec<Value>, ApiError>;

    async fn auth_with_password(
        &self,
        collection: &str,
        identity: &str,
        password: &str,
    ) -> Result<AuthResponse, ApiError>;

    /// Run a full OAuth2 sign-in. `request.before_open` is called with the
    /// authorization URL and `request.on_redirect` once the provider has
    /// redirected back with a code. The future completes after the code
    /// exchange, or fails.
    async fn auth_with_oauth2(
        &self,
        collection: &str,
        request: OAuth2Request,
    ) -> Result<AuthResponse, ApiError>;
}

/// Quote a value for use inside a filter expression.
pub fn quote_filter_value(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

/// `field = "value"` with the value quoted.
pub fn filter_eq(field: &str, value: &str) -> String {
    format!("{field} = {}", quote_filter_value(value))
}

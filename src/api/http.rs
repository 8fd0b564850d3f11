//! reqwest-backed [`RecordApi`] for a PocketBase server.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::multipart::{Form, Part};
use reqwest::{Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use super::error::ApiError;
use super::{AuthResponse, FileUpload, ListOptions, ListResult, OAuth2Request, RecordApi};
use crate::auth::store::SessionStore;

/// Page size used when walking a whole collection.
const FULL_LIST_BATCH: u32 = 500;

/// HTTP client for the PocketBase REST API.
///
/// When a [`SessionStore`] is attached, its token is sent as the
/// `Authorization` header on every request.
///
/// # Example
/// ```no_run
/// use quillpad::api::{ListOptions, PocketBaseClient, RecordApi};
///
/// # async fn example() -> Result<(), quillpad::api::ApiError> {
/// let client = PocketBaseClient::new("http://127.0.0.1:8090");
/// let posts = client
///     .get_full_list("Blogs", &ListOptions::builder().sort("-created").build())
///     .await?;
/// println!("{} posts", posts.len());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct PocketBaseClient {
    client: reqwest::Client,
    base_url: String,
    session: Option<Arc<SessionStore>>,
}

impl PocketBaseClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();
        Self::with_http_client(base_url, client)
    }

    pub fn with_http_client(base_url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            session: None,
        }
    }

    pub fn with_session(mut self, session: Arc<SessionStore>) -> Self {
        self.session = Some(session);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.client
    }

    fn records_path(collection: &str) -> String {
        format!(
            "/api/collections/{}/records",
            urlencoding::encode(collection)
        )
    }

    pub(crate) fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, self.url(path))
            .headers(self.default_headers())
    }

    fn default_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        let token = self.session.as_ref().and_then(|s| s.token());
        if let Some(token) = token {
            if let Ok(value) = HeaderValue::from_str(&token) {
                headers.insert(AUTHORIZATION, value);
            }
        }
        headers
    }

    pub(crate) async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, ApiError> {
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::from_body(status.as_u16(), &body));
        }
        Ok(response.json::<T>().await?)
    }

    pub(crate) async fn send_empty(&self, request: RequestBuilder) -> Result<(), ApiError> {
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::from_body(status.as_u16(), &body));
        }
        Ok(())
    }
}

/// Multipart body: plain fields as text parts, files as file parts.
fn multipart_form(data: Value, files: Vec<FileUpload>) -> Result<Form, ApiError> {
    let mut form = Form::new();
    if let Value::Object(fields) = data {
        for (key, value) in fields {
            let text = match value {
                Value::String(text) => text,
                Value::Null => String::new(),
                other => other.to_string(),
            };
            form = form.text(key, text);
        }
    }
    for file in files {
        let mut part = Part::bytes(file.bytes).file_name(file.file_name);
        if let Some(content_type) = file.content_type.as_deref() {
            part = part.mime_str(content_type)?;
        }
        form = form.part(file.field, part);
    }
    Ok(form)
}

fn list_query(page: u32, per_page: u32, options: &ListOptions) -> Vec<(&'static str, String)> {
    let mut query = vec![("page", page.to_string()), ("perPage", per_page.to_string())];
    if let Some(filter) = options.filter.as_deref().filter(|f| !f.is_empty()) {
        query.push(("filter", filter.to_string()));
    }
    if let Some(sort) = options.sort.as_deref().filter(|s| !s.is_empty()) {
        query.push(("sort", sort.to_string()));
    }
    query
}

#[async_trait]
impl RecordApi for PocketBaseClient {
    async fn create(&self, collection: &str, data: Value) -> Result<Value, ApiError> {
        tracing::debug!(collection, "create record");
        let request = self
            .request(Method::POST, &Self::records_path(collection))
            .json(&data);
        self.send_json(request).await
    }

    async fn update(&self, collection: &str, id: &str, data: Value) -> Result<Value, ApiError> {
        tracing::debug!(collection, id, "update record");
        let path = format!("{}/{}", Self::records_path(collection), urlencoding::encode(id));
        let request = self.request(Method::PATCH, &path).json(&data);
        self.send_json(request).await
    }

    async fn update_with_files(
        &self,
        collection: &str,
        id: &str,
        data: Value,
        files: Vec<FileUpload>,
    ) -> Result<Value, ApiError> {
        tracing::debug!(collection, id, files = files.len(), "update record with files");
        let path = format!("{}/{}", Self::records_path(collection), urlencoding::encode(id));
        let request = self
            .request(Method::PATCH, &path)
            .multipart(multipart_form(data, files)?);
        self.send_json(request).await
    }

    async fn get_one(&self, collection: &str, id: &str) -> Result<Value, ApiError> {
        let path = format!("{}/{}", Self::records_path(collection), urlencoding::encode(id));
        self.send_json(self.request(Method::GET, &path)).await
    }

    async fn get_list(
        &self,
        collection: &str,
        page: u32,
        per_page: u32,
        options: &ListOptions,
    ) -> Result<ListResult<Value>, ApiError> {
        let request = self
            .request(Method::GET, &Self::records_path(collection))
            .query(&list_query(page, per_page, options));
        self.send_json(request).await
    }

    async fn get_full_list(
        &self,
        collection: &str,
        options: &ListOptions,
    ) -> Result<Vec<Value>, ApiError> {
        let mut items = Vec::new();
        let mut page = 1;
        loop {
            let mut query = list_query(page, FULL_LIST_BATCH, options);
            query.push(("skipTotal", "1".to_string()));
            let request = self
                .request(Method::GET, &Self::records_path(collection))
                .query(&query);
            let batch: ListResult<Value> = self.send_json(request).await?;
            let fetched = batch.items.len();
            items.extend(batch.items);
            if fetched < FULL_LIST_BATCH as usize {
                break;
            }
            page += 1;
        }
        tracing::debug!(collection, count = items.len(), "fetched full list");
        Ok(items)
    }

    async fn auth_with_password(
        &self,
        collection: &str,
        identity: &str,
        password: &str,
    ) -> Result<AuthResponse, ApiError> {
        let path = format!(
            "/api/collections/{}/auth-with-password",
            urlencoding::encode(collection)
        );
        let request = self
            .request(Method::POST, &path)
            .json(&json!({ "identity": identity, "password": password }));
        self.send_json(request).await
    }

    async fn auth_with_oauth2(
        &self,
        collection: &str,
        request: OAuth2Request,
    ) -> Result<AuthResponse, ApiError> {
        super::realtime::oauth2_sign_in(self, collection, request).await
    }
}

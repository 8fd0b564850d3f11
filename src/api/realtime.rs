//! OAuth2 sign-in over the backend's realtime (SSE) channel.
//!
//! The backend redirects the provider back to `/api/oauth2-redirect`, which
//! publishes `{state, code, error}` on the `@oauth2` topic of the realtime
//! client whose id was used as the `state` parameter.

use std::time::Duration;

use eventsource_stream::Eventsource;
use futures::StreamExt;
use reqwest::header::ACCEPT;
use reqwest::Method;
use serde::Deserialize;
use serde_json::json;

use super::error::ApiError;
use super::http::PocketBaseClient;
use super::{AuthResponse, OAuth2Request};

const CONNECT_EVENT: &str = "PB_CONNECT";
const OAUTH2_TOPIC: &str = "@oauth2";
/// Upper bound on how long the realtime stream stays open for one sign-in.
const REALTIME_TIMEOUT: Duration = Duration::from_secs(15 * 60);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConnectPayload {
    client_id: String,
}

#[derive(Debug, Default, Deserialize)]
struct RedirectPayload {
    #[serde(default)]
    state: String,
    #[serde(default)]
    code: String,
    #[serde(default)]
    error: String,
}

#[derive(Debug, Default, Deserialize)]
struct AuthMethods {
    #[serde(default)]
    oauth2: OAuth2Methods,
    #[serde(default, rename = "authProviders")]
    legacy_providers: Vec<ProviderInfo>,
}

#[derive(Debug, Default, Deserialize)]
struct OAuth2Methods {
    #[serde(default)]
    providers: Vec<ProviderInfo>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ProviderInfo {
    pub name: String,
    #[serde(rename = "authURL", alias = "authUrl")]
    pub auth_url: String,
    #[serde(default)]
    pub code_verifier: String,
}

pub(crate) async fn oauth2_sign_in(
    client: &PocketBaseClient,
    collection: &str,
    request: OAuth2Request,
) -> Result<AuthResponse, ApiError> {
    let collection_path = format!("/api/collections/{}", urlencoding::encode(collection));
    let methods: AuthMethods = client
        .send_json(client.request(Method::GET, &format!("{collection_path}/auth-methods")))
        .await?;
    let provider = find_provider(methods, &request.provider)?;

    let response = client
        .http()
        .get(client.url("/api/realtime"))
        .header(ACCEPT, "text/event-stream")
        .timeout(REALTIME_TIMEOUT)
        .send()
        .await?;
    if !response.status().is_success() {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        return Err(ApiError::from_body(status, &body));
    }
    let mut events = Box::pin(response.bytes_stream().eventsource());

    let client_id = loop {
        match events.next().await {
            Some(Ok(event)) if event.event == CONNECT_EVENT => {
                let payload: ConnectPayload = serde_json::from_str(&event.data)?;
                break payload.client_id;
            }
            Some(Ok(_)) => continue,
            Some(Err(err)) => return Err(ApiError::OAuth2(format!("realtime stream: {err}"))),
            None => return Err(ApiError::OAuth2("realtime stream closed".to_string())),
        }
    };
    tracing::debug!(provider = %provider.name, %client_id, "realtime connected");

    client
        .send_empty(client.request(Method::POST, "/api/realtime").json(&json!({
            "clientId": client_id,
            "subscriptions": [OAUTH2_TOPIC],
        })))
        .await?;

    let redirect_url = client.url("/api/oauth2-redirect");
    let auth_url = authorization_url(&provider.auth_url, &redirect_url, &client_id)?;
    (request.before_open)(auth_url);

    let redirect = loop {
        match events.next().await {
            Some(Ok(event)) if event.event == OAUTH2_TOPIC => {
                break serde_json::from_str::<RedirectPayload>(&event.data)?;
            }
            Some(Ok(_)) => continue,
            Some(Err(err)) => return Err(ApiError::OAuth2(format!("realtime stream: {err}"))),
            None => return Err(ApiError::OAuth2("realtime stream closed".to_string())),
        }
    };
    drop(events);

    if !redirect.error.is_empty() {
        return Err(ApiError::OAuth2(redirect.error));
    }
    if redirect.state != client_id {
        return Err(ApiError::OAuth2("state parameters don't match".to_string()));
    }
    if redirect.code.is_empty() {
        return Err(ApiError::OAuth2("missing authorization code".to_string()));
    }
    if let Some(on_redirect) = request.on_redirect {
        on_redirect();
    }

    let mut body = json!({
        "provider": provider.name,
        "code": redirect.code,
        "codeVerifier": provider.code_verifier,
        "redirectURL": redirect_url,
    });
    if let Some(create_data) = request.create_data {
        body["createData"] = create_data;
    }
    client
        .send_json(
            client
                .request(Method::POST, &format!("{collection_path}/auth-with-oauth2"))
                .json(&body),
        )
        .await
}

fn find_provider(methods: AuthMethods, name: &str) -> Result<ProviderInfo, ApiError> {
    methods
        .oauth2
        .providers
        .into_iter()
        .chain(methods.legacy_providers)
        .find(|p| p.name == name)
        .ok_or_else(|| ApiError::OAuth2(format!("missing or invalid provider \"{name}\"")))
}

/// Provider URL with our redirect target and realtime client id as `state`.
pub(crate) fn authorization_url(
    provider_auth_url: &str,
    redirect_url: &str,
    client_id: &str,
) -> Result<String, ApiError> {
    let raw = format!("{provider_auth_url}{}", urlencoding::encode(redirect_url));
    let mut url = reqwest::Url::parse(&raw)
        .map_err(|err| ApiError::OAuth2(format!("invalid provider auth url: {err}")))?;
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| key != "state")
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();
    url.query_pairs_mut()
        .clear()
        .extend_pairs(pairs)
        .append_pair("state", client_id);
    Ok(url.to_string())
}

use crate::cache::CanonicalSnapshot;
use crate::models::{Block, Link, LinkGroup, Page};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ApiErrorKind {
    Unauthorized,
    /// No response at all (offline, DNS, CORS, aborted).
    Network,
    /// The server answered with a failure status or a `success: false` envelope.
    Http,
    /// A success response whose body did not decode.
    Parse,
}

#[derive(Clone, Debug)]
pub struct ApiError {
    pub kind: ApiErrorKind,
    pub message: String,
    /// Message the server put in its error body, shown to the user verbatim.
    pub server_message: Option<String>,
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ApiError {}

impl ApiError {
    pub fn new(kind: ApiErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            server_message: None,
        }
    }

    /// A structured rejection carrying the server's own message.
    pub fn rejected(server_message: impl Into<String>) -> Self {
        let server_message = server_message.into();
        Self {
            kind: ApiErrorKind::Http,
            message: server_message.clone(),
            server_message: Some(server_message),
        }
    }

    fn network(e: reqwest::Error) -> Self {
        Self::new(ApiErrorKind::Network, e.to_string())
    }

    fn parse(e: impl std::fmt::Display) -> Self {
        Self::new(ApiErrorKind::Parse, e.to_string())
    }

    fn unauthorized() -> Self {
        Self::new(ApiErrorKind::Unauthorized, "Unauthorized")
    }

    fn http(status: reqwest::StatusCode, body: String, ctx: &str) -> Self {
        let server_message = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|v| server_message(&v));
        Self {
            kind: ApiErrorKind::Http,
            message: server_message
                .clone()
                .unwrap_or_else(|| format!("{ctx} ({status}): {body}")),
            server_message,
        }
    }

    /// Transport-level failure: nothing reached or came back from the server.
    pub fn is_transport(&self) -> bool {
        matches!(self.kind, ApiErrorKind::Network | ApiErrorKind::Parse)
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Extract `error.message` (or a bare `error` string) from a response body.
pub(crate) fn server_message(body: &serde_json::Value) -> Option<String> {
    let err = body.get("error")?;
    err.get("message")
        .and_then(|m| m.as_str())
        .or_else(|| err.as_str())
        .map(|s| s.to_string())
        .filter(|s| !s.trim().is_empty())
}

/// Responses are observed both bare and wrapped as `{ success, data, error }`.
pub(crate) fn unwrap_envelope(data: serde_json::Value) -> ApiResult<serde_json::Value> {
    match data {
        serde_json::Value::Object(mut map) if map.contains_key("success") => {
            if map.get("success").and_then(|v| v.as_bool()) == Some(false) {
                let body = serde_json::Value::Object(map);
                return Err(match server_message(&body) {
                    Some(msg) => ApiError::rejected(msg),
                    None => ApiError::new(ApiErrorKind::Http, "Request failed"),
                });
            }
            Ok(map
                .remove("data")
                .filter(|v| !v.is_null())
                .unwrap_or_else(|| serde_json::json!({})))
        }
        other => Ok(other),
    }
}

pub const API_URL_ENV: &str = "LINKPAGE_API_URL";

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct EnvConfig {
    pub api_url: String,
}

impl EnvConfig {
    pub const DEFAULT_API_URL: &'static str = "http://localhost:8080";

    pub fn new() -> Self {
        let api_url = Self::runtime_api_url()
            .unwrap_or_else(|| Self::DEFAULT_API_URL.to_string());
        Self { api_url }
    }

    // We support BOTH `window.ENV.API_URL` (documented) and `window.ENV.api_url`
    // (legacy) for compatibility.
    #[cfg(target_arch = "wasm32")]
    fn runtime_api_url() -> Option<String> {
        let window = web_sys::window()?;
        let env = window.get("ENV")?;
        if env.is_undefined() || !env.is_object() {
            return None;
        }

        ["API_URL", "api_url"].into_iter().find_map(|k| {
            js_sys::Reflect::get(&env, &k.into())
                .ok()
                .and_then(|v| v.as_string())
        })
    }

    #[cfg(not(target_arch = "wasm32"))]
    fn runtime_api_url() -> Option<String> {
        std::env::var(API_URL_ENV)
            .ok()
            .filter(|s| !s.trim().is_empty())
    }
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self::new()
    }
}

fn is_false(b: &bool) -> bool {
    !*b
}

/// One entity in a save diff: the full (overlaid) entity, flagged when it is a delete.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct DiffEntry<T> {
    #[serde(flatten)]
    pub entity: T,
    #[serde(default, skip_serializing_if = "is_false")]
    pub delete: bool,
}

impl<T> DiffEntry<T> {
    pub fn upsert(entity: T) -> Self {
        Self {
            entity,
            delete: false,
        }
    }

    pub fn delete(entity: T) -> Self {
        Self {
            entity,
            delete: true,
        }
    }
}

/// Body of `POST /api/pages/{id}/save`.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct SaveRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<Page>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub blocks: Vec<DiffEntry<Block>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub link_groups: Vec<DiffEntry<LinkGroup>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub links: Vec<DiffEntry<Link>>,
}

impl SaveRequest {
    pub fn is_empty(&self) -> bool {
        self.page.is_none()
            && self.blocks.is_empty()
            && self.link_groups.is_empty()
            && self.links.is_empty()
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct SaveResponse {
    #[serde(default)]
    pub updated_at: Option<String>,
}

/// The page endpoints the editing core talks to.
///
/// Futures are awaited on the single UI thread and need not be `Send`.
#[allow(async_fn_in_trait)]
pub trait PageApi {
    /// `GET /api/pages/{id}/draft`
    async fn fetch_draft(&self, page_id: i64) -> ApiResult<CanonicalSnapshot>;

    /// `POST /api/pages/{id}/save`
    async fn save_draft(&self, page_id: i64, req: &SaveRequest) -> ApiResult<SaveResponse>;

    /// `POST /api/pages/{id}/publish` with an empty body.
    async fn publish(&self, page_id: i64) -> ApiResult<SaveResponse>;
}

/// reqwest client for the page endpoints.
///
/// Authentication is the session cookie the API sets on login; in the browser every
/// request is sent with credentials so that cookie goes along.
#[derive(Clone, Debug)]
pub struct ApiClient {
    pub(crate) base_url: String,
}

impl ApiClient {
    pub fn new(base_url: String) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn from_env() -> Self {
        Self::new(EnvConfig::new().api_url)
    }

    async fn request_api<T: serde::de::DeserializeOwned>(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Option<&impl Serialize>,
    ) -> ApiResult<T> {
        let client = reqwest::Client::new();
        let url = format!("{}{}", self.base_url, path);
        let mut req = client.request(method, url);
        #[cfg(target_arch = "wasm32")]
        {
            req = req.fetch_credentials_include();
        }

        if let Some(b) = body {
            req = req.json(b);
        }

        let res = req.send().await.map_err(ApiError::network)?;

        let status = res.status();
        if status.is_success() {
            let data: serde_json::Value = res.json().await.map_err(ApiError::parse)?;
            serde_json::from_value(unwrap_envelope(data)?).map_err(ApiError::parse)
        } else if status.as_u16() == 401 {
            Err(ApiError::unauthorized())
        } else {
            let body = res.text().await.unwrap_or_default();
            Err(ApiError::http(status, body, "Request failed"))
        }
    }
}

impl PageApi for ApiClient {
    async fn fetch_draft(&self, page_id: i64) -> ApiResult<CanonicalSnapshot> {
        self.request_api(
            reqwest::Method::GET,
            &format!("/api/pages/{page_id}/draft"),
            None::<&()>,
        )
        .await
    }

    async fn save_draft(&self, page_id: i64, req: &SaveRequest) -> ApiResult<SaveResponse> {
        self.request_api(
            reqwest::Method::POST,
            &format!("/api/pages/{page_id}/save"),
            Some(req),
        )
        .await
    }

    async fn publish(&self, page_id: i64) -> ApiResult<SaveResponse> {
        self.request_api(
            reqwest::Method::POST,
            &format!("/api/pages/{page_id}/publish"),
            Some(&serde_json::json!({})),
        )
        .await
    }
}

//! Replayable request descriptions and buffered responses.
//!
//! A `reqwest::RequestBuilder` is consumed when sent, so the transport keeps
//! the request as plain data and rebuilds it for the replay that follows a
//! credential renewal.

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use uuid::Uuid;

/// Header carrying the per-request correlation id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Header carrying the refresh-credential identifier.
pub const REFRESH_TOKEN_ID_HEADER: &str = "x-refresh-token-id";

/// Header the backend sets while maintenance mode is on.
pub const MAINTENANCE_HEADER: &str = "x-maintenance-mode";

/// File attached to a multipart request.
#[derive(Debug, Clone)]
pub struct Attachment {
    pub file_name: String,
    pub mime_type: Option<String>,
    pub bytes: Vec<u8>,
}

/// Request payload.
#[derive(Debug, Clone, Default)]
pub enum RequestBody {
    #[default]
    Empty,
    Json(serde_json::Value),
    Multipart {
        fields: Vec<(String, String)>,
        files: Vec<(String, Attachment)>,
    },
}

/// A request that can be issued more than once.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub(crate) method: Method,
    pub(crate) path: String,
    pub(crate) query: Vec<(String, String)>,
    pub(crate) body: RequestBody,
    pub(crate) headers: Vec<(HeaderName, HeaderValue)>,
    pub(crate) authenticated: bool,
    pub(crate) request_id: Uuid,
}

impl ApiRequest {
    /// Describe a request to `path`, relative to the API base URL.
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        let path = path.into();
        Self {
            method,
            path: path.trim_start_matches('/').to_string(),
            query: Vec::new(),
            body: RequestBody::Empty,
            headers: Vec::new(),
            authenticated: true,
            request_id: Uuid::new_v4(),
        }
    }

    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    #[must_use]
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    #[must_use]
    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    #[must_use]
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    #[must_use]
    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    /// Append a query parameter. Encoding happens when the URL is built.
    #[must_use]
    pub fn query(mut self, name: &str, value: impl ToString) -> Self {
        self.query.push((name.to_string(), value.to_string()));
        self
    }

    /// Attach a JSON body.
    #[must_use]
    pub fn json(mut self, body: serde_json::Value) -> Self {
        self.body = RequestBody::Json(body);
        self
    }

    /// Attach a multipart form body.
    #[must_use]
    pub fn multipart(
        mut self,
        fields: Vec<(String, String)>,
        files: Vec<(String, Attachment)>,
    ) -> Self {
        self.body = RequestBody::Multipart { fields, files };
        self
    }

    /// Add a header. Values that are not valid header text are dropped.
    #[must_use]
    pub fn header(mut self, name: &'static str, value: &str) -> Self {
        if let Ok(value) = HeaderValue::from_str(value) {
            self.headers.push((HeaderName::from_static(name), value));
        }
        self
    }

    /// Send without a bearer credential and without renewal on 401.
    ///
    /// Used for the login and renewal endpoints, where a 401 means the
    /// submitted credentials are wrong.
    #[must_use]
    pub const fn anonymous(mut self) -> Self {
        self.authenticated = false;
        self
    }

    /// HTTP method.
    #[must_use]
    pub const fn method(&self) -> &Method {
        &self.method
    }

    /// Path relative to the API base URL.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Correlation id, shared by the original attempt and its replay.
    #[must_use]
    pub const fn request_id(&self) -> Uuid {
        self.request_id
    }
}

/// A fully-read HTTP response.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

#[derive(Deserialize)]
struct MaintenancePayload {
    #[serde(default)]
    maintenance: bool,
    #[serde(default)]
    message: Option<String>,
}

impl ApiResponse {
    /// Parse the body as JSON, or `Value::Null` when it is empty or not JSON.
    #[must_use]
    pub fn json_value(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).unwrap_or(serde_json::Value::Null)
    }

    /// Message of the reserved maintenance signal, if this response carries it.
    ///
    /// The signal is either the `X-Maintenance-Mode: on` header or a 503 whose
    /// body is `{"maintenance": true, ...}`.
    #[must_use]
    pub fn maintenance_message(&self) -> Option<String> {
        let payload = serde_json::from_slice::<MaintenancePayload>(&self.body).ok();
        let message = || {
            payload
                .as_ref()
                .and_then(|p| p.message.clone())
                .unwrap_or_default()
        };

        let header_on = self
            .headers
            .get(MAINTENANCE_HEADER)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.eq_ignore_ascii_case("on") || v == "1" || v == "true");
        if header_on {
            return Some(message());
        }

        if self.status == StatusCode::SERVICE_UNAVAILABLE
            && payload.as_ref().is_some_and(|p| p.maintenance)
        {
            return Some(message());
        }
        None
    }

    /// Best-effort human-readable error text from the body.
    ///
    /// Looks at `message`, then `error`, then `errors` (array entries or
    /// object values joined with `"; "`), and falls back to the status reason.
    #[must_use]
    pub fn error_message(&self) -> String {
        extract_message(&self.json_value()).unwrap_or_else(|| {
            self.status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string()
        })
    }
}

fn extract_message(body: &serde_json::Value) -> Option<String> {
    use serde_json::Value;

    fn text(value: &Value) -> Option<String> {
        match value {
            Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
            Value::Object(map) => map
                .get("msg")
                .or_else(|| map.get("message"))
                .and_then(text),
            Value::Array(items) => {
                let parts: Vec<String> = items.iter().filter_map(text).collect();
                (!parts.is_empty()).then(|| parts.join("; "))
            }
            _ => None,
        }
    }

    let object = body.as_object()?;
    if let Some(message) = object.get("message").and_then(text) {
        return Some(message);
    }
    if let Some(error) = object.get("error").and_then(text) {
        return Some(error);
    }
    match object.get("errors")? {
        Value::Object(map) => {
            let parts: Vec<String> = map.values().filter_map(text).collect();
            (!parts.is_empty()).then(|| parts.join("; "))
        }
        other => text(other),
    }
}

//! Request configuration.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde::Serialize;

use crate::error::Result;
use crate::form::{FieldValue, FormData};

/// HTTP request methods.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    /// HTTP GET method.
    #[default]
    Get,
    /// HTTP POST method.
    Post,
    /// HTTP PUT method.
    Put,
    /// HTTP DELETE method.
    Delete,
    /// HTTP PATCH method.
    Patch,
    /// HTTP HEAD method.
    Head,
    /// HTTP OPTIONS method.
    Options,
}

impl HttpMethod {
    /// Convert to reqwest method.
    pub(crate) fn to_reqwest(self) -> reqwest::Method {
        match self {
            Self::Get => reqwest::Method::GET,
            Self::Post => reqwest::Method::POST,
            Self::Put => reqwest::Method::PUT,
            Self::Delete => reqwest::Method::DELETE,
            Self::Patch => reqwest::Method::PATCH,
            Self::Head => reqwest::Method::HEAD,
            Self::Options => reqwest::Method::OPTIONS,
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Get => write!(f, "GET"),
            Self::Post => write!(f, "POST"),
            Self::Put => write!(f, "PUT"),
            Self::Delete => write!(f, "DELETE"),
            Self::Patch => write!(f, "PATCH"),
            Self::Head => write!(f, "HEAD"),
            Self::Options => write!(f, "OPTIONS"),
        }
    }
}

/// Authentication credentials for a request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Authentication {
    /// HTTP Basic authentication.
    Basic {
        /// Username.
        username: String,
        /// Password (optional).
        password: Option<String>,
    },
    /// Bearer token authentication.
    Bearer(String),
}

/// The payload of a request, before the request transform runs.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum RequestData {
    /// No body.
    #[default]
    Empty,
    /// Ordered key/value fields.
    Fields(Vec<(String, FieldValue)>),
    /// A JSON value.
    Json(serde_json::Value),
    /// Plain text.
    Text(String),
    /// Raw bytes.
    Bytes(Bytes),
}

/// The wire body produced by a request transform.
#[derive(Clone, Debug, PartialEq)]
pub enum PreparedBody {
    /// Send no body.
    Empty,
    /// Send bytes, setting `Content-Type` when the request has none.
    Bytes {
        /// The body.
        bytes: Bytes,
        /// Content type to apply if the request does not set one.
        content_type: Option<String>,
    },
    /// Send a `multipart/form-data` body.
    Multipart(FormData),
}

/// Turns the params value into a query string (without the leading `?`).
pub type ParamsSerializer = Arc<dyn Fn(&serde_json::Value) -> String + Send + Sync>;

/// Turns the payload into a wire body. May edit the outgoing headers.
pub type RequestTransform =
    Arc<dyn Fn(RequestData, &mut http::HeaderMap) -> Result<PreparedBody> + Send + Sync>;

/// Decides which statuses count as success.
pub type StatusValidator = Arc<dyn Fn(u16) -> bool + Send + Sync>;

/// Configuration for a single request.
///
/// Built fluently and handed to
/// [`RequestAdapter::request`](crate::RequestAdapter::request). Hooks left
/// unset are filled with the adapter defaults when the request is dispatched.
///
/// # Example
///
/// ```ignore
/// let config = RequestConfig::post("/uploads")
///     .param("album", 12)
///     .field("title", "Holiday")
///     .field("tags", vec!["beach", "sun"])
///     .field("photos", vec![FilePart::new("a.jpg", bytes_a), FilePart::new("b.jpg", bytes_b)]);
/// ```
#[derive(Clone, Default)]
pub struct RequestConfig {
    pub(crate) method: HttpMethod,
    pub(crate) url: String,
    pub(crate) headers: http::HeaderMap,
    pub(crate) params: serde_json::Value,
    pub(crate) data: RequestData,
    pub(crate) timeout: Option<Duration>,
    pub(crate) auth: Option<Authentication>,
    pub(crate) serializer: Option<ParamsSerializer>,
    pub(crate) transform: Option<RequestTransform>,
    pub(crate) validate_status: Option<StatusValidator>,
}

impl RequestConfig {
    /// Create a request configuration.
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            ..Self::default()
        }
    }

    /// Create a GET request configuration.
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, url)
    }

    /// Create a POST request configuration.
    pub fn post(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Post, url)
    }

    /// Create a PUT request configuration.
    pub fn put(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Put, url)
    }

    /// Create a DELETE request configuration.
    pub fn delete(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Delete, url)
    }

    /// Create a PATCH request configuration.
    pub fn patch(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Patch, url)
    }

    /// Add a header to the request. Invalid names or values are dropped.
    pub fn header(
        mut self,
        name: impl TryInto<http::HeaderName>,
        value: impl TryInto<http::HeaderValue>,
    ) -> Self {
        match (name.try_into(), value.try_into()) {
            (Ok(name), Ok(value)) => {
                self.headers.insert(name, value);
            }
            _ => {
                tracing::warn!(target: "courier::http", "ignoring invalid request header");
            }
        }
        self
    }

    /// Add multiple headers to the request.
    pub fn headers(mut self, headers: http::HeaderMap) -> Self {
        self.headers.extend(headers);
        self
    }

    /// Add one query parameter. Values may be nested objects or arrays.
    pub fn param<T: Serialize>(mut self, key: impl Into<String>, value: T) -> Self {
        match serde_json::to_value(value) {
            Ok(value) => {
                if !self.params.is_object() {
                    self.params = serde_json::Value::Object(serde_json::Map::new());
                }
                if let serde_json::Value::Object(map) = &mut self.params {
                    map.insert(key.into(), value);
                }
            }
            Err(e) => {
                tracing::error!(target: "courier::http", "Failed to serialize query parameter: {}", e);
            }
        }
        self
    }

    /// Replace all query parameters with a serializable object.
    pub fn params<T: Serialize>(mut self, params: &T) -> Self {
        match serde_json::to_value(params) {
            Ok(value) => self.params = value,
            Err(e) => {
                tracing::error!(target: "courier::http", "Failed to serialize query parameters: {}", e);
            }
        }
        self
    }

    /// Append a form field to the payload.
    ///
    /// Switches the payload to [`RequestData::Fields`] if it was anything else.
    pub fn field(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        match &mut self.data {
            RequestData::Fields(fields) => fields.push((key.into(), value.into())),
            other => *other = RequestData::Fields(vec![(key.into(), value.into())]),
        }
        self
    }

    /// Set a JSON payload from a serializable value.
    ///
    /// With the default transform, a JSON object is still sent as a
    /// multipart form; other JSON values are sent as `application/json`.
    pub fn json<T: Serialize>(mut self, body: &T) -> Self {
        match serde_json::to_value(body) {
            Ok(value) => self.data = RequestData::Json(value),
            Err(e) => {
                tracing::error!(target: "courier::http", "Failed to serialize JSON body: {}", e);
            }
        }
        self
    }

    /// Set a plain text payload.
    pub fn text(mut self, body: impl Into<String>) -> Self {
        self.data = RequestData::Text(body.into());
        self
    }

    /// Set a raw binary payload.
    pub fn bytes(mut self, body: impl Into<Bytes>) -> Self {
        self.data = RequestData::Bytes(body.into());
        self
    }

    /// Set the payload directly.
    pub fn data(mut self, data: RequestData) -> Self {
        self.data = data;
        self
    }

    /// Set a timeout for this specific request.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set basic authentication.
    pub fn basic_auth(
        mut self,
        username: impl Into<String>,
        password: Option<impl Into<String>>,
    ) -> Self {
        self.auth = Some(Authentication::Basic {
            username: username.into(),
            password: password.map(Into::into),
        });
        self
    }

    /// Set bearer token authentication.
    pub fn bearer_auth(mut self, token: impl Into<String>) -> Self {
        self.auth = Some(Authentication::Bearer(token.into()));
        self
    }

    /// Use a custom query-string serializer instead of the bracket encoder.
    pub fn params_serializer<F>(mut self, serializer: F) -> Self
    where
        F: Fn(&serde_json::Value) -> String + Send + Sync + 'static,
    {
        self.serializer = Some(Arc::new(serializer));
        self
    }

    /// Use a custom request transform instead of the multipart conversion.
    pub fn transform_request<F>(mut self, transform: F) -> Self
    where
        F: Fn(RequestData, &mut http::HeaderMap) -> Result<PreparedBody> + Send + Sync + 'static,
    {
        self.transform = Some(Arc::new(transform));
        self
    }

    /// Decide which statuses resolve the request. Defaults to 2xx.
    pub fn validate_status<F>(mut self, validate: F) -> Self
    where
        F: Fn(u16) -> bool + Send + Sync + 'static,
    {
        self.validate_status = Some(Arc::new(validate));
        self
    }

    /// The HTTP method.
    pub fn method(&self) -> HttpMethod {
        self.method
    }

    /// The URL as configured, possibly relative to the adapter's base URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// The request headers.
    pub fn header_map(&self) -> &http::HeaderMap {
        &self.headers
    }

    /// The query parameters.
    pub fn params_value(&self) -> &serde_json::Value {
        &self.params
    }

    /// The payload.
    pub fn payload(&self) -> &RequestData {
        &self.data
    }

    /// The per-request timeout.
    pub fn timeout_value(&self) -> Option<Duration> {
        self.timeout
    }

    /// The authentication credentials.
    pub fn auth(&self) -> Option<&Authentication> {
        self.auth.as_ref()
    }

    /// The query serializer, if one is installed.
    pub fn serializer(&self) -> Option<&ParamsSerializer> {
        self.serializer.as_ref()
    }

    /// The request transform, if one is installed.
    pub fn transform(&self) -> Option<&RequestTransform> {
        self.transform.as_ref()
    }

    /// Check `status` against the configured validator.
    pub fn accepts_status(&self, status: u16) -> bool {
        status_accepted(self.validate_status.as_ref(), status)
    }
}

/// Apply `validate`, or accept 2xx when there is none.
pub(crate) fn status_accepted(validate: Option<&StatusValidator>, status: u16) -> bool {
    match validate {
        Some(validate) => validate(status),
        None => (200..300).contains(&status),
    }
}

impl fmt::Debug for RequestConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestConfig")
            .field("method", &self.method)
            .field("url", &self.url)
            .field("headers", &self.headers)
            .field("params", &self.params)
            .field("data", &self.data)
            .field("timeout", &self.timeout)
            .field("auth", &self.auth.is_some())
            .field("serializer", &self.serializer.is_some())
            .field("transform", &self.transform.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_chain() {
        let config = RequestConfig::post("https://example.com/api")
            .header("Accept", "application/json")
            .header("X-Trace", "abc")
            .param("page", 1)
            .param("filter", serde_json::json!({"status": "open"}))
            .timeout(Duration::from_secs(5))
            .bearer_auth("token123");

        assert_eq!(config.method(), HttpMethod::Post);
        assert_eq!(config.url(), "https://example.com/api");
        assert_eq!(config.header_map().len(), 2);
        assert_eq!(config.params_value()["page"], 1);
        assert_eq!(config.params_value()["filter"]["status"], "open");
        assert_eq!(config.timeout_value(), Some(Duration::from_secs(5)));
        assert_eq!(
            config.auth(),
            Some(&Authentication::Bearer("token123".to_string()))
        );
        assert!(config.serializer().is_none());
        assert!(config.transform().is_none());
    }

    #[test]
    fn invalid_header_is_dropped() {
        let config = RequestConfig::get("/").header("bad header", "x");
        assert!(config.header_map().is_empty());
    }

    #[test]
    fn fields_accumulate_in_order() {
        let config = RequestConfig::post("/")
            .text("discarded")
            .field("name", "John")
            .field("tags", vec!["a", "b"]);

        match config.payload() {
            RequestData::Fields(fields) => {
                let keys: Vec<_> = fields.iter().map(|(k, _)| k.as_str()).collect();
                assert_eq!(keys, ["name", "tags"]);
            }
            other => panic!("expected fields, got {other:?}"),
        }
    }

    #[test]
    fn default_status_validation() {
        let config = RequestConfig::get("/");
        assert!(config.accepts_status(200));
        assert!(config.accepts_status(204));
        assert!(!config.accepts_status(304));
        assert!(!config.accepts_status(404));

        let lenient = RequestConfig::get("/").validate_status(|status| status < 500);
        assert!(lenient.accepts_status(404));
        assert!(!lenient.accepts_status(503));
    }

    #[test]
    fn method_display() {
        assert_eq!(HttpMethod::Get.to_string(), "GET");
        assert_eq!(HttpMethod::Options.to_string(), "OPTIONS");
        assert_eq!(HttpMethod::Patch.to_reqwest(), reqwest::Method::PATCH);
    }
}

//! Response types.

use bytes::Bytes;
use serde::de::DeserializeOwned;

use crate::request::HttpMethod;

/// What was sent, attached to errors raised after the request left.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestInfo {
    /// The HTTP method.
    pub method: HttpMethod,
    /// The fully resolved URL, including the serialized query.
    pub url: String,
}

/// A response whose status was rejected.
#[derive(Clone, Debug)]
pub struct ErrorResponse {
    /// The HTTP status code.
    pub status: u16,
    /// Response headers.
    pub headers: http::HeaderMap,
    /// The final URL after redirects.
    pub url: String,
    /// The raw response body.
    pub body: Bytes,
}

impl ErrorResponse {
    /// Check if the response is a client error (4xx status).
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status)
    }

    /// Check if the response is a server error (5xx status).
    pub fn is_server_error(&self) -> bool {
        (500..600).contains(&self.status)
    }

    /// The body as text, replacing invalid UTF-8.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Parse the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_slice(&self.body)
    }
}

/// A successful response with its decoded body.
#[derive(Clone, Debug)]
pub struct Response<T> {
    /// The HTTP status code.
    pub status: u16,
    /// Response headers.
    pub headers: http::HeaderMap,
    /// The final URL after redirects.
    pub url: String,
    /// The decoded body.
    pub data: T,
    raw: Bytes,
}

impl<T> Response<T> {
    pub(crate) fn new(
        status: u16,
        headers: http::HeaderMap,
        url: String,
        data: T,
        raw: Bytes,
    ) -> Self {
        Self {
            status,
            headers,
            url,
            data,
            raw,
        }
    }

    /// The canonical reason phrase for the status, e.g. `"OK"`.
    pub fn status_text(&self) -> &'static str {
        http::StatusCode::from_u16(self.status)
            .ok()
            .and_then(|s| s.canonical_reason())
            .unwrap_or("")
    }

    /// Check if the response indicates success (2xx status).
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Get a specific header value.
    pub fn header(&self, name: impl AsRef<str>) -> Option<&str> {
        self.headers
            .get(name.as_ref())
            .and_then(|v| v.to_str().ok())
    }

    /// Get the Content-Type header value.
    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    /// The body exactly as received.
    pub fn raw(&self) -> &Bytes {
        &self.raw
    }

    /// Consume the response, keeping only the decoded body.
    pub fn into_data(self) -> T {
        self.data
    }
}

/// Decode a response body into `T`.
///
/// Bodies are read as JSON. An empty body decodes as `null`, and a body that
/// is not JSON is offered to `T` as a plain string, so `String` and
/// `serde_json::Value` accept any text.
pub(crate) fn decode_body<T: DeserializeOwned>(body: &Bytes) -> serde_json::Result<T> {
    if body.is_empty() {
        return serde_json::from_value(serde_json::Value::Null);
    }
    match serde_json::from_slice(body) {
        Ok(data) => Ok(data),
        Err(err) => {
            let text = String::from_utf8_lossy(body).into_owned();
            serde_json::from_value(serde_json::Value::String(text)).map_err(|_| err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Item {
        id: u32,
    }

    #[test]
    fn decodes_json() {
        let item: Item = decode_body(&Bytes::from_static(br#"{"id":7}"#)).unwrap();
        assert_eq!(item, Item { id: 7 });
    }

    #[test]
    fn empty_body_is_null() {
        let () = decode_body(&Bytes::new()).unwrap();
        let none: Option<Item> = decode_body(&Bytes::new()).unwrap();
        assert!(none.is_none());
    }

    #[test]
    fn text_falls_back_to_string() {
        let text: String = decode_body(&Bytes::from_static(b"plain words")).unwrap();
        assert_eq!(text, "plain words");
        let value: serde_json::Value = decode_body(&Bytes::from_static(b"<html>")).unwrap();
        assert_eq!(value, serde_json::Value::String("<html>".into()));
    }

    #[test]
    fn mismatched_json_is_an_error() {
        let result: serde_json::Result<Item> = decode_body(&Bytes::from_static(b"[1,2]"));
        assert!(result.is_err());
    }

    #[test]
    fn error_response_helpers() {
        let response = ErrorResponse {
            status: 503,
            headers: http::HeaderMap::new(),
            url: "https://example.com".to_string(),
            body: Bytes::from_static(br#"{"id":1}"#),
        };
        assert!(response.is_server_error());
        assert!(!response.is_client_error());
        assert_eq!(response.json::<Item>().unwrap(), Item { id: 1 });
        assert_eq!(response.text(), r#"{"id":1}"#);
    }

    #[test]
    fn status_text() {
        let response = Response::new(
            404,
            http::HeaderMap::new(),
            String::new(),
            (),
            Bytes::new(),
        );
        assert_eq!(response.status_text(), "Not Found");
        assert!(!response.is_success());
    }
}

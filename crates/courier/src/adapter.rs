//! The request adapter.

use std::error::Error as StdError;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::{Bytes, BytesMut};
use http::header::{AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE, LOCATION};
use serde::de::DeserializeOwned;
use tokio::task::JoinHandle;

use crate::cancel::{Cancelled, Canceller};
use crate::config::{AdapterBuilder, AdapterConfig};
use crate::error::{self, ErrorKind, RequestError, Result};
use crate::form::{self, FormData};
use crate::listeners::{ErrorListeners, Subscription};
use crate::progress::{self, ProgressCallback, ProgressEvent, normalize_progress};
use crate::query;
use crate::request::{
    Authentication, HttpMethod, ParamsSerializer, PreparedBody, RequestConfig, RequestTransform,
    status_accepted,
};
use crate::response::{ErrorResponse, RequestInfo, Response, decode_body};
use crate::runtime;

struct AdapterInner {
    client: reqwest::Client,
    config: AdapterConfig,
    listeners: ErrorListeners,
}

/// Issues requests through a configured reqwest client.
///
/// Each request gets the adapter's defaults (bracket-encoded query,
/// multipart body), runs on its own task, and can be cancelled through the
/// [`Canceller`] returned with it. Failures are classified and broadcast to
/// the adapter's error listeners before the caller sees them.
///
/// Cheap to clone; clones share the client and the listeners.
///
/// # Example
///
/// ```ignore
/// use courier::{RequestAdapter, RequestConfig};
///
/// let adapter = RequestAdapter::builder()
///     .base_url("https://api.example.com")
///     .build()?;
///
/// let _sub = adapter.add_error_listener(|error, kind| {
///     eprintln!("request failed ({kind}): {error}");
/// });
///
/// let (pending, cancel) = adapter.request::<serde_json::Value>(
///     RequestConfig::get("/users").param("filter", json!({"active": true})),
/// );
/// // cancel.cancel();
/// let users = pending.await?.data;
/// ```
#[derive(Clone)]
pub struct RequestAdapter {
    inner: Arc<AdapterInner>,
}

impl RequestAdapter {
    /// Create an adapter from host options. No network I/O happens here.
    pub fn new(config: AdapterConfig) -> Result<Self> {
        let client = config.build_client()?;
        Ok(Self {
            inner: Arc::new(AdapterInner {
                client,
                config,
                listeners: ErrorListeners::new(),
            }),
        })
    }

    /// Create a builder for configuring a new adapter.
    pub fn builder() -> AdapterBuilder {
        AdapterBuilder::new()
    }

    /// Get the adapter's host options.
    pub fn config(&self) -> &AdapterConfig {
        &self.inner.config
    }

    /// The adapter's error listeners.
    pub fn listeners(&self) -> &ErrorListeners {
        &self.inner.listeners
    }

    /// Register a listener notified of every failed request.
    pub fn add_error_listener<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&RequestError, ErrorKind) + Send + Sync + 'static,
    {
        self.inner.listeners.add(listener)
    }

    /// Check whether `value` is a cancellation raised by a [`Canceller`].
    pub fn is_cancel(value: &(dyn StdError + 'static)) -> bool {
        error::is_cancel(value)
    }

    /// Check whether `value` came from this adapter or its transport.
    pub fn is_own_error(value: &(dyn StdError + 'static)) -> bool {
        error::is_own_error(value)
    }

    /// Fill in the default hooks a request is sent with.
    ///
    /// Installs the bracket query serializer and the multipart transform
    /// where the config has none. Hooks the caller set are kept.
    pub fn prepare(&self, mut config: RequestConfig) -> RequestConfig {
        let (serializer, transform) = hooks(&config);
        config.serializer = Some(serializer);
        config.transform = Some(transform);
        config
    }

    /// Send a request.
    ///
    /// Returns immediately with the pending result and the handle that
    /// cancels it. The request runs whether or not the result is awaited.
    pub fn request<T>(&self, config: RequestConfig) -> (PendingRequest<T>, Canceller)
    where
        T: DeserializeOwned + Send + 'static,
    {
        self.dispatch(config, None)
    }

    /// Send a request, reporting upload and download progress as 0-100.
    pub fn request_with_progress<T, F>(
        &self,
        config: RequestConfig,
        on_progress: F,
    ) -> (PendingRequest<T>, Canceller)
    where
        T: DeserializeOwned + Send + 'static,
        F: Fn(u8) + Send + Sync + 'static,
    {
        self.dispatch(config, Some(Arc::new(on_progress)))
    }

    fn dispatch<T>(
        &self,
        config: RequestConfig,
        progress: Option<ProgressCallback>,
    ) -> (PendingRequest<T>, Canceller)
    where
        T: DeserializeOwned + Send + 'static,
    {
        let (canceller, cancel_rx) = Canceller::pair();
        let handle = canceller.clone();
        let adapter = self.clone();

        tracing::debug!(target: "courier::http", method = %config.method, url = %config.url, "dispatching request");

        let task = async move {
            let result = tokio::select! {
                result = adapter.execute::<T>(config, progress) => result,
                Ok(reason) = cancel_rx => Err(RequestError::Cancelled(reason)),
            };
            handle.settle();

            if let Err(ref err) = result {
                adapter.on_error(err);
            }
            result
        };

        let pending = PendingRequest {
            handle: runtime::spawn(task),
            listeners: self.inner.listeners.clone(),
        };
        (pending, canceller)
    }

    /// Classify a failure and notify every listener, in order.
    fn on_error(&self, err: &RequestError) -> ErrorKind {
        let kind = self.inner.listeners.notify(err);
        tracing::debug!(target: "courier::http", %kind, error = %err, "request failed");
        kind
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        config: RequestConfig,
        progress: Option<ProgressCallback>,
    ) -> Result<Response<T>> {
        let (serialize, transform) = hooks(&config);
        let RequestConfig {
            method,
            url,
            mut headers,
            params,
            data,
            timeout,
            mut auth,
            validate_status,
            ..
        } = config;

        let mut url = self.resolve_url(&url)?;
        query::append_query(&mut url, &serialize(&params));

        let info = RequestInfo {
            method,
            url: url.to_string(),
        };

        let body = transform(data, &mut headers)?;
        let body = attach_body(body, &mut headers)?;
        // reqwest cannot replay a streamed body, so 307/308 are followed here.
        let streamed = progress.is_some() && body.is_some();

        let mut redirects = 0;
        let mut response = loop {
            let outgoing = Outgoing {
                method,
                url: url.clone(),
                headers: &headers,
                auth: auth.as_ref(),
                timeout,
                body: body.clone(),
                progress: progress.as_ref(),
            };
            let response = self
                .send(outgoing)
                .await
                .map_err(|e| RequestError::from_transport(e, &info))?;

            if streamed && let Some(next) = self.replay_target(&response, redirects) {
                redirects += 1;
                tracing::debug!(target: "courier::http", status = response.status().as_u16(), location = %next, "replaying streamed body");
                if !same_origin(&url, &next) {
                    auth = None;
                    headers.remove(AUTHORIZATION);
                }
                url = next;
                continue;
            }
            break response;
        };

        let status = response.status().as_u16();
        let response_headers = response.headers().clone();
        let final_url = response.url().to_string();
        let total = response.content_length();

        let mut buffer = BytesMut::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| RequestError::from_transport(e, &info))?
        {
            buffer.extend_from_slice(&chunk);
            if let Some(on_progress) = &progress {
                normalize_progress(
                    &ProgressEvent::download(buffer.len() as u64, total),
                    on_progress.as_ref(),
                );
            }
        }
        let raw = buffer.freeze();

        if !status_accepted(validate_status.as_ref(), status) {
            return Err(RequestError::Status {
                request: info,
                response: ErrorResponse {
                    status,
                    headers: response_headers,
                    url: final_url,
                    body: raw,
                },
            });
        }

        let data = decode_body(&raw).map_err(|source| RequestError::Decode { status, source })?;
        tracing::debug!(target: "courier::http", status, url = %final_url, "request settled");
        Ok(Response::new(status, response_headers, final_url, data, raw))
    }

    async fn send(&self, outgoing: Outgoing<'_>) -> reqwest::Result<reqwest::Response> {
        let mut builder = self
            .inner
            .client
            .request(outgoing.method.to_reqwest(), outgoing.url)
            .headers(outgoing.headers.clone());

        match outgoing.auth {
            Some(Authentication::Basic { username, password }) => {
                builder = builder.basic_auth(username, password.as_ref());
            }
            Some(Authentication::Bearer(token)) => {
                builder = builder.bearer_auth(token);
            }
            None => {}
        }

        if let Some(timeout) = outgoing.timeout {
            builder = builder.timeout(timeout);
        }

        if let Some(bytes) = outgoing.body {
            builder = match outgoing.progress {
                Some(on_progress) => builder.body(reqwest::Body::wrap_stream(
                    progress::upload_stream(bytes, on_progress.clone()),
                )),
                None => builder.body(bytes),
            };
        }

        builder.send().await
    }

    /// Where a 307/308 answer to a streamed request should be sent again.
    fn replay_target(&self, response: &reqwest::Response, redirects: usize) -> Option<url::Url> {
        let config = &self.inner.config;
        if !config.follow_redirects || redirects >= config.max_redirects {
            return None;
        }
        if !matches!(
            response.status(),
            http::StatusCode::TEMPORARY_REDIRECT | http::StatusCode::PERMANENT_REDIRECT
        ) {
            return None;
        }
        let location = response.headers().get(LOCATION)?.to_str().ok()?;
        response.url().join(location).ok()
    }

    /// Resolve a request URL against the base URL.
    pub(crate) fn resolve_url(&self, raw: &str) -> Result<url::Url> {
        match url::Url::parse(raw) {
            Ok(url) => Ok(url),
            Err(url::ParseError::RelativeUrlWithoutBase) => match &self.inner.config.base_url {
                Some(base) => {
                    let joined = format!(
                        "{}/{}",
                        base.trim_end_matches('/'),
                        raw.trim_start_matches('/')
                    );
                    Ok(url::Url::parse(&joined)?)
                }
                None => Err(url::ParseError::RelativeUrlWithoutBase.into()),
            },
            Err(err) => Err(err.into()),
        }
    }
}

/// The serializer and transform a request is sent with.
fn hooks(config: &RequestConfig) -> (ParamsSerializer, RequestTransform) {
    let serializer = config
        .serializer
        .clone()
        .unwrap_or_else(|| Arc::new(query::to_php_query));
    let transform = config
        .transform
        .clone()
        .unwrap_or_else(|| Arc::new(form::multipart_transform));
    (serializer, transform)
}

/// One attempt at sending a request.
struct Outgoing<'a> {
    method: HttpMethod,
    url: url::Url,
    headers: &'a http::HeaderMap,
    auth: Option<&'a Authentication>,
    timeout: Option<std::time::Duration>,
    body: Option<Bytes>,
    progress: Option<&'a ProgressCallback>,
}

fn same_origin(a: &url::Url, b: &url::Url) -> bool {
    a.scheme() == b.scheme()
        && a.host_str() == b.host_str()
        && a.port_or_known_default() == b.port_or_known_default()
}

/// Turn a prepared body into bytes, setting the headers it needs.
fn attach_body(body: PreparedBody, headers: &mut http::HeaderMap) -> Result<Option<Bytes>> {
    let bytes = match body {
        PreparedBody::Empty => return Ok(None),
        PreparedBody::Bytes {
            bytes,
            content_type,
        } => {
            if let Some(content_type) = content_type
                && !headers.contains_key(CONTENT_TYPE)
            {
                headers.insert(CONTENT_TYPE, http::HeaderValue::from_str(&content_type)?);
            }
            bytes
        }
        PreparedBody::Multipart(form) => {
            let boundary = form::generate_boundary();
            headers.insert(
                CONTENT_TYPE,
                http::HeaderValue::from_str(&FormData::content_type(&boundary))?,
            );
            form.encode(&boundary)
        }
    };
    // Streamed bodies carry no length of their own.
    headers.insert(CONTENT_LENGTH, http::HeaderValue::from(bytes.len() as u64));
    Ok(Some(bytes))
}

impl std::fmt::Debug for RequestAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestAdapter")
            .field("config", &self.inner.config)
            .field("listeners", &self.inner.listeners)
            .finish()
    }
}

/// The eventual result of a request.
///
/// Resolves to the response, or to the same [`RequestError`] the error
/// listeners saw. Dropping it does not stop the request; use the
/// [`Canceller`] for that. A panic inside an error listener resurfaces here.
#[must_use = "the result of a request is only observable by awaiting it"]
pub struct PendingRequest<T> {
    handle: JoinHandle<Result<Response<T>>>,
    listeners: ErrorListeners,
}

impl<T> PendingRequest<T> {
    /// Check whether the request has settled.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl<T> Future for PendingRequest<T> {
    type Output = Result<Response<T>>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.handle).poll(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(join_error)) => {
                if join_error.is_panic() {
                    std::panic::resume_unwind(join_error.into_panic());
                }
                // The runtime shut down underneath the request; the task never
                // reached its own notification.
                let err =
                    RequestError::Cancelled(Cancelled::with_message("request task was aborted"));
                let kind = self.listeners.notify(&err);
                tracing::debug!(target: "courier::http", %kind, error = %err, "request task aborted");
                Poll::Ready(Err(err))
            }
        }
    }
}

impl<T> std::fmt::Debug for PendingRequest<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingRequest")
            .field("finished", &self.is_finished())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::form::{FieldValue, FormEntry};
    use crate::request::RequestData;

    fn adapter(base_url: Option<&str>) -> RequestAdapter {
        let mut builder = RequestAdapter::builder();
        if let Some(base) = base_url {
            builder = builder.base_url(base);
        }
        builder.build().expect("adapter builds")
    }

    #[test]
    fn prepare_installs_defaults() {
        let prepared = adapter(None).prepare(RequestConfig::get("https://example.com"));

        let serialize = prepared.serializer().expect("serializer installed");
        assert_eq!(
            serialize(&serde_json::json!({"ids": [1]})),
            "ids%5B0%5D=1"
        );

        let transform = prepared.transform().expect("transform installed");
        let mut headers = http::HeaderMap::new();
        let body = transform(
            RequestData::Fields(vec![("tags".into(), FieldValue::from(vec!["a", "b"]))]),
            &mut headers,
        )
        .unwrap();
        match body {
            PreparedBody::Multipart(form) => {
                let tags: Vec<_> = form
                    .get_all("tags[]")
                    .into_iter()
                    .filter_map(FormEntry::as_text)
                    .collect();
                assert_eq!(tags, ["a", "b"]);
            }
            other => panic!("expected multipart, got {other:?}"),
        }
    }

    #[test]
    fn prepare_keeps_custom_hooks() {
        let config = RequestConfig::get("https://example.com")
            .params_serializer(|_| "custom=1".to_string())
            .transform_request(|_, _| Ok(PreparedBody::Empty));
        let prepared = adapter(None).prepare(config);

        let serialize = prepared.serializer().unwrap();
        assert_eq!(serialize(&serde_json::Value::Null), "custom=1");
        let transform = prepared.transform().unwrap();
        let body = transform(RequestData::Text("x".into()), &mut http::HeaderMap::new()).unwrap();
        assert_eq!(body, PreparedBody::Empty);
    }

    #[test]
    fn hooks_match_prepare() {
        let adapter = adapter(None);
        let config = RequestConfig::get("https://example.com").param("tags", ["a"]);
        let (serialize, _) = hooks(&config);
        let prepared = adapter.prepare(config.clone());
        let installed = prepared.serializer().unwrap();
        assert_eq!(serialize(config.params_value()), installed(config.params_value()));

        let custom = config.params_serializer(|_| "fixed=1".to_string());
        let (serialize, _) = hooks(&custom);
        assert_eq!(serialize(&serde_json::Value::Null), "fixed=1");
    }

    #[test]
    fn redirect_origin_check() {
        let parse = |raw: &str| url::Url::parse(raw).unwrap();
        assert!(same_origin(&parse("http://a.test/x"), &parse("http://a.test:80/y")));
        assert!(!same_origin(&parse("http://a.test/x"), &parse("https://a.test/x")));
        assert!(!same_origin(&parse("http://a.test/x"), &parse("http://b.test/x")));
        assert!(!same_origin(&parse("http://a.test:8080/"), &parse("http://a.test:8081/")));
    }

    #[test]
    fn resolves_relative_urls() {
        let adapter = adapter(Some("https://api.example.com/v1/"));
        assert_eq!(
            adapter.resolve_url("/users").unwrap().as_str(),
            "https://api.example.com/v1/users"
        );
        assert_eq!(
            adapter.resolve_url("users?x=1").unwrap().as_str(),
            "https://api.example.com/v1/users?x=1"
        );
        assert_eq!(
            adapter.resolve_url("https://other.example.com/a").unwrap().as_str(),
            "https://other.example.com/a"
        );
    }

    #[test]
    fn relative_url_without_base_fails() {
        let err = adapter(None).resolve_url("/users").unwrap_err();
        assert!(matches!(err, RequestError::InvalidUrl(_)));
        assert_eq!(err.kind(), ErrorKind::Unknown);
    }

    #[test]
    fn attach_body_sets_headers() {
        let mut headers = http::HeaderMap::new();
        let bytes = attach_body(
            PreparedBody::Bytes {
                bytes: Bytes::from_static(b"{}"),
                content_type: Some("application/json".into()),
            },
            &mut headers,
        )
        .unwrap();
        assert_eq!(bytes, Some(Bytes::from_static(b"{}")));
        assert_eq!(headers[CONTENT_TYPE], "application/json");
        assert_eq!(headers[CONTENT_LENGTH], "2");

        let mut headers = http::HeaderMap::new();
        headers.insert(CONTENT_TYPE, "text/csv".parse().unwrap());
        attach_body(
            PreparedBody::Bytes {
                bytes: Bytes::from_static(b"a,b"),
                content_type: Some("text/plain".into()),
            },
            &mut headers,
        )
        .unwrap();
        assert_eq!(headers[CONTENT_TYPE], "text/csv");

        let mut headers = http::HeaderMap::new();
        let mut form = FormData::new();
        form.append("k", FormEntry::Text("v".into()));
        let bytes = attach_body(PreparedBody::Multipart(form), &mut headers)
            .unwrap()
            .unwrap();
        let content_type = headers[CONTENT_TYPE].to_str().unwrap();
        let boundary = content_type
            .strip_prefix("multipart/form-data; boundary=")
            .expect("multipart content type");
        assert!(bytes.starts_with(format!("--{boundary}\r\n").as_bytes()));

        let mut headers = http::HeaderMap::new();
        assert_eq!(attach_body(PreparedBody::Empty, &mut headers).unwrap(), None);
        assert!(headers.is_empty());
    }
}

//! Error types and failure classification.
//!
//! Every failed request produces a [`RequestError`]. Before the error reaches
//! the caller it is classified into an [`ErrorKind`] and broadcast to the
//! adapter's error listeners. Classification only looks at the *shape* of the
//! error (see [`ErrorShape`]), in this order:
//!
//! 1. cancellation -> [`ErrorKind::Cancel`]
//! 2. a response was received -> [`ErrorKind::Response`]
//! 3. a request was sent but nothing came back -> [`ErrorKind::Request`]
//! 4. anything else -> [`ErrorKind::Unknown`]

use std::error::Error as StdError;
use std::fmt;

use crate::cancel::Cancelled;
use crate::response::{ErrorResponse, RequestInfo};

/// Why a request failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The server answered with a status rejected by `validate_status`.
    Response,
    /// The request was sent but no answer arrived (connect failure, timeout).
    Request,
    /// The request was cancelled through its [`Canceller`](crate::Canceller).
    Cancel,
    /// Anything else, such as configuration errors raised before sending.
    Unknown,
}

impl ErrorKind {
    /// Lowercase tag for this kind.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Response => "response",
            Self::Request => "request",
            Self::Cancel => "cancel",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors produced by the request adapter.
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    /// The server answered with a status outside the accepted range.
    #[error("{} {} failed with HTTP {}", .request.method, .request.url, .response.status)]
    Status {
        /// The request that was sent.
        request: RequestInfo,
        /// The response that came back.
        response: ErrorResponse,
    },
    /// The request was sent but the transport could not complete it.
    #[error("{} {} failed: {source}", .request.method, .request.url)]
    Network {
        /// The request that was sent.
        request: RequestInfo,
        /// The underlying transport error.
        source: reqwest::Error,
    },
    /// The request was cancelled before it settled.
    #[error(transparent)]
    Cancelled(#[from] Cancelled),
    /// The request URL could not be parsed or resolved.
    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// A header name or value was rejected.
    #[error("invalid header: {0}")]
    InvalidHeader(String),
    /// The request transform could not produce a body.
    #[error("request transform failed: {0}")]
    Transform(String),
    /// JSON serialization failed while preparing the request.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    /// The response body could not be decoded into the requested type.
    #[error("failed to decode response body (HTTP {status}): {source}")]
    Decode {
        /// Status of the response whose body failed to decode.
        status: u16,
        /// The decoding error.
        source: serde_json::Error,
    },
    /// The transport rejected the request before sending it.
    #[error("transport error: {0}")]
    Transport(#[source] reqwest::Error),
}

impl RequestError {
    /// Map a reqwest error raised while sending `request`.
    ///
    /// Builder errors never left the process and stay unclassified; everything
    /// else means the request went out without a usable answer.
    pub(crate) fn from_transport(err: reqwest::Error, request: &RequestInfo) -> Self {
        if err.is_builder() {
            Self::Transport(err)
        } else {
            Self::Network {
                request: request.clone(),
                source: err,
            }
        }
    }

    /// Check whether this error is a cancellation.
    pub fn is_cancel(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }

    /// Check whether the request timed out in the transport.
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Network { source, .. } => source.is_timeout(),
            _ => false,
        }
    }

    /// The response attached to this error, if the server answered.
    pub fn response(&self) -> Option<&ErrorResponse> {
        match self {
            Self::Status { response, .. } => Some(response),
            _ => None,
        }
    }

    /// The request attached to this error, if it was sent.
    pub fn request(&self) -> Option<&RequestInfo> {
        match self {
            Self::Status { request, .. } | Self::Network { request, .. } => Some(request),
            _ => None,
        }
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        classify(self)
    }
}

impl From<http::header::InvalidHeaderName> for RequestError {
    fn from(err: http::header::InvalidHeaderName) -> Self {
        Self::InvalidHeader(err.to_string())
    }
}

impl From<http::header::InvalidHeaderValue> for RequestError {
    fn from(err: http::header::InvalidHeaderValue) -> Self {
        Self::InvalidHeader(err.to_string())
    }
}

/// The parts of a failure that classification looks at.
///
/// [`RequestError`] implements this; anything else describing a failed
/// request can too, and gets the same precedence from [`classify`].
pub trait ErrorShape {
    /// Whether the failure is a cancellation.
    fn is_cancel(&self) -> bool;
    /// The response received before failing, if any.
    fn response(&self) -> Option<&ErrorResponse>;
    /// The request that was sent, if any.
    fn request(&self) -> Option<&RequestInfo>;
}

impl ErrorShape for RequestError {
    fn is_cancel(&self) -> bool {
        RequestError::is_cancel(self)
    }

    fn response(&self) -> Option<&ErrorResponse> {
        RequestError::response(self)
    }

    fn request(&self) -> Option<&RequestInfo> {
        RequestError::request(self)
    }
}

/// Classify a failure. The first matching rule wins.
pub fn classify<E: ErrorShape + ?Sized>(error: &E) -> ErrorKind {
    if error.is_cancel() {
        ErrorKind::Cancel
    } else if error.response().is_some() {
        ErrorKind::Response
    } else if error.request().is_some() {
        ErrorKind::Request
    } else {
        ErrorKind::Unknown
    }
}

/// Check whether `value` is a cancellation raised by a [`Canceller`](crate::Canceller).
pub fn is_cancel(value: &(dyn StdError + 'static)) -> bool {
    value.is::<Cancelled>()
        || value
            .downcast_ref::<RequestError>()
            .is_some_and(RequestError::is_cancel)
}

/// Check whether `value` came out of this crate or its transport.
pub fn is_own_error(value: &(dyn StdError + 'static)) -> bool {
    value.is::<RequestError>() || value.is::<reqwest::Error>() || is_cancel(value)
}

/// A specialized Result type for request operations.
pub type Result<T> = std::result::Result<T, RequestError>;

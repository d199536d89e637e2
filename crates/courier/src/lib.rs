//! Request adapter built on reqwest.
//!
//! `courier` wraps an HTTP client with the defaults a form-posting web
//! backend expects, and with the plumbing an application needs around each
//! request:
//!
//! - **Query strings**: nested params are encoded with indexed brackets
//!   (`filter[status]=open&ids[0]=1`)
//! - **Request bodies**: key/value payloads become `multipart/form-data`,
//!   with lists expanded under `key[]`
//! - **Cancellation**: every request comes with its own [`Canceller`]
//! - **Progress**: upload and download progress reported as whole percentages
//! - **Error listeners**: every failure is classified and broadcast before the
//!   caller sees it
//!
//! # Sending a request
//!
//! ```ignore
//! use courier::{RequestAdapter, RequestConfig};
//!
//! let adapter = RequestAdapter::builder()
//!     .base_url("https://api.example.com")
//!     .build()?;
//!
//! let (pending, cancel) = adapter.request::<serde_json::Value>(
//!     RequestConfig::get("/tickets").param("filter", serde_json::json!({"status": "open"})),
//! );
//! let response = pending.await?;
//! println!("{} tickets", response.data.as_array().map_or(0, Vec::len));
//! ```
//!
//! # Uploading
//!
//! ```ignore
//! let config = RequestConfig::post("/albums/12/photos")
//!     .field("title", "Holiday")
//!     .field("tags", vec!["beach", "sun"])
//!     .field("photo", FilePart::from_path("beach.jpg").await?.mime("image/jpeg"));
//!
//! let (pending, _cancel) = adapter.request_with_progress::<serde_json::Value, _>(
//!     config,
//!     |percent| println!("{percent}%"),
//! );
//! pending.await?;
//! ```
//!
//! # Error listeners
//!
//! ```ignore
//! let subscription = adapter.add_error_listener(|error, kind| match kind {
//!     ErrorKind::Cancel => {}
//!     ErrorKind::Response => tracing::warn!("server rejected request: {error}"),
//!     _ => tracing::error!("request failed: {error}"),
//! });
//!
//! // Later:
//! subscription.unsubscribe();
//! ```
//!
//! # Runtime
//!
//! Requests are spawned on the caller's tokio runtime. Code running outside
//! one can still send requests; they run on a small shared runtime, and
//! [`runtime::block_on`] waits for them.

#![warn(missing_docs)]

mod adapter;
mod cancel;
mod config;
mod error;
mod form;
mod listeners;
mod progress;
mod query;
mod request;
mod response;

pub mod runtime;

pub use adapter::{PendingRequest, RequestAdapter};
pub use cancel::{Cancelled, Canceller};
pub use config::{AdapterBuilder, AdapterConfig};
pub use error::{ErrorKind, ErrorShape, RequestError, Result, classify, is_cancel, is_own_error};
pub use form::{FieldValue, FilePart, FormData, FormEntry, multipart_transform};
pub use listeners::{ErrorListener, ErrorListeners, ListenerId, Subscription};
pub use progress::{ProgressCallback, ProgressEvent, TransferDirection, normalize_progress};
pub use query::to_php_query;
pub use request::{
    Authentication, HttpMethod, ParamsSerializer, PreparedBody, RequestConfig, RequestData,
    RequestTransform, StatusValidator,
};
pub use response::{ErrorResponse, RequestInfo, Response};

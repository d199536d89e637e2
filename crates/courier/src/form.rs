//! Multipart form conversion.
//!
//! The default request transform turns a key/value payload into
//! `multipart/form-data`:
//!
//! - a non-list value is set once under its key
//! - a list value (including a list of files) is appended under `key[]`,
//!   once per element, in element order
//!
//! The body is encoded here rather than by reqwest so its length is known up
//! front, which is what makes upload progress computable.

use std::path::Path;

use bytes::{BufMut, Bytes, BytesMut};
use rand::Rng;
use rand::distributions::Alphanumeric;

use crate::error::Result;
use crate::request::{PreparedBody, RequestData};

const DEFAULT_FILE_MIME: &str = "application/octet-stream";
const BOUNDARY_LEN: usize = 24;

/// A file attached to a form.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FilePart {
    /// File name sent in the `Content-Disposition` header.
    pub file_name: String,
    /// MIME type of the content.
    pub mime: String,
    /// File contents.
    pub bytes: Bytes,
}

impl FilePart {
    /// Create a file part from bytes.
    pub fn new(file_name: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            file_name: file_name.into(),
            mime: DEFAULT_FILE_MIME.to_string(),
            bytes: bytes.into(),
        }
    }

    /// Read a file part from disk. The file name is taken from the path.
    pub async fn from_path(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self::new(file_name, bytes))
    }

    /// Set the MIME type. Values that cannot be sent as a header are ignored.
    pub fn mime(mut self, mime: impl Into<String>) -> Self {
        let mime = mime.into();
        if http::HeaderValue::from_str(&mime).is_ok() && mime.contains('/') {
            self.mime = mime;
        } else {
            tracing::warn!(target: "courier::http", "Invalid MIME type '{}', keeping {}", mime, self.mime);
        }
        self
    }
}

/// A value in a key/value payload.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldValue {
    /// A text value.
    Text(String),
    /// A single file.
    File(FilePart),
    /// A list of values, sent under `key[]`.
    List(Vec<FieldValue>),
}

impl FieldValue {
    /// Build a field from a JSON value.
    ///
    /// Arrays become lists, objects become their JSON text, other scalars
    /// their plain text. `null` yields `None` and the field is skipped.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Null => None,
            serde_json::Value::String(s) => Some(Self::Text(s.clone())),
            serde_json::Value::Bool(b) => Some(Self::Text(b.to_string())),
            serde_json::Value::Number(n) => Some(Self::Text(n.to_string())),
            serde_json::Value::Array(items) => Some(Self::List(
                items.iter().filter_map(Self::from_json).collect(),
            )),
            serde_json::Value::Object(_) => Some(Self::Text(value.to_string())),
        }
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<FilePart> for FieldValue {
    fn from(value: FilePart) -> Self {
        Self::File(value)
    }
}

impl<T: Into<FieldValue>> From<Vec<T>> for FieldValue {
    fn from(values: Vec<T>) -> Self {
        Self::List(values.into_iter().map(Into::into).collect())
    }
}

macro_rules! field_value_from_display {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for FieldValue {
                fn from(value: $ty) -> Self {
                    Self::Text(value.to_string())
                }
            }
        )*
    };
}

field_value_from_display!(bool, i32, i64, u32, u64, usize, f64);

/// A single entry of a [`FormData`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FormEntry {
    /// A text part.
    Text(String),
    /// A file part.
    File(FilePart),
}

impl FormEntry {
    /// The text of a text part.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::File(_) => None,
        }
    }
}

/// An ordered multipart form.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FormData {
    entries: Vec<(String, FormEntry)>,
}

impl FormData {
    /// Create an empty form.
    pub fn new() -> Self {
        Self::default()
    }

    /// Convert key/value fields using the list-expansion rule.
    pub fn from_fields<I, K>(fields: I) -> Self
    where
        I: IntoIterator<Item = (K, FieldValue)>,
        K: Into<String>,
    {
        let mut form = Self::new();
        for (key, value) in fields {
            let key = key.into();
            match value {
                FieldValue::Text(text) => form.set(key, FormEntry::Text(text)),
                FieldValue::File(file) => form.set(key, FormEntry::File(file)),
                FieldValue::List(items) => form.append_list(&format!("{key}[]"), items),
            }
        }
        form
    }

    /// Convert a JSON object using the same rule as [`from_fields`](Self::from_fields).
    pub fn from_json_object(object: &serde_json::Map<String, serde_json::Value>) -> Self {
        Self::from_fields(
            object
                .iter()
                .filter_map(|(key, value)| FieldValue::from_json(value).map(|v| (key.clone(), v))),
        )
    }

    fn append_list(&mut self, key: &str, items: Vec<FieldValue>) {
        for item in items {
            match item {
                FieldValue::Text(text) => self.append(key, FormEntry::Text(text)),
                FieldValue::File(file) => self.append(key, FormEntry::File(file)),
                FieldValue::List(nested) => self.append_list(key, nested),
            }
        }
    }

    /// Set `key` to a single entry, replacing any existing entries for it.
    ///
    /// The new entry takes the position of the first existing one.
    pub fn set(&mut self, key: impl Into<String>, entry: FormEntry) {
        let key = key.into();
        match self.entries.iter().position(|(k, _)| *k == key) {
            Some(first) => {
                self.entries[first].1 = entry;
                let mut index = 0;
                self.entries.retain(|(k, _)| {
                    let keep = index <= first || *k != key;
                    index += 1;
                    keep
                });
            }
            None => self.entries.push((key, entry)),
        }
    }

    /// Append an entry under `key`, keeping existing ones.
    pub fn append(&mut self, key: impl Into<String>, entry: FormEntry) {
        self.entries.push((key.into(), entry));
    }

    /// All entries in order.
    pub fn entries(&self) -> &[(String, FormEntry)] {
        &self.entries
    }

    /// All entries under `key`, in order.
    pub fn get_all(&self, key: &str) -> Vec<&FormEntry> {
        self.entries
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, entry)| entry)
            .collect()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the form has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The `Content-Type` header value for a body encoded with `boundary`.
    pub fn content_type(boundary: &str) -> String {
        format!("multipart/form-data; boundary={boundary}")
    }

    /// Encode the form as a `multipart/form-data` body.
    pub fn encode(&self, boundary: &str) -> Bytes {
        let mut buf = BytesMut::new();
        for (name, entry) in &self.entries {
            buf.put_slice(b"--");
            buf.put_slice(boundary.as_bytes());
            buf.put_slice(b"\r\nContent-Disposition: form-data; name=\"");
            buf.put_slice(escape_quoted(name).as_bytes());
            buf.put_slice(b"\"");
            match entry {
                FormEntry::Text(text) => {
                    buf.put_slice(b"\r\n\r\n");
                    buf.put_slice(text.as_bytes());
                }
                FormEntry::File(file) => {
                    buf.put_slice(b"; filename=\"");
                    buf.put_slice(escape_quoted(&file.file_name).as_bytes());
                    buf.put_slice(b"\"\r\nContent-Type: ");
                    buf.put_slice(file.mime.as_bytes());
                    buf.put_slice(b"\r\n\r\n");
                    buf.put_slice(&file.bytes);
                }
            }
            buf.put_slice(b"\r\n");
        }
        buf.put_slice(b"--");
        buf.put_slice(boundary.as_bytes());
        buf.put_slice(b"--\r\n");
        buf.freeze()
    }
}

fn escape_quoted(value: &str) -> String {
    value
        .replace('"', "%22")
        .replace('\r', "%0D")
        .replace('\n', "%0A")
}

/// Generate a random multipart boundary.
pub(crate) fn generate_boundary() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(BOUNDARY_LEN)
        .map(char::from)
        .collect();
    format!("courier-{suffix}")
}

/// The default request transform.
///
/// Key/value payloads and JSON objects become a multipart form. Other JSON
/// values are sent as `application/json`, text and bytes pass through.
pub fn multipart_transform(
    data: RequestData,
    headers: &mut http::HeaderMap,
) -> Result<PreparedBody> {
    let body = match data {
        RequestData::Empty => PreparedBody::Empty,
        RequestData::Fields(fields) => PreparedBody::Multipart(FormData::from_fields(fields)),
        RequestData::Json(serde_json::Value::Object(object)) => {
            PreparedBody::Multipart(FormData::from_json_object(&object))
        }
        RequestData::Json(value) => PreparedBody::Bytes {
            bytes: Bytes::from(serde_json::to_vec(&value)?),
            content_type: Some("application/json".to_string()),
        },
        RequestData::Text(text) => PreparedBody::Bytes {
            bytes: Bytes::from(text),
            content_type: Some("text/plain; charset=utf-8".to_string()),
        },
        RequestData::Bytes(bytes) => PreparedBody::Bytes {
            bytes,
            content_type: None,
        },
    };
    if matches!(body, PreparedBody::Multipart(_)) {
        // The boundary is chosen at send time; a caller-set type would not match it.
        headers.remove(http::header::CONTENT_TYPE);
    }
    Ok(body)
}

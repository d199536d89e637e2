//! PHP-style query-string serialization.
//!
//! Nested objects and arrays are flattened with bracket notation, the way
//! PHP's `http_build_query` does:
//!
//! ```text
//! {"filter": {"status": "open"}, "ids": [4, 9]}
//!     -> filter[status]=open&ids[0]=4&ids[1]=9   (brackets percent-encoded)
//! ```

use serde_json::Value;
use url::form_urlencoded;

/// Serialize a params object into a query string, without the leading `?`.
///
/// `null` encodes as an empty value, empty arrays and objects are dropped,
/// and a value that is not an object produces an empty string.
pub fn to_php_query(params: &Value) -> String {
    let mut pairs = Vec::new();
    if let Value::Object(map) = params {
        for (key, value) in map {
            flatten(key.clone(), value, &mut pairs);
        }
    }

    let mut serializer = form_urlencoded::Serializer::new(String::new());
    for (key, value) in &pairs {
        serializer.append_pair(key, value);
    }
    serializer.finish()
}

fn flatten(prefix: String, value: &Value, out: &mut Vec<(String, String)>) {
    match value {
        Value::Null => out.push((prefix, String::new())),
        Value::Bool(b) => out.push((prefix, b.to_string())),
        Value::Number(n) => out.push((prefix, n.to_string())),
        Value::String(s) => out.push((prefix, s.clone())),
        Value::Array(items) => {
            for (index, item) in items.iter().enumerate() {
                flatten(format!("{prefix}[{index}]"), item, out);
            }
        }
        Value::Object(map) => {
            for (key, item) in map {
                flatten(format!("{prefix}[{key}]"), item, out);
            }
        }
    }
}

/// Append a serialized query to a URL, keeping any query it already has.
pub(crate) fn append_query(url: &mut url::Url, query: &str) {
    if query.is_empty() {
        return;
    }
    let merged = match url.query() {
        Some(existing) if !existing.is_empty() => format!("{existing}&{query}"),
        _ => query.to_string(),
    };
    url.set_query(Some(&merged));
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn decoded(query: &str) -> Vec<(String, String)> {
        let mut pairs: Vec<_> = form_urlencoded::parse(query.as_bytes())
            .into_owned()
            .collect();
        pairs.sort();
        pairs
    }

    #[test]
    fn flat_scalars() {
        let query = to_php_query(&json!({"page": 2, "q": "rust lang", "exact": false}));
        assert!(query.contains("q=rust+lang"));
        assert_eq!(
            decoded(&query),
            [
                ("exact".to_string(), "false".to_string()),
                ("page".to_string(), "2".to_string()),
                ("q".to_string(), "rust lang".to_string()),
            ]
        );
    }

    #[test]
    fn arrays_use_indexed_brackets() {
        let query = to_php_query(&json!({"ids": [4, 9]}));
        assert_eq!(query, "ids%5B0%5D=4&ids%5B1%5D=9");
        assert_eq!(
            decoded(&query),
            [("ids[0]".to_string(), "4".to_string()), ("ids[1]".to_string(), "9".to_string())]
        );
    }

    #[test]
    fn nested_objects() {
        let query = to_php_query(&json!({
            "filter": {"status": "open", "owner": {"id": 3}},
            "sort": [{"field": "name"}]
        }));
        assert_eq!(
            decoded(&query),
            [
                ("filter[owner][id]".to_string(), "3".to_string()),
                ("filter[status]".to_string(), "open".to_string()),
                ("sort[0][field]".to_string(), "name".to_string()),
            ]
        );
    }

    #[test]
    fn null_and_empty_values() {
        let query = to_php_query(&json!({"a": null, "b": [], "c": {}}));
        assert_eq!(query, "a=");
    }

    #[test]
    fn non_object_is_empty() {
        assert_eq!(to_php_query(&Value::Null), "");
        assert_eq!(to_php_query(&json!([1, 2])), "");
        assert_eq!(to_php_query(&json!("x")), "");
    }

    #[test]
    fn append_keeps_existing_query() {
        let mut url = url::Url::parse("https://example.com/search?lang=en").unwrap();
        append_query(&mut url, "page=2");
        assert_eq!(url.as_str(), "https://example.com/search?lang=en&page=2");

        let mut url = url::Url::parse("https://example.com/search").unwrap();
        append_query(&mut url, "page=2");
        assert_eq!(url.as_str(), "https://example.com/search?page=2");

        append_query(&mut url, "");
        assert_eq!(url.as_str(), "https://example.com/search?page=2");
    }
}

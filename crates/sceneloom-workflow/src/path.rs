//! Dot-path lookup over JSON documents.
//!
//! A path like `result.videos.url` walks object keys one segment at a time.
//! Numeric segments also index into arrays (`shots.0.prompt`).

use crate::error::{json_type_name, Error, Result};
use serde_json::Value;

/// Look up a dot-separated path in a JSON value.
pub fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .filter(|segment| !segment.is_empty())
        .try_fold(value, |current, segment| match current {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        })
}

/// Extract `path` from every element of a JSON array and join the results.
///
/// Elements where the path does not resolve (or resolves to `null`)
/// contribute `placeholder`. Strings are used verbatim, other values in their
/// compact JSON form.
pub fn concat_by_path(
    document: &Value,
    path: &str,
    delimiter: &str,
    placeholder: &str,
) -> Result<String> {
    let Value::Array(items) = document else {
        return Err(Error::NotAnArray {
            found: json_type_name(document),
        });
    };

    let parts: Vec<String> = items
        .iter()
        .map(|item| match lookup(item, path) {
            None | Some(Value::Null) => placeholder.to_string(),
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        })
        .collect();

    Ok(parts.join(delimiter))
}

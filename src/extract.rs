//! Tolerant extraction of structured output from agent text.
//!
//! Agents are asked to reply with a JSON object, but in practice the object
//! arrives wrapped in prose, markdown fences, or trailing commentary. This
//! module locates the first balanced JSON object in a blob of text and feeds
//! it through serde, so callers get a typed value or a clear error.

use serde::de::DeserializeOwned;

use crate::{Error, Result};

/// Locate the first balanced `{ ... }` span in `text`.
///
/// The scan is brace-counting but string-aware: braces inside JSON string
/// literals (including escaped quotes) do not affect the depth. Returns the
/// span including both outer braces, or `None` if no balanced object exists.
pub fn first_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let bytes = text.as_bytes();

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &b) in bytes[start..].iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Extract the first JSON object in `text` as an untyped value.
pub fn extract_value(text: &str) -> Result<serde_json::Value> {
    let span = first_json_object(text).ok_or(Error::NoJsonObject)?;
    Ok(serde_json::from_str(span)?)
}

/// Extract the first JSON object in `text` into a typed value.
pub fn extract<T: DeserializeOwned>(text: &str) -> Result<T> {
    let span = first_json_object(text).ok_or(Error::NoJsonObject)?;
    Ok(serde_json::from_str(span)?)
}

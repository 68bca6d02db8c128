use serde_json::Value;

use crate::ops::OpError;

/// Decode one RFC-6901 token (`~1` then `~0`).
pub fn decode_segment(segment: &str) -> String {
    segment.replace("~1", "/").replace("~0", "~")
}

/// Re-encode a token for embedding in a pointer.
pub fn encode_segment(segment: &str) -> String {
    segment.replace('~', "~0").replace('/', "~1")
}

/// Split a pointer into decoded tokens. The empty pointer is the document
/// root and yields no tokens.
pub fn parse_pointer(pointer: &str) -> Vec<String> {
    if pointer.is_empty() {
        return Vec::new();
    }
    let mut parts: Vec<&str> = pointer.split('/').collect();
    if parts.first() == Some(&"") {
        parts.remove(0);
    }
    parts.into_iter().map(decode_segment).collect()
}

pub(crate) fn index_of(token: &str, len: usize, allow_end: bool) -> Result<usize, OpError> {
    if token.is_empty() || !token.bytes().all(|b| b.is_ascii_digit()) {
        return Err(OpError::InvalidIndex);
    }
    let idx: usize = token.parse().map_err(|_| OpError::InvalidIndex)?;
    let max = if allow_end { len } else { len.saturating_sub(1) };
    if len == 0 && !allow_end {
        return Err(OpError::IndexOutOfRange);
    }
    if idx > max {
        return Err(OpError::IndexOutOfRange);
    }
    Ok(idx)
}

/// Look up the value a fully numeric pointer addresses.
pub fn get_value<'a>(doc: &'a Value, pointer: &str) -> Result<&'a Value, OpError> {
    let mut current = doc;
    for token in parse_pointer(pointer) {
        match current {
            Value::Object(map) => {
                current = map.get(&token).ok_or(OpError::MissingKey)?;
            }
            Value::Array(items) => {
                let idx = index_of(&token, items.len(), false)?;
                current = &items[idx];
            }
            _ => return Err(OpError::NonContainer),
        }
    }
    Ok(current)
}

/// Walk to the parent container of the pointer's last token.
///
/// Returns the mutable container and the final (decoded) token; the root
/// pointer has no container.
pub(crate) fn container_and_token<'a>(
    doc: &'a mut Value,
    pointer: &str,
) -> Result<Option<(&'a mut Value, String)>, OpError> {
    let mut tokens = parse_pointer(pointer);
    let last = match tokens.pop() {
        Some(last) => last,
        None => return Ok(None),
    };
    let mut current = doc;
    for token in tokens {
        match current {
            Value::Object(map) => {
                current = map.get_mut(&token).ok_or(OpError::MissingKey)?;
            }
            Value::Array(items) => {
                let len = items.len();
                let idx = index_of(&token, len, false)?;
                current = &mut items[idx];
            }
            _ => return Err(OpError::NonContainer),
        }
    }
    Ok(Some((current, last)))
}

pub(crate) use index_of as array_index;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_decodes_escapes() {
        assert_eq!(parse_pointer("/a~1b/c~0d"), vec!["a/b", "c~d"]);
        assert!(parse_pointer("").is_empty());
    }

    #[test]
    fn get_traverses_objects_and_arrays() {
        let doc = json!({"a": [{"b": 1}, {"b": 2}]});
        assert_eq!(get_value(&doc, "/a/1/b").unwrap(), &json!(2));
        assert_eq!(get_value(&doc, "").unwrap(), &doc);
    }

    #[test]
    fn get_reports_typed_failures() {
        let doc = json!({"a": [1]});
        assert_eq!(get_value(&doc, "/missing").unwrap_err(), OpError::MissingKey);
        assert_eq!(get_value(&doc, "/a/5").unwrap_err(), OpError::IndexOutOfRange);
        assert_eq!(get_value(&doc, "/a/x").unwrap_err(), OpError::InvalidIndex);
        assert_eq!(get_value(&doc, "/a/0/b").unwrap_err(), OpError::NonContainer);
    }
}

//! Canonical JSON serialization and content hashing.
//!
//! Canonical form: object keys sorted by UTF-8 code point, no insignificant
//! whitespace, integers without a decimal point, floats in their shortest
//! round-trip form. The encoding is type-preserving: `1` and `1.0` produce
//! different bytes and therefore different hashes.

use serde_json::Value;
use sha2::{Digest, Sha256};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CanonicalizeError {
    #[error("non-finite number at {path}")]
    NonFinite { path: String },
    #[error("unrepresentable number at {path}")]
    BadNumber { path: String },
}

/// Serialize a JSON value to its canonical byte form.
pub fn canonical_json_bytes(value: &Value) -> Result<Vec<u8>, CanonicalizeError> {
    let mut buf = Vec::with_capacity(256);
    write_canonical(value, "$", &mut buf)?;
    Ok(buf)
}

fn write_canonical(value: &Value, path: &str, out: &mut Vec<u8>) -> Result<(), CanonicalizeError> {
    match value {
        Value::Null => out.extend_from_slice(b"null"),
        Value::Bool(true) => out.extend_from_slice(b"true"),
        Value::Bool(false) => out.extend_from_slice(b"false"),
        Value::Number(n) => {
            if let Some(f) = n.as_f64() {
                if !f.is_finite() {
                    return Err(CanonicalizeError::NonFinite {
                        path: path.to_string(),
                    });
                }
            }
            // serde_json renders i64/u64 without a decimal point and floats
            // in shortest round-trip form, which is exactly the canonical
            // number encoding.
            let rendered = serde_json::to_vec(n).map_err(|_| CanonicalizeError::BadNumber {
                path: path.to_string(),
            })?;
            out.extend_from_slice(&rendered);
        }
        Value::String(s) => write_escaped(s, out),
        Value::Array(items) => {
            out.push(b'[');
            for (idx, item) in items.iter().enumerate() {
                if idx > 0 {
                    out.push(b',');
                }
                write_canonical(item, &format!("{path}[{idx}]"), out)?;
            }
            out.push(b']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort_unstable();
            out.push(b'{');
            for (idx, key) in keys.iter().enumerate() {
                if idx > 0 {
                    out.push(b',');
                }
                write_escaped(key, out);
                out.push(b':');
                write_canonical(&map[key.as_str()], &format!("{path}.{key}"), out)?;
            }
            out.push(b'}');
        }
    }
    Ok(())
}

fn write_escaped(s: &str, out: &mut Vec<u8>) {
    out.push(b'"');
    for ch in s.chars() {
        match ch {
            '"' => out.extend_from_slice(b"\\\""),
            '\\' => out.extend_from_slice(b"\\\\"),
            '\n' => out.extend_from_slice(b"\\n"),
            '\r' => out.extend_from_slice(b"\\r"),
            '\t' => out.extend_from_slice(b"\\t"),
            c if (c as u32) < 0x20 => {
                out.extend_from_slice(format!("\\u{:04x}", c as u32).as_bytes());
            }
            c => {
                let mut encoded = [0u8; 4];
                out.extend_from_slice(c.encode_utf8(&mut encoded).as_bytes());
            }
        }
    }
    out.push(b'"');
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HashParseError {
    #[error("hash string must start with 'sha256:'")]
    MissingPrefix,
    #[error("invalid hex digest: {0}")]
    BadHex(String),
    #[error("digest must be 32 bytes, got {0}")]
    BadLength(usize),
}

/// SHA-256 digest of a canonical JSON document, rendered as `sha256:<hex>`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentHash(pub [u8; 32]);

impl ContentHash {
    pub fn of_bytes(bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        let out = hasher.finalize();
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&out);
        ContentHash(arr)
    }

    /// Hash a JSON value via its canonical byte form.
    pub fn of_value(value: &Value) -> Result<Self, CanonicalizeError> {
        Ok(Self::of_bytes(&canonical_json_bytes(value)?))
    }

    pub fn to_hex(&self) -> String {
        format!("sha256:{}", hex::encode(self.0))
    }

    pub fn from_hex_str(value: &str) -> Result<Self, HashParseError> {
        let digest = value
            .strip_prefix("sha256:")
            .ok_or(HashParseError::MissingPrefix)?;
        let bytes = hex::decode(digest).map_err(|e| HashParseError::BadHex(e.to_string()))?;
        if bytes.len() != 32 {
            return Err(HashParseError::BadLength(bytes.len()));
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(ContentHash(arr))
    }

    /// Loose check for the wire form, used before attempting a full parse.
    pub fn looks_like_hash(value: &str) -> bool {
        value.starts_with("sha256:")
    }
}

impl std::fmt::Display for ContentHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl std::fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ContentHash({})", self.to_hex())
    }
}

impl std::str::FromStr for ContentHash {
    type Err = HashParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ContentHash::from_hex_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn hash_insensitive_to_key_order() {
        let a = json!({"b": 1, "a": 2});
        let b = json!({"a": 2, "b": 1});
        assert_eq!(
            ContentHash::of_value(&a).unwrap(),
            ContentHash::of_value(&b).unwrap()
        );
    }

    #[test]
    fn hash_differs_for_different_content() {
        let a = json!({"a": 1});
        let b = json!({"a": 2});
        assert_ne!(
            ContentHash::of_value(&a).unwrap(),
            ContentHash::of_value(&b).unwrap()
        );
    }

    #[test]
    fn hash_format() {
        let h = ContentHash::of_value(&json!({"a": 1})).unwrap().to_hex();
        assert!(h.starts_with("sha256:"));
        assert_eq!(h.len(), "sha256:".len() + 64);
    }

    #[test]
    fn integers_and_floats_hash_differently() {
        let a = json!({"n": 1});
        let b = json!({"n": 1.0});
        assert_ne!(
            ContentHash::of_value(&a).unwrap(),
            ContentHash::of_value(&b).unwrap()
        );
    }

    #[test]
    fn canonical_bytes_sort_keys_without_whitespace() {
        let value = json!({"b": [1, 2], "a": {"y": true, "x": null}});
        let bytes = canonical_json_bytes(&value).unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            r#"{"a":{"x":null,"y":true},"b":[1,2]}"#
        );
    }

    #[test]
    fn strings_are_escaped() {
        let value = json!({"s": "a\"b\\c\n"});
        let bytes = canonical_json_bytes(&value).unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            r#"{"s":"a\"b\\c\n"}"#
        );
    }

    #[test]
    fn round_trip_hex() {
        let h = ContentHash::of_value(&json!({"a": 1})).unwrap();
        let parsed = ContentHash::from_hex_str(&h.to_hex()).unwrap();
        assert_eq!(h, parsed);
    }

    #[test]
    fn rejects_malformed_hash_strings() {
        assert_eq!(
            ContentHash::from_hex_str("md5:abcd"),
            Err(HashParseError::MissingPrefix)
        );
        assert!(matches!(
            ContentHash::from_hex_str("sha256:zz"),
            Err(HashParseError::BadHex(_))
        ));
        assert!(matches!(
            ContentHash::from_hex_str("sha256:abcd"),
            Err(HashParseError::BadLength(2))
        ));
    }
}

//! Hash-activity domain types: algorithms, results, and byte-buffer
//! representations.
//!
//! Uploaded bytes cross the queue as opaque serialized values and may arrive
//! in several historical shapes (a canonical base64 buffer, a plain integer
//! sequence, a `{data: [...]}` wrapper, a hex view). `ByteSource` gives each
//! representation an explicit tagged variant and resolves untyped JSON once
//! at the API boundary instead of shape-sniffing inside the activity.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// HashAlgorithm
// ---------------------------------------------------------------------------

/// Supported digest algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    Md5,
    Sha1,
    Sha256,
    Sha512,
    Blake3,
}

impl HashAlgorithm {
    /// All supported algorithms, in the order the upload API requests them.
    pub const ALL: [HashAlgorithm; 5] = [
        HashAlgorithm::Md5,
        HashAlgorithm::Sha1,
        HashAlgorithm::Sha256,
        HashAlgorithm::Sha512,
        HashAlgorithm::Blake3,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            HashAlgorithm::Md5 => "md5",
            HashAlgorithm::Sha1 => "sha1",
            HashAlgorithm::Sha256 => "sha256",
            HashAlgorithm::Sha512 => "sha512",
            HashAlgorithm::Blake3 => "blake3",
        }
    }
}

impl std::fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for HashAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "md5" => Ok(HashAlgorithm::Md5),
            "sha1" => Ok(HashAlgorithm::Sha1),
            "sha256" => Ok(HashAlgorithm::Sha256),
            "sha512" => Ok(HashAlgorithm::Sha512),
            "blake3" => Ok(HashAlgorithm::Blake3),
            other => Err(format!("unsupported hash algorithm: '{other}'")),
        }
    }
}

// ---------------------------------------------------------------------------
// HashResult
// ---------------------------------------------------------------------------

/// Result of one digest computation.
///
/// Serialized camelCase because it flows unchanged into the polling API's
/// `hashes` array.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HashResult {
    pub algorithm: HashAlgorithm,
    /// Lowercase hex digest.
    pub digest: String,
    pub computed_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// ByteSource
// ---------------------------------------------------------------------------

/// A byte buffer in one of the accepted wire representations.
///
/// One explicit variant per representation; `canonical_bytes` collapses all
/// of them to the same canonical byte sequence. Canonicalization never fails:
/// malformed encodings degrade to the empty byte sequence, so a corrupt
/// payload hashes as empty input instead of erroring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "repr", rename_all = "snake_case")]
pub enum ByteSource {
    /// Canonical base64-encoded byte buffer.
    Base64 { data: String },
    /// Plain sequence of integers; each value is truncated to 0-255.
    Ints { data: Vec<i64> },
    /// Structurally-tagged wrapper exposing a `data` field holding an
    /// integer sequence (serialized-buffer shape).
    Wrapped { data: Vec<i64> },
    /// Hex view over a contiguous byte region.
    Hex { data: String },
}

impl ByteSource {
    /// The empty byte buffer.
    pub fn empty() -> Self {
        ByteSource::Base64 { data: String::new() }
    }

    /// Canonical representation of an in-memory byte slice.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        ByteSource::Base64 { data: BASE64.encode(bytes) }
    }

    /// Resolve an untyped JSON value into a `ByteSource`.
    ///
    /// Shape precedence: the tagged canonical form, then a plain integer
    /// array, then a `{data: [...]}` wrapper, then a string treated as hex
    /// when it looks like hex and base64 otherwise. Anything else resolves
    /// to the empty buffer -- malformed input never errors here.
    pub fn from_value(value: &Value) -> Self {
        if value.get("repr").is_some() {
            if let Ok(source) = serde_json::from_value::<ByteSource>(value.clone()) {
                return source;
            }
        }

        if let Some(items) = value.as_array() {
            return ByteSource::Ints { data: int_sequence(items) };
        }

        if let Some(items) = value.get("data").and_then(Value::as_array) {
            return ByteSource::Wrapped { data: int_sequence(items) };
        }

        if let Some(s) = value.as_str() {
            if looks_like_hex(s) {
                return ByteSource::Hex { data: s.to_string() };
            }
            // Best-effort binary reinterpretation: base64 is attempted at
            // canonicalization time and degrades to empty if invalid.
            return ByteSource::Base64 { data: s.to_string() };
        }

        ByteSource::empty()
    }

    /// Collapse this representation to the canonical byte sequence.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        match self {
            ByteSource::Base64 { data } => BASE64.decode(data).unwrap_or_default(),
            ByteSource::Ints { data } | ByteSource::Wrapped { data } => {
                data.iter().map(|v| (v & 0xFF) as u8).collect()
            }
            ByteSource::Hex { data } => hex::decode(data).unwrap_or_default(),
        }
    }

    /// Length of the canonical byte sequence.
    pub fn len(&self) -> usize {
        self.canonical_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn int_sequence(items: &[Value]) -> Vec<i64> {
    items
        .iter()
        .map(|v| v.as_i64().or_else(|| v.as_f64().map(|f| f as i64)).unwrap_or(0))
        .collect()
}

/// Non-empty, even-length, all hex digits.
fn looks_like_hex(s: &str) -> bool {
    !s.is_empty() && s.len() % 2 == 0 && s.bytes().all(|b| b.is_ascii_hexdigit())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn algorithm_parse_roundtrip() {
        for alg in HashAlgorithm::ALL {
            let parsed: HashAlgorithm = alg.as_str().parse().unwrap();
            assert_eq!(parsed, alg);
        }
        assert!("sha3".parse::<HashAlgorithm>().is_err());
    }

    #[test]
    fn algorithm_serde_is_lowercase() {
        assert_eq!(
            serde_json::to_string(&HashAlgorithm::Blake3).unwrap(),
            "\"blake3\""
        );
        let parsed: HashAlgorithm = serde_json::from_str("\"sha512\"").unwrap();
        assert_eq!(parsed, HashAlgorithm::Sha512);
    }

    #[test]
    fn all_representations_canonicalize_identically() {
        let bytes = b"workloom".to_vec();
        let sources = [
            ByteSource::from_bytes(&bytes),
            ByteSource::Ints {
                data: bytes.iter().map(|b| *b as i64).collect(),
            },
            ByteSource::Wrapped {
                data: bytes.iter().map(|b| *b as i64).collect(),
            },
            ByteSource::Hex { data: hex::encode(&bytes) },
        ];
        for source in sources {
            assert_eq!(source.canonical_bytes(), bytes);
        }
    }

    #[test]
    fn int_values_truncate_modulo_256() {
        let source = ByteSource::Ints { data: vec![256, 257, -1, 511] };
        assert_eq!(source.canonical_bytes(), vec![0, 1, 255, 255]);
    }

    #[test]
    fn malformed_encodings_degrade_to_empty() {
        assert!(ByteSource::Base64 { data: "!!not base64!!".to_string() }
            .canonical_bytes()
            .is_empty());
        assert!(ByteSource::Hex { data: "zz".to_string() }
            .canonical_bytes()
            .is_empty());
    }

    #[test]
    fn from_value_resolves_tagged_form_first() {
        let value = json!({"repr": "hex", "data": "00ff"});
        let source = ByteSource::from_value(&value);
        assert_eq!(source, ByteSource::Hex { data: "00ff".to_string() });
        assert_eq!(source.canonical_bytes(), vec![0x00, 0xFF]);
    }

    #[test]
    fn from_value_resolves_plain_array() {
        let source = ByteSource::from_value(&json!([1, 2, 3]));
        assert_eq!(source.canonical_bytes(), vec![1, 2, 3]);
    }

    #[test]
    fn from_value_resolves_wrapped_buffer_shape() {
        // Serialized Node-style buffer: {"type": "Buffer", "data": [...]}
        let source = ByteSource::from_value(&json!({"type": "Buffer", "data": [10, 20]}));
        assert_eq!(source, ByteSource::Wrapped { data: vec![10, 20] });
        assert_eq!(source.canonical_bytes(), vec![10, 20]);
    }

    #[test]
    fn from_value_resolves_strings_by_shape() {
        let hexish = ByteSource::from_value(&json!("deadbeef"));
        assert_eq!(hexish.canonical_bytes(), vec![0xDE, 0xAD, 0xBE, 0xEF]);

        let b64 = ByteSource::from_value(&json!("d29ya2xvb20="));
        assert_eq!(b64.canonical_bytes(), b"workloom".to_vec());
    }

    #[test]
    fn from_value_unrecognized_shape_is_empty() {
        assert!(ByteSource::from_value(&json!(42)).is_empty());
        assert!(ByteSource::from_value(&json!({"other": true})).is_empty());
        assert!(ByteSource::from_value(&Value::Null).is_empty());
    }

    #[test]
    fn hash_result_serializes_camel_case() {
        let result = HashResult {
            algorithm: HashAlgorithm::Md5,
            digest: "d41d8cd98f00b204e9800998ecf8427e".to_string(),
            computed_at: Utc::now(),
        };
        let s = serde_json::to_string(&result).unwrap();
        assert!(s.contains("\"computedAt\""));
        assert!(s.contains("\"algorithm\":\"md5\""));
    }
}

//! The hash activity: digest computation over normalized byte buffers.
//!
//! md5/sha1/sha256/sha512 use the RustCrypto digest crates; blake3 uses the
//! dedicated `blake3` implementation. Output is lowercase hex in every case,
//! and identical canonical input always produces identical output (no salts,
//! no keys).

use chrono::Utc;
use futures_util::future::BoxFuture;
use md5::Md5;
use serde_json::Value;
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha512};

use workloom_core::registry::ActivityHandler;
use workloom_types::error::ActivityError;
use workloom_types::hash::{ByteSource, HashAlgorithm, HashResult};
use workloom_types::task::ActivityOptions;

/// Registered name of the hash activity.
pub const COMPUTE_HASH_ACTIVITY: &str = "compute-hash";

/// Declared execution policy: 3 tries, 30-second deadline per attempt.
pub fn compute_hash_options() -> ActivityOptions {
    ActivityOptions { tries: 3, timeout_secs: 30 }
}

/// Compute the lowercase hex digest of `bytes` under `algorithm`.
pub fn digest_hex(bytes: &[u8], algorithm: HashAlgorithm) -> String {
    match algorithm {
        HashAlgorithm::Md5 => hex::encode(Md5::digest(bytes)),
        HashAlgorithm::Sha1 => hex::encode(Sha1::digest(bytes)),
        HashAlgorithm::Sha256 => hex::encode(Sha256::digest(bytes)),
        HashAlgorithm::Sha512 => hex::encode(Sha512::digest(bytes)),
        HashAlgorithm::Blake3 => blake3::hash(bytes).to_hex().to_string(),
    }
}

/// Activity computing one digest for one buffer.
///
/// Args: `[byte_source, algorithm]`. The buffer argument is resolved through
/// `ByteSource::from_value`, so any of the accepted representations works
/// and malformed buffers degrade to the empty-input digest rather than
/// failing the attempt.
pub struct ComputeHashActivity;

impl ActivityHandler for ComputeHashActivity {
    fn execute(&self, args: Vec<Value>) -> BoxFuture<'static, Result<Value, ActivityError>> {
        Box::pin(async move {
            let source = args
                .first()
                .map(ByteSource::from_value)
                .unwrap_or_else(ByteSource::empty);

            let algorithm: HashAlgorithm = args
                .get(1)
                .and_then(|v| serde_json::from_value(v.clone()).ok())
                .ok_or_else(|| {
                    ActivityError::Execution("missing or invalid algorithm argument".to_string())
                })?;

            let bytes = source.canonical_bytes();
            let result = HashResult {
                algorithm,
                digest: digest_hex(&bytes, algorithm),
                computed_at: Utc::now(),
            };

            tracing::debug!(
                algorithm = algorithm.as_str(),
                input_len = bytes.len(),
                "computed digest"
            );

            serde_json::to_value(result)
                .map_err(|e| ActivityError::Execution(format!("serialize hash result: {e}")))
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // Published empty-input digests for every supported algorithm.
    const EMPTY_VECTORS: [(HashAlgorithm, &str); 5] = [
        (HashAlgorithm::Md5, "d41d8cd98f00b204e9800998ecf8427e"),
        (HashAlgorithm::Sha1, "da39a3ee5e6b4b0d3255bfef95601890afd80709"),
        (
            HashAlgorithm::Sha256,
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855",
        ),
        (
            HashAlgorithm::Sha512,
            "cf83e1357eefb8bdf1542850d66d8007d620e4050b5715dc83f4a921d36ce9ce47d0d13c5d85f2b0ff8318d2877eec2f63b931bd47417a81a538327af927da3e",
        ),
        (
            HashAlgorithm::Blake3,
            "af1349b9f5f9a1a6a0404dea36dcc9499bcb25c9adc112b7cc9a93cae41f3262",
        ),
    ];

    #[test]
    fn empty_input_matches_published_vectors() {
        for (algorithm, expected) in EMPTY_VECTORS {
            assert_eq!(digest_hex(b"", algorithm), expected, "{algorithm}");
        }
    }

    #[test]
    fn abc_matches_published_vectors() {
        assert_eq!(
            digest_hex(b"abc", HashAlgorithm::Md5),
            "900150983cd24fb0d6963f7d28e17f72"
        );
        assert_eq!(
            digest_hex(b"abc", HashAlgorithm::Sha1),
            "a9993e364706816aba3e25717850c26c9cd0d89d"
        );
        assert_eq!(
            digest_hex(b"abc", HashAlgorithm::Sha256),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(
            digest_hex(b"abc", HashAlgorithm::Sha512),
            "ddaf35a193617abacc417349ae20413112e6fa4e89a97ea20a9eeee64b55d39a2192992a274fc1a836ba3c23a3feebbd454d4423643ce80e2a9ac94fa54ca49f"
        );
    }

    #[test]
    fn blake3_is_deterministic_and_distinct() {
        let a = digest_hex(b"abc", HashAlgorithm::Blake3);
        assert_eq!(a.len(), 64);
        assert_eq!(a, digest_hex(b"abc", HashAlgorithm::Blake3));
        assert_ne!(a, digest_hex(b"abd", HashAlgorithm::Blake3));
    }

    #[test]
    fn digests_are_lowercase_hex() {
        for algorithm in HashAlgorithm::ALL {
            let digest = digest_hex(b"workloom", algorithm);
            assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
            assert!(!digest.chars().any(|c| c.is_ascii_uppercase()));
        }
    }

    #[tokio::test]
    async fn all_buffer_representations_yield_identical_digest() {
        let bytes = b"same bytes".to_vec();
        let representations = [
            serde_json::to_value(ByteSource::from_bytes(&bytes)).unwrap(),
            json!(bytes.iter().map(|b| *b as i64).collect::<Vec<_>>()),
            json!({"type": "Buffer", "data": bytes.iter().map(|b| *b as i64).collect::<Vec<_>>()}),
            json!(hex::encode(&bytes)),
        ];

        let mut digests = Vec::new();
        for repr in representations {
            let result = ComputeHashActivity
                .execute(vec![repr, json!("sha256")])
                .await
                .unwrap();
            digests.push(result["digest"].as_str().unwrap().to_string());
        }
        assert!(digests.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(digests[0], digest_hex(&bytes, HashAlgorithm::Sha256));
    }

    #[tokio::test]
    async fn malformed_buffer_degrades_to_empty_digest() {
        let result = ComputeHashActivity
            .execute(vec![json!({"garbage": true}), json!("md5")])
            .await
            .unwrap();
        assert_eq!(
            result["digest"].as_str().unwrap(),
            "d41d8cd98f00b204e9800998ecf8427e"
        );
    }

    #[tokio::test]
    async fn missing_algorithm_is_an_execution_error() {
        let err = ComputeHashActivity
            .execute(vec![json!([1, 2, 3])])
            .await
            .unwrap_err();
        assert!(matches!(err, ActivityError::Execution(_)));
    }

    #[test]
    fn declared_policy_is_three_tries_thirty_seconds() {
        let options = compute_hash_options();
        assert_eq!(options.tries, 3);
        assert_eq!(options.timeout_secs, 30);
    }
}

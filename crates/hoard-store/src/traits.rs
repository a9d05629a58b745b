use bytes::Bytes;
use hoard_crypto::{ChunkSignature, VerifyingKey};
use hoard_types::{ChunkHash, ChunkKind, HashSpan};
use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

/// Configuration a server advertises to an authenticated identity.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfiguration {
    /// Portions of the hash space this server is responsible for storing.
    #[serde(default)]
    pub hash_spans: Vec<HashSpan>,
}

impl ServerConfiguration {
    /// Returns `true` if any declared span covers `hash`.
    pub fn covers(&self, hash: &ChunkHash) -> bool {
        HashSpan::any_contains(&self.hash_spans, hash)
    }
}

/// Result of a single logical push.
///
/// A push may fan out internally (for example to several disks behind one
/// server); each failed attempt is recorded here.
#[derive(Debug, Default)]
pub struct PushOutcome {
    pub errors: Vec<StoreError>,
}

impl PushOutcome {
    /// A push that fully succeeded.
    pub fn ok() -> Self {
        Self { errors: Vec::new() }
    }

    /// A push that failed with a single error.
    pub fn failed(error: StoreError) -> Self {
        Self {
            errors: vec![error],
        }
    }

    /// Returns `true` if no attempt failed.
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Connection to a chunk store peer.
///
/// All calls are blocking. Implementations must be safe to share between
/// replication worker threads.
pub trait ChunkStore: Send + Sync {
    /// Host name identifying this peer.
    fn host(&self) -> &str;

    /// Check whether the peer holds a chunk. Idempotent.
    fn has_chunk(&self, hash: &ChunkHash, kind: ChunkKind) -> StoreResult<bool>;

    /// Fetch a chunk. Fails with [`StoreError::NotFound`] if absent.
    fn get_chunk(&self, hash: &ChunkHash, kind: ChunkKind) -> StoreResult<Bytes>;

    /// Push a chunk signed by `signature`.
    fn set_chunk(
        &self,
        signature: &ChunkSignature,
        hash: &ChunkHash,
        kind: ChunkKind,
        data: &Bytes,
    ) -> StoreResult<PushOutcome>;

    /// Fetch the configuration the peer advertises to `identity`.
    fn configuration(&self, identity: &VerifyingKey) -> StoreResult<ServerConfiguration>;
}

/// Validate a push before storing it: signature first, then content hash
/// for data chunks.
pub(crate) fn check_push(
    signature: &ChunkSignature,
    hash: &ChunkHash,
    kind: ChunkKind,
    data: &[u8],
) -> StoreResult<()> {
    signature
        .verify(hash, kind, data)
        .map_err(|_| StoreError::InvalidSignature(*hash))?;
    if kind == ChunkKind::Data {
        let computed = ChunkHash::compute(data);
        if computed != *hash {
            return Err(StoreError::HashMismatch {
                expected: *hash,
                computed,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hoard_crypto::SigningKey;

    #[test]
    fn outcome_success_flag() {
        assert!(PushOutcome::ok().is_success());
        assert!(!PushOutcome::failed(StoreError::Unreachable("x".into())).is_success());
    }

    #[test]
    fn configuration_covers() {
        let hash = ChunkHash::compute(b"covered");
        assert!(!ServerConfiguration::default().covers(&hash));
        let config = ServerConfiguration {
            hash_spans: vec![HashSpan::full()],
        };
        assert!(config.covers(&hash));
    }

    #[test]
    fn check_push_rejects_bad_hash() {
        let sk = SigningKey::generate();
        let wrong = ChunkHash::compute(b"something else");
        let sig = sk.sign_chunk(&wrong, ChunkKind::Data, b"data");
        let err = check_push(&sig, &wrong, ChunkKind::Data, b"data").unwrap_err();
        assert!(matches!(err, StoreError::HashMismatch { .. }));
    }

    #[test]
    fn check_push_allows_meta_data_under_foreign_key() {
        let sk = SigningKey::generate();
        let key = ChunkHash::compute(b"the file");
        let sig = sk.sign_chunk(&key, ChunkKind::MetaData, b"{}");
        assert!(check_push(&sig, &key, ChunkKind::MetaData, b"{}").is_ok());
    }

    #[test]
    fn check_push_rejects_bad_signature() {
        let sk = SigningKey::generate();
        let hash = ChunkHash::compute(b"data");
        let sig = sk.sign_chunk(&hash, ChunkKind::Data, b"data");
        let other = ChunkHash::compute(b"other");
        let err = check_push(&sig, &other, ChunkKind::Data, b"other").unwrap_err();
        assert!(matches!(err, StoreError::InvalidSignature(_)));
    }
}

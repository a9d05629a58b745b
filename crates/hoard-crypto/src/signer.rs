use std::path::Path;

use hoard_types::{ChunkHash, ChunkKind};

/// Ed25519 signing key (private).
pub struct SigningKey(ed25519_dalek::SigningKey);

/// Ed25519 verifying key (public). Identifies a signer to chunk servers.
#[derive(Clone, PartialEq, Eq)]
pub struct VerifyingKey(ed25519_dalek::VerifyingKey);

/// Ed25519 signature.
#[derive(Clone, PartialEq, Eq)]
pub struct Signature(ed25519_dalek::Signature);

/// Signature attached to a chunk push, binding the signer to the chunk's
/// key, kind, and bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChunkSignature {
    pub signer: VerifyingKey,
    pub signature: Signature,
}

const CHUNK_DOMAIN: &[u8] = b"hoard-chunk-v1:";

fn chunk_message(hash: &ChunkHash, kind: ChunkKind, data: &[u8]) -> Vec<u8> {
    let mut message = Vec::with_capacity(CHUNK_DOMAIN.len() + 1 + 40 + 32);
    message.extend_from_slice(CHUNK_DOMAIN);
    message.push(match kind {
        ChunkKind::Data => 0,
        ChunkKind::MetaData => 1,
    });
    message.extend_from_slice(hash.as_bytes());
    message.extend_from_slice(blake3::hash(data).as_bytes());
    message
}

impl SigningKey {
    /// Generate a new random signing key.
    pub fn generate() -> Self {
        let mut csprng = rand::thread_rng();
        Self(ed25519_dalek::SigningKey::generate(&mut csprng))
    }

    /// Create from raw 32-byte secret.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(ed25519_dalek::SigningKey::from_bytes(&bytes))
    }

    /// Parse a hex-encoded 32-byte secret.
    pub fn from_hex(s: &str) -> Result<Self, CryptoError> {
        let bytes = hex::decode(s.trim()).map_err(|e| CryptoError::InvalidKeyEncoding(e.to_string()))?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|b: Vec<u8>| CryptoError::InvalidKeyEncoding(format!("expected 32 bytes, got {}", b.len())))?;
        Ok(Self::from_bytes(arr))
    }

    /// Load a hex-encoded secret from a file.
    pub fn load(path: &Path) -> Result<Self, CryptoError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_hex(&text)
    }

    /// Write the hex-encoded secret to a file.
    pub fn save(&self, path: &Path) -> Result<(), CryptoError> {
        std::fs::write(path, format!("{}\n", hex::encode(self.0.as_bytes())))?;
        Ok(())
    }

    /// The corresponding public verifying key.
    pub fn verifying_key(&self) -> VerifyingKey {
        VerifyingKey(self.0.verifying_key())
    }

    /// Sign a message.
    pub fn sign(&self, message: &[u8]) -> Signature {
        use ed25519_dalek::Signer;
        Signature(self.0.sign(message))
    }

    /// Sign a chunk push.
    pub fn sign_chunk(&self, hash: &ChunkHash, kind: ChunkKind, data: &[u8]) -> ChunkSignature {
        ChunkSignature {
            signer: self.verifying_key(),
            signature: self.sign(&chunk_message(hash, kind, data)),
        }
    }
}

impl VerifyingKey {
    /// Verify a signature on a message.
    pub fn verify(&self, message: &[u8], signature: &Signature) -> Result<(), CryptoError> {
        use ed25519_dalek::Verifier;
        self.0
            .verify(message, &signature.0)
            .map_err(|_| CryptoError::InvalidSignature)
    }

    /// Raw public key bytes.
    pub fn as_bytes(&self) -> [u8; 32] {
        self.0.to_bytes()
    }

    /// Hex-encoded public key.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0.to_bytes())
    }
}

impl ChunkSignature {
    /// Check that this signature covers the given chunk.
    pub fn verify(&self, hash: &ChunkHash, kind: ChunkKind, data: &[u8]) -> Result<(), CryptoError> {
        self.signer
            .verify(&chunk_message(hash, kind, data), &self.signature)
    }
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SigningKey(<redacted>)")
    }
}

impl std::fmt::Debug for VerifyingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "VerifyingKey({})", self.to_hex())
    }
}

impl std::fmt::Debug for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Signature({}...)", hex::encode(&self.0.to_bytes()[..8]))
    }
}

/// Errors from key handling and signing.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("invalid signature")]
    InvalidSignature,
    #[error("invalid key encoding: {0}")]
    InvalidKeyEncoding(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

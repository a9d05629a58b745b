//! Signing primitives for Hoard.
//!
//! Servers only accept chunk pushes that are signed by a known identity.
//! This crate wraps Ed25519 (via `ed25519-dalek`) and defines the message a
//! push signature covers.
//!
//! All crypto operations wrap `ed25519-dalek` and `blake3`.

pub mod signer;

pub use signer::{ChunkSignature, CryptoError, Signature, SigningKey, VerifyingKey};

//! TOML configuration for the `hoard` binary.
//!
//! ```toml
//! [replication]
//! required_replications = 3
//! workers = 5
//!
//! [identity]
//! key_file = "/etc/hoard/key.hex"
//!
//! [[peer]]
//! host = "/srv/hoard/peer-a"
//! hash_spans = []
//!
//! [[peer]]
//! host = "/srv/hoard/peer-b"
//! writable = false
//! ```
//!
//! Peers are store directories; command line flags override file values.

use std::path::{Path, PathBuf};

use anyhow::Context;
use hoard_replication::ReplicationConfig;
use hoard_store::PeerDescriptor;
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub replication: ReplicationConfig,
    pub identity: IdentitySection,
    #[serde(rename = "peer")]
    pub peers: Vec<PeerDescriptor>,
}

/// `[identity]` section.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct IdentitySection {
    /// Hex-encoded signing key used for pushes.
    pub key_file: Option<PathBuf>,
}

impl CliConfig {
    /// Load from `path`, or defaults when no file is given.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(path) => {
                let content = std::fs::read_to_string(path)
                    .with_context(|| format!("reading {}", path.display()))?;
                Self::parse(&content).with_context(|| format!("parsing {}", path.display()))
            }
            None => Ok(Self::default()),
        }
    }

    pub fn parse(s: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(s)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_file() {
        let config = CliConfig::parse(
            r#"
            [replication]
            required_replications = 2
            queue_capacity = 10

            [identity]
            key_file = "key.hex"

            [[peer]]
            host = "a"

            [[peer]]
            host = "b"
            writable = false
            "#,
        )
        .unwrap();
        assert_eq!(config.replication.required_replications, 2);
        assert_eq!(config.replication.queue_capacity, 10);
        assert_eq!(config.replication.workers, 5);
        assert_eq!(config.identity.key_file, Some(PathBuf::from("key.hex")));
        assert_eq!(config.peers.len(), 2);
        assert!(!config.peers[1].writable);
    }

    #[test]
    fn empty_file_is_default() {
        let config = CliConfig::parse("").unwrap();
        assert_eq!(config.replication, ReplicationConfig::default());
        assert!(config.peers.is_empty());
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(CliConfig::load(Some(&dir.path().join("absent.toml"))).is_err());
        assert!(CliConfig::load(None).is_ok());
    }
}

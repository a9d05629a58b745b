use serde::{Deserialize, Serialize};

/// Tunables for a [`ReplicationEngine`](crate::ReplicationEngine).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplicationConfig {
    /// Copies each chunk should have on writable peers. Lowered to the
    /// number of writable peers when fewer are available.
    pub required_replications: usize,
    /// Background threads draining the file queue.
    pub workers: usize,
    /// Capacity of the file queue. A full queue blocks the producer.
    pub queue_capacity: usize,
    /// Parsed metadata records kept in memory.
    pub metadata_cache_capacity: usize,
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            required_replications: 3,
            workers: 5,
            queue_capacity: 1000,
            metadata_cache_capacity: 4096,
        }
    }
}

impl ReplicationConfig {
    pub fn with_required_replications(mut self, n: usize) -> Self {
        self.required_replications = n;
        self
    }

    pub fn with_workers(mut self, n: usize) -> Self {
        self.workers = n;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ReplicationConfig::default();
        assert_eq!(config.required_replications, 3);
        assert_eq!(config.workers, 5);
        assert_eq!(config.queue_capacity, 1000);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config: ReplicationConfig = toml::from_str("required_replications = 2").unwrap();
        assert_eq!(config.required_replications, 2);
        assert_eq!(config.workers, 5);
    }
}

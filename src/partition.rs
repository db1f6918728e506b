//! Partition Chooser.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Mutex;

use crate::config::LogManagerConfig;

/// Maps a topic to a uniformly-random partition index in `[0, P(topic))`.
/// The random source is per-instance, seeded once from system entropy and
/// parked behind a `Mutex` rather than shared lock-free. `StdRng` (unlike
/// `ThreadRng`) is `Send`, which `LogManager` needs to remain `Send`/`Sync`
/// for `Arc<LogManager>` to cross a `tokio::spawn` boundary. No cross-thread
/// synchronization guarantees are required beyond never producing an
/// out-of-range value.
pub struct PartitionChooser {
    rng: Mutex<StdRng>,
}

impl PartitionChooser {
    pub fn new() -> Self {
        PartitionChooser {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    pub fn choose_partition(&self, topic: &str, config: &LogManagerConfig) -> i32 {
        let bound = config.partitions_for(topic);
        debug_assert!(bound >= 1, "P(topic) must be >= 1");
        self.rng.lock().unwrap().gen_range(0..bound)
    }
}

impl Default for PartitionChooser {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn choose_partition_stays_in_range() {
        let chooser = PartitionChooser::new();
        let mut config = LogManagerConfig::default();
        config.num_partitions = 4;
        config.topic_partitions_map.insert("orders".to_string(), 8);

        for _ in 0..200 {
            let p = chooser.choose_partition("orders", &config);
            assert!((0..8).contains(&p));
            let p = chooser.choose_partition("events", &config);
            assert!((0..4).contains(&p));
        }
    }

    #[test]
    fn single_partition_topic_always_chooses_zero() {
        let chooser = PartitionChooser::new();
        let mut config = LogManagerConfig::default();
        config.num_partitions = 1;
        for _ in 0..20 {
            assert_eq!(chooser.choose_partition("solo", &config), 0);
        }
    }
}

//! The Log Registry: a two-level `Topic -> Partition -> Log`
//! map with atomic insert-if-absent at both levels, implemented on top of
//! `dashmap` for lock-free concurrent reads and writes.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::error::InvalidPartitionError;
use crate::log::Log;

/// Witness of whether an insert-if-absent actually inserted, so callers can
/// tell "I created this" from "someone else already had it".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertWitness {
    Inserted,
    AlreadyPresent,
}

type PartitionMap = DashMap<i32, Arc<dyn Log>>;

/// The registry itself. Both levels are `DashMap`s, which give us lock-free
/// reads and per-shard locking on insert, satisfying "unsynchronized reads"
/// and "atomic put_if_absent" from this
#[derive(Default)]
pub struct LogRegistry {
    topics: DashMap<String, Arc<PartitionMap>>,
}

impl LogRegistry {
    pub fn new() -> Self {
        LogRegistry {
            topics: DashMap::new(),
        }
    }

    /// Inserts an empty partition map for `topic` if absent. Returns whether
    /// this call created it (the "first ever topic" witness).
    pub fn insert_topic_if_absent(&self, topic: &str) -> (Arc<PartitionMap>, InsertWitness) {
        match self.topics.entry(topic.to_string()) {
            Entry::Occupied(e) => (Arc::clone(e.get()), InsertWitness::AlreadyPresent),
            Entry::Vacant(e) => {
                let map = Arc::new(DashMap::new());
                e.insert(Arc::clone(&map));
                (map, InsertWitness::Inserted)
            }
        }
    }

    /// Inserts `log` at `(topic, partition)` if absent, creating the topic's
    /// partition map first if needed. Returns the entry that ended up in the
    /// registry (the caller's `log` if it won the race, otherwise the prior
    /// winner) plus whether this call's `log` was the one actually stored.
    pub fn insert_log_if_absent(
        &self,
        topic: &str,
        partition: i32,
        log: Arc<dyn Log>,
    ) -> (Arc<dyn Log>, InsertWitness, InsertWitness) {
        let (partitions, topic_witness) = self.insert_topic_if_absent(topic);
        match partitions.entry(partition) {
            Entry::Occupied(e) => (Arc::clone(e.get()), topic_witness, InsertWitness::AlreadyPresent),
            Entry::Vacant(e) => {
                e.insert(Arc::clone(&log));
                (log, topic_witness, InsertWitness::Inserted)
            }
        }
    }

    /// Validates `partition` against `bound` (`P(topic)`). Checked before
    /// touching disk or the map.
    pub fn validate_partition(
        topic: &str,
        partition: i32,
        bound: i32,
    ) -> Result<(), InvalidPartitionError> {
        if topic.is_empty() {
            return Err(InvalidPartitionError::EmptyTopic);
        }
        if partition < 0 || partition >= bound {
            return Err(InvalidPartitionError::OutOfRange {
                topic: topic.to_string(),
                partition,
                bound,
            });
        }
        Ok(())
    }

    /// Non-blocking lookup; does not construct anything.
    pub fn get(&self, topic: &str, partition: i32) -> Option<Arc<dyn Log>> {
        self.topics
            .get(topic)
            .and_then(|partitions| partitions.get(&partition).map(|l| Arc::clone(&l)))
    }

    pub fn all_topics(&self) -> Vec<String> {
        self.topics.iter().map(|e| e.key().clone()).collect()
    }

    /// Every `Log` across every topic and partition (order unspecified).
    pub fn all_logs(&self) -> Vec<Arc<dyn Log>> {
        self.topics
            .iter()
            .flat_map(|topic_entry| {
                topic_entry
                    .value()
                    .iter()
                    .map(|p| Arc::clone(p.value()))
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    pub fn partition_count(&self, topic: &str) -> usize {
        self.topics.get(topic).map(|p| p.len()).unwrap_or(0)
    }
}

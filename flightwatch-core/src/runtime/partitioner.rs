//! Key-hash routing of records to parallel workers.
//!
//! Every record of one key must reach the same worker so that each
//! `(window, key)` accumulator has exactly one writer.

use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

use ahash::AHasher;

/// Chooses a target partition for a value.
pub trait Partitioner<T>: Send + Sync {
    /// Determine which partition (0..num_partitions) this value goes to.
    fn partition(&self, value: &T, num_partitions: usize) -> usize;
}

/// Hash-based partitioner using a key selector function.
pub struct HashPartitioner<K, F> {
    key_selector: F,
    _phantom: PhantomData<K>,
}

impl<K, F> HashPartitioner<K, F> {
    pub fn new(key_selector: F) -> Self {
        Self {
            key_selector,
            _phantom: PhantomData,
        }
    }
}

impl<K, T, F> Partitioner<T> for HashPartitioner<K, F>
where
    K: Hash + Send + Sync,
    F: Fn(&T) -> K + Send + Sync,
{
    fn partition(&self, value: &T, num_partitions: usize) -> usize {
        if num_partitions <= 1 {
            return 0;
        }
        let key = (self.key_selector)(value);
        // AHasher::default uses fixed keys: the routing is stable across runs.
        let mut hasher = AHasher::default();
        key.hash(&mut hasher);
        (hasher.finish() as usize) % num_partitions
    }
}

#[cfg(test)]
#[path = "tests/partitioner_tests.rs"]
mod tests;

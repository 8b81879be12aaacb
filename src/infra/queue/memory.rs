//! In-memory priority queue with re-ranking.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use crate::core::{Qos, SchedulerError};

/// Position of an entry: higher QoS first, then lower ordinal (FIFO).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QueueKey {
    /// Priority class.
    pub qos: Qos,
    /// Arrival ordinal.
    pub ordinal: u64,
}

impl QueueKey {
    /// Key for an entry.
    pub const fn new(qos: Qos, ordinal: u64) -> Self {
        Self { qos, ordinal }
    }
}

impl Ord for QueueKey {
    fn cmp(&self, other: &Self) -> Ordering {
        // Smallest key is served first: highest qos, then oldest ordinal.
        other
            .qos
            .cmp(&self.qos)
            .then_with(|| self.ordinal.cmp(&other.ordinal))
    }
}

impl PartialOrd for QueueKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Bounded queue ordered by [`QueueKey`].
///
/// A `BTreeMap` gives O(log n) enqueue, dequeue and re-ranking; the ordinal
/// index finds an entry's current key without a scan.
pub struct InMemoryQueue<T> {
    max_depth: usize,
    entries: BTreeMap<QueueKey, T>,
    index: HashMap<u64, Qos>,
}

impl<T> InMemoryQueue<T> {
    /// Create a new in-memory queue with a maximum depth.
    pub fn new(max_depth: usize) -> Self {
        Self {
            max_depth,
            entries: BTreeMap::new(),
            index: HashMap::with_capacity(max_depth.min(1024)),
        }
    }

    /// Insert `item` at `key`. A full queue, or an ordinal already queued,
    /// hands the item back with the error.
    pub fn enqueue(&mut self, key: QueueKey, item: T) -> Result<(), (T, SchedulerError)> {
        if self.entries.len() >= self.max_depth {
            return Err((item, SchedulerError::QueueFull("max queue depth reached".into())));
        }
        if self.index.contains_key(&key.ordinal) {
            return Err((item, SchedulerError::QueueFull(format!("ordinal {} already queued", key.ordinal))));
        }
        self.index.insert(key.ordinal, key.qos);
        self.entries.insert(key, item);
        Ok(())
    }

    /// Remove the highest-ranked entry.
    pub fn dequeue(&mut self) -> Option<(QueueKey, T)> {
        let (key, item) = self.entries.pop_first()?;
        self.index.remove(&key.ordinal);
        Some((key, item))
    }

    /// Key of the entry [`dequeue`](Self::dequeue) would return.
    pub fn peek_key(&self) -> Option<QueueKey> {
        self.entries.keys().next().copied()
    }

    /// Move the entry with `ordinal` to its position under `qos`.
    ///
    /// Returns the entry so the caller can update it, or `None` if the ordinal
    /// is not queued.
    pub fn reprioritize(&mut self, ordinal: u64, qos: Qos) -> Option<&mut T> {
        let old = *self.index.get(&ordinal)?;
        let item = self.entries.remove(&QueueKey::new(old, ordinal))?;
        let key = QueueKey::new(qos, ordinal);
        self.index.insert(ordinal, qos);
        self.entries.insert(key, item);
        self.entries.get_mut(&key)
    }

    /// Whether `ordinal` is queued.
    pub fn contains(&self, ordinal: u64) -> bool {
        self.index.contains_key(&ordinal)
    }

    /// Remove every entry, in service order.
    pub fn drain(&mut self) -> Vec<T> {
        self.index.clear();
        std::mem::take(&mut self.entries).into_values().collect()
    }

    /// Maximum depth allowed for this queue.
    pub const fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Current depth.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

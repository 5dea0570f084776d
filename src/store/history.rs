//! Per-subject prediction history with FIFO eviction.

use std::collections::VecDeque;

use dashmap::DashMap;

use crate::types::HistoryPoint;

pub struct HistoryStore {
    buffers: DashMap<String, VecDeque<HistoryPoint>>,
    capacity: usize,
}

impl HistoryStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            buffers: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Append under the subject's shard lock, so concurrent appends for the
    /// same subject both land in arrival order.
    pub fn append(&self, subject: &str, point: HistoryPoint) {
        let mut buf = self.buffers.entry(subject.to_string()).or_default();
        buf.push_back(point);
        while buf.len() > self.capacity {
            buf.pop_front();
        }
    }

    /// Oldest to newest. Empty for unknown subjects.
    pub fn snapshot(&self, subject: &str) -> Vec<HistoryPoint> {
        self.buffers
            .get(subject)
            .map(|buf| buf.iter().cloned().collect())
            .unwrap_or_default()
    }
}

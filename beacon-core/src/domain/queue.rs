//! Region queue domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Dispatch priority of a queue entry
///
/// Lower rank dequeues first. Within one class, entries dequeue in
/// enqueue order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriorityClass {
    /// Re-enqueued by global recovery
    GlobalRetry,
    /// Re-enqueued by a user retry of one unit
    RegionRetry,
    /// Initial fan-out and sweeper re-enqueues
    Normal,
}

impl PriorityClass {
    pub fn rank(&self) -> i16 {
        match self {
            PriorityClass::GlobalRetry => 0,
            PriorityClass::RegionRetry => 1,
            PriorityClass::Normal => 2,
        }
    }

    pub fn from_rank(rank: i16) -> Option<Self> {
        match rank {
            0 => Some(PriorityClass::GlobalRetry),
            1 => Some(PriorityClass::RegionRetry),
            2 => Some(PriorityClass::Normal),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PriorityClass::GlobalRetry => "global_retry",
            PriorityClass::RegionRetry => "region_retry",
            PriorityClass::Normal => "normal",
        }
    }
}

impl PartialOrd for PriorityClass {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PriorityClass {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.rank().cmp(&other.rank())
    }
}

/// A dispatch request sitting in a region queue
///
/// Carries only the execution id; the worker re-reads the unit before
/// acting on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    /// Monotonic enqueue sequence, the FIFO tie-breaker
    pub seq: i64,
    pub execution_id: Uuid,
    pub region: String,
    pub priority: PriorityClass,
    pub enqueued_at: DateTime<Utc>,
}

/// Per-region queue depth, broken down by priority class
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueDepth {
    pub region: String,
    pub global_retry: u64,
    pub region_retry: u64,
    pub normal: u64,
}

impl QueueDepth {
    pub fn empty(region: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            ..Default::default()
        }
    }

    pub fn add(&mut self, priority: PriorityClass, count: u64) {
        match priority {
            PriorityClass::GlobalRetry => self.global_retry += count,
            PriorityClass::RegionRetry => self.region_retry += count,
            PriorityClass::Normal => self.normal += count,
        }
    }

    pub fn total(&self) -> u64 {
        self.global_retry + self.region_retry + self.normal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_ordering() {
        let mut classes = vec![
            PriorityClass::Normal,
            PriorityClass::GlobalRetry,
            PriorityClass::RegionRetry,
        ];
        classes.sort();
        assert_eq!(
            classes,
            vec![
                PriorityClass::GlobalRetry,
                PriorityClass::RegionRetry,
                PriorityClass::Normal
            ]
        );
    }

    #[test]
    fn test_rank_round_trip() {
        for class in [
            PriorityClass::GlobalRetry,
            PriorityClass::RegionRetry,
            PriorityClass::Normal,
        ] {
            assert_eq!(PriorityClass::from_rank(class.rank()), Some(class));
        }
        assert_eq!(PriorityClass::from_rank(7), None);
    }

    #[test]
    fn test_depth_total() {
        let mut depth = QueueDepth::empty("us-east");
        depth.add(PriorityClass::Normal, 4);
        depth.add(PriorityClass::RegionRetry, 1);
        assert_eq!(depth.total(), 5);
        assert_eq!(depth.global_retry, 0);
    }
}

pub mod bucket;

pub use bucket::BucketKey;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;

use crate::metrics::{MetricsResult, NeedTotals, SubstatusTotals};
use crate::model::Scope;

/// The store keeps at most this many weekly snapshots, newest by
/// capture time; older ones are evicted first.
pub const SNAPSHOT_CAPACITY: usize = 32;

/// One frozen unfiltered-scope metrics record for one ISO week.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub bucket: BucketKey,
    pub scope: Scope,
    pub captured_at: DateTime<Utc>,
    pub total: u64,
    pub due_soon_count: u64,
    pub overdue_count: u64,
    #[serde(default)]
    pub status_totals: BTreeMap<String, u64>,
    #[serde(default)]
    pub substatus_totals: SubstatusTotals,
    #[serde(default)]
    pub need_totals: NeedTotals,
}

impl Snapshot {
    /// Freeze an unfiltered-scope aggregation into this week's record.
    pub fn from_metrics(metrics: &MetricsResult, captured_at: DateTime<Utc>) -> Self {
        Snapshot {
            bucket: BucketKey::from_instant(captured_at),
            scope: Scope::All,
            captured_at,
            total: metrics.total,
            due_soon_count: metrics.due_soon_count,
            overdue_count: metrics.overdue_count,
            status_totals: metrics.status_totals.clone(),
            substatus_totals: metrics.substatus_totals.clone(),
            need_totals: metrics.need_totals.clone(),
        }
    }
}

/// Bounded weekly history, at most one snapshot per bucket key, held in
/// ascending `captured_at` order.
///
/// Owned by the session and passed explicitly; it never lives in global
/// state. Every successful `merge` or `upsert` pushes the full bounded
/// list down the write-back channel when one is attached. The send is
/// fire-and-forget: a full or closed channel is ignored and a later
/// write supersedes an earlier one.
#[derive(Debug, Default)]
pub struct SnapshotStore {
    snapshots: Vec<Snapshot>,
    writeback: Option<UnboundedSender<Vec<Snapshot>>>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_writeback(writeback: UnboundedSender<Vec<Snapshot>>) -> Self {
        SnapshotStore {
            snapshots: Vec::new(),
            writeback: Some(writeback),
        }
    }

    /// Union the local-cache read and the remote fetch by bucket key.
    ///
    /// The remote entry wins when both sources carry the same bucket;
    /// local-only buckets survive. Entries whose scope is not `all`
    /// never enter the store. Returns the resulting ordered list.
    pub fn merge(&mut self, local: Vec<Snapshot>, remote: Vec<Snapshot>) -> &[Snapshot] {
        let mut by_bucket: BTreeMap<BucketKey, Snapshot> = BTreeMap::new();
        for snapshot in remote {
            if snapshot.scope != Scope::All {
                log::debug!("merge: skipping {}-scope snapshot", scope_name(&snapshot));
                continue;
            }
            by_bucket.insert(snapshot.bucket, snapshot);
        }
        for snapshot in local {
            if snapshot.scope != Scope::All {
                log::debug!("merge: skipping {}-scope snapshot", scope_name(&snapshot));
                continue;
            }
            by_bucket.entry(snapshot.bucket).or_insert(snapshot);
        }

        self.snapshots = by_bucket.into_values().collect();
        self.settle();
        self.push_writeback();
        &self.snapshots
    }

    /// Record this week's snapshot, replacing any earlier record for the
    /// same bucket, then re-bound the store.
    pub fn upsert(&mut self, snapshot: Snapshot) {
        if snapshot.scope != Scope::All {
            log::debug!("upsert: skipping {}-scope snapshot", scope_name(&snapshot));
            return;
        }
        self.snapshots.retain(|s| s.bucket != snapshot.bucket);
        self.snapshots.push(snapshot);
        self.settle();
        self.push_writeback();
    }

    pub fn lookup(&self, bucket: BucketKey) -> Option<&Snapshot> {
        self.snapshots.iter().find(|s| s.bucket == bucket)
    }

    /// All retained snapshots, ascending by `captured_at`.
    pub fn snapshots(&self) -> &[Snapshot] {
        &self.snapshots
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    fn settle(&mut self) {
        self.snapshots.sort_by_key(|s| s.captured_at);
        if self.snapshots.len() > SNAPSHOT_CAPACITY {
            let excess = self.snapshots.len() - SNAPSHOT_CAPACITY;
            self.snapshots.drain(..excess);
        }
    }

    fn push_writeback(&self) {
        if let Some(tx) = &self.writeback {
            let _ = tx.send(self.snapshots.clone());
        }
    }
}

fn scope_name(snapshot: &Snapshot) -> &'static str {
    match snapshot.scope {
        Scope::Filtered => "filtered",
        Scope::All => "all",
    }
}

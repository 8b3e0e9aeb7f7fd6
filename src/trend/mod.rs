use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::metrics::MetricsResult;
use crate::snapshot::{BucketKey, SnapshotStore};

/// Week-over-week movement of one metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Trend {
    /// The current scope has no comparable history (filtered views).
    NotComparable,
    /// No snapshot exists for the week one week ago.
    NoData,
    Increase(u64),
    Decrease(u64),
    Unchanged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum TrendDirection {
    Up,
    Down,
    Flat,
}

impl Trend {
    pub fn direction(&self) -> Option<TrendDirection> {
        match self {
            Trend::Increase(_) => Some(TrendDirection::Up),
            Trend::Decrease(_) => Some(TrendDirection::Down),
            Trend::Unchanged => Some(TrendDirection::Flat),
            Trend::NotComparable | Trend::NoData => None,
        }
    }

    pub fn delta(&self) -> Option<u64> {
        match self {
            Trend::Increase(d) | Trend::Decrease(d) => Some(*d),
            Trend::Unchanged => Some(0),
            Trend::NotComparable | Trend::NoData => None,
        }
    }
}

impl fmt::Display for Trend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trend::NotComparable => write!(f, "not comparable"),
            Trend::NoData => write!(f, "no prior data"),
            Trend::Increase(d) => write!(f, "up {d}"),
            Trend::Decrease(d) => write!(f, "down {d}"),
            Trend::Unchanged => write!(f, "unchanged"),
        }
    }
}

/// Compare a current value against last week's, applying the rules in
/// order: comparability first, then snapshot presence, then the delta.
pub fn compare(current: u64, previous: Option<u64>, comparable: bool) -> Trend {
    if !comparable {
        return Trend::NotComparable;
    }
    let Some(previous) = previous else {
        return Trend::NoData;
    };
    match current.cmp(&previous) {
        Ordering::Greater => Trend::Increase(current - previous),
        Ordering::Less => Trend::Decrease(previous - current),
        Ordering::Equal => Trend::Unchanged,
    }
}

/// The bucket "one week ago": the current instant minus exactly 7×24
/// hours, mapped to its week's key. Resolution goes through the bucket
/// key only; the chronologically previous stored snapshot is not a
/// substitute.
pub fn week_ago_bucket(now: DateTime<Utc>) -> BucketKey {
    BucketKey::from_instant(now - Duration::hours(7 * 24))
}

/// Headline week-over-week comparison shown with the insights view.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendSummary {
    pub total: Trend,
    pub due_soon: Trend,
    pub overdue: Trend,
    pub statuses: BTreeMap<String, Trend>,
}

impl TrendSummary {
    /// Compare `current` against the snapshot for one week ago.
    ///
    /// `comparable` is false for filtered scopes, since history is only
    /// kept for the unfiltered scope. A status key absent from last
    /// week's snapshot counts as zero observed that week.
    pub fn against_week_ago(
        current: &MetricsResult,
        store: &SnapshotStore,
        now: DateTime<Utc>,
        comparable: bool,
    ) -> Self {
        let previous = store.lookup(week_ago_bucket(now));

        let statuses = current
            .status_totals
            .iter()
            .map(|(key, &count)| {
                let prev = previous.map(|s| s.status_totals.get(key).copied().unwrap_or(0));
                (key.clone(), compare(count, prev, comparable))
            })
            .collect();

        TrendSummary {
            total: compare(current.total, previous.map(|s| s.total), comparable),
            due_soon: compare(
                current.due_soon_count,
                previous.map(|s| s.due_soon_count),
                comparable,
            ),
            overdue: compare(
                current.overdue_count,
                previous.map(|s| s.overdue_count),
                comparable,
            ),
            statuses,
        }
    }
}

use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::model::{NeedKind, SubStatus};

/// Team classification used by workload ranking and team segmentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TeamKind {
    #[serde(rename = "team:mapache")]
    Mapache,
    #[serde(rename = "team:external")]
    External,
    #[serde(rename = "team:unassigned")]
    Unassigned,
}

impl TeamKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TeamKind::Mapache => "team:mapache",
            TeamKind::External => "team:external",
            TeamKind::Unassigned => "team:unassigned",
        }
    }
}

impl fmt::Display for TeamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Counts over the fixed sub-status set. Sums to the task total.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubstatusTotals {
    pub on_track: u64,
    pub at_risk: u64,
    pub blocked: u64,
}

impl SubstatusTotals {
    pub(crate) fn record(&mut self, substatus: SubStatus) {
        match substatus {
            SubStatus::OnTrack => self.on_track += 1,
            SubStatus::AtRisk => self.at_risk += 1,
            SubStatus::Blocked => self.blocked += 1,
        }
    }

    pub fn sum(&self) -> u64 {
        self.on_track + self.at_risk + self.blocked
    }
}

/// Counts over the fixed need set plus the explicit "none" bucket.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NeedTotals {
    pub info: u64,
    pub approval: u64,
    pub review: u64,
    pub none: u64,
}

impl NeedTotals {
    pub(crate) fn record(&mut self, need: Option<NeedKind>) {
        match need {
            Some(NeedKind::Info) => self.info += 1,
            Some(NeedKind::Approval) => self.approval += 1,
            Some(NeedKind::Review) => self.review += 1,
            None => self.none += 1,
        }
    }

    pub fn sum(&self) -> u64 {
        self.info + self.approval + self.review + self.none
    }
}

/// One row of the workload ranking: task count per assignee, plus the
/// single bucket for unassigned tasks.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkloadEntry {
    pub assignee_id: Option<String>,
    pub label: String,
    pub count: u64,
    pub unassigned: bool,
    pub team: TeamKind,
}

/// Task count for one distinct due day.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DueDateEntry {
    pub date: NaiveDate,
    pub count: u64,
}

/// One segment of a grouping, carrying its own nested totals.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Segment {
    pub key: String,
    pub label: String,
    pub total: u64,
    pub status_totals: BTreeMap<String, u64>,
    pub substatus_totals: SubstatusTotals,
    pub need_totals: NeedTotals,
}

/// The two independent groupings of the same task collection.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentBreakdown {
    pub by_assignee: Vec<Segment>,
    pub by_team: Vec<Segment>,
}

/// The aggregation engine's sole output.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsResult {
    pub total: u64,
    pub status_totals: BTreeMap<String, u64>,
    pub substatus_totals: SubstatusTotals,
    pub need_totals: NeedTotals,
    pub due_soon_count: u64,
    pub overdue_count: u64,
    pub workload: Vec<WorkloadEntry>,
    pub upcoming_due: Vec<DueDateEntry>,
    pub segments: SegmentBreakdown,
}

/// Results for the filtered and unfiltered scopes of one dispatch,
/// always produced and applied together.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopedMetrics {
    pub filtered: MetricsResult,
    pub all: MetricsResult,
}

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

/// Fixed sub-status set. Tasks missing a sub-status count as on-track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SubStatus {
    #[default]
    OnTrack,
    AtRisk,
    Blocked,
}

/// Fixed need classifier. Absence of a need is its own implicit bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NeedKind {
    Info,
    Approval,
    Review,
}

/// Which task collection an aggregation ran over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Scope {
    Filtered,
    All,
}

/// One task as handed over by the board. Read-only from our side.
///
/// `status` is an open vocabulary; the valid keys live in configuration
/// (`Lookups::status_keys`) and foreign keys are aggregated verbatim.
/// `due_on` stays a raw string here: parsing happens inside the
/// aggregation so a malformed date degrades to "no due date" instead of
/// failing the whole batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub substatus: SubStatus,
    #[serde(default)]
    pub need: Option<NeedKind>,
    #[serde(default)]
    pub assignee_id: Option<String>,
    #[serde(default)]
    pub assignee_label: Option<String>,
    #[serde(default)]
    pub due_on: Option<String>,
}

/// Per-session lookup tables consumed by the aggregation: the ordered
/// status vocabulary, assignee display labels, and the internal-team
/// roster. All three degrade to empty when unconfigured.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Lookups {
    pub status_keys: Vec<String>,
    pub assignee_labels: HashMap<String, String>,
    pub internal_roster: HashSet<String>,
}

impl Lookups {
    pub fn new(
        status_keys: Vec<String>,
        assignee_labels: HashMap<String, String>,
        internal_roster: HashSet<String>,
    ) -> Self {
        Lookups {
            status_keys,
            assignee_labels,
            internal_roster,
        }
    }

    /// Display label for an assignee: configured label, then the label
    /// embedded in the task record, then the raw identifier.
    pub fn label_for(&self, assignee_id: &str, embedded: Option<&str>) -> String {
        if let Some(label) = self.assignee_labels.get(assignee_id) {
            return label.clone();
        }
        match embedded {
            Some(l) if !l.is_empty() => l.to_string(),
            _ => assignee_id.to_string(),
        }
    }

    pub fn is_internal(&self, assignee_id: &str) -> bool {
        self.internal_roster.contains(assignee_id)
    }
}

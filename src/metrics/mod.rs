pub mod types;

pub use types::*;

use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;

use crate::date_util::{days_between, parse_iso_day};
use crate::model::{Lookups, Task};

/// Workload and upcoming-due rankings are capped at this many entries.
pub const RANKING_LIMIT: usize = 12;

/// A due date within this many days of today (today included) counts as
/// due-soon. Dates strictly before today count as overdue.
pub const DUE_SOON_WINDOW_DAYS: i64 = 7;

const UNASSIGNED_KEY: &str = "unassigned";

/// Aggregate a task collection into a full `MetricsResult`.
///
/// Single pass over the tasks, then bounded sorts for the ranked lists.
/// Total over its input: an empty collection yields all-zero totals and
/// empty lists, and an unparseable due date degrades to "no due date"
/// without affecting the task's other contributions. `today` is passed
/// in so aggregation stays deterministic under test.
pub fn compute(tasks: &[Task], lookups: &Lookups, today: NaiveDate) -> MetricsResult {
    let mut status_totals: BTreeMap<String, u64> = lookups
        .status_keys
        .iter()
        .map(|k| (k.clone(), 0))
        .collect();
    let mut substatus_totals = SubstatusTotals::default();
    let mut need_totals = NeedTotals::default();
    let mut due_soon_count = 0u64;
    let mut overdue_count = 0u64;

    let mut due_days: HashMap<NaiveDate, u64> = HashMap::new();
    let mut by_assignee: HashMap<Option<&str>, SegmentAccum> = HashMap::new();
    let mut by_team: HashMap<TeamKind, SegmentAccum> = HashMap::new();
    let mut embedded_labels: HashMap<&str, &str> = HashMap::new();

    for task in tasks {
        *status_totals.entry(task.status.clone()).or_insert(0) += 1;
        substatus_totals.record(task.substatus);
        need_totals.record(task.need);

        if let Some(due) = task.due_on.as_deref().and_then(parse_iso_day) {
            let delta = days_between(today, due);
            if delta < 0 {
                overdue_count += 1;
            } else if delta < DUE_SOON_WINDOW_DAYS {
                due_soon_count += 1;
            }
            *due_days.entry(due).or_insert(0) += 1;
        }

        let assignee = task.assignee_id.as_deref();
        if let (Some(id), Some(label)) = (assignee, task.assignee_label.as_deref()) {
            if !label.is_empty() {
                embedded_labels.entry(id).or_insert(label);
            }
        }

        by_assignee.entry(assignee).or_default().record(task);
        by_team
            .entry(team_of(lookups, assignee))
            .or_default()
            .record(task);
    }

    let mut workload: Vec<WorkloadEntry> = by_assignee
        .iter()
        .map(|(assignee, accum)| WorkloadEntry {
            assignee_id: assignee.map(str::to_string),
            label: assignee_label(lookups, &embedded_labels, *assignee),
            count: accum.total,
            unassigned: assignee.is_none(),
            team: team_of(lookups, *assignee),
        })
        .collect();
    workload.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then_with(|| a.label.to_lowercase().cmp(&b.label.to_lowercase()))
            .then_with(|| a.assignee_id.cmp(&b.assignee_id))
    });
    workload.truncate(RANKING_LIMIT);

    let mut upcoming_due: Vec<DueDateEntry> = due_days
        .into_iter()
        .map(|(date, count)| DueDateEntry { date, count })
        .collect();
    upcoming_due.sort_by_key(|e| e.date);
    upcoming_due.truncate(RANKING_LIMIT);

    let mut assignee_segments: Vec<Segment> = by_assignee
        .into_iter()
        .map(|(assignee, accum)| {
            let key = assignee.unwrap_or(UNASSIGNED_KEY).to_string();
            let label = assignee_label(lookups, &embedded_labels, assignee);
            accum.into_segment(key, label)
        })
        .collect();
    sort_segments(&mut assignee_segments);

    let mut team_segments: Vec<Segment> = by_team
        .into_iter()
        .map(|(team, accum)| accum.into_segment(team.to_string(), team.to_string()))
        .collect();
    sort_segments(&mut team_segments);

    MetricsResult {
        total: tasks.len() as u64,
        status_totals,
        substatus_totals,
        need_totals,
        due_soon_count,
        overdue_count,
        workload,
        upcoming_due,
        segments: SegmentBreakdown {
            by_assignee: assignee_segments,
            by_team: team_segments,
        },
    }
}

// ── Internal accumulation helpers ──────────────────────────────────

#[derive(Default)]
struct SegmentAccum {
    total: u64,
    status_totals: BTreeMap<String, u64>,
    substatus_totals: SubstatusTotals,
    need_totals: NeedTotals,
}

impl SegmentAccum {
    fn record(&mut self, task: &Task) {
        self.total += 1;
        *self.status_totals.entry(task.status.clone()).or_insert(0) += 1;
        self.substatus_totals.record(task.substatus);
        self.need_totals.record(task.need);
    }

    fn into_segment(self, key: String, label: String) -> Segment {
        Segment {
            key,
            label,
            total: self.total,
            status_totals: self.status_totals,
            substatus_totals: self.substatus_totals,
            need_totals: self.need_totals,
        }
    }
}

fn team_of(lookups: &Lookups, assignee_id: Option<&str>) -> TeamKind {
    match assignee_id {
        Some(id) if lookups.is_internal(id) => TeamKind::Mapache,
        Some(_) => TeamKind::External,
        None => TeamKind::Unassigned,
    }
}

fn assignee_label(
    lookups: &Lookups,
    embedded: &HashMap<&str, &str>,
    assignee_id: Option<&str>,
) -> String {
    match assignee_id {
        Some(id) => lookups.label_for(id, embedded.get(id).copied()),
        None => UNASSIGNED_KEY.to_string(),
    }
}

fn sort_segments(segments: &mut [Segment]) {
    segments.sort_by(|a, b| {
        b.total
            .cmp(&a.total)
            .then_with(|| a.label.cmp(&b.label))
            .then_with(|| a.key.cmp(&b.key))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{NeedKind, SubStatus};
    use std::collections::HashSet;

    fn task(id: &str, status: &str) -> Task {
        Task {
            id: id.to_string(),
            status: status.to_string(),
            substatus: SubStatus::OnTrack,
            need: None,
            assignee_id: None,
            assignee_label: None,
            due_on: None,
        }
    }

    fn assigned(id: &str, status: &str, assignee: &str) -> Task {
        Task {
            assignee_id: Some(assignee.to_string()),
            ..task(id, status)
        }
    }

    fn due(id: &str, status: &str, due_on: &str) -> Task {
        Task {
            due_on: Some(due_on.to_string()),
            ..task(id, status)
        }
    }

    fn lookups() -> Lookups {
        let mut labels = HashMap::new();
        labels.insert("u1".to_string(), "Ana".to_string());
        labels.insert("u2".to_string(), "Bo".to_string());
        let mut roster = HashSet::new();
        roster.insert("u1".to_string());
        Lookups::new(
            vec![
                "pending".to_string(),
                "in-progress".to_string(),
                "done".to_string(),
            ],
            labels,
            roster,
        )
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 10).unwrap()
    }

    #[test]
    fn test_empty_input_yields_zeroes() {
        let lk = Lookups::new(
            vec!["PENDING".to_string(), "DONE".to_string()],
            HashMap::new(),
            HashSet::new(),
        );
        let result = compute(&[], &lk, today());

        assert_eq!(result.total, 0);
        assert_eq!(result.status_totals.get("PENDING"), Some(&0));
        assert_eq!(result.status_totals.get("DONE"), Some(&0));
        assert_eq!(result.status_totals.len(), 2);
        assert_eq!(result.due_soon_count, 0);
        assert_eq!(result.overdue_count, 0);
        assert!(result.workload.is_empty());
        assert!(result.upcoming_due.is_empty());
        assert!(result.segments.by_assignee.is_empty());
        assert!(result.segments.by_team.is_empty());
    }

    #[test]
    fn test_conservation() {
        let mut tasks = vec![
            assigned("t1", "pending", "u1"),
            assigned("t2", "in-progress", "u2"),
            assigned("t3", "done", "u1"),
            task("t4", "pending"),
            task("t5", "archived"),
        ];
        tasks[1].substatus = SubStatus::AtRisk;
        tasks[2].substatus = SubStatus::Blocked;
        tasks[3].need = Some(NeedKind::Review);
        tasks[4].need = Some(NeedKind::Info);

        let result = compute(&tasks, &lookups(), today());

        assert_eq!(result.total, 5);
        assert_eq!(result.status_totals.values().sum::<u64>(), result.total);
        assert_eq!(result.substatus_totals.sum(), result.total);
        assert_eq!(result.need_totals.sum(), result.total);
    }

    #[test]
    fn test_segment_conservation() {
        let tasks = vec![
            assigned("t1", "pending", "u1"),
            assigned("t2", "pending", "u2"),
            assigned("t3", "done", "u2"),
            task("t4", "in-progress"),
            assigned("t5", "archived", "u9"),
        ];
        let result = compute(&tasks, &lookups(), today());

        for segments in [&result.segments.by_assignee, &result.segments.by_team] {
            let segment_sum: u64 = segments.iter().map(|s| s.total).sum();
            assert_eq!(segment_sum, result.total);

            for (key, &count) in &result.status_totals {
                let per_key: u64 = segments
                    .iter()
                    .filter_map(|s| s.status_totals.get(key))
                    .sum();
                assert_eq!(per_key, count, "status key {key}");
            }
        }
    }

    #[test]
    fn test_due_classification_scenario() {
        // today = 2024-06-10
        let tasks = vec![
            due("t1", "pending", "2024-06-09"),
            due("t2", "pending", "2024-06-15"),
            due("t3", "pending", "2024-06-20"),
        ];
        let result = compute(&tasks, &lookups(), today());
        assert_eq!(result.overdue_count, 1);
        assert_eq!(result.due_soon_count, 1);
    }

    #[test]
    fn test_due_window_boundaries() {
        let tasks = vec![
            due("t1", "pending", "2024-06-10"), // today: due-soon
            due("t2", "pending", "2024-06-16"), // day 6: due-soon
            due("t3", "pending", "2024-06-17"), // day 7: neither
        ];
        let result = compute(&tasks, &lookups(), today());
        assert_eq!(result.due_soon_count, 2);
        assert_eq!(result.overdue_count, 0);
    }

    #[test]
    fn test_due_classification_exclusive() {
        let tasks = vec![
            due("t1", "pending", "2024-06-01"),
            due("t2", "pending", "2024-06-12"),
            due("t3", "pending", "2024-07-01"),
            task("t4", "pending"),
        ];
        let result = compute(&tasks, &lookups(), today());
        assert_eq!(result.overdue_count, 1);
        assert_eq!(result.due_soon_count, 1);
        assert!(result.overdue_count + result.due_soon_count <= result.total);
    }

    #[test]
    fn test_unparseable_due_date_degrades() {
        let tasks = vec![
            due("t1", "pending", "06/15/2024"),
            due("t2", "pending", "soon"),
        ];
        let result = compute(&tasks, &lookups(), today());

        // Still counted in every total, absent from every due list
        assert_eq!(result.total, 2);
        assert_eq!(result.status_totals.get("pending"), Some(&2));
        assert_eq!(result.due_soon_count, 0);
        assert_eq!(result.overdue_count, 0);
        assert!(result.upcoming_due.is_empty());
    }

    #[test]
    fn test_idempotence() {
        let tasks = vec![
            assigned("t1", "pending", "u1"),
            due("t2", "done", "2024-06-12"),
            task("t3", "archived"),
        ];
        let lk = lookups();
        let first = compute(&tasks, &lk, today());
        let second = compute(&tasks, &lk, today());
        assert_eq!(first, second);
    }

    #[test]
    fn test_workload_bounded_and_sorted() {
        let mut tasks = Vec::new();
        for i in 0..15 {
            // assignee a00 gets 1 task, a01 gets 2, ...
            for n in 0..=i {
                tasks.push(assigned(&format!("t{i}-{n}"), "pending", &format!("a{i:02}")));
            }
        }
        let result = compute(&tasks, &lookups(), today());

        assert_eq!(result.workload.len(), RANKING_LIMIT);
        for pair in result.workload.windows(2) {
            assert!(pair[0].count >= pair[1].count);
        }
        // Heaviest assignee survives the cut
        assert_eq!(result.workload[0].count, 15);
    }

    #[test]
    fn test_workload_tie_broken_case_insensitive() {
        let mut t1 = assigned("t1", "pending", "x1");
        t1.assignee_label = Some("zoe".to_string());
        let mut t2 = assigned("t2", "pending", "x2");
        t2.assignee_label = Some("Avery".to_string());
        let result = compute(&[t1, t2], &lookups(), today());

        assert_eq!(result.workload[0].label, "Avery");
        assert_eq!(result.workload[1].label, "zoe");
    }

    #[test]
    fn test_workload_stable_for_identical_labels() {
        // Equal counts and the same display label: order falls through
        // to the assignee id and must not vary between calls.
        let mut t1 = assigned("t1", "pending", "u-b");
        t1.assignee_label = Some("Alex".to_string());
        let mut t2 = assigned("t2", "pending", "u-a");
        t2.assignee_label = Some("Alex".to_string());
        let tasks = vec![t1, t2];
        let lk = Lookups::default();

        let baseline = compute(&tasks, &lk, today());
        let ids: Vec<_> = baseline
            .workload
            .iter()
            .map(|e| e.assignee_id.as_deref())
            .collect();
        assert_eq!(ids, vec![Some("u-a"), Some("u-b")]);

        for _ in 0..16 {
            let again = compute(&tasks, &lk, today());
            assert_eq!(again.workload, baseline.workload);
            assert_eq!(again.segments.by_assignee, baseline.segments.by_assignee);
        }
    }

    #[test]
    fn test_workload_unassigned_bucket() {
        let tasks = vec![
            task("t1", "pending"),
            task("t2", "pending"),
            assigned("t3", "pending", "u1"),
        ];
        let result = compute(&tasks, &lookups(), today());

        let unassigned = result
            .workload
            .iter()
            .find(|e| e.unassigned)
            .expect("unassigned bucket present");
        assert_eq!(unassigned.count, 2);
        assert_eq!(unassigned.assignee_id, None);
        assert_eq!(unassigned.label, "unassigned");
        assert_eq!(unassigned.team, TeamKind::Unassigned);
    }

    #[test]
    fn test_team_classification() {
        let tasks = vec![
            assigned("t1", "pending", "u1"), // on roster
            assigned("t2", "pending", "u9"), // off roster
            task("t3", "pending"),
        ];
        let result = compute(&tasks, &lookups(), today());

        let team_for = |id: Option<&str>| {
            result
                .workload
                .iter()
                .find(|e| e.assignee_id.as_deref() == id)
                .map(|e| e.team)
        };
        assert_eq!(team_for(Some("u1")), Some(TeamKind::Mapache));
        assert_eq!(team_for(Some("u9")), Some(TeamKind::External));
        assert_eq!(team_for(None), Some(TeamKind::Unassigned));

        let keys: Vec<&str> = result
            .segments
            .by_team
            .iter()
            .map(|s| s.key.as_str())
            .collect();
        assert!(keys.contains(&"team:mapache"));
        assert!(keys.contains(&"team:external"));
        assert!(keys.contains(&"team:unassigned"));
    }

    #[test]
    fn test_label_fallback_order() {
        let mut with_embedded = assigned("t1", "pending", "u7");
        with_embedded.assignee_label = Some("Embedded Name".to_string());
        let tasks = vec![
            assigned("t0", "pending", "u1"), // configured label wins
            with_embedded,                   // embedded label
            assigned("t2", "pending", "u8"), // raw id
        ];
        let result = compute(&tasks, &lookups(), today());

        let label_for = |id: &str| {
            result
                .workload
                .iter()
                .find(|e| e.assignee_id.as_deref() == Some(id))
                .map(|e| e.label.clone())
        };
        assert_eq!(label_for("u1"), Some("Ana".to_string()));
        assert_eq!(label_for("u7"), Some("Embedded Name".to_string()));
        assert_eq!(label_for("u8"), Some("u8".to_string()));
    }

    #[test]
    fn test_upcoming_due_bounded_ascending() {
        let mut tasks = Vec::new();
        for day in 1..=15 {
            tasks.push(due(&format!("t{day}"), "pending", &format!("2024-07-{day:02}")));
            tasks.push(due(&format!("x{day}"), "pending", &format!("2024-07-{day:02}")));
        }
        let result = compute(&tasks, &lookups(), today());

        assert_eq!(result.upcoming_due.len(), RANKING_LIMIT);
        for pair in result.upcoming_due.windows(2) {
            assert!(pair[0].date < pair[1].date);
        }
        assert_eq!(
            result.upcoming_due[0].date,
            NaiveDate::from_ymd_opt(2024, 7, 1).unwrap()
        );
        assert_eq!(result.upcoming_due[0].count, 2);
    }

    #[test]
    fn test_foreign_status_keys_counted_verbatim() {
        let tasks = vec![task("t1", "archived"), task("t2", "pending")];
        let result = compute(&tasks, &lookups(), today());

        assert_eq!(result.status_totals.get("archived"), Some(&1));
        assert_eq!(result.status_totals.get("pending"), Some(&1));
        // Configured but unseen keys stay present at zero
        assert_eq!(result.status_totals.get("done"), Some(&0));
        assert_eq!(result.status_totals.get("in-progress"), Some(&0));
    }

    #[test]
    fn test_segments_sorted_descending_with_label_tiebreak() {
        let tasks = vec![
            assigned("t1", "pending", "u2"),
            assigned("t2", "pending", "u2"),
            assigned("t3", "pending", "u1"),
            task("t4", "pending"),
        ];
        let result = compute(&tasks, &lookups(), today());

        let by_assignee = &result.segments.by_assignee;
        assert_eq!(by_assignee[0].label, "Bo");
        assert_eq!(by_assignee[0].total, 2);
        // Ana and unassigned tie at 1; "Ana" sorts before "unassigned"
        assert_eq!(by_assignee[1].label, "Ana");
        assert_eq!(by_assignee[2].label, "unassigned");
    }
}

// src/reconciliation/grouping.rs
//! Observation groups and the per-domain reconciliation contract.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::ReconcileIssue;
use crate::models::{DataDomain, DomainStats, ObservationRecord, ReconciledObservation};

/// Nominal time bucket of a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Period {
    Date(NaiveDate),
    Year(i32),
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Period::Date(date) => write!(f, "{}", date),
            Period::Year(year) => write!(f, "{}", year),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupKey {
    pub site_name: String,
    pub period: Period,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupClassification {
    Singleton,
    Replicate,
    Duplicate,
    /// Replicate dates were found but fewer than the group has records
    PartialReplicate,
}

/// Result of reconciling one group: the output records plus its own log.
#[derive(Debug, Clone)]
pub struct GroupOutcome {
    pub key: GroupKey,
    pub classification: GroupClassification,
    pub records: Vec<ReconciledObservation>,
    pub issues: Vec<ReconcileIssue>,
    pub records_in: usize,
    pub invalid_values: usize,
    /// No authority could be consulted and the default policy was applied
    pub unresolved: bool,
}

impl GroupOutcome {
    pub fn superseded(&self) -> usize {
        self.records_in.saturating_sub(self.records.len())
    }
}

/// Records after domain-specific preparation, with what was changed.
#[derive(Debug, Clone, Default)]
pub struct PreparedRecords {
    pub records: Vec<ObservationRecord>,
    pub issues: Vec<ReconcileIssue>,
    pub corrections: usize,
}

pub trait DomainReconciler: Send + Sync {
    fn domain(&self) -> DataDomain;

    /// Time bucket a record is grouped under.
    fn bucket(&self, record: &ObservationRecord) -> Period;

    /// Runs once over the whole domain table before grouping.
    fn prepare(&self, records: Vec<ObservationRecord>) -> PreparedRecords {
        PreparedRecords {
            records,
            ..Default::default()
        }
    }

    /// Annotations attached to every output record of this domain.
    fn annotate(&self, _record: &ObservationRecord) -> BTreeMap<String, String> {
        BTreeMap::new()
    }

    /// Resolves a group of two or more records.
    fn reconcile_group(&self, key: &GroupKey, records: Vec<ObservationRecord>) -> GroupOutcome;
}

/// Groups records by `(site, period)`. Groups come out sorted by key and
/// members sorted by record id, so results never depend on input order.
pub fn group_records<R: DomainReconciler + ?Sized>(
    reconciler: &R,
    records: Vec<ObservationRecord>,
) -> Vec<(GroupKey, Vec<ObservationRecord>)> {
    let mut groups: BTreeMap<GroupKey, Vec<ObservationRecord>> = BTreeMap::new();
    for record in records {
        let key = GroupKey {
            site_name: record.site_name.clone(),
            period: reconciler.bucket(&record),
        };
        groups.entry(key).or_default().push(record);
    }
    groups
        .into_iter()
        .map(|(key, mut members)| {
            members.sort_by_key(|r| r.record_id);
            (key, members)
        })
        .collect()
}

/// Reconciles one group; singletons pass through untouched.
pub fn reconcile_one<R: DomainReconciler + ?Sized>(
    reconciler: &R,
    key: GroupKey,
    mut records: Vec<ObservationRecord>,
) -> GroupOutcome {
    if records.len() == 1 {
        if let Some(record) = records.pop() {
            let mut output = ReconciledObservation::unchanged(record);
            output.parameter_status = reconciler.annotate(&output.record);
            return GroupOutcome {
                key,
                classification: GroupClassification::Singleton,
                records: vec![output],
                issues: Vec::new(),
                records_in: 1,
                invalid_values: 0,
                unresolved: false,
            };
        }
    }
    reconciler.reconcile_group(&key, records)
}

/// Folds group outcomes into domain statistics.
pub fn tally(outcomes: &[GroupOutcome]) -> DomainStats {
    let mut stats = DomainStats::default();
    for outcome in outcomes {
        stats.groups_seen += 1;
        match outcome.classification {
            GroupClassification::Singleton => stats.singleton_groups += 1,
            GroupClassification::Replicate => stats.replicate_groups += 1,
            GroupClassification::Duplicate => stats.duplicate_groups += 1,
            GroupClassification::PartialReplicate => stats.partial_replicate_groups += 1,
        }
        if outcome.unresolved || outcome.classification == GroupClassification::PartialReplicate {
            stats.unresolved_groups += 1;
        }
        stats.records_superseded += outcome.superseded();
        stats.invalid_values_excluded += outcome.invalid_values;
        stats.records_out += outcome.records.len();
    }
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;

    struct ByYear;

    impl DomainReconciler for ByYear {
        fn domain(&self) -> DataDomain {
            DataDomain::Fish
        }

        fn bucket(&self, record: &ObservationRecord) -> Period {
            Period::Year(record.date.year())
        }

        fn reconcile_group(&self, key: &GroupKey, records: Vec<ObservationRecord>) -> GroupOutcome {
            let records_in = records.len();
            GroupOutcome {
                key: key.clone(),
                classification: GroupClassification::Duplicate,
                records: records
                    .into_iter()
                    .take(1)
                    .map(ReconciledObservation::unchanged)
                    .collect(),
                issues: Vec::new(),
                records_in,
                invalid_values: 0,
                unresolved: false,
            }
        }
    }

    fn obs(id: i64, site: &str, y: i32, m: u32) -> ObservationRecord {
        ObservationRecord::new(id, site, NaiveDate::from_ymd_opt(y, m, 1).unwrap())
    }

    #[test]
    fn test_grouping_is_order_independent() {
        let forward = vec![obs(3, "B", 2006, 6), obs(1, "A", 2006, 6), obs(2, "A", 2006, 9)];
        let mut reversed = forward.clone();
        reversed.reverse();

        let a = group_records(&ByYear, forward);
        let b = group_records(&ByYear, reversed);
        assert_eq!(a, b);
        assert_eq!(a.len(), 2);
        assert_eq!(a[0].0.site_name, "A");
        let ids: Vec<i64> = a[0].1.iter().map(|r| r.record_id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn test_singleton_passthrough_and_tally() {
        let groups = group_records(&ByYear, vec![obs(1, "A", 2006, 6), obs(2, "B", 2006, 6), obs(3, "B", 2006, 7)]);
        let outcomes: Vec<GroupOutcome> = groups
            .into_iter()
            .map(|(key, records)| reconcile_one(&ByYear, key, records))
            .collect();

        assert_eq!(outcomes[0].classification, GroupClassification::Singleton);
        assert_eq!(outcomes[0].records[0].record, obs(1, "A", 2006, 6));

        let stats = tally(&outcomes);
        assert_eq!(stats.groups_seen, 2);
        assert_eq!(stats.singleton_groups, 1);
        assert_eq!(stats.duplicate_groups, 1);
        assert_eq!(stats.records_superseded, 1);
        assert_eq!(stats.records_out, 2);
    }
}

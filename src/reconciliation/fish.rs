// src/reconciliation/fish.rs
//! Fish collections, grouped by site and year. The authoritative date table
//! decides whether a multi-record group is a set of genuine replicate
//! collections or repeated entry of one collection.

use chrono::Datelike;
use log::{debug, warn};
use std::sync::Arc;

use super::date_reference::DateReferenceIndex;
use super::grouping::{
    DomainReconciler, GroupClassification, GroupKey, GroupOutcome, Period, PreparedRecords,
};
use super::metrics::{grade_from_bands, MetricCatalog};
use crate::error::ReconcileIssue;
use crate::matching::SimilarityMatcher;
use crate::models::{DataDomain, ObservationRecord, ReconciledObservation, Resolution};
use crate::utils::constants::{
    DEFAULT_REPLICATE_YEAR_WINDOW, FISH_INTEGRITY_BANDS, FISH_INTEGRITY_FLOOR,
};

pub const COMPARISON_TO_REFERENCE: &str = "comparison_to_reference";

pub fn integrity_class(comparison_to_reference: f64) -> &'static str {
    grade_from_bands(
        comparison_to_reference * 100.0,
        &FISH_INTEGRITY_BANDS,
        FISH_INTEGRITY_FLOOR,
    )
}

/// Repairs records whose nominal year disagrees with their date. The
/// reference date for the site in the nominal year is preferred, then one in
/// the date's own year; without either the date keeps its month and day and
/// takes the nominal year.
pub fn correct_collection_dates(
    mut records: Vec<ObservationRecord>,
    reference: Option<&DateReferenceIndex>,
    matcher: &SimilarityMatcher,
) -> PreparedRecords {
    let mut issues = Vec::new();
    let mut corrections = 0;

    for record in records.iter_mut() {
        let Some(nominal) = record.year else { continue };
        let date_year = record.date.year();
        if nominal == date_year {
            continue;
        }

        let mut reference_date = None;
        if let Some(index) = reference {
            if let Some(found) = index.match_site(matcher, &record.site_name) {
                if let Some(issue) = found.ambiguity_issue(&record.site_name) {
                    issues.push(issue);
                }
                reference_date = index
                    .dates_in_year(&found.name, nominal)
                    .first()
                    .or(index.dates_in_year(&found.name, date_year).first())
                    .copied();
            }
        }

        let original = record.date;
        match reference_date.or_else(|| original.with_year(nominal)) {
            Some(corrected) => {
                record.date = corrected;
                record.year = Some(corrected.year());
                corrections += 1;
                debug!(
                    "Fish record {} at '{}': date {} -> {} (nominal year {})",
                    record.record_id, record.site_name, original, corrected, nominal
                );
            }
            None => warn!(
                "⚠️ Could not correct date {} of fish record {} at '{}' to year {}",
                original, record.record_id, record.site_name, nominal
            ),
        }
    }

    PreparedRecords {
        records,
        issues,
        corrections,
    }
}

#[derive(Debug, Clone)]
pub struct FishReconciler {
    reference: Option<Arc<DateReferenceIndex>>,
    matcher: SimilarityMatcher,
    year_window: i32,
    catalog: MetricCatalog,
}

impl Default for FishReconciler {
    fn default() -> Self {
        Self::new(None, SimilarityMatcher::default(), DEFAULT_REPLICATE_YEAR_WINDOW)
    }
}

impl FishReconciler {
    pub fn new(
        reference: Option<Arc<DateReferenceIndex>>,
        matcher: SimilarityMatcher,
        year_window: i32,
    ) -> Self {
        Self {
            reference,
            matcher,
            year_window,
            catalog: MetricCatalog::fish(),
        }
    }

    /// Means of the group's metrics on the lowest-id record.
    fn average(&self, records: Vec<ObservationRecord>, issues: &mut Vec<ReconcileIssue>) -> Option<ReconciledObservation> {
        let values = self.catalog.average(&records, issues);
        let merged_record_ids: Vec<i64> = records.iter().map(|r| r.record_id).collect();
        let mut consolidated = records.into_iter().min_by_key(|r| r.record_id)?;
        consolidated.values = values;
        consolidated.grade = consolidated
            .number(COMPARISON_TO_REFERENCE)
            .map(|c| integrity_class(c).to_string());
        Some(ReconciledObservation {
            record: consolidated,
            parameter_status: Default::default(),
            resolution: Resolution::Averaged { merged_record_ids },
        })
    }

    fn outcome(
        key: &GroupKey,
        classification: GroupClassification,
        records: Vec<ReconciledObservation>,
        issues: Vec<ReconcileIssue>,
        records_in: usize,
        unresolved: bool,
    ) -> GroupOutcome {
        let invalid_values = issues
            .iter()
            .filter(|i| matches!(i, ReconcileIssue::InvalidNumericInput { .. }))
            .count();
        GroupOutcome {
            key: key.clone(),
            classification,
            records,
            issues,
            records_in,
            invalid_values,
            unresolved,
        }
    }

    fn unresolved(&self, key: &GroupKey, records: Vec<ObservationRecord>, reason: &str) -> GroupOutcome {
        warn!(
            "⚠️ Fish group '{}' ({}): {}; averaging as duplicates",
            key.site_name, key.period, reason
        );
        let records_in = records.len();
        let mut issues = vec![ReconcileIssue::UnresolvableGroup {
            domain: DataDomain::Fish.to_string(),
            site_name: key.site_name.clone(),
            period: key.period.to_string(),
            reason: reason.to_string(),
        }];
        let averaged = self.average(records, &mut issues).into_iter().collect();
        Self::outcome(key, GroupClassification::Duplicate, averaged, issues, records_in, true)
    }
}

impl DomainReconciler for FishReconciler {
    fn domain(&self) -> DataDomain {
        DataDomain::Fish
    }

    fn bucket(&self, record: &ObservationRecord) -> Period {
        Period::Year(record.nominal_year())
    }

    fn prepare(&self, records: Vec<ObservationRecord>) -> PreparedRecords {
        correct_collection_dates(records, self.reference.as_deref(), &self.matcher)
    }

    fn reconcile_group(&self, key: &GroupKey, mut records: Vec<ObservationRecord>) -> GroupOutcome {
        let year = match key.period {
            Period::Year(year) => year,
            Period::Date(date) => date.year(),
        };
        let index = match self.reference.as_deref() {
            Some(index) if !index.is_empty() => index,
            _ => return self.unresolved(key, records, "no authoritative date reference available"),
        };
        let Some(found) = index.match_site(&self.matcher, &key.site_name) else {
            return self.unresolved(key, records, "site not found in authoritative date reference");
        };

        let records_in = records.len();
        let mut issues: Vec<ReconcileIssue> = found.ambiguity_issue(&key.site_name).into_iter().collect();

        let Some((year_used, dates)) = index.replicate_dates(&found.name, year, self.year_window) else {
            debug!(
                "Fish group '{}' ({}): fewer than two reference dates, averaging duplicates",
                key.site_name, year
            );
            let averaged = self.average(records, &mut issues).into_iter().collect();
            return Self::outcome(key, GroupClassification::Duplicate, averaged, issues, records_in, false);
        };

        records.sort_by_key(|r| r.record_id);
        let excess = if records.len() > dates.len() {
            records.split_off(dates.len())
        } else {
            Vec::new()
        };

        let mut output: Vec<ReconciledObservation> = records
            .into_iter()
            .zip(dates.iter().copied())
            .map(|(mut record, assigned_date)| {
                let original_date = record.date;
                record.date = assigned_date;
                record.year = Some(assigned_date.year());
                ReconciledObservation {
                    record,
                    parameter_status: Default::default(),
                    resolution: Resolution::Replicate {
                        original_date,
                        assigned_date,
                    },
                }
            })
            .collect();
        debug!(
            "Fish group '{}' ({}): {} replicates dated from reference year {}",
            key.site_name,
            year,
            output.len(),
            year_used
        );

        if excess.is_empty() {
            return Self::outcome(key, GroupClassification::Replicate, output, issues, records_in, false);
        }

        let reason = format!(
            "{} records but only {} reference dates; {} excess record(s) {}",
            records_in,
            dates.len(),
            excess.len(),
            if excess.len() == 1 {
                "kept unchanged"
            } else {
                "averaged among themselves"
            }
        );
        warn!("⚠️ Fish group '{}' ({}): {}", key.site_name, year, reason);
        issues.push(ReconcileIssue::UnresolvableGroup {
            domain: DataDomain::Fish.to_string(),
            site_name: key.site_name.clone(),
            period: key.period.to_string(),
            reason,
        });

        if excess.len() == 1 {
            output.extend(excess.into_iter().map(ReconciledObservation::unchanged));
        } else {
            output.extend(self.average(excess, &mut issues));
        }
        Self::outcome(key, GroupClassification::PartialReplicate, output, issues, records_in, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DateReferenceEntry, NumericInput};
    use crate::reconciliation::grouping::{group_records, reconcile_one, tally};
    use chrono::NaiveDate;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn sample(id: i64, site: &str, on: NaiveDate, total: f64, comparison: f64) -> ObservationRecord {
        ObservationRecord::new(id, site, on)
            .with_value("total_score", total)
            .with_value("comparison_to_reference", comparison)
            .with_value("tolerant_score", 3.0)
    }

    fn reconciler(entries: &[DateReferenceEntry]) -> FishReconciler {
        FishReconciler::new(
            Some(Arc::new(DateReferenceIndex::new(entries))),
            SimilarityMatcher::default(),
            1,
        )
    }

    fn entry(site: &str, on: NaiveDate) -> DateReferenceEntry {
        DateReferenceEntry {
            site_name: site.to_string(),
            date: on,
            event_type: None,
        }
    }

    fn run(reconciler: &FishReconciler, records: Vec<ObservationRecord>) -> Vec<GroupOutcome> {
        group_records(reconciler, records)
            .into_iter()
            .map(|(key, members)| reconcile_one(reconciler, key, members))
            .collect()
    }

    #[test]
    fn test_two_reference_dates_make_replicates() {
        let reconciler = reconciler(&[entry("X", date(2006, 8, 28)), entry("X", date(2006, 6, 6))]);
        let first = sample(10, "X", date(2006, 7, 1), 40.0, 0.8);
        let second = sample(11, "X", date(2006, 7, 1), 36.0, 0.7);
        let outcomes = run(&reconciler, vec![second.clone(), first.clone()]);

        assert_eq!(outcomes.len(), 1);
        let outcome = &outcomes[0];
        assert_eq!(outcome.classification, GroupClassification::Replicate);
        assert_eq!(outcome.records.len(), 2);

        let early = &outcome.records[0].record;
        let late = &outcome.records[1].record;
        assert_eq!((early.record_id, early.date), (10, date(2006, 6, 6)));
        assert_eq!((late.record_id, late.date), (11, date(2006, 8, 28)));
        assert_eq!(early.values, first.values);
        assert_eq!(late.values, second.values);
        assert_eq!(
            outcome.records[1].resolution,
            Resolution::Replicate {
                original_date: date(2006, 7, 1),
                assigned_date: date(2006, 8, 28)
            }
        );
    }

    #[test]
    fn test_no_reference_averages_and_flags() {
        let outcomes = run(
            &FishReconciler::default(),
            vec![
                sample(1, "X", date(2006, 7, 1), 41.0, 0.8),
                sample(2, "X", date(2006, 7, 2), 44.0, 0.9),
            ],
        );
        let outcome = &outcomes[0];
        assert!(outcome.unresolved);
        assert_eq!(outcome.classification, GroupClassification::Duplicate);
        assert_eq!(outcome.issues[0].kind(), "unresolvable_group");

        let record = &outcome.records[0].record;
        assert_eq!(record.record_id, 1);
        assert_eq!(record.number("total_score"), Some(43.0));
        assert_eq!(record.values["tolerant_score"], None);
        let comparison = record.number("comparison_to_reference").unwrap();
        assert!((comparison - 0.85).abs() < 1e-12);
        assert_eq!(record.grade.as_deref(), Some("Good"));
    }

    #[test]
    fn test_unmatched_site_is_unresolved() {
        let reconciler = reconciler(&[entry("Bird Creek", date(2006, 6, 6))]);
        let outcomes = run(
            &reconciler,
            vec![
                sample(1, "Tenmile Creek", date(2006, 7, 1), 40.0, 0.8),
                sample(2, "Tenmile Creek", date(2006, 7, 1), 40.0, 0.8),
            ],
        );
        assert!(outcomes[0].unresolved);
        assert_eq!(outcomes[0].records.len(), 1);
    }

    #[test]
    fn test_single_reference_date_means_duplicates() {
        let reconciler = reconciler(&[entry("X", date(2006, 6, 6))]);
        let outcomes = run(
            &reconciler,
            vec![
                sample(1, "X", date(2006, 7, 1), 40.0, 0.8),
                sample(2, "X", date(2006, 7, 1), 42.0, 0.8),
            ],
        );
        assert!(!outcomes[0].unresolved);
        assert_eq!(outcomes[0].classification, GroupClassification::Duplicate);
        assert_eq!(outcomes[0].records[0].record.number("total_score"), Some(41.0));
    }

    #[test]
    fn test_excess_records_beyond_reference_dates() {
        let reconciler = reconciler(&[entry("X", date(2006, 6, 6)), entry("X", date(2006, 8, 28))]);

        let three = run(
            &reconciler,
            (1..=3).map(|id| sample(id, "X", date(2006, 7, 1), 40.0, 0.8)).collect(),
        );
        assert_eq!(three[0].classification, GroupClassification::PartialReplicate);
        assert_eq!(three[0].records.len(), 3);
        assert_eq!(three[0].records[2].resolution, Resolution::Unchanged);

        let four = run(
            &reconciler,
            (1..=4).map(|id| sample(id, "X", date(2006, 7, 1), 40.0 + id as f64, 0.8)).collect(),
        );
        assert_eq!(four[0].records.len(), 3);
        let averaged = &four[0].records[2];
        assert_eq!(
            averaged.resolution,
            Resolution::Averaged {
                merged_record_ids: vec![3, 4]
            }
        );
        assert_eq!(averaged.record.number("total_score"), Some(44.0));
        assert_eq!(four[0].superseded(), 1);
        assert!(four[0].issues.iter().any(|i| i.kind() == "unresolvable_group"));

        let stats = tally(&four);
        assert_eq!(stats.partial_replicate_groups, 1);
        assert_eq!(stats.unresolved_groups, 1);
    }

    #[test]
    fn test_replicates_dated_from_previous_year() {
        let reconciler = reconciler(&[
            entry("X", date(2005, 9, 14)),
            entry("X", date(2005, 6, 20)),
            entry("X", date(2007, 7, 2)),
        ]);
        let mut first = sample(21, "X", date(2006, 7, 1), 40.0, 0.8);
        first.year = Some(2006);
        let mut second = sample(22, "X", date(2006, 7, 1), 36.0, 0.7);
        second.year = Some(2006);
        let outcomes = run(&reconciler, vec![second, first]);

        assert_eq!(outcomes.len(), 1);
        let outcome = &outcomes[0];
        assert_eq!(outcome.classification, GroupClassification::Replicate);
        let assigned: Vec<(i64, NaiveDate, Option<i32>)> = outcome
            .records
            .iter()
            .map(|o| (o.record.record_id, o.record.date, o.record.year))
            .collect();
        assert_eq!(
            assigned,
            vec![
                (21, date(2005, 6, 20), Some(2005)),
                (22, date(2005, 9, 14), Some(2005)),
            ]
        );
        assert_eq!(
            outcome.records[0].resolution,
            Resolution::Replicate {
                original_date: date(2006, 7, 1),
                assigned_date: date(2005, 6, 20)
            }
        );
        assert!(outcome.issues.is_empty());
        assert_eq!(tally(&outcomes).unresolved_groups, 0);
    }

    #[test]
    fn test_correct_collection_dates() {
        let index = DateReferenceIndex::new(&[entry("X", date(2006, 6, 10))]);
        let matcher = SimilarityMatcher::default();

        let mut from_reference = sample(1, "X", date(2007, 6, 15), 40.0, 0.8);
        from_reference.year = Some(2006);
        let mut from_year = sample(2, "Y", date(2007, 6, 15), 40.0, 0.8);
        from_year.year = Some(2006);
        let mut impossible = sample(3, "Y", date(2008, 2, 29), 40.0, 0.8);
        impossible.year = Some(2007);
        let consistent = sample(4, "X", date(2006, 6, 1), 40.0, 0.8);

        let prepared = correct_collection_dates(
            vec![from_reference, from_year, impossible, consistent.clone()],
            Some(&index),
            &matcher,
        );
        assert_eq!(prepared.corrections, 2);
        assert_eq!(prepared.records[0].date, date(2006, 6, 10));
        assert_eq!(prepared.records[1].date, date(2006, 6, 15));
        assert_eq!(prepared.records[1].year, Some(2006));
        assert_eq!(prepared.records[2].date, date(2008, 2, 29));
        assert_eq!(prepared.records[3], consistent);
    }

    #[test]
    fn test_sentinel_excluded_from_average() {
        let mut bad = sample(1, "X", date(2006, 7, 1), 40.0, 0.8);
        bad.values
            .insert("total_score".to_string(), Some(NumericInput::Number(-999.0)));
        let outcomes = run(
            &FishReconciler::default(),
            vec![bad, sample(2, "X", date(2006, 7, 1), 36.0, 0.6)],
        );
        assert_eq!(outcomes[0].records[0].record.number("total_score"), Some(36.0));
        assert_eq!(outcomes[0].invalid_values, 1);
    }

    #[test]
    fn test_integrity_classes() {
        assert_eq!(integrity_class(0.98), "Excellent");
        assert_eq!(integrity_class(0.76), "Good");
        assert_eq!(integrity_class(0.61), "Fair");
        assert_eq!(integrity_class(0.5), "Poor");
        assert_eq!(integrity_class(0.2), "Very Poor");
    }
}

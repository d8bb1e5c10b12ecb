// src/reconciliation/habitat.rs
use log::debug;

use super::grouping::{DomainReconciler, GroupClassification, GroupKey, GroupOutcome, Period};
use super::metrics::{grade_from_bands, MetricCatalog};
use crate::models::{DataDomain, ObservationRecord, ReconciledObservation, Resolution};
use crate::utils::constants::{HABITAT_GRADE_BANDS, HABITAT_GRADE_FLOOR};

pub const HABITAT_TOTAL: &str = "total_score";

pub fn habitat_grade(total_score: f64) -> &'static str {
    grade_from_bands(total_score, &HABITAT_GRADE_BANDS, HABITAT_GRADE_FLOOR)
}

/// Habitat assessments sharing a site and date are treated as duplicate
/// entry of one assessment and averaged.
#[derive(Debug, Clone)]
pub struct HabitatReconciler {
    catalog: MetricCatalog,
}

impl Default for HabitatReconciler {
    fn default() -> Self {
        Self {
            catalog: MetricCatalog::habitat(),
        }
    }
}

impl DomainReconciler for HabitatReconciler {
    fn domain(&self) -> DataDomain {
        DataDomain::Habitat
    }

    fn bucket(&self, record: &ObservationRecord) -> Period {
        Period::Date(record.date)
    }

    fn reconcile_group(&self, key: &GroupKey, records: Vec<ObservationRecord>) -> GroupOutcome {
        let records_in = records.len();
        let mut issues = Vec::new();
        let values = self.catalog.average(&records, &mut issues);
        let merged_record_ids: Vec<i64> = records.iter().map(|r| r.record_id).collect();

        let output = records.into_iter().min_by_key(|r| r.record_id).map(|mut consolidated| {
            consolidated.values = values;
            consolidated.grade = consolidated
                .number(HABITAT_TOTAL)
                .map(|total| habitat_grade(total).to_string());
            debug!(
                "Habitat '{}' on {}: averaged {} assessments, grade {:?}",
                key.site_name, key.period, records_in, consolidated.grade
            );
            ReconciledObservation {
                record: consolidated,
                parameter_status: Default::default(),
                resolution: Resolution::Averaged { merged_record_ids },
            }
        });

        GroupOutcome {
            key: key.clone(),
            classification: GroupClassification::Duplicate,
            records: output.into_iter().collect(),
            invalid_values: issues.len(),
            issues,
            records_in,
            unresolved: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NumericInput;
    use crate::reconciliation::grouping::{group_records, reconcile_one};
    use chrono::NaiveDate;

    fn assessment(id: i64, total: f64, cover: f64) -> ObservationRecord {
        let date = NaiveDate::from_ymd_opt(2019, 7, 15).unwrap();
        ObservationRecord::new(id, "Y", date)
            .with_value("total_score", total)
            .with_value("instream_cover", cover)
    }

    fn reconcile(records: Vec<ObservationRecord>) -> Vec<GroupOutcome> {
        let reconciler = HabitatReconciler::default();
        group_records(&reconciler, records)
            .into_iter()
            .map(|(key, members)| reconcile_one(&reconciler, key, members))
            .collect()
    }

    #[test]
    fn test_duplicate_assessments_averaged_and_regraded() {
        let outcomes = reconcile(vec![assessment(2, 91.0, 12.0), assessment(1, 85.0, 13.4)]);
        assert_eq!(outcomes.len(), 1);
        let output = &outcomes[0].records[0];
        assert_eq!(output.record.record_id, 1);
        assert_eq!(output.record.number("total_score"), Some(88.0));
        assert_eq!(output.record.number("instream_cover"), Some(12.7));
        assert_eq!(output.record.grade.as_deref(), Some("B"));
        assert_eq!(
            output.resolution,
            Resolution::Averaged {
                merged_record_ids: vec![1, 2]
            }
        );
        assert_eq!(outcomes[0].superseded(), 1);
    }

    #[test]
    fn test_total_rounds_half_away_from_zero() {
        let outcomes = reconcile(vec![assessment(1, 89.0, 10.0), assessment(2, 90.0, 10.0)]);
        let record = &outcomes[0].records[0].record;
        assert_eq!(record.number("total_score"), Some(90.0));
        assert_eq!(record.grade.as_deref(), Some("A"));
    }

    #[test]
    fn test_sentinel_component_excluded() {
        let mut bad = assessment(1, 70.0, 10.0);
        bad.values
            .insert("instream_cover".to_string(), Some(NumericInput::Number(-99.0)));
        let outcomes = reconcile(vec![bad, assessment(2, 60.0, 14.0)]);
        let record = &outcomes[0].records[0].record;
        assert_eq!(record.number("instream_cover"), Some(14.0));
        assert_eq!(record.grade.as_deref(), Some("D"));
        assert_eq!(outcomes[0].invalid_values, 1);
    }

    #[test]
    fn test_different_dates_stay_separate() {
        let mut later = assessment(2, 50.0, 10.0);
        later.date = NaiveDate::from_ymd_opt(2019, 9, 1).unwrap();
        let outcomes = reconcile(vec![assessment(1, 85.0, 10.0), later]);
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes
            .iter()
            .all(|o| o.classification == GroupClassification::Singleton));
        assert_eq!(habitat_grade(50.0), "F");
    }
}

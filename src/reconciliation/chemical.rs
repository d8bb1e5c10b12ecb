// src/reconciliation/chemical.rs
//! Chemical readings: duplicates on the same site and date are collapsed
//! parameter by parameter to the least favorable value.

use log::debug;
use std::collections::BTreeMap;

use super::grouping::{DomainReconciler, GroupClassification, GroupKey, GroupOutcome, Period};
use super::metrics::{metric_keys, round_to, MetricCatalog};
use crate::models::{DataDomain, NumericInput, ObservationRecord, ReconciledObservation, Resolution};
use crate::utils::constants::{AMMONIA_BDL, NEUTRAL_PH, NITRATE_BDL, NITRITE_BDL};

pub const SOLUBLE_NITROGEN: &str = "soluble_nitrogen";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorstCaseRule {
    /// Farthest from neutral
    FarthestFromNeutral,
    Minimum,
    Maximum,
}

pub fn is_ph(key: &str) -> bool {
    let lower = key.to_lowercase();
    lower == "ph" || lower.starts_with("ph_")
}

pub fn is_dissolved_oxygen(key: &str) -> bool {
    let lower = key.to_lowercase();
    lower == "do" || lower.starts_with("do_") || lower.starts_with("dissolved_oxygen")
}

pub fn worst_case_rule(key: &str) -> WorstCaseRule {
    if is_ph(key) {
        WorstCaseRule::FarthestFromNeutral
    } else if is_dissolved_oxygen(key) {
        WorstCaseRule::Minimum
    } else {
        WorstCaseRule::Maximum
    }
}

/// Least favorable value; on ties the earliest value wins.
pub fn worst_case(rule: WorstCaseRule, values: &[f64]) -> Option<f64> {
    let badness = |v: f64| match rule {
        WorstCaseRule::FarthestFromNeutral => (v - NEUTRAL_PH).abs(),
        WorstCaseRule::Minimum => -v,
        WorstCaseRule::Maximum => v,
    };
    let mut best: Option<f64> = None;
    for &value in values {
        match best {
            Some(current) if badness(value) <= badness(current) => {}
            _ => best = Some(value),
        }
    }
    best
}

/// Thresholds used to label resolved readings.
#[derive(Debug, Clone, PartialEq)]
pub struct ChemicalReferenceValues {
    pub do_normal: (f64, f64),
    pub do_caution: (f64, f64),
    pub ph_normal: (f64, f64),
    /// (normal, caution) upper limits
    pub soluble_nitrogen: (f64, f64),
    pub phosphorus: (f64, f64),
    pub chloride_poor: f64,
}

impl Default for ChemicalReferenceValues {
    fn default() -> Self {
        Self {
            do_normal: (80.0, 130.0),
            do_caution: (50.0, 150.0),
            ph_normal: (6.5, 9.0),
            soluble_nitrogen: (0.8, 1.5),
            phosphorus: (0.05, 0.1),
            chloride_poor: 250.0,
        }
    }
}

impl ChemicalReferenceValues {
    /// Status label for a parameter, or `None` if the parameter has no reference.
    pub fn status(&self, key: &str, value: Option<f64>) -> Option<&'static str> {
        let lower = key.to_lowercase();
        let known = matches!(
            lower.as_str(),
            "do_percent" | "ph" | SOLUBLE_NITROGEN | "phosphorus" | "chloride"
        );
        if !known {
            return None;
        }
        let Some(v) = value else { return Some("Unknown") };
        let upper_limits = |(normal, caution): (f64, f64)| {
            if v > caution {
                "Poor"
            } else if v > normal {
                "Caution"
            } else {
                "Normal"
            }
        };
        let status = match lower.as_str() {
            "do_percent" => {
                if v < self.do_caution.0 || v > self.do_caution.1 {
                    "Poor"
                } else if v < self.do_normal.0 || v > self.do_normal.1 {
                    "Caution"
                } else {
                    "Normal"
                }
            }
            "ph" => {
                if v < self.ph_normal.0 {
                    "Below Normal"
                } else if v > self.ph_normal.1 {
                    "Above Normal"
                } else {
                    "Normal"
                }
            }
            SOLUBLE_NITROGEN => upper_limits(self.soluble_nitrogen),
            "phosphorus" => upper_limits(self.phosphorus),
            _ => {
                if v > self.chloride_poor {
                    "Poor"
                } else {
                    "Normal"
                }
            }
        };
        Some(status)
    }
}

/// Soluble nitrogen from its components, with below-detection-limit
/// substitution for zero or missing values. `None` unless all three
/// components are part of the record.
pub fn derive_soluble_nitrogen(record: &ObservationRecord) -> Option<f64> {
    let components = [("Nitrate", NITRATE_BDL), ("Nitrite", NITRITE_BDL), ("Ammonia", AMMONIA_BDL)];
    if !components.iter().all(|(key, _)| record.values.contains_key(*key)) {
        return None;
    }
    let total: f64 = components
        .iter()
        .map(|(key, bdl)| match record.number(key) {
            Some(v) if v > 0.0 => v,
            _ => *bdl,
        })
        .sum();
    Some(round_to(total, 2))
}

#[derive(Debug, Clone)]
pub struct ChemicalReconciler {
    catalog: MetricCatalog,
    reference: ChemicalReferenceValues,
}

impl Default for ChemicalReconciler {
    fn default() -> Self {
        Self::new(ChemicalReferenceValues::default())
    }
}

impl ChemicalReconciler {
    pub fn new(reference: ChemicalReferenceValues) -> Self {
        Self {
            catalog: MetricCatalog::chemical(),
            reference,
        }
    }
}

impl DomainReconciler for ChemicalReconciler {
    fn domain(&self) -> DataDomain {
        DataDomain::Chemical
    }

    fn bucket(&self, record: &ObservationRecord) -> Period {
        Period::Date(record.date)
    }

    /// Status per referenced parameter. A record that carries the nitrogen
    /// components but no total is labelled from the derived sum.
    fn annotate(&self, record: &ObservationRecord) -> BTreeMap<String, String> {
        let mut status: BTreeMap<String, String> = record
            .values
            .keys()
            .filter_map(|key| {
                self.reference
                    .status(key, record.number(key))
                    .map(|s| (key.clone(), s.to_string()))
            })
            .collect();
        if !record.values.contains_key(SOLUBLE_NITROGEN) {
            if let Some(total) = derive_soluble_nitrogen(record) {
                if let Some(label) = self.reference.status(SOLUBLE_NITROGEN, Some(total)) {
                    status.insert(SOLUBLE_NITROGEN.to_string(), label.to_string());
                }
            }
        }
        status
    }

    fn reconcile_group(&self, key: &GroupKey, records: Vec<ObservationRecord>) -> GroupOutcome {
        let mut issues = Vec::new();
        let mut resolved: BTreeMap<String, Option<NumericInput>> = BTreeMap::new();

        for param in metric_keys(&records) {
            let values: Vec<f64> = self
                .catalog
                .collect_values(&records, &param, &mut issues)
                .into_iter()
                .map(|(_, v)| v)
                .collect();
            let chosen = worst_case(worst_case_rule(&param), &values);
            resolved.insert(param, chosen.map(NumericInput::Number));
        }

        let merged_record_ids: Vec<i64> = records.iter().map(|r| r.record_id).collect();
        let records_in = records.len();
        let mut consolidated = match records.into_iter().min_by_key(|r| r.record_id) {
            Some(template) => template,
            None => {
                return GroupOutcome {
                    key: key.clone(),
                    classification: GroupClassification::Duplicate,
                    records: Vec::new(),
                    issues,
                    records_in,
                    invalid_values: 0,
                    unresolved: false,
                }
            }
        };
        consolidated.values = resolved;
        if consolidated.number(SOLUBLE_NITROGEN).is_none() {
            if let Some(total) = derive_soluble_nitrogen(&consolidated) {
                consolidated.set_number(SOLUBLE_NITROGEN, Some(total));
            }
        }
        debug!(
            "Chemical duplicates at '{}' on {}: records {:?} -> {}",
            key.site_name, key.period, merged_record_ids, consolidated.record_id
        );

        let parameter_status = self.annotate(&consolidated);
        let invalid_values = issues.len();
        GroupOutcome {
            key: key.clone(),
            classification: GroupClassification::Duplicate,
            records: vec![ReconciledObservation {
                record: consolidated,
                parameter_status,
                resolution: Resolution::WorstCase { merged_record_ids },
            }],
            issues,
            records_in,
            invalid_values,
            unresolved: false,
        }
    }
}

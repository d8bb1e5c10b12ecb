// src/reconciliation/metrics.rs
//! Per-domain metric catalogs: how each value is validated and how it
//! behaves when duplicate records are averaged.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::ReconcileIssue;
use crate::models::{NumericInput, ObservationRecord};
use crate::utils::constants::{BIOLOGICAL_SENTINELS, PH_MAX, PH_MIN};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricScale {
    /// Averaged; optionally rounded to a number of decimals
    Continuous { decimals: Option<u32> },
    /// Averaged and rounded to the nearest integer
    IntegerTotal,
    /// Coarse condition score (1/3/5); unknown after averaging
    Ordinal,
}

#[derive(Debug, Clone, Copy)]
pub struct MetricSpec {
    pub key: &'static str,
    pub scale: MetricScale,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

const fn metric(key: &'static str, scale: MetricScale) -> MetricSpec {
    MetricSpec {
        key,
        scale,
        min: None,
        max: None,
    }
}

const HABITAT_COMPONENT: MetricScale = MetricScale::Continuous { decimals: Some(1) };
const RAW: MetricScale = MetricScale::Continuous { decimals: None };

const CHEMICAL_METRICS: &[MetricSpec] = &[MetricSpec {
    key: "pH",
    scale: RAW,
    min: Some(PH_MIN),
    max: Some(PH_MAX),
}];

const FISH_METRICS: &[MetricSpec] = &[
    metric("total_species_score", MetricScale::Ordinal),
    metric("sensitive_benthic_score", MetricScale::Ordinal),
    metric("sunfish_species_score", MetricScale::Ordinal),
    metric("intolerant_species_score", MetricScale::Ordinal),
    metric("tolerant_score", MetricScale::Ordinal),
    metric("insectivorous_score", MetricScale::Ordinal),
    metric("lithophilic_score", MetricScale::Ordinal),
    metric("total_score", MetricScale::IntegerTotal),
    metric("comparison_to_reference", RAW),
    metric("total_species", RAW),
    metric("sensitive_benthic_species", RAW),
    metric("sunfish_species", RAW),
    metric("intolerant_species", RAW),
    metric("proportion_tolerant", RAW),
    metric("proportion_insectivorous", RAW),
    metric("proportion_lithophilic", RAW),
];

const HABITAT_METRICS: &[MetricSpec] = &[
    metric("instream_cover", HABITAT_COMPONENT),
    metric("pool_bottom_substrate", HABITAT_COMPONENT),
    metric("pool_variability", HABITAT_COMPONENT),
    metric("canopy_cover", HABITAT_COMPONENT),
    metric("rocky_runs_riffles", HABITAT_COMPONENT),
    metric("flow", HABITAT_COMPONENT),
    metric("channel_alteration", HABITAT_COMPONENT),
    metric("channel_sinuosity", HABITAT_COMPONENT),
    metric("bank_stability", HABITAT_COMPONENT),
    metric("bank_vegetation_stability", HABITAT_COMPONENT),
    metric("streamside_cover", HABITAT_COMPONENT),
    metric("total_score", MetricScale::IntegerTotal),
];

/// Validation and averaging rules for one domain.
#[derive(Debug, Clone)]
pub struct MetricCatalog {
    context: &'static str,
    specs: &'static [MetricSpec],
    /// Lower bound for metrics without their own entry
    default_min: Option<f64>,
    reject_sentinels: bool,
}

impl MetricCatalog {
    pub fn chemical() -> Self {
        Self {
            context: "chemical",
            specs: CHEMICAL_METRICS,
            default_min: Some(0.0),
            reject_sentinels: false,
        }
    }

    pub fn fish() -> Self {
        Self {
            context: "fish",
            specs: FISH_METRICS,
            default_min: Some(0.0),
            reject_sentinels: true,
        }
    }

    pub fn habitat() -> Self {
        Self {
            context: "habitat",
            specs: HABITAT_METRICS,
            default_min: Some(0.0),
            reject_sentinels: true,
        }
    }

    fn spec(&self, key: &str) -> Option<&MetricSpec> {
        self.specs.iter().find(|s| s.key.eq_ignore_ascii_case(key))
    }

    /// Unknown keys are treated as raw continuous values.
    pub fn scale(&self, key: &str) -> MetricScale {
        self.spec(key).map(|s| s.scale).unwrap_or(RAW)
    }

    pub fn context(&self) -> &'static str {
        self.context
    }

    /// Checks one raw value; `Err` carries the exclusion reason.
    pub fn validate(&self, key: &str, raw: &NumericInput) -> Result<f64, String> {
        let value = raw.parse()?;
        if self.reject_sentinels && BIOLOGICAL_SENTINELS.contains(&value) {
            return Err("missing-value placeholder".to_string());
        }
        let (min, max) = match self.spec(key) {
            Some(spec) if spec.min.is_some() || spec.max.is_some() => (spec.min, spec.max),
            _ => (self.default_min, None),
        };
        if let Some(min) = min {
            if value < min {
                return Err(format!("below plausible minimum {}", min));
            }
        }
        if let Some(max) = max {
            if value > max {
                return Err(format!("above plausible maximum {}", max));
            }
        }
        Ok(value)
    }

    /// Valid values of `key` across `records` as `(record index, value)`.
    /// Nulls are skipped silently; anything else that fails validation is
    /// reported and left out for this key only.
    pub fn collect_values(
        &self,
        records: &[ObservationRecord],
        key: &str,
        issues: &mut Vec<ReconcileIssue>,
    ) -> Vec<(usize, f64)> {
        let mut values = Vec::new();
        for (idx, record) in records.iter().enumerate() {
            let Some(Some(raw)) = record.values.get(key) else { continue };
            match self.validate(key, raw) {
                Ok(value) => values.push((idx, value)),
                Err(reason) => issues.push(ReconcileIssue::InvalidNumericInput {
                    context: self.context.to_string(),
                    record: format!("record {}", record.record_id),
                    field: key.to_string(),
                    value: raw.to_string(),
                    reason,
                }),
            }
        }
        values
    }

    /// Averages every metric across a duplicate group. Ordinal metrics come
    /// back as null; rounded scales are rounded after the mean.
    pub fn average(
        &self,
        records: &[ObservationRecord],
        issues: &mut Vec<ReconcileIssue>,
    ) -> BTreeMap<String, Option<NumericInput>> {
        let mut averaged = BTreeMap::new();
        for key in metric_keys(records) {
            let scale = self.scale(&key);
            if scale == MetricScale::Ordinal {
                averaged.insert(key, None);
                continue;
            }
            let values = self.collect_values(records, &key, issues);
            let resolved = mean(values.iter().map(|(_, v)| *v)).map(|m| match scale {
                MetricScale::Continuous { decimals: Some(d) } => round_to(m, d),
                MetricScale::IntegerTotal => m.round(),
                _ => m,
            });
            averaged.insert(key, resolved.map(NumericInput::Number));
        }
        averaged
    }
}

/// Union of value keys across records, sorted.
pub fn metric_keys(records: &[ObservationRecord]) -> BTreeSet<String> {
    records
        .iter()
        .flat_map(|r| r.values.keys().cloned())
        .collect()
}

pub fn mean<I: IntoIterator<Item = f64>>(values: I) -> Option<f64> {
    let (sum, count) = values
        .into_iter()
        .fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    if count == 0 {
        None
    } else {
        Some(sum / count as f64)
    }
}

/// Rounds half away from zero to `decimals` places.
pub fn round_to(value: f64, decimals: u32) -> f64 {
    let scale = 10f64.powi(decimals as i32);
    (value * scale).round() / scale
}

/// Grade from an ordered list of `(lower bound, label)` bands.
pub fn grade_from_bands(value: f64, bands: &[(f64, &'static str)], floor: &'static str) -> &'static str {
    bands
        .iter()
        .find(|(min, _)| value >= *min)
        .map(|(_, label)| *label)
        .unwrap_or(floor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn record(id: i64, values: &[(&str, f64)]) -> ObservationRecord {
        let date = NaiveDate::from_ymd_opt(2021, 5, 4).unwrap();
        values
            .iter()
            .fold(ObservationRecord::new(id, "X", date), |r, (k, v)| r.with_value(k, *v))
    }

    #[test]
    fn test_chemical_validation() {
        let catalog = MetricCatalog::chemical();
        assert_eq!(catalog.validate("pH", &NumericInput::Number(7.2)), Ok(7.2));
        assert!(catalog.validate("pH", &NumericInput::Number(14.5)).is_err());
        assert!(catalog.validate("Nitrate", &NumericInput::Number(-0.1)).is_err());
        assert!(catalog
            .validate("Chloride", &NumericInput::Text("<5".to_string()))
            .is_err());
    }

    #[test]
    fn test_biological_sentinels_rejected() {
        let catalog = MetricCatalog::habitat();
        assert!(catalog.validate("flow", &NumericInput::Number(-999.0)).is_err());
        assert!(catalog.validate("flow", &NumericInput::Number(-99.0)).is_err());
        assert_eq!(catalog.validate("flow", &NumericInput::Number(9.0)), Ok(9.0));
    }

    #[test]
    fn test_average_rounds_by_scale_and_nulls_ordinals() {
        let records = vec![
            record(1, &[("total_score", 41.0), ("tolerant_score", 5.0), ("comparison_to_reference", 0.8)]),
            record(2, &[("total_score", 44.0), ("tolerant_score", 3.0), ("comparison_to_reference", 0.85)]),
        ];
        let mut issues = Vec::new();
        let averaged = MetricCatalog::fish().average(&records, &mut issues);
        assert!(issues.is_empty());
        assert_eq!(averaged["total_score"], Some(NumericInput::Number(43.0)));
        assert_eq!(averaged["tolerant_score"], None);
        match &averaged["comparison_to_reference"] {
            Some(NumericInput::Number(v)) => assert!((v - 0.825).abs() < 1e-12),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_invalid_value_excluded_for_that_metric_only() {
        let records = vec![
            record(1, &[("instream_cover", 10.0), ("flow", -999.0)]),
            record(2, &[("instream_cover", 15.0), ("flow", 8.0)]),
        ];
        let mut issues = Vec::new();
        let averaged = MetricCatalog::habitat().average(&records, &mut issues);
        assert_eq!(averaged["instream_cover"], Some(NumericInput::Number(12.5)));
        assert_eq!(averaged["flow"], Some(NumericInput::Number(8.0)));
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].kind(), "invalid_numeric_input");
    }

    #[test]
    fn test_rounding_helpers() {
        assert_eq!(round_to(12.25, 1), 12.3);
        assert_eq!(round_to(-0.5, 0), -1.0);
        assert_eq!(mean(Vec::<f64>::new()), None);
        assert_eq!(grade_from_bands(88.0, &[(90.0, "A"), (80.0, "B")], "F"), "B");
        assert_eq!(grade_from_bands(10.0, &[(90.0, "A")], "F"), "F");
    }
}

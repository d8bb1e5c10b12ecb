// src/models/observations.rs
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Observation domains, each with its own consolidation policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataDomain {
    Chemical,
    Fish,
    Habitat,
}

impl DataDomain {
    pub const ALL: [DataDomain; 3] = [DataDomain::Chemical, DataDomain::Fish, DataDomain::Habitat];

    pub fn as_str(&self) -> &'static str {
        match self {
            DataDomain::Chemical => "chemical",
            DataDomain::Fish => "fish",
            DataDomain::Habitat => "habitat",
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            DataDomain::Chemical => "🧪",
            DataDomain::Fish => "🐟",
            DataDomain::Habitat => "🌿",
        }
    }
}

impl fmt::Display for DataDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A measured value as delivered by ingestion. Text is kept so that bad
/// entries can be reported instead of silently dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NumericInput {
    Number(f64),
    Text(String),
}

impl NumericInput {
    /// Parses to a finite number, or returns the reason it could not be used.
    pub fn parse(&self) -> Result<f64, String> {
        match self {
            NumericInput::Number(n) if n.is_finite() => Ok(*n),
            NumericInput::Number(_) => Err("non-finite value".to_string()),
            NumericInput::Text(s) => match s.trim().parse::<f64>() {
                Ok(n) if n.is_finite() => Ok(n),
                Ok(_) => Err("non-finite value".to_string()),
                Err(_) => Err("not a number".to_string()),
            },
        }
    }
}

impl fmt::Display for NumericInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NumericInput::Number(n) => write!(f, "{}", n),
            NumericInput::Text(s) => f.write_str(s),
        }
    }
}

/// One observation row of any domain: a chemical reading set, a fish
/// collection or a habitat assessment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationRecord {
    pub record_id: i64,
    pub site_name: String,
    pub date: NaiveDate,
    /// Nominal period recorded by the source; falls back to the date's year
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub values: BTreeMap<String, Option<NumericInput>>,
    /// Derived categorical grade (habitat grade, fish integrity class)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grade: Option<String>,
}

impl ObservationRecord {
    pub fn new(record_id: i64, site_name: &str, date: NaiveDate) -> Self {
        Self {
            record_id,
            site_name: site_name.to_string(),
            date,
            year: Some(date.year()),
            values: BTreeMap::new(),
            grade: None,
        }
    }

    pub fn with_value(mut self, key: &str, value: f64) -> Self {
        self.values
            .insert(key.to_string(), Some(NumericInput::Number(value)));
        self
    }

    pub fn nominal_year(&self) -> i32 {
        self.year.unwrap_or_else(|| self.date.year())
    }

    /// Numeric value of a parameter, ignoring anything that does not parse.
    pub fn number(&self, key: &str) -> Option<f64> {
        self.values
            .get(key)
            .and_then(|v| v.as_ref())
            .and_then(|v| v.parse().ok())
    }

    pub fn set_number(&mut self, key: &str, value: Option<f64>) {
        self.values
            .insert(key.to_string(), value.map(NumericInput::Number));
    }
}

/// One row of the authoritative fish collection date table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DateReferenceEntry {
    pub site_name: String,
    pub date: NaiveDate,
    #[serde(default)]
    pub event_type: Option<String>,
}

/// How an output observation came to be.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Resolution {
    Unchanged,
    Replicate {
        original_date: NaiveDate,
        assigned_date: NaiveDate,
    },
    WorstCase {
        merged_record_ids: Vec<i64>,
    },
    Averaged {
        merged_record_ids: Vec<i64>,
    },
}

/// A consolidated observation, one per genuine collection event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciledObservation {
    #[serde(flatten)]
    pub record: ObservationRecord,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameter_status: BTreeMap<String, String>,
    pub resolution: Resolution,
}

impl ReconciledObservation {
    pub fn unchanged(record: ObservationRecord) -> Self {
        Self {
            record,
            parameter_status: BTreeMap::new(),
            resolution: Resolution::Unchanged,
        }
    }
}

// src/models/core.rs
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::identity::normalize;

/// Site attributes tracked through priority resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackedField {
    Latitude,
    Longitude,
    County,
    RiverBasin,
    Ecoregion,
}

impl TrackedField {
    pub const ALL: [TrackedField; 5] = [
        TrackedField::Latitude,
        TrackedField::Longitude,
        TrackedField::County,
        TrackedField::RiverBasin,
        TrackedField::Ecoregion,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TrackedField::Latitude => "latitude",
            TrackedField::Longitude => "longitude",
            TrackedField::County => "county",
            TrackedField::RiverBasin => "river_basin",
            TrackedField::Ecoregion => "ecoregion",
        }
    }
}

impl fmt::Display for TrackedField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single non-null attribute value, either a coordinate or a label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Number(f64),
    Text(String),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Number(n) => write!(f, "{}", n),
            FieldValue::Text(s) => write!(f, "'{}'", s),
        }
    }
}

/// One row of a per-source site table, as delivered by the ingestion layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceSiteRow {
    pub raw_name: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub county: Option<String>,
    #[serde(default)]
    pub river_basin: Option<String>,
    #[serde(default)]
    pub ecoregion: Option<String>,
}

impl SourceSiteRow {
    pub fn named(raw_name: &str) -> Self {
        Self {
            raw_name: Some(raw_name.to_string()),
            ..Default::default()
        }
    }

    /// Raw field value; blank labels and non-finite numbers count as null.
    pub fn value(&self, field: TrackedField) -> Option<FieldValue> {
        match field {
            TrackedField::Latitude => finite(self.latitude),
            TrackedField::Longitude => finite(self.longitude),
            TrackedField::County => label(&self.county),
            TrackedField::RiverBasin => label(&self.river_basin),
            TrackedField::Ecoregion => label(&self.ecoregion),
        }
    }
}

fn finite(value: Option<f64>) -> Option<FieldValue> {
    value.filter(|v| v.is_finite()).map(FieldValue::Number)
}

fn label(value: &Option<String>) -> Option<FieldValue> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| FieldValue::Text(s.to_string()))
}

/// A site table tagged with the identifier of the source it came from.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceTable {
    pub source_id: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub rows: Vec<SourceSiteRow>,
}

/// Site Identity Record: one canonical site with its resolved attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteRecord {
    pub raw_name: String,
    pub canonical_name: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub county: Option<String>,
    pub river_basin: Option<String>,
    pub ecoregion: Option<String>,
    /// Source that first introduced the site
    pub source_id: String,
    pub source_rank: u32,
    /// Which source supplied each populated field
    #[serde(default)]
    pub field_provenance: BTreeMap<TrackedField, String>,
    /// Every source mentioning the site, in priority order
    #[serde(default)]
    pub contributing_sources: Vec<String>,
}

impl SiteRecord {
    pub fn new(raw_name: &str, source_id: &str, source_rank: u32) -> Self {
        Self {
            raw_name: raw_name.to_string(),
            canonical_name: normalize(raw_name),
            latitude: None,
            longitude: None,
            county: None,
            river_basin: None,
            ecoregion: None,
            source_id: source_id.to_string(),
            source_rank,
            field_provenance: BTreeMap::new(),
            contributing_sources: vec![source_id.to_string()],
        }
    }

    pub fn with_coordinates(mut self, latitude: f64, longitude: f64) -> Self {
        self.latitude = Some(latitude);
        self.longitude = Some(longitude);
        self.field_provenance
            .insert(TrackedField::Latitude, self.source_id.clone());
        self.field_provenance
            .insert(TrackedField::Longitude, self.source_id.clone());
        self
    }

    pub fn value(&self, field: TrackedField) -> Option<FieldValue> {
        match field {
            TrackedField::Latitude => self.latitude.map(FieldValue::Number),
            TrackedField::Longitude => self.longitude.map(FieldValue::Number),
            TrackedField::County => self.county.clone().map(FieldValue::Text),
            TrackedField::RiverBasin => self.river_basin.clone().map(FieldValue::Text),
            TrackedField::Ecoregion => self.ecoregion.clone().map(FieldValue::Text),
        }
    }

    /// Sets a field and records which source supplied it. Mismatched kinds are ignored.
    pub fn set_value(&mut self, field: TrackedField, value: FieldValue, source_id: &str) {
        let applied = match (field, value) {
            (TrackedField::Latitude, FieldValue::Number(n)) => {
                self.latitude = Some(n);
                true
            }
            (TrackedField::Longitude, FieldValue::Number(n)) => {
                self.longitude = Some(n);
                true
            }
            (TrackedField::County, FieldValue::Text(s)) => {
                self.county = Some(s);
                true
            }
            (TrackedField::RiverBasin, FieldValue::Text(s)) => {
                self.river_basin = Some(s);
                true
            }
            (TrackedField::Ecoregion, FieldValue::Text(s)) => {
                self.ecoregion = Some(s);
                true
            }
            _ => false,
        };
        if applied {
            self.field_provenance.insert(field, source_id.to_string());
        }
    }

    pub fn coordinates(&self) -> Option<(f64, f64)> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) => Some((lat, lon)),
            _ => None,
        }
    }
}

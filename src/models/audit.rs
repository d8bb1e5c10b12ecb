// src/models/audit.rs
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::core::FieldValue;
use super::observations::ObservationRecord;

/// A value offered by one source for a conflicted field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompetingValue {
    pub source_id: String,
    pub value: FieldValue,
}

/// Two or more sources disagreeing on one field of one site. Values are kept
/// in source priority order; the first is always the chosen one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictRecord {
    pub site_name: String,
    pub field_name: String,
    pub competing_values: Vec<CompetingValue>,
    pub chosen_value: FieldValue,
}

/// Absorbed site name -> surviving preferred name. Never chains.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AbsorptionMap(BTreeMap<String, String>);

impl AbsorptionMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `absorbed` folds into `preferred`. Existing entries that
    /// pointed at `absorbed` are repointed so no chain can form.
    pub fn insert(&mut self, absorbed: &str, preferred: &str) {
        let target = self.resolve(preferred).to_string();
        if absorbed == target {
            return;
        }
        for existing in self.0.values_mut() {
            if existing == absorbed {
                *existing = target.clone();
            }
        }
        self.0.insert(absorbed.to_string(), target);
    }

    /// Final name for a site; names that were never absorbed map to themselves.
    pub fn resolve<'a>(&'a self, name: &'a str) -> &'a str {
        self.0.get(name).map(String::as_str).unwrap_or(name)
    }

    pub fn get(&self, absorbed: &str) -> Option<&str> {
        self.0.get(absorbed).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.0.iter()
    }

    /// True when no preferred name is itself absorbed.
    pub fn is_acyclic(&self) -> bool {
        self.0.values().all(|target| !self.0.contains_key(target))
    }

    /// Rewrites one site reference; `None` when it needs no change.
    pub fn rewrite(&self, site_name: &str) -> Option<String> {
        self.0.get(site_name).cloned()
    }

    /// Applies the map to a batch of observations in place and returns the
    /// number of rows touched. Running it twice changes nothing the second time.
    pub fn rewrite_observations(&self, records: &mut [ObservationRecord]) -> usize {
        let mut rewritten = 0;
        for record in records.iter_mut() {
            if let Some(target) = self.rewrite(&record.site_name) {
                record.site_name = target;
                rewritten += 1;
            }
        }
        rewritten
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_insert_never_chains() {
        let mut map = AbsorptionMap::new();
        map.insert("A", "B");
        map.insert("B", "C");
        assert_eq!(map.get("A"), Some("C"));
        assert_eq!(map.get("B"), Some("C"));
        assert!(map.is_acyclic());

        map.insert("D", "A");
        assert_eq!(map.get("D"), Some("C"));
        assert_eq!(map.resolve(map.resolve("D")), "C");
    }

    #[test]
    fn test_self_mapping_is_ignored() {
        let mut map = AbsorptionMap::new();
        map.insert("A", "B");
        map.insert("B", "A");
        assert!(map.is_acyclic());
        assert_eq!(map.resolve("A"), map.resolve("B"));
    }

    #[test]
    fn test_rewrite_observations_is_idempotent() {
        let mut map = AbsorptionMap::new();
        map.insert("Coal Cr", "Coal Creek");
        let date = NaiveDate::from_ymd_opt(2019, 7, 2).unwrap();
        let mut records = vec![
            ObservationRecord::new(1, "Coal Cr", date),
            ObservationRecord::new(2, "Coal Creek", date),
            ObservationRecord::new(3, "Bird Creek", date),
        ];

        assert_eq!(map.rewrite_observations(&mut records), 1);
        assert_eq!(records[0].site_name, "Coal Creek");
        assert_eq!(map.rewrite_observations(&mut records), 0);
    }
}

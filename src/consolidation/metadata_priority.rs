// src/consolidation/metadata_priority.rs
//! Merges per-source site tables into one record per canonical site name.
//!
//! Sources are visited from highest to lowest priority. The first non-null
//! value for a field wins; a later, different non-null value is logged as a
//! conflict and never overwrites it. Fields still empty after the higher
//! sources are filled from the first lower source that has them.

use log::{debug, info, warn};
use std::collections::HashMap;

use crate::error::{ReconcileError, ReconcileIssue, Result};
use crate::identity::{has_identity, normalize_optional};
use crate::models::{
    CompetingValue, ConflictRecord, FieldValue, SiteRecord, SourceSiteRow, SourceTable,
    TrackedField,
};
use crate::utils::constants::DEFAULT_SOURCE_PRIORITY;

/// Metadata ranking of sources, highest priority first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourcePriority {
    ranked: Vec<String>,
}

impl Default for SourcePriority {
    fn default() -> Self {
        Self::new(DEFAULT_SOURCE_PRIORITY.iter().copied())
    }
}

impl SourcePriority {
    pub fn new<I, S>(sources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut ranked: Vec<String> = Vec::new();
        for source in sources {
            let source = source.as_ref().trim();
            if !source.is_empty() && !ranked.iter().any(|s| s == source) {
                ranked.push(source.to_string());
            }
        }
        Self { ranked }
    }

    /// Rank of a source; larger is more trusted. Unlisted sources rank 0.
    pub fn rank(&self, source_id: &str) -> Option<u32> {
        self.ranked
            .iter()
            .position(|s| s == source_id)
            .map(|pos| (self.ranked.len() - pos) as u32)
    }

    pub fn is_empty(&self) -> bool {
        self.ranked.is_empty()
    }

    pub fn sources(&self) -> &[String] {
        &self.ranked
    }
}

/// Output of a priority merge.
#[derive(Debug, Clone, Default)]
pub struct PriorityMerge {
    pub sites: Vec<SiteRecord>,
    pub conflicts: Vec<ConflictRecord>,
    pub issues: Vec<ReconcileIssue>,
    pub source_rows: usize,
    pub missing_identity_rows: usize,
}

/// Assigns each table its rank and returns them in visiting order.
fn order_tables<'a>(
    tables: &'a [SourceTable],
    priority: &SourcePriority,
) -> Vec<(&'a SourceTable, u32)> {
    let total = tables.len() as u32;
    let mut ordered: Vec<(&SourceTable, u32)> = tables
        .iter()
        .enumerate()
        .map(|(idx, table)| {
            let rank = if priority.is_empty() {
                total - idx as u32
            } else {
                match priority.rank(&table.source_id) {
                    Some(rank) => rank,
                    None => {
                        warn!(
                            "⚠️ Source '{}' has no metadata priority; ranking it below every listed source",
                            table.source_id
                        );
                        0
                    }
                }
            };
            (table, rank)
        })
        .collect();
    // stable: equal ranks keep input order
    ordered.sort_by(|a, b| b.1.cmp(&a.1));
    ordered
}

/// Treats out-of-range coordinates as null and reports them.
fn sanitize_row(
    row: &SourceSiteRow,
    source_id: &str,
    row_idx: usize,
    issues: &mut Vec<ReconcileIssue>,
) -> SourceSiteRow {
    let mut clean = row.clone();
    let checks = [
        (TrackedField::Latitude, row.latitude, 90.0),
        (TrackedField::Longitude, row.longitude, 180.0),
    ];
    for (field, value, limit) in checks {
        let Some(v) = value else { continue };
        let reason = if !v.is_finite() {
            Some("non-finite coordinate")
        } else if v.abs() > limit {
            Some("coordinate out of range")
        } else {
            None
        };
        if let Some(reason) = reason {
            issues.push(ReconcileIssue::InvalidNumericInput {
                context: source_id.to_string(),
                record: format!("row {}", row_idx),
                field: field.as_str().to_string(),
                value: v.to_string(),
                reason: reason.to_string(),
            });
            match field {
                TrackedField::Latitude => clean.latitude = None,
                _ => clean.longitude = None,
            }
        }
    }
    clean
}

#[derive(Default)]
struct ConflictLog {
    records: Vec<ConflictRecord>,
    positions: HashMap<(String, TrackedField), usize>,
}

impl ConflictLog {
    /// Adds a competing value and returns the updated record.
    fn record(
        &mut self,
        site: &SiteRecord,
        field: TrackedField,
        chosen: FieldValue,
        incoming: CompetingValue,
    ) -> &ConflictRecord {
        let key = (site.canonical_name.clone(), field);
        let pos = match self.positions.get(&key) {
            Some(&pos) => pos,
            None => {
                let chosen_source = site
                    .field_provenance
                    .get(&field)
                    .cloned()
                    .unwrap_or_else(|| site.source_id.clone());
                self.records.push(ConflictRecord {
                    site_name: site.canonical_name.clone(),
                    field_name: field.as_str().to_string(),
                    competing_values: vec![CompetingValue {
                        source_id: chosen_source,
                        value: chosen.clone(),
                    }],
                    chosen_value: chosen,
                });
                self.positions.insert(key, self.records.len() - 1);
                self.records.len() - 1
            }
        };
        let conflict = &mut self.records[pos];
        if !conflict.competing_values.contains(&incoming) {
            conflict.competing_values.push(incoming);
        }
        &self.records[pos]
    }
}

/// Merges ranked site tables into one record per canonical name.
pub fn resolve(tables: &[SourceTable], priority: &SourcePriority) -> Result<PriorityMerge> {
    if tables.is_empty() {
        return Err(ReconcileError::NoSiteTables);
    }

    let mut merge = PriorityMerge::default();
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut conflicts = ConflictLog::default();

    for (table, rank) in order_tables(tables, priority) {
        debug!(
            "Merging {} rows from '{}' (rank {})",
            table.rows.len(),
            table.source_id,
            rank
        );
        for (row_idx, raw_row) in table.rows.iter().enumerate() {
            merge.source_rows += 1;
            let canonical = normalize_optional(raw_row.raw_name.as_deref());
            if !has_identity(&canonical) {
                merge.missing_identity_rows += 1;
                warn!(
                    "⚠️ Row {} of '{}' has no usable site name; excluded",
                    row_idx, table.source_id
                );
                merge.issues.push(ReconcileIssue::MissingIdentity {
                    table: table.source_id.clone(),
                    record: format!("row {}", row_idx),
                });
                continue;
            }
            let row = sanitize_row(raw_row, &table.source_id, row_idx, &mut merge.issues);

            let pos = *positions.entry(canonical).or_insert_with(|| {
                let raw_name = row.raw_name.as_deref().unwrap_or_default();
                merge
                    .sites
                    .push(SiteRecord::new(raw_name, &table.source_id, rank));
                merge.sites.len() - 1
            });
            let site = &mut merge.sites[pos];
            if !site.contributing_sources.contains(&table.source_id) {
                site.contributing_sources.push(table.source_id.clone());
            }

            for field in TrackedField::ALL {
                let Some(incoming) = row.value(field) else { continue };
                match site.value(field) {
                    None => site.set_value(field, incoming, &table.source_id),
                    Some(current) if current == incoming => {}
                    Some(current) => {
                        let conflict = conflicts.record(
                            site,
                            field,
                            current.clone(),
                            CompetingValue {
                                source_id: table.source_id.clone(),
                                value: incoming.clone(),
                            },
                        );
                        let chosen_source = conflict
                            .competing_values
                            .first()
                            .map(|c| c.source_id.clone())
                            .unwrap_or_default();
                        let competing = conflict.competing_values.len().saturating_sub(1);
                        warn!(
                            "⚠️ Conflicting {} for '{}': keeping {} from {}, ignoring {} from {}",
                            field, site.canonical_name, current, chosen_source, incoming, table.source_id
                        );
                        merge.issues.push(ReconcileIssue::ConflictingMetadata {
                            site_name: site.canonical_name.clone(),
                            field: field.as_str().to_string(),
                            chosen: current.to_string(),
                            chosen_source,
                            competing,
                        });
                    }
                }
            }
        }
    }

    if merge.sites.is_empty() {
        return Err(ReconcileError::NoSiteIdentities {
            rows: merge.source_rows,
        });
    }

    merge.conflicts = conflicts.records;
    info!(
        "Priority merge: {} rows from {} tables -> {} sites, {} conflicts, {} rows without identity",
        merge.source_rows,
        tables.len(),
        merge.sites.len(),
        merge.conflicts.len(),
        merge.missing_identity_rows
    );
    Ok(merge)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(name: &str, lat: Option<f64>, lon: Option<f64>, county: Option<&str>) -> SourceSiteRow {
        SourceSiteRow {
            raw_name: Some(name.to_string()),
            latitude: lat,
            longitude: lon,
            county: county.map(str::to_string),
            ..Default::default()
        }
    }

    fn table(source_id: &str, rows: Vec<SourceSiteRow>) -> SourceTable {
        SourceTable {
            source_id: source_id.to_string(),
            description: None,
            rows,
        }
    }

    #[test]
    fn test_spacing_variants_merge_with_high_priority_coordinates() {
        let tables = vec![
            table(
                "fish_data",
                vec![row("Spring Creek - I35", Some(36.11), Some(-97.05), None)],
            ),
            table(
                "site_data",
                vec![row("Spring Creek  -  I35", Some(36.1), Some(-97.0), Some("Payne"))],
            ),
        ];
        let priority = SourcePriority::new(["site_data", "fish_data"]);
        let merged = resolve(&tables, &priority).unwrap();

        assert_eq!(merged.sites.len(), 1);
        let site = &merged.sites[0];
        assert_eq!(site.canonical_name, "Spring Creek - I35");
        assert_eq!(site.latitude, Some(36.1));
        assert_eq!(site.longitude, Some(-97.0));
        assert_eq!(site.source_id, "site_data");
        assert_eq!(site.contributing_sources, vec!["site_data", "fish_data"]);
        assert_eq!(merged.conflicts.len(), 2);
    }

    #[test]
    fn test_fill_from_below_records_provenance() {
        let tables = vec![
            table("site_data", vec![row("Coal Creek", None, None, Some("Tulsa"))]),
            table("fish_data", vec![row("Coal Creek", Some(36.2), Some(-95.9), None)]),
        ];
        let merged = resolve(&tables, &SourcePriority::new(["site_data", "fish_data"])).unwrap();
        let site = &merged.sites[0];
        assert_eq!(site.latitude, Some(36.2));
        assert_eq!(
            site.field_provenance.get(&TrackedField::Latitude).map(String::as_str),
            Some("fish_data")
        );
        assert_eq!(
            site.field_provenance.get(&TrackedField::County).map(String::as_str),
            Some("site_data")
        );
        assert!(merged.conflicts.is_empty());
    }

    #[test]
    fn test_conflict_accumulates_in_priority_order() {
        let tables = vec![
            table("macro_data", vec![row("Bird Creek", None, None, Some("Osage"))]),
            table("site_data", vec![row("Bird Creek", None, None, Some("Tulsa"))]),
            table("fish_data", vec![row("Bird Creek", None, None, Some("Rogers"))]),
        ];
        let priority = SourcePriority::new(["site_data", "fish_data", "macro_data"]);
        let merged = resolve(&tables, &priority).unwrap();

        assert_eq!(merged.sites[0].county.as_deref(), Some("Tulsa"));
        assert_eq!(merged.conflicts.len(), 1);
        let conflict = &merged.conflicts[0];
        assert_eq!(conflict.field_name, "county");
        assert_eq!(conflict.chosen_value, FieldValue::Text("Tulsa".to_string()));
        let sources: Vec<&str> = conflict
            .competing_values
            .iter()
            .map(|c| c.source_id.as_str())
            .collect();
        assert_eq!(sources, vec!["site_data", "fish_data", "macro_data"]);

        let conflict_issues = merged
            .issues
            .iter()
            .filter(|i| i.kind() == "conflicting_metadata")
            .count();
        assert_eq!(conflict_issues, 2);
    }

    #[test]
    fn test_equal_values_and_nulls_never_conflict() {
        let tables = vec![
            table("site_data", vec![row("Tenmile Creek", Some(35.0), None, None)]),
            table("fish_data", vec![row("Tenmile Creek", Some(35.0), None, Some(" "))]),
        ];
        let merged = resolve(&tables, &SourcePriority::default()).unwrap();
        assert!(merged.conflicts.is_empty());
        assert_eq!(merged.sites[0].county, None);
    }

    #[test]
    fn test_missing_identity_is_excluded() {
        let mut blank = row("   ", Some(35.0), Some(-97.0), None);
        blank.raw_name = Some("   ".to_string());
        let tables = vec![table(
            "site_data",
            vec![blank, SourceSiteRow::default(), row("Coal Creek", None, None, None)],
        )];
        let merged = resolve(&tables, &SourcePriority::default()).unwrap();
        assert_eq!(merged.sites.len(), 1);
        assert_eq!(merged.missing_identity_rows, 2);
        assert!(merged.issues.iter().all(|i| i.kind() == "missing_identity"));
    }

    #[test]
    fn test_out_of_range_coordinates_are_null() {
        let tables = vec![
            table("site_data", vec![row("Coal Creek", Some(360.0), Some(-95.9), None)]),
            table("fish_data", vec![row("Coal Creek", Some(36.2), None, None)]),
        ];
        let merged = resolve(&tables, &SourcePriority::default()).unwrap();
        assert_eq!(merged.sites[0].latitude, Some(36.2));
        assert!(merged
            .issues
            .iter()
            .any(|i| i.kind() == "invalid_numeric_input"));
    }

    #[test]
    fn test_fatal_preconditions() {
        assert!(matches!(
            resolve(&[], &SourcePriority::default()),
            Err(ReconcileError::NoSiteTables)
        ));
        let empty = vec![table("site_data", vec![SourceSiteRow::default()])];
        assert!(matches!(
            resolve(&empty, &SourcePriority::default()),
            Err(ReconcileError::NoSiteIdentities { rows: 1 })
        ));
    }

    #[test]
    fn test_empty_priority_uses_table_order() {
        let tables = vec![
            table("b_source", vec![row("Coal Creek", Some(1.0), Some(1.0), None)]),
            table("a_source", vec![row("Coal Creek", Some(2.0), Some(2.0), None)]),
        ];
        let merged = resolve(&tables, &SourcePriority::new(Vec::<String>::new())).unwrap();
        assert_eq!(merged.sites[0].latitude, Some(1.0));
        assert_eq!(merged.sites[0].source_rank, 2);
    }
}

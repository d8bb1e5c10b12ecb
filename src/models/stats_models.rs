// src/models/stats_models.rs
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::observations::DataDomain;

/// Site consolidation statistics
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteStats {
    pub source_tables: usize,
    pub source_rows: usize,
    pub missing_identity_rows: usize,
    pub merged_sites: usize,
    pub conflicts_logged: usize,
    pub coordinate_clusters: usize,
    pub sites_absorbed: usize,
    pub uncategorized_sites: usize,
    pub final_sites: usize,
}

/// Per-domain event reconciliation statistics
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainStats {
    pub records_in: usize,
    pub records_rejected: usize,
    pub unmatched_sites: usize,
    pub site_references_rewritten: usize,
    pub date_corrections: usize,
    pub groups_seen: usize,
    pub singleton_groups: usize,
    pub replicate_groups: usize,
    pub duplicate_groups: usize,
    pub partial_replicate_groups: usize,
    /// Groups resolved by fallback or only in part; one `UnresolvableGroup` issue each
    pub unresolved_groups: usize,
    pub records_superseded: usize,
    pub invalid_values_excluded: usize,
    pub records_out: usize,
}

impl DomainStats {
    /// Adds another partial tally, as produced by one worker chunk.
    pub fn absorb(&mut self, other: &DomainStats) {
        self.records_in += other.records_in;
        self.records_rejected += other.records_rejected;
        self.unmatched_sites += other.unmatched_sites;
        self.site_references_rewritten += other.site_references_rewritten;
        self.date_corrections += other.date_corrections;
        self.groups_seen += other.groups_seen;
        self.singleton_groups += other.singleton_groups;
        self.replicate_groups += other.replicate_groups;
        self.duplicate_groups += other.duplicate_groups;
        self.partial_replicate_groups += other.partial_replicate_groups;
        self.unresolved_groups += other.unresolved_groups;
        self.records_superseded += other.records_superseded;
        self.invalid_values_excluded += other.invalid_values_excluded;
        self.records_out += other.records_out;
    }
}

/// Run summary a caller inspects to decide whether results are trustworthy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationSummary {
    pub run_id: String,
    pub started_at: NaiveDateTime,
    pub duration_secs: f64,
    pub sites: SiteStats,
    pub domains: BTreeMap<DataDomain, DomainStats>,
    pub issue_counts: BTreeMap<String, usize>,
}

impl ReconciliationSummary {
    pub fn total_issues(&self) -> usize {
        self.issue_counts.values().sum()
    }
}

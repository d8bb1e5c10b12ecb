// src/error.rs
//! Error types for the reconciliation engine.
//!
//! `ReconcileError` is reserved for fatal precondition failures: a run cannot
//! start without them. Everything that goes wrong with a single record or a
//! single group is a `ReconcileIssue`, logged and collected in the run output
//! while processing continues.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fatal errors. A run aborts only on these.
#[derive(Error, Debug)]
pub enum ReconcileError {
    /// No per-source site table was supplied at all
    #[error("No site tables supplied: at least one source site table is required")]
    NoSiteTables,

    /// Every site table was empty or every row lacked a usable name
    #[error("Site tables contain no usable site identities ({rows} rows inspected)")]
    NoSiteIdentities { rows: usize },

    /// Invalid engine configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// A reconciliation worker panicked or was cancelled
    #[error("Reconciliation task failed: {0}")]
    TaskFailed(String),
}

/// Convenience Result type using the engine error
pub type Result<T> = std::result::Result<T, ReconcileError>;

/// Non-fatal, record- or group-scoped problems.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReconcileIssue {
    /// A record has no usable name after normalization and was excluded from matching
    #[error("Missing identity in {table} ({record})")]
    MissingIdentity { table: String, record: String },

    /// Several candidates tied at the best similarity score; the first one was used
    #[error("Ambiguous match for '{name}': {candidates:?} tied at {score:.3}, chose '{chosen}'")]
    AmbiguousMatch {
        name: String,
        candidates: Vec<String>,
        score: f64,
        chosen: String,
    },

    /// Two sources disagree on a field; the higher-priority value was kept
    #[error("Conflicting {field} for '{site_name}': kept {chosen} from {chosen_source}, {competing} competing value(s)")]
    ConflictingMetadata {
        site_name: String,
        field: String,
        chosen: String,
        chosen_source: String,
        competing: usize,
    },

    /// An observation group could not be resolved against its authority and fell back
    #[error("Unresolvable {domain} group '{site_name}' ({period}): {reason}")]
    UnresolvableGroup {
        domain: String,
        site_name: String,
        period: String,
        reason: String,
    },

    /// A value was non-numeric or implausible and was excluded for that parameter only
    #[error("Invalid {field} value '{value}' in {context} ({record}): {reason}")]
    InvalidNumericInput {
        context: String,
        record: String,
        field: String,
        value: String,
        reason: String,
    },

    /// An observation references a site that is not in the final catalog
    #[error("Unmatched site '{site_name}' for {domain} record {record_id}")]
    UnmatchedSite {
        domain: String,
        record_id: i64,
        site_name: String,
    },
}

impl ReconcileIssue {
    pub fn kind(&self) -> &'static str {
        match self {
            ReconcileIssue::MissingIdentity { .. } => "missing_identity",
            ReconcileIssue::AmbiguousMatch { .. } => "ambiguous_match",
            ReconcileIssue::ConflictingMetadata { .. } => "conflicting_metadata",
            ReconcileIssue::UnresolvableGroup { .. } => "unresolvable_group",
            ReconcileIssue::InvalidNumericInput { .. } => "invalid_numeric_input",
            ReconcileIssue::UnmatchedSite { .. } => "unmatched_site",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_kind_names() {
        let issue = ReconcileIssue::MissingIdentity {
            table: "fish_data".to_string(),
            record: "row 4".to_string(),
        };
        assert_eq!(issue.kind(), "missing_identity");
        assert_eq!(issue.to_string(), "Missing identity in fish_data (row 4)");
    }

    #[test]
    fn test_issue_serializes_with_kind_tag() {
        let issue = ReconcileIssue::UnresolvableGroup {
            domain: "fish".to_string(),
            site_name: "Spring Creek".to_string(),
            period: "2006".to_string(),
            reason: "no reference site match".to_string(),
        };
        let json = serde_json::to_value(&issue).unwrap();
        assert_eq!(json["kind"], "unresolvable_group");
        assert_eq!(json["site_name"], "Spring Creek");
    }
}

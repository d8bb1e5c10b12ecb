// src/models/mod.rs
pub mod audit;
pub mod core;
pub mod observations;
pub mod stats_models;

pub use self::audit::{AbsorptionMap, CompetingValue, ConflictRecord};
pub use self::core::{FieldValue, SiteRecord, SourceSiteRow, SourceTable, TrackedField};
pub use self::observations::{
    DataDomain, DateReferenceEntry, NumericInput, ObservationRecord, ReconciledObservation,
    Resolution,
};
pub use self::stats_models::{DomainStats, ReconciliationSummary, SiteStats};

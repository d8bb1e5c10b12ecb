// src/reconciliation/mod.rs
pub mod chemical;
pub mod date_reference;
pub mod fish;
pub mod grouping;
pub mod habitat;
pub mod metrics;

pub use chemical::{ChemicalReconciler, ChemicalReferenceValues, WorstCaseRule};
pub use date_reference::DateReferenceIndex;
pub use fish::{correct_collection_dates, FishReconciler};
pub use grouping::{
    group_records, reconcile_one, tally, DomainReconciler, GroupClassification, GroupKey,
    GroupOutcome, Period, PreparedRecords,
};
pub use habitat::HabitatReconciler;
pub use metrics::{MetricCatalog, MetricScale};

// src/lib.rs
pub mod consolidation;
pub mod error;
pub mod identity;
pub mod matching;
pub mod models;
pub mod pipeline;
pub mod reconciliation;
pub mod utils;

pub use error::{ReconcileError, ReconcileIssue};
pub use pipeline::{run_reconciliation, ReconciliationInput, ReconciliationOutput};

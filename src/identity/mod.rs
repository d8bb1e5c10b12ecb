// src/identity/mod.rs
pub mod normalize;

pub use normalize::{has_identity, normalize, normalize_optional};

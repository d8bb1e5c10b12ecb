// src/matching/mod.rs
pub mod similarity;

pub use similarity::{
    match_name, sequence_ratio, NameIndex, NameMatch, SimilarityMatcher, SimilarityMetric,
    DEFAULT_MATCH_THRESHOLD,
};

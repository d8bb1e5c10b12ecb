// src/consolidation/mod.rs
pub mod geo_duplicates;
pub mod metadata_priority;

pub use geo_duplicates::{
    analyze_clusters, detect_and_merge, ClusterRanking, CoordinateCluster, GeoMergeResult,
    PreferenceReason,
};
pub use metadata_priority::{resolve, PriorityMerge, SourcePriority};

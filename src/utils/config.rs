// src/utils/config.rs
//! Engine configuration loaded from environment variables.

use log::{debug, info, warn};
use std::env;

use crate::consolidation::geo_duplicates::ClusterRanking;
use crate::consolidation::metadata_priority::SourcePriority;
use crate::error::{ReconcileError, Result};
use crate::matching::{SimilarityMatcher, SimilarityMetric, DEFAULT_MATCH_THRESHOLD};
use crate::utils::constants::{
    DEFAULT_CHUNK_SIZE, DEFAULT_CLUSTER_RANKING, DEFAULT_COORDINATE_PRECISION,
    DEFAULT_REPLICATE_YEAR_WINDOW, DEFAULT_SOURCE_PRIORITY, MAX_COORDINATE_PRECISION,
};

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Minimum similarity for a fuzzy site match
    pub match_threshold: f64,
    pub similarity_metric: SimilarityMetric,
    /// Decimal places used for the coordinate grid
    pub coordinate_precision: u32,
    pub replicate_year_window: i32,
    /// Metadata priority, highest first
    pub source_priority: Vec<String>,
    /// Coordinate-cluster preference, highest first
    pub cluster_ranking: Vec<String>,
    /// Observation groups per worker task
    pub chunk_size: usize,
    pub concurrency: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            match_threshold: DEFAULT_MATCH_THRESHOLD,
            similarity_metric: SimilarityMetric::SequenceRatio,
            coordinate_precision: DEFAULT_COORDINATE_PRECISION,
            replicate_year_window: DEFAULT_REPLICATE_YEAR_WINDOW,
            source_priority: DEFAULT_SOURCE_PRIORITY.iter().map(|s| s.to_string()).collect(),
            cluster_ranking: DEFAULT_CLUSTER_RANKING.iter().map(|s| s.to_string()).collect(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            concurrency: num_cpus::get(),
        }
    }
}

fn comma_list(var: &str) -> Option<Vec<String>> {
    let raw = env::var(var).ok()?;
    let items: Vec<String> = raw
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    if items.is_empty() {
        None
    } else {
        Some(items)
    }
}

impl EngineConfig {
    /// Create configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let similarity_metric = match env::var("SIMILARITY_METRIC") {
            Ok(raw) => raw.parse().unwrap_or_else(|e| {
                warn!("⚠️ {}; using {}", e, defaults.similarity_metric);
                defaults.similarity_metric
            }),
            Err(_) => defaults.similarity_metric,
        };

        let config = Self {
            match_threshold: env::var("MATCH_THRESHOLD")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.match_threshold),
            similarity_metric,
            coordinate_precision: env::var("COORDINATE_PRECISION")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.coordinate_precision),
            replicate_year_window: env::var("REPLICATE_YEAR_WINDOW")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.replicate_year_window),
            source_priority: comma_list("SOURCE_PRIORITY").unwrap_or(defaults.source_priority),
            cluster_ranking: comma_list("CLUSTER_RANKING").unwrap_or(defaults.cluster_ranking),
            chunk_size: env::var("RECONCILE_CHUNK_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.chunk_size),
            concurrency: env::var("RECONCILE_CONCURRENCY")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.concurrency),
        };
        debug!("Engine config from env: {:?}", config);
        config
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.match_threshold) {
            return Err(ReconcileError::Config(format!(
                "match threshold {} is outside [0, 1]",
                self.match_threshold
            )));
        }
        if self.coordinate_precision > MAX_COORDINATE_PRECISION {
            return Err(ReconcileError::Config(format!(
                "coordinate precision {} exceeds {}",
                self.coordinate_precision, MAX_COORDINATE_PRECISION
            )));
        }
        if self.replicate_year_window < 0 {
            return Err(ReconcileError::Config(format!(
                "replicate year window {} is negative",
                self.replicate_year_window
            )));
        }
        if self.source_priority.iter().all(|s| s.trim().is_empty()) {
            return Err(ReconcileError::Config(
                "source priority table is empty".to_string(),
            ));
        }
        if self.chunk_size == 0 || self.concurrency == 0 {
            return Err(ReconcileError::Config(
                "chunk size and concurrency must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn matcher(&self) -> SimilarityMatcher {
        SimilarityMatcher::new(self.match_threshold, self.similarity_metric)
    }

    pub fn source_priority(&self) -> SourcePriority {
        SourcePriority::new(&self.source_priority)
    }

    pub fn cluster_ranking(&self) -> ClusterRanking {
        ClusterRanking::new(&self.cluster_ranking)
    }

    /// Log the current configuration
    pub fn log_config(&self) {
        info!("⚙️  Reconciliation configuration:");
        info!(
            "   Similarity: {} (threshold {:.2})",
            self.similarity_metric, self.match_threshold
        );
        info!(
            "   Coordinate grid: {} decimal places, replicate window ±{} year(s)",
            self.coordinate_precision, self.replicate_year_window
        );
        info!("   Metadata priority: {}", self.source_priority.join(" > "));
        info!("   Cluster preference: {}", self.cluster_ranking.join(" > "));
        info!(
            "   Workers: {} concurrent, {} groups per chunk",
            self.concurrency, self.chunk_size
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.match_threshold, 0.9);
        assert_eq!(config.coordinate_precision, 3);
        assert_eq!(config.replicate_year_window, 1);
        assert_eq!(config.source_priority[0], "site_data");
        assert_eq!(config.cluster_ranking, vec!["updated_chemical_data", "chemical_data"]);
        assert!(config.concurrency >= 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_config() {
        env::set_var("MATCH_THRESHOLD", "0.85");
        env::set_var("COORDINATE_PRECISION", "4");
        env::set_var("SOURCE_PRIORITY", "fish_data, site_data,,");
        env::set_var("SIMILARITY_METRIC", "jaro_winkler");
        env::set_var("RECONCILE_CONCURRENCY", "2");

        let config = EngineConfig::from_env();
        assert_eq!(config.match_threshold, 0.85);
        assert_eq!(config.coordinate_precision, 4);
        assert_eq!(config.source_priority, vec!["fish_data", "site_data"]);
        assert_eq!(config.similarity_metric, SimilarityMetric::JaroWinkler);
        assert_eq!(config.concurrency, 2);

        env::remove_var("MATCH_THRESHOLD");
        env::remove_var("COORDINATE_PRECISION");
        env::remove_var("SOURCE_PRIORITY");
        env::remove_var("SIMILARITY_METRIC");
        env::remove_var("RECONCILE_CONCURRENCY");
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = EngineConfig::default();
        config.match_threshold = 1.5;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.coordinate_precision = 12;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.chunk_size = 0;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.source_priority.clear();
        assert!(matches!(config.validate(), Err(ReconcileError::Config(_))));
    }
}

// src/utils/progress_bars/logging.rs - Logging helpers for reconciliation stages
use log::{info, warn};
use std::time::Instant;

use crate::models::{DataDomain, DomainStats, ReconciliationSummary, SiteStats};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileStage {
    Sites,
    Geo,
    Domain(DataDomain),
}

#[derive(Clone)]
pub struct ReconcileLogger {
    stage_name: &'static str,
    stage_emoji: &'static str,
    start_time: Instant,
}

impl ReconcileLogger {
    pub fn new(stage: ReconcileStage) -> Self {
        let (stage_name, stage_emoji) = match stage {
            ReconcileStage::Sites => ("SITES", "🗂️"),
            ReconcileStage::Geo => ("GEO", "📍"),
            ReconcileStage::Domain(DataDomain::Chemical) => ("CHEMICAL", "🧪"),
            ReconcileStage::Domain(DataDomain::Fish) => ("FISH", "🐟"),
            ReconcileStage::Domain(DataDomain::Habitat) => ("HABITAT", "🌿"),
        };
        Self {
            stage_name,
            stage_emoji,
            start_time: Instant::now(),
        }
    }

    pub fn log_start(&self, run_id: &str, records: usize) {
        info!(
            "[{}] {} 🚀 Starting {} reconciliation of {} records (run ID: {})",
            self.stage_name,
            self.stage_emoji,
            self.stage_name.to_lowercase(),
            records,
            run_id
        );
    }

    pub fn log_phase(&self, phase: &str, details: Option<&str>) {
        let elapsed = self.start_time.elapsed();
        let msg = if let Some(details) = details {
            format!(
                "[{}] {} 🔄 Phase: {} - {} [+{:.1}s]",
                self.stage_name, self.stage_emoji, phase, details, elapsed.as_secs_f32()
            )
        } else {
            format!(
                "[{}] {} 🔄 Phase: {} [+{:.1}s]",
                self.stage_name, self.stage_emoji, phase, elapsed.as_secs_f32()
            )
        };
        info!("{}", msg);
    }

    pub fn log_grouping(&self, records: usize, groups: usize, multi_record_groups: usize) {
        info!(
            "[{}] {} ✅ Grouping complete: {} records → {} groups → {} groups with 2+ records",
            self.stage_name, self.stage_emoji, records, groups, multi_record_groups
        );
    }

    pub fn log_chunk_progress(&self, chunk_num: usize, total_chunks: usize, groups_in_chunk: usize) {
        if chunk_num % 5 == 0 || chunk_num == 1 || chunk_num == total_chunks {
            info!(
                "[{}] {} 📦 Processing chunk {}/{} ({} groups)",
                self.stage_name, self.stage_emoji, chunk_num, total_chunks, groups_in_chunk
            );
        }
    }

    pub fn log_site_completion(&self, stats: &SiteStats) {
        info!(
            "[{}] {} 🎉 COMPLETED in {:.2?}: {} rows from {} tables → {} merged sites → {} final sites",
            self.stage_name,
            self.stage_emoji,
            self.start_time.elapsed(),
            stats.source_rows,
            stats.source_tables,
            stats.merged_sites,
            stats.final_sites
        );
        info!(
            "[{}] {} 📊 {} conflicts logged, {} coordinate clusters, {} sites absorbed, {} without coordinates",
            self.stage_name,
            self.stage_emoji,
            stats.conflicts_logged,
            stats.coordinate_clusters,
            stats.sites_absorbed,
            stats.uncategorized_sites
        );
    }

    pub fn log_domain_completion(&self, stats: &DomainStats) {
        info!(
            "[{}] {} 🎉 COMPLETED in {:.2?}: {} records in → {} records out ({} superseded)",
            self.stage_name,
            self.stage_emoji,
            self.start_time.elapsed(),
            stats.records_in,
            stats.records_out,
            stats.records_superseded
        );
        info!(
            "[{}] {} 📊 Groups: {} seen, {} singleton, {} duplicate, {} replicate, {} partial replicate",
            self.stage_name,
            self.stage_emoji,
            stats.groups_seen,
            stats.singleton_groups,
            stats.duplicate_groups,
            stats.replicate_groups,
            stats.partial_replicate_groups
        );
        if stats.date_corrections > 0 {
            info!(
                "[{}] {} 📅 {} collection dates corrected",
                self.stage_name, self.stage_emoji, stats.date_corrections
            );
        }
        self.log_data_quality_issue("unresolved groups", stats.unresolved_groups);
        self.log_data_quality_issue("unmatched site references", stats.unmatched_sites);
        self.log_data_quality_issue("invalid values excluded", stats.invalid_values_excluded);
        self.log_data_quality_issue("records rejected", stats.records_rejected);
    }

    pub fn log_warning(&self, message: &str) {
        warn!("[{}] {} ⚠️  {}", self.stage_name, self.stage_emoji, message);
    }

    pub fn log_data_quality_issue(&self, issue_type: &str, count: usize) {
        if count > 0 {
            warn!(
                "[{}] {} ⚠️  Data quality: {} {}",
                self.stage_name, self.stage_emoji, count, issue_type
            );
        }
    }

    pub fn get_stage_name(&self) -> &'static str {
        self.stage_name
    }
}

// Pipeline-level logging functions
pub fn log_pipeline_start(run_id: &str, site_tables: usize, observation_counts: [usize; 3], concurrency: usize) {
    info!("🚀 ===== SITE RECONCILIATION PIPELINE STARTING =====");
    info!("📅 Pipeline Run ID: {}", run_id);
    info!("⚙️  Inputs:");
    info!("   • {} site tables", site_tables);
    info!(
        "   • Observations: {} chemical, {} fish, {} habitat",
        observation_counts[0], observation_counts[1], observation_counts[2]
    );
    info!("   • Concurrency limit: {} simultaneous tasks", concurrency);
    info!("🎯 Stages: Sites 🗂️, Geo 📍, Chemical 🧪, Fish 🐟, Habitat 🌿");
    info!("===================================================");
}

pub fn log_pipeline_completion(summary: &ReconciliationSummary) {
    info!("🎉 ===== SITE RECONCILIATION PIPELINE COMPLETED =====");
    info!("📅 Pipeline Run ID: {}", summary.run_id);
    info!("⏱️  Total Duration: {:.2}s", summary.duration_secs);
    info!("🗂️  Final sites: {}", summary.sites.final_sites);
    info!("");
    info!("📈 Domain Breakdown:");
    for (domain, stats) in &summary.domains {
        info!(
            "   {} {}: {} → {} records ({} duplicate groups, {} replicate groups)",
            domain.emoji(),
            domain,
            stats.records_in,
            stats.records_out,
            stats.duplicate_groups,
            stats.replicate_groups + stats.partial_replicate_groups
        );
    }
    let total_issues = summary.total_issues();
    if total_issues > 0 {
        warn!("⚠️  {} issues recorded:", total_issues);
        for (kind, count) in &summary.issue_counts {
            warn!("   • {}: {}", kind, count);
        }
    } else {
        info!("✨ No issues recorded");
    }
    info!("===================================================");
}

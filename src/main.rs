use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use reconcile_lib::consolidation::{analyze_clusters, resolve};
use reconcile_lib::run_reconciliation;
use reconcile_lib::utils::config::EngineConfig;
use reconcile_lib::utils::env::load_env;
use reconcile_lib::utils::get_memory_usage;
use reconcile_lib::utils::progress_bars::progress_config::ProgressConfig;
use reconcile_lib::ReconciliationInput;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct ReconcileArgs {
    /// JSON bundle with site tables, observation tables and the fish date reference
    #[arg(long)]
    input: PathBuf,

    /// Directory the result files are written to
    #[arg(long, default_value = "reconciled")]
    output: PathBuf,

    /// Coordinate grid precision in decimal places
    #[arg(long)]
    precision: Option<u32>,

    /// Minimum similarity for fuzzy site matches
    #[arg(long)]
    threshold: Option<f64>,

    /// Only report coordinate clusters, write nothing
    #[arg(long)]
    dry_run: bool,
}

fn write_json<T: Serialize>(dir: &Path, name: &str, value: &T) -> Result<()> {
    let path = dir.join(name);
    let body = serde_json::to_string_pretty(value)
        .with_context(|| format!("Failed to serialize {}", name))?;
    fs::write(&path, body).with_context(|| format!("Failed to write {}", path.display()))?;
    info!("💾 Wrote {}", path.display());
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    load_env();
    let args = ReconcileArgs::parse();
    info!("Starting site and event reconciliation");

    let mut config = EngineConfig::from_env();
    if let Some(precision) = args.precision {
        config.coordinate_precision = precision;
    }
    if let Some(threshold) = args.threshold {
        config.match_threshold = threshold;
    }
    config.validate().context("Invalid reconciliation configuration")?;

    let progress_config = ProgressConfig::from_env();
    info!(
        "Progress tracking: enabled={}, detailed={}",
        progress_config.enabled, progress_config.detailed
    );

    let raw = fs::read_to_string(&args.input)
        .with_context(|| format!("Failed to read input bundle {}", args.input.display()))?;
    let input: ReconciliationInput = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse input bundle {}", args.input.display()))?;
    if let Some(priority) = &input.source_priority {
        config.source_priority = priority.clone();
    }
    if let Some(ranking) = &input.cluster_ranking {
        config.cluster_ranking = ranking.clone();
    }

    if args.dry_run {
        info!("🔍 Dry run: analysing coordinate clusters only");
        let merge = resolve(&input.site_sources, &config.source_priority())
            .context("Failed to merge site tables")?;
        let clusters = analyze_clusters(
            &merge.sites,
            config.coordinate_precision,
            &config.cluster_ranking(),
        );
        for cluster in &clusters {
            info!(
                "📍 ({:.6}, {:.6}) keep '{}' absorb {:?} [{:?}]",
                cluster.latitude, cluster.longitude, cluster.preferred, cluster.absorbed, cluster.reason
            );
        }
        info!(
            "Dry run complete: {} merged sites, {} coordinate clusters",
            merge.sites.len(),
            clusters.len()
        );
        return Ok(());
    }

    let multi_progress = progress_config.create_multi_progress();
    let main_pb = progress_config.run_spinner(
        multi_progress.as_ref(),
        "Reconciling sites and observations...",
    );

    let start = Instant::now();
    let output = run_reconciliation(input, &config, progress_config.stage_progress(multi_progress.as_ref()))
        .await
        .context("Reconciliation run failed")?;

    if let Some(pb) = &main_pb {
        if progress_config.should_show_memory() {
            let memory_mb = get_memory_usage().await;
            pb.finish_with_message(format!("Reconciliation complete (Memory: {} MB)", memory_mb));
        } else {
            pb.finish_with_message("Reconciliation complete");
        }
    }

    fs::create_dir_all(&args.output)
        .with_context(|| format!("Failed to create output directory {}", args.output.display()))?;
    write_json(&args.output, "sites.json", &output.sites)?;
    write_json(&args.output, "absorption_map.json", &output.absorption_map)?;
    write_json(&args.output, "clusters.json", &output.clusters)?;
    write_json(&args.output, "conflicts.json", &output.conflicts)?;
    write_json(&args.output, "chemical.json", &output.chemical)?;
    write_json(&args.output, "fish.json", &output.fish)?;
    write_json(&args.output, "habitat.json", &output.habitat)?;
    write_json(&args.output, "issues.json", &output.issues)?;
    write_json(&args.output, "summary.json", &output.summary)?;

    if output.summary.total_issues() > 0 {
        warn!(
            "⚠️ Run {} finished with {} issues; see issues.json",
            output.run_id,
            output.summary.total_issues()
        );
    }
    info!(
        "✅ Run {} written to {} in {:.2?}",
        output.run_id,
        args.output.display(),
        start.elapsed()
    );
    Ok(())
}

// src/pipeline.rs
//! One reconciliation run: the priority merge of the site tables, the
//! coordinate merge, then the three observation domains reconciled
//! concurrently against the final catalog.

use chrono::Utc;
use futures::future::join_all;
use indicatif::MultiProgress;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use uuid::Uuid;

use crate::consolidation::{detect_and_merge, resolve, CoordinateCluster};
use crate::error::{ReconcileError, ReconcileIssue, Result};
use crate::identity::{has_identity, normalize};
use crate::matching::{NameIndex, SimilarityMatcher};
use crate::models::{
    AbsorptionMap, ConflictRecord, DataDomain, DateReferenceEntry, DomainStats, ObservationRecord,
    ReconciledObservation, ReconciliationSummary, SiteRecord, SiteStats, SourceTable,
};
use crate::reconciliation::{
    group_records, reconcile_one, tally, ChemicalReconciler, DateReferenceIndex, DomainReconciler,
    FishReconciler, GroupOutcome, HabitatReconciler,
};
use crate::utils::config::EngineConfig;
use crate::utils::progress_bars::logging::{
    log_pipeline_completion, log_pipeline_start, ReconcileLogger, ReconcileStage,
};
use crate::utils::progress_bars::progress_config::stage_bar;
use crate::utils::signature::site_signature;

/// Everything one run reads. Ranking tables given here override the
/// configured ones.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReconciliationInput {
    #[serde(default)]
    pub site_sources: Vec<SourceTable>,
    #[serde(default)]
    pub source_priority: Option<Vec<String>>,
    #[serde(default)]
    pub cluster_ranking: Option<Vec<String>>,
    #[serde(default)]
    pub chemical: Vec<ObservationRecord>,
    #[serde(default)]
    pub fish: Vec<ObservationRecord>,
    #[serde(default)]
    pub habitat: Vec<ObservationRecord>,
    #[serde(default)]
    pub fish_date_reference: Option<Vec<DateReferenceEntry>>,
}

/// Final catalog row with its content signature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    #[serde(flatten)]
    pub site: SiteRecord,
    pub signature: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationOutput {
    pub run_id: String,
    pub sites: Vec<CatalogEntry>,
    pub absorption_map: AbsorptionMap,
    pub clusters: Vec<CoordinateCluster>,
    pub conflicts: Vec<ConflictRecord>,
    pub chemical: Vec<ReconciledObservation>,
    pub fish: Vec<ReconciledObservation>,
    pub habitat: Vec<ReconciledObservation>,
    pub issues: Vec<ReconcileIssue>,
    pub summary: ReconciliationSummary,
}

#[derive(Debug, Clone, Default)]
pub struct SiteConsolidation {
    pub sites: Vec<SiteRecord>,
    pub absorption_map: AbsorptionMap,
    pub clusters: Vec<CoordinateCluster>,
    pub conflicts: Vec<ConflictRecord>,
    pub issues: Vec<ReconcileIssue>,
    pub stats: SiteStats,
}

/// Priority merge followed by the coordinate merge.
pub fn consolidate_sites(
    tables: &[SourceTable],
    config: &EngineConfig,
    run_id: &str,
) -> Result<SiteConsolidation> {
    let logger = ReconcileLogger::new(ReconcileStage::Sites);
    logger.log_start(run_id, tables.iter().map(|t| t.rows.len()).sum());
    logger.log_phase(
        "Priority merge",
        Some(&format!("{} source tables", tables.len())),
    );
    let merge = resolve(tables, &config.source_priority())?;
    let merged_sites = merge.sites.len();

    let geo_logger = ReconcileLogger::new(ReconcileStage::Geo);
    geo_logger.log_phase(
        "Coordinate clustering",
        Some(&format!("{} decimal places", config.coordinate_precision)),
    );
    let geo = detect_and_merge(
        merge.sites,
        config.coordinate_precision,
        &config.cluster_ranking(),
    );
    if geo.uncategorized > 0 {
        geo_logger.log_warning(&format!(
            "{} sites lack coordinates and were not clustered",
            geo.uncategorized
        ));
    }

    let stats = SiteStats {
        source_tables: tables.len(),
        source_rows: merge.source_rows,
        missing_identity_rows: merge.missing_identity_rows,
        merged_sites,
        conflicts_logged: merge.conflicts.len(),
        coordinate_clusters: geo.clusters.len(),
        sites_absorbed: geo.absorption_map.len(),
        uncategorized_sites: geo.uncategorized,
        final_sites: geo.final_sites.len(),
    };
    logger.log_site_completion(&stats);

    Ok(SiteConsolidation {
        sites: geo.final_sites,
        absorption_map: geo.absorption_map,
        clusters: geo.clusters,
        conflicts: merge.conflicts,
        issues: merge.issues,
        stats,
    })
}

enum SiteReference {
    Matched {
        name: String,
        issue: Option<ReconcileIssue>,
    },
    Unmatched(String),
    Missing,
}

/// Maps observation site references onto the final catalog: absorbed names
/// first, then exact lookup, then a fuzzy scan of the sites the domain's own
/// sources mention before the whole catalog.
struct SiteResolver {
    catalog: NameIndex,
    by_domain: HashMap<DataDomain, NameIndex>,
    absorption_map: AbsorptionMap,
    matcher: SimilarityMatcher,
}

impl SiteResolver {
    fn new(sites: &[SiteRecord], absorption_map: AbsorptionMap, matcher: SimilarityMatcher) -> Self {
        let catalog = NameIndex::new(sites.iter().map(|s| s.canonical_name.as_str()));
        let by_domain = DataDomain::ALL
            .iter()
            .map(|&domain| {
                let names: HashSet<&str> = sites
                    .iter()
                    .filter(|s| {
                        s.contributing_sources
                            .iter()
                            .any(|src| src.to_lowercase().contains(domain.as_str()))
                    })
                    .map(|s| s.canonical_name.as_str())
                    .collect();
                (domain, catalog.subset(|name| names.contains(name)))
            })
            .collect();
        Self {
            catalog,
            by_domain,
            absorption_map,
            matcher,
        }
    }

    fn lookup(&self, domain: DataDomain, normalized: &str) -> SiteReference {
        if !has_identity(normalized) {
            return SiteReference::Missing;
        }
        let name = self.absorption_map.resolve(normalized);
        if self.catalog.contains(name) {
            return SiteReference::Matched {
                name: name.to_string(),
                issue: None,
            };
        }
        let found = self
            .by_domain
            .get(&domain)
            .filter(|subset| !subset.is_empty())
            .and_then(|subset| self.matcher.find_match(name, subset))
            .or_else(|| self.matcher.find_match(name, &self.catalog));
        match found {
            Some(m) => SiteReference::Matched {
                issue: m.ambiguity_issue(name),
                name: m.name,
            },
            None => SiteReference::Unmatched(name.to_string()),
        }
    }

    /// Rewrites each record's site reference; records without one are dropped.
    fn attach(
        &self,
        domain: DataDomain,
        records: Vec<ObservationRecord>,
    ) -> (Vec<ObservationRecord>, Vec<ReconcileIssue>, DomainStats) {
        let mut stats = DomainStats {
            records_in: records.len(),
            ..Default::default()
        };
        let mut issues = Vec::new();
        let mut kept = Vec::with_capacity(records.len());

        for mut record in records {
            let normalized = normalize(&record.site_name);
            match self.lookup(domain, &normalized) {
                SiteReference::Missing => {
                    stats.records_rejected += 1;
                    issues.push(ReconcileIssue::MissingIdentity {
                        table: domain.to_string(),
                        record: format!("record {}", record.record_id),
                    });
                    continue;
                }
                SiteReference::Unmatched(name) => {
                    stats.unmatched_sites += 1;
                    issues.push(ReconcileIssue::UnmatchedSite {
                        domain: domain.to_string(),
                        record_id: record.record_id,
                        site_name: name.clone(),
                    });
                    record.site_name = name;
                }
                SiteReference::Matched { name, issue } => {
                    issues.extend(issue);
                    if name != normalized {
                        stats.site_references_rewritten += 1;
                    }
                    record.site_name = name;
                }
            }
            kept.push(record);
        }
        (kept, issues, stats)
    }
}

struct DomainRun {
    domain: DataDomain,
    records: Vec<ReconciledObservation>,
    issues: Vec<ReconcileIssue>,
    stats: DomainStats,
}

#[derive(Clone)]
struct DomainContext {
    sites: Arc<SiteResolver>,
    semaphore: Arc<Semaphore>,
    chunk_size: usize,
    run_id: String,
    multi: Option<MultiProgress>,
}

async fn reconcile_domain(
    reconciler: Arc<dyn DomainReconciler>,
    records: Vec<ObservationRecord>,
    ctx: DomainContext,
) -> Result<DomainRun> {
    let domain = reconciler.domain();
    let logger = ReconcileLogger::new(ReconcileStage::Domain(domain));
    logger.log_start(&ctx.run_id, records.len());

    let (records, mut issues, mut stats) = ctx.sites.attach(domain, records);
    let prepared = reconciler.prepare(records);
    stats.date_corrections = prepared.corrections;
    issues.extend(prepared.issues);

    let record_count = prepared.records.len();
    let mut groups = group_records(reconciler.as_ref(), prepared.records);
    let multi_record_groups = groups.iter().filter(|(_, members)| members.len() > 1).count();
    logger.log_grouping(record_count, groups.len(), multi_record_groups);

    let bar = stage_bar(
        ctx.multi.as_ref(),
        domain.emoji(),
        groups.len() as u64,
        &format!("{} groups", domain),
    );

    let chunk_size = ctx.chunk_size.max(1);
    let total_chunks = groups.len().div_ceil(chunk_size);
    let mut chunks = Vec::with_capacity(total_chunks);
    while !groups.is_empty() {
        let rest = groups.split_off(chunk_size.min(groups.len()));
        chunks.push(std::mem::replace(&mut groups, rest));
    }

    let tasks = chunks.into_iter().enumerate().map(|(idx, chunk)| {
        let reconciler = Arc::clone(&reconciler);
        let semaphore = Arc::clone(&ctx.semaphore);
        let logger = logger.clone();
        let bar = bar.clone();
        tokio::spawn(async move {
            let _permit = semaphore
                .acquire_owned()
                .await
                .map_err(|e| ReconcileError::TaskFailed(e.to_string()))?;
            logger.log_chunk_progress(idx + 1, total_chunks, chunk.len());
            let size = chunk.len() as u64;
            let outcomes = tokio::task::spawn_blocking(move || {
                chunk
                    .into_iter()
                    .map(|(key, members)| reconcile_one(reconciler.as_ref(), key, members))
                    .collect::<Vec<GroupOutcome>>()
            })
            .await
            .map_err(|e| ReconcileError::TaskFailed(e.to_string()))?;
            bar.inc(size);
            Ok::<_, ReconcileError>(outcomes)
        })
    });

    // Chunks come back in submission order, so output order stays fixed.
    let mut outcomes: Vec<GroupOutcome> = Vec::new();
    for joined in join_all(tasks).await {
        let chunk = joined.map_err(|e| ReconcileError::TaskFailed(e.to_string()))??;
        outcomes.extend(chunk);
    }
    bar.finish_and_clear();

    stats.absorb(&tally(&outcomes));
    let mut reconciled = Vec::with_capacity(stats.records_out);
    for outcome in outcomes {
        issues.extend(outcome.issues);
        reconciled.extend(outcome.records);
    }
    logger.log_domain_completion(&stats);

    Ok(DomainRun {
        domain,
        records: reconciled,
        issues,
        stats,
    })
}

/// Runs the whole engine over one input bundle. Only missing site tables, an
/// invalid configuration or a crashed worker abort the run; every other
/// problem is reported in `issues` and the summary.
pub async fn run_reconciliation(
    input: ReconciliationInput,
    config: &EngineConfig,
    multi: Option<MultiProgress>,
) -> Result<ReconciliationOutput> {
    let mut config = config.clone();
    if let Some(priority) = &input.source_priority {
        config.source_priority = priority.clone();
    }
    if let Some(ranking) = &input.cluster_ranking {
        config.cluster_ranking = ranking.clone();
    }
    config.validate()?;

    let run_id = Uuid::new_v4().to_string();
    let started_at = Utc::now().naive_utc();
    let start = Instant::now();
    log_pipeline_start(
        &run_id,
        input.site_sources.len(),
        [input.chemical.len(), input.fish.len(), input.habitat.len()],
        config.concurrency,
    );
    config.log_config();

    let sites = consolidate_sites(&input.site_sources, &config, &run_id)?;

    let date_reference = input.fish_date_reference.as_deref().map(|entries| {
        let index = DateReferenceIndex::new(entries);
        info!(
            "📅 Fish date reference: {} sites, {} entries ({} secondary)",
            index.site_count(),
            entries.len(),
            index.secondary_entries()
        );
        Arc::new(index)
    });

    let ctx = DomainContext {
        sites: Arc::new(SiteResolver::new(
            &sites.sites,
            sites.absorption_map.clone(),
            config.matcher(),
        )),
        semaphore: Arc::new(Semaphore::new(config.concurrency)),
        chunk_size: config.chunk_size,
        run_id: run_id.clone(),
        multi,
    };

    let chemical_reconciler: Arc<dyn DomainReconciler> = Arc::new(ChemicalReconciler::default());
    let fish_reconciler: Arc<dyn DomainReconciler> = Arc::new(FishReconciler::new(
        date_reference,
        config.matcher(),
        config.replicate_year_window,
    ));
    let habitat_reconciler: Arc<dyn DomainReconciler> = Arc::new(HabitatReconciler::default());
    let jobs = vec![
        (chemical_reconciler, input.chemical),
        (fish_reconciler, input.fish),
        (habitat_reconciler, input.habitat),
    ];
    let tasks = jobs
        .into_iter()
        .map(|(reconciler, records)| tokio::spawn(reconcile_domain(reconciler, records, ctx.clone())));

    let mut issues = sites.issues.clone();
    let mut domains = BTreeMap::new();
    let mut chemical = Vec::new();
    let mut fish = Vec::new();
    let mut habitat = Vec::new();
    for joined in join_all(tasks).await {
        let run = joined.map_err(|e| ReconcileError::TaskFailed(e.to_string()))??;
        debug!("{} domain finished with {} issues", run.domain, run.issues.len());
        issues.extend(run.issues);
        domains.insert(run.domain, run.stats);
        match run.domain {
            DataDomain::Chemical => chemical = run.records,
            DataDomain::Fish => fish = run.records,
            DataDomain::Habitat => habitat = run.records,
        }
    }

    let mut issue_counts: BTreeMap<String, usize> = BTreeMap::new();
    for issue in &issues {
        *issue_counts.entry(issue.kind().to_string()).or_insert(0) += 1;
    }
    let summary = ReconciliationSummary {
        run_id: run_id.clone(),
        started_at,
        duration_secs: start.elapsed().as_secs_f64(),
        sites: sites.stats,
        domains,
        issue_counts,
    };
    log_pipeline_completion(&summary);

    Ok(ReconciliationOutput {
        run_id,
        sites: sites
            .sites
            .into_iter()
            .map(|site| CatalogEntry {
                signature: site_signature(&site),
                site,
            })
            .collect(),
        absorption_map: sites.absorption_map,
        clusters: sites.clusters,
        conflicts: sites.conflicts,
        chemical,
        fish,
        habitat,
        issues,
        summary,
    })
}

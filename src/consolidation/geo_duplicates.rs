// src/consolidation/geo_duplicates.rs
//! Finds distinct site identities sitting on the same coordinate grid cell and
//! folds each such cluster into one preferred site.

use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::models::{AbsorptionMap, SiteRecord, TrackedField};
use crate::utils::constants::DEFAULT_CLUSTER_RANKING;

/// Geographic preference of sources, highest first. Independent of the
/// metadata priority.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterRanking {
    ranked: Vec<String>,
}

impl Default for ClusterRanking {
    fn default() -> Self {
        Self::new(DEFAULT_CLUSTER_RANKING.iter().copied())
    }
}

impl ClusterRanking {
    pub fn new<I, S>(sources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut ranked: Vec<String> = Vec::new();
        for source in sources {
            let source = source.as_ref().trim();
            if !source.is_empty() && !ranked.iter().any(|s| s == source) {
                ranked.push(source.to_string());
            }
        }
        Self { ranked }
    }

    /// Best rank among the sources that mention the site, with that source.
    pub fn rank_of<'a>(&'a self, site: &SiteRecord) -> (u32, Option<&'a str>) {
        let mut best: (u32, Option<&str>) = (0, None);
        for source in &site.contributing_sources {
            if let Some(pos) = self.ranked.iter().position(|s| s == source) {
                let rank = (self.ranked.len() - pos) as u32;
                if rank > best.0 {
                    best = (rank, Some(self.ranked[pos].as_str()));
                }
            }
        }
        best
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum PreferenceReason {
    SourceRank { source: String },
    LongestName,
    InputOrder,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinateCluster {
    pub latitude: f64,
    pub longitude: f64,
    pub preferred: String,
    pub absorbed: Vec<String>,
    pub reason: PreferenceReason,
}

#[derive(Debug, Clone, Default)]
pub struct GeoMergeResult {
    pub final_sites: Vec<SiteRecord>,
    pub absorption_map: AbsorptionMap,
    pub clusters: Vec<CoordinateCluster>,
    /// Sites without a full coordinate pair, passed through as-is
    pub uncategorized: usize,
}

type GridKey = (i64, i64);

fn grid_key(latitude: f64, longitude: f64, precision: u32) -> GridKey {
    let scale = 10f64.powi(precision as i32);
    // f64::round goes half away from zero
    ((latitude * scale).round() as i64, (longitude * scale).round() as i64)
}

struct ClusterPlan {
    key: GridKey,
    preferred: usize,
    absorbed: Vec<usize>,
    reason: PreferenceReason,
}

fn name_length(site: &SiteRecord) -> usize {
    site.raw_name.trim().chars().count()
}

fn choose_preferred(
    sites: &[SiteRecord],
    members: &[usize],
    ranking: &ClusterRanking,
) -> (usize, PreferenceReason) {
    let ranks: Vec<(u32, Option<&str>)> = members.iter().map(|&i| ranking.rank_of(&sites[i])).collect();
    let top_rank = ranks.iter().map(|r| r.0).max().unwrap_or(0);
    let top: Vec<usize> = members
        .iter()
        .zip(&ranks)
        .filter(|(_, r)| r.0 == top_rank)
        .map(|(&i, _)| i)
        .collect();

    if top.len() == 1 {
        let source = ranks
            .iter()
            .find(|r| r.0 == top_rank)
            .and_then(|r| r.1)
            .unwrap_or_default()
            .to_string();
        return (top[0], PreferenceReason::SourceRank { source });
    }

    let longest = top.iter().map(|&i| name_length(&sites[i])).max().unwrap_or(0);
    let longest_members: Vec<usize> = top
        .into_iter()
        .filter(|&i| name_length(&sites[i]) == longest)
        .collect();
    let chosen = longest_members[0];
    if longest_members.len() == 1 {
        (chosen, PreferenceReason::LongestName)
    } else {
        (chosen, PreferenceReason::InputOrder)
    }
}

fn plan_clusters(sites: &[SiteRecord], precision: u32, ranking: &ClusterRanking) -> (Vec<ClusterPlan>, usize) {
    let mut order: Vec<GridKey> = Vec::new();
    let mut cells: HashMap<GridKey, Vec<usize>> = HashMap::new();
    let mut uncategorized = 0;

    for (idx, site) in sites.iter().enumerate() {
        let Some((lat, lon)) = site.coordinates() else {
            uncategorized += 1;
            continue;
        };
        let key = grid_key(lat, lon, precision);
        cells
            .entry(key)
            .or_insert_with(|| {
                order.push(key);
                Vec::new()
            })
            .push(idx);
    }

    let mut plans = Vec::new();
    for key in order {
        let Some(members) = cells.get(&key) else { continue };
        if members.len() < 2 {
            continue;
        }
        let (preferred, reason) = choose_preferred(sites, members, ranking);
        let absorbed = members.iter().copied().filter(|&i| i != preferred).collect();
        plans.push(ClusterPlan {
            key,
            preferred,
            absorbed,
            reason,
        });
    }
    (plans, uncategorized)
}

fn describe(sites: &[SiteRecord], plan: &ClusterPlan, precision: u32) -> CoordinateCluster {
    let scale = 10f64.powi(precision as i32);
    CoordinateCluster {
        latitude: plan.key.0 as f64 / scale,
        longitude: plan.key.1 as f64 / scale,
        preferred: sites[plan.preferred].canonical_name.clone(),
        absorbed: plan
            .absorbed
            .iter()
            .map(|&i| sites[i].canonical_name.clone())
            .collect(),
        reason: plan.reason.clone(),
    }
}

/// Reports the clusters a merge would act on without changing anything.
pub fn analyze_clusters(
    sites: &[SiteRecord],
    precision: u32,
    ranking: &ClusterRanking,
) -> Vec<CoordinateCluster> {
    let (plans, _) = plan_clusters(sites, precision, ranking);
    plans.iter().map(|p| describe(sites, p, precision)).collect()
}

/// Folds every coordinate cluster into its preferred site. The preferred site
/// keeps its own values and picks up fields it lacks from the absorbed ones.
pub fn detect_and_merge(
    sites: Vec<SiteRecord>,
    precision: u32,
    ranking: &ClusterRanking,
) -> GeoMergeResult {
    let (plans, uncategorized) = plan_clusters(&sites, precision, ranking);
    let clusters: Vec<CoordinateCluster> = plans.iter().map(|p| describe(&sites, p, precision)).collect();

    let mut absorption_map = AbsorptionMap::new();
    let mut dropped = vec![false; sites.len()];
    let mut merged = sites;

    for plan in &plans {
        let preferred_name = merged[plan.preferred].canonical_name.clone();
        for &idx in &plan.absorbed {
            dropped[idx] = true;
            let absorbed = merged[idx].clone();
            absorption_map.insert(&absorbed.canonical_name, &preferred_name);
            debug!(
                "Absorbing '{}' into '{}' ({:?})",
                absorbed.canonical_name, preferred_name, plan.reason
            );

            let preferred = &mut merged[plan.preferred];
            for field in TrackedField::ALL {
                if preferred.value(field).is_some() {
                    continue;
                }
                if let Some(value) = absorbed.value(field) {
                    let source = absorbed
                        .field_provenance
                        .get(&field)
                        .cloned()
                        .unwrap_or_else(|| absorbed.source_id.clone());
                    preferred.set_value(field, value, &source);
                }
            }
            for source in absorbed.contributing_sources {
                if !preferred.contributing_sources.contains(&source) {
                    preferred.contributing_sources.push(source);
                }
            }
        }
    }

    let final_sites: Vec<SiteRecord> = merged
        .into_iter()
        .zip(dropped)
        .filter(|(_, gone)| !gone)
        .map(|(site, _)| site)
        .collect();

    info!(
        "Geo merge: {} clusters, {} sites absorbed, {} without coordinates, {} final sites",
        clusters.len(),
        absorption_map.len(),
        uncategorized,
        final_sites.len()
    );

    GeoMergeResult {
        final_sites,
        absorption_map,
        clusters,
        uncategorized,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn site(name: &str, sources: &[&str], lat: Option<f64>, lon: Option<f64>) -> SiteRecord {
        let mut record = SiteRecord::new(name, sources[0], 1);
        record.contributing_sources = sources.iter().map(|s| s.to_string()).collect();
        record.latitude = lat;
        record.longitude = lon;
        record
    }

    #[test]
    fn test_rank_beats_name_length() {
        let sites = vec![
            site("Bird Creek at Highway 11 Bridge", &["site_data"], Some(36.4521), Some(-95.8812)),
            site("Bird Cr", &["chemical_data"], Some(36.4519), Some(-95.8814)),
            site("Bird Creek", &["updated_chemical_data"], Some(36.45214), Some(-95.88118)),
        ];
        let result = detect_and_merge(sites, 3, &ClusterRanking::default());

        assert_eq!(result.final_sites.len(), 1);
        assert_eq!(result.final_sites[0].canonical_name, "Bird Creek");
        assert_eq!(result.absorption_map.len(), 2);
        assert_eq!(result.absorption_map.get("Bird Cr"), Some("Bird Creek"));
        assert_eq!(
            result.clusters[0].reason,
            PreferenceReason::SourceRank {
                source: "updated_chemical_data".to_string()
            }
        );
    }

    #[test]
    fn test_longest_name_then_input_order() {
        let sites = vec![
            site("Coal Cr", &["fish_data"], Some(35.0), Some(-96.0)),
            site("Coal Creek East", &["macro_data"], Some(35.0001), Some(-96.0001)),
        ];
        let result = detect_and_merge(sites, 3, &ClusterRanking::default());
        assert_eq!(result.final_sites[0].canonical_name, "Coal Creek East");
        assert_eq!(result.clusters[0].reason, PreferenceReason::LongestName);

        let sites = vec![
            site("Site AAA", &["fish_data"], Some(35.0), Some(-96.0)),
            site("Site BBB", &["macro_data"], Some(35.0), Some(-96.0)),
        ];
        let result = detect_and_merge(sites, 3, &ClusterRanking::default());
        assert_eq!(result.final_sites[0].canonical_name, "Site AAA");
        assert_eq!(result.clusters[0].reason, PreferenceReason::InputOrder);
    }

    #[test]
    fn test_sites_without_coordinates_pass_through() {
        let sites = vec![
            site("No Coords", &["site_data"], None, None),
            site("Half Coords", &["site_data"], Some(35.0), None),
            site("Alone", &["site_data"], Some(34.0), Some(-97.0)),
        ];
        let result = detect_and_merge(sites.clone(), 3, &ClusterRanking::default());
        assert_eq!(result.final_sites, sites);
        assert_eq!(result.uncategorized, 2);
        assert!(result.absorption_map.is_empty());
        assert!(result.clusters.is_empty());
    }

    #[test]
    fn test_one_survivor_per_cluster_and_map_is_acyclic() {
        let sites = vec![
            site("A1", &["fish_data"], Some(35.1234), Some(-97.1)),
            site("B1", &["fish_data"], Some(36.0), Some(-97.0)),
            site("A2 longer", &["fish_data"], Some(35.1231), Some(-97.1)),
            site("B2", &["chemical_data"], Some(36.0004), Some(-97.0004)),
            site("C", &["fish_data"], Some(37.0), Some(-98.0)),
        ];
        let result = detect_and_merge(sites, 3, &ClusterRanking::default());
        let names: Vec<&str> = result
            .final_sites
            .iter()
            .map(|s| s.canonical_name.as_str())
            .collect();
        assert_eq!(names, vec!["A2 longer", "B2", "C"]);
        assert!(result.absorption_map.is_acyclic());
        for (absorbed, preferred) in result.absorption_map.iter() {
            assert!(!names.contains(&absorbed.as_str()));
            assert!(names.contains(&preferred.as_str()));
        }
    }

    #[test]
    fn test_preferred_site_inherits_missing_fields() {
        let mut absorbed = site("Coal Cr", &["site_data"], Some(35.0), Some(-96.0));
        absorbed.county = Some("Tulsa".to_string());
        absorbed
            .field_provenance
            .insert(TrackedField::County, "site_data".to_string());
        let preferred = site("Coal Creek", &["chemical_data"], Some(35.0), Some(-96.0));

        let result = detect_and_merge(vec![absorbed, preferred], 3, &ClusterRanking::default());
        let survivor = &result.final_sites[0];
        assert_eq!(survivor.canonical_name, "Coal Creek");
        assert_eq!(survivor.county.as_deref(), Some("Tulsa"));
        assert!(survivor.contributing_sources.contains(&"site_data".to_string()));
    }

    #[test]
    fn test_analyze_matches_merge_without_changes() {
        let sites = vec![
            site("X", &["fish_data"], Some(35.0), Some(-96.0)),
            site("XY", &["fish_data"], Some(35.0), Some(-96.0)),
        ];
        let clusters = analyze_clusters(&sites, 3, &ClusterRanking::default());
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].preferred, "XY");
        assert_eq!(clusters[0].absorbed, vec!["X".to_string()]);
        assert_eq!(clusters[0].latitude, 35.0);
    }

    #[test]
    fn test_grid_key_rounds_half_away_from_zero() {
        assert_eq!(grid_key(0.5, -0.5, 0), (1, -1));
        assert_eq!(grid_key(-1.25, 1.25, 1), (-13, 13));
    }
}

// src/reconciliation/date_reference.rs
use chrono::{Datelike, NaiveDate};
use log::{debug, warn};
use std::collections::{BTreeSet, HashMap};

use crate::identity::normalize;
use crate::matching::{NameIndex, NameMatch, SimilarityMatcher};
use crate::models::DateReferenceEntry;

/// Read-only index over the authoritative collection dates.
#[derive(Debug, Clone, Default)]
pub struct DateReferenceIndex {
    names: NameIndex,
    dates: HashMap<String, BTreeSet<NaiveDate>>,
    secondary_entries: usize,
}

fn is_secondary(event_type: Option<&str>) -> bool {
    matches!(
        event_type.map(|e| e.trim().to_lowercase()).as_deref(),
        Some("replicate") | Some("rep") | Some("secondary")
    )
}

impl DateReferenceIndex {
    pub fn new(entries: &[DateReferenceEntry]) -> Self {
        let mut ordered_names: Vec<String> = Vec::new();
        let mut dates: HashMap<String, BTreeSet<NaiveDate>> = HashMap::new();
        let mut secondary_entries = 0;

        for entry in entries {
            let site = normalize(&entry.site_name);
            if site.is_empty() {
                warn!("⚠️ Date reference entry on {} has no site name; skipped", entry.date);
                continue;
            }
            if is_secondary(entry.event_type.as_deref()) {
                secondary_entries += 1;
            }
            dates
                .entry(site.clone())
                .or_insert_with(|| {
                    ordered_names.push(site);
                    BTreeSet::new()
                })
                .insert(entry.date);
        }
        debug!(
            "Date reference: {} sites, {} entries ({} marked secondary)",
            ordered_names.len(),
            entries.len(),
            secondary_entries
        );

        Self {
            names: NameIndex::new(&ordered_names),
            dates,
            secondary_entries,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn site_count(&self) -> usize {
        self.names.len()
    }

    pub fn secondary_entries(&self) -> usize {
        self.secondary_entries
    }

    pub fn match_site(&self, matcher: &SimilarityMatcher, site_name: &str) -> Option<NameMatch> {
        matcher.find_match(site_name, &self.names)
    }

    /// Distinct dates for a reference site in one calendar year, ascending.
    pub fn dates_in_year(&self, reference_site: &str, year: i32) -> Vec<NaiveDate> {
        self.dates
            .get(reference_site)
            .map(|d| d.iter().copied().filter(|d| d.year() == year).collect())
            .unwrap_or_default()
    }

    /// Replicate evidence for a site: the first year of `year`, `year-1`,
    /// `year+1`, ... (out to `window`) holding at least two distinct dates.
    pub fn replicate_dates(
        &self,
        reference_site: &str,
        year: i32,
        window: i32,
    ) -> Option<(i32, Vec<NaiveDate>)> {
        let mut candidates = vec![year];
        for offset in 1..=window.max(0) {
            candidates.push(year - offset);
            candidates.push(year + offset);
        }
        candidates.into_iter().find_map(|y| {
            let dates = self.dates_in_year(reference_site, y);
            (dates.len() >= 2).then_some((y, dates))
        })
    }
}

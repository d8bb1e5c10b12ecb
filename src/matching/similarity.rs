// src/matching/similarity.rs
//! Name matching against a reference set of site names.
//!
//! Exact lookups go through a hash index built once per reference set. Only
//! when that misses does the matcher scan the (pre-filtered) candidates with a
//! case-insensitive similarity score and keep the best one at or above the
//! threshold. Ties at the best score keep the first candidate in index order.

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use strsim::{jaro_winkler, normalized_levenshtein};

use crate::error::ReconcileIssue;
use crate::identity::normalize;

pub const DEFAULT_MATCH_THRESHOLD: f64 = 0.9;

/// Scores that tie within this tolerance count as equal.
const SCORE_EPSILON: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimilarityMetric {
    /// 2 * matched characters / combined length, over recursive longest common blocks
    SequenceRatio,
    NormalizedLevenshtein,
    JaroWinkler,
}

impl Default for SimilarityMetric {
    fn default() -> Self {
        SimilarityMetric::SequenceRatio
    }
}

impl FromStr for SimilarityMetric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sequence" | "sequence_ratio" | "ratio" => Ok(SimilarityMetric::SequenceRatio),
            "levenshtein" | "normalized_levenshtein" => Ok(SimilarityMetric::NormalizedLevenshtein),
            "jaro_winkler" | "jarowinkler" | "jaro-winkler" => Ok(SimilarityMetric::JaroWinkler),
            other => Err(format!("unknown similarity metric '{}'", other)),
        }
    }
}

impl fmt::Display for SimilarityMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SimilarityMetric::SequenceRatio => "sequence",
            SimilarityMetric::NormalizedLevenshtein => "levenshtein",
            SimilarityMetric::JaroWinkler => "jaro_winkler",
        };
        f.write_str(name)
    }
}

/// Longest common block of `a[alo..ahi]` and `b[blo..bhi]` as `(i, j, size)`.
/// Among equally long blocks the one starting earliest in `a`, then in `b`, wins.
fn longest_match(
    a: &[char],
    b: &[char],
    alo: usize,
    ahi: usize,
    blo: usize,
    bhi: usize,
) -> (usize, usize, usize) {
    let (mut best_i, mut best_j, mut best_size) = (alo, blo, 0usize);
    let mut run_lengths: HashMap<usize, usize> = HashMap::new();
    for i in alo..ahi {
        let mut next_lengths: HashMap<usize, usize> = HashMap::new();
        for j in blo..bhi {
            if a[i] != b[j] {
                continue;
            }
            let k = if j > blo {
                run_lengths.get(&(j - 1)).copied().unwrap_or(0) + 1
            } else {
                1
            };
            next_lengths.insert(j, k);
            if k > best_size {
                best_i = i + 1 - k;
                best_j = j + 1 - k;
                best_size = k;
            }
        }
        run_lengths = next_lengths;
    }
    (best_i, best_j, best_size)
}

fn matched_characters(a: &[char], b: &[char]) -> usize {
    let mut total = 0;
    let mut pending = vec![(0, a.len(), 0, b.len())];
    while let Some((alo, ahi, blo, bhi)) = pending.pop() {
        let (i, j, k) = longest_match(a, b, alo, ahi, blo, bhi);
        if k == 0 {
            continue;
        }
        total += k;
        if alo < i && blo < j {
            pending.push((alo, i, blo, j));
        }
        if i + k < ahi && j + k < bhi {
            pending.push((i + k, ahi, j + k, bhi));
        }
    }
    total
}

fn ratio_of_chars(a: &[char], b: &[char]) -> f64 {
    let combined = a.len() + b.len();
    if combined == 0 {
        return 1.0;
    }
    2.0 * matched_characters(a, b) as f64 / combined as f64
}

/// Case-insensitive matching-subsequence ratio in [0, 1].
pub fn sequence_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.to_lowercase().chars().collect();
    let b: Vec<char> = b.to_lowercase().chars().collect();
    ratio_of_chars(&a, &b)
}

/// Stable-ordered reference names with an exact-match index.
#[derive(Debug, Clone, Default)]
pub struct NameIndex {
    names: Vec<String>,
    lowered: Vec<Vec<char>>,
    exact: HashMap<String, usize>,
}

impl NameIndex {
    /// Builds the index from names in the caller's order. Names are
    /// normalized; blanks and repeats are dropped.
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut index = NameIndex::default();
        for name in names {
            index.push(name.as_ref());
        }
        index
    }

    fn push(&mut self, name: &str) {
        let canonical = normalize(name);
        if canonical.is_empty() || self.exact.contains_key(&canonical) {
            return;
        }
        self.exact.insert(canonical.clone(), self.names.len());
        self.lowered.push(canonical.to_lowercase().chars().collect());
        self.names.push(canonical);
    }

    /// Narrower candidate set, keeping order.
    pub fn subset<F>(&self, keep: F) -> NameIndex
    where
        F: Fn(&str) -> bool,
    {
        NameIndex::new(self.names.iter().filter(|n| keep(n.as_str())))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.exact.contains_key(name)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NameMatch {
    pub name: String,
    pub score: f64,
    pub exact: bool,
    /// Other candidates that scored exactly as well as the chosen one
    pub tied_with: Vec<String>,
}

impl NameMatch {
    pub fn ambiguity_issue(&self, query: &str) -> Option<ReconcileIssue> {
        if self.tied_with.is_empty() {
            return None;
        }
        let mut candidates = vec![self.name.clone()];
        candidates.extend(self.tied_with.iter().cloned());
        Some(ReconcileIssue::AmbiguousMatch {
            name: query.to_string(),
            candidates,
            score: self.score,
            chosen: self.name.clone(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimilarityMatcher {
    pub threshold: f64,
    pub metric: SimilarityMetric,
}

impl Default for SimilarityMatcher {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_MATCH_THRESHOLD,
            metric: SimilarityMetric::default(),
        }
    }
}

impl SimilarityMatcher {
    pub fn new(threshold: f64, metric: SimilarityMetric) -> Self {
        Self { threshold, metric }
    }

    fn score(&self, query_lowered: &[char], query: &str, index: &NameIndex, pos: usize) -> f64 {
        match self.metric {
            SimilarityMetric::SequenceRatio => ratio_of_chars(query_lowered, &index.lowered[pos]),
            SimilarityMetric::NormalizedLevenshtein => normalized_levenshtein(
                &query.to_lowercase(),
                &index.names[pos].to_lowercase(),
            ),
            SimilarityMetric::JaroWinkler => {
                jaro_winkler(&query.to_lowercase(), &index.names[pos].to_lowercase())
            }
        }
    }

    /// Best match for `name` in `index`: exact first, then the highest
    /// similarity at or above the threshold.
    pub fn find_match(&self, name: &str, index: &NameIndex) -> Option<NameMatch> {
        let query = normalize(name);
        if query.is_empty() {
            return None;
        }
        if let Some(&pos) = index.exact.get(&query) {
            return Some(NameMatch {
                name: index.names[pos].clone(),
                score: 1.0,
                exact: true,
                tied_with: Vec::new(),
            });
        }

        let query_lowered: Vec<char> = query.to_lowercase().chars().collect();
        let mut best: Option<(usize, f64)> = None;
        let mut tied: Vec<usize> = Vec::new();
        for pos in 0..index.len() {
            let score = self.score(&query_lowered, &query, index, pos);
            match best {
                Some((_, best_score)) if (score - best_score).abs() <= SCORE_EPSILON => {
                    tied.push(pos);
                }
                Some((_, best_score)) if score <= best_score => {}
                _ => {
                    best = Some((pos, score));
                    tied.clear();
                }
            }
        }

        let (pos, score) = best?;
        if score + SCORE_EPSILON < self.threshold {
            debug!(
                "No match for '{}': best '{}' scored {:.3} (< {:.2})",
                query, index.names[pos], score, self.threshold
            );
            return None;
        }
        let found = NameMatch {
            name: index.names[pos].clone(),
            score,
            exact: false,
            tied_with: tied.iter().map(|&p| index.names[p].clone()).collect(),
        };
        if !found.tied_with.is_empty() {
            warn!(
                "⚠️ Ambiguous match for '{}': {} candidates tied at {:.3}, using '{}'",
                query,
                found.tied_with.len() + 1,
                score,
                found.name
            );
        }
        Some(found)
    }
}

/// One-off match of `name` against a candidate list using the sequence ratio.
pub fn match_name<S: AsRef<str>>(name: &str, candidates: &[S], threshold: f64) -> Option<String> {
    let index = NameIndex::new(candidates.iter().map(|c| c.as_ref()));
    SimilarityMatcher::new(threshold, SimilarityMetric::SequenceRatio)
        .find_match(name, &index)
        .map(|m| m.name)
}

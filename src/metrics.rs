/*!
 * Extraction quality metrics.
 *
 * Compares extracted terms with a hand-made reference list stored next to the
 * documents (`{reference_dir}/{stem}.txt`, one term per line). Terms are
 * matched fuzzily with normalised Levenshtein similarity.
 */

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use log::{debug, warn};

/// Default similarity required for a predicted term to count as a hit
pub const DEFAULT_MATCH_THRESHOLD: f32 = 0.9;

/// Lowercase a term and collapse its inner whitespace
pub fn normalize_term(term: &str) -> String {
    term.split_whitespace()
        .map(|word| word.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Load the reference term list for a source document
///
/// Returns `Ok(None)` when no reference file exists for the document.
pub fn load_reference_terms<P: AsRef<Path>, Q: AsRef<Path>>(
    reference_dir: P,
    source: Q,
) -> Result<Option<HashSet<String>>> {
    let stem = match source.as_ref().file_stem() {
        Some(stem) => stem.to_string_lossy().to_string(),
        None => return Ok(None),
    };
    let path = reference_dir.as_ref().join(format!("{}.txt", stem));
    if !path.exists() {
        debug!("No reference terms at {}", path.display());
        return Ok(None);
    }

    let content = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read reference terms: {}", path.display()))?;
    let terms: HashSet<String> = content
        .lines()
        .map(normalize_term)
        .filter(|term| !term.is_empty())
        .collect();
    if terms.is_empty() {
        warn!("Reference file {} contains no terms", path.display());
    }
    Ok(Some(terms))
}

/// Fuzzy matcher using Levenshtein distance
#[derive(Debug, Clone)]
pub struct FuzzyMatcher {
    threshold: f32,
}

impl Default for FuzzyMatcher {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_MATCH_THRESHOLD,
        }
    }
}

impl FuzzyMatcher {
    pub fn new(threshold: f32) -> Self {
        Self {
            threshold: threshold.clamp(0.0, 1.0),
        }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Similarity between two strings (0.0-1.0)
    pub fn similarity(&self, a: &str, b: &str) -> f32 {
        if a.is_empty() && b.is_empty() {
            return 1.0;
        }
        if a.is_empty() || b.is_empty() {
            return 0.0;
        }

        let a_lower = a.to_lowercase();
        let b_lower = b.to_lowercase();
        let distance = levenshtein_distance(&a_lower, &b_lower);
        let max_len = a_lower.chars().count().max(b_lower.chars().count());

        1.0 - (distance as f32 / max_len as f32)
    }

    pub fn matches(&self, a: &str, b: &str) -> bool {
        self.similarity(a, b) >= self.threshold
    }
}

/// Precision, recall and F1 of an extraction run
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EvaluationScores {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub true_positives: usize,
}

impl std::fmt::Display for EvaluationScores {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "precision {:.2}, recall {:.2}, F1 {:.2}",
            self.precision, self.recall, self.f1
        )
    }
}

/// Score predicted terms against a normalised reference set
///
/// Each predicted term counts at most once, against the first reference
/// term it matches.
pub fn evaluate_terms<S: AsRef<str>>(
    predicted: &[S],
    reference: &HashSet<String>,
    matcher: &FuzzyMatcher,
) -> EvaluationScores {
    let predicted: HashSet<String> = predicted
        .iter()
        .map(|term| normalize_term(term.as_ref()))
        .filter(|term| !term.is_empty())
        .collect();

    let true_positives = predicted
        .iter()
        .filter(|pred| reference.iter().any(|reference| matcher.matches(pred, reference)))
        .count();

    let precision = ratio(true_positives, predicted.len());
    let recall = ratio(true_positives, reference.len());
    let f1 = if precision + recall > 0.0 {
        2.0 * precision * recall / (precision + recall)
    } else {
        0.0
    };

    EvaluationScores {
        precision,
        recall,
        f1,
        true_positives,
    }
}

fn ratio(part: usize, whole: usize) -> f64 {
    if whole == 0 { 0.0 } else { part as f64 / whole as f64 }
}

/// Levenshtein distance over chars
fn levenshtein_distance(a: &str, b: &str) -> usize {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    if a_chars.is_empty() {
        return b_chars.len();
    }
    if b_chars.is_empty() {
        return a_chars.len();
    }

    let mut prev_row: Vec<usize> = (0..=b_chars.len()).collect();
    let mut curr_row: Vec<usize> = vec![0; b_chars.len() + 1];

    for (i, a_char) in a_chars.iter().enumerate() {
        curr_row[0] = i + 1;
        for (j, b_char) in b_chars.iter().enumerate() {
            let cost = usize::from(a_char != b_char);
            curr_row[j + 1] = (prev_row[j + 1] + 1)
                .min(curr_row[j] + 1)
                .min(prev_row[j] + cost);
        }
        std::mem::swap(&mut prev_row, &mut curr_row);
    }

    prev_row[b_chars.len()]
}

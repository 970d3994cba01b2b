/*!
 * Parsing and merging of term blocks returned by the model.
 *
 * Model output is loosely formatted: labels may be bold, numbered, turned
 * into headings or written in English. Each response is cut into blocks that
 * start at a term line; fields are picked out with a fixed label table and
 * records are deduplicated by their exact term string, keeping the most
 * detailed block.
 */

use std::collections::HashMap;

use log::{debug, info};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::errors::ExtractionError;
use super::processor::ChunkResult;

/// One extracted term
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TermRecord {
    /// Term as written by the model, trimmed
    pub term: String,
    #[serde(default)]
    pub definition: String,
    #[serde(default)]
    pub translation: String,
    /// Relevance in percent, 0 when missing or unreadable
    #[serde(default)]
    pub relevance: f64,
}

/// Field of a term block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TermField {
    Term,
    Definition,
    Translation,
    Relevance,
}

/// Accepted labels per field, matched in this order
pub const FIELD_LABELS: &[(TermField, &[&str])] = &[
    (TermField::Term, &["Термин", "Term"]),
    (TermField::Definition, &["Определение", "Definition"]),
    (TermField::Translation, &["Перевод", "Translation"]),
    (TermField::Relevance, &["Релевантность", "Relevance"]),
];

static FIELD_PATTERNS: Lazy<Vec<(TermField, Regex)>> = Lazy::new(|| {
    FIELD_LABELS
        .iter()
        .map(|(field, labels)| {
            let alternatives = labels
                .iter()
                .map(|label| regex::escape(label))
                .collect::<Vec<_>>()
                .join("|");
            // ordinal, bullet, heading, emphasis, label, colon, emphasis, value
            let pattern = format!(
                r"(?i)^\s*(?:\d+[.)]\s*)?(?:[-*•]\s+)?(?:#{{1,6}}\s*)?(?:\*\*|__)?\s*(?:{})\s*(?:\*\*|__)?\s*[:：]\s*(?:\*\*|__)?(?P<value>.*)$",
                alternatives
            );
            (*field, Regex::new(&pattern).unwrap())
        })
        .collect()
});

static RELEVANCE_NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+(?:[.,]\d+)?").unwrap());

/// Match a line against the label table
fn match_field(line: &str) -> Option<(TermField, String)> {
    FIELD_PATTERNS.iter().find_map(|(field, pattern)| {
        pattern
            .captures(line)
            .and_then(|caps| caps.name("value"))
            .map(|value| (*field, clean_value(value.as_str())))
    })
}

const EMPHASIS_MARKS: [&str; 2] = ["**", "__"];

/// Trim whitespace and bold markers from both ends of a value
fn clean_value(raw: &str) -> String {
    let mut value = raw.trim();
    loop {
        let stripped = EMPHASIS_MARKS.iter().fold(value, |v, mark| {
            let v = v.strip_prefix(mark).unwrap_or(v);
            v.strip_suffix(mark).unwrap_or(v).trim()
        });
        if stripped == value {
            return value.to_string();
        }
        value = stripped;
    }
}

/// Terms may keep heading marks after the label (`Термин: ## UAV`)
fn clean_term(value: &str) -> String {
    clean_value(value.trim_start_matches('#'))
}

/// Relevance from a percentage-like token, clamped to [0, 100]
pub fn parse_relevance(value: &str) -> f64 {
    RELEVANCE_NUMBER
        .find(value)
        .and_then(|m| m.as_str().replace(',', ".").parse::<f64>().ok())
        .map_or(0.0, |relevance| relevance.clamp(0.0, 100.0))
}

/// Cut a response into raw blocks, each starting at a term line
pub fn split_blocks(text: &str) -> Vec<String> {
    let mut blocks: Vec<Vec<&str>> = Vec::new();

    for line in text.lines() {
        let starts_block = matches!(match_field(line), Some((TermField::Term, _)));
        if starts_block {
            blocks.push(vec![line]);
        } else if let Some(block) = blocks.last_mut() {
            block.push(line);
        }
    }

    blocks
        .into_iter()
        .map(|lines| lines.join("\n").trim_end().to_string())
        .collect()
}

/// Parse one raw block; blocks without a term yield `None`
pub fn parse_block(block: &str) -> Option<TermRecord> {
    let mut record = TermRecord {
        term: String::new(),
        definition: String::new(),
        translation: String::new(),
        relevance: 0.0,
    };
    let mut seen_term = false;

    for line in block.lines() {
        let Some((field, value)) = match_field(line) else {
            continue;
        };
        match field {
            // A second term line would have started a new block
            TermField::Term if !seen_term => {
                record.term = clean_term(&value);
                seen_term = true;
            }
            TermField::Term => {}
            TermField::Definition => record.definition = value,
            TermField::Translation => record.translation = value,
            TermField::Relevance => record.relevance = parse_relevance(&value),
        }
    }

    if record.term.is_empty() {
        None
    } else {
        Some(record)
    }
}

#[derive(Debug, Clone, PartialEq)]
struct GlossaryEntry {
    record: TermRecord,
    block_len: usize,
}

/// Deduplicated terms of a job, keyed by exact term string
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergedGlossary {
    entries: HashMap<String, GlossaryEntry>,
}

impl MergedGlossary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record parsed from a block of `block_len` characters.
    ///
    /// On a collision the stored record is replaced only by a strictly longer
    /// block. Returns whether the record was stored.
    pub fn insert(&mut self, record: TermRecord, block_len: usize) -> bool {
        match self.entries.get(&record.term) {
            Some(existing) if existing.block_len >= block_len => false,
            _ => {
                self.entries
                    .insert(record.term.clone(), GlossaryEntry { record, block_len });
                true
            }
        }
    }

    pub fn get(&self, term: &str) -> Option<&TermRecord> {
        self.entries.get(term).map(|entry| &entry.record)
    }

    pub fn contains(&self, term: &str) -> bool {
        self.entries.contains_key(term)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn records(&self) -> impl Iterator<Item = &TermRecord> {
        self.entries.values().map(|entry| &entry.record)
    }

    /// Records by descending relevance, then term
    pub fn sorted_records(&self) -> Vec<&TermRecord> {
        let mut records: Vec<&TermRecord> = self.records().collect();
        records.sort_by(|a, b| {
            b.relevance
                .total_cmp(&a.relevance)
                .then_with(|| a.term.cmp(&b.term))
        });
        records
    }

    /// Records with relevance at or above `threshold`, sorted like `sorted_records`
    pub fn above_threshold(&self, threshold: f64) -> Vec<&TermRecord> {
        self.sorted_records()
            .into_iter()
            .filter(|record| record.relevance >= threshold)
            .collect()
    }
}

/// Turns chunk results into a merged glossary
#[derive(Debug, Clone, Copy, Default)]
pub struct ResultMerger;

impl ResultMerger {
    pub fn new() -> Self {
        Self
    }

    /// Merge all successful results.
    ///
    /// Fails with `AllChunksFailed` when there is nothing successful to merge;
    /// successful results without a single term give an empty glossary.
    pub fn merge(&self, results: &[ChunkResult]) -> Result<MergedGlossary, ExtractionError> {
        let texts: Vec<&str> = results.iter().filter_map(ChunkResult::text).collect();
        if texts.is_empty() {
            return Err(ExtractionError::AllChunksFailed(results.len()));
        }

        let mut glossary = MergedGlossary::new();
        let mut blocks_seen = 0usize;
        let mut discarded = 0usize;

        for text in &texts {
            for block in split_blocks(text) {
                blocks_seen += 1;
                match parse_block(&block) {
                    Some(record) => {
                        glossary.insert(record, block.chars().count());
                    }
                    None => discarded += 1,
                }
            }
        }

        debug!(
            "Parsed {} blocks from {} responses ({} discarded)",
            blocks_seen,
            texts.len(),
            discarded
        );
        info!(
            "Merged {} unique terms from {}/{} successful chunks",
            glossary.len(),
            texts.len(),
            results.len()
        );

        Ok(glossary)
    }
}

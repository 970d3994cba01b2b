/*!
 * JSON term database.
 *
 * A single pretty-printed JSON object mapping each term to its latest record.
 * Only terms at or above the relevance threshold are stored; a newer run
 * overwrites the record of a term it extracts again.
 */

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Local;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::extraction::TermRecord;
use crate::file_utils::FileManager;

/// Record as stored in the database
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredTerm {
    pub term: String,
    #[serde(default)]
    pub definition: String,
    #[serde(default)]
    pub translation: String,
    #[serde(default)]
    pub relevance: f64,
    /// Local time of the last write, `%Y-%m-%d %H:%M:%S`
    #[serde(default)]
    pub timestamp: String,
}

impl StoredTerm {
    fn from_record(record: &TermRecord, timestamp: &str) -> Self {
        Self {
            term: record.term.clone(),
            definition: record.definition.clone(),
            translation: record.translation.clone(),
            relevance: record.relevance,
            timestamp: timestamp.to_string(),
        }
    }
}

/// Outcome of adding terms to the database
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StoreReport {
    /// Terms that were not in the database before
    pub added: usize,
    /// Terms whose existing record was overwritten
    pub updated: usize,
    /// Terms below the relevance threshold
    pub skipped: usize,
}

impl StoreReport {
    pub fn stored(&self) -> usize {
        self.added + self.updated
    }
}

/// File-backed term database
#[derive(Debug, Clone)]
pub struct TermStore {
    path: PathBuf,
}

impl TermStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load all stored terms
    ///
    /// A missing or unreadable database loads as empty.
    pub fn load(&self) -> BTreeMap<String, StoredTerm> {
        if !self.path.exists() {
            return BTreeMap::new();
        }
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) => {
                warn!("Failed to read term database {}: {}", self.path.display(), e);
                return BTreeMap::new();
            }
        };
        match serde_json::from_str(&content) {
            Ok(terms) => terms,
            Err(e) => {
                warn!("Term database {} is corrupt, starting empty: {}", self.path.display(), e);
                BTreeMap::new()
            }
        }
    }

    pub fn get(&self, term: &str) -> Option<StoredTerm> {
        self.load().remove(term)
    }

    pub fn contains(&self, term: &str) -> bool {
        self.load().contains_key(term)
    }

    /// Add records with relevance at or above `threshold`
    pub fn add_terms<'a, I>(&self, records: I, threshold: f64) -> Result<StoreReport>
    where
        I: IntoIterator<Item = &'a TermRecord>,
    {
        let mut terms = self.load();
        let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
        let mut report = StoreReport::default();

        for record in records {
            if record.relevance < threshold {
                report.skipped += 1;
                continue;
            }
            let stored = StoredTerm::from_record(record, &timestamp);
            match terms.insert(record.term.clone(), stored) {
                Some(_) => report.updated += 1,
                None => report.added += 1,
            }
        }

        if report.stored() > 0 {
            self.save(&terms)?;
        }
        debug!(
            "Term database {}: {} added, {} updated, {} below threshold",
            self.path.display(),
            report.added,
            report.updated,
            report.skipped
        );
        Ok(report)
    }

    fn save(&self, terms: &BTreeMap<String, StoredTerm>) -> Result<()> {
        let json = serde_json::to_string_pretty(terms).context("Failed to serialize term database")?;
        FileManager::write_to_file(&self.path, &json)
            .with_context(|| format!("Failed to write term database: {}", self.path.display()))
    }
}

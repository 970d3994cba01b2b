/*!
 * CSV export of extracted terms.
 */

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Local};

use crate::extraction::TermRecord;
use crate::file_utils::FileManager;

const HEADER: [&str; 4] = ["term", "definition", "translation", "relevance"];

/// `terms_{YYYYmmdd_HHMMSS}_{stem}.csv` for a source document
pub fn export_file_name<P: AsRef<Path>>(source: P, at: DateTime<Local>) -> String {
    let stem = source
        .as_ref()
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "document".to_string());
    format!("terms_{}_{}.csv", at.format("%Y%m%d_%H%M%S"), stem)
}

/// Quote a field if it contains a delimiter, quote or line break
fn escape_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Writes term records as CSV under `{results_dir}/csv`
#[derive(Debug, Clone)]
pub struct CsvExporter {
    output_dir: PathBuf,
}

impl CsvExporter {
    pub fn new<P: AsRef<Path>>(results_dir: P) -> Self {
        Self {
            output_dir: results_dir.as_ref().join("csv"),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Render records as CSV text, header first
    pub fn render<'a, I>(records: I) -> String
    where
        I: IntoIterator<Item = &'a TermRecord>,
    {
        let mut out = HEADER.join(",");
        out.push_str("\r\n");
        for record in records {
            let relevance = record.relevance.to_string();
            let row = [
                record.term.as_str(),
                record.definition.as_str(),
                record.translation.as_str(),
                relevance.as_str(),
            ];
            let line: Vec<String> = row.iter().map(|field| escape_field(field)).collect();
            out.push_str(&line.join(","));
            out.push_str("\r\n");
        }
        out
    }

    /// Export records for a source document, returning the written path
    pub fn export<'a, I, P>(&self, records: I, source: P) -> Result<PathBuf>
    where
        I: IntoIterator<Item = &'a TermRecord>,
        P: AsRef<Path>,
    {
        let path = self.output_dir.join(export_file_name(source, Local::now()));
        FileManager::write_to_file(&path, &Self::render(records))
            .with_context(|| format!("Failed to export terms to {}", path.display()))?;
        Ok(path)
    }
}

/*!
 * Persistence of extraction results.
 *
 * - `term_store`: JSON term database shared across runs
 * - `csv_export`: per-document CSV export
 */

pub use csv_export::{CsvExporter, export_file_name};
pub use term_store::{StoreReport, StoredTerm, TermStore};

pub mod csv_export;
pub mod term_store;

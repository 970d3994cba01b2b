/*!
 * # DroneTerms - domain term extraction with LLMs
 *
 * A Rust library that extracts domain terminology (term, definition,
 * translation, relevance) from long technical documents using a language
 * model.
 *
 * ## Features
 *
 * - Token-aware splitting on paragraph, sentence and word boundaries
 * - Per-chunk requests with timeouts, exponential backoff and shrinking
 * - Pre-emptive truncation of prompts that exceed the model's safe ceiling
 * - Merging of term blocks with exact-string deduplication
 * - Cancellation and lock-free progress reporting
 * - Extraction backends:
 *   - OpenAI-compatible APIs (OpenAI, DeepSeek)
 *   - Ollama (local LLM)
 * - CSV export, a JSON term database and reference-based metrics
 *
 * ## Architecture
 *
 * The library is organized in these main modules:
 * - `app_config`: Configuration management
 * - `extraction`: The extraction pipeline:
 *   - `extraction::tokenizer`: Model profiles and token counting
 *   - `extraction::chunking`: Chunk splitter
 *   - `extraction::processor`: Chunk processor with retries
 *   - `extraction::merge`: Result merger
 *   - `extraction::pipeline`: Job coordinator
 * - `text_cleaner`: Document cleaning before extraction
 * - `persistence`: CSV export and term database
 * - `metrics`: Precision/recall against reference terms
 * - `file_utils`: File system operations
 * - `progress_display`: Terminal progress bar
 * - `app_controller`: Main application controller
 * - `providers`: Client implementations for LLM backends
 * - `errors`: Custom error types for the application
 */

// Global lints configuration
// These lints will be allowed but not auto-fixed
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::redundant_closure_for_method_calls)]

// Public modules
pub mod app_config;
pub mod app_controller;
pub mod errors;
pub mod extraction;
pub mod file_utils;
pub mod metrics;
pub mod persistence;
pub mod progress_display;
pub mod providers;
pub mod text_cleaner;

// Re-export main types for easier usage
pub use app_config::Config;
pub use app_controller::Controller;
pub use errors::{AppError, ExtractionError, ProviderError};
pub use extraction::{ExtractionPipeline, MergedGlossary, TermRecord};
pub use text_cleaner::TextCleaner;

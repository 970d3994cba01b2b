/*!
 * Term extraction pipeline.
 *
 * The pipeline is split into several submodules:
 *
 * - `tokenizer`: Token counting per model profile
 * - `cache`: Token count caching
 * - `chunking`: Token-aware paragraph/sentence/word splitting
 * - `prompts`: Extraction prompt template
 * - `processor`: Per-chunk request loop with backoff and shrinking
 * - `merge`: Term block parsing and deduplication
 * - `pipeline`: Job coordinator, progress and cancellation
 */

// Re-export main types for easier usage
pub use self::chunking::{Chunk, ChunkSplitter, reassemble};
pub use self::merge::{MergedGlossary, ResultMerger, TermRecord};
pub use self::pipeline::{
    CancellationFlag, ExtractionOutput, ExtractionPipeline, JobProgress, JobState, ProgressSnapshot,
};
pub use self::processor::{ChunkProcessor, ChunkReport, ChunkResult, RetryPolicy};
pub use self::prompts::PromptTemplate;
pub use self::tokenizer::{ModelProfile, TextSpan, TokenCounter, TokenEncoding};

// Submodules
pub mod cache;
pub mod chunking;
pub mod merge;
pub mod pipeline;
pub mod processor;
pub mod prompts;
pub mod tokenizer;

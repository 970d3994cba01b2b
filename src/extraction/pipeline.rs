/*!
 * Extraction job coordinator.
 *
 * A job moves through `Idle -> Splitting -> Processing(i of n) -> Merging`
 * and ends in `Done` or `Failed`. Chunks are processed one at a time in index
 * order. Cancellation is cooperative: the flag is checked before each chunk
 * is dispatched and once more before merging.
 *
 * Progress is published through `JobProgress`, which holds atomics for the
 * counters and can be read from a display task at any time.
 */

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use parking_lot::RwLock;

use crate::errors::ExtractionError;
use super::chunking::ChunkSplitter;
use super::merge::{MergedGlossary, ResultMerger};
use super::processor::{ChunkProcessor, ChunkReport};

/// Current phase of an extraction job
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum JobState {
    #[default]
    Idle,
    Splitting,
    /// Chunk `chunk` (1-based) of `total` is being processed
    Processing { chunk: usize, total: usize },
    Merging,
    Done,
    Failed(ExtractionError),
}

impl JobState {
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Done | Self::Failed(_))
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Splitting => write!(f, "splitting text"),
            Self::Processing { chunk, total } => write!(f, "processing chunk {}/{}", chunk, total),
            Self::Merging => write!(f, "merging terms"),
            Self::Done => write!(f, "done"),
            Self::Failed(error) => write!(f, "failed: {}", error),
        }
    }
}

/// Point-in-time view of a job's progress
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressSnapshot {
    pub completed: usize,
    pub total: usize,
    /// Display estimate for the running chunk, in [0, 1)
    pub chunk_fraction: f64,
    pub state: JobState,
}

impl ProgressSnapshot {
    /// Overall completion in [0, 1]
    pub fn overall(&self) -> f64 {
        if self.total == 0 {
            return if self.state == JobState::Done { 1.0 } else { 0.0 };
        }
        ((self.completed as f64 + self.chunk_fraction) / self.total as f64).min(1.0)
    }
}

/// Progress of one job, written by the coordinator and read by displays
#[derive(Debug)]
pub struct JobProgress {
    completed: AtomicUsize,
    total: AtomicUsize,
    chunk_running: AtomicBool,
    /// Milliseconds since `origin` when the running chunk started
    chunk_started_ms: AtomicU64,
    /// Expected duration of one chunk, used for the fraction estimate
    expected_chunk_ms: AtomicU64,
    origin: Instant,
    state: RwLock<JobState>,
}

/// Upper bound of the per-chunk estimate so a slow chunk never looks finished
const MAX_CHUNK_FRACTION: f64 = 0.95;

impl JobProgress {
    pub fn new() -> Self {
        Self {
            completed: AtomicUsize::new(0),
            total: AtomicUsize::new(0),
            chunk_running: AtomicBool::new(false),
            chunk_started_ms: AtomicU64::new(0),
            expected_chunk_ms: AtomicU64::new(60_000),
            origin: Instant::now(),
            state: RwLock::new(JobState::Idle),
        }
    }

    pub fn state(&self) -> JobState {
        self.state.read().clone()
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::Acquire)
    }

    pub fn total(&self) -> usize {
        self.total.load(Ordering::Acquire)
    }

    /// Estimated share of the running chunk that is done
    pub fn chunk_fraction(&self) -> f64 {
        if !self.chunk_running.load(Ordering::Acquire) {
            return 0.0;
        }
        let now_ms = self.origin.elapsed().as_millis() as u64;
        let started = self.chunk_started_ms.load(Ordering::Acquire);
        let expected = self.expected_chunk_ms.load(Ordering::Relaxed).max(1);
        (now_ms.saturating_sub(started) as f64 / expected as f64).min(MAX_CHUNK_FRACTION)
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            completed: self.completed(),
            total: self.total(),
            chunk_fraction: self.chunk_fraction(),
            state: self.state(),
        }
    }

    fn set_state(&self, state: JobState) {
        *self.state.write() = state;
    }

    fn begin(&self, total: usize, expected_chunk: Duration) {
        self.completed.store(0, Ordering::Release);
        self.total.store(total, Ordering::Release);
        self.expected_chunk_ms
            .store(expected_chunk.as_millis().max(1) as u64, Ordering::Relaxed);
    }

    fn start_chunk(&self, chunk: usize, total: usize) {
        self.chunk_started_ms
            .store(self.origin.elapsed().as_millis() as u64, Ordering::Release);
        self.chunk_running.store(true, Ordering::Release);
        self.set_state(JobState::Processing { chunk, total });
    }

    fn finish_chunk(&self) {
        self.chunk_running.store(false, Ordering::Release);
        self.completed.fetch_add(1, Ordering::AcqRel);
    }

    fn fail(&self, error: ExtractionError) -> ExtractionError {
        self.chunk_running.store(false, Ordering::Release);
        self.set_state(JobState::Failed(error.clone()));
        error
    }
}

impl Default for JobProgress {
    fn default() -> Self {
        Self::new()
    }
}

/// Cooperative cancellation signal shared between a job and its caller
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Glossary plus per-chunk details of a finished job
#[derive(Debug, Clone)]
pub struct ExtractionOutput {
    pub glossary: MergedGlossary,
    pub reports: Vec<ChunkReport>,
    pub duration: Duration,
}

impl ExtractionOutput {
    pub fn failed_chunks(&self) -> usize {
        self.reports.iter().filter(|r| !r.result.is_success()).count()
    }

    /// One-line summary for logs
    pub fn summary(&self) -> String {
        format!(
            "{} terms from {} chunks ({} failed) in {:.1}s",
            self.glossary.len(),
            self.reports.len(),
            self.failed_chunks(),
            self.duration.as_secs_f64()
        )
    }
}

/// Sequences splitting, per-chunk processing and merging
#[derive(Debug, Clone)]
pub struct ExtractionPipeline {
    splitter: ChunkSplitter,
    processor: ChunkProcessor,
    merger: ResultMerger,
    max_chunk_tokens: usize,
}

impl ExtractionPipeline {
    pub fn new(splitter: ChunkSplitter, processor: ChunkProcessor, max_chunk_tokens: usize) -> Self {
        Self {
            splitter,
            processor,
            merger: ResultMerger::new(),
            max_chunk_tokens,
        }
    }

    pub fn max_chunk_tokens(&self) -> usize {
        self.max_chunk_tokens
    }

    /// Run a job and return its glossary
    pub async fn run(
        &self,
        text: &str,
        domain: &str,
        progress: &JobProgress,
        cancel: &CancellationFlag,
    ) -> Result<MergedGlossary, ExtractionError> {
        self.run_detailed(text, domain, progress, cancel)
            .await
            .map(|output| output.glossary)
    }

    /// Run a job and keep the per-chunk reports
    pub async fn run_detailed(
        &self,
        text: &str,
        domain: &str,
        progress: &JobProgress,
        cancel: &CancellationFlag,
    ) -> Result<ExtractionOutput, ExtractionError> {
        let started = Instant::now();

        progress.set_state(JobState::Splitting);
        if text.trim().is_empty() {
            return Err(progress.fail(ExtractionError::EmptyInput));
        }

        let chunks = self.splitter.split(text, self.max_chunk_tokens);
        let total = chunks.len();
        progress.begin(total, self.processor.policy().request_timeout);
        info!(
            "Processing {} chunks of at most {} tokens",
            total, self.max_chunk_tokens
        );

        let mut reports = Vec::with_capacity(total);
        for chunk in &chunks {
            if cancel.is_cancelled() {
                warn!("Extraction cancelled before chunk {}/{}", chunk.index, total);
                return Err(progress.fail(ExtractionError::Cancelled {
                    completed: reports.len(),
                    total,
                }));
            }

            progress.start_chunk(chunk.index, total);
            let report = self.processor.process_with_report(chunk, domain).await;
            debug!(
                "Chunk {}/{} finished after {} attempts",
                chunk.index, total, report.attempts
            );
            reports.push(report);
            progress.finish_chunk();
        }

        if cancel.is_cancelled() {
            warn!("Extraction cancelled before merging");
            return Err(progress.fail(ExtractionError::Cancelled {
                completed: reports.len(),
                total,
            }));
        }

        progress.set_state(JobState::Merging);
        let results: Vec<_> = reports.iter().map(|r| r.result.clone()).collect();
        match self.merger.merge(&results) {
            Ok(glossary) => {
                progress.set_state(JobState::Done);
                let output = ExtractionOutput {
                    glossary,
                    reports,
                    duration: started.elapsed(),
                };
                info!("Extraction finished: {}", output.summary());
                Ok(output)
            }
            Err(error) => Err(progress.fail(error)),
        }
    }
}

use anyhow::{Context, Result};
use log::{debug, error, info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::app_config::{BackendProvider, Config};
use crate::errors::{AppError, ExtractionError};
use crate::extraction::{
    CancellationFlag, ChunkProcessor, ChunkSplitter, ExtractionOutput, ExtractionPipeline, JobProgress,
    MergedGlossary, PromptTemplate, TokenCounter,
};
use crate::file_utils::FileManager;
use crate::metrics::{self, EvaluationScores, FuzzyMatcher};
use crate::persistence::{CsvExporter, StoreReport, TermStore};
use crate::progress_display::ProgressDisplay;
use crate::providers::Provider;
use crate::providers::ollama::Ollama;
use crate::providers::openai::OpenAI;
use crate::text_cleaner::TextCleaner;

// @module: Application controller for document term extraction

/// Default Ollama port when the endpoint omits one
const OLLAMA_DEFAULT_PORT: u16 = 11434;

/// What happened to one document
#[derive(Debug, Clone)]
pub struct RunReport {
    pub source: PathBuf,
    pub glossary: MergedGlossary,
    pub summary: String,
    pub csv_path: Option<PathBuf>,
    pub store: Option<StoreReport>,
    pub scores: Option<EvaluationScores>,
}

/// Outcome of folder mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FolderSummary {
    pub processed: usize,
    pub failed: usize,
}

/// Ctrl-C listener that sets a cancellation flag; stops listening when dropped
struct InterruptListener(tokio::task::JoinHandle<()>);

impl InterruptListener {
    fn spawn(cancel: &CancellationFlag) -> Self {
        let cancel = cancel.clone();
        Self(tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, stopping after the current chunk");
                cancel.cancel();
            }
        }))
    }
}

impl Drop for InterruptListener {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Main application controller for term extraction
pub struct Controller {
    // @field: App configuration
    config: Config,
    // @field: Extraction backend
    provider: Arc<dyn Provider>,
    // @field: Token counter shared by every job
    counter: Arc<TokenCounter>,
    // @field: Show a progress bar and listen for Ctrl-C
    interactive: bool,
}

impl Controller {
    // @method: Create a new controller with the given configuration
    pub fn with_config(config: Config) -> Result<Self> {
        let provider = Self::build_provider(&config)?;
        Ok(Self::with_provider(config, provider).interactive(true))
    }

    /// Create a controller around an existing backend
    pub fn with_provider(config: Config, provider: Arc<dyn Provider>) -> Self {
        Self {
            config,
            provider,
            counter: Arc::new(TokenCounter::new()),
            interactive: false,
        }
    }

    /// Toggle the progress bar and Ctrl-C handling
    pub fn interactive(mut self, interactive: bool) -> Self {
        self.interactive = interactive;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Build the configured extraction backend
    pub fn build_provider(config: &Config) -> Result<Arc<dyn Provider>> {
        let extraction = &config.extraction;
        let temperature = extraction.common.temperature;
        let endpoint = extraction.get_endpoint();

        let provider: Arc<dyn Provider> = match extraction.provider {
            BackendProvider::OpenAI => {
                let api_key = extraction.get_api_key();
                if api_key.is_empty() {
                    return Err(AppError::Config("OpenAI API key is required".to_string()).into());
                }
                Arc::new(OpenAI::new(api_key, endpoint, temperature))
            }
            BackendProvider::Ollama => Arc::new(Ollama::new(endpoint, OLLAMA_DEFAULT_PORT, temperature)),
        };
        Ok(provider)
    }

    /// Assemble the extraction pipeline from the configuration
    pub fn build_pipeline(&self) -> ExtractionPipeline {
        let settings = self.config.extraction.settings();
        let profile = settings.profile();
        let prompt = PromptTemplate::new(&self.config.extraction.common.prompt_template);

        let splitter = ChunkSplitter::new(Arc::clone(&self.counter), profile.clone());
        let processor = ChunkProcessor::new(
            Arc::clone(&self.provider),
            Arc::clone(&self.counter),
            profile,
            settings.retry_policy(),
        )
        .with_prompt(prompt);

        ExtractionPipeline::new(splitter, processor, settings.max_chunk_tokens)
    }

    /// Check that the backend answers
    pub async fn test_connection(&self) -> Result<()> {
        let model = self.config.extraction.get_model();
        self.provider
            .test_connection(&model)
            .await
            .with_context(|| format!("{} is not reachable", self.provider.name()))?;
        info!("Connected to {} ({})", self.provider.name(), model);
        Ok(())
    }

    /// Clean text if cleaning is enabled, logging the reduction
    pub fn prepare_text(&self, text: &str) -> String {
        if !self.config.cleaning.enabled {
            return text.to_string();
        }
        let (cleaned, stats) = TextCleaner::new().clean_with_stats(text);
        info!(
            "Cleaned text: {} -> {} chars ({:.1}% removed)",
            stats.original_len,
            stats.final_len(),
            stats.reduction_percent()
        );
        cleaned
    }

    /// Run the pipeline on already loaded text
    pub async fn extract(&self, text: &str, cancel: &CancellationFlag) -> Result<ExtractionOutput, ExtractionError> {
        let pipeline = self.build_pipeline();
        let progress = Arc::new(JobProgress::new());
        let display = self.interactive.then(|| ProgressDisplay::spawn(Arc::clone(&progress)));

        let result = pipeline
            .run_detailed(text, &self.config.domain, &progress, cancel)
            .await;

        if let Some(display) = display {
            display.finish().await;
        }
        result
    }

    fn listen_for_interrupt(&self, cancel: &CancellationFlag) -> Option<InterruptListener> {
        self.interactive.then(|| InterruptListener::spawn(cancel))
    }

    /// Run the main workflow for one document
    pub async fn run(&self, input_file: PathBuf) -> Result<RunReport> {
        let cancel = CancellationFlag::new();
        let _listener = self.listen_for_interrupt(&cancel);
        self.run_with_cancel(input_file, &cancel).await
    }

    /// Run one document, stopping between chunks once `cancel` is set
    pub async fn run_with_cancel(&self, input_file: PathBuf, cancel: &CancellationFlag) -> Result<RunReport> {
        let start_time = Instant::now();
        info!(
            "Extracting terms from {} with {} - {}",
            input_file.display(),
            self.config.extraction.provider.display_name(),
            self.config.extraction.get_model()
        );

        let raw = FileManager::read_document(&input_file).map_err(|e| AppError::File(format!("{:#}", e)))?;
        let text = self.prepare_text(&raw);

        let output = self.extract(&text, cancel).await.inspect_err(|e| {
            if e.is_no_terms() {
                warn!("No terms extracted from {}: {}", input_file.display(), e);
            }
        })?;

        if self.interactive {
            Self::print_terms(&output.glossary);
        }

        let csv_path = self.export_csv(&output.glossary, &input_file);
        let store = self.store_terms(&output.glossary);
        let scores = self.evaluate(&output.glossary, &input_file);

        info!(
            "Success: {} ({})",
            output.summary(),
            Self::format_duration(start_time.elapsed())
        );

        Ok(RunReport {
            source: input_file,
            summary: output.summary(),
            glossary: output.glossary,
            csv_path,
            store,
            scores,
        })
    }

    fn print_terms(glossary: &MergedGlossary) {
        for record in glossary.sorted_records() {
            println!("{} ({}%)", record.term, record.relevance);
            if !record.definition.is_empty() {
                println!("    {}", record.definition);
            }
            if !record.translation.is_empty() {
                println!("    -> {}", record.translation);
            }
        }
    }

    fn export_csv(&self, glossary: &MergedGlossary, source: &Path) -> Option<PathBuf> {
        if !self.config.output.save_csv {
            return None;
        }
        match CsvExporter::new(&self.config.output.results_dir).export(glossary.sorted_records(), source) {
            Ok(path) => {
                info!("Terms saved to CSV: {}", path.display());
                Some(path)
            }
            Err(e) => {
                error!("Failed to save CSV: {:#}", e);
                None
            }
        }
    }

    fn store_terms(&self, glossary: &MergedGlossary) -> Option<StoreReport> {
        if !self.config.output.save_term_db {
            return None;
        }
        let store = TermStore::new(&self.config.output.term_db_path);
        let threshold = self.config.extraction.common.relevance_threshold;
        match store.add_terms(glossary.records(), threshold) {
            Ok(report) => {
                info!(
                    "Term database: {} added, {} updated (relevance >= {}%)",
                    report.added, report.updated, threshold
                );
                Some(report)
            }
            Err(e) => {
                error!("Failed to update term database: {:#}", e);
                None
            }
        }
    }

    fn evaluate(&self, glossary: &MergedGlossary, source: &Path) -> Option<EvaluationScores> {
        let reference = match metrics::load_reference_terms(&self.config.output.reference_dir, source) {
            Ok(Some(reference)) => reference,
            Ok(None) => {
                debug!("No reference terms for {}", source.display());
                return None;
            }
            Err(e) => {
                warn!("Skipping evaluation: {:#}", e);
                return None;
            }
        };
        let predicted: Vec<&str> = glossary.records().map(|r| r.term.as_str()).collect();
        let scores = metrics::evaluate_terms(&predicted, &reference, &FuzzyMatcher::default());
        info!("Evaluation against {} reference terms: {}", reference.len(), scores);
        Some(scores)
    }

    // Format duration in a human-readable format
    fn format_duration(duration: Duration) -> String {
        let total_seconds = duration.as_secs();
        let hours = total_seconds / 3600;
        let minutes = (total_seconds % 3600) / 60;
        let seconds = total_seconds % 60;

        if hours > 0 {
            format!("{}h {}m {}s", hours, minutes, seconds)
        } else if minutes > 0 {
            format!("{}m {}s", minutes, seconds)
        } else {
            format!("{}.{:03}s", seconds, duration.subsec_millis())
        }
    }

    /// Run the workflow in folder mode, processing every document in a directory
    pub async fn run_folder(&self, input_dir: PathBuf) -> Result<FolderSummary> {
        let cancel = CancellationFlag::new();
        let _listener = self.listen_for_interrupt(&cancel);
        self.run_folder_with_cancel(input_dir, &cancel).await
    }

    /// Folder mode sharing one cancellation flag across all documents
    pub async fn run_folder_with_cancel(&self, input_dir: PathBuf, cancel: &CancellationFlag) -> Result<FolderSummary> {
        let start_time = Instant::now();

        if !FileManager::dir_exists(&input_dir) {
            return Err(AppError::File(format!("Input directory does not exist: {:?}", input_dir)).into());
        }

        let documents = FileManager::find_documents(&input_dir)?;
        if documents.is_empty() {
            return Err(AppError::File(format!("No documents found in directory: {:?}", input_dir)).into());
        }
        info!("Found {} documents in {}", documents.len(), input_dir.display());

        let mut summary = FolderSummary::default();
        for (index, document) in documents.iter().enumerate() {
            if cancel.is_cancelled() {
                warn!("Folder processing interrupted before {}", document.display());
                break;
            }
            info!("[{}/{}] {}", index + 1, documents.len(), document.display());
            match self.run_with_cancel(document.clone(), cancel).await {
                Ok(_) => summary.processed += 1,
                Err(e) => {
                    error!("Error processing file {}: {:#}", document.display(), e);
                    summary.failed += 1;
                    if matches!(e.downcast_ref::<ExtractionError>(), Some(ExtractionError::Cancelled { .. })) {
                        warn!("Folder processing interrupted");
                        break;
                    }
                }
            }
        }

        info!(
            "Folder processing completed: {} processed, {} errors in {}",
            summary.processed,
            summary.failed,
            Self::format_duration(start_time.elapsed())
        );
        Ok(summary)
    }
}

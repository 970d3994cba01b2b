/*!
 * Token counting for model profiles.
 *
 * Counts are exact BPE counts where the model's encoding is known and fall
 * back to a chars/4 heuristic when an encoding table cannot be loaded. The
 * counter never fails.
 */

use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, warn};
use once_cell::sync::{Lazy, OnceCell};
use serde::{Deserialize, Serialize};
use tiktoken_rs::CoreBPE;

use super::cache::TokenCountCache;

/// Tokens kept free for the model's answer when deriving the safe input ceiling
pub const RESPONSE_RESERVE_TOKENS: usize = 2048;

/// Context window assumed for models nobody told us about
pub const DEFAULT_CONTEXT_LIMIT: usize = 8192;

static O200K: Lazy<Option<CoreBPE>> = Lazy::new(|| load_encoding("o200k_base", tiktoken_rs::o200k_base));
static CL100K: Lazy<Option<CoreBPE>> = Lazy::new(|| load_encoding("cl100k_base", tiktoken_rs::cl100k_base));

static FALLBACK_WARNED: AtomicBool = AtomicBool::new(false);

fn load_encoding(name: &str, loader: fn() -> anyhow::Result<CoreBPE>) -> Option<CoreBPE> {
    match loader() {
        Ok(bpe) => {
            debug!("Loaded {} token encoding", name);
            Some(bpe)
        }
        Err(e) => {
            warn!("Failed to load {} token encoding, counting by characters: {}", name, e);
            None
        }
    }
}

/// Counting table used for a model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenEncoding {
    /// GPT-4o family
    O200kBase,
    /// GPT-4 / GPT-3.5 family, also the default approximation for other models
    Cl100kBase,
    /// chars / 4, no table
    CharHeuristic,
}

impl TokenEncoding {
    fn table(self) -> Option<&'static CoreBPE> {
        match self {
            Self::O200kBase => O200K.as_ref(),
            Self::Cl100kBase => CL100K.as_ref(),
            Self::CharHeuristic => None,
        }
    }
}

// Prefix, encoding, context window. First match wins.
const KNOWN_MODELS: &[(&str, TokenEncoding, usize)] = &[
    ("gpt-4o", TokenEncoding::O200kBase, 128_000),
    ("gpt-4-turbo", TokenEncoding::Cl100kBase, 128_000),
    ("gpt-4", TokenEncoding::Cl100kBase, 8_192),
    ("gpt-3.5-turbo", TokenEncoding::Cl100kBase, 16_385),
    ("deepseek", TokenEncoding::Cl100kBase, 64_000),
];

/// Token limits and counting table for one model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelProfile {
    /// Model identifier as sent to the backend
    pub model_id: String,

    /// Counting table
    pub encoding: TokenEncoding,

    /// Total context window in tokens
    pub context_limit: usize,

    /// Largest chunk the processor will submit; trailing words past it are dropped
    pub safe_ceiling: usize,
}

impl ModelProfile {
    /// Profile for a model id, falling back to the default table for unknown models
    pub fn for_model(model_id: &str) -> Self {
        let lower = model_id.to_lowercase();
        let (encoding, context_limit) = KNOWN_MODELS
            .iter()
            .find(|(prefix, _, _)| lower.starts_with(prefix))
            .map(|(_, encoding, limit)| (*encoding, *limit))
            .unwrap_or((TokenEncoding::Cl100kBase, DEFAULT_CONTEXT_LIMIT));

        Self {
            model_id: model_id.to_string(),
            encoding,
            context_limit,
            safe_ceiling: safe_ceiling_for(context_limit),
        }
    }

    /// Profile that counts by characters only
    pub fn heuristic(model_id: &str, context_limit: usize) -> Self {
        Self {
            model_id: model_id.to_string(),
            encoding: TokenEncoding::CharHeuristic,
            context_limit,
            safe_ceiling: safe_ceiling_for(context_limit),
        }
    }

    /// Override the context window and recompute the safe ceiling
    pub fn with_context_limit(mut self, context_limit: usize) -> Self {
        self.context_limit = context_limit;
        self.safe_ceiling = safe_ceiling_for(context_limit);
        self
    }

    /// Override the safe ceiling directly
    pub fn with_safe_ceiling(mut self, safe_ceiling: usize) -> Self {
        self.safe_ceiling = safe_ceiling;
        self
    }
}

fn safe_ceiling_for(context_limit: usize) -> usize {
    context_limit
        .saturating_sub(RESPONSE_RESERVE_TOKENS)
        .max(context_limit / 2)
}

/// Character heuristic used whenever a table is unavailable
pub fn heuristic_count(text: &str) -> usize {
    text.chars().count() / 4
}

/// Token counter with a shared per-span cache
#[derive(Debug, Clone, Default)]
pub struct TokenCounter {
    cache: TokenCountCache,
}

impl TokenCounter {
    /// Create a counter with a fresh cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a counter sharing an existing cache
    pub fn with_cache(cache: TokenCountCache) -> Self {
        Self { cache }
    }

    /// Count tokens of `text` for `profile`
    pub fn count(&self, text: &str, profile: &ModelProfile) -> usize {
        self.count_with(text, profile.encoding)
    }

    /// Count tokens of `text` with an explicit encoding
    pub fn count_with(&self, text: &str, encoding: TokenEncoding) -> usize {
        if text.is_empty() {
            return 0;
        }

        if let Some(count) = self.cache.get(encoding, text) {
            return count;
        }

        let count = match encoding.table() {
            Some(bpe) => bpe.encode_with_special_tokens(text).len(),
            None => {
                if encoding != TokenEncoding::CharHeuristic
                    && !FALLBACK_WARNED.swap(true, Ordering::Relaxed)
                {
                    warn!("Token encoding {:?} unavailable, using chars/4 estimate", encoding);
                }
                heuristic_count(text)
            }
        };

        self.cache.store(encoding, text, count);
        count
    }

    /// Access the underlying cache
    pub fn cache(&self) -> &TokenCountCache {
        &self.cache
    }
}

/// Immutable text with a lazily computed, memoized token count
#[derive(Debug, Clone)]
pub struct TextSpan {
    text: String,
    tokens: OnceCell<usize>,
}

impl TextSpan {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tokens: OnceCell::new(),
        }
    }

    /// Span whose count is already known
    pub fn with_count(text: impl Into<String>, tokens: usize) -> Self {
        let span = Self::new(text);
        let _ = span.tokens.set(tokens);
        span
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Token count, computed on first use
    pub fn token_count(&self, counter: &TokenCounter, profile: &ModelProfile) -> usize {
        *self.tokens.get_or_init(|| counter.count(&self.text, profile))
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

impl PartialEq for TextSpan {
    fn eq(&self, other: &Self) -> bool {
        self.text == other.text
    }
}

/*!
 * Token-aware text splitting.
 *
 * Text is split on paragraphs first, then on sentences for paragraphs that do
 * not fit, then on words. Units are packed greedily into chunks that stay
 * within the token budget. Every chunk remembers the separator that followed
 * it in the source so the source can be rebuilt byte for byte.
 */

use std::ops::Range;
use std::sync::Arc;

use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;

use super::tokenizer::{ModelProfile, TextSpan, TokenCounter};

static PARAGRAPH_GAP: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[ \t\r]*\n(?:[ \t\r]*\n)+\s*").unwrap());
static SENTENCE_END: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[.!?…]+["'»”)\]]*(\s+)"#).unwrap());
static WORD_GAP: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Splitting level, coarsest first
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Granularity {
    Paragraph,
    Sentence,
    Word,
}

impl Granularity {
    fn finer(self) -> Option<Self> {
        match self {
            Self::Paragraph => Some(Self::Sentence),
            Self::Sentence => Some(Self::Word),
            Self::Word => None,
        }
    }

    /// Byte ranges of separators inside `text`
    fn gaps(self, text: &str) -> Vec<Range<usize>> {
        match self {
            Self::Paragraph => PARAGRAPH_GAP.find_iter(text).map(|m| m.range()).collect(),
            Self::Sentence => SENTENCE_END
                .captures_iter(text)
                .filter_map(|c| c.get(1).map(|m| m.range()))
                .collect(),
            Self::Word => WORD_GAP.find_iter(text).map(|m| m.range()).collect(),
        }
    }
}

/// One ordered, 1-indexed unit of a split job
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// Position in the job, starting at 1
    pub index: usize,

    /// Number of chunks in the job
    pub total: usize,

    /// Chunk text
    pub span: TextSpan,

    /// Byte offset of the chunk in the source text
    pub offset: usize,

    /// Source text between this chunk and the next one (or the end)
    pub separator: String,
}

impl Chunk {
    pub fn text(&self) -> &str {
        self.span.text()
    }

    pub fn is_last(&self) -> bool {
        self.index == self.total
    }
}

/// Rebuild the source text from its chunks
pub fn reassemble(chunks: &[Chunk]) -> String {
    let mut text = String::new();
    for chunk in chunks {
        text.push_str(chunk.text());
        text.push_str(&chunk.separator);
    }
    text
}

/// Greedy paragraph/sentence/word splitter for one model profile
#[derive(Debug, Clone)]
pub struct ChunkSplitter {
    counter: Arc<TokenCounter>,
    profile: ModelProfile,
}

impl ChunkSplitter {
    pub fn new(counter: Arc<TokenCounter>, profile: ModelProfile) -> Self {
        Self { counter, profile }
    }

    pub fn profile(&self) -> &ModelProfile {
        &self.profile
    }

    /// Token count of `text` under this splitter's profile
    pub fn count(&self, text: &str) -> usize {
        self.counter.count(text, &self.profile)
    }

    /// Split `text` into chunks of at most `max_tokens` tokens each.
    ///
    /// Single words larger than the budget are emitted as their own chunk.
    pub fn split(&self, text: &str, max_tokens: usize) -> Vec<Chunk> {
        if text.is_empty() {
            return Vec::new();
        }

        let budget = max_tokens.max(1);
        let whole = self.count(text);
        let ranges = if whole <= budget {
            vec![0..text.len()]
        } else {
            let mut ranges = Vec::new();
            self.pack(text, 0..text.len(), Granularity::Paragraph, budget, &mut ranges);
            ranges
        };

        let total = ranges.len();
        let chunks: Vec<Chunk> = ranges
            .iter()
            .enumerate()
            .map(|(i, range)| {
                let next_start = ranges.get(i + 1).map_or(text.len(), |next| next.start);
                let body = &text[range.clone()];
                let span = if total == 1 {
                    TextSpan::with_count(body, whole)
                } else {
                    TextSpan::new(body)
                };
                Chunk {
                    index: i + 1,
                    total,
                    span,
                    offset: range.start,
                    separator: text[range.end..next_start].to_string(),
                }
            })
            .collect();

        debug!(
            "Split {} tokens into {} chunks (budget {} tokens, model {})",
            whole,
            chunks.len(),
            budget,
            self.profile.model_id
        );

        chunks
    }

    /// Units of `range` at `level`. Leading separators stay attached to the first unit.
    fn units(text: &str, range: Range<usize>, level: Granularity) -> Vec<Range<usize>> {
        let slice = &text[range.clone()];
        let mut units = Vec::new();
        let mut start = range.start;

        for gap in level.gaps(slice) {
            let gap_start = range.start + gap.start;
            let gap_end = range.start + gap.end;
            if gap_start == range.start {
                continue;
            }
            if gap_start > start {
                units.push(start..gap_start);
            }
            start = gap_end;
        }

        if start < range.end {
            units.push(start..range.end);
        }

        units
    }

    /// Greedy packing of the units of `range`. Units that do not fit on their
    /// own are split again one level finer.
    fn pack(
        &self,
        text: &str,
        range: Range<usize>,
        level: Granularity,
        budget: usize,
        out: &mut Vec<Range<usize>>,
    ) {
        let units = Self::units(text, range, level);
        let mut first = 0;

        while first < units.len() {
            let unit = units[first].clone();
            if self.count(&text[unit.clone()]) > budget {
                match level.finer() {
                    Some(finer) => self.pack(text, unit, finer, budget, out),
                    None => {
                        debug!(
                            "Word of {} bytes exceeds the {} token budget, keeping it whole",
                            unit.len(),
                            budget
                        );
                        out.push(unit);
                    }
                }
                first += 1;
                continue;
            }

            let last = self.last_fitting(text, &units, first, budget);
            out.push(units[first].start..units[last].end);
            first = last + 1;
        }
    }

    /// Index of the last unit that still fits in a chunk opened at `first`.
    ///
    /// Gallops over the number of units, then bisects, so each chunk costs a
    /// logarithmic number of counts instead of one per unit. `units[first]`
    /// must fit on its own.
    fn last_fitting(&self, text: &str, units: &[Range<usize>], first: usize, budget: usize) -> usize {
        let start = units[first].start;
        let fits = |last: usize| self.count(&text[start..units[last].end]) <= budget;

        let mut fitting = first;
        let mut step = 1;
        let mut overflowing = loop {
            let next = first + step;
            if next >= units.len() {
                break units.len();
            }
            if !fits(next) {
                break next;
            }
            fitting = next;
            step *= 2;
        };

        while overflowing - fitting > 1 {
            let middle = fitting + (overflowing - fitting) / 2;
            if fits(middle) {
                fitting = middle;
            } else {
                overflowing = middle;
            }
        }
        fitting
    }
}

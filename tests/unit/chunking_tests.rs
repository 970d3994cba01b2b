/*!
 * Tests for token counting and chunk splitting
 */

use std::sync::Arc;
use std::time::{Duration, Instant};

use droneterms::extraction::{ChunkSplitter, ModelProfile, TokenCounter, reassemble};
use crate::common;

fn heuristic_splitter() -> ChunkSplitter {
    ChunkSplitter::new(Arc::new(TokenCounter::new()), ModelProfile::heuristic("test-model", 100_000))
}

fn article() -> String {
    let intro = "Беспилотный летательный аппарат (БПЛА) управляется автопилотом. \
                 Наземная станция управления передаёт команды по радиоканалу.";
    let body = "Полётный контроллер обрабатывает данные инерциальной навигационной системы. \
                Спутниковый приёмник уточняет координаты! Барометрический высотомер измеряет высоту?";
    let tail = "Силовая установка включает электродвигатели и воздушные винты.";
    [intro, body, tail, body, intro].join("\n\n")
}

/// Nine paragraphs of 1000 tokens with a 4000 token budget give three chunks
#[test]
fn test_split_nineThousandTokens_shouldGiveThreeChunks() {
    let splitter = heuristic_splitter();
    let text = common::paragraphs(9, 4000, 'a');
    assert_eq!(splitter.count(&text), 9004);

    let chunks = splitter.split(&text, 4000);

    assert_eq!(chunks.len(), 3);
    for chunk in &chunks {
        assert!(splitter.count(chunk.text()) <= 4000);
        assert_eq!(chunk.total, 3);
    }
    assert_eq!(chunks.iter().map(|c| c.index).collect::<Vec<_>>(), vec![1, 2, 3]);
    assert_eq!(reassemble(&chunks), text);
}

/// Real BPE counting keeps every chunk within budget and loses no text
#[test]
fn test_split_russianArticle_withBpeProfile_shouldRespectBudget() {
    let splitter = ChunkSplitter::new(Arc::new(TokenCounter::new()), ModelProfile::for_model("gpt-4"));
    let text = article();

    for budget in [20, 40, 80] {
        let chunks = splitter.split(&text, budget);
        assert!(chunks.len() > 1, "budget {} should split the article", budget);
        for chunk in &chunks {
            let single_word = !chunk.text().trim().contains(char::is_whitespace);
            assert!(splitter.count(chunk.text()) <= budget || single_word);
        }
        assert_eq!(reassemble(&chunks), text);
    }
}

/// One long paragraph without punctuation is split by words in bounded time
#[test]
fn test_split_longUnpunctuatedParagraph_withBpeProfile_shouldFinishQuickly() {
    let splitter = ChunkSplitter::new(Arc::new(TokenCounter::new()), ModelProfile::for_model("gpt-4o"));
    let text = (0..9000).map(|i| format!("слово{}", i)).collect::<Vec<_>>().join(" ");
    // loads the encoding outside the timed section
    let total = splitter.count(&text);
    assert!(total > 12_000);

    let started = Instant::now();
    let chunks = splitter.split(&text, 4000);
    let elapsed = started.elapsed();

    assert!(elapsed < Duration::from_secs(60), "splitting took {:?}", elapsed);
    assert!(chunks.len() >= total.div_ceil(4000));
    for chunk in &chunks {
        assert!(splitter.count(chunk.text()) <= 4000);
    }
    assert_eq!(reassemble(&chunks), text);
}

/// Chunks never start or end inside a word
#[test]
fn test_split_wordBoundaries_shouldBeKept() {
    let splitter = heuristic_splitter();
    let text = article();
    let chunks = splitter.split(&text, 15);

    assert!(chunks.len() > 3);
    let chunk_words: Vec<&str> = chunks.iter().flat_map(|c| c.text().split_whitespace()).collect();
    let source_words: Vec<&str> = text.split_whitespace().collect();
    assert_eq!(chunk_words, source_words);
}

/// A text within budget is sent as one chunk, even with surrounding blank lines
#[test]
fn test_split_smallText_shouldBeSingleChunk() {
    let splitter = heuristic_splitter();
    let text = "\n\nКороткий текст про БПЛА.\n";
    let chunks = splitter.split(text, 4000);

    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].text(), text);
    assert!(chunks[0].is_last());
}

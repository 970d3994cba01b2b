/*!
 * Cleaning of extracted document text.
 *
 * Removes the parts of a scientific paper that only add noise to term
 * extraction (bibliography, figure captions, author names, stray symbols)
 * and normalises whitespace. Paragraph breaks survive cleaning so the
 * splitter can still cut on them.
 */

use log::debug;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

static LITERATURE_HEADING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?im)^[ \t]*(?:литература|список\s+(?:использованн\w+\s+)?(?:литературы|источников)|библиографический\s+список|references)\b",
    )
    .unwrap()
});
static FIGURES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)Рисунок\s+\d+.*?\.|\bРис\.\s*\d+.*?\.").unwrap());
static AUTHOR_NAMES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\b[А-ЯЁ][а-яё]+[ \t]+[А-ЯЁ]\.[ \t]*[А-ЯЁ]\.|[А-ЯЁ]\.[ \t]*[А-ЯЁ]\.[ \t]+[А-ЯЁ][а-яё]+|[А-ЯЁ][а-яё]+[ \t]+и[ \t]+[А-ЯЁ][а-яё]+",
    )
    .unwrap()
});
static DASHES_UNDERSCORES: Lazy<Regex> = Lazy::new(|| Regex::new(r"[-_–—]+").unwrap());
static SPECIAL_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[^\w\s.,!?;:()\-"«»]"#).unwrap());
static REPEATED_PUNCTUATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\.{2,}|,{2,}|!{2,}|\?{2,}|;{2,}").unwrap());
static SPACE_BEFORE_PUNCTUATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[ \t]+([.,!?;:])").unwrap());
static INLINE_WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t\r\x0B\x0C]+").unwrap());
static LINE_EDGES: Lazy<Regex> = Lazy::new(|| Regex::new(r" ?\n ?").unwrap());
static BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

/// Length of the text after each cleaning stage, in characters
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CleaningStats {
    pub original_len: usize,
    pub stages: Vec<(&'static str, usize)>,
}

impl CleaningStats {
    pub fn final_len(&self) -> usize {
        self.stages.last().map_or(self.original_len, |(_, len)| *len)
    }

    /// Share of the original text removed, in percent
    pub fn reduction_percent(&self) -> f64 {
        if self.original_len == 0 {
            return 0.0;
        }
        (1.0 - self.final_len() as f64 / self.original_len as f64) * 100.0
    }
}

/// Regex-based cleaner for extracted document text
#[derive(Debug, Clone, Copy, Default)]
pub struct TextCleaner;

impl TextCleaner {
    pub fn new() -> Self {
        Self
    }

    /// Drop the bibliography section and everything after it
    pub fn remove_literature_section<'a>(&self, text: &'a str) -> &'a str {
        match LITERATURE_HEADING.find(text) {
            Some(m) => &text[..m.start()],
            None => text,
        }
    }

    /// Drop figure captions and references such as `Рис. 3 ...`
    pub fn remove_figures(&self, text: &str) -> String {
        FIGURES.replace_all(text, "").into_owned()
    }

    /// Drop author names (`Иванов И. И.`, `И. И. Иванов`, `Иванов и Петров`)
    pub fn remove_names(&self, text: &str) -> String {
        AUTHOR_NAMES.replace_all(text, "").into_owned()
    }

    /// Clean text
    pub fn clean(&self, text: &str) -> String {
        self.clean_with_stats(text).0
    }

    /// Clean text and report the length after each stage
    pub fn clean_with_stats(&self, text: &str) -> (String, CleaningStats) {
        let mut stats = CleaningStats {
            original_len: text.chars().count(),
            stages: Vec::new(),
        };
        if text.is_empty() {
            return (String::new(), stats);
        }

        let mut record = |name: &'static str, current: &str| {
            let len = current.chars().count();
            debug!("After {}: {} chars", name, len);
            stats.stages.push((name, len));
        };

        let mut current = self.remove_literature_section(text).to_string();
        record("literature", &current);

        current = self.remove_figures(&current);
        record("figures", &current);

        current = self.remove_names(&current);
        record("names", &current);

        current = DASHES_UNDERSCORES.replace_all(&current, " ").into_owned();
        record("dashes", &current);

        current = SPECIAL_CHARS.replace_all(&current, " ").into_owned();
        record("special characters", &current);

        current = REPEATED_PUNCTUATION
            .replace_all(&current, |caps: &Captures| caps[0][..1].to_string())
            .into_owned();
        current = SPACE_BEFORE_PUNCTUATION.replace_all(&current, "$1").into_owned();
        current = INLINE_WHITESPACE.replace_all(&current, " ").into_owned();
        current = LINE_EDGES.replace_all(&current, "\n").into_owned();
        current = BLANK_LINES.replace_all(&current, "\n\n").into_owned();
        current = current.trim().to_string();
        record("whitespace", &current);

        (current, stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_literatureHeading_shouldCutRest() {
        let text = "Основной текст про БПЛА.\n\nСписок литературы\n1. Иванов И. И. Книга.";
        assert_eq!(TextCleaner::new().clean(text), "Основной текст про БПЛА.");
    }

    #[test]
    fn test_clean_literatureWordInsideSentence_shouldKeepText() {
        let text = "Обзор показывает, что литература по теме обширна.";
        assert_eq!(TextCleaner::new().clean(text), text);
    }

    #[test]
    fn test_clean_figures_shouldBeRemoved() {
        let text = "Схема показана ниже. Рисунок 2 Схема БПЛА. Далее текст.";
        assert_eq!(TextCleaner::new().clean(text), "Схема показана ниже. Далее текст.");
    }

    #[test]
    fn test_clean_authorNames_shouldBeRemoved() {
        let cleaner = TextCleaner::new();
        assert_eq!(cleaner.clean("Автор: Петров А. В. пишет"), "Автор: пишет");
        assert_eq!(cleaner.clean("В работе А. В. Петров показал"), "В работе показал");
    }

    #[test]
    fn test_clean_punctuationAndSymbols_shouldNormalize() {
        let text = "Дрон___летит!!! Быстро , очень...  высоко @ #";
        assert_eq!(TextCleaner::new().clean(text), "Дрон летит! Быстро, очень. высоко");
    }

    #[test]
    fn test_clean_paragraphBreaks_shouldBePreserved() {
        let text = "Первый абзац.  \n \n\n\n  Второй абзац.\nСтрока.";
        assert_eq!(TextCleaner::new().clean(text), "Первый абзац.\n\nВторой абзац.\nСтрока.");
    }

    #[test]
    fn test_cleanWithStats_shouldTrackReduction() {
        let (cleaned, stats) = TextCleaner::new().clean_with_stats("Текст.\n\nЛитература\nмного ссылок");
        assert_eq!(cleaned, "Текст.");
        assert_eq!(stats.original_len, 31);
        assert_eq!(stats.final_len(), 6);
        assert!(stats.reduction_percent() > 80.0);
        assert_eq!(stats.stages.first().map(|(name, _)| *name), Some("literature"));
    }

    #[test]
    fn test_clean_empty_shouldStayEmpty() {
        let (cleaned, stats) = TextCleaner::new().clean_with_stats("");
        assert!(cleaned.is_empty());
        assert_eq!(stats.reduction_percent(), 0.0);
    }
}

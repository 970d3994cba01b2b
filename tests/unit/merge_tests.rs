/*!
 * Tests for merging chunk results into a glossary
 */

use droneterms::errors::ExtractionError;
use droneterms::extraction::{ChunkResult, ResultMerger, TermRecord};
use droneterms::providers::mock::MockProvider;
use crate::common;

/// The single-term response parses into exactly one record
#[test]
fn test_merge_uavResponse_shouldGiveOneRecord() {
    let glossary = ResultMerger::new()
        .merge(&[ChunkResult::Success(common::UAV_RESPONSE.to_string())])
        .unwrap();

    let records: Vec<&TermRecord> = glossary.records().collect();
    assert_eq!(
        records,
        vec![&TermRecord {
            term: "UAV".to_string(),
            definition: "unmanned vehicle".to_string(),
            translation: "БПЛА".to_string(),
            relevance: 95.0,
        }]
    );
}

/// Failed chunks are skipped while the rest still merge
#[test]
fn test_merge_mixedResults_shouldIgnoreFailures() {
    let results = vec![
        ChunkResult::Success(MockProvider::term_block("Автопилот", "Система управления", "autopilot", 92.0)),
        ChunkResult::Failed("Request timed out".to_string()),
        ChunkResult::Success(format!(
            "{}\n{}",
            MockProvider::term_block("Автопилот", "Бортовая система автоматического управления полётом", "autopilot", 92.0),
            MockProvider::term_block("Винт", "Лопастной движитель", "propeller", 75.0)
        )),
    ];

    let glossary = ResultMerger::new().merge(&results).unwrap();

    assert_eq!(glossary.len(), 2);
    assert_eq!(
        glossary.get("Автопилот").unwrap().definition,
        "Бортовая система автоматического управления полётом"
    );
    assert_eq!(glossary.above_threshold(80.0).len(), 1);
}

/// No successful chunk means no terms
#[test]
fn test_merge_noSuccess_shouldFail() {
    let result = ResultMerger::new().merge(&[ChunkResult::Failed("502".to_string())]);
    assert_eq!(result, Err(ExtractionError::AllChunksFailed(1)));
}

/*!
 * Integration tests for application lifecycle
 */

use anyhow::Result;
use std::sync::Arc;

use droneterms::app_config::Config;
use droneterms::app_controller::Controller;
use droneterms::errors::{AppError, ExtractionError};
use droneterms::extraction::CancellationFlag;
use droneterms::persistence::TermStore;
use droneterms::providers::mock::MockProvider;
use crate::common;

const DOCUMENT: &str = "Беспилотный летательный аппарат (БПЛА) управляется автопилотом.\n\n\
Рисунок 1 Общий вид аппарата.\n\n\
Наземная станция передаёт команды по радиоканалу.\n\n\
Список литературы\n\
1. Иванов И. И. Беспилотные системы.";

fn uav_controller(config: Config) -> (Controller, MockProvider) {
    let provider = MockProvider::working().with_custom_response(|_| common::UAV_RESPONSE.to_string());
    let controller = Controller::with_provider(config, Arc::new(provider.clone()));
    (controller, provider)
}

/// The configured backend is checked before any document is read
#[tokio::test]
async fn test_testConnection_withMock_shouldSucceed() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let (controller, provider) = uav_controller(common::test_config(temp_dir.path()));

    controller.test_connection().await?;
    assert_eq!(provider.request_count(), 0);
    Ok(())
}

/// Cleaning removes captions and the bibliography before extraction
#[test]
fn test_prepareText_shouldCleanDocument() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let (controller, _) = uav_controller(common::test_config(temp_dir.path()));

    let cleaned = controller.prepare_text(DOCUMENT);

    assert!(cleaned.starts_with("Беспилотный летательный аппарат (БПЛА)"));
    assert!(cleaned.contains("\n\nНаземная станция"));
    assert!(!cleaned.contains("Рисунок"));
    assert!(!cleaned.contains("литературы"));
    Ok(())
}

/// Cleaning can be switched off
#[test]
fn test_prepareText_cleaningDisabled_shouldKeepText() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let mut config = common::test_config(temp_dir.path());
    config.cleaning.enabled = false;
    let (controller, _) = uav_controller(config);

    assert_eq!(controller.prepare_text(DOCUMENT), DOCUMENT);
    Ok(())
}

/// One document goes all the way to CSV, term database and metrics
#[tokio::test]
async fn test_run_singleDocument_shouldPersistAndEvaluate() -> Result<()> {
    common::init_test_logging();
    let temp_dir = common::create_temp_dir()?;
    let config = common::test_config(temp_dir.path());
    let document = common::create_test_file(temp_dir.path(), "docs/article.txt", DOCUMENT)?;
    common::create_test_file(temp_dir.path(), "reference_terms/article.txt", "uav\nАвтопилот\n")?;
    let (controller, provider) = uav_controller(config.clone());

    let report = controller.run(document.clone()).await?;

    assert_eq!(provider.request_count(), 1);
    assert_eq!(report.glossary.len(), 1);
    assert!(report.summary.starts_with("1 terms from 1 chunks (0 failed)"));

    let csv_path = report.csv_path.expect("CSV should be written");
    let csv = std::fs::read_to_string(&csv_path)?;
    assert!(csv.starts_with("term,definition,translation,relevance\r\n"));
    assert!(csv.contains("UAV,unmanned vehicle,БПЛА,95"));

    let store_report = report.store.expect("term database should be updated");
    assert_eq!((store_report.added, store_report.updated), (1, 0));
    let stored = TermStore::new(&config.output.term_db_path).get("UAV").expect("UAV stored");
    assert_eq!(stored.relevance, 95.0);

    let scores = report.scores.expect("reference terms exist");
    assert_eq!(scores.precision, 1.0);
    assert_eq!(scores.recall, 0.5);
    Ok(())
}

/// Running the same document twice updates instead of adding
#[tokio::test]
async fn test_run_twice_shouldUpdateTermDatabase() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let document = common::create_test_file(temp_dir.path(), "article.txt", DOCUMENT)?;
    let (controller, _) = uav_controller(common::test_config(temp_dir.path()));

    controller.run(document.clone()).await?;
    let second = controller.run(document).await?;

    let store_report = second.store.expect("term database should be updated");
    assert_eq!((store_report.added, store_report.updated), (0, 1));
    assert!(second.scores.is_none());
    Ok(())
}

/// Saving can be disabled entirely
#[tokio::test]
async fn test_run_savingDisabled_shouldWriteNothing() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let mut config = common::test_config(temp_dir.path());
    config.output.save_csv = false;
    config.output.save_term_db = false;
    let document = common::create_test_file(temp_dir.path(), "article.txt", DOCUMENT)?;
    let (controller, _) = uav_controller(config);

    let report = controller.run(document).await?;

    assert!(report.csv_path.is_none());
    assert!(report.store.is_none());
    assert!(!temp_dir.path().join("results").exists());
    assert!(!temp_dir.path().join("db").exists());
    Ok(())
}

/// A document without text fails with no terms
#[tokio::test]
async fn test_run_blankDocument_shouldFailWithEmptyInput() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let document = common::create_test_file(temp_dir.path(), "blank.txt", "  \n\n @@@ \n")?;
    let (controller, provider) = uav_controller(common::test_config(temp_dir.path()));

    let error = controller.run(document).await.unwrap_err();

    assert_eq!(error.downcast_ref::<ExtractionError>(), Some(&ExtractionError::EmptyInput));
    assert_eq!(provider.request_count(), 0);
    Ok(())
}

/// Folder mode keeps going past failing documents
#[tokio::test]
async fn test_runFolder_withBlankDocument_shouldCountFailures() -> Result<()> {
    common::init_test_logging();
    let temp_dir = common::create_temp_dir()?;
    let docs = temp_dir.path().join("docs");
    common::create_test_file(&docs, "a.txt", DOCUMENT)?;
    common::create_test_file(&docs, "b.txt", "   ")?;
    common::create_test_file(&docs, "nested/c.md", DOCUMENT)?;
    common::create_test_file(&docs, "scan.pdf", "%PDF-1.4")?;
    let (controller, provider) = uav_controller(common::test_config(temp_dir.path()));

    let summary = controller.run_folder(docs).await?;

    assert_eq!(summary.processed, 2);
    assert_eq!(summary.failed, 1);
    assert_eq!(provider.request_count(), 2);
    Ok(())
}

/// Unsupported formats are rejected before any request is made
#[tokio::test]
async fn test_run_unsupportedFormat_shouldFail() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let document = common::create_test_file(temp_dir.path(), "paper.pdf", "%PDF-1.4")?;
    let (controller, provider) = uav_controller(common::test_config(temp_dir.path()));

    let error = controller.run(document).await.unwrap_err();

    assert!(error.to_string().contains("Unsupported document format"));
    assert!(matches!(error.downcast_ref::<AppError>(), Some(AppError::File(_))));
    assert_eq!(provider.request_count(), 0);
    Ok(())
}

/// A missing folder is reported as a file error
#[tokio::test]
async fn test_runFolder_missingDirectory_shouldFailWithFileError() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let (controller, _) = uav_controller(common::test_config(temp_dir.path()));

    let error = controller.run_folder(temp_dir.path().join("absent")).await.unwrap_err();

    assert!(matches!(error.downcast_ref::<AppError>(), Some(AppError::File(_))));
    Ok(())
}

/// An interrupt already raised stops the folder before the first document
#[tokio::test]
async fn test_runFolderWithCancel_alreadyCancelled_shouldProcessNothing() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let docs = temp_dir.path().join("docs");
    common::create_test_file(&docs, "a.txt", DOCUMENT)?;
    common::create_test_file(&docs, "b.txt", DOCUMENT)?;
    let (controller, provider) = uav_controller(common::test_config(temp_dir.path()));
    let cancel = CancellationFlag::new();
    cancel.cancel();

    let summary = controller.run_folder_with_cancel(docs, &cancel).await?;

    assert_eq!(summary.processed, 0);
    assert_eq!(summary.failed, 0);
    assert_eq!(provider.request_count(), 0);
    Ok(())
}

/// An interrupt during the first document leaves the remaining documents untouched
#[tokio::test]
async fn test_runFolderWithCancel_interruptDuringFirstDocument_shouldStopFolder() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let docs = temp_dir.path().join("docs");
    common::create_test_file(&docs, "a.txt", DOCUMENT)?;
    common::create_test_file(&docs, "b.txt", DOCUMENT)?;
    common::create_test_file(&docs, "c.txt", DOCUMENT)?;
    let cancel = CancellationFlag::new();
    let provider = Arc::new(common::InterruptingProvider::new(cancel.clone()));
    let controller = Controller::with_provider(common::test_config(temp_dir.path()), provider.clone());

    let summary = controller.run_folder_with_cancel(docs, &cancel).await?;

    assert_eq!(provider.calls(), 1);
    assert_eq!(summary.processed, 0);
    assert_eq!(summary.failed, 1);
    Ok(())
}

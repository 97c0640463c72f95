//! QA tests for snapshot save/load and resume.
//!
//! These tests verify that a run can be saved, inspected and continued
//! at chapter granularity.
//! Run with: `cargo test -p influence-core --test qa_persistence`

use influence_core::testing::sample_book;
use influence_core::{
    BookSession, BookSnapshot, Chapter, MockAnalyzer, PersistError, RouterState, RunOutcome,
    SessionConfig, SessionError,
};
use tempfile::TempDir;

fn five_chapters() -> Vec<Chapter> {
    vec![
        Chapter::new("ch1", "Jon Snow walked the wall.\n\nJon slept."),
        Chapter::new("ch2", "Bran Stark climbed the tower.\n\nJon followed Bran."),
        Chapter::new("ch3", "Arya ran."),
        Chapter::new("ch4", "Arya hid."),
        Chapter::new("ch5", "Arya fought."),
    ]
}

// =============================================================================
// TEST 1: Save and load a finished run
// =============================================================================

#[tokio::test]
async fn test_save_and_load_finished_run() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let save_path = temp_dir.path().join("run.json");

    let mut session =
        BookSession::new(sample_book(), SessionConfig::new(), MockAnalyzer::new()).unwrap();
    session.run().await;
    session.save(&save_path).await.expect("Failed to save");

    let loaded = BookSnapshot::load_json(&save_path)
        .await
        .expect("Failed to load");

    assert_eq!(loaded.run_id, session.run_id());
    assert_eq!(&loaded.state, session.state());
    assert_eq!(&loaded.diagnostics, session.diagnostics());
    assert_eq!(loaded.state.completed_chapters, vec!["ch1", "ch2", "ch3"]);
}

#[tokio::test]
async fn test_resume_finished_run_is_done() {
    let mut session =
        BookSession::new(sample_book(), SessionConfig::new(), MockAnalyzer::new()).unwrap();
    session.run().await;

    let mut resumed =
        BookSession::resume(session.snapshot(), SessionConfig::new(), MockAnalyzer::new()).unwrap();

    assert!(resumed.is_finished());
    assert!(matches!(
        resumed.step().await,
        Err(SessionError::AlreadyFinished)
    ));
}

// =============================================================================
// TEST 2: Resume after a failed chapter
// =============================================================================

#[tokio::test]
async fn test_resume_after_failure_reruns_failed_chapter() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let save_path = temp_dir.path().join("halted.json");
    let config = SessionConfig::new().with_max_chunk_chars(30);

    let mut failing = BookSession::new(
        five_chapters(),
        config.clone(),
        MockAnalyzer::new().failing_at("ch2", 1),
    )
    .unwrap();
    let report = failing.run().await;
    assert_eq!(report.outcome, RunOutcome::ChapterFailed);
    failing.save(&save_path).await.unwrap();

    let snapshot = BookSnapshot::load_json(&save_path).await.unwrap();
    let mut resumed = BookSession::resume(snapshot, config, MockAnalyzer::new()).unwrap();

    assert_eq!(resumed.run_id(), failing.run_id());
    assert_eq!(
        resumed.router_state(),
        RouterState::ProcessingChunk { chapter_index: 1 }
    );

    let report = resumed.run().await;
    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(
        report.completed_chapters,
        vec!["ch1", "ch2", "ch3", "ch4", "ch5"]
    );

    // ch2 is counted once even though its first chunk ran twice.
    let state = resumed.state();
    let jon = state.roster.find_by_alias("jon").unwrap().id.clone();
    let bran = state.roster.find_by_alias("bran").unwrap().id.clone();
    assert_eq!(state.mentions_of(&jon), 3);
    assert_eq!(state.mentions_of(&bran), 2);

    let requests = resumed.analyzer().requests().await;
    assert_eq!(requests[0].chapter_id, "ch2");
    assert_eq!(requests[0].chunk_index, 0);
}

#[tokio::test]
async fn test_resume_matches_uninterrupted_run() {
    let config = SessionConfig::new().with_max_chunk_chars(30);

    let mut straight =
        BookSession::new(five_chapters(), config.clone(), MockAnalyzer::new()).unwrap();
    straight.run().await;

    let mut failing = BookSession::new(
        five_chapters(),
        config.clone(),
        MockAnalyzer::new().failing_at("ch4", 0),
    )
    .unwrap();
    failing.run().await;
    let mut resumed =
        BookSession::resume(failing.snapshot(), config, MockAnalyzer::new()).unwrap();
    resumed.run().await;

    assert_eq!(resumed.state().roster, straight.state().roster);
    assert_eq!(resumed.state().book_mentions, straight.state().book_mentions);
    assert_eq!(
        resumed.state().book_appearances,
        straight.state().book_appearances
    );
    assert_eq!(
        resumed.state().chapter_summaries,
        straight.state().chapter_summaries
    );
}

// =============================================================================
// TEST 3: Rejected snapshots
// =============================================================================

#[tokio::test]
async fn test_version_mismatch_is_rejected() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let save_path = temp_dir.path().join("old.json");

    let session =
        BookSession::new(sample_book(), SessionConfig::new(), MockAnalyzer::new()).unwrap();
    let mut snapshot = session.snapshot();
    snapshot.version = 0;
    snapshot.save_json(&save_path).await.unwrap();

    let result = BookSnapshot::load_json(&save_path).await;
    assert!(matches!(
        result,
        Err(PersistError::VersionMismatch { found: 0, .. })
    ));
}

#[tokio::test]
async fn test_resume_rejects_out_of_order_chapters() {
    let mut session =
        BookSession::new(sample_book(), SessionConfig::new(), MockAnalyzer::new()).unwrap();
    session.run().await;

    let mut snapshot = session.snapshot();
    snapshot.state.completed_chapters = vec!["ch2".to_string()];

    let result = BookSession::resume(snapshot, SessionConfig::new(), MockAnalyzer::new());
    assert!(matches!(result, Err(SessionError::InvalidSnapshot(_))));
}

#[tokio::test]
async fn test_load_accepts_loader_field_names() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let save_path = temp_dir.path().join("handmade.json");

    let session =
        BookSession::new(sample_book(), SessionConfig::new(), MockAnalyzer::new()).unwrap();
    let mut value = serde_json::to_value(session.snapshot()).unwrap();
    for chapter in value["state"]["chapters"].as_array_mut().unwrap() {
        let id = chapter["id"].take();
        let object = chapter.as_object_mut().unwrap();
        object.remove("id");
        object.insert("chapter_id".to_string(), id);
    }
    tokio::fs::write(&save_path, value.to_string()).await.unwrap();

    let loaded = BookSnapshot::load_json(&save_path).await.unwrap();
    assert_eq!(loaded.state.chapters, sample_book());
}

#[tokio::test]
async fn test_load_rebuilds_tampered_alias_index() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let save_path = temp_dir.path().join("tampered.json");

    let mut session =
        BookSession::new(sample_book(), SessionConfig::new(), MockAnalyzer::new()).unwrap();
    session.run().await;
    let expected = session.state().roster.clone();

    let mut value = serde_json::to_value(session.snapshot()).unwrap();
    let index = value["state"]["roster"]["alias_index"]
        .as_object_mut()
        .unwrap();
    index.insert("jon".to_string(), serde_json::json!("char_404"));
    index.remove("arya");
    tokio::fs::write(&save_path, value.to_string()).await.unwrap();

    let loaded = BookSnapshot::load_json(&save_path).await.unwrap();
    assert_eq!(loaded.state.roster, expected);

    let jon = loaded.state.roster.find_by_alias("jon").unwrap();
    assert!(jon.matches_name("Jon Snow"));
    assert!(loaded.state.roster.find_by_alias("arya").is_some());

    let resumed =
        BookSession::resume(loaded, SessionConfig::new(), MockAnalyzer::new()).unwrap();
    assert!(resumed.is_finished());
}

//! Integration tests for state carried across engine restarts
//!
//! Each "run" builds a fresh orchestrator over a store loaded from the
//! same state file, the way the CLI does for every invocation.

use std::path::Path;
use std::sync::Arc;

use care_core::{
    Category, ConnectivityLevel, Directive, EngineConfig, EngineError, EventBus, FeatureId,
    FixedClock, MemoryStore, ProviderRegistry, ScoreSubmission, SupervisorOrchestrator,
};
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

struct Run {
    engine: SupervisorOrchestrator,
    store: Arc<MemoryStore>,
    events: broadcast::Receiver<care_core::CareEvent>,
}

/// Load the state file and build an engine with no providers
fn open(path: &Path, now: DateTime<Utc>) -> Run {
    let store = Arc::new(MemoryStore::load(path).unwrap());
    let bus = EventBus::new().shared();
    let events = bus.subscribe();
    let engine = SupervisorOrchestrator::new(
        EngineConfig::default(),
        Arc::new(ProviderRegistry::new(Vec::new())),
        store.clone(),
        bus,
    )
    .with_clock(Arc::new(FixedClock::new(now)));
    Run {
        engine,
        store,
        events,
    }
}

/// Apply emitted events and write the state file
async fn close(mut run: Run, path: &Path) {
    run.store.drain(&mut run.events).await;
    run.store.save(path).await.unwrap();
}

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 7, 22, 9, 0, 0).unwrap()
}

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 7, 22).unwrap()
}

fn submission(diet: i64) -> ScoreSubmission {
    ScoreSubmission::new("s1", today())
        .with_score(Category::Diet, diet)
        .with_score(Category::Exercise, 7)
        .with_score(Category::Medication, 8)
}

/// Test: duplicate submissions are rejected across restarts
#[tokio::test]
async fn test_duplicate_submission_after_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");

    let run = open(&path, start());
    run.engine.handle_score_submission(&submission(2)).await.unwrap();
    close(run, &path).await;

    let run = open(&path, start() + Duration::hours(3));
    let err = run
        .engine
        .handle_score_submission(&submission(9))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::DuplicateSubmission { .. }));
}

/// Test: cooldown is honored from persisted recommendations alone
#[tokio::test]
async fn test_cooldown_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");

    let run = open(&path, start());
    run.store
        .add_directive(Directive::new("d1", "s1", Category::Diet, "Cook at home"))
        .await;
    let first = run
        .engine
        .handle_score_submission(&submission(2))
        .await
        .unwrap();
    let first_rec = first.recommendation.unwrap();
    assert_eq!(first_rec.recommended_feature.as_str(), FeatureId::DIET_LOGISTICS);
    close(run, &path).await;

    let run = open(&path, start() + Duration::minutes(1));
    let outcome = run
        .engine
        .handle_subject_message("s1", "hi", ConnectivityLevel::Offline, &CancellationToken::new())
        .await
        .unwrap();
    assert!(!outcome.recommendation_is_new);
    assert_eq!(outcome.recommendation.unwrap().id, first_rec.id);
    close(run, &path).await;

    let run = open(&path, start() + Duration::minutes(6));
    let outcome = run
        .engine
        .handle_subject_message("s1", "hi", ConnectivityLevel::Offline, &CancellationToken::new())
        .await
        .unwrap();
    assert!(outcome.recommendation_is_new);
    close(run, &path).await;

    let snapshot = MemoryStore::load(&path).unwrap().snapshot().await;
    assert_eq!(snapshot.recommendations["s1"].len(), 2);
}

/// Test: emergency alerts are persisted for the care team
#[tokio::test]
async fn test_alert_persisted() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");

    let run = open(&path, start());
    run.engine
        .handle_subject_message(
            "s1",
            "I want to end it all",
            ConnectivityLevel::Full,
            &CancellationToken::new(),
        )
        .await
        .unwrap();
    close(run, &path).await;

    let snapshot = MemoryStore::load(&path).unwrap().snapshot().await;
    assert_eq!(snapshot.alerts.len(), 1);
    assert_eq!(snapshot.alerts[0].event_type(), "emergency_alert");
    assert_eq!(
        snapshot.feature_usage["s1"][&FeatureId::from(FeatureId::EMERGENCY_DETECTION)],
        1
    );
}

//! Orchestrator runs against synthetic night directories and the in-memory
//! archive.

use archive_common::{
    BlockVisit, DateRange, Institution, Instrument, ObservationStatus, ProposalRecord,
};
use ingester::{ErrorPolicy, FileOutcome, Orchestrator, RunOptions, Selection, Task};
use ingestion::{DerivationContext, ExposureDeriver, FilterCurveLibrary, InstrumentRegistry};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use storage::{Archive, MemoryArchive, StaticScienceDatabase, UpdateScope, WriteOutcome};
use test_utils::{night, night_raw_dir, FitsFixture, BLOCK_VISIT_ID, PROPOSAL_CODE};

fn orchestrator(
    base: &Path,
    archive: &MemoryArchive,
    science: StaticScienceDatabase,
    options: RunOptions,
) -> Orchestrator {
    let deriver = ExposureDeriver::new(
        InstrumentRegistry::builtin().unwrap(),
        DerivationContext::new(FilterCurveLibrary::new(base.join("filter_curves"))),
        base,
    );
    Orchestrator::new(deriver, Arc::new(archive.clone()), Arc::new(science), options)
}

fn options(task: Task) -> RunOptions {
    RunOptions {
        task,
        ..RunOptions::default()
    }
}

fn june_15() -> Selection {
    Selection::Nights {
        range: DateRange::single(night(2021, 6, 15)),
        instruments: vec![],
    }
}

/// One RSS spectrum, one HRS exposure and one Salticam image on 2021-06-15.
fn write_night(base: &Path) {
    let night = night(2021, 6, 15);
    FitsFixture::rss_spectroscopy().write_night(base, night).unwrap();
    FitsFixture::hrs('R').write_night(base, night).unwrap();
    FitsFixture::salticam("OPEN").write_night(base, night).unwrap();
}

fn block_visit(status: ObservationStatus) -> BlockVisit {
    BlockVisit {
        id: BLOCK_VISIT_ID,
        proposal: ProposalRecord {
            code: PROPOSAL_CODE.to_string(),
            institution: Institution::Salt,
            title: Some("Dwarf galaxies in the Pavo group".to_string()),
            principal_investigator: Some("Nomvula Dlamini".to_string()),
            investigators: vec!["1203".to_string()],
        },
        status,
        data_release: night(2099, 1, 1),
        meta_release: night(2099, 1, 1),
        target_type: Some("14.06.16.03".to_string()),
    }
}

// ============================================================================
// Insert
// ============================================================================

#[tokio::test]
async fn test_insert_night_then_rerun_is_idempotent() {
    let base = tempfile::tempdir().unwrap();
    write_night(base.path());
    let archive = MemoryArchive::new();
    let run = orchestrator(
        base.path(),
        &archive,
        StaticScienceDatabase::new(),
        options(Task::Insert),
    );

    let first = run.run(&june_15(), base.path()).await.unwrap();
    assert!(first.is_success());
    assert_eq!(first.created, 3);

    let second = run.run(&june_15(), base.path()).await.unwrap();
    assert_eq!(second.created, 0);
    assert_eq!(second.already_present, 3);
    assert_eq!(archive.observation_count().await, 3);
    assert_eq!(archive.proposal_count().await, 1);
}

#[tokio::test]
async fn test_instrument_filter() {
    let base = tempfile::tempdir().unwrap();
    write_night(base.path());
    let archive = MemoryArchive::new();
    let run = orchestrator(
        base.path(),
        &archive,
        StaticScienceDatabase::new(),
        options(Task::Insert),
    );
    let selection = Selection::Nights {
        range: DateRange::single(night(2021, 6, 15)),
        instruments: vec![Instrument::Hrs],
    };

    let summary = run.run(&selection, base.path()).await.unwrap();
    assert_eq!(summary.created, 1);
    assert!(archive
        .contains_artifact("salt/data/2021/0615/hrs/raw/R202106150012.fits")
        .await
        .unwrap());
}

#[tokio::test]
async fn test_block_visit_from_science_database() {
    let base = tempfile::tempdir().unwrap();
    let path = FitsFixture::rss_spectroscopy()
        .write_night(base.path(), night(2021, 6, 15))
        .unwrap();
    let archive = MemoryArchive::new();
    let science = StaticScienceDatabase::new().with_visit(block_visit(ObservationStatus::Rejected));
    let run = orchestrator(base.path(), &archive, science, options(Task::Insert));

    let outcome = run.process_file(&path).await.unwrap();
    assert!(matches!(outcome, FileOutcome::Written(WriteOutcome::Created { .. })));

    let graph = archive
        .observation("salt/data/2021/0615/rss/raw/P202106150042.fits")
        .await
        .unwrap();
    assert_eq!(graph.observation.status, ObservationStatus::Rejected);
    assert_eq!(graph.observation.data_release, night(2099, 1, 1));
    assert_eq!(graph.position.unwrap().owners, Some(vec!["1203".to_string()]));
}

#[tokio::test]
async fn test_ignored_files_are_not_failures() {
    let base = tempfile::tempdir().unwrap();
    FitsFixture::hrs('H')
        .with("PROPID", "ENG_HRS")
        .write_night(base.path(), night(2021, 6, 15))
        .unwrap();
    let archive = MemoryArchive::new();
    let run = orchestrator(
        base.path(),
        &archive,
        StaticScienceDatabase::new(),
        options(Task::Insert),
    );

    let summary = run.run(&june_15(), base.path()).await.unwrap();
    assert!(summary.is_success());
    assert_eq!(summary.ignored, 1);
    assert_eq!(archive.observation_count().await, 0);
}

// ============================================================================
// Error policy
// ============================================================================

fn write_broken_file(base: &Path) {
    let dir = night_raw_dir(base, night(2021, 6, 15), "rss");
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("P202106150001.fits"), b"not a FITS file").unwrap();
}

#[tokio::test]
async fn test_abort_policy_stops_after_first_failure() {
    let base = tempfile::tempdir().unwrap();
    FitsFixture::rss_spectroscopy()
        .write_night(base.path(), night(2021, 6, 15))
        .unwrap();
    write_broken_file(base.path());
    let archive = MemoryArchive::new();
    let selection = Selection::Nights {
        range: DateRange::single(night(2021, 6, 15)),
        instruments: vec![Instrument::Rss],
    };
    let run = orchestrator(
        base.path(),
        &archive,
        StaticScienceDatabase::new(),
        options(Task::Insert),
    );

    let summary = run.run(&selection, base.path()).await.unwrap();
    assert!(!summary.is_success());
    assert_eq!(summary.failed(), 1);
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.created, 0);
    assert!(summary.failures[0].0.ends_with("P202106150001.fits"));
}

#[tokio::test]
async fn test_continue_policy_processes_remaining_files() {
    let base = tempfile::tempdir().unwrap();
    FitsFixture::rss_spectroscopy()
        .write_night(base.path(), night(2021, 6, 15))
        .unwrap();
    write_broken_file(base.path());
    let archive = MemoryArchive::new();
    let run = orchestrator(
        base.path(),
        &archive,
        StaticScienceDatabase::new(),
        RunOptions {
            policy: ErrorPolicy::Continue,
            workers: 4,
            ..RunOptions::default()
        },
    );

    let summary = run.run(&june_15(), base.path()).await.unwrap();
    assert_eq!(summary.failed(), 1);
    assert_eq!(summary.created, 1);
    assert_eq!(summary.skipped, 0);
}

#[tokio::test]
async fn test_missing_keyword_fails_only_that_file() {
    let base = tempfile::tempdir().unwrap();
    FitsFixture::rss_spectroscopy()
        .without("AR-ANGLE")
        .write_night(base.path(), night(2021, 6, 15))
        .unwrap();
    FitsFixture::hrs('R')
        .write_night(base.path(), night(2021, 6, 15))
        .unwrap();
    let archive = MemoryArchive::new();
    let run = orchestrator(
        base.path(),
        &archive,
        StaticScienceDatabase::new(),
        RunOptions {
            policy: ErrorPolicy::Continue,
            ..RunOptions::default()
        },
    );

    let summary = run.run(&june_15(), base.path()).await.unwrap();
    assert_eq!(summary.created, 1);
    assert_eq!(summary.failed(), 1);
    assert!(summary.failures[0].1.contains("AR-ANGLE"));
}

// ============================================================================
// Update and delete
// ============================================================================

#[tokio::test]
async fn test_update_before_insert_fails() {
    let base = tempfile::tempdir().unwrap();
    let path = FitsFixture::hrs('R')
        .write_night(base.path(), night(2021, 6, 15))
        .unwrap();
    let archive = MemoryArchive::new();
    let run = orchestrator(
        base.path(),
        &archive,
        StaticScienceDatabase::new(),
        options(Task::Update),
    );

    let summary = run.run(&Selection::File(path), base.path()).await.unwrap();
    assert_eq!(summary.failed(), 1);
    assert!(summary.failures[0].1.contains("No observation found"));
    assert_eq!(archive.observation_count().await, 0);
}

#[tokio::test]
async fn test_update_status_scope() {
    let base = tempfile::tempdir().unwrap();
    let path = FitsFixture::rss_spectroscopy()
        .write_night(base.path(), night(2021, 6, 15))
        .unwrap();
    let archive = MemoryArchive::new();
    orchestrator(
        base.path(),
        &archive,
        StaticScienceDatabase::new().with_visit(block_visit(ObservationStatus::InQueue)),
        options(Task::Insert),
    )
    .process_file(&path)
    .await
    .unwrap();

    let update = orchestrator(
        base.path(),
        &archive,
        StaticScienceDatabase::new().with_visit(block_visit(ObservationStatus::Accepted)),
        RunOptions {
            task: Task::Update,
            scope: UpdateScope::Status,
            ..RunOptions::default()
        },
    );
    let outcome = update.process_file(&path).await.unwrap();
    assert!(matches!(
        outcome,
        FileOutcome::Written(WriteOutcome::Updated { scope: UpdateScope::Status, .. })
    ));

    let graph = archive
        .observation("salt/data/2021/0615/rss/raw/P202106150042.fits")
        .await
        .unwrap();
    assert_eq!(graph.observation.status, ObservationStatus::Accepted);
}

#[tokio::test]
async fn test_delete_removes_and_reports_absent() {
    let base = tempfile::tempdir().unwrap();
    write_night(base.path());
    let archive = MemoryArchive::new();
    orchestrator(
        base.path(),
        &archive,
        StaticScienceDatabase::new(),
        options(Task::Insert),
    )
    .run(&june_15(), base.path())
    .await
    .unwrap();

    let delete = orchestrator(
        base.path(),
        &archive,
        StaticScienceDatabase::new(),
        options(Task::Delete),
    );
    let summary = delete.run(&june_15(), base.path()).await.unwrap();
    assert_eq!(summary.removed, 3);
    assert_eq!(archive.observation_count().await, 0);
    assert_eq!(archive.proposal_count().await, 1);

    let again = delete.run(&june_15(), base.path()).await.unwrap();
    assert_eq!(again.absent, 3);
    assert!(again.is_success());
}

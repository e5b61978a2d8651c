//! Archive writer behaviour: idempotent create, scoped update, remove.
//!
//! The in-memory archive tests always run. The PostgreSQL tests need
//! `TEST_DATABASE_URL` and use fresh artifact paths and proposal codes so they
//! can share one scratch database.

use archive_common::{
    ArchiveError, Artifact, DataProductType, Energy, Institution, Instrument, Intent,
    Observation, ObservationGraph, ObservationGroup, ObservationStatus, Plane, Polarization,
    Position, ProductType, ProposalRecord, StokesParameter, Target, Telescope,
};
use chrono::NaiveDate;
use std::collections::BTreeMap;
use storage::{Archive, MemoryArchive, PgArchive, UpdateScope, WriteMode, WriteOutcome};
use test_utils::require_database;
use uuid::Uuid;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn proposal(code: &str, investigators: &[&str]) -> ProposalRecord {
    ProposalRecord {
        code: code.to_string(),
        institution: Institution::Salt,
        title: Some("Dwarf galaxies in the Pavo group".to_string()),
        principal_investigator: Some("Nomvula Dlamini".to_string()),
        investigators: investigators.iter().map(|s| s.to_string()).collect(),
    }
}

/// A science spectrum of `proposal`, stored at `path`.
fn graph(path: &str, proposal: Option<ProposalRecord>) -> ObservationGraph {
    let mut setup = BTreeMap::new();
    setup.insert("grating".to_string(), "PG0900".to_string());
    ObservationGraph {
        observation: Observation {
            data_release: date(2099, 6, 16),
            meta_release: date(2099, 6, 16),
            intent: Intent::Science,
            status: ObservationStatus::Accepted,
            instrument: Instrument::Rss,
            telescope: Telescope::Salt,
            group: Some(ObservationGroup {
                identifier: "71234".to_string(),
                name: "SALT-71234".to_string(),
            }),
            instrument_setup: setup,
        },
        proposal,
        target: Some(Target {
            name: "NGC 6744".to_string(),
            target_type: "14.06.16.03".to_string(),
            standard: false,
            moving: false,
        }),
        plane: Plane {
            product_id: path.rsplit('/').next().unwrap_or(path).to_string(),
            data_product_type: DataProductType::Spectrum,
        },
        energy: Some(Energy::from_interval(4.25e-7, 7.3e-7, 3048, Some(1019.8), 1e-10).unwrap()),
        polarization: None,
        position: Some(Position::new(287.44, -63.86, 2000.0).unwrap()),
        time: None,
        artifact: Artifact {
            identifier: Uuid::new_v4(),
            name: path.rsplit('/').next().unwrap_or(path).to_string(),
            path: path.to_string(),
            content_length: 5760,
            content_checksum: "ab".repeat(32),
            product_type: ProductType::Science,
        },
    }
}

fn unique_path() -> String {
    format!("salt/data/2021/0615/rss/raw/P{}.fits", Uuid::new_v4().simple())
}

fn unique_code() -> String {
    format!("2021-1-SCI-{}", &Uuid::new_v4().simple().to_string()[..8])
}

// ============================================================================
// In-memory archive: create
// ============================================================================

#[tokio::test]
async fn test_create_is_idempotent() {
    let archive = MemoryArchive::new();
    let graph = graph("salt/data/a.fits", Some(proposal("2021-1-SCI-008", &["1203"])));

    let first = archive.write(&graph, WriteMode::Create).await.unwrap();
    let second = archive.write(&graph, WriteMode::Create).await.unwrap();

    assert!(matches!(first, WriteOutcome::Created { .. }));
    assert_eq!(second, WriteOutcome::AlreadyPresent);
    assert_eq!(archive.observation_count().await, 1);
    assert_eq!(archive.artifact_count().await, 1);
}

#[tokio::test]
async fn test_concurrent_creates_converge() {
    let archive = MemoryArchive::new();
    let graph = graph("salt/data/a.fits", None);

    let (a, b) = tokio::join!(archive.create(&graph), archive.create(&graph));
    let outcomes = [a.unwrap(), b.unwrap()];
    assert_eq!(
        outcomes
            .iter()
            .filter(|o| matches!(o, WriteOutcome::Created { .. }))
            .count(),
        1
    );
    assert!(outcomes.contains(&WriteOutcome::AlreadyPresent));
    assert_eq!(archive.observation_count().await, 1);
}

#[tokio::test]
async fn test_entities_are_shared() {
    let archive = MemoryArchive::new();
    let code = "2021-1-SCI-008";
    archive
        .create(&graph("salt/data/a.fits", Some(proposal(code, &["1203"]))))
        .await
        .unwrap();
    archive
        .create(&graph("salt/data/b.fits", Some(proposal(code, &["877"]))))
        .await
        .unwrap();

    assert_eq!(archive.observation_count().await, 2);
    assert_eq!(archive.proposal_count().await, 1);
    assert_eq!(archive.institution_count().await, 1);
    assert_eq!(archive.telescope_count().await, 1);
    assert_eq!(archive.target_count().await, 1);

    let stored = archive.proposal(code, Institution::Salt).await.unwrap();
    assert_eq!(stored.investigators, vec!["1203".to_string(), "877".to_string()]);
}

#[tokio::test]
async fn test_target_types_are_shared_between_targets() {
    let archive = MemoryArchive::new();
    let first = graph("salt/data/a.fits", None);
    let mut second = graph("salt/data/b.fits", None);
    if let Some(target) = second.target.as_mut() {
        target.name = "NGC 6753".to_string();
    }
    archive.create(&first).await.unwrap();
    archive.create(&second).await.unwrap();

    assert_eq!(archive.target_count().await, 2);
    assert_eq!(archive.target_type_count().await, 1);
}

#[tokio::test]
async fn test_invalid_graph_writes_nothing() {
    let archive = MemoryArchive::new();
    let mut graph = graph("salt/data/a.fits", None);
    graph.observation.meta_release = date(2100, 1, 1);

    let err = archive.create(&graph).await.unwrap_err();
    assert!(matches!(err, ArchiveError::InvalidRecord(_)));
    assert_eq!(archive.observation_count().await, 0);
    assert_eq!(archive.telescope_count().await, 0);
}

#[tokio::test]
async fn test_position_owners_follow_proprietary_period() {
    let archive = MemoryArchive::new();
    let proprietary = graph("salt/data/a.fits", Some(proposal("2021-1-SCI-008", &["877", "1203"])));
    let mut public = graph("salt/data/b.fits", Some(proposal("2021-1-SCI-008", &[])));
    public.observation.data_release = date(2001, 1, 1);
    public.observation.meta_release = date(2001, 1, 1);
    archive.create(&proprietary).await.unwrap();
    archive.create(&public).await.unwrap();

    let stored = archive.observation("salt/data/a.fits").await.unwrap();
    assert_eq!(
        stored.position.unwrap().owners,
        Some(vec!["1203".to_string(), "877".to_string()])
    );
    let stored = archive.observation("salt/data/b.fits").await.unwrap();
    assert_eq!(stored.position.unwrap().owners, None);
}

// ============================================================================
// In-memory archive: update
// ============================================================================

#[tokio::test]
async fn test_update_without_create_fails() {
    let archive = MemoryArchive::new();
    let graph = graph("salt/data/a.fits", Some(proposal("2021-1-SCI-008", &["1203"])));

    for scope in UpdateScope::ALL {
        let err = archive.update(&graph, *scope).await.unwrap_err();
        assert!(matches!(err, ArchiveError::ObservationNotFound(path) if path == "salt/data/a.fits"));
    }
    assert_eq!(archive.observation_count().await, 0);
    assert_eq!(archive.proposal_count().await, 0);
    assert_eq!(archive.telescope_count().await, 0);
}

#[tokio::test]
async fn test_update_status_only() {
    let archive = MemoryArchive::new();
    let original = graph("salt/data/a.fits", None);
    archive.create(&original).await.unwrap();

    let mut changed = original.clone();
    changed.observation.status = ObservationStatus::Rejected;
    changed.observation.data_release = date(2098, 1, 1);
    let outcome = archive
        .write(&changed, WriteMode::Update(UpdateScope::Status))
        .await
        .unwrap();
    assert!(matches!(outcome, WriteOutcome::Updated { scope: UpdateScope::Status, .. }));

    let stored = archive.observation("salt/data/a.fits").await.unwrap();
    assert_eq!(stored.observation.status, ObservationStatus::Rejected);
    assert_eq!(stored.observation.data_release, original.observation.data_release);
}

#[tokio::test]
async fn test_update_all_keeps_artifact_identifier() {
    let archive = MemoryArchive::new();
    let original = graph("salt/data/a.fits", None);
    archive.create(&original).await.unwrap();

    let mut changed = graph("salt/data/a.fits", None);
    changed.energy = None;
    changed.artifact.content_checksum = "cd".repeat(32);
    archive.update(&changed, UpdateScope::All).await.unwrap();

    let stored = archive.observation("salt/data/a.fits").await.unwrap();
    assert!(stored.energy.is_none());
    assert_eq!(stored.artifact.content_checksum, "cd".repeat(32));
    assert_eq!(stored.artifact.identifier, original.artifact.identifier);
}

#[tokio::test]
async fn test_update_investigators_replaces_list_and_owners() {
    let archive = MemoryArchive::new();
    let code = "2021-1-SCI-008";
    archive
        .create(&graph("salt/data/a.fits", Some(proposal(code, &["1203", "877"]))))
        .await
        .unwrap();

    let changed = graph("salt/data/a.fits", Some(proposal(code, &["2001"])));
    archive.update(&changed, UpdateScope::Investigators).await.unwrap();

    let stored = archive.proposal(code, Institution::Salt).await.unwrap();
    assert_eq!(stored.investigators, vec!["2001".to_string()]);
    let observation = archive.observation("salt/data/a.fits").await.unwrap();
    assert_eq!(observation.position.unwrap().owners, Some(vec!["2001".to_string()]));
}

#[tokio::test]
async fn test_update_release_dates_makes_position_public() {
    let archive = MemoryArchive::new();
    let original = graph("salt/data/a.fits", Some(proposal("2021-1-SCI-008", &["1203"])));
    archive.create(&original).await.unwrap();

    let mut released = original.clone();
    released.observation.data_release = date(2002, 1, 1);
    released.observation.meta_release = date(2001, 1, 1);
    archive.update(&released, UpdateScope::ReleaseDates).await.unwrap();

    let stored = archive.observation("salt/data/a.fits").await.unwrap();
    assert_eq!(stored.observation.meta_release, date(2001, 1, 1));
    assert_eq!(stored.position.unwrap().owners, None);
}

// ============================================================================
// In-memory archive: remove
// ============================================================================

#[tokio::test]
async fn test_remove_keeps_shared_entities() {
    let archive = MemoryArchive::new();
    let code = "2021-1-SCI-008";
    archive
        .create(&graph("salt/data/a.fits", Some(proposal(code, &["1203"]))))
        .await
        .unwrap();
    archive
        .create(&graph("salt/data/b.fits", Some(proposal(code, &["1203"]))))
        .await
        .unwrap();
    let proposal_id = archive.proposal_id(code, Institution::Salt).await;

    let outcome = archive.remove("salt/data/a.fits").await.unwrap();
    assert!(matches!(outcome, WriteOutcome::Removed { .. }));

    assert!(!archive.contains_artifact("salt/data/a.fits").await.unwrap());
    assert!(archive.contains_artifact("salt/data/b.fits").await.unwrap());
    assert!(archive.observation("salt/data/b.fits").await.is_some());
    assert_eq!(archive.observation_count().await, 1);
    assert_eq!(archive.proposal_id(code, Institution::Salt).await, proposal_id);
    assert_eq!(archive.institution_count().await, 1);
    assert_eq!(archive.telescope_count().await, 1);
}

#[tokio::test]
async fn test_remove_absent_file() {
    let archive = MemoryArchive::new();
    assert_eq!(
        archive.remove("salt/data/never.fits").await.unwrap(),
        WriteOutcome::Absent
    );
}

#[tokio::test]
async fn test_recreate_after_remove() {
    let archive = MemoryArchive::new();
    let graph = graph("salt/data/a.fits", None);
    archive.create(&graph).await.unwrap();
    archive.write(&graph, WriteMode::Remove).await.unwrap();
    let outcome = archive.create(&graph).await.unwrap();
    assert!(matches!(outcome, WriteOutcome::Created { .. }));
}

// ============================================================================
// PostgreSQL archive
// ============================================================================

async fn pg_archive(url: &str) -> PgArchive {
    let archive = PgArchive::connect(url, 5).await.unwrap();
    archive.migrate().await.unwrap();
    archive
}

async fn count(archive: &PgArchive, sql: &str, key: &str) -> i64 {
    sqlx::query_scalar::<_, i64>(sql)
        .bind(key)
        .fetch_one(archive.pool())
        .await
        .unwrap()
}

const OBSERVATIONS_AT_PATH: &str = "SELECT COUNT(*) FROM artifact a \
    JOIN plane p ON p.id = a.plane_id \
    JOIN observation o ON o.id = p.observation_id WHERE a.path = $1";

const OBSERVATIONS_OF_PROPOSAL: &str = "SELECT COUNT(*) FROM observation o \
    JOIN proposal pr ON pr.id = o.proposal_id WHERE pr.code = $1";

#[tokio::test]
async fn test_pg_migrate_twice() {
    let url = require_database!();
    let archive = pg_archive(&url).await;
    archive.migrate().await.unwrap();
}

#[tokio::test]
async fn test_pg_create_is_idempotent() {
    let url = require_database!();
    let archive = pg_archive(&url).await;
    let path = unique_path();
    let graph = graph(&path, Some(proposal(&unique_code(), &["1203"])));

    let first = archive.create(&graph).await.unwrap();
    let second = archive.create(&graph).await.unwrap();
    assert!(matches!(first, WriteOutcome::Created { .. }));
    assert_eq!(second, WriteOutcome::AlreadyPresent);
    assert_eq!(count(&archive, OBSERVATIONS_AT_PATH, &path).await, 1);
    assert!(archive.contains_artifact(&path).await.unwrap());
}

#[tokio::test]
async fn test_pg_concurrent_creates_converge() {
    let url = require_database!();
    let archive = pg_archive(&url).await;
    let path = unique_path();
    let graph = graph(&path, Some(proposal(&unique_code(), &["1203"])));

    let (a, b) = tokio::join!(archive.create(&graph), archive.create(&graph));
    let created = [a.unwrap(), b.unwrap()]
        .iter()
        .filter(|o| matches!(o, WriteOutcome::Created { .. }))
        .count();
    assert_eq!(created, 1);
    assert_eq!(count(&archive, OBSERVATIONS_AT_PATH, &path).await, 1);
}

#[tokio::test]
async fn test_pg_energy_rows_are_well_formed() {
    let url = require_database!();
    let archive = pg_archive(&url).await;
    let path = unique_path();
    archive.create(&graph(&path, None)).await.unwrap();

    let (min, max, dimension): (f64, f64, i32) = sqlx::query_as(
        "SELECT e.min_wavelength, e.max_wavelength, e.dimension FROM energy e \
         JOIN artifact a ON a.plane_id = e.plane_id WHERE a.path = $1",
    )
    .bind(&path)
    .fetch_one(archive.pool())
    .await
    .unwrap();
    assert!(min <= max);
    assert!(dimension > 0);
}

#[tokio::test]
async fn test_pg_update_without_create_writes_nothing() {
    let url = require_database!();
    let archive = pg_archive(&url).await;
    let path = unique_path();
    let code = unique_code();
    let graph = graph(&path, Some(proposal(&code, &["1203"])));

    let err = archive.update(&graph, UpdateScope::All).await.unwrap_err();
    assert!(matches!(err, ArchiveError::ObservationNotFound(_)));
    assert_eq!(count(&archive, OBSERVATIONS_AT_PATH, &path).await, 0);
    assert_eq!(
        count(&archive, "SELECT COUNT(*) FROM proposal WHERE code = $1", &code).await,
        0
    );
}

#[tokio::test]
async fn test_pg_update_status() {
    let url = require_database!();
    let archive = pg_archive(&url).await;
    let path = unique_path();
    let mut graph = graph(&path, None);
    archive.create(&graph).await.unwrap();

    graph.observation.status = ObservationStatus::Deleted;
    archive.update(&graph, UpdateScope::Status).await.unwrap();
    let status: String = sqlx::query_scalar(
        "SELECT o.status FROM observation o JOIN plane p ON p.observation_id = o.id \
         JOIN artifact a ON a.plane_id = p.id WHERE a.path = $1",
    )
    .bind(&path)
    .fetch_one(archive.pool())
    .await
    .unwrap();
    assert_eq!(status, "Deleted");
}

#[tokio::test]
async fn test_pg_remove_keeps_proposal_and_siblings() {
    let url = require_database!();
    let archive = pg_archive(&url).await;
    let code = unique_code();
    let first = unique_path();
    let second = unique_path();
    archive
        .create(&graph(&first, Some(proposal(&code, &["1203"]))))
        .await
        .unwrap();
    archive
        .create(&graph(&second, Some(proposal(&code, &["1203"]))))
        .await
        .unwrap();

    let outcome = archive.remove(&first).await.unwrap();
    assert!(matches!(outcome, WriteOutcome::Removed { .. }));
    assert_eq!(archive.remove(&first).await.unwrap(), WriteOutcome::Absent);

    assert_eq!(count(&archive, OBSERVATIONS_AT_PATH, &first).await, 0);
    assert_eq!(count(&archive, OBSERVATIONS_AT_PATH, &second).await, 1);
    assert_eq!(count(&archive, OBSERVATIONS_OF_PROPOSAL, &code).await, 1);
    assert_eq!(
        count(&archive, "SELECT COUNT(*) FROM proposal WHERE code = $1", &code).await,
        1
    );
    assert_eq!(
        count(&archive, "SELECT COUNT(*) FROM telescope WHERE name = $1", "SALT").await,
        1
    );
    assert_eq!(
        count(&archive, "SELECT COUNT(*) FROM institution WHERE name = $1", "SALT").await,
        1
    );
}

const STOKES_OF_PATH: &str = "SELECT COUNT(*) FROM polarization pol \
    JOIN stokes_parameter sp ON sp.id = pol.stokes_parameter_id \
    JOIN artifact a ON a.plane_id = pol.plane_id WHERE a.path = $1";

#[tokio::test]
async fn test_pg_polarization_links_stokes_vocabulary() {
    let url = require_database!();
    let archive = pg_archive(&url).await;
    let path = unique_path();
    let mut graph = graph(&path, None);
    graph.polarization = Some(
        Polarization::new([StokesParameter::I, StokesParameter::Q, StokesParameter::U]).unwrap(),
    );
    archive.create(&graph).await.unwrap();
    assert_eq!(count(&archive, STOKES_OF_PATH, &path).await, 3);

    graph.polarization = Some(Polarization::new([StokesParameter::V]).unwrap());
    archive.update(&graph, UpdateScope::All).await.unwrap();
    assert_eq!(count(&archive, STOKES_OF_PATH, &path).await, 1);

    archive.remove(&path).await.unwrap();
    assert_eq!(count(&archive, STOKES_OF_PATH, &path).await, 0);
    assert_eq!(
        count(&archive, "SELECT COUNT(*) FROM stokes_parameter WHERE name <> $1", "").await,
        4
    );
}

#[tokio::test]
async fn test_pg_target_type_resolved_by_code() {
    let url = require_database!();
    let archive = pg_archive(&url).await;
    let code = format!("T-{}", &Uuid::new_v4().simple().to_string()[..8]);
    for name in ["NGC 6744", "NGC 6753"] {
        let mut graph = graph(&unique_path(), None);
        if let Some(target) = graph.target.as_mut() {
            target.name = name.to_string();
            target.target_type = code.clone();
        }
        archive.create(&graph).await.unwrap();
    }

    assert_eq!(
        count(&archive, "SELECT COUNT(*) FROM target_type WHERE numeric_code = $1", &code).await,
        1
    );
    assert_eq!(
        count(
            &archive,
            "SELECT COUNT(*) FROM target t JOIN target_type tt ON tt.id = t.target_type_id \
             WHERE tt.numeric_code = $1",
            &code
        )
        .await,
        2
    );
}

//! Archive writer over PostgreSQL.

use archive_common::{ArchiveError, ArchiveResult, ObservationGraph};
use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::{FromRow, PgConnection, PgPool};
use tracing::{debug, info, instrument, warn};

use crate::archive::{today, Archive, UpdateScope, WriteOutcome};
use crate::entities::{
    db_error, insert_polarization, reconcile_observation_owners, reconcile_proposal_owners,
    replace_investigators, resolve_group, resolve_instrument, resolve_proposal, resolve_target,
    resolve_telescope,
};
use crate::schema;

/// PostgreSQL-backed observation archive.
///
/// Each write runs in its own transaction; the unique constraint on
/// `artifact.path` is the only coordination between concurrent writers.
#[derive(Debug, Clone)]
pub struct PgArchive {
    pool: PgPool,
}

/// Surrogate ids of the entities an observation row points at.
struct References {
    telescope_id: i32,
    instrument_id: i32,
    proposal_id: Option<i32>,
    target_id: Option<i32>,
    group_id: Option<i32>,
}

#[derive(FromRow)]
struct ArtifactLocation {
    observation_id: i64,
    plane_id: i64,
}

impl PgArchive {
    /// Connect to the archive database.
    pub async fn connect(database_url: &str, max_connections: u32) -> ArchiveResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| ArchiveError::DatabaseError(format!("Connection failed: {}", e)))?;

        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run database migrations.
    pub async fn migrate(&self) -> ArchiveResult<()> {
        schema::migrate(&self.pool).await
    }
}

#[async_trait]
impl Archive for PgArchive {
    #[instrument(skip(self, graph), fields(path = %graph.artifact.path))]
    async fn create(&self, graph: &ObservationGraph) -> ArchiveResult<WriteOutcome> {
        graph.validate()?;
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(db_error("Transaction start failed"))?;

        let refs = resolve_references(&mut tx, graph).await?;
        let observation_id = insert_observation(&mut tx, graph, &refs).await?;
        let plane_id = insert_plane(&mut tx, graph, observation_id).await?;

        let artifact_id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO artifact (
                plane_id, identifier, name, path,
                content_length, content_checksum, product_type
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (path) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(plane_id)
        .bind(graph.artifact.identifier)
        .bind(&graph.artifact.name)
        .bind(&graph.artifact.path)
        .bind(graph.artifact.content_length as i64)
        .bind(&graph.artifact.content_checksum)
        .bind(graph.artifact.product_type.as_str())
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_error("Artifact insert failed"))?;

        if artifact_id.is_none() {
            tx.rollback()
                .await
                .map_err(db_error("Transaction rollback failed"))?;
            debug!("Artifact already archived");
            return Ok(WriteOutcome::AlreadyPresent);
        }

        insert_descriptors(&mut tx, graph, plane_id).await?;
        if let Some(proposal_id) = refs.proposal_id {
            reconcile_proposal_owners(&mut tx, proposal_id, today()).await?;
        }

        tx.commit().await.map_err(db_error("Transaction commit failed"))?;
        info!(observation_id, "Observation created");
        Ok(WriteOutcome::Created { observation_id })
    }

    #[instrument(skip(self, graph), fields(path = %graph.artifact.path, scope = %scope))]
    async fn update(
        &self,
        graph: &ObservationGraph,
        scope: UpdateScope,
    ) -> ArchiveResult<WriteOutcome> {
        graph.validate()?;
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(db_error("Transaction start failed"))?;

        let Some(location) = locate(&mut tx, &graph.artifact.path).await? else {
            tx.rollback()
                .await
                .map_err(db_error("Transaction rollback failed"))?;
            return Err(ArchiveError::ObservationNotFound(graph.artifact.path.clone()));
        };
        let observation_id = location.observation_id;

        match scope {
            UpdateScope::All => {
                let refs = resolve_references(&mut tx, graph).await?;
                update_observation(&mut tx, graph, &refs, observation_id).await?;
                replace_plane(&mut tx, graph, location.plane_id).await?;
                reconcile_observation_owners(&mut tx, observation_id, today()).await?;
            }
            UpdateScope::Status => {
                sqlx::query("UPDATE observation SET status = $2 WHERE id = $1")
                    .bind(observation_id)
                    .bind(graph.observation.status.as_str())
                    .execute(&mut *tx)
                    .await
                    .map_err(db_error("Status update failed"))?;
            }
            UpdateScope::Investigators => match &graph.proposal {
                Some(proposal) => {
                    let proposal_id = resolve_proposal(&mut tx, proposal).await?;
                    replace_investigators(&mut tx, proposal_id, &proposal.investigators).await?;
                    reconcile_proposal_owners(&mut tx, proposal_id, today()).await?;
                }
                None => warn!("Observation has no proposal; no investigators to update"),
            },
            UpdateScope::ReleaseDates => {
                sqlx::query(
                    "UPDATE observation SET data_release = $2, meta_release = $3 WHERE id = $1",
                )
                .bind(observation_id)
                .bind(graph.observation.data_release)
                .bind(graph.observation.meta_release)
                .execute(&mut *tx)
                .await
                .map_err(db_error("Release date update failed"))?;
                reconcile_observation_owners(&mut tx, observation_id, today()).await?;
            }
        }

        tx.commit().await.map_err(db_error("Transaction commit failed"))?;
        info!(observation_id, "Observation updated");
        Ok(WriteOutcome::Updated {
            observation_id,
            scope,
        })
    }

    #[instrument(skip(self))]
    async fn remove(&self, artifact_path: &str) -> ArchiveResult<WriteOutcome> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(db_error("Transaction start failed"))?;

        let Some(location) = locate(&mut tx, artifact_path).await? else {
            tx.rollback()
                .await
                .map_err(db_error("Transaction rollback failed"))?;
            debug!("Nothing archived at this path");
            return Ok(WriteOutcome::Absent);
        };

        // Planes, descriptors and the artifact go with the observation.
        sqlx::query("DELETE FROM observation WHERE id = $1")
            .bind(location.observation_id)
            .execute(&mut *tx)
            .await
            .map_err(db_error("Observation delete failed"))?;

        tx.commit().await.map_err(db_error("Transaction commit failed"))?;
        info!(observation_id = location.observation_id, "Observation removed");
        Ok(WriteOutcome::Removed {
            observation_id: location.observation_id,
        })
    }

    async fn contains_artifact(&self, artifact_path: &str) -> ArchiveResult<bool> {
        sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM artifact WHERE path = $1)")
            .bind(artifact_path)
            .fetch_one(&self.pool)
            .await
            .map_err(db_error("Artifact lookup failed"))
    }
}

async fn locate(conn: &mut PgConnection, path: &str) -> ArchiveResult<Option<ArtifactLocation>> {
    sqlx::query_as::<_, ArtifactLocation>(
        r#"
        SELECT p.observation_id, p.id AS plane_id
        FROM artifact a
        JOIN plane p ON p.id = a.plane_id
        WHERE a.path = $1
        FOR UPDATE OF p
        "#,
    )
    .bind(path)
    .fetch_optional(&mut *conn)
    .await
    .map_err(db_error("Artifact lookup failed"))
}

async fn resolve_references(
    conn: &mut PgConnection,
    graph: &ObservationGraph,
) -> ArchiveResult<References> {
    let observation = &graph.observation;
    let telescope_id = resolve_telescope(conn, observation.telescope).await?;
    let instrument_id = resolve_instrument(conn, observation.instrument, telescope_id).await?;

    let proposal_id = match &graph.proposal {
        Some(proposal) => Some(resolve_proposal(conn, proposal).await?),
        None => None,
    };
    let target_id = match &graph.target {
        Some(target) => Some(resolve_target(conn, target).await?),
        None => None,
    };
    let group_id = match &observation.group {
        Some(group) => Some(resolve_group(conn, group).await?),
        None => None,
    };

    Ok(References {
        telescope_id,
        instrument_id,
        proposal_id,
        target_id,
        group_id,
    })
}

async fn insert_observation(
    conn: &mut PgConnection,
    graph: &ObservationGraph,
    refs: &References,
) -> ArchiveResult<i64> {
    let observation = &graph.observation;
    sqlx::query_scalar::<_, i64>(
        r#"
        INSERT INTO observation (
            data_release, meta_release, intent, status,
            instrument_id, telescope_id, proposal_id, target_id,
            observation_group_id, instrument_setup
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        RETURNING id
        "#,
    )
    .bind(observation.data_release)
    .bind(observation.meta_release)
    .bind(observation.intent.as_str())
    .bind(observation.status.as_str())
    .bind(refs.instrument_id)
    .bind(refs.telescope_id)
    .bind(refs.proposal_id)
    .bind(refs.target_id)
    .bind(refs.group_id)
    .bind(Json(&observation.instrument_setup))
    .fetch_one(&mut *conn)
    .await
    .map_err(db_error("Observation insert failed"))
}

async fn update_observation(
    conn: &mut PgConnection,
    graph: &ObservationGraph,
    refs: &References,
    observation_id: i64,
) -> ArchiveResult<()> {
    let observation = &graph.observation;
    sqlx::query(
        r#"
        UPDATE observation SET
            data_release = $2,
            meta_release = $3,
            intent = $4,
            status = $5,
            instrument_id = $6,
            telescope_id = $7,
            proposal_id = $8,
            target_id = $9,
            observation_group_id = $10,
            instrument_setup = $11
        WHERE id = $1
        "#,
    )
    .bind(observation_id)
    .bind(observation.data_release)
    .bind(observation.meta_release)
    .bind(observation.intent.as_str())
    .bind(observation.status.as_str())
    .bind(refs.instrument_id)
    .bind(refs.telescope_id)
    .bind(refs.proposal_id)
    .bind(refs.target_id)
    .bind(refs.group_id)
    .bind(Json(&observation.instrument_setup))
    .execute(&mut *conn)
    .await
    .map_err(db_error("Observation update failed"))?;
    Ok(())
}

async fn insert_plane(
    conn: &mut PgConnection,
    graph: &ObservationGraph,
    observation_id: i64,
) -> ArchiveResult<i64> {
    sqlx::query_scalar::<_, i64>(
        r#"
        INSERT INTO plane (observation_id, product_id, data_product_type)
        VALUES ($1, $2, $3)
        RETURNING id
        "#,
    )
    .bind(observation_id)
    .bind(&graph.plane.product_id)
    .bind(graph.plane.data_product_type.as_str())
    .fetch_one(&mut *conn)
    .await
    .map_err(db_error("Plane insert failed"))
}

/// Rewrite the plane, its descriptors and the artifact metadata in place.
/// The artifact keeps its identifier.
async fn replace_plane(
    conn: &mut PgConnection,
    graph: &ObservationGraph,
    plane_id: i64,
) -> ArchiveResult<()> {
    sqlx::query("UPDATE plane SET product_id = $2, data_product_type = $3 WHERE id = $1")
        .bind(plane_id)
        .bind(&graph.plane.product_id)
        .bind(graph.plane.data_product_type.as_str())
        .execute(&mut *conn)
        .await
        .map_err(db_error("Plane update failed"))?;

    for table in ["energy", "polarization", "position", "observation_time"] {
        sqlx::query(&format!("DELETE FROM {} WHERE plane_id = $1", table))
            .bind(plane_id)
            .execute(&mut *conn)
            .await
            .map_err(db_error("Descriptor delete failed"))?;
    }
    insert_descriptors(conn, graph, plane_id).await?;

    sqlx::query(
        r#"
        UPDATE artifact SET
            name = $2,
            content_length = $3,
            content_checksum = $4,
            product_type = $5
        WHERE plane_id = $1
        "#,
    )
    .bind(plane_id)
    .bind(&graph.artifact.name)
    .bind(graph.artifact.content_length as i64)
    .bind(&graph.artifact.content_checksum)
    .bind(graph.artifact.product_type.as_str())
    .execute(&mut *conn)
    .await
    .map_err(db_error("Artifact update failed"))?;
    Ok(())
}

/// Insert the optional plane descriptors present in the graph.
///
/// Position owners start out public; the caller reconciles them.
async fn insert_descriptors(
    conn: &mut PgConnection,
    graph: &ObservationGraph,
    plane_id: i64,
) -> ArchiveResult<()> {
    if let Some(energy) = &graph.energy {
        sqlx::query(
            r#"
            INSERT INTO energy (
                plane_id, min_wavelength, max_wavelength,
                dimension, resolving_power, sample_size
            ) VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(plane_id)
        .bind(energy.min_wavelength)
        .bind(energy.max_wavelength)
        .bind(energy.dimension as i32)
        .bind(energy.resolving_power)
        .bind(energy.sample_size)
        .execute(&mut *conn)
        .await
        .map_err(db_error("Energy insert failed"))?;
    }

    if let Some(polarization) = &graph.polarization {
        insert_polarization(conn, plane_id, polarization).await?;
    }

    if let Some(position) = &graph.position {
        sqlx::query("INSERT INTO position (plane_id, ra, dec, equinox) VALUES ($1, $2, $3, $4)")
            .bind(plane_id)
            .bind(position.ra)
            .bind(position.dec)
            .bind(position.equinox)
            .execute(&mut *conn)
            .await
            .map_err(db_error("Position insert failed"))?;
    }

    if let Some(time) = &graph.time {
        sqlx::query(
            r#"
            INSERT INTO observation_time (
                plane_id, start_time, end_time, exposure_time, resolution, night
            ) VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(plane_id)
        .bind(time.start)
        .bind(time.end)
        .bind(time.exposure_time)
        .bind(time.resolution)
        .bind(time.night)
        .execute(&mut *conn)
        .await
        .map_err(db_error("Time insert failed"))?;
    }

    Ok(())
}

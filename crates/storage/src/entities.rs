//! Resolve-or-create for the entities shared between observations.
//!
//! Every resolver is a single upsert against a natural-key uniqueness
//! constraint, so concurrent writers racing on the same key end up with the
//! same row id. All functions run on the caller's transaction.

use archive_common::{
    ArchiveError, ArchiveResult, Institution, Instrument, ObservationGroup, Polarization,
    ProposalRecord, Target, Telescope,
};
use chrono::NaiveDate;
use sqlx::PgConnection;
use tracing::debug;

pub(crate) fn db_error(context: &'static str) -> impl FnOnce(sqlx::Error) -> ArchiveError {
    move |e| ArchiveError::DatabaseError(format!("{}: {}", context, e))
}

pub async fn resolve_institution(
    conn: &mut PgConnection,
    institution: Institution,
) -> ArchiveResult<i32> {
    sqlx::query_scalar::<_, i32>(
        r#"
        INSERT INTO institution (name) VALUES ($1)
        ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name
        RETURNING id
        "#,
    )
    .bind(institution.as_str())
    .fetch_one(&mut *conn)
    .await
    .map_err(db_error("Institution lookup failed"))
}

pub async fn resolve_telescope(conn: &mut PgConnection, telescope: Telescope) -> ArchiveResult<i32> {
    sqlx::query_scalar::<_, i32>(
        r#"
        INSERT INTO telescope (name) VALUES ($1)
        ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name
        RETURNING id
        "#,
    )
    .bind(telescope.as_str())
    .fetch_one(&mut *conn)
    .await
    .map_err(db_error("Telescope lookup failed"))
}

pub async fn resolve_instrument(
    conn: &mut PgConnection,
    instrument: Instrument,
    telescope_id: i32,
) -> ArchiveResult<i32> {
    sqlx::query_scalar::<_, i32>(
        r#"
        INSERT INTO instrument (name, telescope_id) VALUES ($1, $2)
        ON CONFLICT (name) DO UPDATE SET telescope_id = EXCLUDED.telescope_id
        RETURNING id
        "#,
    )
    .bind(instrument.as_str())
    .bind(telescope_id)
    .fetch_one(&mut *conn)
    .await
    .map_err(db_error("Instrument lookup failed"))
}

/// Resolve a proposal by (code, institution) and add any investigators the
/// archive does not know yet.
///
/// Title and principal investigator are only overwritten by known values.
pub async fn resolve_proposal(
    conn: &mut PgConnection,
    proposal: &ProposalRecord,
) -> ArchiveResult<i32> {
    let institution_id = resolve_institution(conn, proposal.institution).await?;

    let id = sqlx::query_scalar::<_, i32>(
        r#"
        INSERT INTO proposal (code, institution_id, title, principal_investigator)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (code, institution_id) DO UPDATE SET
            title = COALESCE(EXCLUDED.title, proposal.title),
            principal_investigator = COALESCE(
                EXCLUDED.principal_investigator,
                proposal.principal_investigator
            )
        RETURNING id
        "#,
    )
    .bind(&proposal.code)
    .bind(institution_id)
    .bind(&proposal.title)
    .bind(&proposal.principal_investigator)
    .fetch_one(&mut *conn)
    .await
    .map_err(db_error("Proposal lookup failed"))?;

    add_investigators(conn, id, &proposal.investigators).await?;
    Ok(id)
}

async fn add_investigators(
    conn: &mut PgConnection,
    proposal_id: i32,
    investigators: &[String],
) -> ArchiveResult<()> {
    if investigators.is_empty() {
        return Ok(());
    }
    sqlx::query(
        r#"
        INSERT INTO proposal_investigator (proposal_id, investigator_id)
        SELECT $1, UNNEST($2::TEXT[])
        ON CONFLICT DO NOTHING
        "#,
    )
    .bind(proposal_id)
    .bind(investigators)
    .execute(&mut *conn)
    .await
    .map_err(db_error("Investigator insert failed"))?;
    Ok(())
}

/// Make the investigator list of a proposal exactly `investigators`.
pub async fn replace_investigators(
    conn: &mut PgConnection,
    proposal_id: i32,
    investigators: &[String],
) -> ArchiveResult<()> {
    sqlx::query("DELETE FROM proposal_investigator WHERE proposal_id = $1")
        .bind(proposal_id)
        .execute(&mut *conn)
        .await
        .map_err(db_error("Investigator delete failed"))?;
    add_investigators(conn, proposal_id, investigators).await
}

/// Resolve a SIMBAD-style target type by its numeric code.
pub async fn resolve_target_type(
    conn: &mut PgConnection,
    numeric_code: &str,
) -> ArchiveResult<i32> {
    sqlx::query_scalar::<_, i32>(
        r#"
        INSERT INTO target_type (numeric_code) VALUES ($1)
        ON CONFLICT (numeric_code) DO UPDATE SET numeric_code = EXCLUDED.numeric_code
        RETURNING id
        "#,
    )
    .bind(numeric_code)
    .fetch_one(&mut *conn)
    .await
    .map_err(db_error("Target type lookup failed"))
}

pub async fn resolve_target(conn: &mut PgConnection, target: &Target) -> ArchiveResult<i32> {
    let target_type_id = resolve_target_type(conn, &target.target_type).await?;

    sqlx::query_scalar::<_, i32>(
        r#"
        INSERT INTO target (name, target_type_id, standard, moving)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (name, target_type_id) DO UPDATE SET
            standard = EXCLUDED.standard,
            moving = EXCLUDED.moving
        RETURNING id
        "#,
    )
    .bind(&target.name)
    .bind(target_type_id)
    .bind(target.standard)
    .bind(target.moving)
    .fetch_one(&mut *conn)
    .await
    .map_err(db_error("Target lookup failed"))
}

/// Link a plane to each of its Stokes parameters.
///
/// The parameter vocabulary is seeded by the schema; an unknown name is an
/// invalid record rather than a new vocabulary entry.
pub async fn insert_polarization(
    conn: &mut PgConnection,
    plane_id: i64,
    polarization: &Polarization,
) -> ArchiveResult<()> {
    let names: Vec<&str> = polarization
        .stokes_parameters
        .iter()
        .map(|s| s.as_str())
        .collect();
    let linked = sqlx::query(
        r#"
        INSERT INTO polarization (plane_id, stokes_parameter_id)
        SELECT $1, sp.id FROM stokes_parameter sp
        WHERE sp.name = ANY ($2::TEXT[])
        "#,
    )
    .bind(plane_id)
    .bind(&names)
    .execute(&mut *conn)
    .await
    .map_err(db_error("Polarization insert failed"))?
    .rows_affected();

    if linked != names.len() as u64 {
        return Err(ArchiveError::invalid(format!(
            "Stokes parameters {:?} are not all in the vocabulary",
            names
        )));
    }
    Ok(())
}

pub async fn resolve_group(conn: &mut PgConnection, group: &ObservationGroup) -> ArchiveResult<i32> {
    sqlx::query_scalar::<_, i32>(
        r#"
        INSERT INTO observation_group (identifier, name) VALUES ($1, $2)
        ON CONFLICT (identifier) DO UPDATE SET name = EXCLUDED.name
        RETURNING id
        "#,
    )
    .bind(&group.identifier)
    .bind(&group.name)
    .fetch_one(&mut *conn)
    .await
    .map_err(db_error("Observation group lookup failed"))
}

/// Recompute position owners of every observation of a proposal.
///
/// Positions of proprietary observations are visible to the proposal's
/// investigators only; all others are public.
pub async fn reconcile_proposal_owners(
    conn: &mut PgConnection,
    proposal_id: i32,
    today: NaiveDate,
) -> ArchiveResult<u64> {
    let result = sqlx::query(
        r#"
        UPDATE position SET owners = CASE
            WHEN o.meta_release > $2 THEN ARRAY(
                SELECT pi.investigator_id::TEXT FROM proposal_investigator pi
                WHERE pi.proposal_id = o.proposal_id
                ORDER BY pi.investigator_id
            )
            ELSE NULL
        END
        FROM plane p
        JOIN observation o ON o.id = p.observation_id
        WHERE position.plane_id = p.id AND o.proposal_id = $1
        "#,
    )
    .bind(proposal_id)
    .bind(today)
    .execute(&mut *conn)
    .await
    .map_err(db_error("Position owner reconciliation failed"))?;

    debug!(proposal_id, rows = result.rows_affected(), "Reconciled position owners");
    Ok(result.rows_affected())
}

/// Recompute position owners of a single observation.
pub async fn reconcile_observation_owners(
    conn: &mut PgConnection,
    observation_id: i64,
    today: NaiveDate,
) -> ArchiveResult<u64> {
    let result = sqlx::query(
        r#"
        UPDATE position SET owners = CASE
            WHEN o.meta_release > $2 AND o.proposal_id IS NOT NULL THEN ARRAY(
                SELECT pi.investigator_id::TEXT FROM proposal_investigator pi
                WHERE pi.proposal_id = o.proposal_id
                ORDER BY pi.investigator_id
            )
            ELSE NULL
        END
        FROM plane p
        JOIN observation o ON o.id = p.observation_id
        WHERE position.plane_id = p.id AND o.id = $1
        "#,
    )
    .bind(observation_id)
    .bind(today)
    .execute(&mut *conn)
    .await
    .map_err(db_error("Position owner reconciliation failed"))?;

    Ok(result.rows_affected())
}

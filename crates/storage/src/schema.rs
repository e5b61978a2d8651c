//! Relational schema of the observation archive.

use archive_common::{ArchiveError, ArchiveResult};
use sqlx::PgPool;

/// Create all tables, indexes and access policies that do not exist yet.
pub async fn migrate(pool: &PgPool) -> ArchiveResult<()> {
    // Split SQL statements and execute them individually
    for statement in SCHEMA_SQL.split(';') {
        let trimmed = statement.trim();
        if !trimmed.is_empty() {
            sqlx::query(trimmed)
                .execute(pool)
                .await
                .map_err(|e| ArchiveError::DatabaseError(format!("Migration failed: {}", e)))?;
        }
    }

    Ok(())
}

/// Tables in dependency order; descriptor tables hang off `plane` and are
/// removed with it.
const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS institution (
    id SERIAL PRIMARY KEY,
    name VARCHAR(100) NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS telescope (
    id SERIAL PRIMARY KEY,
    name VARCHAR(100) NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS instrument (
    id SERIAL PRIMARY KEY,
    name VARCHAR(100) NOT NULL UNIQUE,
    telescope_id INTEGER NOT NULL REFERENCES telescope (id)
);

CREATE TABLE IF NOT EXISTS proposal (
    id SERIAL PRIMARY KEY,
    code VARCHAR(50) NOT NULL,
    institution_id INTEGER NOT NULL REFERENCES institution (id),
    title TEXT,
    principal_investigator VARCHAR(200),

    UNIQUE (code, institution_id)
);

CREATE TABLE IF NOT EXISTS proposal_investigator (
    proposal_id INTEGER NOT NULL REFERENCES proposal (id) ON DELETE CASCADE,
    investigator_id VARCHAR(50) NOT NULL,

    PRIMARY KEY (proposal_id, investigator_id)
);

CREATE TABLE IF NOT EXISTS observation_group (
    id SERIAL PRIMARY KEY,
    identifier VARCHAR(50) NOT NULL UNIQUE,
    name VARCHAR(100) NOT NULL
);

CREATE TABLE IF NOT EXISTS target_type (
    id SERIAL PRIMARY KEY,
    numeric_code VARCHAR(20) NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS target (
    id SERIAL PRIMARY KEY,
    name VARCHAR(200) NOT NULL,
    target_type_id INTEGER NOT NULL REFERENCES target_type (id),
    standard BOOLEAN NOT NULL DEFAULT FALSE,
    moving BOOLEAN NOT NULL DEFAULT FALSE,

    UNIQUE (name, target_type_id)
);

CREATE TABLE IF NOT EXISTS observation (
    id BIGSERIAL PRIMARY KEY,
    data_release DATE NOT NULL,
    meta_release DATE NOT NULL,
    intent VARCHAR(20) NOT NULL,
    status VARCHAR(20) NOT NULL,
    instrument_id INTEGER NOT NULL REFERENCES instrument (id),
    telescope_id INTEGER NOT NULL REFERENCES telescope (id),
    proposal_id INTEGER REFERENCES proposal (id),
    target_id INTEGER REFERENCES target (id),
    observation_group_id INTEGER REFERENCES observation_group (id),
    instrument_setup JSONB NOT NULL DEFAULT '{}',
    ingested_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),

    CHECK (meta_release <= data_release)
);

CREATE INDEX IF NOT EXISTS idx_observation_proposal ON observation(proposal_id);

CREATE TABLE IF NOT EXISTS plane (
    id BIGSERIAL PRIMARY KEY,
    observation_id BIGINT NOT NULL REFERENCES observation (id) ON DELETE CASCADE,
    product_id VARCHAR(100) NOT NULL,
    data_product_type VARCHAR(20) NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_plane_observation ON plane(observation_id);

CREATE TABLE IF NOT EXISTS energy (
    plane_id BIGINT PRIMARY KEY REFERENCES plane (id) ON DELETE CASCADE,
    min_wavelength DOUBLE PRECISION NOT NULL,
    max_wavelength DOUBLE PRECISION NOT NULL,
    dimension INTEGER NOT NULL,
    resolving_power DOUBLE PRECISION,
    sample_size DOUBLE PRECISION NOT NULL,

    CHECK (min_wavelength <= max_wavelength),
    CHECK (dimension > 0),
    CHECK (sample_size >= 0)
);

CREATE TABLE IF NOT EXISTS stokes_parameter (
    id SERIAL PRIMARY KEY,
    name VARCHAR(1) NOT NULL UNIQUE
);

INSERT INTO stokes_parameter (name) VALUES ('I'), ('Q'), ('U'), ('V')
ON CONFLICT (name) DO NOTHING;

CREATE TABLE IF NOT EXISTS polarization (
    plane_id BIGINT NOT NULL REFERENCES plane (id) ON DELETE CASCADE,
    stokes_parameter_id INTEGER NOT NULL REFERENCES stokes_parameter (id),

    PRIMARY KEY (plane_id, stokes_parameter_id)
);

CREATE TABLE IF NOT EXISTS position (
    plane_id BIGINT PRIMARY KEY REFERENCES plane (id) ON DELETE CASCADE,
    ra DOUBLE PRECISION NOT NULL,
    dec DOUBLE PRECISION NOT NULL,
    equinox DOUBLE PRECISION NOT NULL,
    owners TEXT[],

    CHECK (ra >= 0 AND ra < 360),
    CHECK (dec >= -90 AND dec <= 90)
);

ALTER TABLE position ENABLE ROW LEVEL SECURITY;

DROP POLICY IF EXISTS position_owner_access ON position;

CREATE POLICY position_owner_access ON position FOR SELECT
    USING (owners IS NULL OR current_user::TEXT = ANY (owners));

CREATE TABLE IF NOT EXISTS observation_time (
    plane_id BIGINT PRIMARY KEY REFERENCES plane (id) ON DELETE CASCADE,
    start_time TIMESTAMPTZ NOT NULL,
    end_time TIMESTAMPTZ NOT NULL,
    exposure_time DOUBLE PRECISION NOT NULL,
    resolution DOUBLE PRECISION NOT NULL,
    night DATE NOT NULL,

    CHECK (start_time <= end_time)
);

CREATE TABLE IF NOT EXISTS artifact (
    id BIGSERIAL PRIMARY KEY,
    plane_id BIGINT NOT NULL REFERENCES plane (id) ON DELETE CASCADE,
    identifier UUID NOT NULL UNIQUE,
    name VARCHAR(200) NOT NULL,
    path TEXT NOT NULL UNIQUE,
    content_length BIGINT NOT NULL,
    content_checksum VARCHAR(64) NOT NULL,
    product_type VARCHAR(20) NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_artifact_plane ON artifact(plane_id)
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statements_split_cleanly() {
        let statements: Vec<_> = SCHEMA_SQL
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();
        assert!(statements.iter().all(|s| {
            ["CREATE", "ALTER", "DROP", "INSERT"]
                .iter()
                .any(|keyword| s.starts_with(keyword))
        }));
        assert!(statements.iter().any(|s| s.starts_with("CREATE POLICY")));
    }

    #[test]
    fn test_stokes_vocabulary_is_seeded() {
        let seed = SCHEMA_SQL
            .split(';')
            .map(str::trim)
            .find(|s| s.starts_with("INSERT INTO stokes_parameter"))
            .unwrap();
        for parameter in archive_common::StokesParameter::ALL {
            assert!(seed.contains(&format!("('{}')", parameter.as_str())));
        }
    }
}

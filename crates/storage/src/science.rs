//! Read-only access to the SALT science database.
//!
//! The science database knows which proposal a block visit belongs to, who
//! its investigators are, whether the visit was accepted and when its data
//! become public.

use archive_common::{
    ArchiveError, ArchiveResult, BlockVisit, Institution, ObservationStatus, ProposalRecord,
};
use async_trait::async_trait;
use chrono::{Months, NaiveDate};
use sqlx::mysql::MySqlPoolOptions;
use sqlx::{FromRow, MySqlPool};
use std::collections::BTreeMap;
use tracing::{debug, instrument};

/// Source of block visit information.
#[async_trait]
pub trait ScienceDatabase: Send + Sync {
    /// Look up a block visit. `None` if the science database has no such visit.
    async fn block_visit(&self, block_visit_id: i64) -> ArchiveResult<Option<BlockVisit>>;
}

/// Proposal categories with their own proprietary period rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProposalType {
    Commissioning,
    DirectorsDiscretionaryTime,
    ScienceVerification,
    GravitationalWaveEvent,
    Science,
}

impl ProposalType {
    /// Map a science database proposal type name. Unlisted types are science.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "commissioning" => ProposalType::Commissioning,
            "director discretionary time" | "ddt" => ProposalType::DirectorsDiscretionaryTime,
            "science verification" => ProposalType::ScienceVerification,
            "gravitational wave event" | "gwe" => ProposalType::GravitationalWaveEvent,
            _ => ProposalType::Science,
        }
    }
}

/// Release date of a proposal's data.
///
/// Proprietary periods count from the end of the proposal's last semester.
/// Gravitational wave event data stay proprietary indefinitely.
pub fn release_date(
    proposal_type: ProposalType,
    end_semester: NaiveDate,
    proprietary_months: Option<u32>,
) -> ArchiveResult<NaiveDate> {
    let months = match proposal_type {
        ProposalType::Commissioning => 36,
        ProposalType::DirectorsDiscretionaryTime => 6,
        ProposalType::ScienceVerification => 12,
        ProposalType::GravitationalWaveEvent => {
            return NaiveDate::from_ymd_opt(2100, 1, 1)
                .ok_or_else(|| ArchiveError::invalid("invalid embargo date"));
        }
        ProposalType::Science => proprietary_months.ok_or_else(|| {
            ArchiveError::ScienceDatabaseError(
                "science proposal without proprietary period".to_string(),
            )
        })?,
    };
    end_semester
        .checked_add_months(Months::new(months))
        .ok_or_else(|| ArchiveError::invalid(format!("release date out of range: {}", end_semester)))
}

/// MySQL client for the SALT science database.
#[derive(Debug, Clone)]
pub struct SaltScienceDatabase {
    pool: MySqlPool,
}

#[derive(FromRow)]
struct VisitRow {
    proposal_code: String,
    status: String,
}

#[derive(FromRow)]
struct ReleaseRow {
    end_semester: Option<NaiveDate>,
    proposal_type: Option<String>,
    proprietary_period: Option<i64>,
}

fn sdb_error(context: &'static str) -> impl FnOnce(sqlx::Error) -> ArchiveError {
    move |e| ArchiveError::ScienceDatabaseError(format!("{}: {}", context, e))
}

impl SaltScienceDatabase {
    pub async fn connect(database_url: &str, max_connections: u32) -> ArchiveResult<Self> {
        let pool = MySqlPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(sdb_error("Connection failed"))?;

        Ok(Self { pool })
    }

    async fn release(&self, proposal_code: &str) -> ArchiveResult<NaiveDate> {
        let row = sqlx::query_as::<_, ReleaseRow>(
            r#"
            SELECT CAST(MAX(Semester.EndSemester) AS DATE) AS end_semester,
                   MAX(ProposalType.ProposalType) AS proposal_type,
                   CAST(MAX(ProposalGeneralInfo.ProprietaryPeriod) AS SIGNED) AS proprietary_period
            FROM ProposalGeneralInfo
            JOIN Proposal ON ProposalGeneralInfo.ProposalCode_Id = Proposal.ProposalCode_Id
            JOIN ProposalCode ON ProposalCode.ProposalCode_Id = Proposal.ProposalCode_Id
            JOIN ProposalType ON ProposalGeneralInfo.ProposalType_Id = ProposalType.ProposalType_Id
            JOIN Semester ON Proposal.Semester_Id = Semester.Semester_Id
            WHERE ProposalCode.Proposal_Code = ?
            "#,
        )
        .bind(proposal_code)
        .fetch_one(&self.pool)
        .await
        .map_err(sdb_error("Release date lookup failed"))?;

        let end_semester = row.end_semester.ok_or_else(|| {
            ArchiveError::ScienceDatabaseError(format!(
                "proposal {} has no semester",
                proposal_code
            ))
        })?;
        let proposal_type = ProposalType::from_name(row.proposal_type.as_deref().unwrap_or(""));
        let months = row
            .proprietary_period
            .map(|m| u32::try_from(m).unwrap_or(0));
        release_date(proposal_type, end_semester, months)
    }
}

#[async_trait]
impl ScienceDatabase for SaltScienceDatabase {
    #[instrument(skip(self))]
    async fn block_visit(&self, block_visit_id: i64) -> ArchiveResult<Option<BlockVisit>> {
        let visit = sqlx::query_as::<_, VisitRow>(
            r#"
            SELECT ProposalCode.Proposal_Code AS proposal_code,
                   BlockVisitStatus.BlockVisitStatus AS status
            FROM BlockVisit
            JOIN BlockVisitStatus USING (BlockVisitStatus_Id)
            JOIN `Block` USING (Block_Id)
            JOIN Proposal ON `Block`.Proposal_Id = Proposal.Proposal_Id
            JOIN ProposalCode ON Proposal.ProposalCode_Id = ProposalCode.ProposalCode_Id
            WHERE BlockVisit_Id = ?
            "#,
        )
        .bind(block_visit_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(sdb_error("Block visit lookup failed"))?;

        let Some(visit) = visit else {
            debug!("Unknown block visit");
            return Ok(None);
        };
        let status = ObservationStatus::for_name(&visit.status)?;

        let title = sqlx::query_scalar::<_, Option<String>>(
            r#"
            SELECT ProposalText.Title
            FROM BlockVisit
            JOIN `Block` USING (Block_Id)
            JOIN Proposal ON `Block`.Proposal_Id = Proposal.Proposal_Id
            JOIN ProposalText
                ON Proposal.ProposalCode_Id = ProposalText.ProposalCode_Id
                AND Proposal.Semester_Id = ProposalText.Semester_Id
            WHERE BlockVisit_Id = ?
            "#,
        )
        .bind(block_visit_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(sdb_error("Proposal title lookup failed"))?
        .flatten();

        let principal_investigator = sqlx::query_scalar::<_, Option<String>>(
            r#"
            SELECT CONCAT(Investigator.FirstName, ' ', Investigator.Surname)
            FROM BlockVisit
            JOIN `Block` USING (Block_Id)
            JOIN Proposal ON `Block`.Proposal_Id = Proposal.Proposal_Id
            JOIN ProposalContact ON Proposal.ProposalCode_Id = ProposalContact.ProposalCode_Id
            JOIN Investigator ON ProposalContact.Leader_Id = Investigator.Investigator_Id
            WHERE BlockVisit_Id = ?
            "#,
        )
        .bind(block_visit_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(sdb_error("Principal investigator lookup failed"))?
        .flatten();

        let investigators = sqlx::query_scalar::<_, String>(
            r#"
            SELECT DISTINCT CAST(PiptUser.PiptUser_Id AS CHAR)
            FROM BlockVisit
            JOIN `Block` USING (Block_Id)
            JOIN Proposal ON `Block`.Proposal_Id = Proposal.Proposal_Id
            JOIN ProposalInvestigator
                ON Proposal.ProposalCode_Id = ProposalInvestigator.ProposalCode_Id
            JOIN Investigator
                ON ProposalInvestigator.Investigator_Id = Investigator.Investigator_Id
            JOIN PiptUser ON Investigator.PiptUser_Id = PiptUser.PiptUser_Id
            WHERE BlockVisit_Id = ?
            "#,
        )
        .bind(block_visit_id)
        .fetch_all(&self.pool)
        .await
        .map_err(sdb_error("Investigator lookup failed"))?;

        let target_type = sqlx::query_scalar::<_, Option<String>>(
            r#"
            SELECT TargetSubType.NumericCode
            FROM BlockVisit
            JOIN `Block` ON BlockVisit.Block_Id = `Block`.Block_Id
            JOIN Pointing ON `Block`.Block_Id = Pointing.Block_Id
            JOIN Observation ON Pointing.Pointing_Id = Observation.Pointing_Id
            JOIN Target ON Observation.Target_Id = Target.Target_Id
            JOIN TargetSubType ON Target.TargetSubType_Id = TargetSubType.TargetSubType_Id
            WHERE BlockVisit.BlockVisit_Id = ?
            LIMIT 1
            "#,
        )
        .bind(block_visit_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(sdb_error("Target type lookup failed"))?
        .flatten();

        let release = self.release(&visit.proposal_code).await?;

        Ok(Some(BlockVisit {
            id: block_visit_id,
            proposal: ProposalRecord {
                code: visit.proposal_code,
                institution: Institution::Salt,
                title,
                principal_investigator,
                investigators,
            },
            status,
            data_release: release,
            meta_release: release,
            target_type,
        }))
    }
}

/// Fixed set of block visits, used in dummy mode and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticScienceDatabase {
    visits: BTreeMap<i64, BlockVisit>,
}

impl StaticScienceDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_visit(mut self, visit: BlockVisit) -> Self {
        self.visits.insert(visit.id, visit);
        self
    }
}

#[async_trait]
impl ScienceDatabase for StaticScienceDatabase {
    async fn block_visit(&self, block_visit_id: i64) -> ArchiveResult<Option<BlockVisit>> {
        Ok(self.visits.get(&block_visit_id).cloned())
    }
}

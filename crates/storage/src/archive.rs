//! Archive writer interface.

use archive_common::{ArchiveError, ArchiveResult, ObservationGraph};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use std::fmt;
use std::str::FromStr;

/// Part of an existing observation refreshed by an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpdateScope {
    /// Every derived property, keeping the artifact identifier.
    #[default]
    All,
    /// Observation status only.
    Status,
    /// Proposal investigator list only.
    Investigators,
    /// Data and metadata release dates only.
    ReleaseDates,
}

impl UpdateScope {
    pub const ALL: &'static [UpdateScope] = &[
        UpdateScope::All,
        UpdateScope::Status,
        UpdateScope::Investigators,
        UpdateScope::ReleaseDates,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            UpdateScope::All => "all",
            UpdateScope::Status => "status",
            UpdateScope::Investigators => "investigators",
            UpdateScope::ReleaseDates => "release-dates",
        }
    }
}

impl fmt::Display for UpdateScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UpdateScope {
    type Err = ArchiveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().replace('_', "-");
        Self::ALL
            .iter()
            .copied()
            .find(|scope| scope.as_str().eq_ignore_ascii_case(&name))
            .ok_or_else(|| ArchiveError::UnknownValue {
                kind: "update scope",
                value: s.to_string(),
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    Create,
    Update(UpdateScope),
    Remove,
}

/// What a write did to the archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Created { observation_id: i64 },
    /// An artifact with the same path exists; nothing was written.
    AlreadyPresent,
    Updated { observation_id: i64, scope: UpdateScope },
    Removed { observation_id: i64 },
    /// Nothing to remove.
    Absent,
}

impl WriteOutcome {
    /// Short name used in logs and run summaries.
    pub fn label(&self) -> &'static str {
        match self {
            WriteOutcome::Created { .. } => "created",
            WriteOutcome::AlreadyPresent => "already_present",
            WriteOutcome::Updated { .. } => "updated",
            WriteOutcome::Removed { .. } => "removed",
            WriteOutcome::Absent => "absent",
        }
    }
}

/// Persistent store for observation graphs.
///
/// Every call is atomic: either the complete effect on one exposure file is
/// visible afterwards or nothing is.
#[async_trait]
pub trait Archive: Send + Sync {
    /// Insert the graph unless its artifact path is already archived.
    async fn create(&self, graph: &ObservationGraph) -> ArchiveResult<WriteOutcome>;

    /// Refresh an existing observation. Never creates one.
    async fn update(
        &self,
        graph: &ObservationGraph,
        scope: UpdateScope,
    ) -> ArchiveResult<WriteOutcome>;

    /// Delete the observation owning the artifact at `artifact_path`.
    ///
    /// Shared entities (proposal, institution, telescope, target) stay.
    async fn remove(&self, artifact_path: &str) -> ArchiveResult<WriteOutcome>;

    async fn contains_artifact(&self, artifact_path: &str) -> ArchiveResult<bool>;

    async fn write(&self, graph: &ObservationGraph, mode: WriteMode) -> ArchiveResult<WriteOutcome> {
        match mode {
            WriteMode::Create => self.create(graph).await,
            WriteMode::Update(scope) => self.update(graph, scope).await,
            WriteMode::Remove => self.remove(&graph.artifact.path).await,
        }
    }
}

/// Day against which proprietary periods are judged.
pub(crate) fn today() -> NaiveDate {
    Utc::now().date_naive()
}

/// Position owners for an observation: the investigators while the
/// metadata is proprietary, public otherwise.
pub(crate) fn position_owners(
    meta_release: NaiveDate,
    investigators: &[String],
    today: NaiveDate,
) -> Option<Vec<String>> {
    if meta_release > today {
        let mut owners = investigators.to_vec();
        owners.sort();
        owners.dedup();
        Some(owners)
    } else {
        None
    }
}

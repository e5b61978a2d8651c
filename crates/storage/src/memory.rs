//! In-memory archive for dummy runs and tests.
//!
//! Mirrors the PostgreSQL archive: entities are resolved by natural key, an
//! artifact path is archived at most once and removal leaves shared entities
//! in place. Each write holds the state lock for its whole duration, and all
//! checks that can fail run before anything is modified.

use archive_common::{
    ArchiveError, ArchiveResult, Institution, ObservationGraph, ProposalRecord, Telescope,
};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use crate::archive::{position_owners, today, Archive, UpdateScope, WriteOutcome};

type ProposalKey = (String, Institution);

#[derive(Debug, Clone, Default)]
pub struct MemoryArchive {
    state: Arc<Mutex<State>>,
}

#[derive(Debug, Default)]
struct State {
    next_id: i64,
    institutions: BTreeMap<Institution, i64>,
    telescopes: BTreeMap<Telescope, i64>,
    proposals: BTreeMap<ProposalKey, StoredProposal>,
    target_types: BTreeMap<String, i64>,
    /// (name, target type id) to target id.
    targets: BTreeMap<(String, i64), i64>,
    observations: BTreeMap<i64, StoredObservation>,
    /// Artifact path to observation id.
    artifacts: HashMap<String, i64>,
}

#[derive(Debug)]
struct StoredProposal {
    id: i64,
    record: ProposalRecord,
}

#[derive(Debug)]
struct StoredObservation {
    graph: ObservationGraph,
    proposal: Option<ProposalKey>,
}

impl State {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn resolve_institution(&mut self, institution: Institution) -> i64 {
        if let Some(id) = self.institutions.get(&institution) {
            return *id;
        }
        let id = self.next_id();
        self.institutions.insert(institution, id);
        id
    }

    fn resolve_telescope(&mut self, telescope: Telescope) -> i64 {
        if let Some(id) = self.telescopes.get(&telescope) {
            return *id;
        }
        let id = self.next_id();
        self.telescopes.insert(telescope, id);
        id
    }

    fn resolve_target_type(&mut self, numeric_code: &str) -> i64 {
        if let Some(id) = self.target_types.get(numeric_code) {
            return *id;
        }
        let id = self.next_id();
        self.target_types.insert(numeric_code.to_string(), id);
        id
    }

    fn resolve_target(&mut self, name: &str, target_type: &str) -> i64 {
        let target_type_id = self.resolve_target_type(target_type);
        let key = (name.to_string(), target_type_id);
        if let Some(id) = self.targets.get(&key) {
            return *id;
        }
        let id = self.next_id();
        self.targets.insert(key, id);
        id
    }

    /// Resolve by (code, institution), adding unknown investigators.
    fn resolve_proposal(&mut self, proposal: &ProposalRecord) -> ProposalKey {
        self.resolve_institution(proposal.institution);
        let key = (proposal.code.clone(), proposal.institution);
        match self.proposals.get_mut(&key) {
            Some(stored) => {
                if proposal.title.is_some() {
                    stored.record.title = proposal.title.clone();
                }
                if proposal.principal_investigator.is_some() {
                    stored.record.principal_investigator = proposal.principal_investigator.clone();
                }
                for investigator in &proposal.investigators {
                    if !stored.record.investigators.contains(investigator) {
                        stored.record.investigators.push(investigator.clone());
                    }
                }
            }
            None => {
                let id = self.next_id();
                let mut record = proposal.clone();
                record.investigators.sort();
                record.investigators.dedup();
                self.proposals.insert(key.clone(), StoredProposal { id, record });
            }
        }
        key
    }

    fn resolve_references(&mut self, graph: &ObservationGraph) -> Option<ProposalKey> {
        self.resolve_telescope(graph.observation.telescope);
        if let Some(target) = &graph.target {
            self.resolve_target(&target.name, &target.target_type);
        }
        graph.proposal.as_ref().map(|p| self.resolve_proposal(p))
    }

    fn investigators(&self, key: &ProposalKey) -> Vec<String> {
        self.proposals
            .get(key)
            .map(|p| p.record.investigators.clone())
            .unwrap_or_default()
    }

    fn reconcile_observation(&mut self, observation_id: i64, today: NaiveDate) {
        let Some(proposal) = self
            .observations
            .get(&observation_id)
            .map(|o| o.proposal.clone())
        else {
            return;
        };
        let investigators = proposal
            .as_ref()
            .map(|key| self.investigators(key))
            .unwrap_or_default();
        if let Some(stored) = self.observations.get_mut(&observation_id) {
            let meta_release = stored.graph.observation.meta_release;
            if let Some(position) = stored.graph.position.as_mut() {
                position.owners = match proposal {
                    Some(_) => position_owners(meta_release, &investigators, today),
                    None => None,
                };
            }
        }
    }

    fn reconcile_proposal(&mut self, key: &ProposalKey, today: NaiveDate) {
        let ids: Vec<i64> = self
            .observations
            .iter()
            .filter(|(_, o)| o.proposal.as_ref() == Some(key))
            .map(|(id, _)| *id)
            .collect();
        for id in ids {
            self.reconcile_observation(id, today);
        }
    }
}

impl MemoryArchive {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn observation_count(&self) -> usize {
        self.state.lock().await.observations.len()
    }

    pub async fn artifact_count(&self) -> usize {
        self.state.lock().await.artifacts.len()
    }

    pub async fn proposal_count(&self) -> usize {
        self.state.lock().await.proposals.len()
    }

    pub async fn institution_count(&self) -> usize {
        self.state.lock().await.institutions.len()
    }

    pub async fn telescope_count(&self) -> usize {
        self.state.lock().await.telescopes.len()
    }

    pub async fn target_count(&self) -> usize {
        self.state.lock().await.targets.len()
    }

    pub async fn target_type_count(&self) -> usize {
        self.state.lock().await.target_types.len()
    }

    /// Stored graph of the observation owning the artifact at `path`.
    pub async fn observation(&self, path: &str) -> Option<ObservationGraph> {
        let state = self.state.lock().await;
        let id = state.artifacts.get(path)?;
        state.observations.get(id).map(|o| o.graph.clone())
    }

    pub async fn proposal(&self, code: &str, institution: Institution) -> Option<ProposalRecord> {
        let state = self.state.lock().await;
        state
            .proposals
            .get(&(code.to_string(), institution))
            .map(|p| p.record.clone())
    }

    /// Surrogate id a proposal was given on first resolution.
    pub async fn proposal_id(&self, code: &str, institution: Institution) -> Option<i64> {
        let state = self.state.lock().await;
        state
            .proposals
            .get(&(code.to_string(), institution))
            .map(|p| p.id)
    }
}

#[async_trait]
impl Archive for MemoryArchive {
    async fn create(&self, graph: &ObservationGraph) -> ArchiveResult<WriteOutcome> {
        graph.validate()?;
        let mut state = self.state.lock().await;
        if state.artifacts.contains_key(&graph.artifact.path) {
            debug!(path = %graph.artifact.path, "Artifact already archived");
            return Ok(WriteOutcome::AlreadyPresent);
        }

        let proposal = state.resolve_references(graph);
        let observation_id = state.next_id();
        let mut stored = graph.clone();
        if let Some(position) = stored.position.as_mut() {
            position.owners = None;
        }
        state.observations.insert(
            observation_id,
            StoredObservation {
                graph: stored,
                proposal: proposal.clone(),
            },
        );
        state
            .artifacts
            .insert(graph.artifact.path.clone(), observation_id);
        if let Some(key) = proposal {
            state.reconcile_proposal(&key, today());
        }
        Ok(WriteOutcome::Created { observation_id })
    }

    async fn update(
        &self,
        graph: &ObservationGraph,
        scope: UpdateScope,
    ) -> ArchiveResult<WriteOutcome> {
        graph.validate()?;
        let mut state = self.state.lock().await;
        let observation_id = *state
            .artifacts
            .get(&graph.artifact.path)
            .ok_or_else(|| ArchiveError::ObservationNotFound(graph.artifact.path.clone()))?;

        match scope {
            UpdateScope::All => {
                let proposal = state.resolve_references(graph);
                if let Some(stored) = state.observations.get_mut(&observation_id) {
                    let identifier = stored.graph.artifact.identifier;
                    stored.graph = graph.clone();
                    stored.graph.artifact.identifier = identifier;
                    stored.proposal = proposal;
                }
                state.reconcile_observation(observation_id, today());
            }
            UpdateScope::Status => {
                if let Some(stored) = state.observations.get_mut(&observation_id) {
                    stored.graph.observation.status = graph.observation.status;
                }
            }
            UpdateScope::Investigators => {
                if let Some(proposal) = &graph.proposal {
                    let key = state.resolve_proposal(proposal);
                    if let Some(stored) = state.proposals.get_mut(&key) {
                        let mut investigators = proposal.investigators.clone();
                        investigators.sort();
                        investigators.dedup();
                        stored.record.investigators = investigators;
                    }
                    state.reconcile_proposal(&key, today());
                }
            }
            UpdateScope::ReleaseDates => {
                if let Some(stored) = state.observations.get_mut(&observation_id) {
                    stored.graph.observation.data_release = graph.observation.data_release;
                    stored.graph.observation.meta_release = graph.observation.meta_release;
                }
                state.reconcile_observation(observation_id, today());
            }
        }

        Ok(WriteOutcome::Updated {
            observation_id,
            scope,
        })
    }

    async fn remove(&self, artifact_path: &str) -> ArchiveResult<WriteOutcome> {
        let mut state = self.state.lock().await;
        let Some(observation_id) = state.artifacts.remove(artifact_path) else {
            return Ok(WriteOutcome::Absent);
        };
        state.observations.remove(&observation_id);
        Ok(WriteOutcome::Removed { observation_id })
    }

    async fn contains_artifact(&self, artifact_path: &str) -> ArchiveResult<bool> {
        Ok(self.state.lock().await.artifacts.contains_key(artifact_path))
    }
}

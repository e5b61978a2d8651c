//! Assembly of the observation graph written to the archive.

use archive_common::{
    BlockVisit, Institution, Observation, ObservationGraph, ObservationGroup, ObservationStatus,
    Plane, ProposalRecord,
};

use crate::classify;
use crate::derive::DerivedExposure;
use crate::error::Result;

impl DerivedExposure {
    /// Combine derived properties with what the science database knows
    /// about the block visit.
    ///
    /// Without block visit information the observation is public from its
    /// night on and accepted; the proposal is then taken from the header
    /// when the file belongs to a block visit.
    pub fn into_graph(self, block_visit: Option<&BlockVisit>) -> Result<ObservationGraph> {
        let night = self
            .time
            .as_ref()
            .map(|t| t.night)
            .unwrap_or(self.observation_date);

        let (data_release, meta_release, status) = match block_visit {
            Some(visit) => (visit.data_release, visit.meta_release, visit.status),
            None => (night, night, ObservationStatus::Accepted),
        };

        let proposal = match (block_visit, &self.proposal_code, self.block_visit_id) {
            (Some(visit), _, _) => Some(visit.proposal.clone()),
            (None, Some(code), Some(_)) => Some(ProposalRecord {
                code: code.clone(),
                institution: Institution::Salt,
                title: None,
                principal_investigator: None,
                investigators: Vec::new(),
            }),
            _ => None,
        };

        let group = self.block_visit_id.map(|id| ObservationGroup {
            identifier: id.to_string(),
            name: format!("SALT-{}", id),
        });

        let target = classify::target(
            &self.setup,
            self.block_visit_id.is_some(),
            block_visit.and_then(|v| v.target_type.as_deref()),
        );

        let graph = ObservationGraph {
            observation: Observation {
                data_release,
                meta_release,
                intent: self.product_type.intent(),
                status,
                instrument: self.instrument,
                telescope: self.instrument.telescope(),
                group,
                instrument_setup: self.setup.to_map(),
            },
            proposal,
            target,
            plane: Plane {
                product_id: self.product_id,
                data_product_type: self.data_product_type,
            },
            energy: self.energy,
            polarization: self.polarization,
            position: self.position,
            time: self.time,
            artifact: self.artifact,
        };
        graph.validate()?;
        Ok(graph)
    }
}

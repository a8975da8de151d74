//! Agent directory
//!
//! Registry of the human agents calls can be fanned out to. The reconciler
//! uses it to resolve which agent actually picked up a dialed leg; a call is
//! never marked answered unless that resolution succeeds.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::geo;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AgentIdentity {
    pub identifier: String,
    pub display_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRecord {
    pub identifier: String,
    pub display_name: String,
    /// Dialable address: a phone number or a `client:` endpoint.
    pub address: String,
    pub active: bool,
    pub registered_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterAgentRequest {
    pub identifier: String,
    pub display_name: String,
    pub address: String,
}

#[derive(Default)]
pub struct AgentDirectory {
    agents: DashMap<String, AgentRecord>,
}

impl AgentDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, req: RegisterAgentRequest) -> AgentRecord {
        let record = AgentRecord {
            identifier: req.identifier.clone(),
            display_name: req.display_name,
            address: req.address,
            active: true,
            registered_at: Utc::now(),
        };
        self.agents.insert(req.identifier, record.clone());
        tracing::info!(agent = %record.identifier, address = %record.address, "agent registered");
        record
    }

    pub fn set_active(&self, identifier: &str, active: bool) -> bool {
        match self.agents.get_mut(identifier) {
            Some(mut agent) => {
                agent.active = active;
                true
            }
            None => false,
        }
    }

    /// Resolve the agent behind a dialed address. `client:` endpoints match
    /// exactly; phone numbers compare on normalized digits.
    pub fn resolve_by_address(&self, address: &str) -> Option<AgentIdentity> {
        let wanted_digits = geo::normalize_number(address);
        self.agents
            .iter()
            .filter(|a| a.active)
            .find(|a| {
                a.address == address
                    || (!wanted_digits.is_empty()
                        && geo::normalize_number(&a.address) == wanted_digits)
            })
            .map(|a| AgentIdentity {
                identifier: a.identifier.clone(),
                display_name: a.display_name.clone(),
            })
    }

    /// Agents currently available for fan-out dialing.
    pub fn active_agents(&self) -> Vec<AgentRecord> {
        self.agents
            .iter()
            .filter(|a| a.active)
            .map(|a| a.value().clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn directory() -> AgentDirectory {
        let dir = AgentDirectory::new();
        dir.register(RegisterAgentRequest {
            identifier: "WK1".into(),
            display_name: "Arthur".into(),
            address: "client:arthur".into(),
        });
        dir.register(RegisterAgentRequest {
            identifier: "WK2".into(),
            display_name: "Eduarda".into(),
            address: "+1 (415) 555-0142".into(),
        });
        dir
    }

    #[test]
    fn resolves_client_addresses_exactly() {
        let dir = directory();
        let agent = dir.resolve_by_address("client:arthur").unwrap();
        assert_eq!(agent.identifier, "WK1");
        assert!(dir.resolve_by_address("client:nobody").is_none());
    }

    #[test]
    fn resolves_numbers_on_normalized_digits() {
        let dir = directory();
        let agent = dir.resolve_by_address("14155550142").unwrap();
        assert_eq!(agent.display_name, "Eduarda");
    }

    #[test]
    fn inactive_agents_do_not_resolve() {
        let dir = directory();
        dir.set_active("WK1", false);
        assert!(dir.resolve_by_address("client:arthur").is_none());
        assert_eq!(dir.active_agents().len(), 1);
    }
}

//! In-memory organisation and individual directory.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use consentry_core::{
    error::Result, Individual, IndividualDirectory, IndividualId, Organisation,
    OrganisationDirectory, OrganisationId,
};
use tokio::sync::RwLock;

/// Directory backed by maps that tests fill in directly.
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    organisations: Arc<RwLock<HashMap<OrganisationId, Organisation>>>,
    individuals: Arc<RwLock<HashMap<IndividualId, Individual>>>,
}

impl StaticDirectory {
    /// Creates an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces an organisation.
    pub async fn put_organisation(&self, organisation: Organisation) {
        self.organisations.write().await.insert(organisation.id, organisation);
    }

    /// Adds or replaces an individual.
    pub async fn put_individual(&self, individual: Individual) {
        self.individuals.write().await.insert(individual.id, individual);
    }
}

#[async_trait]
impl OrganisationDirectory for StaticDirectory {
    async fn organisation(&self, id: OrganisationId) -> Result<Option<Organisation>> {
        Ok(self.organisations.read().await.get(&id).cloned())
    }
}

#[async_trait]
impl IndividualDirectory for StaticDirectory {
    async fn individual(&self, id: IndividualId) -> Result<Option<Individual>> {
        Ok(self.individuals.read().await.get(&id).cloned())
    }
}

//! Business logic services

pub mod catalog;
pub mod lending;
pub mod members;

use std::sync::Arc;

use crate::{config::LendingConfig, error::AppResult, repository::LendingStore};

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub catalog: catalog::CatalogService,
    pub members: members::MembersService,
    pub lending: lending::LendingService,
    store: Arc<dyn LendingStore>,
}

impl Services {
    /// Create all services over the given store
    pub fn new(store: Arc<dyn LendingStore>, lending_config: LendingConfig) -> Self {
        Self {
            catalog: catalog::CatalogService::new(store.clone()),
            members: members::MembersService::new(store.clone()),
            lending: lending::LendingService::new(store.clone(), lending_config),
            store,
        }
    }

    /// Check the store is reachable
    pub async fn ping(&self) -> AppResult<()> {
        self.store.ping().await
    }
}

//! Per-invocation engine context.

use crate::core::state_store::StateStore;
use crate::deployer::AppGroupDeployer;
use std::sync::Arc;

/// Shared collaborators handed to the executor and the rollback engine.
#[derive(Clone)]
pub struct EngineContext {
    pub store: Arc<StateStore>,
    pub deployer: Arc<dyn AppGroupDeployer>,
}

impl EngineContext {
    /// Create a context.
    pub fn new(store: Arc<StateStore>, deployer: Arc<dyn AppGroupDeployer>) -> Self {
        Self { store, deployer }
    }
}

//! Definition and instance services plus the [`Workflow`] facade that wires
//! them to one store and one clock.

pub mod definitions;
pub mod instances;

pub use definitions::DefinitionService;
pub use instances::InstanceService;

use std::sync::Arc;

use crate::clock::{Clock, SystemClock};
use crate::store::WorkflowStore;

/// Entry point used by transport adapters.
pub struct Workflow {
    pub definitions: DefinitionService,
    pub instances: InstanceService,
}

impl Workflow {
    /// Build both services over `store`, sharing a single clock.
    pub fn new(store: Arc<dyn WorkflowStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            definitions: DefinitionService::new(store.clone(), clock.clone()),
            instances: InstanceService::new(store, clock),
        }
    }

    /// Same as [`Workflow::new`] with a [`SystemClock`].
    pub fn with_store(store: Arc<dyn WorkflowStore>) -> Self {
        Self::new(store, Arc::new(SystemClock::new()))
    }
}

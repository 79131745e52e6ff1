//! `engine` crate: approval workflow domain models, the storage port, and
//! the definition/instance services that drive the state machine.

pub mod models;
pub mod error;
pub mod clock;
pub mod lint;
pub mod store;
pub mod service;

pub use models::{FlowDefinition, FlowInstance, FlowNode, FlowNodeType, InstanceAction, InstanceStatus, TaskAction};
pub use error::{EngineError, ErrorKind};
pub use clock::{Clock, SystemClock};
pub use lint::{inspect_nodes, DefinitionIssue};
pub use store::{MemoryStore, WorkflowStore};
pub use service::{DefinitionService, InstanceService, Workflow};

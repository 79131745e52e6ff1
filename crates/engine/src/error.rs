//! Engine-level error types.
//!
//! The display strings are part of the wire contract: the HTTP adapter
//! returns them verbatim in `{"error": "..."}` bodies.

use thiserror::Error;

/// Errors produced by the workflow engine (validation, state machine, storage).
#[derive(Debug, Error)]
pub enum EngineError {
    // ------ Validation errors ------

    #[error("code is required")]
    CodeRequired,

    #[error("at least one node is required")]
    NodesRequired,

    #[error("business id required")]
    BusinessIdRequired,

    #[error("unsupported action")]
    UnsupportedAction,

    // ------ Lookup errors ------

    #[error("definition not found")]
    DefinitionNotFound,

    #[error("instance not found")]
    InstanceNotFound,

    // ------ State machine errors ------

    /// The instance already reached `approved` or `rejected`.
    #[error("instance already closed")]
    InstanceClosed,

    // ------ Store guards ------

    #[error("definition id required")]
    DefinitionIdRequired,

    #[error("instance id required")]
    InstanceIdRequired,

    /// Another definition already owns this code.
    #[error("definition code already in use")]
    DuplicateCode(String),

    /// A write was computed from a stale copy of the instance.
    #[error("instance was modified concurrently")]
    Conflict(String),

    /// Backend failure (connection, SQL, decoding).
    #[error("storage error: {0}")]
    Storage(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Coarse classification used by transport adapters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    Storage,
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::CodeRequired
            | Self::NodesRequired
            | Self::BusinessIdRequired
            | Self::UnsupportedAction
            | Self::InstanceClosed
            | Self::DefinitionIdRequired
            | Self::InstanceIdRequired => ErrorKind::Validation,
            Self::DefinitionNotFound | Self::InstanceNotFound => ErrorKind::NotFound,
            Self::DuplicateCode(_) | Self::Conflict(_) => ErrorKind::Conflict,
            Self::Storage(_) => ErrorKind::Storage,
        }
    }

    /// Wrap any backend error.
    pub fn storage(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Storage(Box::new(err))
    }
}

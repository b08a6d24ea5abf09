//! Common error types used across the workspace.
//!
//! Each layer defines its own typed errors; [`TmplHubError`] gathers them
//! through `#[from]` conversions. Adapters convert their own errors into
//! [`TmplHubError::Source`].

use crate::blueprint::{BlueprintError, InputError};
use crate::id::EntityId;
use crate::schema::SchemaError;
use crate::template::{EvaluationError, TemplateSyntaxError};

/// Lifecycle violations raised by the entity runtime.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RuntimeError {
    /// An entity tried to publish after it was torn down.
    #[error("entity {entity_id} published after teardown")]
    PublishAfterTeardown { entity_id: EntityId },

    #[error("entity {0} is already active")]
    AlreadyActive(EntityId),

    #[error("entity {0} not found")]
    EntityNotFound(EntityId),
}

#[derive(Debug, thiserror::Error)]
pub enum TmplHubError {
    #[error("invalid configuration")]
    Schema(#[from] SchemaError),

    #[error("blueprint error")]
    Blueprint(#[from] BlueprintError),

    #[error("invalid blueprint input")]
    Input(#[from] InputError),

    #[error("template evaluation failed")]
    Evaluation(#[from] EvaluationError),

    #[error("template syntax error")]
    TemplateSyntax(#[from] TemplateSyntaxError),

    #[error("runtime error")]
    Runtime(#[from] RuntimeError),

    /// Failure of an external source (filesystem, decoder, …).
    #[error("source error")]
    Source(#[source] Box<dyn std::error::Error + Send + Sync>),
}

//! Errors raised by the model layer.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    #[error("symbol table is frozen; cannot register `{id}`")]
    Frozen { id: String },

    #[error("`{id}` is already registered")]
    Duplicate { id: String },

    #[error("`{from}` references unknown {kind} `{target}`")]
    UnresolvedReference {
        from: String,
        kind: &'static str,
        target: String,
    },

    #[error("invalid service configuration: {0}")]
    ServiceConfig(String),

    #[error("{} model errors:\n{}", .0.len(), render_all(.0))]
    Aggregate(Vec<ModelError>),
}

impl ModelError {
    pub(crate) fn unresolved(
        from: impl Into<String>,
        kind: &'static str,
        target: impl Into<String>,
    ) -> Self {
        ModelError::UnresolvedReference {
            from: from.into(),
            kind,
            target: target.into(),
        }
    }

    /// Collapse a list of errors: `Ok` when empty, the error itself when
    /// there is exactly one, `Aggregate` otherwise.
    pub fn collect(mut errors: Vec<ModelError>) -> Result<(), ModelError> {
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(ModelError::Aggregate(errors)),
        }
    }
}

fn render_all(errors: &[ModelError]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {e}"))
        .collect::<Vec<_>>()
        .join("\n")
}

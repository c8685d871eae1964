use std::io;

use thiserror::Error;

pub type Result<T, E = GenerateError> = std::result::Result<T, E>;

/// Failures surfaced by the generation core.
///
/// The core recovers nothing internally; every error propagates to the
/// orchestrator, which is the only component allowed to write the abort
/// marker.
#[derive(Debug, Error)]
pub enum GenerateError {
    /// The declarative entity model is inconsistent: missing identifier,
    /// unresolvable inheritance, unsupported id shape, unsatisfiable
    /// provider constructor.
    #[error("model error: {0}")]
    Model(String),

    /// A deferred update can never be resolved because its target entity
    /// was never written.
    #[error("unresolved reference: {0}")]
    Reference(String),

    /// The model requires a feature the active dialect does not offer.
    #[error("dialect error: {0}")]
    Dialect(String),

    /// The statements writer or its sink failed.
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl GenerateError {
    pub fn model(message: impl Into<String>) -> Self {
        GenerateError::Model(message.into())
    }

    pub fn reference(message: impl Into<String>) -> Self {
        GenerateError::Reference(message.into())
    }

    pub fn dialect(message: impl Into<String>) -> Self {
        GenerateError::Dialect(message.into())
    }
}

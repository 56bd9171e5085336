//! Error types shared across the crate.

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, RelationError>;

/// All the ways building or evaluating a relation tree can fail.
///
/// Construction errors (`Column`, `Engine`, `Invariant`, `NotImplemented`)
/// surface immediately from the factory that detected them and unwind any
/// partial build. `Execution` wraps a backend failure raised while a tree
/// was being driven to a payload; the crate never retries.
#[derive(Debug, Error)]
pub enum RelationError {
    /// A referenced column is absent, duplicated, or otherwise unusable.
    #[error("column error: {0}")]
    Column(String),

    /// An operation or expression is not supported by the target engine.
    #[error("engine error: {0}")]
    Engine(String),

    /// A structural invariant was violated (mismatched operand engines,
    /// unequal chain columns, payload double-assignment, ...).
    #[error("invariant violation: {0}")]
    Invariant(String),

    /// An engine backend failed while executing a conformed tree.
    #[error("execution failed: {message}")]
    Execution {
        message: String,
        #[source]
        source: anyhow::Error,
    },

    /// A syntactically valid operation that the engine has declared it
    /// cannot realize (e.g. a join on the iteration engine).
    #[error("not implemented by engine: {0}")]
    NotImplemented(String),
}

impl RelationError {
    pub fn column(message: impl Into<String>) -> Self {
        RelationError::Column(message.into())
    }

    pub fn engine(message: impl Into<String>) -> Self {
        RelationError::Engine(message.into())
    }

    pub fn invariant(message: impl Into<String>) -> Self {
        RelationError::Invariant(message.into())
    }

    pub fn execution(message: impl Into<String>, source: anyhow::Error) -> Self {
        RelationError::Execution {
            message: message.into(),
            source,
        }
    }

    pub fn not_implemented(message: impl Into<String>) -> Self {
        RelationError::NotImplemented(message.into())
    }
}

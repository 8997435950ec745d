//! Error types for the evolution engine
//!
//! Parse failures of persisted documents never show up here: the stores
//! replace unreadable documents with defaults and log a warning instead.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EvolutionError {
    /// Skill has no recorded stats
    #[error("Skill not found: {0}")]
    NotFound(String),

    /// Reading or writing a persisted document failed
    #[error("Failed to persist {document}: {source}")]
    Persistence {
        document: String,
        #[source]
        source: std::io::Error,
    },

    /// Caller input rejected before any mutation
    #[error("Invalid input: {0}")]
    Validation(String),
}

impl EvolutionError {
    pub fn persistence(document: &str, source: std::io::Error) -> Self {
        Self::Persistence {
            document: document.to_string(),
            source,
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}

pub type Result<T> = std::result::Result<T, EvolutionError>;

//! Error types for the metapopulation simulator.
//!
//! Rejection by the dynamic filter is NOT an error: it is an ordinary
//! outcome of integration (see [`crate::seir::IntegrationOutcome`]).

use thiserror::Error;

/// Unified error type for setup validation, collaborators and I/O.
#[derive(Error, Debug)]
pub enum SeirError {
    /// Configuration failed validation before any realization started.
    #[error("Configuration error: {0}")]
    InvalidConfig(String),

    /// A node name was referenced that is not part of the setup.
    #[error("Unknown node '{0}'")]
    UnknownNode(String),

    /// Mobility edge referencing a node index outside the graph.
    #[error("Mobility edge {origin} -> {destination} out of range for {n_nodes} nodes")]
    EdgeOutOfRange {
        origin: usize,
        destination: usize,
        n_nodes: usize,
    },

    /// An array handed over by a collaborator has the wrong shape.
    #[error("{what}: expected shape {expected:?}, found {found:?}")]
    ShapeMismatch {
        what: &'static str,
        expected: (usize, usize),
        found: (usize, usize),
    },

    /// An external collaborator (NPI or parameter draw) failed for a realization.
    #[error("Realization {uid}: {message}")]
    Collaborator { uid: usize, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Worker pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("Progress bar template error: {0}")]
    ProgressTemplate(#[from] indicatif::style::TemplateError),
}

impl SeirError {
    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        SeirError::InvalidConfig(message.into())
    }

    /// Creates a collaborator failure for realization `uid`.
    pub fn collaborator(uid: usize, message: impl Into<String>) -> Self {
        SeirError::Collaborator {
            uid,
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SeirError>;

//! Fatal build errors
//!
//! Non-fatal problems are [`crate::issues::Issue`]s and never surface here.

use std::path::PathBuf;
use thiserror::Error;

use crate::builder::BuildState;
use crate::stages::StageKind;

#[derive(Debug, Error)]
pub enum BuildError {
    /// A selected stage's prerequisites are not met; nothing was executed
    #[error("Precondition failed for stage '{stage}': {reason}")]
    Precondition { stage: StageKind, reason: String },

    /// A stage failed while executing; later stages did not run
    #[error("Stage '{stage}' failed")]
    Stage {
        stage: StageKind,
        #[source]
        source: anyhow::Error,
    },

    /// The finished build violates a global invariant tied to configuration
    #[error("{message} See build config '{start_key}' and '{end_key}'")]
    Configuration {
        message: String,
        start_key: &'static str,
        end_key: &'static str,
    },

    /// `run` was called on a builder that is not in the configured state
    #[error("Graph builder cannot run from state {0:?}")]
    InvalidState(BuildState),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid config {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Unknown feature '{name}'{}", suggestion_hint(.suggestion))]
    UnknownFeature {
        name: String,
        suggestion: Option<String>,
    },
}

fn suggestion_hint(suggestion: &Option<String>) -> String {
    match suggestion {
        Some(name) => format!(" (did you mean '{name}'?)"),
        None => String::new(),
    }
}

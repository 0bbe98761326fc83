//! Processor errors

use std::path::PathBuf;

use thiserror::Error;

use crate::types::Phase;

/// Processor result type
pub type Result<T> = std::result::Result<T, Error>;

/// Processor errors
#[derive(Debug, Error)]
pub enum Error {
    #[error(
        "{operation} is only allowed in the {expected:?} phase (current phase: {actual:?})"
    )]
    PhaseViolation {
        operation: &'static str,
        expected: Phase,
        actual: Option<Phase>,
    },

    #[error("only class '{expected}' may be touched while writing it (capture owned by '{actual}')")]
    WrongWritingClass { expected: String, actual: String },

    #[error("cyclic dependencies between transformers: {ids:?}")]
    CyclicDependency { ids: Vec<String> },

    #[error("class not found: {0}")]
    UnknownClass(String),

    #[error("write target must be a reference capture, not a copy capture")]
    InvalidCaptureTarget,

    #[error("reference captures must target a node inside a class tree")]
    CaptureOutsideClass,

    #[error("capture path no longer resolves in class '{class}'")]
    StaleCapture { class: String },

    #[error("error reading class '{class}', did it get deleted?")]
    Io {
        class: String,
        #[source]
        source: std::io::Error,
    },

    #[error("jar could not be read: {path}")]
    JarUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("class bytecode not present on the platform: {0}")]
    TypeNotPresent(String),

    #[error(transparent)]
    Tree(#[from] reweave_tree::TreeError),
}

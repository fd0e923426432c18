//! Typed errors for the segment / classification / cache core.
//!
//! The signal-processing and file-format modules return `anyhow::Result`;
//! their failures reach callers of the core as [`Error::Format`].
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// The trigger stream cannot possibly contain the experiment.
    #[error("found {found} {kind} trigger events, need at least {expected}")]
    InsufficientEvents {
        kind: &'static str,
        found: usize,
        expected: usize,
    },

    #[error("tone sequence log not found: {}", path.display())]
    ToneLogNotFound { path: PathBuf },

    #[error("tone sequence log {} has {tones} tones but the segment has {events} events", path.display())]
    ToneLogTooShort {
        path: PathBuf,
        tones: usize,
        events: usize,
    },

    #[error("malformed tone sequence log {}: {message}", path.display())]
    MalformedToneLog { path: PathBuf, message: String },

    /// The source path is outside `raw-data/` and no override was given.
    #[error(
        "{} is not inside a raw-data directory; pass --force to write outputs to {}",
        source_path.display(),
        fallback.display()
    )]
    MissingDirectoryStructure {
        source_path: PathBuf,
        fallback: PathBuf,
    },

    #[error("I/O error while {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error while {context}: {source}")]
    Json {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Format(#[from] anyhow::Error),
}

impl Error {
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io { context: context.into(), source }
    }

    pub(crate) fn json(context: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Json { context: context.into(), source }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

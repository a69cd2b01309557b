//! Failure taxonomy for the configurator
//!
//! Every operation returns `anyhow::Result`. Failures that callers need to tell
//! apart are raised as a [`ConfiguratorError`] inside the `anyhow::Error`, and
//! [`error_kind`] classifies any error chain into one of four buckets.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfiguratorError {
    #[error("{component} is missing required configuration: {}", keys.join(", "))]
    MissingConfiguration {
        component: &'static str,
        keys: Vec<&'static str>,
    },

    #[error("Invalid value {value:?} for {key}: {reason}")]
    InvalidConfiguration {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("{what} not found at {}", path.display())]
    NotFound { what: &'static str, path: PathBuf },

    #[error("Malformed server configuration: {0}")]
    MalformedServerConfig(String),

    #[error("Unsupported keystore type: {0}")]
    UnsupportedStoreType(String),
}

/// Coarse classification used by callers and tests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Io,
    Structural,
    SecurityProvider,
}

impl ConfiguratorError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ConfiguratorError::MissingConfiguration { .. }
            | ConfiguratorError::InvalidConfiguration { .. } => ErrorKind::Configuration,
            ConfiguratorError::NotFound { .. } => ErrorKind::Io,
            ConfiguratorError::MalformedServerConfig(_) => ErrorKind::Structural,
            ConfiguratorError::UnsupportedStoreType(_) => ErrorKind::SecurityProvider,
        }
    }
}

/// Walk the error chain and report the first recognizable failure class.
pub fn error_kind(err: &anyhow::Error) -> Option<ErrorKind> {
    err.chain().find_map(|cause| {
        if let Some(e) = cause.downcast_ref::<ConfiguratorError>() {
            Some(e.kind())
        } else if cause.is::<std::io::Error>() || cause.is::<zip::result::ZipError>() {
            Some(ErrorKind::Io)
        } else if cause.is::<xmltree::ParseError>() {
            Some(ErrorKind::Structural)
        } else if cause.is::<openssl::error::ErrorStack>() {
            Some(ErrorKind::SecurityProvider)
        } else {
            None
        }
    })
}

/// Remove a file, treating "already gone" as success.
pub(crate) fn remove_file_if_exists(path: &std::path::Path) -> std::io::Result<()> {
    match std::fs::remove_file(path) {
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

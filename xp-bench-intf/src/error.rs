// Copyright (c) Facebook, Inc. and its affiliates.
use std::path::PathBuf;
use thiserror::Error;

/// Failure classes of an experiment run. These travel inside
/// `anyhow::Error` and can be recovered with `downcast_ref::<XpError>()`.
#[derive(Debug, Error)]
pub enum XpError {
    /// Settings or CLI inconsistent with the selected experiment.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// Filter rule that can't be parsed or evaluated against a combination.
    #[error("filter error: {0}")]
    Filter(String),
    /// Admin tool or cloud call reported failure.
    #[error("remote command failed: {0}")]
    RemoteCommand(String),
    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl XpError {
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn filter<S: Into<String>>(msg: S) -> Self {
        Self::Filter(msg.into())
    }

    pub fn remote<S: Into<String>>(msg: S) -> Self {
        Self::RemoteCommand(msg.into())
    }

    pub fn io<P: Into<PathBuf>>(path: P, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }

    pub fn is_filter(&self) -> bool {
        matches!(self, Self::Filter(_))
    }

    pub fn is_remote_command(&self) -> bool {
        matches!(self, Self::RemoteCommand(_))
    }

    pub fn is_io(&self) -> bool {
        matches!(self, Self::Io { .. })
    }
}

/// Classify an error chain, looking through any context layers.
pub fn xp_error(e: &anyhow::Error) -> Option<&XpError> {
    e.chain().find_map(|cause| cause.downcast_ref::<XpError>())
}

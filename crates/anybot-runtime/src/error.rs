//! Runtime error types.

use std::io;

use thiserror::Error;

use crate::config::ConfigError;

/// Errors that stop the runtime from starting or serving.
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("Server error: {0}")]
    Serve(#[source] io::Error),

    #[error("Runtime is already running")]
    AlreadyRunning,
}

pub type RuntimeResult<T> = Result<T, RuntimeError>;

use shared::{BroadcastError, ValidationError};
use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Broadcast(#[from] BroadcastError),

    #[error("Control connection error: {0}")]
    Io(#[from] io::Error),
}

//! Error types shared by the client and server crates.

use thiserror::Error;

/// Rejected connection parameters or member fields
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid screen name {0:?}. Screen name cannot be empty or contain whitespace.")]
    InvalidScreenName(String),

    #[error("Invalid port number {0:?}.")]
    InvalidPort(String),
}

/// Reasons a frame could not be turned into a [`crate::Message`]
///
/// Decoding errors never travel further than the code that read the frame: it logs
/// them and drops the frame.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("unknown verb {0:?}")]
    UnknownVerb(String),

    #[error("malformed {verb} payload: {reason}")]
    Malformed { verb: &'static str, reason: String },
}

impl DecodeError {
    pub(crate) fn malformed(verb: &'static str, reason: impl Into<String>) -> Self {
        DecodeError::Malformed {
            verb,
            reason: reason.into(),
        }
    }
}

/// Failures talking to a broadcast reactor
#[derive(Debug, Error)]
pub enum BroadcastError {
    #[error("broadcast reactor is no longer running")]
    ReactorGone,

    #[error("broadcast endpoint I/O error: {0}")]
    Io(#[from] std::io::Error),
}

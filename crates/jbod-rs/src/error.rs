//! Error types shared by the cache, transport and array client.

use thiserror::Error;

use crate::proto::Command;

/// Coarse outcome classes callers branch on.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    NotFound,
    InvalidArgument,
    StateViolation,
    Io,
}

#[derive(Error, Debug)]
pub enum JbodError {
    /// Out-of-range address, disk, block or length, or a buffer too short for the request.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// Operation not allowed in the current mount, cache or connection state.
    #[error("state violation: {0}")]
    StateViolation(&'static str),

    /// Cache lookup found no valid entry for the key.
    #[error("block (disk {disk}, block {block}) is not cached")]
    NotCached { disk: u32, block: u32 },

    /// Cache insert refused because the key already has a valid entry.
    #[error("block (disk {disk}, block {block}) is already cached")]
    AlreadyCached { disk: u32, block: u32 },

    /// The server answered with a non-zero status.
    #[error("server rejected {command:?} with status {status}")]
    Server { command: Command, status: u16 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl JbodError {
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Self::StateViolation(_) | Self::AlreadyCached { .. } => ErrorKind::StateViolation,
            Self::NotCached { .. } => ErrorKind::NotFound,
            Self::Server { .. } | Self::Io(_) => ErrorKind::Io,
        }
    }
}

pub type Result<T> = std::result::Result<T, JbodError>;

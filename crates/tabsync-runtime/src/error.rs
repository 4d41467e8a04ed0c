//! Error and fault types.
//!
//! [`StoreError`] and [`CodecError`] are returned by the collaborator
//! interfaces. Cells never pass them on; they classify each recovered failure
//! as a [`FaultKind`] instead.

use std::fmt;

use thiserror::Error;

/// Failure reported by a [`Store`](crate::storage::Store).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("storage quota exceeded while writing {key:?}")]
    QuotaExceeded { key: String },

    #[error("storage is unavailable")]
    Unavailable,

    #[error("storage access denied")]
    PermissionDenied,
}

/// Failure reported by a [`Codec`](crate::codec::Codec).
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("cannot encode value: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("cannot decode stored value: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("{message}")]
    Custom { message: String },
}

impl CodecError {
    #[must_use]
    pub fn custom(message: impl Into<String>) -> Self {
        Self::Custom {
            message: message.into(),
        }
    }
}

/// Classification of a failure a cell recovered from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultKind {
    /// The store could not be read; the default was used.
    Read,
    /// A stored string did not decode; the default was used.
    Decode,
    /// The value could not be encoded; the write was abandoned.
    Encode,
    /// The store rejected a write; the write was abandoned.
    Write,
    /// The store rejected a delete; the in-memory value was still reset.
    Delete,
}

impl FaultKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Decode => "decode",
            Self::Encode => "encode",
            Self::Write => "write",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

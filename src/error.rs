//! Crate-wide error taxonomy.
//!
//! Every fallible operation in this crate — path resolution, engine
//! operations, storage adapters, the facade — returns [`Result`]. There is
//! no retry logic anywhere; callers see the first failure untouched.

use std::io;
use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, VfsError>;

/// The error taxonomy from the specification (§7), plus the storage-layer
/// variants a persistent adapter needs to surface.
#[derive(Debug, Error)]
pub enum VfsError {
    /// Rejected by the path resolver: not a string, relative, `//`, or a
    /// disallowed/control character.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// A node or content record does not exist.
    #[error("{0} not found")]
    NotFound(String),

    /// Path collision on create/move/copy.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Type mismatch: read on a directory, write on a directory, a cycle in
    /// a move, or a non-empty directory deleted without `recursive`.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// Deletion of a node with `metadata.isProtected = true`.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// A middleware's `onValidate` hook rejected the content.
    #[error("validation failed: {0}")]
    ValidationFailed(String),

    /// The storage adapter reported a failure; wraps the underlying error.
    #[error("transaction failed: {0}")]
    TransactionFailed(String),

    /// I/O failure from the persistent storage adapter.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A record could not be encoded/decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The WAL or snapshot failed an integrity check (bad magic, bad CRC,
    /// truncated frame).
    #[error("corruption detected: {0}")]
    Corruption(String),

    /// A shared lock was poisoned by a panicking holder.
    #[error("internal lock poisoned: {0}")]
    Lock(String),
}

impl VfsError {
    pub(crate) fn not_found(what: impl Into<String>) -> Self {
        VfsError::NotFound(what.into())
    }

    pub(crate) fn already_exists(path: impl Into<String>) -> Self {
        VfsError::AlreadyExists(path.into())
    }

    pub(crate) fn invalid_operation(msg: impl Into<String>) -> Self {
        VfsError::InvalidOperation(msg.into())
    }
}

impl From<serde_json::Error> for VfsError {
    fn from(e: serde_json::Error) -> Self {
        VfsError::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_messages_are_stable() {
        assert_eq!(
            VfsError::not_found("node abc").to_string(),
            "node abc not found"
        );
        assert_eq!(
            VfsError::already_exists("/notes/a.md").to_string(),
            "already exists: /notes/a.md"
        );
    }
}

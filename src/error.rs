//! Error types for the UTXO locker

use crate::lock::LockKey;
use thiserror::Error;

/// Outcome of a lock operation that could not be applied
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LockError {
    #[error("UTXO {key} is already locked")]
    AlreadyLocked { key: LockKey },

    #[error("UTXO {key} is not locked")]
    NotLocked { key: LockKey },
}

impl LockError {
    /// Check if the caller may retry the same operation later
    pub fn is_retryable(&self) -> bool {
        matches!(self, LockError::AlreadyLocked { .. })
    }

    /// The UTXO the failed operation referred to
    pub fn key(&self) -> &LockKey {
        match self {
            LockError::AlreadyLocked { key } | LockError::NotLocked { key } => key,
        }
    }
}

/// Result type for lock operations
pub type LockResult<T> = Result<T, LockError>;

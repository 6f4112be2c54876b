//! Errors raised by the Vigil state store.

use thiserror::Error;

use crate::types::{HostId, HostServiceId};

pub type StateResult<T> = Result<T, StateError>;

#[derive(Debug, Error)]
pub enum StateError {
    /// Any failure inside redb: opening, transactions, tables, commits or I/O.
    #[error("storage error: {0}")]
    Storage(#[from] redb::Error),

    /// A row could not be encoded to or decoded from JSON.
    #[error("record codec error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("host {0} not found")]
    HostNotFound(HostId),

    #[error("host service {0} not found")]
    HostServiceNotFound(HostServiceId),
}

impl StateError {
    /// Whether this error means the requested record does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StateError::HostNotFound(_) | StateError::HostServiceNotFound(_)
        )
    }
}

/// redb reports each stage with its own error type; all of them fold into
/// [`StateError::Storage`] so store code can use `?` directly.
macro_rules! storage_error_from {
    ($($source:ty),* $(,)?) => {
        $(
            impl From<$source> for StateError {
                fn from(e: $source) -> Self {
                    StateError::Storage(e.into())
                }
            }
        )*
    };
}

storage_error_from!(
    redb::DatabaseError,
    redb::TransactionError,
    redb::TableError,
    redb::StorageError,
    redb::CommitError,
);

//! vigil-state — embedded state store for Vigil.
//!
//! Backed by [redb](https://docs.rs/redb), provides persistent and in-memory
//! state for hosts, service kinds, host services, and the append-only event
//! log.
//!
//! # Architecture
//!
//! All domain types are JSON-serialized into redb's `&[u8]` value columns,
//! keyed by numeric id. Ids are allocated from the `sequences` table inside
//! the same write transaction that inserts the record.
//!
//! The check engine talks to storage only through the [`Repository`] trait;
//! [`StateStore`] is its production implementation. `StateStore` is `Clone`
//! + `Send` + `Sync` (backed by `Arc<Database>`).

pub mod error;
pub mod repository;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use repository::Repository;
pub use store::StateStore;
pub use types::*;

//! SQLite backend for the document registry.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. Every lock-state transition is a
//! single `IMMEDIATE` transaction, which makes the database the one place
//! concurrent requests are serialized.

mod documents;
mod encode;
mod query;
mod relations;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;

#[cfg(test)]
mod tests;

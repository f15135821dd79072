//! SQLite backend for the Gruff document store.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. Every collection lives in one
//! `documents` table; the JSON body is authoritative and a handful of
//! columns are denormalised from it for filtering and ordering.

mod encode;
mod query;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;

#[cfg(test)]
mod scenarios;

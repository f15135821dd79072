//! Core types and operations for the Gruff debate graph.
//!
//! This crate is free of HTTP and database dependencies. Every
//! operation is written against the [`store::DocumentStore`] trait and threads
//! a [`request::RequestContext`] through its writes.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod aggregate;
pub mod argument;
pub mod changelog;
pub mod claim;
pub mod context;
pub mod docs;
pub mod edge;
pub mod error;
pub mod identity;
pub mod link;
pub mod loader;
pub mod request;
pub mod scoring;
pub mod store;
pub mod structure;
pub mod user;
pub mod validate;
pub mod versioning;

pub use error::{Error, ErrorKind, Result, Subcode};

//! JSON REST API for Gruff.
//!
//! Exposes an axum [`Router`] backed by any [`gruff_core::store::DocumentStore`].
//! Reads are public; writes require HTTP Basic credentials of a registered
//! user. TLS and transport concerns are the caller's responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", gruff_api::api_router(state))
//! ```

pub mod arguments;
pub mod auth;
pub mod claims;
pub mod contexts;
pub mod error;
pub mod extract;
pub mod links;
pub mod notifications;
pub mod users;

use std::{sync::Arc, time::Duration};

use axum::{
  Router,
  routing::{get, post, put},
};
use chrono::{DateTime, Utc};
use gruff_core::{request::RequestContext, scoring::Recomputer, store::DocumentStore};
use serde::Deserialize;
use uuid::Uuid;

pub use auth::CurrentUser;
pub use error::ApiError;

// ─── Application state ───────────────────────────────────────────────────────

/// Shared state threaded through all handlers.
pub struct AppState<S> {
  pub store:           Arc<S>,
  /// Receives the stale set of every write; `None` leaves cached aggregates
  /// untouched.
  pub recomputer:      Option<Recomputer>,
  pub request_timeout: Option<Duration>,
}

impl<S> Clone for AppState<S> {
  fn clone(&self) -> Self {
    Self {
      store:           Arc::clone(&self.store),
      recomputer:      self.recomputer.clone(),
      request_timeout: self.request_timeout,
    }
  }
}

impl<S> AppState<S>
where
  S: DocumentStore,
{
  pub fn new(store: Arc<S>) -> Self {
    Self { store, recomputer: None, request_timeout: None }
  }

  pub fn with_recomputer(mut self, recomputer: Recomputer) -> Self {
    self.recomputer = Some(recomputer);
    self
  }

  pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
    self.request_timeout = Some(timeout);
    self
  }

  /// A fresh context for one request.
  pub(crate) fn context(&self, user: Option<Uuid>) -> RequestContext {
    let ctx = RequestContext::new(user);
    match self.request_timeout {
      Some(timeout) => ctx.with_timeout(timeout),
      None => ctx,
    }
  }

  /// Hand whatever the request left stale to the recomputer.
  pub(crate) fn finish(&self, mut ctx: RequestContext) {
    let stale = ctx.take_stale();
    if let Some(recomputer) = &self.recomputer {
      recomputer.schedule(stale);
    }
  }
}

/// `?queryAt=<RFC 3339>` on version reads.
#[derive(Debug, Default, Deserialize)]
pub struct AtParams {
  #[serde(default, rename = "queryAt")]
  pub query_at: Option<DateTime<Utc>>,
}

// ─── Router ──────────────────────────────────────────────────────────────────

/// Build a fully-materialised API router for `state`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S>(state: AppState<S>) -> Router<()>
where
  S: DocumentStore + 'static,
{
  Router::new()
    // Users
    .route("/users", post(users::register::<S>))
    // Claims
    .route("/claims", post(claims::create::<S>))
    .route(
      "/claims/{id}",
      get(claims::get_one::<S>)
        .put(claims::update::<S>)
        .delete(claims::delete::<S>),
    )
    .route("/claims/{id}/history", get(claims::history::<S>))
    .route("/claims/{id}/convert", put(claims::convert::<S>))
    .route("/claims/{id}/premises", post(claims::add_new_premise::<S>))
    .route(
      "/claims/{id}/premises/{premise_id}",
      post(claims::add_existing_premise::<S>).delete(claims::remove_premise::<S>),
    )
    .route("/claims/{id}/truth", post(claims::score::<S>))
    .route(
      "/claims/{id}/contexts/{context_key}",
      post(contexts::attach::<S>).delete(contexts::detach::<S>),
    )
    .route("/claims/{id}/links", get(links::list::<S>).post(links::create::<S>))
    .route("/claims/{id}/changes", get(claims::changes::<S>))
    // Arguments
    .route("/arguments", post(arguments::create::<S>))
    .route(
      "/arguments/{id}",
      get(arguments::get_one::<S>)
        .put(arguments::update::<S>)
        .delete(arguments::delete::<S>),
    )
    .route("/arguments/{id}/move/{kind}/{target_id}", put(arguments::move_to::<S>))
    .route("/arguments/{id}/strength", post(arguments::score::<S>))
    // Contexts
    .route("/contexts", get(contexts::list::<S>).post(contexts::create::<S>))
    .route("/contexts/{key}", get(contexts::get_one::<S>))
    // Links
    .route("/links/{id}", put(links::update::<S>).delete(links::delete::<S>))
    // Notifications
    .route("/notifications", get(notifications::list::<S>))
    .route("/notifications/{key}", axum::routing::delete(notifications::mark_read::<S>))
    .with_state(state)
}

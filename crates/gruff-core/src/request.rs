//! Per-request state threaded through every core operation.
//!
//! A [`RequestContext`] carries who is acting, the request timestamp shared
//! by every write in the request, an optional deadline, the rollback buffer,
//! and the set of vertices whose cached aggregates went stale.

use std::{collections::BTreeSet, future::Future, time::Duration};

use chrono::{DateTime, Utc};
use tokio::time::Instant;
use uuid::Uuid;

use crate::{Error, Result, argument::Target, identity::Collection};

// ─── Rollback buffer ─────────────────────────────────────────────────────────

/// One successful write, recorded so it can be reversed.
#[derive(Debug, Clone)]
pub enum Write {
  Created {
    collection: Collection,
    key:        Uuid,
  },
  Patched {
    collection: Collection,
    key:        Uuid,
    /// The full document as it was before the patch.
    snapshot:   serde_json::Value,
  },
}

/// A position in the rollback buffer; rolling back to it undoes only the
/// writes made after it was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Savepoint(usize);

// ─── Context ─────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct RequestContext {
  user:     Option<Uuid>,
  now:      DateTime<Utc>,
  deadline: Option<Instant>,
  writes:   Vec<Write>,
  stale:    BTreeSet<Target>,
}

impl RequestContext {
  /// A context stamped with the current wall-clock time.
  pub fn new(user: Option<Uuid>) -> Self { Self::at(user, Utc::now()) }

  /// A context with an explicit request time.
  pub fn at(user: Option<Uuid>, now: DateTime<Utc>) -> Self {
    Self {
      user,
      now,
      deadline: None,
      writes: Vec::new(),
      stale: BTreeSet::new(),
    }
  }

  /// Set a deadline `timeout` from now. Reads still in flight when it passes
  /// fail; writes are refused once it has passed.
  pub fn with_timeout(mut self, timeout: Duration) -> Self {
    self.deadline = Some(Instant::now() + timeout);
    self
  }

  pub fn user(&self) -> Option<Uuid> { self.user }

  pub fn now(&self) -> DateTime<Utc> { self.now }

  /// The acting user, or an Unauthorized error for anonymous requests.
  #[track_caller]
  pub fn require_user(&self) -> Result<Uuid> {
    self
      .user
      .ok_or_else(|| Error::unauthorized("authentication required"))
  }

  // ── Rollback ──────────────────────────────────────────────────────────

  pub fn savepoint(&self) -> Savepoint { Savepoint(self.writes.len()) }

  pub fn record(&mut self, write: Write) { self.writes.push(write); }

  pub fn writes(&self) -> &[Write] { &self.writes }

  /// Remove and return every write made since `savepoint`, oldest first.
  pub fn take_since(&mut self, savepoint: Savepoint) -> Vec<Write> {
    let at = savepoint.0.min(self.writes.len());
    self.writes.split_off(at)
  }

  // ── Stale aggregates ──────────────────────────────────────────────────

  pub fn mark_stale(&mut self, target: Target) { self.stale.insert(target); }

  pub fn take_stale(&mut self) -> Vec<Target> {
    std::mem::take(&mut self.stale).into_iter().collect()
  }

  // ── Deadline ──────────────────────────────────────────────────────────

  /// Fail with a Server error if the request deadline has passed.
  #[track_caller]
  pub fn check_deadline(&self) -> Result<()> {
    match self.deadline {
      Some(deadline) if Instant::now() >= deadline => Err(Error::server("deadline exceeded")),
      _ => Ok(()),
    }
  }

  /// Run `fut`, failing with a Server error if the request deadline passes
  /// first. The in-flight future is dropped on expiry.
  pub async fn bounded<T, F>(&self, fut: F) -> Result<T>
  where
    F: Future<Output = Result<T>>,
  {
    match self.deadline {
      None => fut.await,
      Some(deadline) => tokio::time::timeout_at(deadline, fut)
        .await
        .map_err(|_| Error::server("deadline exceeded"))?,
    }
  }
}

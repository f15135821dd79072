//! Error taxonomy for `gruff-core`.
//!
//! Every failure carries a [`ErrorKind`] (which doubles as the HTTP status
//! family), an optional [`Subcode`], a message, the location that raised it,
//! and a free-form data map for field-level detail.

use std::{collections::BTreeMap, panic::Location};

use serde::Serialize;
use strum::{AsRefStr, Display};
use thiserror::Error;

// ─── Kinds ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display, AsRefStr)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
  /// Non-fatal; reported alongside a successful payload.
  Warning,
  /// The caller sent something invalid.
  Business,
  Unauthorized,
  /// Authenticated, but not allowed to do this.
  Permission,
  NotFound,
  Server,
}

impl ErrorKind {
  pub fn code(self) -> u16 {
    match self {
      Self::Warning => 300,
      Self::Business => 400,
      Self::Unauthorized => 401,
      Self::Permission => 403,
      Self::NotFound => 404,
      Self::Server => 500,
    }
  }
}

/// Finer-grained reasons attached to [`ErrorKind::Business`] errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display, AsRefStr)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Subcode {
  UsernameInUse,
  EmailInUse,
  InvalidPassword,
  StaleVersion,
}

// ─── Error ───────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
#[error("{kind}: {message}")]
pub struct Error {
  pub kind:     ErrorKind,
  pub subcode:  Option<Subcode>,
  pub message:  String,
  /// Where the error was constructed.
  pub location: &'static Location<'static>,
  pub data:     BTreeMap<String, serde_json::Value>,
  #[source]
  pub source:   Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl Error {
  #[track_caller]
  pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
    Self {
      kind,
      subcode: None,
      message: message.into(),
      location: Location::caller(),
      data: BTreeMap::new(),
      source: None,
    }
  }

  #[track_caller]
  pub fn warning(message: impl Into<String>) -> Self {
    Self::new(ErrorKind::Warning, message)
  }

  #[track_caller]
  pub fn business(message: impl Into<String>) -> Self {
    Self::new(ErrorKind::Business, message)
  }

  #[track_caller]
  pub fn unauthorized(message: impl Into<String>) -> Self {
    Self::new(ErrorKind::Unauthorized, message)
  }

  #[track_caller]
  pub fn permission(message: impl Into<String>) -> Self {
    Self::new(ErrorKind::Permission, message)
  }

  #[track_caller]
  pub fn not_found(message: impl Into<String>) -> Self {
    Self::new(ErrorKind::NotFound, message)
  }

  #[track_caller]
  pub fn server(message: impl Into<String>) -> Self {
    Self::new(ErrorKind::Server, message)
  }

  /// The stale-version error raised when a conditional write loses a race.
  #[track_caller]
  pub fn stale_version() -> Self {
    Self::business("stale version").with_subcode(Subcode::StaleVersion)
  }

  pub fn with_subcode(mut self, subcode: Subcode) -> Self {
    self.subcode = Some(subcode);
    self
  }

  pub fn with_data(
    mut self,
    key: impl Into<String>,
    value: impl Into<serde_json::Value>,
  ) -> Self {
    self.data.insert(key.into(), value.into());
    self
  }

  pub fn with_source(
    mut self,
    source: impl std::error::Error + Send + Sync + 'static,
  ) -> Self {
    self.source = Some(Box::new(source));
    self
  }

  pub fn code(&self) -> u16 { self.kind.code() }

  /// `file:line` of the call site that built this error.
  pub fn captured_at(&self) -> String {
    format!("{}:{}", self.location.file(), self.location.line())
  }

  pub fn is_not_found(&self) -> bool { self.kind == ErrorKind::NotFound }
}

impl From<serde_json::Error> for Error {
  #[track_caller]
  fn from(e: serde_json::Error) -> Self {
    Self::server(format!("serialization error: {e}")).with_source(e)
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

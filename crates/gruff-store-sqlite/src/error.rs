//! Error type for `gruff-store-sqlite`.

use gruff_core::{Subcode, identity::Collection};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum Error {
  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  #[error("document is not a JSON object")]
  NotAnObject,

  #[error("document has no {0:?} field")]
  MissingField(&'static str),

  #[error("document field {field:?} is invalid: {reason}")]
  InvalidField { field: &'static str, reason: String },

  #[error("{collection}/{key} not found")]
  NotFound { collection: Collection, key: Uuid },

  /// A conditional patch found the document ended or changed underneath it.
  #[error("{collection}/{key} is a stale version")]
  StaleVersion { collection: Collection, key: Uuid },

  #[error("{collection}/{key} already exists")]
  Duplicate { collection: Collection, key: Uuid },

  #[error("username is already in use")]
  UsernameInUse,

  #[error("email is already in use")]
  EmailInUse,
}

impl Error {
  /// Translate a failed insert, recognising the uniqueness constraints.
  pub(crate) fn on_insert(e: tokio_rusqlite::Error, collection: Collection, key: Uuid) -> Self {
    if let tokio_rusqlite::Error::Rusqlite(rusqlite::Error::SqliteFailure(failure, message)) = &e
      && failure.code == rusqlite::ErrorCode::ConstraintViolation
    {
      let message = message.as_deref().unwrap_or_default();
      if message.contains("users_username_idx") {
        return Self::UsernameInUse;
      }
      if message.contains("users_email_idx") {
        return Self::EmailInUse;
      }
      return Self::Duplicate { collection, key };
    }
    Self::Database(e)
  }
}

impl From<Error> for gruff_core::Error {
  #[track_caller]
  fn from(e: Error) -> Self {
    use gruff_core::Error as Core;

    match e {
      Error::NotFound { collection, key } => {
        Core::not_found(format!("{} {key} not found", collection.noun()))
      }
      Error::StaleVersion { .. } => Core::stale_version().with_source(e),
      Error::UsernameInUse => Core::business("username is already in use")
        .with_subcode(Subcode::UsernameInUse)
        .with_data("fields", ["username"].as_slice()),
      Error::EmailInUse => Core::business("email is already in use")
        .with_subcode(Subcode::EmailInUse)
        .with_data("fields", ["email"].as_slice()),
      Error::Duplicate { .. } => Core::business(e.to_string()).with_source(e),
      other => Core::server(format!("store error: {other}")).with_source(other),
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

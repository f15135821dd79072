//! The acting user's notifications.

use axum::{
  extract::{Path, State},
  http::StatusCode,
};
use gruff_core::{
  changelog::{self, Notification},
  store::DocumentStore,
};
use uuid::Uuid;

use crate::{AppState, CurrentUser, error::ApiError, extract::Json};

/// `GET /notifications`: unread, newest first.
pub async fn list<S>(
  State(state): State<AppState<S>>,
  CurrentUser(user): CurrentUser,
) -> Result<Json<Vec<Notification>>, ApiError>
where
  S: DocumentStore + 'static,
{
  let ctx = state.context(Some(user.meta.key));
  Ok(Json(changelog::notifications_for(&*state.store, &ctx, user.meta.key).await?))
}

/// `DELETE /notifications/{key}`: mark read.
pub async fn mark_read<S>(
  State(state): State<AppState<S>>,
  CurrentUser(user): CurrentUser,
  Path(key): Path<Uuid>,
) -> Result<StatusCode, ApiError>
where
  S: DocumentStore + 'static,
{
  let mut ctx = state.context(Some(user.meta.key));
  changelog::mark_read(&*state.store, &mut ctx, key).await?;
  Ok(StatusCode::OK)
}

//! Handlers for claim links.

use axum::{
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use gruff_core::{
  link::{self, Link, LinkUpdate, NewLink},
  store::DocumentStore,
};
use uuid::Uuid;

use crate::{AppState, AtParams, CurrentUser, error::ApiError, extract::Json};

/// `GET /claims/{id}/links[?queryAt=]`
pub async fn list<S>(
  State(state): State<AppState<S>>,
  Path(id): Path<Uuid>,
  Query(params): Query<AtParams>,
) -> Result<Json<Vec<Link>>, ApiError>
where
  S: DocumentStore,
{
  let ctx = state.context(None);
  Ok(Json(link::links_for_claim(&*state.store, &ctx, id, params.query_at).await?))
}

/// `POST /claims/{id}/links`
pub async fn create<S>(
  State(state): State<AppState<S>>,
  CurrentUser(user): CurrentUser,
  Path(id): Path<Uuid>,
  Json(body): Json<NewLink>,
) -> Result<impl IntoResponse, ApiError>
where
  S: DocumentStore + 'static,
{
  let mut ctx = state.context(Some(user.meta.key));
  let created = link::create_link(&*state.store, &mut ctx, id, body).await?;
  state.finish(ctx);
  Ok((StatusCode::CREATED, Json(created)))
}

/// `PUT /links/{id}`
pub async fn update<S>(
  State(state): State<AppState<S>>,
  CurrentUser(user): CurrentUser,
  Path(id): Path<Uuid>,
  Json(body): Json<LinkUpdate>,
) -> Result<impl IntoResponse, ApiError>
where
  S: DocumentStore + 'static,
{
  let mut ctx = state.context(Some(user.meta.key));
  let updated = link::update_link(&*state.store, &mut ctx, id, body).await?;
  state.finish(ctx);
  Ok((StatusCode::ACCEPTED, Json(updated)))
}

/// `DELETE /links/{id}`
pub async fn delete<S>(
  State(state): State<AppState<S>>,
  CurrentUser(user): CurrentUser,
  Path(id): Path<Uuid>,
) -> Result<Json<Link>, ApiError>
where
  S: DocumentStore + 'static,
{
  let mut ctx = state.context(Some(user.meta.key));
  let deleted = link::delete_link(&*state.store, &mut ctx, id).await?;
  state.finish(ctx);
  Ok(Json(deleted))
}

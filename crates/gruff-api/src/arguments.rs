//! Handlers for `/arguments` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/arguments` | Body names exactly one of `targetClaimId` / `targetArgumentId` |
//! | `GET`  | `/arguments/{id}` | `?queryAt=` |
//! | `PUT`  | `/arguments/{id}` | 202 |
//! | `DELETE` | `/arguments/{id}` | Cascades to arguments about it |
//! | `PUT`  | `/arguments/{id}/move/{kind}/{target_id}` | `kind` is `claims` or `arguments`; body `{"pro":true}` |
//! | `POST` | `/arguments/{id}/strength` | Body `{"score":0.7}`; 201 first time, 202 after |

use axum::{
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use gruff_core::{
  Error,
  argument::{Argument, ArgumentUpdate, NewArgument, Target},
  loader::{self, Locator},
  scoring,
  store::DocumentStore,
  structure,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
  AppState, AtParams, CurrentUser,
  claims::{ScoreBody, score_status},
  error::ApiError,
  extract::Json,
};

/// `GET /arguments/{id}[?queryAt=]`
pub async fn get_one<S>(
  State(state): State<AppState<S>>,
  Path(id): Path<Uuid>,
  Query(params): Query<AtParams>,
) -> Result<Json<Argument>, ApiError>
where
  S: DocumentStore,
{
  let ctx = state.context(None);
  let argument = loader::load(&*state.store, &ctx, Locator::id(id).at(params.query_at)).await?;
  Ok(Json(argument))
}

/// `POST /arguments`
pub async fn create<S>(
  State(state): State<AppState<S>>,
  CurrentUser(user): CurrentUser,
  Json(body): Json<NewArgument>,
) -> Result<impl IntoResponse, ApiError>
where
  S: DocumentStore + 'static,
{
  let argument = body.into_argument()?;
  let mut ctx = state.context(Some(user.meta.key));
  let argument = structure::add_argument(&*state.store, &mut ctx, argument).await?;
  state.finish(ctx);
  Ok((StatusCode::CREATED, Json(argument)))
}

/// `PUT /arguments/{id}`
pub async fn update<S>(
  State(state): State<AppState<S>>,
  CurrentUser(user): CurrentUser,
  Path(id): Path<Uuid>,
  Json(body): Json<ArgumentUpdate>,
) -> Result<impl IntoResponse, ApiError>
where
  S: DocumentStore + 'static,
{
  let mut ctx = state.context(Some(user.meta.key));
  let argument = structure::update_argument(&*state.store, &mut ctx, id, body).await?;
  state.finish(ctx);
  Ok((StatusCode::ACCEPTED, Json(argument)))
}

/// `DELETE /arguments/{id}`
pub async fn delete<S>(
  State(state): State<AppState<S>>,
  CurrentUser(user): CurrentUser,
  Path(id): Path<Uuid>,
) -> Result<Json<Argument>, ApiError>
where
  S: DocumentStore + 'static,
{
  let mut ctx = state.context(Some(user.meta.key));
  let argument = structure::delete_argument(&*state.store, &mut ctx, id).await?;
  state.finish(ctx);
  Ok(Json(argument))
}

// ─── Move ────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct MoveBody {
  #[serde(default)]
  pub pro: bool,
}

/// `PUT /arguments/{id}/move/{kind}/{target_id}`
pub async fn move_to<S>(
  State(state): State<AppState<S>>,
  CurrentUser(user): CurrentUser,
  Path((id, kind, target_id)): Path<(Uuid, String, Uuid)>,
  Json(body): Json<MoveBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: DocumentStore + 'static,
{
  let target = match kind.as_str() {
    "claims" => Target::Claim(target_id),
    "arguments" => Target::Argument(target_id),
    _ => return Err(Error::not_found(format!("unknown target type {kind:?}")).into()),
  };
  let mut ctx = state.context(Some(user.meta.key));
  let argument = structure::move_argument(&*state.store, &mut ctx, id, target, body.pro).await?;
  state.finish(ctx);
  Ok((StatusCode::ACCEPTED, Json(argument)))
}

// ─── Strength ────────────────────────────────────────────────────────────────

/// `POST /arguments/{id}/strength`
pub async fn score<S>(
  State(state): State<AppState<S>>,
  CurrentUser(user): CurrentUser,
  Path(id): Path<Uuid>,
  Json(body): Json<ScoreBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: DocumentStore + 'static,
{
  let mut ctx = state.context(Some(user.meta.key));
  let (outcome, score) =
    scoring::set_score(&*state.store, &mut ctx, Target::Argument(id), body.score).await?;
  state.finish(ctx);
  Ok((score_status(outcome), Json(score)))
}

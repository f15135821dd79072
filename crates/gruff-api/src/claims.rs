//! Handlers for `/claims` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/claims` | 201 |
//! | `GET`  | `/claims/{id}` | Claim with premises and arguments; `?queryAt=` |
//! | `PUT`  | `/claims/{id}` | 202; new version only if something changed |
//! | `DELETE` | `/claims/{id}` | Tombstones the current version |
//! | `GET`  | `/claims/{id}/history` | Every version, oldest first |
//! | `PUT`  | `/claims/{id}/convert` | Convert to multi-premise, 202 |
//! | `POST` | `/claims/{id}/premises[/{premise_id}]` | New or existing premise, 201 |
//! | `DELETE` | `/claims/{id}/premises/{premise_id}` | |
//! | `POST` | `/claims/{id}/truth` | Body `{"score":0.7}`; 201 first time, 202 after |
//! | `GET`  | `/claims/{id}/changes` | Change log |

use axum::{
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use gruff_core::{
  argument::Target,
  changelog::{self, Change},
  claim::{self, Claim, ClaimUpdate},
  loader::{self, Locator},
  scoring::{self, ScoreOutcome},
  store::DocumentStore,
  structure::{self, ClaimView},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{AppState, AtParams, CurrentUser, error::ApiError, extract::Json};

// ─── Reads ───────────────────────────────────────────────────────────────────

/// `GET /claims/{id}[?queryAt=]`
pub async fn get_one<S>(
  State(state): State<AppState<S>>,
  Path(id): Path<Uuid>,
  Query(params): Query<AtParams>,
) -> Result<Json<ClaimView>, ApiError>
where
  S: DocumentStore,
{
  let ctx = state.context(None);
  let locator = Locator::id(id).at(params.query_at);
  Ok(Json(structure::claim_view(&*state.store, &ctx, locator).await?))
}

/// `GET /claims/{id}/history`
pub async fn history<S>(
  State(state): State<AppState<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Vec<Claim>>, ApiError>
where
  S: DocumentStore,
{
  let ctx = state.context(None);
  Ok(Json(loader::history(&*state.store, &ctx, id).await?))
}

/// `GET /claims/{id}/changes`
pub async fn changes<S>(
  State(state): State<AppState<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Vec<Change>>, ApiError>
where
  S: DocumentStore,
{
  let ctx = state.context(None);
  Ok(Json(changelog::changes_for(&*state.store, &ctx, id).await?))
}

// ─── Writes ──────────────────────────────────────────────────────────────────

/// A claim as submitted by a client.
#[derive(Debug, Deserialize)]
pub struct NewClaim {
  #[serde(default)]
  pub title:       String,
  #[serde(default)]
  pub description: String,
  #[serde(default)]
  pub negation:    Option<String>,
  #[serde(default)]
  pub question:    Option<String>,
  #[serde(default)]
  pub note:        Option<String>,
  #[serde(default)]
  pub image:       Option<String>,
}

impl From<NewClaim> for Claim {
  fn from(new: NewClaim) -> Self {
    Self {
      negation: new.negation,
      question: new.question,
      note: new.note,
      image: new.image,
      ..Claim::new(new.title, new.description)
    }
  }
}

/// `POST /claims`
pub async fn create<S>(
  State(state): State<AppState<S>>,
  CurrentUser(user): CurrentUser,
  Json(body): Json<NewClaim>,
) -> Result<impl IntoResponse, ApiError>
where
  S: DocumentStore + 'static,
{
  let mut ctx = state.context(Some(user.meta.key));
  let claim = claim::create_claim(&*state.store, &mut ctx, body.into()).await?;
  state.finish(ctx);
  Ok((StatusCode::CREATED, Json(claim)))
}

/// `PUT /claims/{id}`
pub async fn update<S>(
  State(state): State<AppState<S>>,
  CurrentUser(user): CurrentUser,
  Path(id): Path<Uuid>,
  Json(body): Json<ClaimUpdate>,
) -> Result<impl IntoResponse, ApiError>
where
  S: DocumentStore + 'static,
{
  let mut ctx = state.context(Some(user.meta.key));
  let claim = claim::update_claim(&*state.store, &mut ctx, id, body).await?;
  state.finish(ctx);
  Ok((StatusCode::ACCEPTED, Json(claim)))
}

/// `DELETE /claims/{id}`
pub async fn delete<S>(
  State(state): State<AppState<S>>,
  CurrentUser(user): CurrentUser,
  Path(id): Path<Uuid>,
) -> Result<Json<Claim>, ApiError>
where
  S: DocumentStore + 'static,
{
  let mut ctx = state.context(Some(user.meta.key));
  let claim = claim::delete_claim(&*state.store, &mut ctx, id).await?;
  state.finish(ctx);
  Ok(Json(claim))
}

// ─── Premises ────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct Converted {
  pub claim:   Claim,
  pub premise: Claim,
}

/// `PUT /claims/{id}/convert`
pub async fn convert<S>(
  State(state): State<AppState<S>>,
  CurrentUser(user): CurrentUser,
  Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError>
where
  S: DocumentStore + 'static,
{
  let mut ctx = state.context(Some(user.meta.key));
  let (claim, premise) = structure::convert_to_multi_premise(&*state.store, &mut ctx, id).await?;
  state.finish(ctx);
  Ok((StatusCode::ACCEPTED, Json(Converted { claim, premise })))
}

/// `POST /claims/{id}/premises` with the new premise in the body.
pub async fn add_new_premise<S>(
  State(state): State<AppState<S>>,
  CurrentUser(user): CurrentUser,
  Path(id): Path<Uuid>,
  Json(body): Json<NewClaim>,
) -> Result<impl IntoResponse, ApiError>
where
  S: DocumentStore + 'static,
{
  let mut ctx = state.context(Some(user.meta.key));
  let mut parent: Claim = loader::current(&*state.store, &ctx, id).await?;
  let premise = structure::add_premise(&*state.store, &mut ctx, &mut parent, body.into()).await?;
  state.finish(ctx);
  Ok((StatusCode::CREATED, Json(premise)))
}

/// `POST /claims/{id}/premises/{premise_id}`
pub async fn add_existing_premise<S>(
  State(state): State<AppState<S>>,
  CurrentUser(user): CurrentUser,
  Path((id, premise_id)): Path<(Uuid, Uuid)>,
) -> Result<impl IntoResponse, ApiError>
where
  S: DocumentStore + 'static,
{
  let mut ctx = state.context(Some(user.meta.key));
  let mut parent: Claim = loader::current(&*state.store, &ctx, id).await?;
  let premise: Claim = loader::current(&*state.store, &ctx, premise_id).await?;
  let premise = structure::add_premise(&*state.store, &mut ctx, &mut parent, premise).await?;
  state.finish(ctx);
  Ok((StatusCode::CREATED, Json(premise)))
}

/// `DELETE /claims/{id}/premises/{premise_id}`
pub async fn remove_premise<S>(
  State(state): State<AppState<S>>,
  CurrentUser(user): CurrentUser,
  Path((id, premise_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, ApiError>
where
  S: DocumentStore + 'static,
{
  let mut ctx = state.context(Some(user.meta.key));
  structure::remove_premise(&*state.store, &mut ctx, id, premise_id).await?;
  state.finish(ctx);
  Ok(StatusCode::OK)
}

// ─── Scores ──────────────────────────────────────────────────────────────────

/// Body of both score endpoints.
#[derive(Debug, Deserialize)]
pub struct ScoreBody {
  pub score: f64,
}

/// `POST /claims/{id}/truth`
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
    scoring::set_score(&*state.store, &mut ctx, Target::Claim(id), body.score).await?;
  state.finish(ctx);
  Ok((score_status(outcome), Json(score)))
}

pub(crate) fn score_status(outcome: ScoreOutcome) -> StatusCode {
  match outcome {
    ScoreOutcome::Created => StatusCode::CREATED,
    ScoreOutcome::Updated => StatusCode::ACCEPTED,
  }
}

//! Handlers for `/contexts` and claim-context association.

use axum::{
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use gruff_core::{
  context::{self, Context},
  store::DocumentStore,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{AppState, CurrentUser, error::ApiError, extract::Json};

/// `GET /contexts`
pub async fn list<S>(State(state): State<AppState<S>>) -> Result<Json<Vec<Context>>, ApiError>
where
  S: DocumentStore,
{
  let ctx = state.context(None);
  Ok(Json(context::list_contexts(&*state.store, &ctx).await?))
}

/// `GET /contexts/{key}`
pub async fn get_one<S>(
  State(state): State<AppState<S>>,
  Path(key): Path<Uuid>,
) -> Result<Json<Context>, ApiError>
where
  S: DocumentStore,
{
  let ctx = state.context(None);
  Ok(Json(context::load_context(&*state.store, &ctx, key).await?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewContext {
  #[serde(default)]
  pub short_name: String,
  #[serde(default)]
  pub title:      String,
  #[serde(default)]
  pub url:        String,
  #[serde(default)]
  pub mid:        Option<String>,
  #[serde(default)]
  pub qid:        Option<String>,
}

/// `POST /contexts`
pub async fn create<S>(
  State(state): State<AppState<S>>,
  CurrentUser(user): CurrentUser,
  Json(body): Json<NewContext>,
) -> Result<impl IntoResponse, ApiError>
where
  S: DocumentStore + 'static,
{
  let new = Context {
    mid: body.mid,
    qid: body.qid,
    ..Context::new(body.short_name, body.title, body.url)
  };
  let mut ctx = state.context(Some(user.meta.key));
  let created = context::create_context(&*state.store, &mut ctx, new).await?;
  state.finish(ctx);
  Ok((StatusCode::CREATED, Json(created)))
}

/// `POST /claims/{id}/contexts/{context_key}`: 201 when newly associated,
/// 200 when it already was.
pub async fn attach<S>(
  State(state): State<AppState<S>>,
  CurrentUser(user): CurrentUser,
  Path((id, context_key)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, ApiError>
where
  S: DocumentStore + 'static,
{
  let mut ctx = state.context(Some(user.meta.key));
  let added = context::add_context(&*state.store, &mut ctx, id, context_key).await?;
  state.finish(ctx);
  Ok(if added { StatusCode::CREATED } else { StatusCode::OK })
}

/// `DELETE /claims/{id}/contexts/{context_key}`
pub async fn detach<S>(
  State(state): State<AppState<S>>,
  CurrentUser(user): CurrentUser,
  Path((id, context_key)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, ApiError>
where
  S: DocumentStore + 'static,
{
  let mut ctx = state.context(Some(user.meta.key));
  context::remove_context(&*state.store, &mut ctx, id, context_key).await?;
  state.finish(ctx);
  Ok(StatusCode::OK)
}

//! `POST /users`: registration.

use axum::{
  extract::State,
  http::StatusCode,
  response::IntoResponse,
};
use gruff_core::{
  identity::RecordMeta,
  store::DocumentStore,
  user::{self, User, UserProfile},
};
use serde::Deserialize;

use crate::{AppState, auth, error::ApiError, extract::Json};

#[derive(Debug, Deserialize)]
pub struct RegisterBody {
  #[serde(default)]
  pub username: String,
  #[serde(default)]
  pub name:     String,
  #[serde(default)]
  pub email:    String,
  #[serde(default)]
  pub password: String,
}

/// `POST /users`: body `{"username","name","email","password"}`.
pub async fn register<S>(
  State(state): State<AppState<S>>,
  Json(body): Json<RegisterBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: DocumentStore + 'static,
{
  let password_hash = auth::hash_password(&body.password)?;
  let new = User {
    meta: RecordMeta::default(),
    username: body.username,
    name: body.name,
    email: body.email,
    curator: false,
    password_hash,
  };

  let mut ctx = state.context(None);
  let created = user::create_user(&*state.store, &mut ctx, new).await?;
  tracing::info!(username = %created.username, "registered user");
  Ok((StatusCode::CREATED, Json(UserProfile::from(&created))))
}

//! HTTP Basic-auth extractor and password hashing.

use argon2::{
  Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString,
};
use axum::{
  extract::FromRequestParts,
  http::{HeaderMap, header, request::Parts},
};
use base64::{Engine as _, engine::general_purpose::STANDARD as B64};
use gruff_core::{
  Error, Result, Subcode,
  store::DocumentStore,
  user::{self, User},
};
use rand_core::OsRng;

use crate::{AppState, error::ApiError};

/// Shortest password accepted at registration.
pub const MIN_PASSWORD_LEN: usize = 8;

/// The authenticated user; present in a handler means the request carried
/// valid credentials.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

/// Hash `password` into an argon2 PHC string with a random salt.
pub fn hash_password(password: &str) -> Result<String> {
  if password.chars().count() < MIN_PASSWORD_LEN {
    return Err(
      Error::business(format!("password must be at least {MIN_PASSWORD_LEN} characters"))
        .with_subcode(Subcode::InvalidPassword)
        .with_data("fields", ["password"].as_slice()),
    );
  }
  let salt = SaltString::generate(&mut OsRng);
  Argon2::default()
    .hash_password(password.as_bytes(), &salt)
    .map(|hash| hash.to_string())
    .map_err(|e| Error::server(format!("argon2 error: {e}")))
}

/// Split a `Basic` authorization header into username and password.
fn basic_credentials(headers: &HeaderMap) -> Result<(String, String)> {
  let invalid = || Error::unauthorized("invalid credentials");

  let value = headers
    .get(header::AUTHORIZATION)
    .and_then(|v| v.to_str().ok())
    .ok_or_else(|| Error::unauthorized("authentication required"))?;
  let encoded = value.strip_prefix("Basic ").ok_or_else(invalid)?;

  let decoded = B64.decode(encoded).map_err(|_| invalid())?;
  let creds = String::from_utf8(decoded).map_err(|_| invalid())?;
  let (username, password) = creds.split_once(':').ok_or_else(invalid)?;
  Ok((username.to_owned(), password.to_owned()))
}

/// Look up `username` and check `password` against the stored hash.
pub async fn authenticate<S>(state: &AppState<S>, username: &str, password: &str) -> Result<User>
where
  S: DocumentStore,
{
  let ctx = state.context(None);
  let user = user::find_by_username(&*state.store, &ctx, username)
    .await?
    .ok_or_else(|| Error::unauthorized("invalid credentials"))?;

  let parsed = PasswordHash::new(&user.password_hash)
    .map_err(|_| Error::unauthorized("invalid credentials"))?;
  Argon2::default()
    .verify_password(password.as_bytes(), &parsed)
    .map_err(|_| Error::unauthorized("invalid credentials"))?;
  Ok(user)
}

impl<S> FromRequestParts<AppState<S>> for CurrentUser
where
  S: DocumentStore + 'static,
{
  type Rejection = ApiError;

  async fn from_request_parts(
    parts: &mut Parts,
    state: &AppState<S>,
  ) -> Result<Self, Self::Rejection> {
    let (username, password) = basic_credentials(&parts.headers)?;
    let user = authenticate(state, &username, &password).await?;
    Ok(CurrentUser(user))
  }
}

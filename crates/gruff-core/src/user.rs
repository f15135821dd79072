//! Registered users. Password hashing happens at the HTTP boundary; the core
//! only stores the finished hash.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  Error, Result,
  docs::{self, Document},
  identity::{Collection, RecordMeta},
  request::RequestContext,
  store::{DocQuery, DocumentStore, Field},
  validate::{self, Constraint, FieldRule, Validate},
};

static USERNAME: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r"^[A-Za-z0-9_.-]{3,32}$").expect("static username pattern")
});

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
  #[serde(flatten)]
  pub meta:          RecordMeta,
  pub username:      String,
  pub name:          String,
  pub email:         String,
  #[serde(default)]
  pub curator:       bool,
  /// PHC-format argon2 hash.
  pub password_hash: String,
}

impl Document for User {
  const COLLECTION: Collection = Collection::Users;

  fn key(&self) -> Uuid { self.meta.key }
}

static USER_RULES: &[FieldRule] = &[
  FieldRule {
    name:        "username",
    constraints: &[
      Constraint::Required,
      Constraint::Pattern {
        regex:    &USERNAME,
        describe: "be 3 to 32 letters, digits, '.', '_' or '-'",
      },
    ],
  },
  FieldRule { name: "name", constraints: &[Constraint::Required] },
  FieldRule { name: "email", constraints: &[Constraint::Required, Constraint::Email] },
];

impl Validate for User {
  fn rules() -> &'static [FieldRule] { USER_RULES }
}

/// What clients may see of a user.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
  pub key:      Uuid,
  pub username: String,
  pub name:     String,
  pub curator:  bool,
}

impl From<&User> for UserProfile {
  fn from(user: &User) -> Self {
    Self {
      key:      user.meta.key,
      username: user.username.clone(),
      name:     user.name.clone(),
      curator:  user.curator,
    }
  }
}

// ─── Operations ──────────────────────────────────────────────────────────────

/// Persist a new user. Uniqueness of username and email is enforced by the
/// store and surfaces as Business errors with subcodes.
pub async fn create_user<S>(store: &S, ctx: &mut RequestContext, mut user: User) -> Result<User>
where
  S: DocumentStore,
{
  validate::validate_for_create(&user)?;
  if user.password_hash.is_empty() {
    return Err(Error::server("user has no password hash"));
  }
  user.meta = RecordMeta::default();
  user.meta.prepare_for_create(ctx);
  user.meta.creator = Some(user.meta.key);

  let sp = ctx.savepoint();
  let result = docs::create(store, ctx, &user).await.map(|()| user);
  docs::settle(store, ctx, sp, result).await
}

pub async fn find_by_username<S>(store: &S, ctx: &RequestContext, username: &str) -> Result<Option<User>>
where
  S: DocumentStore,
{
  let query = DocQuery::new(Collection::Users)
    .eq(Field::Attr("username"), username)
    .limit(1);
  let mut users: Vec<User> = docs::query(store, ctx, &query).await?;
  Ok(users.pop())
}

pub async fn load_user<S>(store: &S, ctx: &RequestContext, key: Uuid) -> Result<User>
where
  S: DocumentStore,
{
  docs::read::<S, User>(store, ctx, key)
    .await?
    .filter(|u| u.meta.end.is_none())
    .ok_or_else(|| Error::not_found(format!("user {key} not found")))
}

/// Allow the acting user if they created the entity or are a curator.
pub async fn require_owner_or_curator<S>(
  store: &S,
  ctx: &RequestContext,
  creator: Option<Uuid>,
) -> Result<()>
where
  S: DocumentStore,
{
  let actor = ctx.require_user()?;
  if creator == Some(actor) {
    return Ok(());
  }
  let user = load_user(store, ctx, actor).await?;
  if user.curator {
    Ok(())
  } else {
    Err(Error::permission("only the creator or a curator may do this"))
  }
}

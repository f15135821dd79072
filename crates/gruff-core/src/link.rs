//! External citations attached to a claim. Links are versioned like claims
//! but hang off the claim's logical id, so versioning the claim leaves them
//! in place.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::{
  Result,
  claim::Claim,
  docs::{self, Document, Versioned},
  identity::{Collection, VersionMeta},
  loader,
  request::RequestContext,
  store::{DocQuery, DocumentStore, Field, Liveness},
  user,
  validate::{self, Constraint, FieldRule, Validate},
  versioning,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Link {
  #[serde(flatten)]
  pub meta:        VersionMeta,
  pub claim_id:    Uuid,
  pub title:       String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  pub url:         String,
}

impl Document for Link {
  const COLLECTION: Collection = Collection::Links;

  fn key(&self) -> Uuid { self.meta.key }
}

impl Versioned for Link {
  fn meta(&self) -> &VersionMeta { &self.meta }

  fn meta_mut(&mut self) -> &mut VersionMeta { &mut self.meta }
}

static LINK_RULES: &[FieldRule] = &[
  FieldRule {
    name:        "title",
    constraints: &[Constraint::Required, Constraint::Length { min: 3, max: 1000 }],
  },
  FieldRule { name: "url", constraints: &[Constraint::Required, Constraint::Url] },
];

impl Validate for Link {
  fn rules() -> &'static [FieldRule] { LINK_RULES }
}

/// A link as submitted by a client; the claim comes from the path.
#[derive(Debug, Clone, Deserialize)]
pub struct NewLink {
  #[serde(default)]
  pub title:       String,
  #[serde(default)]
  pub description: Option<String>,
  #[serde(default)]
  pub url:         String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LinkUpdate {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub title:       Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub url:         Option<String>,
}

impl LinkUpdate {
  fn fields(&self) -> Result<Map<String, Value>> {
    match serde_json::to_value(self)? {
      Value::Object(map) => Ok(map),
      _ => Ok(Map::new()),
    }
  }

  fn apply(&self, link: &mut Link) -> bool {
    let before = link.clone();
    if let Some(title) = &self.title {
      link.title = title.clone();
    }
    if let Some(description) = &self.description {
      link.description = Some(description.clone());
    }
    if let Some(url) = &self.url {
      link.url = url.clone();
    }
    *link != before
  }
}

// ─── Operations ──────────────────────────────────────────────────────────────

pub async fn create_link<S>(
  store: &S,
  ctx: &mut RequestContext,
  claim_id: Uuid,
  new: NewLink,
) -> Result<Link>
where
  S: DocumentStore,
{
  ctx.require_user()?;
  let mut link = Link {
    meta: VersionMeta::default(),
    claim_id,
    title: new.title,
    description: new.description,
    url: new.url,
  };
  validate::validate_for_create(&link)?;
  loader::current::<S, Claim>(store, ctx, claim_id).await?;
  link.meta.prepare_for_create(ctx);

  let sp = ctx.savepoint();
  let result = docs::create(store, ctx, &link).await.map(|()| link);
  docs::settle(store, ctx, sp, result).await
}

/// Links of a claim, live now or at `at`.
pub async fn links_for_claim<S>(
  store: &S,
  ctx: &RequestContext,
  claim_id: Uuid,
  at: Option<chrono::DateTime<chrono::Utc>>,
) -> Result<Vec<Link>>
where
  S: DocumentStore,
{
  let query = DocQuery::new(Collection::Links)
    .eq(Field::Attr("claimId"), claim_id.to_string())
    .liveness(Liveness::at_or_current(at));
  docs::query(store, ctx, &query).await
}

pub async fn update_link<S>(
  store: &S,
  ctx: &mut RequestContext,
  id: Uuid,
  update: LinkUpdate,
) -> Result<Link>
where
  S: DocumentStore,
{
  ctx.require_user()?;
  validate::validate_for_update::<Link>(&update.fields()?)?;
  let current: Link = loader::current(store, ctx, id).await?;
  let mut preview = current.clone();
  if !update.apply(&mut preview) {
    return Ok(current);
  }
  versioning::version_link(store, ctx, id, |link| {
    update.apply(link);
    Ok(())
  })
  .await
}

pub async fn delete_link<S>(store: &S, ctx: &mut RequestContext, id: Uuid) -> Result<Link>
where
  S: DocumentStore,
{
  let current: Link = loader::current(store, ctx, id).await?;
  user::require_owner_or_curator(store, ctx, current.meta.creator).await?;

  let sp = ctx.savepoint();
  let result = versioning::retire(store, ctx, &current).await.map(|()| current);
  docs::settle(store, ctx, sp, result).await
}

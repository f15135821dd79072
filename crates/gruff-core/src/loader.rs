//! Resolving versioned entities by key, by logical id, or by id at a point in
//! time.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
  Error, Result,
  argument::{Argument, Target},
  claim::Claim,
  docs::{self, Document, Versioned},
  identity::DocRef,
  request::RequestContext,
  store::{DocQuery, DocumentStore, Field, Liveness},
};

/// How a caller names the version it wants.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct Locator {
  #[serde(default)]
  pub key:      Option<Uuid>,
  #[serde(default)]
  pub id:       Option<Uuid>,
  #[serde(default, rename = "queryAt")]
  pub query_at: Option<DateTime<Utc>>,
}

impl Locator {
  pub fn key(key: Uuid) -> Self { Self { key: Some(key), ..Self::default() } }

  pub fn id(id: Uuid) -> Self { Self { id: Some(id), ..Self::default() } }

  pub fn at(mut self, at: Option<DateTime<Utc>>) -> Self {
    self.query_at = at;
    self
  }
}

/// Load one version.
///
/// A key wins over an id. By id, the newest version live at `queryAt` (or the
/// current one) is returned.
pub async fn load<S, T>(store: &S, ctx: &RequestContext, locator: Locator) -> Result<T>
where
  S: DocumentStore,
  T: Versioned,
{
  let noun = T::COLLECTION.noun();

  if let Some(key) = locator.key {
    return docs::read(store, ctx, key)
      .await?
      .ok_or_else(|| Error::not_found(format!("{noun} {key} not found")));
  }

  let Some(id) = locator.id else {
    return Err(Error::business("no key or id"));
  };

  let query = DocQuery::new(T::COLLECTION)
    .id(id)
    .liveness(Liveness::at_or_current(locator.query_at))
    .sort_by(Field::Start, true)
    .limit(1);
  let mut found: Vec<T> = docs::query(store, ctx, &query).await?;
  found
    .pop()
    .ok_or_else(|| Error::not_found(format!("{noun} {id} not found")))
}

/// The current version of `id`.
pub async fn current<S, T>(store: &S, ctx: &RequestContext, id: Uuid) -> Result<T>
where
  S: DocumentStore,
  T: Versioned,
{
  load(store, ctx, Locator::id(id)).await
}

/// Every version of `id`, oldest first.
pub async fn history<S, T>(store: &S, ctx: &RequestContext, id: Uuid) -> Result<Vec<T>>
where
  S: DocumentStore,
  T: Versioned,
{
  let query = DocQuery::new(T::COLLECTION)
    .id(id)
    .history()
    .sort_by(Field::Start, false);
  let versions: Vec<T> = docs::query(store, ctx, &query).await?;
  if versions.is_empty() {
    return Err(Error::not_found(format!("{} {id} not found", T::COLLECTION.noun())));
  }
  Ok(versions)
}

/// The document reference of the target's current version.
pub async fn resolve_target<S>(store: &S, ctx: &RequestContext, target: Target) -> Result<DocRef>
where
  S: DocumentStore,
{
  match target {
    Target::Claim(id) => current::<S, Claim>(store, ctx, id).await.map(|c| c.doc_ref()),
    Target::Argument(id) => current::<S, Argument>(store, ctx, id).await.map(|a| a.doc_ref()),
  }
}

//! Typed access to a [`DocumentStore`] through a [`RequestContext`].
//!
//! Every write made here is recorded in the context's rollback buffer. Reads
//! are bounded by the request deadline; writes check it before they start and
//! then run to completion, so a write that lands is always recorded.
//! Operations wrap their body with [`settle`] so a failure undoes exactly the
//! writes the operation made.

use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::{
  Error, Result,
  identity::{Collection, DocRef, EdgeMeta, VersionMeta},
  request::{RequestContext, Savepoint, Write},
  store::{DocQuery, DocumentStore, Precondition},
};

// ─── Document traits ─────────────────────────────────────────────────────────

/// A type stored as one document in a fixed collection.
pub trait Document: Serialize + DeserializeOwned + Send + Sync {
  const COLLECTION: Collection;

  fn key(&self) -> Uuid;

  fn doc_ref(&self) -> DocRef { DocRef::new(Self::COLLECTION, self.key()) }
}

/// A document with version bookkeeping (claims, arguments, links).
pub trait Versioned: Document + Clone {
  fn meta(&self) -> &VersionMeta;
  fn meta_mut(&mut self) -> &mut VersionMeta;
}

/// A document that is an edge between two vertex versions.
pub trait Edge: Document {
  fn edge(&self) -> &EdgeMeta;
  fn edge_mut(&mut self) -> &mut EdgeMeta;
}

// ─── Reads ───────────────────────────────────────────────────────────────────

pub async fn read<S, T>(store: &S, ctx: &RequestContext, key: Uuid) -> Result<Option<T>>
where
  S: DocumentStore,
  T: Document,
{
  let raw = ctx
    .bounded(async { store.read(T::COLLECTION, key).await.map_err(Into::into) })
    .await?;
  raw.map(serde_json::from_value).transpose().map_err(Error::from)
}

pub async fn query<S, T>(store: &S, ctx: &RequestContext, query: &DocQuery) -> Result<Vec<T>>
where
  S: DocumentStore,
  T: DeserializeOwned,
{
  let raws = query_raw(store, ctx, query).await?;
  raws
    .into_iter()
    .map(serde_json::from_value)
    .collect::<Result<_, _>>()
    .map_err(Error::from)
}

pub async fn query_raw<S>(store: &S, ctx: &RequestContext, query: &DocQuery) -> Result<Vec<Value>>
where
  S: DocumentStore,
{
  ctx
    .bounded(async { store.query(query).await.map_err(Into::into) })
    .await
}

pub async fn count<S>(store: &S, ctx: &RequestContext, query: &DocQuery) -> Result<u64>
where
  S: DocumentStore,
{
  ctx
    .bounded(async { store.count(query).await.map_err(Into::into) })
    .await
}

// ─── Writes ──────────────────────────────────────────────────────────────────

pub async fn create<S, T>(store: &S, ctx: &mut RequestContext, doc: &T) -> Result<()>
where
  S: DocumentStore,
  T: Document,
{
  create_raw(store, ctx, T::COLLECTION, doc.key(), serde_json::to_value(doc)?).await
}

pub async fn create_raw<S>(
  store: &S,
  ctx: &mut RequestContext,
  collection: Collection,
  key: Uuid,
  doc: Value,
) -> Result<()>
where
  S: DocumentStore,
{
  ctx.check_deadline()?;
  store.create(collection, doc).await.map_err(Into::<Error>::into)?;
  ctx.record(Write::Created { collection, key });
  Ok(())
}

pub async fn patch<S>(
  store: &S,
  ctx: &mut RequestContext,
  collection: Collection,
  key: Uuid,
  fields: Map<String, Value>,
  precondition: Precondition,
) -> Result<()>
where
  S: DocumentStore,
{
  ctx.check_deadline()?;
  let snapshot = store
    .patch(collection, key, fields, precondition)
    .await
    .map_err(Into::<Error>::into)?;
  ctx.record(Write::Patched { collection, key, snapshot });
  Ok(())
}

/// Set `end` to the request time. With [`Precondition::Current`] a document
/// that is already ended fails as a stale version.
pub async fn tombstone<S>(
  store: &S,
  ctx: &mut RequestContext,
  collection: Collection,
  key: Uuid,
  precondition: Precondition,
) -> Result<()>
where
  S: DocumentStore,
{
  let mut fields = Map::new();
  fields.insert("end".into(), serde_json::to_value(ctx.now())?);
  patch(store, ctx, collection, key, fields, precondition).await
}

// ─── Rollback ────────────────────────────────────────────────────────────────

/// Undo every write recorded since `savepoint`, newest first.
///
/// Best-effort: created documents are tombstoned, patched documents are
/// restored from their snapshots. Failures are logged and skipped.
pub async fn rollback<S>(store: &S, ctx: &mut RequestContext, savepoint: Savepoint)
where
  S: DocumentStore,
{
  let writes = ctx.take_since(savepoint);
  if writes.is_empty() {
    return;
  }
  tracing::debug!(writes = writes.len(), "rolling back");

  let end = match serde_json::to_value(ctx.now()) {
    Ok(v) => v,
    Err(e) => {
      tracing::warn!(error = %e, "cannot encode rollback timestamp");
      return;
    }
  };

  for write in writes.into_iter().rev() {
    let outcome = match write {
      Write::Created { collection, key } => {
        let mut fields = Map::new();
        fields.insert("end".into(), end.clone());
        store
          .patch(collection, key, fields, Precondition::None)
          .await
          .map(|_| ())
          .map_err(|e| (collection, key, Into::<Error>::into(e)))
      }
      Write::Patched { collection, key, snapshot } => store
        .replace(collection, key, snapshot)
        .await
        .map_err(|e| (collection, key, Into::<Error>::into(e))),
    };

    if let Err((collection, key, e)) = outcome {
      tracing::warn!(%collection, %key, error = %e, "rollback step failed");
    }
  }
}

/// Pass `result` through, rolling back to `savepoint` first if it failed.
pub async fn settle<S, T>(
  store: &S,
  ctx: &mut RequestContext,
  savepoint: Savepoint,
  result: Result<T>,
) -> Result<T>
where
  S: DocumentStore,
{
  if result.is_err() {
    rollback(store, ctx, savepoint).await;
  }
  result
}

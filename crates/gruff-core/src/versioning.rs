//! The versioning engine.
//!
//! A new version is persisted before any edge moves, so no edge ever points
//! at a missing vertex. Edges attached to the old version are then cloned
//! onto the new one and the originals ended ("clone-new then delete-old").
//! Callers own the savepoint; the public `version_*` functions roll back
//! their own writes on failure.

use serde_json::Value;
use uuid::Uuid;

use crate::{
  Error, Result,
  argument::{Argument, Target},
  claim::Claim,
  docs::{self, Document, Versioned},
  edge::{self, Inference},
  identity::{Collection, DocRef},
  link::Link,
  loader,
  request::RequestContext,
  store::{DocQuery, DocumentStore, Precondition},
};

/// Which endpoint of an edge refers to the vertex being replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
  From,
  To,
}

impl Endpoint {
  fn field(self) -> &'static str {
    match self {
      Self::From => "_from",
      Self::To => "_to",
    }
  }
}

// ─── Primitives ──────────────────────────────────────────────────────────────

/// End the current version of `id` and persist `change`d copy as the new
/// current version. Returns `(old, new)`.
///
/// The tombstone is conditional, so a concurrent versioning of the same id
/// makes one of the two fail as a stale version.
pub async fn replace_version<S, T, F>(
  store: &S,
  ctx: &mut RequestContext,
  id: Uuid,
  change: F,
) -> Result<(T, T)>
where
  S: DocumentStore,
  T: Versioned,
  F: FnOnce(&mut T) -> Result<()>,
{
  let old: T = loader::current(store, ctx, id).await?;
  docs::tombstone(store, ctx, T::COLLECTION, old.key(), Precondition::Current).await?;

  let mut new = old.clone();
  change(&mut new)?;
  new.meta_mut().prepare_for_create(ctx);
  docs::create(store, ctx, &new).await?;

  let mut old = old;
  old.meta_mut().prepare_for_delete(ctx);
  Ok((old, new))
}

/// Move every current edge of `collection` whose `endpoint` is `old` onto
/// `new`. Returns the number of edges moved.
pub async fn rewire<S>(
  store: &S,
  ctx: &mut RequestContext,
  collection: Collection,
  endpoint: Endpoint,
  old: DocRef,
  new: DocRef,
) -> Result<usize>
where
  S: DocumentStore,
{
  let query = match endpoint {
    Endpoint::From => DocQuery::new(collection).from_ref(old),
    Endpoint::To => DocQuery::new(collection).to_ref(old),
  };
  let edges = docs::query_raw(store, ctx, &query).await?;

  for edge in &edges {
    let Value::Object(fields) = edge else {
      return Err(Error::server(format!("{} is not an object", collection.noun())));
    };
    let old_key = edge_key(fields)?;

    let mut clone = fields.clone();
    let key = Uuid::new_v4();
    clone.insert("key".into(), Value::String(key.to_string()));
    clone.insert(endpoint.field().into(), Value::String(new.to_string()));
    clone.insert("start".into(), serde_json::to_value(ctx.now())?);
    clone.insert("end".into(), Value::Null);

    docs::create_raw(store, ctx, collection, key, Value::Object(clone)).await?;
    docs::tombstone(store, ctx, collection, old_key, Precondition::Current).await?;
  }
  Ok(edges.len())
}

fn edge_key(fields: &serde_json::Map<String, Value>) -> Result<Uuid> {
  fields
    .get("key")
    .and_then(Value::as_str)
    .and_then(|k| Uuid::parse_str(k).ok())
    .ok_or_else(|| Error::server("edge has no key"))
}

/// End every current edge, in every edge collection, touching `vertex`.
pub async fn end_all_edges<S>(store: &S, ctx: &mut RequestContext, vertex: DocRef) -> Result<usize>
where
  S: DocumentStore,
{
  let mut ended = 0;
  for collection in Collection::EDGES {
    for query in [
      DocQuery::new(collection).from_ref(vertex),
      DocQuery::new(collection).to_ref(vertex),
    ] {
      for edge in docs::query_raw(store, ctx, &query).await? {
        let Value::Object(fields) = &edge else { continue };
        let key = edge_key(fields)?;
        docs::tombstone(store, ctx, collection, key, Precondition::Current).await?;
        ended += 1;
      }
    }
  }
  Ok(ended)
}

/// Tombstone the current version `doc` and end every edge touching it.
pub async fn retire<S, T>(store: &S, ctx: &mut RequestContext, doc: &T) -> Result<()>
where
  S: DocumentStore,
  T: Versioned,
{
  docs::tombstone(store, ctx, T::COLLECTION, doc.key(), Precondition::Current).await?;
  let ended = end_all_edges(store, ctx, doc.doc_ref()).await?;
  tracing::debug!(collection = %T::COLLECTION, id = %doc.meta().id, ended, "retired version");
  Ok(())
}

// ─── Entity versioning ───────────────────────────────────────────────────────

/// Produce a new version of claim `id` and carry its edges over.
pub async fn version_claim<S, F>(
  store: &S,
  ctx: &mut RequestContext,
  id: Uuid,
  change: F,
) -> Result<Claim>
where
  S: DocumentStore,
  F: FnOnce(&mut Claim) -> Result<()>,
{
  let sp = ctx.savepoint();
  let result: Result<Claim> = async {
    let (old, new) = replace_version::<S, Claim, F>(store, ctx, id, change).await?;
    let (o, n) = (old.doc_ref(), new.doc_ref());

    rewire(store, ctx, Collection::Premises, Endpoint::From, o, n).await?;
    rewire(store, ctx, Collection::Premises, Endpoint::To, o, n).await?;
    rewire(store, ctx, Collection::Inferences, Endpoint::From, o, n).await?;
    rewire(store, ctx, Collection::BaseClaims, Endpoint::To, o, n).await?;
    rewire(store, ctx, Collection::ContextEdges, Endpoint::To, o, n).await?;
    rewire(store, ctx, Collection::Scores, Endpoint::To, o, n).await?;

    ctx.mark_stale(Target::Claim(id));
    Ok(new)
  }
  .await;
  docs::settle(store, ctx, sp, result).await
}

/// Produce a new version of argument `id` and carry its edges over.
///
/// If `change` alters the target, the inference from the old target is
/// ended and a fresh one is created from the new target's current version.
pub async fn version_argument<S, F>(
  store: &S,
  ctx: &mut RequestContext,
  id: Uuid,
  change: F,
) -> Result<Argument>
where
  S: DocumentStore,
  F: FnOnce(&mut Argument) -> Result<()>,
{
  let sp = ctx.savepoint();
  let result: Result<Argument> = async {
    let (old, new) = replace_version::<S, Argument, F>(store, ctx, id, change).await?;
    let (o, n) = (old.doc_ref(), new.doc_ref());

    if old.target == new.target {
      rewire(store, ctx, Collection::Inferences, Endpoint::To, o, n).await?;
    } else {
      edge::end_edges::<S, Inference>(store, ctx, &DocQuery::new(Collection::Inferences).to_ref(o))
        .await?;
      let target = loader::resolve_target(store, ctx, new.target).await?;
      edge::create_edge(store, ctx, Inference::new(target, n)).await?;
      ctx.mark_stale(old.target);
    }
    rewire(store, ctx, Collection::BaseClaims, Endpoint::From, o, n).await?;
    rewire(store, ctx, Collection::Inferences, Endpoint::From, o, n).await?;
    rewire(store, ctx, Collection::Scores, Endpoint::To, o, n).await?;

    ctx.mark_stale(new.target);
    ctx.mark_stale(Target::Argument(id));
    Ok(new)
  }
  .await;
  docs::settle(store, ctx, sp, result).await
}

/// Produce a new version of link `id`. Links have no edges.
pub async fn version_link<S, F>(
  store: &S,
  ctx: &mut RequestContext,
  id: Uuid,
  change: F,
) -> Result<Link>
where
  S: DocumentStore,
  F: FnOnce(&mut Link) -> Result<()>,
{
  let sp = ctx.savepoint();
  let result = replace_version::<S, Link, F>(store, ctx, id, change)
    .await
    .map(|(_, new)| new);
  docs::settle(store, ctx, sp, result).await
}

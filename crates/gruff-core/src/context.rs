//! Topic contexts and their association with claims.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  Error, Result,
  claim::Claim,
  docs::{self, Document},
  edge::{self, ContextEdge},
  identity::{Collection, DocRef, RecordMeta},
  loader,
  request::RequestContext,
  store::{DocQuery, DocumentStore, Field, Liveness},
  validate::{self, Constraint, FieldRule, Validate},
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Context {
  #[serde(flatten)]
  pub meta:       RecordMeta,
  pub short_name: String,
  pub title:      String,
  pub url:        String,
  /// Freebase machine id.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub mid:        Option<String>,
  /// Wikidata id.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub qid:        Option<String>,
}

impl Context {
  pub fn new(short_name: impl Into<String>, title: impl Into<String>, url: impl Into<String>) -> Self {
    Self {
      meta:       RecordMeta::default(),
      short_name: short_name.into(),
      title:      title.into(),
      url:        url.into(),
      mid:        None,
      qid:        None,
    }
  }
}

impl Document for Context {
  const COLLECTION: Collection = Collection::Contexts;

  fn key(&self) -> Uuid { self.meta.key }
}

static CONTEXT_RULES: &[FieldRule] = &[
  FieldRule { name: "shortName", constraints: &[Constraint::Required] },
  FieldRule { name: "title", constraints: &[Constraint::Required] },
  FieldRule { name: "url", constraints: &[Constraint::Required, Constraint::Url] },
];

impl Validate for Context {
  fn rules() -> &'static [FieldRule] { CONTEXT_RULES }
}

// ─── CRUD ────────────────────────────────────────────────────────────────────

pub async fn create_context<S>(
  store: &S,
  ctx: &mut RequestContext,
  mut context: Context,
) -> Result<Context>
where
  S: DocumentStore,
{
  ctx.require_user()?;
  validate::validate_for_create(&context)?;
  context.meta = RecordMeta::default();
  context.meta.prepare_for_create(ctx);

  let sp = ctx.savepoint();
  let result = docs::create(store, ctx, &context).await.map(|()| context);
  docs::settle(store, ctx, sp, result).await
}

pub async fn load_context<S>(store: &S, ctx: &RequestContext, key: Uuid) -> Result<Context>
where
  S: DocumentStore,
{
  docs::read::<S, Context>(store, ctx, key)
    .await?
    .filter(|c| c.meta.end.is_none())
    .ok_or_else(|| Error::not_found(format!("context {key} not found")))
}

pub async fn list_contexts<S>(store: &S, ctx: &RequestContext) -> Result<Vec<Context>>
where
  S: DocumentStore,
{
  let query = DocQuery::new(Collection::Contexts).sort_by(Field::Attr("shortName"), false);
  docs::query(store, ctx, &query).await
}

// ─── Association ─────────────────────────────────────────────────────────────

/// Associate a context with a claim. Returns `false` if the association
/// already existed.
pub async fn add_context<S>(
  store: &S,
  ctx: &mut RequestContext,
  claim_id: Uuid,
  context_key: Uuid,
) -> Result<bool>
where
  S: DocumentStore,
{
  ctx.require_user()?;
  let claim: Claim = loader::current(store, ctx, claim_id).await?;
  let context = load_context(store, ctx, context_key).await?;

  let existing = DocQuery::new(Collection::ContextEdges)
    .from_ref(context.doc_ref())
    .to_ref(claim.doc_ref());
  if docs::count(store, ctx, &existing).await? > 0 {
    return Ok(false);
  }

  let sp = ctx.savepoint();
  let result = edge::create_edge(store, ctx, ContextEdge::new(context.doc_ref(), claim.doc_ref()))
    .await
    .map(|_| true);
  docs::settle(store, ctx, sp, result).await
}

pub async fn remove_context<S>(
  store: &S,
  ctx: &mut RequestContext,
  claim_id: Uuid,
  context_key: Uuid,
) -> Result<()>
where
  S: DocumentStore,
{
  ctx.require_user()?;
  let claim: Claim = loader::current(store, ctx, claim_id).await?;
  let query = DocQuery::new(Collection::ContextEdges)
    .from_ref(DocRef::new(Collection::Contexts, context_key))
    .to_ref(claim.doc_ref());

  let sp = ctx.savepoint();
  let result = edge::end_edges::<S, ContextEdge>(store, ctx, &query).await;
  match docs::settle(store, ctx, sp, result).await? {
    ended if ended.is_empty() => Err(Error::not_found("claim is not in that context")),
    _ => Ok(()),
  }
}

/// Contexts associated with a claim, now or at `at`.
pub async fn contexts_of<S>(
  store: &S,
  ctx: &RequestContext,
  claim: &Claim,
  at: Option<chrono::DateTime<chrono::Utc>>,
) -> Result<Vec<Context>>
where
  S: DocumentStore,
{
  let edges: Vec<ContextEdge> = docs::query(
    store,
    ctx,
    &DocQuery::new(Collection::ContextEdges)
      .to_ref(claim.doc_ref())
      .liveness(Liveness::at_or_current(at)),
  )
  .await?;
  let keys: Vec<String> = edges.iter().map(|e| e.edge.from.key.to_string()).collect();
  if keys.is_empty() {
    return Ok(Vec::new());
  }
  docs::query(store, ctx, &DocQuery::new(Collection::Contexts).any_of(Field::Key, keys)).await
}

/// Current claims associated with a context.
pub async fn claims_in_context<S>(store: &S, ctx: &RequestContext, context_key: Uuid) -> Result<Vec<Claim>>
where
  S: DocumentStore,
{
  let edges: Vec<ContextEdge> = docs::query(
    store,
    ctx,
    &DocQuery::new(Collection::ContextEdges).from_ref(DocRef::new(Collection::Contexts, context_key)),
  )
  .await?;
  let keys: Vec<String> = edges.iter().map(|e| e.edge.to.key.to_string()).collect();
  if keys.is_empty() {
    return Ok(Vec::new());
  }
  docs::query(store, ctx, &DocQuery::new(Collection::Claims).any_of(Field::Key, keys)).await
}

//! Typed edges of the debate graph.
//!
//! Edges connect specific vertex *versions*. They are never updated in place:
//! when an endpoint is versioned, a clone pointing at the new version is
//! created and the old edge is ended.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  Result,
  docs::{self, Document, Edge},
  identity::{Collection, DocRef, EdgeMeta},
  request::RequestContext,
  store::{DocQuery, DocumentStore, Precondition},
};

/// Target version → argument version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Inference {
  #[serde(flatten)]
  pub edge: EdgeMeta,
}

/// Argument version → its base claim version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaseClaimEdge {
  #[serde(flatten)]
  pub edge: EdgeMeta,
}

/// Multi-premise claim version → premise claim version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PremiseEdge {
  #[serde(flatten)]
  pub edge:  EdgeMeta,
  /// 1-based; not compacted when a premise is removed.
  pub order: u32,
}

/// Context → claim version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextEdge {
  #[serde(flatten)]
  pub edge: EdgeMeta,
}

/// User → claim version (truth) or user → argument version (relevance).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserScore {
  #[serde(flatten)]
  pub edge:  EdgeMeta,
  pub score: f64,
}

macro_rules! edge_document {
  ($ty:ty, $collection:expr) => {
    impl Document for $ty {
      const COLLECTION: Collection = $collection;

      fn key(&self) -> Uuid { self.edge.key }
    }

    impl Edge for $ty {
      fn edge(&self) -> &EdgeMeta { &self.edge }

      fn edge_mut(&mut self) -> &mut EdgeMeta { &mut self.edge }
    }
  };
}

edge_document!(Inference, Collection::Inferences);
edge_document!(BaseClaimEdge, Collection::BaseClaims);
edge_document!(PremiseEdge, Collection::Premises);
edge_document!(ContextEdge, Collection::ContextEdges);
edge_document!(UserScore, Collection::Scores);

impl Inference {
  pub fn new(from: DocRef, to: DocRef) -> Self { Self { edge: EdgeMeta::new(from, to) } }
}

impl BaseClaimEdge {
  pub fn new(from: DocRef, to: DocRef) -> Self { Self { edge: EdgeMeta::new(from, to) } }
}

impl PremiseEdge {
  pub fn new(from: DocRef, to: DocRef, order: u32) -> Self {
    Self { edge: EdgeMeta::new(from, to), order }
  }
}

impl ContextEdge {
  pub fn new(from: DocRef, to: DocRef) -> Self { Self { edge: EdgeMeta::new(from, to) } }
}

impl UserScore {
  pub fn new(from: DocRef, to: DocRef, score: f64) -> Self {
    Self { edge: EdgeMeta::new(from, to), score }
  }
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

/// Stamp and persist a new edge.
pub async fn create_edge<S, E>(store: &S, ctx: &mut RequestContext, mut edge: E) -> Result<E>
where
  S: DocumentStore,
  E: Edge,
{
  edge.edge_mut().prepare_for_create(ctx);
  docs::create(store, ctx, &edge).await?;
  Ok(edge)
}

/// End every current edge matched by `query`; returns the ended edges.
pub async fn end_edges<S, E>(store: &S, ctx: &mut RequestContext, query: &DocQuery) -> Result<Vec<E>>
where
  S: DocumentStore,
  E: Edge,
{
  let edges: Vec<E> = docs::query(store, ctx, query).await?;
  for edge in &edges {
    docs::tombstone(store, ctx, E::COLLECTION, edge.key(), Precondition::Current).await?;
  }
  Ok(edges)
}

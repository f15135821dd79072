//! Personal scores and the cached aggregate fields derived from them.
//!
//! Writes only mark vertices stale on the request context. The API hands the
//! stale set to a [`Recomputer`], a single background task that expands it to
//! every ancestor, evaluates the affected subgraph and patches the cached
//! `truth`/`truthRU`/`strength`/`strengthRU` fields in place.

use std::{
  collections::{BTreeSet, HashMap, HashSet, VecDeque},
  sync::Arc,
};

use serde_json::{Map, Value};
use tokio::{sync::mpsc, task::JoinHandle};
use uuid::Uuid;

use crate::{
  Error, Result, Subcode,
  aggregate::{ArgumentNode, ClaimNode, ScoreGraph},
  argument::{Argument, Target},
  claim::Claim,
  docs::{self, Document},
  edge::{self, BaseClaimEdge, Inference, PremiseEdge, UserScore},
  identity::{Collection, DocRef},
  loader,
  request::RequestContext,
  store::{DocQuery, DocumentStore, Field, Precondition},
};

// ─── Personal scores ─────────────────────────────────────────────────────────

/// Whether a score was a first score or replaced an earlier one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreOutcome {
  Created,
  Updated,
}

/// Record the acting user's belief in `target`, replacing any earlier score.
pub async fn set_score<S>(
  store: &S,
  ctx: &mut RequestContext,
  target: Target,
  score: f64,
) -> Result<(ScoreOutcome, UserScore)>
where
  S: DocumentStore,
{
  let user = ctx.require_user()?;
  if !(0.0..=1.0).contains(&score) {
    return Err(Error::business("score must be between 0 and 1").with_data("fields", ["score"].as_slice()));
  }
  let to = loader::resolve_target(store, ctx, target).await?;
  let from = DocRef::new(Collection::Users, user);

  let sp = ctx.savepoint();
  let result: Result<(ScoreOutcome, UserScore)> = async {
    let query = DocQuery::new(Collection::Scores).from_ref(from).to_ref(to);
    let replaced = edge::end_edges::<S, UserScore>(store, ctx, &query).await?;
    let created = edge::create_edge(store, ctx, UserScore::new(from, to, score)).await?;
    ctx.mark_stale(target);

    let outcome = if replaced.is_empty() { ScoreOutcome::Created } else { ScoreOutcome::Updated };
    Ok((outcome, created))
  }
  .await;
  docs::settle(store, ctx, sp, result).await
}

/// The user's current score on `target`, if any.
pub async fn score_of<S>(
  store: &S,
  ctx: &RequestContext,
  user: Uuid,
  target: Target,
) -> Result<Option<UserScore>>
where
  S: DocumentStore,
{
  let to = loader::resolve_target(store, ctx, target).await?;
  let query = DocQuery::new(Collection::Scores)
    .from_ref(DocRef::new(Collection::Users, user))
    .to_ref(to)
    .limit(1);
  let mut scores: Vec<UserScore> = docs::query(store, ctx, &query).await?;
  Ok(scores.pop())
}

/// Users holding a current score on the vertex version `vertex`.
pub async fn watchers<S>(store: &S, ctx: &RequestContext, vertex: DocRef) -> Result<Vec<Uuid>>
where
  S: DocumentStore,
{
  let scores: Vec<UserScore> =
    docs::query(store, ctx, &DocQuery::new(Collection::Scores).to_ref(vertex)).await?;
  let users: BTreeSet<Uuid> = scores.iter().map(|s| s.edge.from.key).collect();
  Ok(users.into_iter().collect())
}

async fn mean_score<S>(store: &S, ctx: &RequestContext, vertex: DocRef) -> Result<f64>
where
  S: DocumentStore,
{
  let scores: Vec<UserScore> =
    docs::query(store, ctx, &DocQuery::new(Collection::Scores).to_ref(vertex)).await?;
  if scores.is_empty() {
    return Ok(0.0);
  }
  Ok(scores.iter().map(|s| s.score).sum::<f64>() / scores.len() as f64)
}

// ─── Recomputation ───────────────────────────────────────────────────────────

/// Recompute the cached aggregates of `targets` and of everything whose
/// aggregate depends on them. Returns the number of versions patched.
pub async fn recompute<S>(store: &S, ctx: &mut RequestContext, targets: &[Target]) -> Result<usize>
where
  S: DocumentStore,
{
  let dirty = ancestors(store, ctx, targets).await?;
  let snapshot = load_subgraph(store, ctx, &dirty).await?;
  let values = snapshot.graph.evaluate();

  let mut patched = 0;
  for target in &dirty {
    let (collection, key, fields) = match *target {
      Target::Claim(id) => {
        let (Some(claim), Some(node)) = (snapshot.claims.get(&id), snapshot.graph.claims.get(&id))
        else {
          continue;
        };
        let truth_ru = values.truth_ru.get(&id).copied().unwrap_or(node.truth);
        if claim.truth == node.truth && claim.truth_ru == truth_ru {
          continue;
        }
        (Collection::Claims, claim.key(), cached_fields("truth", node.truth, "truthRU", truth_ru))
      }
      Target::Argument(id) => {
        let (Some(argument), Some(node)) =
          (snapshot.arguments.get(&id), snapshot.graph.arguments.get(&id))
        else {
          continue;
        };
        let strength_ru = values.strength_ru.get(&id).copied().unwrap_or(node.strength);
        if argument.strength == node.strength && argument.strength_ru == strength_ru {
          continue;
        }
        (
          Collection::Arguments,
          argument.key(),
          cached_fields("strength", node.strength, "strengthRU", strength_ru),
        )
      }
    };

    match docs::patch(store, ctx, collection, key, fields, Precondition::Current).await {
      Ok(()) => patched += 1,
      // Versioned meanwhile; the new version is recomputed by its own writer.
      Err(e) if e.subcode == Some(Subcode::StaleVersion) => {
        tracing::debug!(%collection, %key, "skipping stale version");
      }
      Err(e) => return Err(e),
    }
  }
  Ok(patched)
}

fn cached_fields(a: &str, a_value: f64, b: &str, b_value: f64) -> Map<String, Value> {
  let mut fields = Map::new();
  fields.insert(a.into(), Value::from(a_value));
  fields.insert(b.into(), Value::from(b_value));
  fields
}

/// `targets` plus every vertex whose aggregate reads one of them: targets of
/// their arguments, multi-premise claims using them as premises, and targets
/// of arguments resting on them as base claims.
async fn ancestors<S>(store: &S, ctx: &RequestContext, targets: &[Target]) -> Result<BTreeSet<Target>>
where
  S: DocumentStore,
{
  let mut seen: BTreeSet<Target> = BTreeSet::new();
  let mut queue: VecDeque<Target> = targets.iter().copied().collect();

  while let Some(target) = queue.pop_front() {
    if !seen.insert(target) {
      continue;
    }
    match target {
      Target::Claim(id) => {
        let claim: Claim = match loader::current(store, ctx, id).await {
          Ok(c) => c,
          Err(e) if e.is_not_found() => continue,
          Err(e) => return Err(e),
        };
        let r = claim.doc_ref();

        let premise_of: Vec<PremiseEdge> =
          docs::query(store, ctx, &DocQuery::new(Collection::Premises).to_ref(r)).await?;
        let parents: Vec<Claim> = read_keys(store, ctx, premise_of.iter().map(|e| e.edge.from.key)).await?;
        queue.extend(parents.iter().map(|c| Target::Claim(c.meta.id)));

        let based: Vec<BaseClaimEdge> =
          docs::query(store, ctx, &DocQuery::new(Collection::BaseClaims).to_ref(r)).await?;
        let arguments: Vec<Argument> = read_keys(store, ctx, based.iter().map(|e| e.edge.from.key)).await?;
        queue.extend(arguments.iter().map(|a| a.target));
      }
      Target::Argument(id) => match loader::current::<S, Argument>(store, ctx, id).await {
        Ok(a) => queue.push_back(a.target),
        Err(e) if e.is_not_found() => {}
        Err(e) => return Err(e),
      },
    }
  }
  Ok(seen)
}

struct Snapshot {
  graph:     ScoreGraph,
  claims:    HashMap<Uuid, Claim>,
  arguments: HashMap<Uuid, Argument>,
}

/// Load `roots` and everything below them into a [`ScoreGraph`].
async fn load_subgraph<S>(store: &S, ctx: &RequestContext, roots: &BTreeSet<Target>) -> Result<Snapshot>
where
  S: DocumentStore,
{
  let mut snapshot = Snapshot {
    graph:     ScoreGraph::default(),
    claims:    HashMap::new(),
    arguments: HashMap::new(),
  };
  let mut seen: HashSet<Target> = HashSet::new();
  let mut queue: VecDeque<Target> = roots.iter().copied().collect();

  while let Some(target) = queue.pop_front() {
    if !seen.insert(target) {
      continue;
    }
    match target {
      Target::Claim(id) => {
        let claim: Claim = match loader::current(store, ctx, id).await {
          Ok(c) => c,
          Err(e) if e.is_not_found() => continue,
          Err(e) => return Err(e),
        };
        let r = claim.doc_ref();

        let mut premise_edges: Vec<PremiseEdge> =
          docs::query(store, ctx, &DocQuery::new(Collection::Premises).from_ref(r)).await?;
        premise_edges.sort_by_key(|e| (e.order, e.edge.start));
        let premise_claims: Vec<Claim> =
          read_keys(store, ctx, premise_edges.iter().map(|e| e.edge.to.key)).await?;
        let by_key: HashMap<Uuid, Uuid> =
          premise_claims.iter().map(|c| (c.meta.key, c.meta.id)).collect();
        let premises: Vec<Uuid> = premise_edges
          .iter()
          .filter_map(|e| by_key.get(&e.edge.to.key).copied())
          .collect();

        let arguments = child_arguments(store, ctx, r).await?;

        queue.extend(premises.iter().map(|p| Target::Claim(*p)));
        queue.extend(arguments.iter().map(|a| Target::Argument(*a)));

        snapshot.graph.claims.insert(id, ClaimNode {
          truth: mean_score(store, ctx, r).await?,
          multi_premise: claim.multi_premise,
          premise_rule: claim.premise_rule,
          premises,
          arguments,
          cached: claim.truth_ru,
        });
        snapshot.claims.insert(id, claim);
      }
      Target::Argument(id) => {
        let argument: Argument = match loader::current(store, ctx, id).await {
          Ok(a) => a,
          Err(e) if e.is_not_found() => continue,
          Err(e) => return Err(e),
        };
        let r = argument.doc_ref();
        let arguments = child_arguments(store, ctx, r).await?;

        queue.push_back(Target::Claim(argument.claim_id));
        queue.extend(arguments.iter().map(|a| Target::Argument(*a)));

        snapshot.graph.arguments.insert(id, ArgumentNode {
          base_claim: argument.claim_id,
          pro: argument.pro,
          strength: mean_score(store, ctx, r).await?,
          arguments,
          cached: argument.strength_ru,
        });
        snapshot.arguments.insert(id, argument);
      }
    }
  }
  Ok(snapshot)
}

/// Logical ids of the current arguments targeting `vertex`.
async fn child_arguments<S>(store: &S, ctx: &RequestContext, vertex: DocRef) -> Result<Vec<Uuid>>
where
  S: DocumentStore,
{
  let inferences: Vec<Inference> =
    docs::query(store, ctx, &DocQuery::new(Collection::Inferences).from_ref(vertex)).await?;
  let arguments: Vec<Argument> = read_keys(store, ctx, inferences.iter().map(|e| e.edge.to.key)).await?;
  Ok(arguments.iter().map(|a| a.meta.id).collect())
}

/// Current documents of `T`'s collection with the given keys.
pub(crate) async fn read_keys<S, T>(
  store: &S,
  ctx: &RequestContext,
  keys: impl Iterator<Item = Uuid>,
) -> Result<Vec<T>>
where
  S: DocumentStore,
  T: Document,
{
  let keys: Vec<String> = keys.map(|k| k.to_string()).collect();
  if keys.is_empty() {
    return Ok(Vec::new());
  }
  docs::query(store, ctx, &DocQuery::new(T::COLLECTION).any_of(Field::Key, keys)).await
}

// ─── Background worker ───────────────────────────────────────────────────────

/// Handle to the background aggregate recomputation task.
///
/// Cloning is cheap; the task stops once every handle is dropped and the
/// queue is drained.
#[derive(Debug, Clone)]
pub struct Recomputer {
  tx: mpsc::UnboundedSender<Vec<Target>>,
}

impl Recomputer {
  pub fn spawn<S>(store: Arc<S>) -> (Self, JoinHandle<()>)
  where
    S: DocumentStore + 'static,
  {
    let (tx, mut rx) = mpsc::unbounded_channel::<Vec<Target>>();

    let handle = tokio::spawn(async move {
      while let Some(first) = rx.recv().await {
        let mut batch: BTreeSet<Target> = first.into_iter().collect();
        while let Ok(more) = rx.try_recv() {
          batch.extend(more);
        }
        let targets: Vec<Target> = batch.into_iter().collect();

        let mut ctx = RequestContext::new(None);
        match recompute(&*store, &mut ctx, &targets).await {
          Ok(patched) => tracing::debug!(targets = targets.len(), patched, "recomputed aggregates"),
          Err(e) => tracing::warn!(error = %e, at = %e.captured_at(), "aggregate recomputation failed"),
        }
      }
      tracing::debug!("recomputer stopped");
    });

    (Self { tx }, handle)
  }

  /// Queue `targets` for recomputation.
  pub fn schedule(&self, targets: Vec<Target>) {
    if targets.is_empty() {
      return;
    }
    if self.tx.send(targets).is_err() {
      tracing::warn!("recomputer is not running; dropping stale set");
    }
  }
}

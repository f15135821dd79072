//! Structural operations on the debate graph: attaching and moving
//! arguments, managing premises, and cascading deletes.
//!
//! Every operation takes a savepoint on entry and rolls its own writes back
//! on failure. Nested operations (versioning inside `add_premise`, say) do
//! the same for their suffix of the buffer.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::{
  Error, Result,
  argument::{Argument, ArgumentUpdate, Target},
  changelog::{self, ChangeKind, NotificationKind},
  claim::{Claim, PremiseRule},
  docs::{self, Document},
  edge::{self, BaseClaimEdge, Inference, PremiseEdge, UserScore},
  identity::{Collection, DocRef, VersionMeta},
  loader::{self, Locator},
  request::RequestContext,
  scoring,
  store::{DocQuery, DocumentStore, Field, Liveness},
  user,
  validate, versioning,
};

// ─── Reads ───────────────────────────────────────────────────────────────────

/// Arguments targeting the vertex version `target`, live now or at `at`.
pub async fn arguments_of<S>(
  store: &S,
  ctx: &RequestContext,
  target: DocRef,
  at: Option<DateTime<Utc>>,
) -> Result<Vec<Argument>>
where
  S: DocumentStore,
{
  let inferences: Vec<Inference> = docs::query(
    store,
    ctx,
    &DocQuery::new(Collection::Inferences)
      .from_ref(target)
      .liveness(Liveness::at_or_current(at)),
  )
  .await?;
  versions_by_key(store, ctx, inferences.iter().map(|e| e.edge.to.key)).await
}

/// Premises of `claim` ordered by `(order, start)`, live now or at `at`.
pub async fn premises<S>(
  store: &S,
  ctx: &RequestContext,
  claim: &Claim,
  at: Option<DateTime<Utc>>,
) -> Result<Vec<Claim>>
where
  S: DocumentStore,
{
  let mut edges: Vec<PremiseEdge> = docs::query(
    store,
    ctx,
    &DocQuery::new(Collection::Premises)
      .from_ref(claim.doc_ref())
      .liveness(Liveness::at_or_current(at)),
  )
  .await?;
  edges.sort_by_key(|e| (e.order, e.edge.start));

  let claims: Vec<Claim> = versions_by_key(store, ctx, edges.iter().map(|e| e.edge.to.key)).await?;
  let mut by_key: HashMap<Uuid, Claim> = claims.into_iter().map(|c| (c.meta.key, c)).collect();
  Ok(edges.iter().filter_map(|e| by_key.remove(&e.edge.to.key)).collect())
}

pub async fn number_of_premises<S>(store: &S, ctx: &RequestContext, claim: &Claim) -> Result<u64>
where
  S: DocumentStore,
{
  docs::count(store, ctx, &DocQuery::new(Collection::Premises).from_ref(claim.doc_ref())).await
}

/// Specific versions by key, whatever their liveness.
async fn versions_by_key<S, T>(
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
  let query = DocQuery::new(T::COLLECTION).any_of(Field::Key, keys).history();
  docs::query(store, ctx, &query).await
}

/// A claim with its ordered premises and the arguments about it.
#[derive(Debug, Clone, Serialize)]
pub struct ClaimView {
  #[serde(flatten)]
  pub claim:     Claim,
  pub premises:  Vec<Claim>,
  pub arguments: Vec<Argument>,
}

pub async fn claim_view<S>(store: &S, ctx: &RequestContext, locator: Locator) -> Result<ClaimView>
where
  S: DocumentStore,
{
  let claim: Claim = loader::load(store, ctx, locator).await?;
  let at = locator.query_at;
  let premises = premises(store, ctx, &claim, at).await?;
  let arguments = arguments_of(store, ctx, claim.doc_ref(), at).await?;
  Ok(ClaimView { claim, premises, arguments })
}

// ─── Arguments ───────────────────────────────────────────────────────────────

/// Attach a new argument to its target and base claim, log it, and notify
/// everyone watching the target.
pub async fn add_argument<S>(store: &S, ctx: &mut RequestContext, mut argument: Argument) -> Result<Argument>
where
  S: DocumentStore,
{
  let actor = ctx.require_user()?;
  argument.meta = VersionMeta::default();
  validate::validate_for_create(&argument)?;

  let base: Claim = loader::current(store, ctx, argument.claim_id).await?;
  let target = argument.target;
  let target_ref = loader::resolve_target(store, ctx, target).await?;

  let sp = ctx.savepoint();
  let result: Result<Argument> = async {
    argument.meta.prepare_for_create(ctx);
    docs::create(store, ctx, &argument).await?;
    let r = argument.doc_ref();

    edge::create_edge(store, ctx, BaseClaimEdge::new(r, base.doc_ref())).await?;
    edge::create_edge(store, ctx, Inference::new(target_ref, r)).await?;

    let id = argument.meta.id;
    changelog::record_change(store, ctx, ChangeKind::CreatedArgument, id, None, Some(target)).await?;
    for watcher in scoring::watchers(store, ctx, target_ref).await? {
      if watcher != actor {
        changelog::notify(store, ctx, watcher, NotificationKind::NewArgument, id, None, Some(target))
          .await?;
      }
    }
    ctx.mark_stale(target);

    tracing::debug!(%id, ?target, "added argument");
    Ok(argument)
  }
  .await;
  docs::settle(store, ctx, sp, result).await
}

pub async fn update_argument<S>(
  store: &S,
  ctx: &mut RequestContext,
  id: Uuid,
  update: ArgumentUpdate,
) -> Result<Argument>
where
  S: DocumentStore,
{
  ctx.require_user()?;
  validate::validate_for_update::<Argument>(&update.fields()?)?;

  let current: Argument = loader::current(store, ctx, id).await?;
  let mut preview = current.clone();
  if !update.apply(&mut preview) {
    return Ok(current);
  }
  versioning::version_argument(store, ctx, id, |argument| {
    update.apply(argument);
    Ok(())
  })
  .await
}

pub async fn delete_argument<S>(store: &S, ctx: &mut RequestContext, id: Uuid) -> Result<Argument>
where
  S: DocumentStore,
{
  let current: Argument = loader::current(store, ctx, id).await?;
  user::require_owner_or_curator(store, ctx, current.meta.creator).await?;

  let sp = ctx.savepoint();
  let result: Result<Argument> = async {
    cascade_delete(store, ctx, current.doc_ref()).await?;
    versioning::retire(store, ctx, &current).await?;
    ctx.mark_stale(current.target);
    Ok(current)
  }
  .await;
  docs::settle(store, ctx, sp, result).await
}

/// Retire every argument that (transitively) targets `root`.
pub(crate) async fn cascade_delete<S>(store: &S, ctx: &mut RequestContext, root: DocRef) -> Result<usize>
where
  S: DocumentStore,
{
  let mut doomed: Vec<Argument> = Vec::new();
  let mut seen: HashSet<Uuid> = HashSet::new();
  let mut queue: VecDeque<DocRef> = VecDeque::from([root]);

  while let Some(vertex) = queue.pop_front() {
    for argument in arguments_of(store, ctx, vertex, None).await? {
      if seen.insert(argument.meta.key) {
        queue.push_back(argument.doc_ref());
        doomed.push(argument);
      }
    }
  }

  for argument in &doomed {
    versioning::retire(store, ctx, argument).await?;
  }
  if !doomed.is_empty() {
    tracing::debug!(%root, deleted = doomed.len(), "cascaded delete");
  }
  Ok(doomed.len())
}

/// Logical ids of every argument below `root` in the argument tree.
async fn descendants<S>(store: &S, ctx: &RequestContext, root: &Argument) -> Result<BTreeSet<Uuid>>
where
  S: DocumentStore,
{
  let mut found = BTreeSet::new();
  let mut queue: VecDeque<DocRef> = VecDeque::from([root.doc_ref()]);
  while let Some(vertex) = queue.pop_front() {
    for child in arguments_of(store, ctx, vertex, None).await? {
      if found.insert(child.meta.id) {
        queue.push_back(child.doc_ref());
      }
    }
  }
  Ok(found)
}

/// Re-attach an argument to `new_target`, invalidating every score on it.
///
/// Users who scored the argument are told it moved; users who scored one of
/// its direct children are told the parent moved.
pub async fn move_argument<S>(
  store: &S,
  ctx: &mut RequestContext,
  id: Uuid,
  new_target: Target,
  pro: bool,
) -> Result<Argument>
where
  S: DocumentStore,
{
  let current: Argument = loader::current(store, ctx, id).await?;
  user::require_owner_or_curator(store, ctx, current.meta.creator).await?;

  if new_target == Target::Argument(id) {
    return Err(Error::business("an argument cannot target itself"));
  }
  if let Target::Argument(target_id) = new_target
    && descendants(store, ctx, &current).await?.contains(&target_id)
  {
    return Err(Error::business("an argument cannot be moved onto its own descendant"));
  }

  let old_target = current.target;
  loader::resolve_target(store, ctx, old_target).await?;

  let sp = ctx.savepoint();
  let result: Result<Argument> = async {
    let scorers = scoring::watchers(store, ctx, current.doc_ref()).await?;
    let mut child_scorers: Vec<(Uuid, Uuid)> = Vec::new();
    for child in arguments_of(store, ctx, current.doc_ref(), None).await? {
      for watcher in scoring::watchers(store, ctx, child.doc_ref()).await? {
        child_scorers.push((watcher, child.meta.id));
      }
    }

    let moved = versioning::version_argument(store, ctx, id, |argument| {
      argument.target = new_target;
      argument.pro = pro;
      Ok(())
    })
    .await?;

    let (old, new) = (Some(old_target), Some(new_target));
    for recipient in scorers {
      changelog::notify(store, ctx, recipient, NotificationKind::Moved, id, old, new).await?;
    }
    for (recipient, child) in child_scorers {
      changelog::notify(store, ctx, recipient, NotificationKind::ParentMoved, child, old, new).await?;
    }

    let scores = DocQuery::new(Collection::Scores).to_ref(moved.doc_ref());
    edge::end_edges::<S, UserScore>(store, ctx, &scores).await?;

    ctx.mark_stale(old_target);
    ctx.mark_stale(new_target);
    ctx.mark_stale(Target::Argument(id));
    changelog::record_change(store, ctx, ChangeKind::MovedArgument, id, old, new).await?;

    tracing::debug!(%id, ?old_target, ?new_target, "moved argument");
    Ok(moved)
  }
  .await;
  docs::settle(store, ctx, sp, result).await
}

// ─── Premises ────────────────────────────────────────────────────────────────

/// Attach `premise` to `claim`, creating the premise first if it has no key
/// and turning `claim` into a multi-premise claim if it is not one yet.
///
/// `claim` is updated in place to the version the premise was attached to;
/// its in-memory premise list is extended. Returns the premise.
pub async fn add_premise<S>(store: &S, ctx: &mut RequestContext, claim: &mut Claim, premise: Claim) -> Result<Claim>
where
  S: DocumentStore,
{
  ctx.require_user()?;

  let current: Claim = loader::current(store, ctx, claim.meta.id).await?;
  let known = std::mem::take(&mut claim.premises);
  *claim = current;
  claim.premises = known;

  let existing = if premise.meta.key.is_nil() {
    validate::validate_for_create(&premise)?;
    None
  } else {
    let existing: Claim = loader::current(store, ctx, premise.meta.id).await?;
    if existing.meta.id == claim.meta.id {
      return Err(Error::business("a claim cannot be its own premise"));
    }
    let attached = DocQuery::new(Collection::Premises)
      .from_ref(claim.doc_ref())
      .to_ref(existing.doc_ref());
    if docs::count(store, ctx, &attached).await? > 0 {
      return Err(Error::business("claim is already a premise"));
    }
    Some(existing)
  };

  let sp = ctx.savepoint();
  let result: Result<Claim> = async {
    let premise = match existing {
      Some(p) => p,
      None => {
        let mut fresh = premise;
        fresh.meta = VersionMeta::default();
        fresh.premises.clear();
        fresh.meta.prepare_for_create(ctx);
        docs::create(store, ctx, &fresh).await?;
        fresh
      }
    };

    if !claim.multi_premise {
      let known = std::mem::take(&mut claim.premises);
      *claim = versioning::version_claim(store, ctx, claim.meta.id, |c| {
        c.multi_premise = true;
        c.premise_rule = PremiseRule::All;
        Ok(())
      })
      .await?;
      claim.premises = known;
    }

    let order = if claim.premises.is_empty() {
      number_of_premises(store, ctx, claim).await? + 1
    } else {
      claim.premises.len() as u64 + 1
    };
    let order = u32::try_from(order).map_err(|_| Error::business("too many premises"))?;
    edge::create_edge(store, ctx, PremiseEdge::new(claim.doc_ref(), premise.doc_ref(), order)).await?;

    let id = claim.meta.id;
    let premise_target = Some(Target::Claim(premise.meta.id));
    changelog::record_change(store, ctx, ChangeKind::AddedPremise, id, None, premise_target).await?;
    ctx.mark_stale(Target::Claim(id));

    tracing::debug!(%id, premise = %premise.meta.id, order, "added premise");
    claim.premises.push(premise.clone());
    Ok(premise)
  }
  .await;
  docs::settle(store, ctx, sp, result).await
}

/// Detach a premise. Orders of the remaining premises are left as they are.
pub async fn remove_premise<S>(store: &S, ctx: &mut RequestContext, claim_id: Uuid, premise_id: Uuid) -> Result<()>
where
  S: DocumentStore,
{
  ctx.require_user()?;
  let claim: Claim = loader::current(store, ctx, claim_id).await?;
  let premise: Claim = loader::current(store, ctx, premise_id).await?;

  let sp = ctx.savepoint();
  let result: Result<()> = async {
    let query = DocQuery::new(Collection::Premises)
      .from_ref(claim.doc_ref())
      .to_ref(premise.doc_ref());
    let ended = edge::end_edges::<S, PremiseEdge>(store, ctx, &query).await?;
    if ended.is_empty() {
      return Err(Error::not_found(format!("claim {premise_id} is not a premise of {claim_id}")));
    }
    let old = Some(Target::Claim(premise_id));
    changelog::record_change(store, ctx, ChangeKind::RemovedPremise, claim_id, old, None).await?;
    ctx.mark_stale(Target::Claim(claim_id));
    Ok(())
  }
  .await;
  docs::settle(store, ctx, sp, result).await
}

/// Turn a single-premise claim into a multi-premise claim whose only premise
/// is a new claim carrying the original wording. Returns the new version and
/// the new premise.
pub async fn convert_to_multi_premise<S>(store: &S, ctx: &mut RequestContext, id: Uuid) -> Result<(Claim, Claim)>
where
  S: DocumentStore,
{
  ctx.require_user()?;
  let current: Claim = loader::current(store, ctx, id).await?;
  if current.multi_premise {
    return Err(Error::business("claim is already multi-premise"));
  }

  let sp = ctx.savepoint();
  let result: Result<(Claim, Claim)> = async {
    let mut claim = versioning::version_claim(store, ctx, id, |c| {
      c.multi_premise = true;
      c.premise_rule = PremiseRule::All;
      Ok(())
    })
    .await?;

    let mut premise = current.copy_text();
    premise.meta.prepare_for_create(ctx);
    docs::create(store, ctx, &premise).await?;
    edge::create_edge(store, ctx, PremiseEdge::new(claim.doc_ref(), premise.doc_ref(), 1)).await?;

    let premise_target = Some(Target::Claim(premise.meta.id));
    changelog::record_change(store, ctx, ChangeKind::ConvertedMultiPremise, id, None, premise_target)
      .await?;
    ctx.mark_stale(Target::Claim(id));

    claim.premises = vec![premise.clone()];
    Ok((claim, premise))
  }
  .await;
  docs::settle(store, ctx, sp, result).await
}

//! End-to-end graph operations from `gruff-core` running on `SqliteStore`.

use std::{
  cell::Cell,
  collections::HashMap,
  sync::{Arc, Mutex},
  time::Duration as StdDuration,
};

use chrono::{DateTime, Duration, TimeZone, Utc};
use gruff_core::{
  ErrorKind, Subcode,
  argument::{Argument, ArgumentUpdate, Target},
  changelog::{self, ChangeKind, NotificationKind},
  claim::{self, Claim, ClaimUpdate, PremiseRule},
  context::{self, Context},
  docs::{self, Document},
  edge::{PremiseEdge, UserScore},
  identity::{Collection, RecordMeta},
  link::{self, LinkUpdate, NewLink},
  loader::{self, Locator},
  request::RequestContext,
  scoring::{self, Recomputer, ScoreOutcome},
  store::{DocQuery, DocumentStore, Field, Precondition},
  structure,
  user::{self, User},
};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::SqliteStore;

/// A store plus a clock that advances one minute per request, so every
/// request has a distinct, known timestamp.
struct World {
  store: SqliteStore,
  clock: Cell<DateTime<Utc>>,
}

impl World {
  async fn new() -> Self {
    Self {
      store: SqliteStore::open_in_memory()
        .await
        .expect("in-memory store"),
      clock: Cell::new(Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()),
    }
  }

  fn ctx(&self, user: Uuid) -> RequestContext {
    let now = self.clock.get() + Duration::minutes(1);
    self.clock.set(now);
    RequestContext::at(Some(user), now)
  }

  fn anonymous(&self) -> RequestContext { RequestContext::new(None) }

  async fn user(&self, username: &str) -> Uuid {
    self.register(username, false).await
  }

  async fn register(&self, username: &str, curator: bool) -> Uuid {
    let record = User {
      meta: RecordMeta::default(),
      username: username.into(),
      name: username.to_uppercase(),
      email: format!("{username}@example.org"),
      curator,
      password_hash: "$argon2id$placeholder".into(),
    };
    let mut ctx = RequestContext::new(None);
    user::create_user(&self.store, &mut ctx, record)
      .await
      .unwrap()
      .meta
      .key
  }

  async fn claim(&self, user: Uuid, title: &str) -> Claim {
    claim::create_claim(&self.store, &mut self.ctx(user), Claim::new(title, "A description"))
      .await
      .unwrap()
  }

  async fn argument(&self, user: Uuid, base: &Claim, target: Target, pro: bool) -> Argument {
    let argument = Argument::new(base.meta.id, target, pro, "Because of this", "Some reasoning");
    structure::add_argument(&self.store, &mut self.ctx(user), argument)
      .await
      .unwrap()
  }

  async fn score(&self, user: Uuid, target: Target, score: f64) -> ScoreOutcome {
    scoring::set_score(&self.store, &mut self.ctx(user), target, score)
      .await
      .unwrap()
      .0
  }

  async fn current_claim(&self, id: Uuid) -> Claim {
    loader::current(&self.store, &self.anonymous(), id).await.unwrap()
  }

  async fn current_argument(&self, id: Uuid) -> Argument {
    loader::current(&self.store, &self.anonymous(), id).await.unwrap()
  }

  async fn count(&self, query: DocQuery) -> u64 {
    docs::count(&self.store, &self.anonymous(), &query).await.unwrap()
  }
}

fn assert_close(actual: f64, expected: f64) {
  assert!((actual - expected).abs() < 1e-9, "expected {expected}, got {actual}");
}

// ─── Versioning ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn create_and_version_a_claim() {
  let w = World::new().await;
  let ann = w.user("ann").await;

  let v0 = claim::create_claim(
    &w.store,
    &mut w.ctx(ann),
    Claim::new("The sky is blue", "On clear days"),
  )
  .await
  .unwrap();
  assert_eq!(v0.meta.id, v0.meta.key);

  let update = ClaimUpdate { title: Some("The sky appears blue".into()), ..Default::default() };
  let v1 = claim::update_claim(&w.store, &mut w.ctx(ann), v0.meta.id, update)
    .await
    .unwrap();
  assert_eq!(v1.meta.id, v0.meta.id);
  assert_ne!(v1.meta.key, v0.meta.key);
  assert_eq!(v1.description, "On clear days");

  let versions: Vec<Claim> = loader::history(&w.store, &w.anonymous(), v0.meta.id).await.unwrap();
  assert_eq!(versions.len(), 2);
  assert_eq!(versions[0].meta.end, Some(v1.meta.start));
  assert!(versions[1].meta.end.is_none());

  let ctx = w.anonymous();
  let old: Claim = loader::load(&w.store, &ctx, Locator::id(v0.meta.id).at(Some(v0.meta.start)))
    .await
    .unwrap();
  assert_eq!(old.title, "The sky is blue");
  let new: Claim = loader::load(&w.store, &ctx, Locator::id(v0.meta.id)).await.unwrap();
  assert_eq!(new.title, "The sky appears blue");
  let by_key: Claim = loader::load(&w.store, &ctx, Locator::key(v0.meta.key)).await.unwrap();
  assert_eq!(by_key.title, "The sky is blue");
}

#[tokio::test]
async fn identical_update_keeps_version() {
  let w = World::new().await;
  let ann = w.user("ann").await;
  let v0 = w.claim(ann, "Unchanged").await;

  let update = ClaimUpdate { title: Some("Unchanged".into()), ..Default::default() };
  let same = claim::update_claim(&w.store, &mut w.ctx(ann), v0.meta.id, update)
    .await
    .unwrap();
  assert_eq!(same.meta.key, v0.meta.key);
}

#[tokio::test]
async fn point_in_time_load() {
  let w = World::new().await;
  let ann = w.user("ann").await;
  let v0 = w.claim(ann, "First wording").await;
  let id = v0.meta.id;

  let update = ClaimUpdate { title: Some("Second wording".into()), ..Default::default() };
  let v1 = claim::update_claim(&w.store, &mut w.ctx(ann), id, update).await.unwrap();
  claim::delete_claim(&w.store, &mut w.ctx(ann), id).await.unwrap();

  let ctx = w.anonymous();
  let second = Duration::seconds(1);
  let at_t0: Claim = loader::load(&w.store, &ctx, Locator::id(id).at(Some(v0.meta.start + second)))
    .await
    .unwrap();
  assert_eq!(at_t0.meta.key, v0.meta.key);
  let at_t1: Claim = loader::load(&w.store, &ctx, Locator::id(id).at(Some(v1.meta.start + second)))
    .await
    .unwrap();
  assert_eq!(at_t1.meta.key, v1.meta.key);

  let err = loader::load::<_, Claim>(&w.store, &ctx, Locator::id(id)).await.unwrap_err();
  assert_eq!(err.kind, ErrorKind::NotFound);
}

#[tokio::test]
async fn at_most_one_current_version_per_id() {
  let w = World::new().await;
  let ann = w.user("ann").await;
  let a = w.claim(ann, "Claim A").await;
  let b = w.claim(ann, "Claim B").await;
  for title in ["Claim A2", "Claim A3"] {
    let update = ClaimUpdate { title: Some(title.into()), ..Default::default() };
    claim::update_claim(&w.store, &mut w.ctx(ann), a.meta.id, update).await.unwrap();
  }
  structure::convert_to_multi_premise(&w.store, &mut w.ctx(ann), b.meta.id)
    .await
    .unwrap();

  let current: Vec<Claim> =
    docs::query(&w.store, &w.anonymous(), &DocQuery::new(Collection::Claims)).await.unwrap();
  let mut per_id: HashMap<Uuid, usize> = HashMap::new();
  for c in &current {
    *per_id.entry(c.meta.id).or_default() += 1;
  }
  assert!(per_id.values().all(|n| *n == 1));
  assert_eq!(w.current_claim(a.meta.id).await.title, "Claim A3");
}

// ─── Premises ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn convert_to_multi_premise() {
  let w = World::new().await;
  let ann = w.user("ann").await;
  let c = claim::create_claim(&w.store, &mut w.ctx(ann), Claim::new("A and B", "compound"))
    .await
    .unwrap();

  let (converted, premise) = structure::convert_to_multi_premise(&w.store, &mut w.ctx(ann), c.meta.id)
    .await
    .unwrap();
  assert!(converted.multi_premise);
  assert_eq!(converted.premise_rule, PremiseRule::All);
  assert_eq!(converted.meta.id, c.meta.id);
  assert_ne!(converted.meta.key, c.meta.key);
  assert_eq!(premise.title, "A and B");
  assert_ne!(premise.meta.id, c.meta.id);

  let edges: Vec<PremiseEdge> = docs::query(
    &w.store,
    &w.anonymous(),
    &DocQuery::new(Collection::Premises).from_ref(converted.doc_ref()),
  )
  .await
  .unwrap();
  assert_eq!(edges.len(), 1);
  assert_eq!(edges[0].order, 1);
  assert_eq!(edges[0].edge.to, premise.doc_ref());

  let err = structure::convert_to_multi_premise(&w.store, &mut w.ctx(ann), c.meta.id)
    .await
    .unwrap_err();
  assert_eq!(err.kind, ErrorKind::Business);

  let changes = changelog::changes_for(&w.store, &w.anonymous(), c.meta.id).await.unwrap();
  assert_eq!(changes.len(), 1);
  assert_eq!(changes[0].kind, ChangeKind::ConvertedMultiPremise);
}

#[tokio::test]
async fn add_premise_ordering() {
  let w = World::new().await;
  let ann = w.user("ann").await;
  let mut x = w.claim(ann, "Claim X").await;
  let original_key = x.meta.key;

  for title in ["Premise 1", "Premise 2", "Premise 3"] {
    structure::add_premise(&w.store, &mut w.ctx(ann), &mut x, Claim::new(title, "A premise"))
      .await
      .unwrap();
  }
  assert!(x.multi_premise);
  assert_ne!(x.meta.key, original_key);
  assert_eq!(x.premises.len(), 3);

  let reloaded = w.current_claim(x.meta.id).await;
  assert_eq!(reloaded.meta.key, x.meta.key);
  assert_eq!(reloaded.premise_rule, PremiseRule::All);

  let ctx = w.anonymous();
  let mut edges: Vec<PremiseEdge> = docs::query(
    &w.store,
    &ctx,
    &DocQuery::new(Collection::Premises).from_ref(reloaded.doc_ref()),
  )
  .await
  .unwrap();
  edges.sort_by_key(|e| e.order);
  assert_eq!(edges.iter().map(|e| e.order).collect::<Vec<_>>(), [1, 2, 3]);
  assert_eq!(structure::number_of_premises(&w.store, &ctx, &reloaded).await.unwrap(), 3);

  let titles: Vec<String> = structure::premises(&w.store, &ctx, &reloaded, None)
    .await
    .unwrap()
    .into_iter()
    .map(|p| p.title)
    .collect();
  assert_eq!(titles, ["Premise 1", "Premise 2", "Premise 3"]);
}

#[tokio::test]
async fn add_existing_premise_checks_duplicates_and_self() {
  let w = World::new().await;
  let ann = w.user("ann").await;
  let mut x = w.claim(ann, "Claim X").await;
  let p = w.claim(ann, "Existing premise").await;

  structure::add_premise(&w.store, &mut w.ctx(ann), &mut x, p.clone())
    .await
    .unwrap();

  let err = structure::add_premise(&w.store, &mut w.ctx(ann), &mut x, p.clone())
    .await
    .unwrap_err();
  assert_eq!(err.message, "claim is already a premise");

  let itself = w.current_claim(x.meta.id).await;
  let err = structure::add_premise(&w.store, &mut w.ctx(ann), &mut x, itself)
    .await
    .unwrap_err();
  assert_eq!(err.kind, ErrorKind::Business);
}

#[tokio::test]
async fn remove_premise_keeps_remaining_orders() {
  let w = World::new().await;
  let ann = w.user("ann").await;
  let mut x = w.claim(ann, "Claim X").await;
  let mut added = Vec::new();
  for title in ["Premise 1", "Premise 2", "Premise 3"] {
    let p = structure::add_premise(&w.store, &mut w.ctx(ann), &mut x, Claim::new(title, "A premise"))
      .await
      .unwrap();
    added.push(p);
  }

  structure::remove_premise(&w.store, &mut w.ctx(ann), x.meta.id, added[0].meta.id)
    .await
    .unwrap();
  let err = structure::remove_premise(&w.store, &mut w.ctx(ann), x.meta.id, added[0].meta.id)
    .await
    .unwrap_err();
  assert!(err.is_not_found());

  let ctx = w.anonymous();
  let remaining = structure::premises(&w.store, &ctx, &x, None).await.unwrap();
  assert_eq!(remaining.len(), 2);
  let orders: Vec<u32> = docs::query::<_, PremiseEdge>(
    &w.store,
    &ctx,
    &DocQuery::new(Collection::Premises)
      .from_ref(x.doc_ref())
      .sort_by(Field::Attr("order"), false),
  )
  .await
  .unwrap()
  .iter()
  .map(|e| e.order)
  .collect();
  assert_eq!(orders, [2, 3]);

  let kinds: Vec<ChangeKind> = changelog::changes_for(&w.store, &ctx, x.meta.id)
    .await
    .unwrap()
    .iter()
    .map(|c| c.kind)
    .collect();
  assert_eq!(kinds.last(), Some(&ChangeKind::RemovedPremise));
}

// ─── Arguments ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn add_argument_wires_edges_and_notifies_watchers() {
  let w = World::new().await;
  let ann = w.user("ann").await;
  let bob = w.user("bob").await;
  let c = w.claim(ann, "Claim C").await;
  let base = w.claim(ann, "Base claim").await;
  w.score(bob, Target::Claim(c.meta.id), 0.4).await;
  w.score(ann, Target::Claim(c.meta.id), 0.6).await;

  let a = w.argument(ann, &base, Target::Claim(c.meta.id), true).await;

  let ctx = w.anonymous();
  let view = structure::claim_view(&w.store, &ctx, Locator::id(c.meta.id)).await.unwrap();
  assert_eq!(view.arguments.len(), 1);
  assert_eq!(view.arguments[0].meta.key, a.meta.key);
  assert_eq!(w.count(DocQuery::new(Collection::BaseClaims).from_ref(a.doc_ref())).await, 1);

  let bobs = changelog::notifications_for(&w.store, &ctx, bob).await.unwrap();
  assert_eq!(bobs.len(), 1);
  assert_eq!(bobs[0].kind, NotificationKind::NewArgument);
  assert_eq!(bobs[0].item, a.meta.id);
  assert!(changelog::notifications_for(&w.store, &ctx, ann).await.unwrap().is_empty());

  let changes = changelog::changes_for(&w.store, &ctx, a.meta.id).await.unwrap();
  assert_eq!(changes[0].kind, ChangeKind::CreatedArgument);
  assert_eq!(changes[0].new_target, Some(Target::Claim(c.meta.id)));
}

#[tokio::test]
async fn argument_requires_existing_base_and_target() {
  let w = World::new().await;
  let ann = w.user("ann").await;
  let c = w.claim(ann, "Claim C").await;

  let missing_base = Argument::new(Uuid::new_v4(), Target::Claim(c.meta.id), true, "Title", "Text");
  let err = structure::add_argument(&w.store, &mut w.ctx(ann), missing_base).await.unwrap_err();
  assert!(err.is_not_found());

  let missing_target = Argument::new(c.meta.id, Target::Argument(Uuid::new_v4()), true, "Title", "Text");
  let err = structure::add_argument(&w.store, &mut w.ctx(ann), missing_target).await.unwrap_err();
  assert!(err.is_not_found());
  assert_eq!(w.count(DocQuery::new(Collection::Arguments)).await, 0);
}

#[tokio::test]
async fn versioning_a_claim_carries_its_edges() {
  let w = World::new().await;
  let ann = w.user("ann").await;
  let c = w.claim(ann, "Claim C").await;
  let base = w.claim(ann, "Base claim").await;
  let a = w.argument(ann, &base, Target::Claim(c.meta.id), true).await;
  w.score(ann, Target::Claim(c.meta.id), 0.9).await;

  let update = ClaimUpdate { description: Some("New description".into()), ..Default::default() };
  let v1 = claim::update_claim(&w.store, &mut w.ctx(ann), c.meta.id, update).await.unwrap();

  let ctx = w.anonymous();
  let arguments = structure::arguments_of(&w.store, &ctx, v1.doc_ref(), None).await.unwrap();
  assert_eq!(arguments.len(), 1);
  assert!(structure::arguments_of(&w.store, &ctx, c.doc_ref(), None).await.unwrap().is_empty());

  let score = scoring::score_of(&w.store, &ctx, ann, Target::Claim(c.meta.id)).await.unwrap();
  assert_eq!(score.map(|s| s.edge.to), Some(v1.doc_ref()));

  // The old wiring is still visible in the past.
  let while_old = Some(a.meta.start + Duration::seconds(1));
  let before = structure::arguments_of(&w.store, &ctx, c.doc_ref(), while_old).await.unwrap();
  assert_eq!(before.len(), 1);
}

#[tokio::test]
async fn update_argument_versions_it() {
  let w = World::new().await;
  let ann = w.user("ann").await;
  let c = w.claim(ann, "Claim C").await;
  let base = w.claim(ann, "Base claim").await;
  let a = w.argument(ann, &base, Target::Claim(c.meta.id), true).await;

  let update = ArgumentUpdate { pro: Some(false), ..Default::default() };
  let v1 = structure::update_argument(&w.store, &mut w.ctx(ann), a.meta.id, update)
    .await
    .unwrap();
  assert!(!v1.pro);
  assert_eq!(v1.target, a.target);

  let view = structure::claim_view(&w.store, &w.anonymous(), Locator::id(c.meta.id)).await.unwrap();
  assert_eq!(view.arguments.len(), 1);
  assert_eq!(view.arguments[0].meta.key, v1.meta.key);
}

#[tokio::test]
async fn move_argument_invalidates_scores() {
  let w = World::new().await;
  let ann = w.user("ann").await;
  let c1 = w.claim(ann, "Claim C1").await;
  let c2 = w.claim(ann, "Claim C2").await;
  let base = w.claim(ann, "Base claim").await;
  let a = w.argument(ann, &base, Target::Claim(c1.meta.id), true).await;

  let scorers = [w.user("u1").await, w.user("u2").await, w.user("u3").await];
  for u in scorers {
    w.score(u, Target::Argument(a.meta.id), 0.7).await;
  }

  let moved = structure::move_argument(&w.store, &mut w.ctx(ann), a.meta.id, Target::Claim(c2.meta.id), false)
    .await
    .unwrap();
  assert_eq!(moved.target, Target::Claim(c2.meta.id));
  assert!(!moved.pro);
  assert_eq!(moved.meta.id, a.meta.id);

  assert_eq!(w.count(DocQuery::new(Collection::Scores)).await, 0);
  let old_scores: Vec<UserScore> = docs::query(
    &w.store,
    &w.anonymous(),
    &DocQuery::new(Collection::Scores).to_ref(a.doc_ref()).history(),
  )
  .await
  .unwrap();
  assert_eq!(old_scores.len(), 3);
  assert!(old_scores.iter().all(|s| s.edge.end.is_some()));

  let moved_notices = DocQuery::new(Collection::Notifications).eq(Field::Attr("kind"), "MOVED");
  assert_eq!(w.count(moved_notices).await, 3);

  let ctx = w.anonymous();
  let c1_args = structure::arguments_of(&w.store, &ctx, w.current_claim(c1.meta.id).await.doc_ref(), None)
    .await
    .unwrap();
  assert!(c1_args.is_empty());
  let c2_args = structure::arguments_of(&w.store, &ctx, w.current_claim(c2.meta.id).await.doc_ref(), None)
    .await
    .unwrap();
  assert_eq!(c2_args.len(), 1);

  let changes = changelog::changes_for(&w.store, &ctx, a.meta.id).await.unwrap();
  let last = changes.last().unwrap();
  assert_eq!(last.kind, ChangeKind::MovedArgument);
  assert_eq!(last.old_target, Some(Target::Claim(c1.meta.id)));
  assert_eq!(last.new_target, Some(Target::Claim(c2.meta.id)));
}

#[tokio::test]
async fn move_tells_child_scorers_their_parent_moved() {
  let w = World::new().await;
  let ann = w.user("ann").await;
  let bob = w.user("bob").await;
  let c1 = w.claim(ann, "Claim C1").await;
  let c2 = w.claim(ann, "Claim C2").await;
  let base = w.claim(ann, "Base claim").await;
  let a = w.argument(ann, &base, Target::Claim(c1.meta.id), true).await;
  let child = w.argument(ann, &base, Target::Argument(a.meta.id), false).await;
  w.score(bob, Target::Argument(child.meta.id), 0.5).await;

  structure::move_argument(&w.store, &mut w.ctx(ann), a.meta.id, Target::Claim(c2.meta.id), true)
    .await
    .unwrap();

  let notes = changelog::notifications_for(&w.store, &w.anonymous(), bob).await.unwrap();
  assert_eq!(notes.len(), 1);
  assert_eq!(notes[0].kind, NotificationKind::ParentMoved);
  assert_eq!(notes[0].item, child.meta.id);

  // The child follows its parent's new version.
  let moved = w.current_argument(a.meta.id).await;
  let children = structure::arguments_of(&w.store, &w.anonymous(), moved.doc_ref(), None)
    .await
    .unwrap();
  assert_eq!(children.len(), 1);
  assert_eq!(children[0].meta.id, child.meta.id);
}

#[tokio::test]
async fn move_refuses_cycles() {
  let w = World::new().await;
  let ann = w.user("ann").await;
  let c = w.claim(ann, "Claim C").await;
  let base = w.claim(ann, "Base claim").await;
  let a = w.argument(ann, &base, Target::Claim(c.meta.id), true).await;
  let child = w.argument(ann, &base, Target::Argument(a.meta.id), true).await;

  let onto_self = structure::move_argument(&w.store, &mut w.ctx(ann), a.meta.id, Target::Argument(a.meta.id), true)
    .await
    .unwrap_err();
  assert_eq!(onto_self.kind, ErrorKind::Business);

  let onto_child =
    structure::move_argument(&w.store, &mut w.ctx(ann), a.meta.id, Target::Argument(child.meta.id), true)
      .await
      .unwrap_err();
  assert_eq!(onto_child.kind, ErrorKind::Business);
}

#[tokio::test]
async fn failed_move_rolls_back() {
  let w = World::new().await;
  let ann = w.user("ann").await;
  let bob = w.user("bob").await;
  let c = w.claim(ann, "Claim C").await;
  let base = w.claim(ann, "Base claim").await;
  let a = w.argument(ann, &base, Target::Claim(c.meta.id), true).await;
  w.score(bob, Target::Argument(a.meta.id), 0.8).await;

  let err = structure::move_argument(&w.store, &mut w.ctx(ann), a.meta.id, Target::Claim(Uuid::new_v4()), false)
    .await
    .unwrap_err();
  assert!(err.is_not_found());

  let current = w.current_argument(a.meta.id).await;
  assert_eq!(current.meta.key, a.meta.key);
  assert!(current.meta.end.is_none());
  assert_eq!(current.target, Target::Claim(c.meta.id));

  assert_eq!(w.count(DocQuery::new(Collection::Scores).to_ref(a.doc_ref())).await, 1);
  assert_eq!(w.count(DocQuery::new(Collection::Inferences).to_ref(a.doc_ref())).await, 1);
  assert_eq!(w.count(DocQuery::new(Collection::Notifications)).await, 0);
}

#[tokio::test]
async fn only_owner_or_curator_may_delete() {
  let w = World::new().await;
  let ann = w.user("ann").await;
  let bob = w.user("bob").await;
  let cat = w.register("cat", true).await;
  let c = w.claim(ann, "Claim C").await;

  let err = claim::delete_claim(&w.store, &mut w.ctx(bob), c.meta.id).await.unwrap_err();
  assert_eq!(err.kind, ErrorKind::Permission);
  assert_eq!(err.code(), 403);

  claim::delete_claim(&w.store, &mut w.ctx(cat), c.meta.id).await.unwrap();
}

#[tokio::test]
async fn anonymous_writes_are_unauthorized() {
  let w = World::new().await;
  let err = claim::create_claim(&w.store, &mut w.anonymous(), Claim::new("Title", "Text"))
    .await
    .unwrap_err();
  assert_eq!(err.kind, ErrorKind::Unauthorized);
}

#[tokio::test]
async fn deleting_a_claim_cascades_to_its_arguments() {
  let w = World::new().await;
  let ann = w.user("ann").await;
  let c = w.claim(ann, "Claim C").await;
  let base = w.claim(ann, "Base claim").await;
  let a = w.argument(ann, &base, Target::Claim(c.meta.id), true).await;
  let child = w.argument(ann, &base, Target::Argument(a.meta.id), false).await;

  let err = claim::delete_claim(&w.store, &mut w.ctx(ann), base.meta.id).await.unwrap_err();
  assert_eq!(err.kind, ErrorKind::Business);
  assert_eq!(err.message, "claim is the base of 2 arguments");

  claim::delete_claim(&w.store, &mut w.ctx(ann), c.meta.id).await.unwrap();
  let ctx = w.anonymous();
  for id in [a.meta.id, child.meta.id] {
    let err = loader::current::<_, Argument>(&w.store, &ctx, id).await.unwrap_err();
    assert!(err.is_not_found());
  }
  assert_eq!(w.count(DocQuery::new(Collection::Inferences)).await, 0);
  assert_eq!(w.count(DocQuery::new(Collection::BaseClaims)).await, 0);

  claim::delete_claim(&w.store, &mut w.ctx(ann), base.meta.id).await.unwrap();
}

// ─── Scores ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn second_score_replaces_first() {
  let w = World::new().await;
  let ann = w.user("ann").await;
  let c = w.claim(ann, "Claim C").await;
  let target = Target::Claim(c.meta.id);

  assert_eq!(w.score(ann, target, 0.3).await, ScoreOutcome::Created);
  assert_eq!(w.score(ann, target, 0.9).await, ScoreOutcome::Updated);

  let score = scoring::score_of(&w.store, &w.anonymous(), ann, target).await.unwrap().unwrap();
  assert_close(score.score, 0.9);
  assert_eq!(w.count(DocQuery::new(Collection::Scores)).await, 1);

  let err = scoring::set_score(&w.store, &mut w.ctx(ann), target, 1.5).await.unwrap_err();
  assert_eq!(err.kind, ErrorKind::Business);
}

#[tokio::test]
async fn aggregate_cache() {
  let w = World::new().await;
  let ann = w.user("ann").await;
  let c = w.claim(ann, "Claim C").await;
  let target = Target::Claim(c.meta.id);

  let mut arguments = Vec::new();
  for (pro, strength) in [(true, 0.8), (true, 0.6), (false, 0.5)] {
    let base = w.claim(ann, "Base claim").await;
    w.score(ann, Target::Claim(base.meta.id), 1.0).await;
    let a = w.argument(ann, &base, target, pro).await;
    w.score(ann, Target::Argument(a.meta.id), strength).await;
    arguments.push(a);
  }

  let mut stale = vec![target];
  stale.extend(arguments.iter().map(|a| Target::Argument(a.meta.id)));
  let mut ctx = RequestContext::new(None);
  let patched = scoring::recompute(&w.store, &mut ctx, &stale).await.unwrap();
  assert_eq!(patched, 4);

  let c = w.current_claim(c.meta.id).await;
  assert_close(c.truth_ru, 0.71);
  assert_close(c.truth, 0.0);

  let first = w.current_argument(arguments[0].meta.id).await;
  assert_close(first.strength, 0.8);
  assert_close(first.strength_ru, 0.8);

  // Nothing changed, so nothing is written.
  let patched = scoring::recompute(&w.store, &mut ctx, &stale).await.unwrap();
  assert_eq!(patched, 0);
}

#[tokio::test]
async fn recomputer_patches_in_background() {
  let w = World::new().await;
  let ann = w.user("ann").await;
  let c = w.claim(ann, "Claim C").await;

  let mut ctx = w.ctx(ann);
  scoring::set_score(&w.store, &mut ctx, Target::Claim(c.meta.id), 0.25)
    .await
    .unwrap();

  let (recomputer, handle) = Recomputer::spawn(Arc::new(w.store.clone()));
  recomputer.schedule(ctx.take_stale());
  drop(recomputer);
  handle.await.unwrap();

  let c = w.current_claim(c.meta.id).await;
  assert_close(c.truth, 0.25);
  assert_close(c.truth_ru, 0.25);
}

// ─── Contexts & links ────────────────────────────────────────────────────────

#[tokio::test]
async fn add_and_remove_context() {
  let w = World::new().await;
  let ann = w.user("ann").await;
  let c = w.claim(ann, "Claim C").await;
  let sky = context::create_context(
    &w.store,
    &mut w.ctx(ann),
    Context::new("sky", "The sky", "https://example.org/sky"),
  )
  .await
  .unwrap();

  assert!(context::add_context(&w.store, &mut w.ctx(ann), c.meta.id, sky.meta.key).await.unwrap());
  assert!(!context::add_context(&w.store, &mut w.ctx(ann), c.meta.id, sky.meta.key).await.unwrap());

  // Versioning the claim keeps the association.
  let update = ClaimUpdate { title: Some("Claim C, reworded".into()), ..Default::default() };
  let v1 = claim::update_claim(&w.store, &mut w.ctx(ann), c.meta.id, update).await.unwrap();
  let ctx = w.anonymous();
  let contexts = context::contexts_of(&w.store, &ctx, &v1, None).await.unwrap();
  assert_eq!(contexts.len(), 1);
  assert_eq!(contexts[0].short_name, "sky");
  let claims = context::claims_in_context(&w.store, &ctx, sky.meta.key).await.unwrap();
  assert_eq!(claims.len(), 1);
  assert_eq!(claims[0].meta.key, v1.meta.key);

  context::remove_context(&w.store, &mut w.ctx(ann), c.meta.id, sky.meta.key)
    .await
    .unwrap();
  assert_eq!(w.count(DocQuery::new(Collection::ContextEdges)).await, 0);
  let err = context::remove_context(&w.store, &mut w.ctx(ann), c.meta.id, sky.meta.key)
    .await
    .unwrap_err();
  assert!(err.is_not_found());
}

#[tokio::test]
async fn links_version_and_retire() {
  let w = World::new().await;
  let ann = w.user("ann").await;
  let bob = w.user("bob").await;
  let c = w.claim(ann, "Claim C").await;

  let new = NewLink {
    title:       "Source".into(),
    description: None,
    url:         "https://example.org/source".into(),
  };
  let l0 = link::create_link(&w.store, &mut w.ctx(ann), c.meta.id, new).await.unwrap();

  let update = LinkUpdate { url: Some("https://example.org/better".into()), ..Default::default() };
  let l1 = link::update_link(&w.store, &mut w.ctx(ann), l0.meta.id, update).await.unwrap();
  assert_ne!(l1.meta.key, l0.meta.key);

  let ctx = w.anonymous();
  let links = link::links_for_claim(&w.store, &ctx, c.meta.id, None).await.unwrap();
  assert_eq!(links.len(), 1);
  assert_eq!(links[0].url, "https://example.org/better");

  let err = link::delete_link(&w.store, &mut w.ctx(bob), l0.meta.id).await.unwrap_err();
  assert_eq!(err.kind, ErrorKind::Permission);
  link::delete_link(&w.store, &mut w.ctx(ann), l0.meta.id).await.unwrap();
  assert!(link::links_for_claim(&w.store, &ctx, c.meta.id, None).await.unwrap().is_empty());
}

#[tokio::test]
async fn deleting_a_claim_retires_its_links() {
  let w = World::new().await;
  let ann = w.user("ann").await;
  let c = w.claim(ann, "Claim C").await;
  let new = NewLink {
    title:       "Source".into(),
    description: None,
    url:         "https://example.org/source".into(),
  };
  let l0 = link::create_link(&w.store, &mut w.ctx(ann), c.meta.id, new).await.unwrap();
  let before = w.clock.get();

  claim::delete_claim(&w.store, &mut w.ctx(ann), c.meta.id).await.unwrap();

  let ctx = w.anonymous();
  assert!(link::links_for_claim(&w.store, &ctx, c.meta.id, None).await.unwrap().is_empty());
  let then = link::links_for_claim(&w.store, &ctx, c.meta.id, Some(before)).await.unwrap();
  assert_eq!(then.len(), 1);
  assert_eq!(then[0].meta.key, l0.meta.key);
}

// ─── Users & notifications ───────────────────────────────────────────────────

#[tokio::test]
async fn usernames_are_unique() {
  let w = World::new().await;
  w.user("ann").await;

  let twin = User {
    meta:          RecordMeta::default(),
    username:      "ann".into(),
    name:          "Another Ann".into(),
    email:         "other@example.org".into(),
    curator:       false,
    password_hash: "$argon2id$placeholder".into(),
  };
  let err = user::create_user(&w.store, &mut w.anonymous(), twin).await.unwrap_err();
  assert_eq!(err.subcode, Some(gruff_core::Subcode::UsernameInUse));
  assert_eq!(w.count(DocQuery::new(Collection::Users)).await, 1);

  let found = user::find_by_username(&w.store, &w.anonymous(), "ann").await.unwrap().unwrap();
  assert_eq!(found.name, "ANN");
  let loaded = user::load_user(&w.store, &w.anonymous(), found.meta.key).await.unwrap();
  assert_eq!(loaded, found);
  let err = user::load_user(&w.store, &w.anonymous(), Uuid::new_v4()).await.unwrap_err();
  assert!(err.is_not_found());
}

#[tokio::test]
async fn notifications_are_marked_read_by_their_owner() {
  let w = World::new().await;
  let ann = w.user("ann").await;
  let bob = w.user("bob").await;
  let c = w.claim(ann, "Claim C").await;
  let base = w.claim(ann, "Base claim").await;
  w.score(bob, Target::Claim(c.meta.id), 0.5).await;
  w.argument(ann, &base, Target::Claim(c.meta.id), false).await;

  let notes = changelog::notifications_for(&w.store, &w.anonymous(), bob).await.unwrap();
  let key = notes[0].meta.key;

  let err = changelog::mark_read(&w.store, &mut w.ctx(ann), key).await.unwrap_err();
  assert_eq!(err.kind, ErrorKind::Permission);

  changelog::mark_read(&w.store, &mut w.ctx(bob), key).await.unwrap();
  changelog::mark_read(&w.store, &mut w.ctx(bob), key).await.unwrap();
  assert!(changelog::notifications_for(&w.store, &w.anonymous(), bob).await.unwrap().is_empty());
}


// ─── Races & deadlines ───────────────────────────────────────────────────────

/// Delegates to a [`SqliteStore`], with hooks that fire in the middle of a
/// write.
struct Hooked {
  inner:     SqliteStore,
  /// Claim update run by a second request just before the first conditional
  /// patch of a claim.
  rival:     Mutex<Option<(Uuid, RequestContext, ClaimUpdate)>>,
  /// Time taken to acknowledge a claim insert that has already committed.
  ack_delay: Option<StdDuration>,
}

impl Hooked {
  fn new(inner: &SqliteStore) -> Self {
    Self { inner: inner.clone(), rival: Mutex::new(None), ack_delay: None }
  }
}

impl DocumentStore for Hooked {
  type Error = crate::Error;

  async fn read(&self, collection: Collection, key: Uuid) -> crate::Result<Option<Value>> {
    self.inner.read(collection, key).await
  }

  async fn create(&self, collection: Collection, doc: Value) -> crate::Result<()> {
    self.inner.create(collection, doc).await?;
    if let (Collection::Claims, Some(delay)) = (collection, self.ack_delay) {
      tokio::time::sleep(delay).await;
    }
    Ok(())
  }

  async fn patch(
    &self,
    collection: Collection,
    key: Uuid,
    patch: Map<String, Value>,
    precondition: Precondition,
  ) -> crate::Result<Value> {
    if collection == Collection::Claims && precondition == Precondition::Current {
      let rival = self.rival.lock().unwrap().take();
      if let Some((id, mut ctx, update)) = rival {
        claim::update_claim(&self.inner, &mut ctx, id, update).await.unwrap();
      }
    }
    self.inner.patch(collection, key, patch, precondition).await
  }

  async fn replace(&self, collection: Collection, key: Uuid, doc: Value) -> crate::Result<()> {
    self.inner.replace(collection, key, doc).await
  }

  async fn query(&self, query: &DocQuery) -> crate::Result<Vec<Value>> {
    self.inner.query(query).await
  }

  async fn count(&self, query: &DocQuery) -> crate::Result<u64> {
    self.inner.count(query).await
  }
}

#[tokio::test]
async fn racing_updates_leave_one_winner() {
  let w = World::new().await;
  let ann = w.user("ann").await;
  let bob = w.user("bob").await;
  let c = w.claim(ann, "Claim C").await;
  let base = w.claim(ann, "Base claim").await;
  let a = w.argument(ann, &base, Target::Claim(c.meta.id), true).await;

  let store = Hooked::new(&w.store);
  let rival = ClaimUpdate { title: Some("Claim C by bob".into()), ..Default::default() };
  *store.rival.lock().unwrap() = Some((c.meta.id, w.ctx(bob), rival));

  let update = ClaimUpdate { title: Some("Claim C by ann".into()), ..Default::default() };
  let err = claim::update_claim(&store, &mut w.ctx(ann), c.meta.id, update)
    .await
    .unwrap_err();
  assert_eq!(err.kind, ErrorKind::Business);
  assert_eq!(err.subcode, Some(Subcode::StaleVersion));

  let current = w.current_claim(c.meta.id).await;
  assert_eq!(current.title, "Claim C by bob");
  let history: Vec<Claim> =
    loader::history(&w.store, &w.anonymous(), c.meta.id).await.unwrap();
  assert_eq!(history.len(), 2);
  assert_eq!(history.iter().filter(|v| v.meta.end.is_none()).count(), 1);

  let inferences = DocQuery::new(Collection::Inferences).to_ref(a.doc_ref());
  let edges: Vec<Value> = w.store.query(&inferences).await.unwrap();
  assert_eq!(edges.len(), 1);
  assert_eq!(edges[0]["_from"], current.doc_ref().to_string());
}

#[tokio::test]
async fn deadline_passing_mid_update_rolls_back() {
  let w = World::new().await;
  let ann = w.user("ann").await;
  let c = w.claim(ann, "Claim C").await;
  let base = w.claim(ann, "Base claim").await;
  let a = w.argument(ann, &base, Target::Claim(c.meta.id), true).await;

  let mut store = Hooked::new(&w.store);
  store.ack_delay = Some(StdDuration::from_millis(150));

  let update = ClaimUpdate { title: Some("Claim C, revised".into()), ..Default::default() };
  let mut ctx = w.ctx(ann).with_timeout(StdDuration::from_millis(50));
  let err = claim::update_claim(&store, &mut ctx, c.meta.id, update).await.unwrap_err();
  assert_eq!(err.kind, ErrorKind::Server);
  assert_eq!(err.message, "deadline exceeded");

  let current = w.current_claim(c.meta.id).await;
  assert_eq!(current.meta.key, c.meta.key);
  assert_eq!(current.title, "Claim C");

  let claims: Vec<Claim> =
    docs::query(&w.store, &w.anonymous(), &DocQuery::new(Collection::Claims).id(c.meta.id))
      .await
      .unwrap();
  assert_eq!(claims.len(), 1);

  let inferences = DocQuery::new(Collection::Inferences).to_ref(a.doc_ref());
  let edges: Vec<Value> = w.store.query(&inferences).await.unwrap();
  assert_eq!(edges.len(), 1);
  assert_eq!(edges[0]["_from"], c.doc_ref().to_string());
}

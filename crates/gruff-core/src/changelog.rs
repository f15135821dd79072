//! Change log records and per-user notifications.
//!
//! Both are plain documents written through the rollback buffer, so an
//! operation that fails after logging leaves no trace behind.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  Error, Result,
  argument::Target,
  docs::{self, Document},
  identity::{Collection, RecordMeta},
  request::RequestContext,
  store::{DocQuery, DocumentStore, Field, Precondition},
};

// ─── Change log ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeKind {
  CreatedArgument,
  MovedArgument,
  AddedPremise,
  RemovedPremise,
  ConvertedMultiPremise,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Change {
  #[serde(flatten)]
  pub meta:       RecordMeta,
  pub kind:       ChangeKind,
  /// Logical id of the entity the change is about.
  pub item:       Uuid,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub old_target: Option<Target>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub new_target: Option<Target>,
  #[serde(default)]
  pub user:       Option<Uuid>,
}

impl Document for Change {
  const COLLECTION: Collection = Collection::Changes;

  fn key(&self) -> Uuid { self.meta.key }
}

pub async fn record_change<S>(
  store: &S,
  ctx: &mut RequestContext,
  kind: ChangeKind,
  item: Uuid,
  old_target: Option<Target>,
  new_target: Option<Target>,
) -> Result<Change>
where
  S: DocumentStore,
{
  let mut change = Change {
    meta: RecordMeta::default(),
    kind,
    item,
    old_target,
    new_target,
    user: ctx.user(),
  };
  change.meta.prepare_for_create(ctx);
  docs::create(store, ctx, &change).await?;
  Ok(change)
}

/// Every change recorded about `item`, oldest first.
pub async fn changes_for<S>(store: &S, ctx: &RequestContext, item: Uuid) -> Result<Vec<Change>>
where
  S: DocumentStore,
{
  let query = DocQuery::new(Collection::Changes)
    .eq(Field::Attr("item"), item.to_string())
    .sort_by(Field::Start, false);
  docs::query(store, ctx, &query).await
}

// ─── Notifications ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationKind {
  NewArgument,
  Moved,
  ParentMoved,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
  #[serde(flatten)]
  pub meta:       RecordMeta,
  /// Recipient.
  pub user:       Uuid,
  pub kind:       NotificationKind,
  pub item:       Uuid,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub old_target: Option<Target>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub new_target: Option<Target>,
}

impl Document for Notification {
  const COLLECTION: Collection = Collection::Notifications;

  fn key(&self) -> Uuid { self.meta.key }
}

pub async fn notify<S>(
  store: &S,
  ctx: &mut RequestContext,
  recipient: Uuid,
  kind: NotificationKind,
  item: Uuid,
  old_target: Option<Target>,
  new_target: Option<Target>,
) -> Result<Notification>
where
  S: DocumentStore,
{
  let mut notification = Notification {
    meta: RecordMeta::default(),
    user: recipient,
    kind,
    item,
    old_target,
    new_target,
  };
  notification.meta.prepare_for_create(ctx);
  docs::create(store, ctx, &notification).await?;
  Ok(notification)
}

/// Unread notifications for `user`, newest first.
pub async fn notifications_for<S>(store: &S, ctx: &RequestContext, user: Uuid) -> Result<Vec<Notification>>
where
  S: DocumentStore,
{
  let query = DocQuery::new(Collection::Notifications)
    .eq(Field::Attr("user"), user.to_string())
    .sort_by(Field::Start, true)
    .sort_by(Field::Key, false);
  docs::query(store, ctx, &query).await
}

/// Mark one of the acting user's notifications as read.
pub async fn mark_read<S>(store: &S, ctx: &mut RequestContext, key: Uuid) -> Result<()>
where
  S: DocumentStore,
{
  let actor = ctx.require_user()?;
  let notification = docs::read::<S, Notification>(store, ctx, key)
    .await?
    .ok_or_else(|| Error::not_found(format!("notification {key} not found")))?;
  if notification.user != actor {
    return Err(Error::permission("notification belongs to another user"));
  }
  if notification.meta.end.is_some() {
    return Ok(());
  }

  let sp = ctx.savepoint();
  let result =
    docs::tombstone(store, ctx, Collection::Notifications, key, Precondition::None).await;
  docs::settle(store, ctx, sp, result).await
}

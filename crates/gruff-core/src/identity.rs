//! Keys, document references, and the bookkeeping fields every stored
//! document carries.
//!
//! Versioned vertices (claims, arguments, links) share a logical `id` across
//! versions while each version gets its own `key`. Nothing is ever updated in
//! place: a version "dies" by having its `end` set.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

use crate::{Error, request::RequestContext};

// ─── Collections ─────────────────────────────────────────────────────────────

/// Every collection the debate graph persists into.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  PartialOrd,
  Ord,
  Hash,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Collection {
  // ── Vertices ──────────────────────────────────────────────────────────
  Claims,
  Arguments,
  Users,
  Contexts,
  Links,

  // ── Edges ─────────────────────────────────────────────────────────────
  Inferences,
  BaseClaims,
  Premises,
  ContextEdges,
  Scores,

  // ── Bookkeeping ───────────────────────────────────────────────────────
  Changes,
  Notifications,
}

impl Collection {
  /// Edge collections, in the order cascades visit them.
  pub const EDGES: [Collection; 5] = [
    Self::Inferences,
    Self::BaseClaims,
    Self::Premises,
    Self::ContextEdges,
    Self::Scores,
  ];

  pub fn is_edge(self) -> bool { Self::EDGES.contains(&self) }

  /// Singular noun used in messages, e.g. "claim".
  pub fn noun(self) -> &'static str {
    match self {
      Self::Claims => "claim",
      Self::Arguments => "argument",
      Self::Users => "user",
      Self::Contexts => "context",
      Self::Links => "link",
      Self::Inferences => "inference",
      Self::BaseClaims => "base claim edge",
      Self::Premises => "premise edge",
      Self::ContextEdges => "context edge",
      Self::Scores => "score",
      Self::Changes => "change",
      Self::Notifications => "notification",
    }
  }
}

// ─── DocRef ──────────────────────────────────────────────────────────────────

/// A `"<collection>/<key>"` reference to one specific document version, as
/// stored in edge `_from` / `_to` fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DocRef {
  pub collection: Collection,
  pub key:        Uuid,
}

impl DocRef {
  pub fn new(collection: Collection, key: Uuid) -> Self { Self { collection, key } }
}

impl fmt::Display for DocRef {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}/{}", self.collection, self.key.hyphenated())
  }
}

impl FromStr for DocRef {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let malformed = || Error::business(format!("malformed document reference {s:?}"));
    let (collection, key) = s.split_once('/').ok_or_else(malformed)?;
    let collection = Collection::from_str(collection).map_err(|_| malformed())?;
    let key = Uuid::parse_str(key).map_err(|_| malformed())?;
    Ok(Self { collection, key })
  }
}

impl Serialize for DocRef {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(self)
  }
}

impl<'de> Deserialize<'de> for DocRef {
  fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    let raw = String::deserialize(deserializer)?;
    raw.parse().map_err(serde::de::Error::custom)
  }
}

// ─── Version bookkeeping ─────────────────────────────────────────────────────

/// Bookkeeping for versioned vertices (claims, arguments, links).
///
/// A nil `key` or `id` means "not assigned yet".
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct VersionMeta {
  /// Unique per version; primary key of the stored document.
  pub key:      Uuid,
  /// Shared by every version of the same logical entity.
  pub id:       Uuid,
  pub start:    DateTime<Utc>,
  #[serde(rename = "mod")]
  pub modified: DateTime<Utc>,
  /// `None` while this is the current version.
  #[serde(default)]
  pub end:      Option<DateTime<Utc>>,
  #[serde(default)]
  pub creator:  Option<Uuid>,
  #[serde(default)]
  pub editor:   Option<Uuid>,
}

impl VersionMeta {
  /// Stamp a new version: fresh key, inherited or fresh id, request time.
  pub fn prepare_for_create(&mut self, ctx: &RequestContext) {
    self.key = Uuid::new_v4();
    if self.id.is_nil() {
      self.id = self.key;
    }
    self.start = ctx.now();
    self.modified = ctx.now();
    self.end = None;
    if self.creator.is_none() {
      self.creator = ctx.user();
    }
    self.editor = ctx.user();
  }

  pub fn prepare_for_delete(&mut self, ctx: &RequestContext) {
    self.end = Some(ctx.now());
  }

  pub fn is_current(&self) -> bool { self.end.is_none() }

  /// Whether this version was the live one at `at`.
  pub fn live_at(&self, at: DateTime<Utc>) -> bool {
    self.start <= at && self.end.is_none_or(|end| end > at)
  }
}

/// Bookkeeping for non-versioned records (users, contexts, change log,
/// notifications).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RecordMeta {
  pub key:     Uuid,
  pub start:   DateTime<Utc>,
  #[serde(default)]
  pub end:     Option<DateTime<Utc>>,
  #[serde(default)]
  pub creator: Option<Uuid>,
}

impl RecordMeta {
  pub fn prepare_for_create(&mut self, ctx: &RequestContext) {
    self.key = Uuid::new_v4();
    self.start = ctx.now();
    self.end = None;
    if self.creator.is_none() {
      self.creator = ctx.user();
    }
  }

  pub fn prepare_for_delete(&mut self, ctx: &RequestContext) {
    self.end = Some(ctx.now());
  }
}

/// Bookkeeping for edges: endpoints are specific vertex *versions*.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeMeta {
  pub key:     Uuid,
  #[serde(rename = "_from")]
  pub from:    DocRef,
  #[serde(rename = "_to")]
  pub to:      DocRef,
  #[serde(default)]
  pub start:   DateTime<Utc>,
  #[serde(default)]
  pub end:     Option<DateTime<Utc>>,
  #[serde(default)]
  pub creator: Option<Uuid>,
}

impl EdgeMeta {
  pub fn new(from: DocRef, to: DocRef) -> Self {
    Self {
      key: Uuid::nil(),
      from,
      to,
      start: DateTime::default(),
      end: None,
      creator: None,
    }
  }

  pub fn prepare_for_create(&mut self, ctx: &RequestContext) {
    self.key = Uuid::new_v4();
    self.start = ctx.now();
    self.end = None;
    if self.creator.is_none() {
      self.creator = ctx.user();
    }
  }

  pub fn prepare_for_delete(&mut self, ctx: &RequestContext) {
    self.end = Some(ctx.now());
  }
}

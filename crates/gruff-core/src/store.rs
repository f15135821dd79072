//! The `DocumentStore` trait and its parametric query type.
//!
//! The trait is implemented by storage backends (e.g. `gruff-store-sqlite`).
//! Core operations are written against this abstraction and never see SQL.
//! Documents cross the boundary as JSON objects; every document has a `key`
//! and a `start`, versioned vertices an `id`, edges `_from` and `_to`, and
//! anything that can be tombstoned an `end`.

use std::future::Future;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::identity::{Collection, DocRef};

// ─── Query type ──────────────────────────────────────────────────────────────

/// Which versions a query may see.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Liveness {
  /// Only documents with `end == null`.
  #[default]
  Current,
  /// Documents live at the instant: `start <= at AND (end == null OR end > at)`.
  At(DateTime<Utc>),
  /// Every version, tombstoned or not.
  History,
}

impl Liveness {
  /// `At(t)` when a point in time is given, otherwise `Current`.
  pub fn at_or_current(at: Option<DateTime<Utc>>) -> Self {
    at.map_or(Self::Current, Self::At)
  }
}

/// A filterable document field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
  Key,
  Id,
  From,
  To,
  Start,
  /// Any other top-level attribute of the document body.
  Attr(&'static str),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
  /// `field == value`; a `null` value matches missing or null fields.
  Eq(Field, Value),
  /// `field` equals any of the values.
  In(Field, Vec<Value>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sort {
  pub field:      Field,
  pub descending: bool,
}

/// A parametric query over one collection. Values are always bound, never
/// interpolated into the backend's query text.
#[derive(Debug, Clone, PartialEq)]
pub struct DocQuery {
  pub collection: Collection,
  pub filters:    Vec<Filter>,
  pub liveness:   Liveness,
  /// Empty means backend order by `start`, then `key`.
  pub sort:       Vec<Sort>,
  pub limit:      Option<usize>,
}

impl DocQuery {
  /// A query over the current documents of `collection`.
  pub fn new(collection: Collection) -> Self {
    Self {
      collection,
      filters: Vec::new(),
      liveness: Liveness::Current,
      sort: Vec::new(),
      limit: None,
    }
  }

  pub fn eq(mut self, field: Field, value: impl Into<Value>) -> Self {
    self.filters.push(Filter::Eq(field, value.into()));
    self
  }

  pub fn any_of<V: Into<Value>>(
    mut self,
    field: Field,
    values: impl IntoIterator<Item = V>,
  ) -> Self {
    self
      .filters
      .push(Filter::In(field, values.into_iter().map(Into::into).collect()));
    self
  }

  pub fn id(self, id: Uuid) -> Self { self.eq(Field::Id, id.to_string()) }

  pub fn from_ref(self, r: DocRef) -> Self { self.eq(Field::From, r.to_string()) }

  pub fn to_ref(self, r: DocRef) -> Self { self.eq(Field::To, r.to_string()) }

  pub fn liveness(mut self, liveness: Liveness) -> Self {
    self.liveness = liveness;
    self
  }

  /// Include tombstoned documents.
  pub fn history(self) -> Self { self.liveness(Liveness::History) }

  pub fn sort_by(mut self, field: Field, descending: bool) -> Self {
    self.sort.push(Sort { field, descending });
    self
  }

  pub fn limit(mut self, limit: usize) -> Self {
    self.limit = Some(limit);
    self
  }
}

/// Guard applied by [`DocumentStore::patch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precondition {
  None,
  /// The document must still have `end == null`; otherwise the patch fails
  /// as a stale version.
  Current,
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over a document/edge store backend.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes (e.g. tokio with `axum`). Backend errors must
/// convert into [`crate::Error`], translating uniqueness violations, stale
/// versions and missing documents into their Business / NotFound forms.
pub trait DocumentStore: Send + Sync {
  type Error: std::error::Error + Into<crate::Error> + Send + Sync + 'static;

  /// Read one document by key, whatever its liveness.
  fn read(
    &self,
    collection: Collection,
    key: Uuid,
  ) -> impl Future<Output = Result<Option<Value>, Self::Error>> + Send + '_;

  /// Insert a new document. `doc` must carry its own `key`.
  fn create(
    &self,
    collection: Collection,
    doc: Value,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Merge the top-level fields of `patch` into a document and return the
  /// document as it was before the patch.
  ///
  /// The write is a compare-and-set against the snapshot, so a concurrent
  /// writer makes this call fail as a stale version instead of silently
  /// overwriting.
  fn patch(
    &self,
    collection: Collection,
    key: Uuid,
    patch: Map<String, Value>,
    precondition: Precondition,
  ) -> impl Future<Output = Result<Value, Self::Error>> + Send + '_;

  /// Overwrite a document wholesale. Used to restore rollback snapshots.
  fn replace(
    &self,
    collection: Collection,
    key: Uuid,
    doc: Value,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn query<'a>(
    &'a self,
    query: &'a DocQuery,
  ) -> impl Future<Output = Result<Vec<Value>, Self::Error>> + Send + 'a;

  /// Number of documents `query` would return, ignoring its limit.
  fn count<'a>(
    &'a self,
    query: &'a DocQuery,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + 'a;
}

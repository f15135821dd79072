//! [`SqliteStore`], the SQLite implementation of [`DocumentStore`].

use std::path::Path;

use gruff_core::{
  identity::Collection,
  store::{DocQuery, DocumentStore, Precondition},
};
use rusqlite::OptionalExtension as _;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::{
  Error, Result,
  encode::{Columns, decode_body, encode_uuid},
  query::{Compiled, Select, compile},
  schema::SCHEMA,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Gruff document store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Body and `end_at` of one row.
  async fn fetch(&self, collection: Collection, key: Uuid) -> Result<Option<(String, Option<String>)>> {
    let coll = collection.to_string();
    let key = encode_uuid(key);
    let row = self
      .conn
      .call(move |conn| {
        let row = conn
          .query_row(
            "SELECT body, end_at FROM documents WHERE collection = ?1 AND key = ?2",
            rusqlite::params![coll, key],
            |r| Ok((r.get(0)?, r.get(1)?)),
          )
          .optional()?;
        Ok(row)
      })
      .await?;
    Ok(row)
  }

  /// Write `body` over an existing row. With `expected` set, the write only
  /// happens if the stored body is still exactly `expected`. Returns the
  /// number of rows changed.
  async fn overwrite(
    &self,
    collection: Collection,
    body: Map<String, Value>,
    expected: Option<String>,
    require_live: bool,
  ) -> Result<usize> {
    let cols = Columns::from_body(&body)?;
    let coll = collection.to_string();
    let key = encode_uuid(cols.key);
    let body = Value::Object(body).to_string();

    let changed = self
      .conn
      .call(move |conn| {
        let mut sql = String::from(
          "UPDATE documents
           SET id = ?1, from_ref = ?2, to_ref = ?3, start = ?4, end_at = ?5, body = ?6
           WHERE collection = ?7 AND key = ?8",
        );
        if expected.is_some() {
          sql.push_str(" AND body = ?9");
        }
        if require_live {
          sql.push_str(" AND end_at IS NULL");
        }
        let mut params: Vec<rusqlite::types::Value> = vec![
          cols.id.into(),
          cols.from_ref.into(),
          cols.to_ref.into(),
          cols.start.into(),
          cols.end_at.into(),
          body.into(),
          coll.into(),
          key.into(),
        ];
        if let Some(expected) = expected {
          params.push(expected.into());
        }
        let n = conn.execute(&sql, rusqlite::params_from_iter(params))?;
        Ok(n)
      })
      .await?;
    Ok(changed)
  }
}

// ─── DocumentStore impl ──────────────────────────────────────────────────────

impl DocumentStore for SqliteStore {
  type Error = Error;

  async fn read(&self, collection: Collection, key: Uuid) -> Result<Option<Value>> {
    self
      .fetch(collection, key)
      .await?
      .map(|(body, _)| decode_body(&body).map(Value::Object))
      .transpose()
  }

  async fn create(&self, collection: Collection, doc: Value) -> Result<()> {
    let Value::Object(body) = doc else {
      return Err(Error::NotAnObject);
    };
    let cols = Columns::from_body(&body)?;
    let key = cols.key;
    let coll = collection.to_string();
    let key_str = encode_uuid(key);
    let body = Value::Object(body).to_string();

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO documents (collection, key, id, from_ref, to_ref, start, end_at, body)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
          rusqlite::params![
            coll,
            key_str,
            cols.id,
            cols.from_ref,
            cols.to_ref,
            cols.start,
            cols.end_at,
            body,
          ],
        )?;
        Ok(())
      })
      .await
      .map_err(|e| Error::on_insert(e, collection, key))
  }

  async fn patch(
    &self,
    collection: Collection,
    key: Uuid,
    patch: Map<String, Value>,
    precondition: Precondition,
  ) -> Result<Value> {
    let (stored, end_at) = self
      .fetch(collection, key)
      .await?
      .ok_or(Error::NotFound { collection, key })?;

    let require_live = precondition == Precondition::Current;
    if require_live && end_at.is_some() {
      return Err(Error::StaleVersion { collection, key });
    }

    let before = decode_body(&stored)?;
    let mut after = before.clone();
    after.extend(patch);
    if Columns::from_body(&after)?.key != key {
      return Err(Error::InvalidField { field: "key", reason: "a patch cannot change the key".into() });
    }

    let changed = self.overwrite(collection, after, Some(stored), require_live).await?;
    if changed == 0 {
      tracing::debug!(%collection, %key, "conditional patch lost a race");
      return Err(Error::StaleVersion { collection, key });
    }
    Ok(Value::Object(before))
  }

  async fn replace(&self, collection: Collection, key: Uuid, doc: Value) -> Result<()> {
    let Value::Object(body) = doc else {
      return Err(Error::NotAnObject);
    };
    if self.overwrite(collection, body, None, false).await? == 0 {
      return Err(Error::NotFound { collection, key });
    }
    Ok(())
  }

  async fn query(&self, query: &DocQuery) -> Result<Vec<Value>> {
    let Compiled { sql, params } = compile(query, Select::Bodies)?;

    let bodies: Vec<String> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params_from_iter(params), |row| row.get(0))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    bodies
      .iter()
      .map(|b| decode_body(b).map(Value::Object))
      .collect()
  }

  async fn count(&self, query: &DocQuery) -> Result<u64> {
    let Compiled { sql, params } = compile(query, Select::Count)?;

    let n: i64 = self
      .conn
      .call(move |conn| {
        let n = conn.query_row(&sql, rusqlite::params_from_iter(params), |r| r.get(0))?;
        Ok(n)
      })
      .await?;
    Ok(u64::try_from(n).unwrap_or_default())
  }
}

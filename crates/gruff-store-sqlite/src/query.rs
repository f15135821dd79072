//! Compiles a [`DocQuery`] into SQL over the `documents` table.
//!
//! Values are always bound as parameters. Attribute names end up in the SQL
//! text as JSON paths, so they are restricted to `[A-Za-z0-9_]`.

use gruff_core::store::{DocQuery, Field, Filter, Liveness};
use rusqlite::types::Value as SqlValue;
use serde_json::Value;

use crate::{
  Error, Result,
  encode::{bind_value, encode_dt},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Select {
  Bodies,
  Count,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Compiled {
  pub sql:    String,
  pub params: Vec<SqlValue>,
}

fn column(field: Field) -> Result<String> {
  Ok(match field {
    Field::Key => "key".into(),
    Field::Id => "id".into(),
    Field::From => "from_ref".into(),
    Field::To => "to_ref".into(),
    Field::Start => "start".into(),
    Field::Attr(name) => {
      if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(Error::InvalidField {
          field:  "attribute",
          reason: format!("{name:?} is not a plain attribute name"),
        });
      }
      format!("json_extract(body, '$.{name}')")
    }
  })
}

pub fn compile(query: &DocQuery, select: Select) -> Result<Compiled> {
  let mut conds: Vec<String> = vec!["collection = ?".into()];
  let mut params: Vec<SqlValue> = vec![SqlValue::Text(query.collection.to_string())];

  match query.liveness {
    Liveness::Current => conds.push("end_at IS NULL".into()),
    Liveness::At(at) => {
      conds.push("start <= ? AND (end_at IS NULL OR end_at > ?)".into());
      params.push(SqlValue::Text(encode_dt(at)));
      params.push(SqlValue::Text(encode_dt(at)));
    }
    Liveness::History => {}
  }

  for filter in &query.filters {
    match filter {
      Filter::Eq(field, Value::Null) => conds.push(format!("{} IS NULL", column(*field)?)),
      Filter::Eq(field, value) => {
        conds.push(format!("{} = ?", column(*field)?));
        params.push(bind_value(value));
      }
      Filter::In(_, values) if values.is_empty() => conds.push("0".into()),
      Filter::In(field, values) => {
        let slots = vec!["?"; values.len()].join(", ");
        conds.push(format!("{} IN ({slots})", column(*field)?));
        params.extend(values.iter().map(bind_value));
      }
    }
  }

  let where_clause = conds.join(" AND ");
  let sql = match select {
    Select::Count => format!("SELECT COUNT(*) FROM documents WHERE {where_clause}"),
    Select::Bodies => {
      let order = if query.sort.is_empty() {
        "start, key".to_owned()
      } else {
        query
          .sort
          .iter()
          .map(|s| Ok(format!("{} {}", column(s.field)?, if s.descending { "DESC" } else { "ASC" })))
          .collect::<Result<Vec<_>>>()?
          .join(", ")
      };
      let mut sql = format!("SELECT body FROM documents WHERE {where_clause} ORDER BY {order}");
      if let Some(limit) = query.limit {
        sql.push_str(" LIMIT ?");
        params.push(SqlValue::Integer(i64::try_from(limit).unwrap_or(i64::MAX)));
      }
      sql
    }
  };

  Ok(Compiled { sql, params })
}

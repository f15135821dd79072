//! Declarative field validation.
//!
//! Each entity publishes a static table of [`FieldRule`]s keyed by its JSON
//! field names. Rules are checked against the entity's serialised form, so the
//! names in error messages match the names clients send.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::{Error, Result};

// ─── Rules ───────────────────────────────────────────────────────────────────

pub static URL: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r"^https?://[^\s/$.?#][^\s]*$").expect("static url pattern")
});

pub static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("static email pattern")
});

#[derive(Debug)]
pub enum Constraint {
  /// Present, non-null, and not blank.
  Required,
  /// String length in characters, inclusive.
  Length { min: usize, max: usize },
  Url,
  Email,
  /// Must match the pattern; `describe` completes "{field} must ...".
  Pattern {
    regex:    &'static LazyLock<Regex>,
    describe: &'static str,
  },
  /// Numeric value, inclusive.
  Range { min: f64, max: f64 },
  OneOf(&'static [&'static str]),
}

#[derive(Debug)]
pub struct FieldRule {
  pub name:        &'static str,
  pub constraints: &'static [Constraint],
}

/// An entity with declarative field rules.
pub trait Validate: Serialize {
  fn rules() -> &'static [FieldRule];

  /// Cross-field checks that don't fit a single-field rule.
  fn check_entity(&self, _violations: &mut Violations) {}
}

// ─── Violations ──────────────────────────────────────────────────────────────

/// Accumulates per-field failures before they are turned into one error.
#[derive(Debug, Default)]
pub struct Violations {
  fields:   Vec<String>,
  messages: Vec<String>,
}

impl Violations {
  pub fn push(&mut self, field: &str, message: impl Into<String>) {
    if !self.fields.iter().any(|f| f == field) {
      self.fields.push(field.to_owned());
    }
    self.messages.push(message.into());
  }

  pub fn is_empty(&self) -> bool { self.messages.is_empty() }

  #[track_caller]
  pub fn into_result(self) -> Result<()> {
    if self.is_empty() {
      return Ok(());
    }
    Err(Error::business(self.messages.join("; ")).with_data("fields", self.fields))
  }
}

// ─── Entry points ────────────────────────────────────────────────────────────

/// Check every rule plus the entity-level checks.
#[track_caller]
pub fn validate_for_create<T: Validate>(entity: &T) -> Result<()> {
  let view = object_view(entity)?;
  let mut violations = Violations::default();
  for rule in T::rules() {
    check_rule(rule, view.get(rule.name), &mut violations);
  }
  entity.check_entity(&mut violations);
  violations.into_result()
}

/// Check only the fields named in `updates`, against their new values.
#[track_caller]
pub fn validate_for_update<T: Validate>(updates: &Map<String, Value>) -> Result<()> {
  let mut violations = Violations::default();
  for rule in T::rules() {
    if let Some(value) = updates.get(rule.name) {
      check_rule(rule, Some(value), &mut violations);
    }
  }
  violations.into_result()
}

/// Check a single field of `entity`.
#[track_caller]
pub fn validate_field<T: Validate>(entity: &T, name: &str) -> Result<()> {
  let view = object_view(entity)?;
  let mut violations = Violations::default();
  if let Some(rule) = T::rules().iter().find(|r| r.name == name) {
    check_rule(rule, view.get(name), &mut violations);
  }
  violations.into_result()
}

fn object_view<T: Serialize>(entity: &T) -> Result<Map<String, Value>> {
  match serde_json::to_value(entity)? {
    Value::Object(map) => Ok(map),
    _ => Err(Error::server("validated entity is not an object")),
  }
}

fn check_rule(rule: &FieldRule, value: Option<&Value>, out: &mut Violations) {
  let name = rule.name;
  let value = value.filter(|v| !v.is_null());

  for constraint in rule.constraints {
    match (constraint, value) {
      (Constraint::Required, None) => {
        out.push(name, format!("{name} is required"));
        return;
      }
      (Constraint::Required, Some(Value::String(s))) if s.trim().is_empty() => {
        out.push(name, format!("{name} is required"));
        return;
      }
      (_, None) => {}

      (Constraint::Length { min, max }, Some(Value::String(s))) => {
        let len = s.chars().count();
        if len < *min || len > *max {
          out.push(name, format!("{name} must be between {min} and {max} characters"));
        }
      }
      (Constraint::Url, Some(Value::String(s))) => {
        if !URL.is_match(s) {
          out.push(name, format!("{name} must be a valid URL"));
        }
      }
      (Constraint::Email, Some(Value::String(s))) => {
        if !EMAIL.is_match(s) {
          out.push(name, format!("{name} must be a valid email address"));
        }
      }
      (Constraint::Pattern { regex, describe }, Some(Value::String(s))) => {
        if !regex.is_match(s) {
          out.push(name, format!("{name} must {describe}"));
        }
      }
      (Constraint::Range { min, max }, Some(v)) => match v.as_f64() {
        Some(n) if n >= *min && n <= *max => {}
        _ => out.push(name, format!("{name} must be between {min} and {max}")),
      },
      (Constraint::OneOf(allowed), Some(Value::String(s))) => {
        if !allowed.contains(&s.as_str()) {
          out.push(name, format!("{name} must be one of {}", allowed.join(", ")));
        }
      }
      (Constraint::Required, Some(_)) => {}
      (_, Some(_)) => out.push(name, format!("{name} has the wrong type")),
    }
  }
}

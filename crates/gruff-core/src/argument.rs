//! Arguments: pro/con inferences attached to a claim or to another argument.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::{
  Error, Result,
  docs::{Document, Versioned},
  identity::{Collection, VersionMeta},
  validate::{Constraint, FieldRule, Validate, Violations},
};

// ─── Target ──────────────────────────────────────────────────────────────────

/// What an argument argues about: exactly one claim or one argument,
/// identified by logical id.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum Target {
  Claim(Uuid),
  Argument(Uuid),
}

impl Target {
  /// Build a target from the two nullable wire fields; exactly one must be
  /// set.
  #[track_caller]
  pub fn from_parts(claim: Option<Uuid>, argument: Option<Uuid>) -> Result<Self> {
    match (claim, argument) {
      (Some(c), None) => Ok(Self::Claim(c)),
      (None, Some(a)) => Ok(Self::Argument(a)),
      (Some(_), Some(_)) => Err(
        Error::business("an argument must have exactly one target, not both")
          .with_data("fields", ["targetClaimId", "targetArgumentId"].as_slice()),
      ),
      (None, None) => Err(
        Error::business("an argument must have a target claim or argument")
          .with_data("fields", ["targetClaimId", "targetArgumentId"].as_slice()),
      ),
    }
  }

  pub fn id(self) -> Uuid {
    match self {
      Self::Claim(id) | Self::Argument(id) => id,
    }
  }

  pub fn collection(self) -> Collection {
    match self {
      Self::Claim(_) => Collection::Claims,
      Self::Argument(_) => Collection::Arguments,
    }
  }
}

// ─── Argument ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Argument {
  #[serde(flatten)]
  pub meta:        VersionMeta,
  /// Logical id of the base claim.
  pub claim_id:    Uuid,
  pub target:      Target,
  pub pro:         bool,
  pub title:       String,
  pub description: String,
  #[serde(default)]
  pub strength:    f64,
  #[serde(default, rename = "strengthRU")]
  pub strength_ru: f64,
}

impl Argument {
  pub fn new(
    claim_id: Uuid,
    target: Target,
    pro: bool,
    title: impl Into<String>,
    description: impl Into<String>,
  ) -> Self {
    Self {
      meta: VersionMeta::default(),
      claim_id,
      target,
      pro,
      title: title.into(),
      description: description.into(),
      strength: 0.0,
      strength_ru: 0.0,
    }
  }
}

impl Document for Argument {
  const COLLECTION: Collection = Collection::Arguments;

  fn key(&self) -> Uuid { self.meta.key }
}

impl Versioned for Argument {
  fn meta(&self) -> &VersionMeta { &self.meta }

  fn meta_mut(&mut self) -> &mut VersionMeta { &mut self.meta }
}

static ARGUMENT_RULES: &[FieldRule] = &[
  FieldRule {
    name:        "title",
    constraints: &[Constraint::Required, Constraint::Length { min: 3, max: 1000 }],
  },
  FieldRule {
    name:        "description",
    constraints: &[Constraint::Required, Constraint::Length { min: 3, max: 4000 }],
  },
  FieldRule { name: "claimId", constraints: &[Constraint::Required] },
  FieldRule {
    name:        "strength",
    constraints: &[Constraint::Range { min: 0.0, max: 1.0 }],
  },
];

impl Validate for Argument {
  fn rules() -> &'static [FieldRule] { ARGUMENT_RULES }

  fn check_entity(&self, violations: &mut Violations) {
    if self.claim_id.is_nil() {
      violations.push("claimId", "claimId is required");
    }
    if !self.meta.id.is_nil() && self.target == Target::Argument(self.meta.id) {
      violations.push("target", "an argument cannot target itself");
    }
  }
}

// ─── Wire shapes ─────────────────────────────────────────────────────────────

/// A new argument as submitted by a client: the target arrives as two
/// nullable fields and is folded into a [`Target`].
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewArgument {
  #[serde(default)]
  pub claim_id:           Option<Uuid>,
  #[serde(default)]
  pub target_claim_id:    Option<Uuid>,
  #[serde(default)]
  pub target_argument_id: Option<Uuid>,
  #[serde(default)]
  pub pro:                bool,
  #[serde(default)]
  pub title:              String,
  #[serde(default)]
  pub description:        String,
}

impl NewArgument {
  pub fn into_argument(self) -> Result<Argument> {
    let target = Target::from_parts(self.target_claim_id, self.target_argument_id)?;
    Ok(Argument::new(
      self.claim_id.unwrap_or_else(Uuid::nil),
      target,
      self.pro,
      self.title,
      self.description,
    ))
  }
}

/// Editable fields of an argument. The target only changes through a move.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArgumentUpdate {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub title:       Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub pro:         Option<bool>,
}

impl ArgumentUpdate {
  /// The supplied fields as a JSON object, for validation.
  pub fn fields(&self) -> Result<Map<String, Value>> {
    match serde_json::to_value(self)? {
      Value::Object(map) => Ok(map),
      _ => Ok(Map::new()),
    }
  }

  /// Apply to `argument`; returns whether anything changed.
  pub fn apply(&self, argument: &mut Argument) -> bool {
    let mut changed = false;
    if let Some(title) = &self.title
      && *title != argument.title
    {
      argument.title = title.clone();
      changed = true;
    }
    if let Some(description) = &self.description
      && *description != argument.description
    {
      argument.description = description.clone();
      changed = true;
    }
    if let Some(pro) = self.pro
      && pro != argument.pro
    {
      argument.pro = pro;
      changed = true;
    }
    changed
  }
}

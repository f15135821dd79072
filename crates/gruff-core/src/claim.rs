//! Claims: statements whose truth is being debated.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strum::{Display, EnumString, VariantNames};
use uuid::Uuid;

use crate::{
  Error, Result,
  docs::{self, Document, Versioned},
  identity::{Collection, VersionMeta},
  link, loader,
  request::RequestContext,
  store::{DocQuery, DocumentStore},
  structure, user,
  validate::{self, Constraint, FieldRule, Validate},
  versioning,
};

// ─── Types ───────────────────────────────────────────────────────────────────

/// How a multi-premise claim's truth follows from its premises.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Default,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  VariantNames,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum PremiseRule {
  #[default]
  None,
  All,
  Any,
  AnyTwo,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claim {
  #[serde(flatten)]
  pub meta:          VersionMeta,
  pub title:         String,
  pub description:   String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub negation:      Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub question:      Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub note:          Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub image:         Option<String>,
  #[serde(default)]
  pub multi_premise: bool,
  #[serde(default)]
  pub premise_rule:  PremiseRule,
  #[serde(default)]
  pub truth:         f64,
  #[serde(default, rename = "truthRU")]
  pub truth_ru:      f64,
  /// Premises already loaded alongside this claim; never stored.
  #[serde(skip)]
  pub premises:      Vec<Claim>,
}

impl Claim {
  pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
    Self {
      meta:          VersionMeta::default(),
      title:         title.into(),
      description:   description.into(),
      negation:      None,
      question:      None,
      note:          None,
      image:         None,
      multi_premise: false,
      premise_rule:  PremiseRule::None,
      truth:         0.0,
      truth_ru:      0.0,
      premises:      Vec::new(),
    }
  }

  /// A fresh, unsaved claim carrying this claim's wording.
  pub fn copy_text(&self) -> Self {
    Self {
      negation: self.negation.clone(),
      question: self.question.clone(),
      note: self.note.clone(),
      image: self.image.clone(),
      ..Self::new(self.title.clone(), self.description.clone())
    }
  }
}

impl Document for Claim {
  const COLLECTION: Collection = Collection::Claims;

  fn key(&self) -> Uuid { self.meta.key }
}

impl Versioned for Claim {
  fn meta(&self) -> &VersionMeta { &self.meta }

  fn meta_mut(&mut self) -> &mut VersionMeta { &mut self.meta }
}

static CLAIM_RULES: &[FieldRule] = &[
  FieldRule {
    name:        "title",
    constraints: &[Constraint::Required, Constraint::Length { min: 3, max: 1000 }],
  },
  FieldRule {
    name:        "description",
    constraints: &[Constraint::Required, Constraint::Length { min: 3, max: 4000 }],
  },
  FieldRule { name: "premiseRule", constraints: &[Constraint::OneOf(PremiseRule::VARIANTS)] },
  FieldRule { name: "image", constraints: &[Constraint::Url] },
];

impl Validate for Claim {
  fn rules() -> &'static [FieldRule] { CLAIM_RULES }
}

/// Editable fields of a claim. Absent fields are left alone.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimUpdate {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub title:        Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description:  Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub negation:     Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub question:     Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub note:         Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub image:        Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub premise_rule: Option<String>,
}

impl ClaimUpdate {
  pub fn fields(&self) -> Result<Map<String, Value>> {
    match serde_json::to_value(self)? {
      Value::Object(map) => Ok(map),
      _ => Ok(Map::new()),
    }
  }

  /// Apply to `claim`; returns whether any semantic field changed.
  pub fn apply(&self, claim: &mut Claim) -> Result<bool> {
    fn set<T: PartialEq + Clone>(slot: &mut T, value: &Option<T>) -> bool {
      match value {
        Some(v) if v != slot => {
          *slot = v.clone();
          true
        }
        _ => false,
      }
    }
    fn set_opt(slot: &mut Option<String>, value: &Option<String>) -> bool {
      match value {
        Some(v) if slot.as_ref() != Some(v) => {
          *slot = Some(v.clone());
          true
        }
        _ => false,
      }
    }

    let rule = self
      .premise_rule
      .as_deref()
      .map(|r| {
        r.parse::<PremiseRule>()
          .map_err(|_| Error::business(format!("unknown premise rule {r:?}")))
      })
      .transpose()?;

    let mut changed = set(&mut claim.title, &self.title);
    changed |= set(&mut claim.description, &self.description);
    changed |= set_opt(&mut claim.negation, &self.negation);
    changed |= set_opt(&mut claim.question, &self.question);
    changed |= set_opt(&mut claim.note, &self.note);
    changed |= set_opt(&mut claim.image, &self.image);
    changed |= set(&mut claim.premise_rule, &rule);
    Ok(changed)
  }
}

// ─── Operations ──────────────────────────────────────────────────────────────

/// Validate and persist a new claim (version zero of a new logical id).
pub async fn create_claim<S>(store: &S, ctx: &mut RequestContext, mut claim: Claim) -> Result<Claim>
where
  S: DocumentStore,
{
  ctx.require_user()?;
  validate::validate_for_create(&claim)?;
  claim.meta = VersionMeta::default();
  claim.meta.prepare_for_create(ctx);

  let sp = ctx.savepoint();
  let result = docs::create(store, ctx, &claim).await.map(|()| claim);
  docs::settle(store, ctx, sp, result).await
}

/// Apply `update`, producing a new version only if a semantic field changes.
pub async fn update_claim<S>(
  store: &S,
  ctx: &mut RequestContext,
  id: Uuid,
  update: ClaimUpdate,
) -> Result<Claim>
where
  S: DocumentStore,
{
  ctx.require_user()?;
  validate::validate_for_update::<Claim>(&update.fields()?)?;

  let current: Claim = loader::current(store, ctx, id).await?;
  let mut preview = current.clone();
  if !update.apply(&mut preview)? {
    return Ok(current);
  }

  tracing::debug!(%id, "versioning claim");
  versioning::version_claim(store, ctx, id, |claim| update.apply(claim).map(|_| ())).await
}

/// Tombstone the current version of a claim, cascading to the arguments
/// that target it.
pub async fn delete_claim<S>(store: &S, ctx: &mut RequestContext, id: Uuid) -> Result<Claim>
where
  S: DocumentStore,
{
  let current: Claim = loader::current(store, ctx, id).await?;
  user::require_owner_or_curator(store, ctx, current.meta.creator).await?;

  let bases = docs::count(
    store,
    ctx,
    &DocQuery::new(Collection::BaseClaims).to_ref(current.doc_ref()),
  )
  .await?;
  if bases > 0 {
    return Err(
      Error::business(format!("claim is the base of {bases} arguments"))
        .with_data("arguments", bases),
    );
  }

  let sp = ctx.savepoint();
  let result: Result<Claim> = async {
    structure::cascade_delete(store, ctx, current.doc_ref()).await?;
    for link in link::links_for_claim(store, ctx, id, None).await? {
      versioning::retire(store, ctx, &link).await?;
    }
    versioning::retire(store, ctx, &current).await?;
    Ok(current)
  }
  .await;
  docs::settle(store, ctx, sp, result).await
}

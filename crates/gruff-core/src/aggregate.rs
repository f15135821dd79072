//! Rolled-up truth and strength, computed over an in-memory snapshot of part
//! of the graph.
//!
//! `TruthRU(claim)` combines the claim's arguments, or falls back to its base
//! truth. `StrengthRU(argument)` combines the argument's own arguments, or
//! falls back to its strength. An argument contributes
//! `ScoreRU = StrengthRU · TruthRU(base claim)`. Combination of pro scores
//! `p` and con scores `c` is `0.5 + 0.5·((1 − Π(1 − p)) − (1 − Π(1 − c)))`.
//!
//! The graph may contain cycles. A vertex reached again while it is still
//! being evaluated contributes its cached value instead. Only values whose
//! evaluation never hit such a cut are memoized, so every vertex gets the same
//! result whatever order the snapshot is walked in.

use std::collections::{HashMap, HashSet};

use uuid::Uuid;

use crate::claim::PremiseRule;

#[derive(Debug, Clone, Default)]
pub struct ClaimNode {
  /// Mean of current personal truth scores.
  pub truth:         f64,
  pub multi_premise: bool,
  pub premise_rule:  PremiseRule,
  /// Premise claim ids.
  pub premises:      Vec<Uuid>,
  /// Ids of arguments targeting this claim.
  pub arguments:     Vec<Uuid>,
  /// Value stored before this evaluation; used to break cycles.
  pub cached:        f64,
}

#[derive(Debug, Clone, Default)]
pub struct ArgumentNode {
  pub base_claim: Uuid,
  pub pro:        bool,
  /// Mean of current relevance scores.
  pub strength:   f64,
  /// Ids of arguments targeting this argument.
  pub arguments:  Vec<Uuid>,
  pub cached:     f64,
}

/// Snapshot of the vertices needed to evaluate some targets, keyed by
/// logical id.
#[derive(Debug, Clone, Default)]
pub struct ScoreGraph {
  pub claims:    HashMap<Uuid, ClaimNode>,
  pub arguments: HashMap<Uuid, ArgumentNode>,
}

/// Computed `truthRU` per claim and `strengthRU` per argument.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Aggregates {
  pub truth_ru:    HashMap<Uuid, f64>,
  pub strength_ru: HashMap<Uuid, f64>,
}

impl ScoreGraph {
  /// Evaluate every vertex in the snapshot.
  pub fn evaluate(&self) -> Aggregates {
    let mut eval = Evaluator::new(self);
    let mut out = Aggregates::default();

    let mut claims: Vec<Uuid> = self.claims.keys().copied().collect();
    claims.sort_unstable();
    for id in claims {
      out.truth_ru.insert(id, eval.truth_ru(id));
    }

    let mut arguments: Vec<Uuid> = self.arguments.keys().copied().collect();
    arguments.sort_unstable();
    for id in arguments {
      out.strength_ru.insert(id, eval.strength_ru(id));
    }
    out
  }

  pub fn truth_ru(&self, claim: Uuid) -> f64 { Evaluator::new(self).truth_ru(claim) }

  pub fn strength_ru(&self, argument: Uuid) -> f64 { Evaluator::new(self).strength_ru(argument) }
}

struct Evaluator<'g> {
  graph:         &'g ScoreGraph,
  visiting:      HashSet<Uuid>,
  /// Number of cycle short-circuits so far.
  cuts:          usize,
  truth_memo:    HashMap<Uuid, f64>,
  strength_memo: HashMap<Uuid, f64>,
}

impl<'g> Evaluator<'g> {
  fn new(graph: &'g ScoreGraph) -> Self {
    Self {
      graph,
      visiting: HashSet::new(),
      cuts: 0,
      truth_memo: HashMap::new(),
      strength_memo: HashMap::new(),
    }
  }

  fn truth_ru(&mut self, id: Uuid) -> f64 {
    if let Some(v) = self.truth_memo.get(&id) {
      return *v;
    }
    let graph = self.graph;
    let Some(node) = graph.claims.get(&id) else { return 0.0 };
    if !self.visiting.insert(id) {
      self.cuts += 1;
      return node.cached;
    }

    let cuts = self.cuts;
    let value = match self.combine(&node.arguments) {
      Some(v) => v,
      None => self.base_truth(node),
    };

    self.visiting.remove(&id);
    if self.cuts == cuts {
      self.truth_memo.insert(id, value);
    }
    value
  }

  fn base_truth(&mut self, node: &ClaimNode) -> f64 {
    if !node.multi_premise || node.premises.is_empty() {
      return node.truth;
    }
    let premises: Vec<f64> = node.premises.iter().map(|p| self.truth_ru(*p)).collect();
    match node.premise_rule {
      PremiseRule::All => premises.iter().product(),
      PremiseRule::Any => 1.0 - premises.iter().map(|t| 1.0 - t).product::<f64>(),
      PremiseRule::AnyTwo => at_least_two(&premises),
      PremiseRule::None => node.truth,
    }
  }

  fn strength_ru(&mut self, id: Uuid) -> f64 {
    if let Some(v) = self.strength_memo.get(&id) {
      return *v;
    }
    let graph = self.graph;
    let Some(node) = graph.arguments.get(&id) else { return 0.0 };
    if !self.visiting.insert(id) {
      self.cuts += 1;
      return node.cached;
    }

    let cuts = self.cuts;
    let value = self.combine(&node.arguments).unwrap_or(node.strength);

    self.visiting.remove(&id);
    if self.cuts == cuts {
      self.strength_memo.insert(id, value);
    }
    value
  }

  fn score_ru(&mut self, argument: Uuid) -> Option<(bool, f64)> {
    let node = self.graph.arguments.get(&argument)?;
    let (pro, base) = (node.pro, node.base_claim);
    Some((pro, self.strength_ru(argument) * self.truth_ru(base)))
  }

  /// `None` when there are no (known) arguments to combine.
  fn combine(&mut self, arguments: &[Uuid]) -> Option<f64> {
    let scores: Vec<(bool, f64)> = arguments.iter().filter_map(|a| self.score_ru(*a)).collect();
    if scores.is_empty() {
      return None;
    }
    let side = |pro: bool| {
      1.0
        - scores
          .iter()
          .filter(|(p, _)| *p == pro)
          .map(|(_, s)| 1.0 - s)
          .product::<f64>()
    };
    Some(0.5 + 0.5 * (side(true) - side(false)))
  }
}

/// Probability that at least two of the independent events hold.
fn at_least_two(p: &[f64]) -> f64 {
  // Distribution over "how many hold so far", truncated at two.
  let mut dist = [1.0, 0.0, 0.0];
  for &t in p {
    dist = [
      dist[0] * (1.0 - t),
      dist[1] * (1.0 - t) + dist[0] * t,
      dist[2] + dist[1] * t,
    ];
  }
  dist[2]
}

#![forbid(unsafe_code)]

//! Compile-time plan validation.
//!
//! Structural errors (bad links, cycles, parse failures) are fatal and are
//! raised by the planner. This module only produces advisory warnings for
//! plans that are valid but likely to be expensive against a real endpoint.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::query::planner::ExecutionPlan;

/// Thresholds above which a plan draws warnings.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationLimits {
    /// Maximum number of steps in a single path expression.
    pub max_path_depth: usize,
    /// Maximum number of subqueries along one chain of child links.
    pub max_link_depth: usize,
    /// Maximum number of child links on one subquery.
    pub max_child_links: usize,
}

impl Default for ValidationLimits {
    fn default() -> Self {
        Self {
            max_path_depth: 4,
            max_link_depth: 3,
            max_child_links: 2,
        }
    }
}

/// Category of a [`PlanWarning`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanWarningKind {
    /// Path expression has more steps than allowed.
    DeepPath,
    /// Chain of linked subqueries is longer than allowed.
    DeepLinks,
    /// Subquery links more children than allowed.
    WideBranching,
}

impl PlanWarningKind {
    /// Stable machine-readable code.
    pub fn code(self) -> &'static str {
        match self {
            PlanWarningKind::DeepPath => "DeepPath",
            PlanWarningKind::DeepLinks => "DeepLinks",
            PlanWarningKind::WideBranching => "WideBranching",
        }
    }
}

/// Advisory finding about an otherwise valid plan.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanWarning {
    /// Warning category.
    pub kind: PlanWarningKind,
    /// Subquery the warning is attached to.
    pub subquery_id: String,
    /// Human-readable detail.
    pub message: String,
}

impl fmt::Display for PlanWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.kind.code(), self.subquery_id, self.message)
    }
}

/// Produces warnings for `plan` in declaration order.
pub fn validate(plan: &ExecutionPlan, limits: &ValidationLimits) -> Vec<PlanWarning> {
    let mut warnings = Vec::new();
    for subquery in plan.subqueries() {
        if subquery.steps.len() > limits.max_path_depth {
            warnings.push(PlanWarning {
                kind: PlanWarningKind::DeepPath,
                subquery_id: subquery.id.clone(),
                message: format!(
                    "path '{}' has {} steps (limit {})",
                    subquery.path,
                    subquery.steps.len(),
                    limits.max_path_depth
                ),
            });
        }
        if subquery.children.len() > limits.max_child_links {
            warnings.push(PlanWarning {
                kind: PlanWarningKind::WideBranching,
                subquery_id: subquery.id.clone(),
                message: format!(
                    "{} child links (limit {})",
                    subquery.children.len(),
                    limits.max_child_links
                ),
            });
        }
    }
    let mut depths = HashMap::new();
    for root in plan.roots() {
        let depth = link_depth(plan, root, &mut depths);
        if depth > limits.max_link_depth {
            warnings.push(PlanWarning {
                kind: PlanWarningKind::DeepLinks,
                subquery_id: root.clone(),
                message: format!(
                    "linked subquery chain is {depth} deep (limit {})",
                    limits.max_link_depth
                ),
            });
        }
    }
    warnings
}

/// Longest chain of subqueries starting at `id`. The plan is acyclic, so the
/// recursion terminates.
fn link_depth<'a>(plan: &'a ExecutionPlan, id: &'a str, memo: &mut HashMap<&'a str, usize>) -> usize {
    if let Some(depth) = memo.get(id) {
        return *depth;
    }
    let depth = plan
        .subquery(id)
        .map(|subquery| {
            1 + subquery
                .children
                .iter()
                .map(|child| link_depth(plan, child, memo))
                .max()
                .unwrap_or(0)
        })
        .unwrap_or(0);
    memo.insert(id, depth);
    depth
}

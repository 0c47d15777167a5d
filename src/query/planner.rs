//! Plan compiler: turns a [`QueryDefinition`] into an immutable
//! [`ExecutionPlan`].
//!
//! Compilation parses every path expression, checks that each child link
//! names a subquery of the same query, rejects cyclic links and computes the
//! root subqueries. All structural problems surface here, before any run.

use std::collections::{HashMap, HashSet};
use std::hash::Hasher;

use tracing::{info, warn};
use xxhash_rust::xxh64::Xxh64;

use crate::graph::PathRules;
use crate::query::ast::{render_steps, CompiledStep};
use crate::query::definition::{PropertySpec, QueryDefinition};
use crate::query::errors::PlanError;
use crate::query::path;
use crate::query::validate::{self, PlanWarning, ValidationLimits};

/// Planner inputs that do not come from the query definition itself.
#[derive(Clone, Debug, Default)]
pub struct PlannerConfig {
    /// Thresholds for advisory warnings.
    pub limits: ValidationLimits,
    /// Fetch parameters keyed by executed path prefix.
    pub rules: PathRules,
}

/// Compiled form of one subquery.
#[derive(Clone, Debug)]
pub struct SubqueryPlan {
    /// Subquery identifier.
    pub id: String,
    /// Path expression as written.
    pub path: String,
    /// Compiled steps.
    pub steps: Vec<CompiledStep>,
    /// Properties to extract from each final node.
    pub properties: Vec<PropertySpec>,
    /// Linked child subqueries, duplicates removed, declaration order kept.
    pub children: Vec<String>,
}

/// Immutable, validated plan for one query. Safe to share across concurrent
/// runs.
#[derive(Clone, Debug)]
pub struct ExecutionPlan {
    query_id: String,
    subqueries: Vec<SubqueryPlan>,
    index: HashMap<String, usize>,
    roots: Vec<String>,
    rules: PathRules,
    warnings: Vec<PlanWarning>,
    plan_hash: u64,
}

impl ExecutionPlan {
    /// Query identifier.
    pub fn query_id(&self) -> &str {
        &self.query_id
    }

    /// Subqueries in declaration order.
    pub fn subqueries(&self) -> &[SubqueryPlan] {
        &self.subqueries
    }

    /// Looks up a subquery by id.
    pub fn subquery(&self, id: &str) -> Option<&SubqueryPlan> {
        self.index.get(id).map(|idx| &self.subqueries[*idx])
    }

    /// Subqueries not linked from any other subquery, in declaration order.
    pub fn roots(&self) -> &[String] {
        &self.roots
    }

    /// Fetch parameter rules applied during traversal.
    pub fn rules(&self) -> &PathRules {
        &self.rules
    }

    /// Advisory warnings computed at compile time.
    pub fn warnings(&self) -> &[PlanWarning] {
        &self.warnings
    }

    /// Deterministic hash of the compiled plan.
    pub fn plan_hash(&self) -> u64 {
        self.plan_hash
    }

    /// Human-readable explain tree.
    pub fn explain(&self) -> PlanExplain {
        let mut root = ExplainNode::new("Query");
        root.props.push(ExplainProp::plain("id", &self.query_id));
        for id in &self.roots {
            if let Some(node) = self.explain_subquery(id) {
                root.inputs.push(node);
            }
        }
        PlanExplain {
            root,
            plan_hash: self.plan_hash,
        }
    }

    fn explain_subquery(&self, id: &str) -> Option<ExplainNode> {
        let subquery = self.subquery(id)?;
        let mut node = ExplainNode::new("Subquery");
        node.props.push(ExplainProp::plain("id", &subquery.id));
        node.props.push(ExplainProp::literal("path", &subquery.path));
        if !subquery.properties.is_empty() {
            let names: Vec<&str> = subquery.properties.iter().map(|p| p.name.as_str()).collect();
            node.props.push(ExplainProp::plain("extract", names.join(", ")));
        }
        for step in &subquery.steps {
            let mut step_node = ExplainNode::new("Step");
            step_node
                .props
                .push(ExplainProp::plain("select", step.selector.to_string()));
            if let Some(predicate) = &step.predicate {
                step_node
                    .props
                    .push(ExplainProp::literal("filter", predicate.to_string()));
            }
            node.inputs.push(step_node);
        }
        for child in &subquery.children {
            if let Some(child_node) = self.explain_subquery(child) {
                node.inputs.push(child_node);
            }
        }
        Some(node)
    }
}

/// Explain tree plus the plan hash it was produced from.
#[derive(Clone, Debug)]
pub struct PlanExplain {
    /// Root node of the explain tree.
    pub root: ExplainNode,
    /// Deterministic hash for the plan.
    pub plan_hash: u64,
}

impl PlanExplain {
    /// Renders the tree with two-space indentation.
    pub fn render(&self) -> String {
        self.render_with(false)
    }

    /// Renders the tree with literal values (paths, filters) masked.
    pub fn render_redacted(&self) -> String {
        self.render_with(true)
    }

    fn render_with(&self, redact: bool) -> String {
        let mut out = format!("plan_hash={:016x}\n", self.plan_hash);
        render_node(&self.root, 0, redact, &mut out);
        out
    }
}

fn render_node(node: &ExplainNode, depth: usize, redact: bool, out: &mut String) {
    out.push_str(&"  ".repeat(depth));
    out.push_str(&node.op);
    for prop in &node.props {
        let value = if redact && prop.redactable {
            "<redacted>"
        } else {
            prop.value.as_str()
        };
        out.push_str(&format!(" {}={}", prop.key, value));
    }
    out.push('\n');
    for input in &node.inputs {
        render_node(input, depth + 1, redact, out);
    }
}

/// Explain node representing a plan element with optional metadata.
#[derive(Clone, Debug)]
pub struct ExplainNode {
    /// Element name.
    pub op: String,
    /// Properties describing the element.
    pub props: Vec<ExplainProp>,
    /// Nested elements.
    pub inputs: Vec<ExplainNode>,
}

impl ExplainNode {
    /// Creates a new explain node with the given element name.
    pub fn new(op: impl Into<String>) -> Self {
        Self {
            op: op.into(),
            props: Vec::new(),
            inputs: Vec::new(),
        }
    }

    /// Value of the first property named `key`.
    pub fn prop(&self, key: &str) -> Option<&str> {
        self.props
            .iter()
            .find(|prop| prop.key == key)
            .map(|prop| prop.value.as_str())
    }
}

/// Single property associated with an [`ExplainNode`].
#[derive(Clone, Debug)]
pub struct ExplainProp {
    /// Property key.
    pub key: String,
    /// Property value serialized for display.
    pub value: String,
    /// Whether this property contains literal data that may be redacted.
    pub redactable: bool,
}

impl ExplainProp {
    fn plain(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            redactable: false,
        }
    }

    fn literal(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            redactable: true,
        }
    }
}

/// Compiles query definitions into execution plans.
#[derive(Clone, Debug, Default)]
pub struct Planner {
    config: PlannerConfig,
}

impl Planner {
    /// Creates a planner with the given configuration.
    pub fn new(config: PlannerConfig) -> Self {
        Self { config }
    }

    /// Compiles `definition`, failing on the first structural error.
    pub fn plan(&self, definition: &QueryDefinition) -> Result<ExecutionPlan, PlanError> {
        if definition.subqueries.is_empty() {
            return Err(PlanError::EmptyQuery {
                query_id: definition.id.clone(),
            });
        }

        let mut index = HashMap::with_capacity(definition.subqueries.len());
        let mut subqueries = Vec::with_capacity(definition.subqueries.len());
        for subquery in &definition.subqueries {
            if index.contains_key(&subquery.id) {
                return Err(PlanError::DuplicateSubquery {
                    subquery_id: subquery.id.clone(),
                });
            }
            let steps = path::compile(&subquery.path).map_err(|source| PlanError::Parse {
                subquery_id: subquery.id.clone(),
                path: subquery.path.clone(),
                source,
            })?;
            let mut seen = HashSet::new();
            let children = subquery
                .children
                .iter()
                .filter(|child| seen.insert(child.as_str()))
                .cloned()
                .collect();
            index.insert(subquery.id.clone(), subqueries.len());
            subqueries.push(SubqueryPlan {
                id: subquery.id.clone(),
                path: subquery.path.clone(),
                steps,
                properties: subquery.properties.clone(),
                children,
            });
        }

        for subquery in &subqueries {
            if let Some(target) = subquery
                .children
                .iter()
                .find(|child| !index.contains_key(child.as_str()))
            {
                return Err(PlanError::InvalidLink {
                    subquery_id: subquery.id.clone(),
                    target: target.clone(),
                });
            }
        }
        detect_cycles(&subqueries, &index)?;

        let linked: HashSet<&str> = subqueries
            .iter()
            .flat_map(|s| s.children.iter().map(String::as_str))
            .collect();
        let roots = subqueries
            .iter()
            .filter(|s| !linked.contains(s.id.as_str()))
            .map(|s| s.id.clone())
            .collect();

        let mut plan = ExecutionPlan {
            query_id: definition.id.clone(),
            plan_hash: hash_plan(&definition.id, &subqueries),
            subqueries,
            index,
            roots,
            rules: self.config.rules.clone(),
            warnings: Vec::new(),
        };
        plan.warnings = validate::validate(&plan, &self.config.limits);
        for warning in &plan.warnings {
            warn!(
                query = %plan.query_id,
                subquery = %warning.subquery_id,
                kind = warning.kind.code(),
                detail = %warning.message,
                "planner.warning"
            );
        }
        info!(
            query = %plan.query_id,
            subqueries = plan.subqueries.len(),
            roots = plan.roots.len(),
            plan_hash = plan.plan_hash,
            "planner.compiled"
        );
        Ok(plan)
    }
}

/// Compiles `definition` with the default planner configuration.
pub fn compile(definition: &QueryDefinition) -> Result<ExecutionPlan, PlanError> {
    Planner::default().plan(definition)
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    Visiting,
    Done,
}

/// Depth-first search over child links. A link back to a subquery still on
/// the stack is a cycle; the reported cycle starts and ends at that subquery.
fn detect_cycles(subqueries: &[SubqueryPlan], index: &HashMap<String, usize>) -> Result<(), PlanError> {
    let mut marks = vec![Mark::Unvisited; subqueries.len()];
    let mut stack: Vec<usize> = Vec::new();
    for start in 0..subqueries.len() {
        if marks[start] == Mark::Unvisited {
            visit(start, subqueries, index, &mut marks, &mut stack)?;
        }
    }
    Ok(())
}

fn visit(
    node: usize,
    subqueries: &[SubqueryPlan],
    index: &HashMap<String, usize>,
    marks: &mut [Mark],
    stack: &mut Vec<usize>,
) -> Result<(), PlanError> {
    marks[node] = Mark::Visiting;
    stack.push(node);
    for child in &subqueries[node].children {
        let Some(&next) = index.get(child) else {
            continue;
        };
        match marks[next] {
            Mark::Done => {}
            Mark::Unvisited => visit(next, subqueries, index, marks, stack)?,
            Mark::Visiting => {
                let from = stack.iter().position(|idx| *idx == next).unwrap_or(0);
                let mut cycle: Vec<String> = stack[from..]
                    .iter()
                    .map(|idx| subqueries[*idx].id.clone())
                    .collect();
                cycle.push(subqueries[next].id.clone());
                return Err(PlanError::CyclicLink { cycle });
            }
        }
    }
    stack.pop();
    marks[node] = Mark::Done;
    Ok(())
}

fn hash_plan(query_id: &str, subqueries: &[SubqueryPlan]) -> u64 {
    let mut hasher = Xxh64::new(0);
    hasher.write(query_id.as_bytes());
    hasher.write_u64(subqueries.len() as u64);
    for subquery in subqueries {
        hasher.write(subquery.id.as_bytes());
        hasher.write(render_steps(&subquery.steps).as_bytes());
        hasher.write_u64(subquery.properties.len() as u64);
        for prop in &subquery.properties {
            hasher.write(prop.property.as_bytes());
            hasher.write(prop.name.as_bytes());
            hasher.write(prop.kind.to_string().as_bytes());
        }
        hasher.write_u64(subquery.children.len() as u64);
        for child in &subquery.children {
            hasher.write(child.as_bytes());
        }
    }
    hasher.finish()
}

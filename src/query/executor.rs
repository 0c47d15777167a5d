//! Traversal engine: executes compiled subqueries against the resource graph.
//!
//! Each subquery runs its steps once per context node. A step expands every
//! current node into candidate nodes, then the step's predicate filters the
//! candidates produced from that one node. Members of a collection that are
//! only links stay unresolved until the predicate needs their contents, so a
//! purely positional filter such as `[0]` fetches a single member.
//!
//! Fetch failures are local to the branch that hit them: the failing node is
//! dropped, the error becomes the subquery's status if it is the first one,
//! and every other branch keeps going. Scalar nodes have nothing to extract
//! and are dropped when the subquery asks for properties.

use std::sync::Arc;

use serde_json::Value as JsonValue;
use tracing::{trace, warn};

use crate::engine::context::RunContext;
use crate::graph::{link_target, FetchError, GetParams, PathRules, Resource, ResourceView};
use crate::query::ast::{CompiledStep, Predicate, Selector};
use crate::query::planner::{ExecutionPlan, SubqueryPlan};
use crate::query::predicate::evaluate;
use crate::query::profile::{profile_timer, record_profile_timer, QueryProfileKind};
use crate::query::result::{OutputBuilder, Status, SubqueryOutput};

/// Node a subquery starts from, tagged with the parent record it came from.
#[derive(Clone, Debug)]
pub struct ContextNode {
    /// Starting node.
    pub resource: Resource,
    /// Index of the parent subquery's record, `None` for root subqueries.
    pub parent_index: Option<usize>,
}

impl ContextNode {
    /// Context for a root subquery.
    pub fn root(resource: Resource) -> Self {
        Self {
            resource,
            parent_index: None,
        }
    }
}

/// Candidate produced by a step before filtering.
enum Slot {
    Resolved(Resource),
    Link { id: String, parent: Resource },
}

/// Node set of one branch plus the fetch errors hit while producing it.
#[derive(Default)]
struct Branch {
    nodes: Vec<Resource>,
    errors: Vec<FetchError>,
}

/// Executes subqueries of one plan within one run.
pub struct Executor<'r, 'a> {
    ctx: &'r RunContext<'a>,
    plan: &'r ExecutionPlan,
}

impl<'r, 'a> Executor<'r, 'a> {
    /// Binds a plan to a run.
    pub fn new(ctx: &'r RunContext<'a>, plan: &'r ExecutionPlan) -> Self {
        Self { ctx, plan }
    }

    /// Runs `subquery` from every context node, then its linked children from
    /// the nodes it matched.
    ///
    /// Children always get an output, even when this subquery matched
    /// nothing, so every planned subquery is present in the result.
    pub fn execute(&self, subquery: &SubqueryPlan, contexts: &[ContextNode]) -> SubqueryOutput {
        let query_id = self.ctx.query_id();
        if let Some(tracker) = self.ctx.tracker() {
            tracker.on_subquery_start(query_id, &subquery.id);
        }
        let mut builder = OutputBuilder::new();
        let mut matched: Vec<Resource> = Vec::new();

        for context in contexts {
            let start = profile_timer();
            let branch = self.run_steps(&subquery.steps, &context.resource);
            record_profile_timer(QueryProfileKind::Traverse, start);
            for err in &branch.errors {
                warn!(
                    query = %query_id,
                    subquery = %subquery.id,
                    context = context.resource.id().unwrap_or("<inline>"),
                    code = err.code(),
                    error = %err.message,
                    "traverse.branch_failed"
                );
                builder.fail(Status::from(err));
            }
            for node in branch.nodes {
                if !subquery.properties.is_empty() && matches!(node.view(), ResourceView::Scalar(_)) {
                    trace!(
                        query = %query_id,
                        subquery = %subquery.id,
                        "traverse.scalar_skipped"
                    );
                    continue;
                }
                let start = profile_timer();
                let normalized =
                    self.ctx
                        .normalizers()
                        .normalize(&node, &subquery.properties, context.parent_index);
                record_profile_timer(QueryProfileKind::Normalize, start);
                match normalized {
                    Ok(record) => {
                        builder.push(record);
                        matched.push(node);
                    }
                    Err(err) => {
                        warn!(
                            query = %query_id,
                            subquery = %subquery.id,
                            node = node.id().unwrap_or("<inline>"),
                            code = err.code(),
                            error = %err,
                            "traverse.normalize_failed"
                        );
                        builder.fail(Status::from(&err));
                    }
                }
            }
        }

        let mut output = builder.finish();
        trace!(
            query = %query_id,
            subquery = %subquery.id,
            records = output.data.len(),
            status = %output.status,
            "traverse.subquery_done"
        );
        if let Some(tracker) = self.ctx.tracker() {
            tracker.on_subquery_end(query_id, &subquery.id, &output.status);
        }

        let child_contexts: Vec<ContextNode> = matched
            .into_iter()
            .enumerate()
            .map(|(idx, resource)| ContextNode {
                resource,
                parent_index: Some(idx),
            })
            .collect();
        for child_id in &subquery.children {
            if let Some(child) = self.plan.subquery(child_id) {
                let child_output = self.execute(child, &child_contexts);
                output.children.insert(child_id.clone(), child_output);
            }
        }
        output
    }

    fn run_steps(&self, steps: &[CompiledStep], start: &Resource) -> Branch {
        let rules: &PathRules = self.plan.rules();
        let mut branch = Branch {
            nodes: vec![start.clone()],
            errors: Vec::new(),
        };
        let mut prefix = String::new();
        for step in steps {
            prefix.push('/');
            prefix.push_str(&step.selector.to_string());
            let params = rules.params_for(&prefix);
            let mut next = Vec::new();
            for node in &branch.nodes {
                let slots = self.expand(node, &step.selector, &prefix, &params, &mut branch.errors);
                let start = profile_timer();
                let selected = self.select(
                    slots,
                    step.predicate.as_ref(),
                    &prefix,
                    &params,
                    &mut branch.errors,
                );
                record_profile_timer(QueryProfileKind::Predicate, start);
                if step.selector == Selector::Ancestor {
                    // Siblings share one parent node.
                    for node in selected {
                        if !next.iter().any(|kept: &Resource| kept.same_node(&node)) {
                            next.push(node);
                        }
                    }
                } else {
                    next.extend(selected);
                }
            }
            trace!(step = %prefix, nodes = next.len(), "traverse.step");
            branch.nodes = next;
            if branch.nodes.is_empty() {
                break;
            }
        }
        branch
    }

    fn expand(
        &self,
        node: &Resource,
        selector: &Selector,
        prefix: &str,
        params: &GetParams,
        errors: &mut Vec<FetchError>,
    ) -> Vec<Slot> {
        match selector {
            Selector::Current => vec![Slot::Resolved(node.clone())],
            Selector::Ancestor => node
                .parent()
                .map(|parent| vec![Slot::Resolved(parent.clone())])
                .unwrap_or_default(),
            Selector::Child(name) => {
                let Some(value) = node
                    .properties()
                    .and_then(|props| props.get(name))
                    .filter(|value| !value.is_null())
                else {
                    return Vec::new();
                };
                match link_target(value) {
                    Some(id) => match self.ctx.fetch(id, prefix, params) {
                        Ok(payload) => {
                            let child = Resource::child(node, Some(id.to_owned()), payload);
                            expand_collection(child, node)
                        }
                        Err(err) => {
                            errors.push(err);
                            Vec::new()
                        }
                    },
                    None => match value {
                        JsonValue::Array(items) => members(items, node),
                        other => {
                            let child = Resource::child(node, None, Arc::new(other.clone()));
                            expand_collection(child, node)
                        }
                    },
                }
            }
            Selector::Wildcard => match node.view() {
                ResourceView::Collection(items) => members(items, node),
                ResourceView::Object(map) => {
                    let mut slots = Vec::new();
                    for (key, value) in map {
                        if key.contains('@') {
                            continue;
                        }
                        match value {
                            JsonValue::Array(items) => slots.extend(members(items, node)),
                            JsonValue::Object(_) => slots.push(slot_for(value, node)),
                            _ => {}
                        }
                    }
                    slots
                }
                ResourceView::Scalar(_) => Vec::new(),
            },
        }
    }

    fn select(
        &self,
        slots: Vec<Slot>,
        predicate: Option<&Predicate>,
        prefix: &str,
        params: &GetParams,
        errors: &mut Vec<FetchError>,
    ) -> Vec<Resource> {
        match predicate {
            None => self.resolve_all(slots, prefix, params, errors),
            Some(predicate) if predicate.is_positional() => {
                let len = slots.len();
                let kept = slots
                    .into_iter()
                    .enumerate()
                    .filter(|(position, _)| evaluate(predicate, None, *position, len))
                    .map(|(_, slot)| slot)
                    .collect();
                self.resolve_all(kept, prefix, params, errors)
            }
            Some(predicate) => {
                let resolved = self.resolve_all(slots, prefix, params, errors);
                let len = resolved.len();
                resolved
                    .into_iter()
                    .enumerate()
                    .filter(|(position, node)| evaluate(predicate, Some(node), *position, len))
                    .map(|(_, node)| node)
                    .collect()
            }
        }
    }

    fn resolve_all(
        &self,
        slots: Vec<Slot>,
        prefix: &str,
        params: &GetParams,
        errors: &mut Vec<FetchError>,
    ) -> Vec<Resource> {
        let mut nodes = Vec::with_capacity(slots.len());
        for slot in slots {
            match slot {
                Slot::Resolved(node) => nodes.push(node),
                Slot::Link { id, parent } => match self.ctx.fetch(&id, prefix, params) {
                    Ok(payload) => nodes.push(Resource::child(&parent, Some(id), payload)),
                    Err(err) => errors.push(err),
                },
            }
        }
        nodes
    }
}

/// A collection reached by a named step stands for its members, whose parent
/// is the node the step started from.
fn expand_collection(child: Resource, origin: &Resource) -> Vec<Slot> {
    if let ResourceView::Collection(items) = child.view() {
        return members(items, origin);
    }
    vec![Slot::Resolved(child)]
}

fn members(items: &[JsonValue], parent: &Resource) -> Vec<Slot> {
    items.iter().map(|item| slot_for(item, parent)).collect()
}

fn slot_for(value: &JsonValue, parent: &Resource) -> Slot {
    match link_target(value) {
        Some(id) => Slot::Link {
            id: id.to_owned(),
            parent: parent.clone(),
        },
        None => Slot::Resolved(Resource::child(parent, None, Arc::new(value.clone()))),
    }
}

#![forbid(unsafe_code)]

//! Predicate evaluation against resource nodes.
//!
//! Predicates never fail: a property that is absent, or whose type cannot be
//! compared with the literal, simply makes the term false for that node.

use std::cmp::Ordering;

use serde_json::Value as JsonValue;

use crate::graph::Resource;
use crate::query::ast::{CompareOp, Literal, Predicate, PredicateTerm};

/// Evaluates `predicate` for the node at `position` of a node set of length
/// `len`.
///
/// `node` may be `None` when the caller has not materialized the node yet;
/// only positional terms can hold in that case.
pub fn evaluate(predicate: &Predicate, node: Option<&Resource>, position: usize, len: usize) -> bool {
    match predicate {
        Predicate::Term(term) => evaluate_term(term, node, position, len),
        Predicate::And(parts) => parts.iter().all(|p| evaluate(p, node, position, len)),
        Predicate::Or(parts) => parts.iter().any(|p| evaluate(p, node, position, len)),
    }
}

fn evaluate_term(term: &PredicateTerm, node: Option<&Resource>, position: usize, len: usize) -> bool {
    match term {
        PredicateTerm::SelectAll => true,
        PredicateTerm::Index(idx) => *idx == position,
        PredicateTerm::Last => len > 0 && position == len - 1,
        PredicateTerm::Exists(path) => node.and_then(|n| n.property(path.segments())).is_some(),
        PredicateTerm::Compare {
            property,
            op,
            value,
        } => node
            .and_then(|n| n.property(property.segments()))
            .is_some_and(|actual| compare(actual, *op, value)),
    }
}

/// Compares a JSON property value with a literal.
pub fn compare(actual: &JsonValue, op: CompareOp, literal: &Literal) -> bool {
    match literal {
        Literal::Number(expected) => numeric(actual)
            .and_then(|n| n.partial_cmp(expected))
            .is_some_and(|ordering| ordering_matches(ordering, op)),
        Literal::String(expected) => match actual {
            JsonValue::String(s) => ordering_matches(s.as_str().cmp(expected.as_str()), op),
            _ => false,
        },
        Literal::Bool(expected) => match actual {
            JsonValue::Bool(b) => equality_matches(b == expected, op),
            _ => false,
        },
        Literal::Null => equality_matches(actual.is_null(), op),
    }
}

fn numeric(value: &JsonValue) -> Option<f64> {
    match value {
        JsonValue::Number(n) => n.as_f64(),
        JsonValue::String(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        _ => None,
    }
}

fn ordering_matches(ordering: Ordering, op: CompareOp) -> bool {
    match op {
        CompareOp::Eq => ordering == Ordering::Equal,
        CompareOp::Ne => ordering != Ordering::Equal,
        CompareOp::Lt => ordering == Ordering::Less,
        CompareOp::Le => ordering != Ordering::Greater,
        CompareOp::Gt => ordering == Ordering::Greater,
        CompareOp::Ge => ordering != Ordering::Less,
    }
}

fn equality_matches(equal: bool, op: CompareOp) -> bool {
    match op {
        CompareOp::Eq => equal,
        CompareOp::Ne => !equal,
        _ => false,
    }
}

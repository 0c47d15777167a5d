//! Property tests for path compilation and predicate evaluation.

#![allow(missing_docs)]

use std::sync::Arc;

use proptest::prelude::*;
use redpath::graph::{JsonMockup, Resource};
use redpath::engine::{EngineOptions, QueryEngine};
use redpath::query::ast::{render_steps, CompareOp, Literal, Predicate, PredicateTerm};
use redpath::query::predicate::{compare, evaluate};
use redpath::query::{path, QueryDefinition, StatusCode, SubqueryDefinition, Value};
use serde_json::{json, Value as JsonValue};

fn arb_member() -> impl Strategy<Value = JsonValue> {
    prop_oneof![
        (any::<i32>(), "[a-z]{1,6}").prop_map(|(n, s)| json!({ "Value": n, "Name": s })),
        "[a-z]{1,6}".prop_map(|s| json!({ "Name": s })),
        any::<bool>().prop_map(|b| json!({ "Value": b })),
        Just(json!({ "Value": null })),
        (any::<i32>()).prop_map(|n| json!({ "Value": n.to_string() })),
    ]
}

fn arb_op() -> impl Strategy<Value = CompareOp> {
    prop_oneof![
        Just(CompareOp::Eq),
        Just(CompareOp::Ne),
        Just(CompareOp::Lt),
        Just(CompareOp::Le),
        Just(CompareOp::Gt),
        Just(CompareOp::Ge),
    ]
}

fn numeric(value: &JsonValue) -> Option<f64> {
    match value {
        JsonValue::Number(n) => n.as_f64(),
        JsonValue::String(s) => s.parse().ok(),
        _ => None,
    }
}

proptest! {
    #[test]
    fn compile_is_deterministic_and_canonical(
        names in prop::collection::vec("[A-Z][a-zA-Z]{0,8}", 1..5),
        index in 0usize..10,
    ) {
        let expr = format!("/{}[{index}]", names.join("/"));
        let first = path::compile(&expr).expect("compiles");
        let second = path::compile(&expr).expect("compiles");
        prop_assert_eq!(&first, &second);
        let canonical = render_steps(&first);
        prop_assert_eq!(path::compile(&canonical).expect("canonical compiles"), first);
    }

    #[test]
    fn numeric_comparison_matches_f64_ordering(
        members in prop::collection::vec(arb_member(), 0..12),
        op in arb_op(),
        threshold in -1000i32..1000,
    ) {
        let literal = Literal::Number(f64::from(threshold));
        for member in &members {
            let actual = &member["Value"];
            let expected = numeric(actual).is_some_and(|n| {
                let t = f64::from(threshold);
                match op {
                    CompareOp::Eq => n == t,
                    CompareOp::Ne => n != t,
                    CompareOp::Lt => n < t,
                    CompareOp::Le => n <= t,
                    CompareOp::Gt => n > t,
                    CompareOp::Ge => n >= t,
                }
            });
            prop_assert_eq!(compare(actual, op, &literal), expected);
        }
    }

    #[test]
    fn negated_comparisons_partition_comparable_nodes(
        members in prop::collection::vec(arb_member(), 0..12),
        threshold in -1000i32..1000,
    ) {
        let root = Resource::root("/", Arc::new(json!({})));
        let len = members.len();
        for (position, member) in members.iter().enumerate() {
            let node = Resource::child(&root, None, Arc::new(member.clone()));
            let term = |op| Predicate::Term(PredicateTerm::Compare {
                property: redpath::query::ast::PropertyPath(vec!["Value".to_owned()]),
                op,
                value: Literal::Number(f64::from(threshold)),
            });
            let lt = evaluate(&term(CompareOp::Lt), Some(&node), position, len);
            let ge = evaluate(&term(CompareOp::Ge), Some(&node), position, len);
            prop_assert!(!(lt && ge));
            prop_assert_eq!(lt || ge, numeric(&member["Value"]).is_some());
        }
    }

    #[test]
    fn index_and_last_select_exactly_one_member(
        members in prop::collection::vec(arb_member(), 1..10),
        pick in any::<prop::sample::Index>(),
    ) {
        let index = pick.index(members.len());
        let links: Vec<JsonValue> = (0..members.len())
            .map(|i| json!({ "@odata.id": format!("/redfish/v1/Items/{i}") }))
            .collect();
        let mut accessor = JsonMockup::new()
            .with_resource("/redfish/v1", json!({ "Items": { "@odata.id": "/redfish/v1/Items" } }))
            .with_resource("/redfish/v1/Items", json!({ "Members": links }));
        for (i, member) in members.iter().enumerate() {
            let mut payload = member.clone();
            payload["Position"] = json!(i);
            accessor = accessor.with_resource(format!("/redfish/v1/Items/{i}"), payload);
        }
        let query = QueryDefinition::new("q")
            .with_subquery(SubqueryDefinition::new("picked", format!("/Items[{index}]")).with_properties(["Position"]))
            .with_subquery(SubqueryDefinition::new("last", "/Items[last]").with_properties(["Position"]))
            .with_subquery(SubqueryDefinition::new("all", "/Items[*]"));
        let accessor = Arc::new(accessor);
        let engine = QueryEngine::new([query], accessor.clone(), EngineOptions::default())
            .expect("plan compiles");
        let result = engine.run("q").expect("run succeeds");

        let picked = &result.subquery_outputs["picked"];
        prop_assert_eq!(picked.status.code, StatusCode::Ok);
        prop_assert_eq!(picked.data.len(), 1);
        prop_assert_eq!(picked.data[0].get("Position"), Some(&Value::Int(index as i64)));
        let last = &result.subquery_outputs["last"];
        prop_assert_eq!(last.data[0].get("Position"), Some(&Value::Int(members.len() as i64 - 1)));
        prop_assert_eq!(result.subquery_outputs["all"].data.len(), members.len());
        for i in 0..members.len() {
            prop_assert_eq!(accessor.fetch_count(&format!("/redfish/v1/Items/{i}")), 1);
        }
    }
}

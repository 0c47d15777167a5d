//! End-to-end query runs against the in-memory service fixture.
//!
//! Covers linked subqueries and parent association, predicate forms,
//! wildcard and ancestor steps, typed extraction, the normalization chain,
//! per-path fetch rules and tracker events.

#![allow(missing_docs)]

mod common;

use std::sync::Arc;

use redpath::engine::{EngineConfig, EngineOptions, QueryEngine, RecordingTracker, TrackerEvent};
use redpath::graph::{ExpandKind, ExpandParams, GetParams};
use redpath::normalize::{IdentifierDecorator, NormalizerChain, PartLocationResolver, UriDecorator};
use redpath::query::{
    PlanError, PropertySpec, PropertyType, QueryDefinition, QueryResult, StatusCode, SubqueryDefinition, Value,
};

use redpath::EngineError;

use common::{service, BACKPLANE, CHASSIS, TRAY};

fn run_one(definition: QueryDefinition, options: EngineOptions) -> QueryResult {
    let id = definition.id.clone();
    let engine = QueryEngine::new([definition], Arc::new(service()), options).expect("plan compiles");
    engine.run(&id).expect("run succeeds")
}

fn names(result: &QueryResult, subquery: &str) -> Vec<String> {
    result
        .find(subquery)
        .expect("subquery present")
        .data
        .iter()
        .filter_map(|record| match record.get("Name") {
            Some(Value::String(name)) => Some(name.clone()),
            _ => None,
        })
        .collect()
}

#[test]
fn linked_children_carry_parent_index() {
    let query = QueryDefinition::new("SensorCollector")
        .with_subquery(
            SubqueryDefinition::new("chassis", "/Chassis[*]")
                .with_properties(["Id", "Name"])
                .with_child("sensors"),
        )
        .with_subquery(
            SubqueryDefinition::new("sensors", "/Sensors[*]").with_properties(["Name", "Reading"]),
        );
    let result = run_one(query, EngineOptions::default());

    assert_eq!(result.query_id, "SensorCollector");
    assert_eq!(result.subquery_outputs.len(), 1, "only roots at top level");
    let chassis = &result.subquery_outputs["chassis"];
    assert_eq!(chassis.status.code, StatusCode::Ok);
    assert_eq!(names(&result, "chassis"), vec!["Tray", "Backplane"]);

    let sensors = &chassis.children["sensors"];
    assert_eq!(sensors.status.code, StatusCode::Ok);
    let parents: Vec<Option<usize>> = sensors.data.iter().map(|r| r.parent_index).collect();
    assert_eq!(parents, vec![Some(0), Some(0), Some(1)]);
    assert_eq!(names(&result, "sensors"), vec!["CPU0 Temp", "Fan0", "BP Temp"]);
    assert_eq!(sensors.data[0].get("Reading"), Some(&Value::Float(45.5)));
    assert_eq!(sensors.data[1].get("Reading"), Some(&Value::Int(3200)));
    assert!(chassis.data.iter().all(|record| record.parent_index.is_none()));
}

#[test]
fn predicate_forms_filter_per_context() {
    let query = QueryDefinition::new("Predicates")
        .with_subquery(
            SubqueryDefinition::new("enabled", "/Chassis[Status.State=Enabled]").with_properties(["Name"]),
        )
        .with_subquery(
            SubqueryDefinition::new("healthy", "/Chassis[Status.Health]").with_properties(["Name"]),
        )
        .with_subquery(SubqueryDefinition::new("last", "/Chassis[last()]").with_properties(["Name"]))
        .with_subquery(
            SubqueryDefinition::new("either", "/Chassis[ChassisType='Component' or Id=1]")
                .with_properties(["Name"]),
        )
        .with_subquery(
            SubqueryDefinition::new("big_cpus", "/Systems[*]/Processors[TotalCores>8]")
                .with_properties(["Id"]),
        )
        .with_subquery(
            SubqueryDefinition::new("first_sensor", "/Chassis[*]/Sensors[0]").with_properties(["Name"]),
        )
        .with_subquery(SubqueryDefinition::new("out_of_range", "/Chassis[7]").with_properties(["Name"]));
    let result = run_one(query, EngineOptions::default());

    assert_eq!(names(&result, "enabled"), vec!["Tray"]);
    assert_eq!(names(&result, "healthy"), vec!["Tray"]);
    assert_eq!(names(&result, "last"), vec!["Backplane"]);
    assert_eq!(names(&result, "either"), vec!["Tray", "Backplane"]);
    let cpus = &result.subquery_outputs["big_cpus"].data;
    assert_eq!(cpus.len(), 1);
    assert_eq!(cpus[0].get("Id"), Some(&Value::from("1")));
    // Index predicates apply to each chassis' own sensor set.
    assert_eq!(names(&result, "first_sensor"), vec!["CPU0 Temp", "BP Temp"]);
    assert!(result.subquery_outputs["out_of_range"].data.is_empty());
    assert!(result.subquery_outputs.values().all(|output| output.status.is_ok()));
}

#[test]
fn cyclic_links_prevent_construction() {
    let query = QueryDefinition::new("Cycle")
        .with_subquery(SubqueryDefinition::new("a", "/Chassis").with_child("b"))
        .with_subquery(SubqueryDefinition::new("b", "/Sensors").with_child("a"));
    match QueryEngine::new([query], Arc::new(service()), EngineOptions::default()) {
        Err(EngineError::Plan(PlanError::CyclicLink { cycle })) => {
            assert_eq!(cycle.first(), cycle.last());
            assert!(cycle.contains(&"a".to_owned()) && cycle.contains(&"b".to_owned()));
        }
        other => panic!("expected cyclic link error, got {other:?}"),
    }
}

#[test]
fn inline_objects_wildcards_and_ancestors() {
    let query = QueryDefinition::new("Shapes")
        .with_subquery(
            SubqueryDefinition::new("boot", "/Systems[*]/Boot")
                .with_properties(["BootSourceOverrideEnabled"]),
        )
        .with_subquery(
            SubqueryDefinition::new("status_owner", "/Chassis[*]/Status/..").with_properties(["Name"]),
        )
        .with_subquery(SubqueryDefinition::new("states", "/Chassis[0]/*").with_properties(["State"]))
        .with_subquery(SubqueryDefinition::new("current", "/Chassis[1]/.").with_properties(["Name"]))
        .with_subquery(SubqueryDefinition::new("orphan", "/..").with_properties(["Id"]));
    let result = run_one(query, EngineOptions::default());

    let boot = &result.subquery_outputs["boot"].data;
    assert_eq!(boot.len(), 1);
    assert_eq!(boot[0].get("BootSourceOverrideEnabled"), Some(&Value::from("Disabled")));
    assert_eq!(names(&result, "status_owner"), vec!["Tray", "Backplane"]);
    // Tray's object-valued children: Location, Sensors (a link) and Status.
    let states = &result.subquery_outputs["states"].data;
    assert_eq!(states.len(), 3);
    assert_eq!(
        states.iter().filter(|r| r.get("State") == Some(&Value::from("Enabled"))).count(),
        1
    );
    assert_eq!(names(&result, "current"), vec!["Backplane"]);
    let orphan = &result.subquery_outputs["orphan"];
    assert!(orphan.status.is_ok());
    assert!(orphan.data.is_empty());
}

#[test]
fn ancestor_steps_collapse_shared_parents() {
    let query = QueryDefinition::new("SensorOwners")
        .with_subquery(
            SubqueryDefinition::new("owners", "/Chassis[*]/Sensors[*]/..")
                .with_properties(["Name"])
                .with_child("owned"),
        )
        .with_subquery(SubqueryDefinition::new("owned", "/Sensors[*]").with_properties(["Name"]));
    let result = run_one(query, EngineOptions::default());

    assert_eq!(names(&result, "owners"), vec!["Tray", "Backplane"]);
    let owned = &result.subquery_outputs["owners"].children["owned"];
    assert_eq!(names(&result, "owned"), vec!["CPU0 Temp", "Fan0", "BP Temp"]);
    let parents: Vec<Option<usize>> = owned.data.iter().map(|r| r.parent_index).collect();
    assert_eq!(parents, vec![Some(0), Some(0), Some(1)]);
}

#[test]
fn null_and_scalar_children_are_not_failures() {
    let accessor = service().with_resource(
        BACKPLANE,
        serde_json::json!({
            "@odata.id": BACKPLANE,
            "Id": "2",
            "Name": "Backplane",
            "Location": null,
        }),
    );
    let query = QueryDefinition::new("Labels")
        .with_subquery(
            SubqueryDefinition::new("labels", "/Chassis[*]/Location")
                .with_properties(["PartLocation.ServiceLabel"]),
        )
        .with_subquery(SubqueryDefinition::new("names", "/Chassis[*]/Name").with_properties(["Id"]))
        .with_subquery(SubqueryDefinition::new("bare_names", "/Chassis[*]/Name"));
    let engine =
        QueryEngine::new([query], Arc::new(accessor), EngineOptions::default()).expect("plan compiles");
    let result = engine.run("Labels").expect("run succeeds");

    let labels = &result.subquery_outputs["labels"];
    assert_eq!(labels.status.code, StatusCode::Ok);
    assert_eq!(labels.data.len(), 1);
    assert_eq!(
        labels.data[0].get("PartLocation.ServiceLabel"),
        Some(&Value::from("Tray 1"))
    );
    let scalars = &result.subquery_outputs["names"];
    assert_eq!(scalars.status.code, StatusCode::Ok);
    assert!(scalars.data.is_empty());
    // Without requested properties the scalar still counts as a match.
    assert_eq!(result.subquery_outputs["bare_names"].data.len(), 2);
}

#[test]
fn missing_children_yield_empty_outputs_for_the_whole_subtree() {
    let query = QueryDefinition::new("Drives")
        .with_subquery(
            SubqueryDefinition::new("drives", "/Chassis[*]/Drives[*]")
                .with_properties(["Name"])
                .with_child("volumes"),
        )
        .with_subquery(SubqueryDefinition::new("volumes", "/Volumes").with_properties(["Name"]));
    let result = run_one(query, EngineOptions::default());

    let drives = &result.subquery_outputs["drives"];
    assert_eq!(drives.status.code, StatusCode::Ok);
    assert!(drives.data.is_empty());
    let volumes = &drives.children["volumes"];
    assert_eq!(volumes.status.code, StatusCode::Ok);
    assert!(volumes.data.is_empty());
    assert_eq!(
        result.subquery_ids().into_iter().collect::<Vec<_>>(),
        vec!["drives".to_owned(), "volumes".to_owned()]
    );
}

#[test]
fn typed_extraction_omits_mismatches() {
    let query = QueryDefinition::new("Typed").with_subquery(
        SubqueryDefinition::new("sensors", "/Chassis[0]/Sensors[*]")
            .with_property(PropertySpec::new("Reading").named("reading_int").typed(PropertyType::Int64))
            .with_property(PropertySpec::new("Reading").named("reading_f").typed(PropertyType::Double))
            .with_property(PropertySpec::new("ReadingUnits").named("units").typed(PropertyType::String))
            .with_property(PropertySpec::new("Name").typed(PropertyType::Boolean)),
    );
    let result = run_one(query, EngineOptions::default());
    let data = &result.subquery_outputs["sensors"].data;
    assert_eq!(data.len(), 2);

    let temp = &data[0];
    assert_eq!(temp.get("reading_int"), None);
    assert_eq!(temp.get("reading_f"), Some(&Value::Float(45.5)));
    assert_eq!(temp.get("units"), Some(&Value::from("Cel")));
    assert_eq!(temp.get("Name"), None);

    let fan = &data[1];
    assert_eq!(fan.get("reading_int"), Some(&Value::Int(3200)));
    assert_eq!(fan.get("reading_f"), Some(&Value::Float(3200.0)));
    assert_eq!(fan.get("units"), None);
}

#[test]
fn normalization_chain_decorates_records() {
    let chain = NormalizerChain::with_defaults()
        .then(IdentifierDecorator::new(PartLocationResolver))
        .then(UriDecorator::default());
    let query = QueryDefinition::new("Decorated").with_subquery(
        SubqueryDefinition::new("chassis", "/Chassis").with_properties(["Name"]),
    );
    let result = run_one(query, EngineOptions::default().with_normalizers(chain));
    let data = &result.subquery_outputs["chassis"].data;

    assert_eq!(data[0].get("devpath"), Some(&Value::from("Tray 1")));
    assert_eq!(data[0].get("uri"), Some(&Value::from(TRAY)));
    assert_eq!(data[1].get("devpath"), None);
    assert_eq!(data[1].get("uri"), Some(&Value::from(BACKPLANE)));
}

#[test]
fn path_rules_expand_collections_and_reach_the_tracker() {
    let config = EngineConfig::from_toml_str(
        r#"
        [[query_rules.Expanded]]
        path = "/Chassis"
        expand = { kind = "not_links", levels = 1 }
        "#,
    )
    .expect("config parses");
    let accessor = Arc::new(service());
    let tracker = Arc::new(RecordingTracker::new());
    let query = QueryDefinition::new("Expanded").with_subquery(
        SubqueryDefinition::new("chassis", "/Chassis[*]").with_properties(["Name"]),
    );
    let engine = QueryEngine::new(
        [query],
        accessor.clone(),
        EngineOptions::default()
            .with_config(config)
            .with_tracker(tracker.clone()),
    )
    .expect("plan compiles");
    let result = engine.run("Expanded").expect("run succeeds");

    assert_eq!(names(&result, "chassis"), vec!["Tray", "Backplane"]);
    assert_eq!(accessor.fetch_count(CHASSIS), 1);
    assert_eq!(accessor.fetch_count(TRAY), 0, "members arrived inline");
    let expanded = GetParams {
        expand: Some(ExpandParams {
            kind: ExpandKind::NotLinks,
            levels: 1,
        }),
    };
    assert!(tracker.events().contains(&TrackerEvent::PathQueried {
        path: "/Chassis".to_owned(),
        params: expanded,
    }));
}

#[test]
fn tracker_sees_parent_end_before_child_start() {
    let tracker = Arc::new(RecordingTracker::new());
    let query = QueryDefinition::new("Tracked")
        .with_subquery(SubqueryDefinition::new("chassis", "/Chassis").with_child("sensors"))
        .with_subquery(SubqueryDefinition::new("sensors", "/Sensors"));
    let result = run_one(query, EngineOptions::default().with_tracker(tracker.clone()));
    assert!(result.find("sensors").is_some());

    let lifecycle: Vec<String> = tracker
        .events()
        .into_iter()
        .filter_map(|event| match event {
            TrackerEvent::SubqueryStart { subquery_id, .. } => Some(format!("start:{subquery_id}")),
            TrackerEvent::SubqueryEnd { subquery_id, .. } => Some(format!("end:{subquery_id}")),
            TrackerEvent::PathQueried { .. } => None,
        })
        .collect();
    assert_eq!(
        lifecycle,
        vec!["start:chassis", "end:chassis", "start:sensors", "end:sensors"]
    );
    assert!(tracker.status_of("sensors").is_some_and(|status| status.is_ok()));
    let paths = tracker.queried_paths();
    assert!(paths.contains("/Chassis"));
    assert!(paths.contains("/Sensors"));
}

#[test]
fn run_many_reports_each_query() {
    let a = QueryDefinition::new("a").with_subquery(SubqueryDefinition::new("s", "/Chassis"));
    let b = QueryDefinition::new("b").with_subquery(SubqueryDefinition::new("s", "/Systems"));
    let engine = QueryEngine::new([a, b], Arc::new(service()), EngineOptions::default())
        .expect("plans compile");
    let outcomes = engine.run_many(&["b", "missing", "a"]);
    assert_eq!(outcomes.len(), 3);
    assert_eq!(outcomes[0].as_ref().map(|r| r.query_id.as_str()).ok(), Some("b"));
    assert!(outcomes[1].is_err());
    assert_eq!(outcomes[2].as_ref().map(|r| r.subquery_outputs["s"].data.len()).ok(), Some(2));
    assert_eq!(engine.run_all().len(), 2);
}

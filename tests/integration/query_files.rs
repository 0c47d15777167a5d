//! Loading query definitions, engine configuration and mockups from disk.

#![allow(missing_docs)]

use std::fs;
use std::sync::Arc;

use redpath::engine::{ConfigError, EngineConfig, EngineOptions, QueryEngine};
use redpath::graph::{ExpandKind, JsonMockup};
use redpath::query::{PlanWarningKind, PropertyType, QueryDefinition, StatusCode, Value};
use redpath::EngineError;
use tempfile::tempdir;

const QUERY_TOML: &str = r#"
query_id = "ProcessorCollector"

[[subquery]]
subquery_id = "system"
redpath = "/Systems[*]"
properties = ["Name"]
children = ["cpus"]

[[subquery]]
subquery_id = "cpus"
redpath = "/Processors[Status.State=Enabled]"
properties = [
  "Id",
  { property = "TotalCores", name = "cores", type = "int64" },
  { property = "Status.State", name = "state", type = "string" },
]
"#;

const QUERY_JSON: &str = r#"{
  "id": "ChassisCollector",
  "subqueries": [
    {"id": "chassis", "path": "/Chassis[*]", "properties": ["Name", {"property": "PowerState", "type": "string"}]}
  ]
}"#;

const MOCKUP_JSON: &str = r#"{
  "/redfish/v1": {
    "Chassis": {"@odata.id": "/redfish/v1/Chassis"},
    "Systems": {"@odata.id": "/redfish/v1/Systems"}
  },
  "/redfish/v1/Chassis": {"Members": [{"@odata.id": "/redfish/v1/Chassis/1"}]},
  "/redfish/v1/Chassis/1": {"Name": "Tray", "PowerState": "On"},
  "/redfish/v1/Systems": {"Members": [{"@odata.id": "/redfish/v1/Systems/system"}]},
  "/redfish/v1/Systems/system": {
    "Name": "system",
    "Processors": {"@odata.id": "/redfish/v1/Systems/system/Processors"}
  },
  "/redfish/v1/Systems/system/Processors": {"Members": [
    {"@odata.id": "/redfish/v1/Systems/system/Processors/0"},
    {"@odata.id": "/redfish/v1/Systems/system/Processors/1"}
  ]},
  "/redfish/v1/Systems/system/Processors/0": {"Id": "0", "TotalCores": 8, "Status": {"State": "Enabled"}},
  "/redfish/v1/Systems/system/Processors/1": {"Id": "1", "TotalCores": 4, "Status": {"State": "Absent"}}
}"#;

const CONFIG_TOML: &str = r#"
parallel_root_subqueries = true

[validation]
max_child_links = 0

[[query_rules.ProcessorCollector]]
path = "/Processors"
expand = { kind = "both" }
"#;

#[test]
fn loads_and_runs_query_files() {
    let dir = tempdir().expect("tempdir");
    let toml_path = dir.path().join("processors.toml");
    let json_path = dir.path().join("chassis.JSON");
    let mockup_path = dir.path().join("mockup.json");
    let config_path = dir.path().join("engine.toml");
    fs::write(&toml_path, QUERY_TOML).expect("write query");
    fs::write(&json_path, QUERY_JSON).expect("write query");
    fs::write(&mockup_path, MOCKUP_JSON).expect("write mockup");
    fs::write(&config_path, CONFIG_TOML).expect("write config");

    let processors = QueryDefinition::load(&toml_path).expect("toml query loads");
    assert_eq!(processors.id, "ProcessorCollector");
    assert_eq!(processors.subqueries[1].properties[1].name, "cores");
    assert_eq!(processors.subqueries[1].properties[1].kind, PropertyType::Int64);
    assert_eq!(processors.subqueries[1].properties[0].kind, PropertyType::Any);
    let chassis = QueryDefinition::load(&json_path).expect("json query loads");
    assert_eq!(chassis.subqueries[0].properties[1].name, "PowerState");

    let config = EngineConfig::load(&config_path).expect("config loads");
    assert!(config.parallel_root_subqueries);
    assert_eq!(config.validation.max_child_links, 0);
    assert_eq!(config.validation.max_path_depth, 4);
    assert_eq!(config.validation.max_link_depth, 3);
    let rules = config.rules_for("ProcessorCollector");
    let expand = rules.params_for("/Processors").expand.expect("rule applies");
    assert_eq!(expand.kind, ExpandKind::Both);
    assert_eq!(expand.levels, 1);
    assert!(config.rules_for("ChassisCollector").is_empty());

    let accessor = Arc::new(JsonMockup::load(&mockup_path).expect("mockup loads"));
    let engine = QueryEngine::new(
        [processors, chassis],
        accessor.clone(),
        EngineOptions::default().with_config(config),
    )
    .expect("plans compile");
    let plan = engine.plan("ProcessorCollector").expect("plan present");
    assert_eq!(plan.warnings().len(), 1);
    assert_eq!(plan.warnings()[0].kind, PlanWarningKind::WideBranching);
    assert_eq!(plan.warnings()[0].subquery_id, "system");
    assert!(engine.plan("ChassisCollector").is_some_and(|plan| plan.warnings().is_empty()));

    let result = engine.run("ProcessorCollector").expect("run succeeds");
    let system = &result.subquery_outputs["system"];
    assert_eq!(system.status.code, StatusCode::Ok);
    let cpus = &system.children["cpus"];
    assert_eq!(cpus.data.len(), 1);
    assert_eq!(cpus.data[0].get("cores"), Some(&Value::Int(8)));
    assert_eq!(cpus.data[0].get("state"), Some(&Value::from("Enabled")));
    assert_eq!(cpus.data[0].parent_index, Some(0));
    assert_eq!(accessor.fetch_count("/redfish/v1/Systems/system/Processors/0"), 0);

    let chassis = engine.run("ChassisCollector").expect("run succeeds");
    assert_eq!(
        chassis.subquery_outputs["chassis"].data[0].get("PowerState"),
        Some(&Value::from("On"))
    );
}

#[test]
fn loading_errors_name_the_file() {
    let dir = tempdir().expect("tempdir");
    let yaml = dir.path().join("query.yaml");
    fs::write(&yaml, "id: q").expect("write");
    assert!(matches!(
        QueryDefinition::load(&yaml),
        Err(ConfigError::UnsupportedFormat { path }) if path == yaml
    ));

    let missing = dir.path().join("missing.toml");
    assert!(matches!(QueryDefinition::load(&missing), Err(ConfigError::Read { .. })));

    let broken = dir.path().join("broken.json");
    fs::write(&broken, "{\"id\": ").expect("write");
    let err = QueryDefinition::load(&broken).expect_err("invalid json");
    assert!(err.to_string().contains("broken.json"));

    let bad_config = dir.path().join("engine.toml");
    fs::write(&bad_config, "parallel_root_subqueries = \"yes\"").expect("write");
    assert!(matches!(EngineConfig::load(&bad_config), Err(ConfigError::Toml { .. })));
}

#[test]
fn invalid_query_files_fail_engine_construction() {
    let definition = QueryDefinition::from_toml_str(
        r#"
        id = "Broken"
        [[subqueries]]
        id = "a"
        path = "/Chassis"
        children = ["missing"]
        "#,
    )
    .expect("parses");
    let err = QueryEngine::new([definition], Arc::new(JsonMockup::new()), EngineOptions::default())
        .expect_err("invalid link");
    assert!(matches!(err, EngineError::Plan(_)));
    assert_eq!(err.code(), "InvalidLink");
}

//! Concurrent execution: shared engines across threads and parallel root
//! subqueries sharing one run's fetch cache.

#![allow(missing_docs)]

mod common;

use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use redpath::engine::{EngineConfig, EngineOptions, QueryEngine, RecordingTracker};
use redpath::graph::RequestMetrics;
use redpath::query::{QueryDefinition, SubqueryDefinition};

use common::{service, CHASSIS, ROOT, TRAY, TRAY_SENSORS};

const THREADS: usize = 6;

fn query() -> QueryDefinition {
    QueryDefinition::new("Inventory")
        .with_subquery(
            SubqueryDefinition::new("chassis", "/Chassis[*]")
                .with_properties(["Name"])
                .with_child("sensors"),
        )
        .with_subquery(SubqueryDefinition::new("sensors", "/Sensors[*]").with_properties(["Name", "Reading"]))
        .with_subquery(SubqueryDefinition::new("tray", "/Chassis[Id=1]/Sensors").with_properties(["Name"]))
        .with_subquery(SubqueryDefinition::new("cpus", "/Systems[*]/Processors[*]").with_properties(["Id"]))
}

#[test]
fn concurrent_runs_are_isolated_and_identical() {
    let accessor = Arc::new(service().with_latency(Duration::from_millis(2)));
    let metrics = Arc::new(RequestMetrics::new());
    let tracker = Arc::new(RecordingTracker::new());
    let engine = Arc::new(
        QueryEngine::new(
            [query()],
            accessor.clone(),
            EngineOptions::default()
                .with_metrics(metrics.clone())
                .with_tracker(tracker.clone()),
        )
        .expect("plan compiles"),
    );
    let baseline = engine.run("Inventory").expect("baseline run");
    accessor.reset_counts();
    metrics.reset();

    let barrier = Arc::new(Barrier::new(THREADS));
    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let engine = Arc::clone(&engine);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                engine.run("Inventory")
            })
        })
        .collect();

    for handle in handles {
        let result = handle.join().expect("thread completes").expect("run succeeds");
        assert!(result.same_outputs(&baseline));
    }
    // Each run owns its cache: every run fetches every resource exactly once.
    for id in [ROOT, CHASSIS, TRAY, TRAY_SENSORS] {
        assert_eq!(accessor.fetch_count(id), THREADS as u64, "{id}");
        assert_eq!(metrics.requests_for(id), THREADS as u64, "{id}");
    }
    let ends = tracker
        .events()
        .into_iter()
        .filter(|event| matches!(event, redpath::engine::TrackerEvent::SubqueryEnd { .. }))
        .count();
    assert_eq!(ends, 4 * (THREADS + 1));
}

#[test]
fn parallel_roots_share_one_cache() {
    let config = EngineConfig {
        parallel_root_subqueries: true,
        ..EngineConfig::default()
    };
    let accessor = Arc::new(service().with_latency(Duration::from_millis(5)));
    let engine = QueryEngine::new(
        [query()],
        accessor.clone(),
        EngineOptions::default().with_config(config),
    )
    .expect("plan compiles");
    let sequential = QueryEngine::new([query()], Arc::new(service()), EngineOptions::default())
        .expect("plan compiles")
        .run("Inventory")
        .expect("sequential run");

    let parallel = engine.run("Inventory").expect("parallel run");
    assert!(parallel.same_outputs(&sequential));
    // chassis and tray race for the same collection and sensor resources.
    assert_eq!(accessor.fetch_count(CHASSIS), 1);
    assert_eq!(accessor.fetch_count(TRAY), 1);
    assert_eq!(accessor.fetch_count(TRAY_SENSORS), 1);
}

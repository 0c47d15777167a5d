//! Query engine facade: compiles definitions once and runs them on demand.
//!
//! Every run fetches the service root through a fresh [`FetchCache`], executes
//! the plan's root subqueries from that root and assembles the outputs into a
//! [`QueryResult`]. Nothing survives between runs except the immutable plans
//! and the caller's sinks, so a single engine may serve concurrent runs.

/// Run timestamp sources.
pub mod clock;
/// Engine configuration and file loading.
pub mod config;
/// Per-run state.
pub mod context;
/// Execution observers.
pub mod tracker;

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use std::thread;

use tracing::{debug, error, info, warn};

use crate::error::{EngineError, Result};
use crate::graph::{FetchCache, MetricsSink, Resource, ResourceAccessor};
use crate::normalize::NormalizerChain;
use crate::query::definition::QueryDefinition;
use crate::query::executor::{ContextNode, Executor};
use crate::query::planner::{ExecutionPlan, Planner, PlannerConfig, SubqueryPlan};
use crate::query::result::{assemble, QueryResult, SubqueryOutput};

pub use clock::{Clock, FakeClock, SystemClock};
pub use config::{ConfigError, EngineConfig, PathRule};
pub use context::RunContext;
pub use tracker::{ExecutionTracker, RecordingTracker, TrackerEvent};

/// Collaborators and settings of a [`QueryEngine`].
pub struct EngineOptions {
    /// Engine configuration.
    pub config: EngineConfig,
    /// Source of run timestamps.
    pub clock: Arc<dyn Clock>,
    /// Chain applied to every matched node.
    pub normalizers: NormalizerChain,
    /// Receives one record per underlying fetch.
    pub metrics: Option<Arc<dyn MetricsSink>>,
    /// Observes subquery lifecycle and fetched paths.
    pub tracker: Option<Arc<dyn ExecutionTracker>>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            config: EngineConfig::default(),
            clock: Arc::new(SystemClock),
            normalizers: NormalizerChain::with_defaults(),
            metrics: None,
            tracker: None,
        }
    }
}

impl EngineOptions {
    /// Replaces the configuration.
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Replaces the clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replaces the normalization chain.
    pub fn with_normalizers(mut self, normalizers: NormalizerChain) -> Self {
        self.normalizers = normalizers;
        self
    }

    /// Installs a metrics sink.
    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Installs an execution tracker.
    pub fn with_tracker(mut self, tracker: Arc<dyn ExecutionTracker>) -> Self {
        self.tracker = Some(tracker);
        self
    }
}

impl fmt::Debug for EngineOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineOptions")
            .field("config", &self.config)
            .field("normalizers", &self.normalizers)
            .field("metrics", &self.metrics.is_some())
            .field("tracker", &self.tracker.is_some())
            .finish()
    }
}

/// Compiled queries bound to a resource graph.
pub struct QueryEngine {
    accessor: Arc<dyn ResourceAccessor>,
    plans: Vec<Arc<ExecutionPlan>>,
    index: HashMap<String, usize>,
    options: EngineOptions,
}

impl QueryEngine {
    /// Compiles every definition. Any plan error aborts construction; a
    /// repeated query id keeps the first definition.
    pub fn new(
        definitions: impl IntoIterator<Item = QueryDefinition>,
        accessor: Arc<dyn ResourceAccessor>,
        options: EngineOptions,
    ) -> Result<Self> {
        let mut plans = Vec::new();
        for definition in definitions {
            let planner = Planner::new(PlannerConfig {
                limits: options.config.validation,
                rules: options.config.rules_for(&definition.id),
            });
            plans.push(planner.plan(&definition)?);
        }
        Ok(Self::from_plans(plans, accessor, options))
    }

    /// Wraps already compiled plans.
    pub fn from_plans(
        plans: impl IntoIterator<Item = ExecutionPlan>,
        accessor: Arc<dyn ResourceAccessor>,
        options: EngineOptions,
    ) -> Self {
        let mut engine = Self {
            accessor,
            plans: Vec::new(),
            index: HashMap::new(),
            options,
        };
        for plan in plans {
            if engine.index.contains_key(plan.query_id()) {
                warn!(query = %plan.query_id(), "engine.query.duplicate");
                continue;
            }
            engine
                .index
                .insert(plan.query_id().to_owned(), engine.plans.len());
            engine.plans.push(Arc::new(plan));
        }
        info!(queries = engine.plans.len(), "engine.ready");
        engine
    }

    /// Compiled plan for `query_id`.
    pub fn plan(&self, query_id: &str) -> Option<&ExecutionPlan> {
        self.index.get(query_id).map(|&idx| self.plans[idx].as_ref())
    }

    /// Query ids in declaration order.
    pub fn query_ids(&self) -> impl Iterator<Item = &str> + '_ {
        self.plans.iter().map(|plan| plan.query_id())
    }

    /// Executes one query.
    ///
    /// Fails only when the query is unknown or the root fetch fails; every
    /// other failure is reported in the status of the affected subquery.
    pub fn run(&self, query_id: &str) -> Result<QueryResult> {
        let plan = self
            .plan(query_id)
            .ok_or_else(|| EngineError::UnknownQuery(query_id.to_owned()))?;
        self.execute_plan(plan)
    }

    /// Executes several queries in order, one result per id.
    pub fn run_many<S: AsRef<str>>(&self, query_ids: &[S]) -> Vec<Result<QueryResult>> {
        query_ids.iter().map(|id| self.run(id.as_ref())).collect()
    }

    /// Executes every compiled query in declaration order.
    pub fn run_all(&self) -> Vec<Result<QueryResult>> {
        self.plans
            .iter()
            .map(|plan| self.execute_plan(plan))
            .collect()
    }

    fn execute_plan(&self, plan: &ExecutionPlan) -> Result<QueryResult> {
        let query_id = plan.query_id();
        let start = self.options.clock.now();
        let cache = FetchCache::new(self.accessor.as_ref(), self.options.metrics.as_deref());

        let root_id = self.accessor.root_id().to_owned();
        let root_params = plan.rules().params_for("/");
        let payload = match cache.fetch(&root_id, &root_params) {
            Ok(payload) => payload,
            Err(err) => {
                error!(query = %query_id, root = %root_id, error = %err, "engine.root_fetch_failed");
                return Err(EngineError::RootFetch(err));
            }
        };
        let root = Resource::root(root_id, payload);

        let ctx = RunContext::new(
            query_id,
            root,
            cache,
            &self.options.normalizers,
            self.options.tracker.as_deref(),
        );
        let contexts = [ContextNode::root(ctx.root().clone())];
        let executor = Executor::new(&ctx, plan);
        let roots: Vec<&SubqueryPlan> = plan
            .roots()
            .iter()
            .filter_map(|id| plan.subquery(id))
            .collect();

        let outputs: BTreeMap<String, SubqueryOutput> =
            if self.options.config.parallel_root_subqueries && roots.len() > 1 {
                debug!(query = %query_id, roots = roots.len(), "engine.run.parallel");
                thread::scope(|scope| {
                    let handles: Vec<_> = roots
                        .iter()
                        .map(|subquery| {
                            let executor = &executor;
                            let contexts = &contexts;
                            let handle = scope.spawn(move || executor.execute(subquery, contexts));
                            (subquery.id.clone(), handle)
                        })
                        .collect();
                    handles
                        .into_iter()
                        .map(|(id, handle)| match handle.join() {
                            Ok(output) => (id, output),
                            Err(panic) => std::panic::resume_unwind(panic),
                        })
                        .collect()
                })
            } else {
                roots
                    .iter()
                    .map(|subquery| (subquery.id.clone(), executor.execute(subquery, &contexts)))
                    .collect()
            };

        let end = self.options.clock.now();
        let stats = ctx.fetch_stats();
        info!(
            query = %query_id,
            subqueries = plan.subqueries().len(),
            fetches = stats.misses,
            cache_hits = stats.hits,
            "engine.run.finished"
        );
        Ok(assemble(query_id, start, end, outputs))
    }
}

impl fmt::Debug for QueryEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryEngine")
            .field("root", &self.accessor.root_id())
            .field("queries", &self.query_ids().collect::<Vec<_>>())
            .field("options", &self.options)
            .finish()
    }
}

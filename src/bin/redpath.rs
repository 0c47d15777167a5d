//! Binary entry point for the RedPath query CLI.
#![forbid(unsafe_code)]

use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use redpath::{
    engine::{EngineConfig, EngineOptions, QueryEngine},
    error::EngineErrorWithCode,
    graph::JsonMockup,
    query::{
        ast::render_steps, path, planner::Planner, PlanErrorWithCode, PlannerConfig,
        QueryDefinition,
    },
};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(
    name = "redpath",
    version,
    about = "Declarative queries over a hierarchical resource graph",
    disable_help_subcommand = true
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run queries against a JSON mockup and print the results.
    Run {
        #[arg(long, value_name = "FILE", help = "Mockup document: {\"<id>\": {..payload..}}")]
        mockup: PathBuf,

        #[arg(long = "query", value_name = "FILE", required = true, help = "Query definition (.json or .toml)")]
        queries: Vec<PathBuf>,

        #[arg(long, value_name = "FILE", env = "REDPATH_CONFIG", help = "Engine configuration (.toml)")]
        config: Option<PathBuf>,

        #[arg(long = "query-id", value_name = "ID", help = "Only run these query ids")]
        query_ids: Vec<String>,

        #[arg(long, help = "Override the mockup's root resource id")]
        root: Option<String>,
    },
    /// Compile queries and print their plans and warnings.
    Check {
        #[arg(long = "query", value_name = "FILE", required = true, help = "Query definition (.json or .toml)")]
        queries: Vec<PathBuf>,

        #[arg(long, value_name = "FILE", env = "REDPATH_CONFIG", help = "Engine configuration (.toml)")]
        config: Option<PathBuf>,

        #[arg(long, help = "Hide predicate literals in the plan output")]
        redact: bool,
    },
    /// Print the compiled steps of a path expression.
    Parse {
        #[arg(value_name = "EXPR")]
        expr: String,
    },
}

fn main() {
    install_tracing_subscriber();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(1);
        }
    }
}

fn install_tracing_subscriber() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn run() -> Result<i32, Box<dyn Error>> {
    let cli = Cli::parse();
    match cli.command {
        Command::Run {
            mockup,
            queries,
            config,
            query_ids,
            root,
        } => {
            let mut accessor = JsonMockup::load(&mockup)?;
            if let Some(root) = root {
                accessor = accessor.with_root(root);
            }
            let config = load_config(config.as_ref())?;
            let definitions = load_queries(&queries)?;
            let engine = QueryEngine::new(
                definitions,
                Arc::new(accessor),
                EngineOptions::default().with_config(config),
            )
            .map_err(|err| EngineErrorWithCode(&err).to_string())?;

            let ids: Vec<String> = if query_ids.is_empty() {
                engine.query_ids().map(str::to_owned).collect()
            } else {
                query_ids
            };
            let mut exit = 0;
            let mut results = Vec::new();
            for (id, outcome) in ids.iter().zip(engine.run_many(&ids)) {
                match outcome {
                    Ok(result) => results.push(result),
                    Err(err) => {
                        eprintln!("query {id}: {}", EngineErrorWithCode(&err));
                        exit = 1;
                    }
                }
            }
            println!("{}", serde_json::to_string_pretty(&results)?);
            Ok(exit)
        }
        Command::Check {
            queries,
            config,
            redact,
        } => {
            let config = load_config(config.as_ref())?;
            let mut exit = 0;
            for definition in load_queries(&queries)? {
                let planner = Planner::new(PlannerConfig {
                    limits: config.validation,
                    rules: config.rules_for(&definition.id),
                });
                match planner.plan(&definition) {
                    Ok(plan) => {
                        let explain = plan.explain();
                        if redact {
                            print!("{}", explain.render_redacted());
                        } else {
                            print!("{}", explain.render());
                        }
                        for warning in plan.warnings() {
                            println!("warning: {warning}");
                        }
                    }
                    Err(err) => {
                        println!("query {}: {}", definition.id, PlanErrorWithCode(&err));
                        exit = 2;
                    }
                }
            }
            Ok(exit)
        }
        Command::Parse { expr } => {
            let steps = path::compile(&expr)?;
            for (idx, step) in steps.iter().enumerate() {
                match &step.predicate {
                    Some(predicate) => println!("{idx}: {} [{predicate}]", step.selector),
                    None => println!("{idx}: {}", step.selector),
                }
            }
            println!("canonical: {}", render_steps(&steps));
            Ok(0)
        }
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<EngineConfig, Box<dyn Error>> {
    Ok(match path {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    })
}

fn load_queries(paths: &[PathBuf]) -> Result<Vec<QueryDefinition>, Box<dyn Error>> {
    paths
        .iter()
        .map(|path| QueryDefinition::load(path).map_err(Into::into))
        .collect()
}

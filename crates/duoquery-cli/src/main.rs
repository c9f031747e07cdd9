//! duoquery CLI
//!
//! Runs document-store and graph-store queries, correlates their results and
//! compares baseline against optimized execution:
//! - `doc run` / `doc columns`: filter or pipeline queries, schema sampling
//! - `graph run` / `graph info`: parameterized graph queries, labels and types
//! - `combine`: document query, key extraction, graph query, merge, summary
//! - `compare`: one analytical task in both modes, with timing improvement
//! - `tasks`: the built-in analytical task catalog

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use duoquery_core::tasks::{self, AnalyticalTask};
use duoquery_core::{
    compare_task, describe, CombinedResult, CorrelationOutcome, DocumentQueryExecutor,
    DocumentRequest, Execution, ExecutionMode, GraphQueryExecutor, GraphRequest, JoinHow, JoinSpec,
    KeyExtraction, Projection, QueryKind, QuerySpec, ResultCorrelator, SummarySpec,
};
use duoquery_http::{DataApiBackend, Neo4jHttpBackend};
use serde_json::{json, Value};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod config;
mod output;

use config::Config;

#[derive(Parser)]
#[command(name = "duoquery")]
#[command(
    author,
    version,
    about = "Run, correlate and compare document-store and graph-store queries"
)]
struct Cli {
    /// JSON config file (default: ./duoquery.json when present).
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Print JSON instead of tables.
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Document-store queries.
    Doc {
        #[command(subcommand)]
        command: DocCommands,
    },
    /// Graph-store queries.
    Graph {
        #[command(subcommand)]
        command: GraphCommands,
    },
    /// Run a document query, bind its keys into a graph query and merge.
    Combine(CombineArgs),
    /// Run a task in baseline and optimized mode and compare round-trip time.
    Compare {
        /// Task slug (see `duoquery tasks`).
        task: String,
    },
    /// List the built-in analytical tasks.
    Tasks,
}

#[derive(Subcommand)]
enum DocCommands {
    /// Run a filter or pipeline query.
    Run {
        #[arg(long, default_value = "transactionlog")]
        collection: String,
        /// `find` (filter object) or `aggregate` (pipeline array).
        #[arg(long, default_value = "find")]
        kind: QueryKind,
        /// Query JSON.
        #[arg(long, conflicts_with = "query_file")]
        query: Option<String>,
        #[arg(long)]
        query_file: Option<PathBuf>,
        #[arg(long, default_value = "baseline")]
        mode: ExecutionMode,
        /// Keep only these columns (comma-separated).
        #[arg(long, value_delimiter = ',', conflicts_with = "exclude")]
        include: Vec<String>,
        /// Drop these columns (comma-separated).
        #[arg(long, value_delimiter = ',')]
        exclude: Vec<String>,
        /// Also print descriptive statistics of numeric columns.
        #[arg(long)]
        stats: bool,
    },
    /// Column names of one sample document.
    Columns {
        #[arg(long, default_value = "transactionlog")]
        collection: String,
        #[arg(long, default_value = "baseline")]
        mode: ExecutionMode,
    },
}

#[derive(Subcommand)]
enum GraphCommands {
    /// Run a parameterized graph query.
    Run {
        /// Query text.
        #[arg(conflicts_with = "query_file")]
        query: Option<String>,
        #[arg(long)]
        query_file: Option<PathBuf>,
        /// Parameters as a JSON object.
        #[arg(long)]
        params: Option<String>,
        #[arg(long, default_value = "baseline")]
        mode: ExecutionMode,
        #[arg(long)]
        stats: bool,
    },
    /// Node labels and relationship types (also checks the connection).
    Info,
}

#[derive(Args)]
struct CombineArgs {
    /// Run a catalog task instead of the query options below.
    #[arg(long)]
    task: Option<String>,
    #[arg(long, default_value = "baseline")]
    mode: ExecutionMode,
    #[arg(long, default_value = "transactionlog")]
    collection: String,
    #[arg(long, default_value = "aggregate")]
    kind: QueryKind,
    #[arg(long, required_unless_present = "task")]
    doc_query: Option<String>,
    #[arg(long, required_unless_present = "task")]
    graph_query: Option<String>,
    /// Document column whose values become the graph parameter.
    #[arg(long, required_unless_present = "task")]
    key_column: Option<String>,
    /// Graph parameter name (default: the key column).
    #[arg(long)]
    key_param: Option<String>,
    /// Bind distinct non-null key values only.
    #[arg(long)]
    distinct: bool,
    /// Document-side join key; repeat for compound keys (default: key column).
    #[arg(long = "left-key")]
    left_keys: Vec<String>,
    /// Graph-side join key; repeat for compound keys (default: left keys).
    #[arg(long = "right-key")]
    right_keys: Vec<String>,
    #[arg(long, default_value = "left")]
    how: JoinHow,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Doc { command } => match command {
            DocCommands::Run {
                collection,
                kind,
                query,
                query_file,
                mode,
                include,
                exclude,
                stats,
            } => {
                let text = query_text(query, query_file)?.unwrap_or_default();
                let spec = QuerySpec::parse(kind, &text)?;
                let projection = match (include.is_empty(), exclude.is_empty()) {
                    (false, _) => Some(Projection::include(include)),
                    (true, false) => Some(Projection::exclude(exclude)),
                    (true, true) => None,
                };
                let run = documents(&config).execute(
                    &config.document_info()?,
                    &collection,
                    &spec,
                    mode,
                    projection.as_ref(),
                )?;
                print_execution(run, stats, cli.json)?;
            }
            DocCommands::Columns { collection, mode } => {
                let columns =
                    documents(&config).sample_columns(&config.document_info()?, &collection, mode)?;
                if cli.json {
                    println!("{}", serde_json::to_string_pretty(&columns)?);
                } else if columns.is_empty() {
                    println!("{} `{collection}` is empty", "info:".yellow().bold());
                } else {
                    for column in columns {
                        println!("  {} {column}", "→".yellow());
                    }
                }
            }
        },
        Commands::Graph { command } => match command {
            GraphCommands::Run {
                query,
                query_file,
                params,
                mode,
                stats,
            } => {
                let text = query_text(query, query_file)?
                    .ok_or_else(|| anyhow!("a graph query is required (argument or --query-file)"))?;
                let params: Option<Value> = params
                    .map(|p| serde_json::from_str(&p))
                    .transpose()
                    .context("--params is not valid JSON")?;
                let run = GraphQueryExecutor::new(Neo4jHttpBackend).execute(
                    &config.graph_info(),
                    &text,
                    params.as_ref(),
                    mode,
                )?;
                print_execution(run, stats, cli.json)?;
            }
            GraphCommands::Info => {
                let info =
                    GraphQueryExecutor::new(Neo4jHttpBackend).database_info(&config.graph_info())?;
                if cli.json {
                    println!("{}", serde_json::to_string_pretty(&info)?);
                } else {
                    println!("{}", "Labels".green().bold());
                    for label in &info.labels {
                        println!("  {} {label}", "→".yellow());
                    }
                    println!("{}", "Relationship types".green().bold());
                    for rel in &info.relationship_types {
                        println!("  {} {rel}", "→".yellow());
                    }
                }
            }
        },
        Commands::Combine(args) => cmd_combine(&config, args, cli.json)?,
        Commands::Compare { task } => {
            let task = find_task(&task)?;
            let out = compare_task(
                &correlator(&config),
                &task,
                &config.document_info()?,
                &config.graph_info(),
            )?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                for (mode, result) in [
                    (ExecutionMode::Baseline, &out.baseline),
                    (ExecutionMode::Optimized, &out.optimized),
                ] {
                    println!("{} {}", "Scenario".green().bold(), mode.to_string().bold());
                    for sample in &result.timings {
                        println!("  {} {}", "→".yellow(), output::render_timing(sample));
                    }
                    print_warnings(&result.warnings);
                }
                print!("{}", output::render_comparison(&out.comparison));
            }
        }
        Commands::Tasks => {
            let catalog = tasks::catalog()?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&catalog)?);
            } else {
                for task in &catalog {
                    println!("{}  {}", task.slug.green().bold(), task.name);
                }
            }
        }
    }
    Ok(())
}

fn documents(config: &Config) -> DocumentQueryExecutor<DataApiBackend> {
    DocumentQueryExecutor::new(DataApiBackend::new(config.document.data_source.clone()))
        .with_resolver(config.document.collections.clone())
}

fn correlator(config: &Config) -> ResultCorrelator<DataApiBackend, Neo4jHttpBackend> {
    ResultCorrelator::new(documents(config), GraphQueryExecutor::new(Neo4jHttpBackend))
}

fn find_task(slug: &str) -> Result<AnalyticalTask> {
    tasks::find(slug)?.ok_or_else(|| {
        anyhow!("unknown task `{slug}` (run `duoquery tasks` for the list)")
    })
}

fn query_text(inline: Option<String>, file: Option<PathBuf>) -> Result<Option<String>> {
    match (inline, file) {
        (Some(text), _) => Ok(Some(text)),
        (None, Some(path)) => std::fs::read_to_string(&path)
            .map(Some)
            .with_context(|| format!("failed to read {}", path.display())),
        (None, None) => Ok(None),
    }
}

fn cmd_combine(config: &Config, args: CombineArgs, json_out: bool) -> Result<()> {
    let correlator = correlator(config);
    let result = match &args.task {
        Some(slug) => {
            let task = find_task(slug)?;
            correlator.run_task(
                &task,
                &config.document_info()?,
                &config.graph_info(),
                args.mode,
            )?
        }
        None => {
            let (Some(doc_query), Some(graph_query), Some(key_column)) =
                (&args.doc_query, &args.graph_query, &args.key_column)
            else {
                bail!("--doc-query, --graph-query and --key-column are required without --task");
            };
            let parameter = args.key_param.clone().unwrap_or_else(|| key_column.clone());
            let extraction = if args.distinct {
                KeyExtraction::distinct(key_column.clone(), parameter)
            } else {
                KeyExtraction::all(key_column.clone(), parameter)
            };
            let left_keys = if args.left_keys.is_empty() {
                vec![key_column.clone()]
            } else {
                args.left_keys.clone()
            };
            let right_keys = if args.right_keys.is_empty() {
                left_keys.clone()
            } else {
                args.right_keys.clone()
            };
            let join = JoinSpec::new(left_keys, right_keys, args.how)?;

            correlator.correlate(
                &DocumentRequest {
                    connection: config.document_info()?,
                    collection: args.collection.clone(),
                    query: QuerySpec::parse(args.kind, doc_query)?,
                    projection: None,
                },
                &GraphRequest {
                    connection: config.graph_info(),
                    query: graph_query.clone(),
                },
                args.mode,
                |table| extraction.extract(table),
                &join,
                &SummarySpec::new(),
            )?
        }
    };
    print_combined(&result, json_out)
}

fn print_execution(run: Execution, stats: bool, json_out: bool) -> Result<()> {
    let (table, timing, error) = run.into_parts();
    let stats = stats.then(|| describe(&table));
    if json_out {
        let out = json!({
            "rows": table,
            "timing": timing,
            "error": error.as_ref().map(ToString::to_string),
            "stats": stats,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    if let Some(err) = &error {
        eprintln!("{} {err}", "warning:".yellow().bold());
    }
    print!("{}", output::render_table(&table));
    if let Some(stats) = stats {
        println!("{}", "Statistics".green().bold());
        print!("{}", output::render_stats(&stats));
    }
    eprintln!("{} {}", "time".green().bold(), output::render_timing(&timing));
    Ok(())
}

fn print_combined(result: &CombinedResult, json_out: bool) -> Result<()> {
    if json_out {
        println!("{}", serde_json::to_string_pretty(result)?);
        return Ok(());
    }

    let text = output::render_combined(result);
    if result.outcome == CorrelationOutcome::NoData {
        print!("{} {text}", "info:".yellow().bold());
    } else {
        print!("{text}");
    }
    for sample in &result.timings {
        eprintln!("{} {}", "time".green().bold(), output::render_timing(sample));
    }
    print_warnings(&result.warnings);
    Ok(())
}

fn print_warnings(warnings: &[String]) {
    for warning in warnings {
        eprintln!("{} {warning}", "warning:".yellow().bold());
    }
}

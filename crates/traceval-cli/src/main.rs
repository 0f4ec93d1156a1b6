//! traceval - offline evaluation of agent execution traces
//!
//! ## Commands
//!
//! - `evaluate`: run configured evaluators over a batch of traces
//! - `normalize`: show the filtered semantic tree for each trace
//! - `evaluators`: list registered evaluators and their levels

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, Level};

use traceval_core::eval::{global_registry, supported_levels, EvaluatorParams};
use traceval_core::{
    normalize_spans, register_builtin_evaluators, EvaluationReport, NormalizeOptions,
    NormalizedTrace, RunConfig, Runner, TraceInput,
};

#[derive(Parser)]
#[command(name = "traceval")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Evaluate recorded AI agent traces", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the configured evaluators over a trace batch
    Evaluate {
        /// Trace batch (JSON array of traces, or {"traces": [...]})
        #[arg(short, long)]
        traces: PathBuf,

        /// Run configuration (TOML, or JSON with a .json extension)
        #[arg(short, long)]
        config: PathBuf,

        /// Evaluate traces concurrently
        #[arg(long)]
        parallel: bool,

        /// Report format
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Print the normalized span tree of each trace
    Normalize {
        /// Trace batch (JSON array of traces, or {"traces": [...]})
        #[arg(short, long)]
        traces: PathBuf,

        /// Do not add a synthetic root above multiple orphans
        #[arg(long)]
        no_synthetic_root: bool,

        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// List registered evaluators
    Evaluators,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

/// Accepted shapes of a trace file.
#[derive(Deserialize)]
#[serde(untagged)]
enum TraceBatch {
    List(Vec<TraceInput>),
    Wrapped { traces: Vec<TraceInput> },
}

impl From<TraceBatch> for Vec<TraceInput> {
    fn from(batch: TraceBatch) -> Self {
        match batch {
            TraceBatch::List(traces) | TraceBatch::Wrapped { traces } => traces,
        }
    }
}

#[derive(Serialize)]
struct NormalizeOutput {
    trace_id: String,
    #[serde(flatten)]
    normalized: NormalizedTrace,
}

#[derive(Serialize)]
struct EvaluatorInfo {
    name: String,
    levels: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    traceval_core::telemetry::init_tracing(cli.json, level);
    register_builtin_evaluators();

    match cli.command {
        Commands::Evaluate {
            traces,
            config,
            parallel,
            format,
        } => {
            let report = cmd_evaluate(&traces, &config, parallel).await?;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
                OutputFormat::Text => println!("{}", render_report_text(&report)),
            }
            Ok(())
        }
        Commands::Normalize {
            traces,
            no_synthetic_root,
            format,
        } => {
            let options = NormalizeOptions {
                create_synthetic_root: !no_synthetic_root,
            };
            let outputs = cmd_normalize(&traces, &options)?;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&outputs)?),
                OutputFormat::Text => println!("{}", render_normalize_text(&outputs)),
            }
            Ok(())
        }
        Commands::Evaluators => {
            for evaluator in cmd_evaluators()? {
                println!("{:<16} {}", evaluator.name, evaluator.levels.join(", "));
            }
            Ok(())
        }
    }
}

async fn cmd_evaluate(traces: &Path, config: &Path, parallel: bool) -> Result<EvaluationReport> {
    let batch = read_traces(traces)?;
    let config = RunConfig::from_path(config)
        .with_context(|| format!("Failed to load run config: {:?}", config))?;
    let runner = Runner::new(config).context("Failed to set up evaluators")?;

    info!(traces = batch.len(), parallel, "evaluating trace batch");
    let report = if parallel {
        runner.run_parallel(batch).await
    } else {
        runner.run(&batch)
    };
    report.context("Evaluation failed")
}

fn cmd_normalize(traces: &Path, options: &NormalizeOptions) -> Result<Vec<NormalizeOutput>> {
    let batch = read_traces(traces)?;
    Ok(batch
        .into_iter()
        .map(|trace| NormalizeOutput {
            normalized: normalize_spans(&trace.spans, options),
            trace_id: trace.trace_id,
        })
        .collect())
}

fn cmd_evaluators() -> Result<Vec<EvaluatorInfo>> {
    let registry = global_registry();
    registry
        .names()
        .into_iter()
        .map(|name| -> Result<EvaluatorInfo> {
            let evaluator = registry
                .create(&name, &EvaluatorParams::new())
                .with_context(|| format!("Failed to construct evaluator {name}"))?;
            let levels = supported_levels(evaluator.as_ref())
                .iter()
                .map(|l| l.to_string())
                .collect();
            Ok(EvaluatorInfo { name, levels })
        })
        .collect()
}

fn read_traces(path: &Path) -> Result<Vec<TraceInput>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read trace file: {:?}", path))?;
    let batch: TraceBatch = serde_json::from_str(&content)
        .with_context(|| format!("Invalid trace JSON in {:?}", path))?;
    Ok(batch.into())
}

fn render_report_text(report: &EvaluationReport) -> String {
    let mut out = String::new();
    out.push_str("Evaluation Report\n");
    out.push_str("=================\n");
    out.push_str(&format!("run_id: {}\n", report.run_id));
    out.push_str(&format!("traces: {}\n", report.trace_count));

    for evaluator in &report.evaluators {
        out.push_str(&format!(
            "\n{} (scored: {}, skipped: {})\n",
            evaluator.evaluator, evaluator.count, evaluator.skipped
        ));
        for (name, value) in &evaluator.aggregations {
            if value.is_nan() {
                out.push_str(&format!("  {name}: n/a\n"));
            } else {
                out.push_str(&format!("  {name}: {value:.4}\n"));
            }
        }
    }

    out.trim_end().to_string()
}

fn render_normalize_text(outputs: &[NormalizeOutput]) -> String {
    let mut out = String::new();
    for output in outputs {
        let stats = &output.normalized.stats;
        let root = if stats.synthetic_root {
            ", synthetic root"
        } else {
            ""
        };
        out.push_str(&format!(
            "{}: {} -> {} spans (infrastructure dropped: {}, metric-only: {}{})\n",
            output.trace_id,
            stats.input_spans,
            output.normalized.len(),
            stats.dropped_infrastructure,
            stats.dropped_metric_only,
            root,
        ));
        for span in &output.normalized.spans {
            let kind = span.kind.map(|k| k.as_str()).unwrap_or("root");
            let parent = span.parent_id.as_deref().unwrap_or("-");
            out.push_str(&format!("  {:<10} {} <- {}\n", kind, span.span_id, parent));
        }
    }
    out.trim_end().to_string()
}

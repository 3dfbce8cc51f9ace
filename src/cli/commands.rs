//! CLI commands: run, eval, verify and sample.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use tracing::info;

use crate::dataset;
use crate::eval;
use crate::harness::{self, RunnerConfig};
use crate::llm::{ChatClient, LlmProvider, DEFAULT_API_BASE};
use crate::verifier::{Verifier, VerifierConfig};

pub const DEFAULT_MODEL: &str = "qwen/qwen-2.5-coder-32b-instruct";

#[derive(Parser)]
#[command(
    name = "repairbench",
    about = "LLM repair harness over HumanEvalFix-style tasks",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the repair loop over a dataset
    #[command(alias = "fix")]
    Run(RunArgs),

    /// Re-verify a results file independently and compute pass@1
    #[command(alias = "evaluate")]
    Eval(EvalArgs),

    /// Verify one candidate file against one test file
    Verify(VerifyArgs),

    /// Sample a tiny dataset with one task per bug type
    Sample(SampleArgs),
}

#[derive(Args)]
pub struct RunArgs {
    /// Dataset JSONL path; built-in mock tasks when omitted
    #[arg(short, long)]
    pub dataset: Option<PathBuf>,

    /// YAML run config; command-line flags override its values
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Maximum model consultations per task [default: 5]
    #[arg(short, long)]
    pub budget: Option<usize>,

    /// Verification timeout per call, in seconds [default: 5]
    #[arg(short, long)]
    pub timeout: Option<u64>,

    /// Number of tasks repaired concurrently [default: 1]
    #[arg(short, long)]
    pub parallel: Option<usize>,

    /// Model identifier
    #[arg(short, long)]
    pub model: Option<String>,

    /// Only repair the first N tasks
    #[arg(short = 'n', long)]
    pub limit: Option<usize>,

    /// API key for the model endpoint
    #[arg(long, env = "OPENROUTER_API_KEY")]
    pub api_key: Option<String>,

    /// Base URL of the chat-completions endpoint
    #[arg(long, env = "LLM_API_BASE", default_value = DEFAULT_API_BASE)]
    pub api_base: String,

    /// Results JSONL output path
    #[arg(short, long, default_value = "results/agent_solutions.jsonl")]
    pub output: PathBuf,

    /// Candidate artifacts directory [default: tmp/code]
    #[arg(long)]
    pub artifacts_dir: Option<PathBuf>,

    /// Interpreter binary used for verification [default: python3]
    #[arg(long)]
    pub python_bin: Option<String>,

    /// Print the full summary as JSON
    #[arg(short, long)]
    pub json: bool,
}

#[derive(Args)]
pub struct EvalArgs {
    /// Results JSONL produced by `run`
    #[arg(short, long, default_value = "results/agent_solutions.jsonl")]
    pub results: PathBuf,

    /// Evaluation report output path
    #[arg(short, long, default_value = "results/evaluation.json")]
    pub output: PathBuf,

    /// Verification timeout per call, in seconds
    #[arg(short, long, default_value = "5")]
    pub timeout: u64,

    /// Interpreter binary used for verification
    #[arg(long, default_value = "python3")]
    pub python_bin: String,

    /// Print the full report as JSON
    #[arg(short, long)]
    pub json: bool,
}

#[derive(Args)]
pub struct VerifyArgs {
    /// Candidate source file
    #[arg(short, long)]
    pub code: PathBuf,

    /// Test source file
    #[arg(short, long)]
    pub tests: PathBuf,

    /// Verification timeout in seconds
    #[arg(long, default_value = "5")]
    pub timeout: u64,

    /// Interpreter binary used for verification
    #[arg(long, default_value = "python3")]
    pub python_bin: String,
}

#[derive(Args)]
pub struct SampleArgs {
    /// Dataset JSONL path; built-in mock tasks when omitted
    #[arg(short, long)]
    pub dataset: Option<PathBuf>,

    /// Output JSONL path
    #[arg(short, long, default_value = "data/tiny_dataset.jsonl")]
    pub output: PathBuf,

    /// RNG seed for the per-bug-type sampling
    #[arg(short, long, default_value = "42")]
    pub seed: u64,
}

pub fn parse_cli() -> Cli {
    Cli::parse()
}

pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Run(args) => handle_run(args).await?,
        Commands::Eval(args) => handle_eval(args).await?,
        Commands::Verify(args) => handle_verify(args).await?,
        Commands::Sample(args) => handle_sample(args)?,
    }
    Ok(())
}

async fn handle_run(args: RunArgs) -> anyhow::Result<()> {
    let mut config = match &args.config {
        Some(path) => RunnerConfig::from_yaml(path)
            .map_err(|e| anyhow::anyhow!("Failed to load {}: {e}", path.display()))?,
        None => RunnerConfig::default(),
    };
    if let Some(budget) = args.budget {
        config.budget = budget;
    }
    if let Some(timeout) = args.timeout {
        config.timeout_secs = timeout;
    }
    if let Some(parallel) = args.parallel {
        config.parallel = parallel;
    }
    if let Some(model) = &args.model {
        config.model = model.clone();
    }
    if let Some(dir) = &args.artifacts_dir {
        config.artifacts_dir = dir.clone();
    }
    if let Some(bin) = &args.python_bin {
        config.python_bin = bin.clone();
    }
    if config.model.is_empty() {
        config.model = DEFAULT_MODEL.to_string();
    }

    if args.api_key.is_none() && args.api_base == DEFAULT_API_BASE {
        anyhow::bail!(
            "OPENROUTER_API_KEY is required unless --api-base points at a local endpoint"
        );
    }

    let mut tasks = dataset::load_or_mock(args.dataset.as_deref());
    if let Some(limit) = args.limit {
        tasks.truncate(limit);
    }

    info!(
        tasks = tasks.len(),
        model = %config.model,
        budget = config.budget,
        "Loaded tasks for repair"
    );

    let provider: Arc<dyn LlmProvider> = Arc::new(ChatClient::new(
        &args.api_base,
        args.api_key.clone(),
        config.model.clone(),
    ));
    let summary = harness::run_repairs(tasks, config, provider).await;
    harness::write_results_jsonl(&summary.results, &args.output)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("\n=== Repair Run Summary ===");
        println!("Run:        {}", summary.run_id);
        println!("Total:      {}", summary.total);
        println!("Fixed:      {}", summary.fixed);
        println!("Unfixed:    {}", summary.unfixed);
        println!("Errors:     {}", summary.errors);
        println!("Avg rounds: {:.1}", summary.avg_rounds);
        println!("Duration:   {:.1}s", summary.duration_secs);
        println!();
        for result in &summary.results {
            println!(
                "  [{}] {} ({} rounds, {:.1}s)",
                result.status, result.task_id, result.rounds_used, result.duration_secs
            );
        }
        println!("\nResults written to {}", args.output.display());
    }
    Ok(())
}

async fn handle_eval(args: EvalArgs) -> anyhow::Result<()> {
    let results = harness::load_results_jsonl(&args.results)
        .map_err(|e| anyhow::anyhow!("Failed to load {}: {e}", args.results.display()))?;
    anyhow::ensure!(!results.is_empty(), "No results in {}", args.results.display());

    info!(results = results.len(), "Starting independent evaluation");
    let verifier = Verifier::new(
        VerifierConfig::new()
            .with_timeout_secs(args.timeout)
            .with_python_bin(args.python_bin.clone()),
    );
    let report = eval::evaluate_results(&results, &verifier).await?;
    eval::save_report(&report, &args.output)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("\n=== Evaluation Results ===");
        println!("Total:    {}", report.total);
        println!("Passed:   {}", report.passed);
        println!("Failed:   {}", report.failed);
        println!("Errors:   {}", report.errors);
        println!("Timeouts: {}", report.timeouts);
        println!("pass@1:   {:.1}%", report.pass_at_1);
        if !report.by_bug_type.is_empty() {
            println!("\nBy bug type:");
            for (bug_type, stats) in &report.by_bug_type {
                println!("  {:<20} {}/{}", bug_type, stats.passed, stats.total);
            }
        }
        println!("\nReport written to {}", args.output.display());
    }
    Ok(())
}

async fn handle_verify(args: VerifyArgs) -> anyhow::Result<()> {
    let candidate = std::fs::read_to_string(&args.code)
        .map_err(|e| anyhow::anyhow!("Failed to read {}: {e}", args.code.display()))?;
    let tests = std::fs::read_to_string(&args.tests)
        .map_err(|e| anyhow::anyhow!("Failed to read {}: {e}", args.tests.display()))?;

    let verifier = Verifier::new(
        VerifierConfig::new()
            .with_timeout_secs(args.timeout)
            .with_python_bin(args.python_bin.clone()),
    );
    let verdict = verifier.verify(&candidate, &tests).await?;
    println!("{}", serde_json::to_string_pretty(&verdict)?);
    Ok(())
}

fn handle_sample(args: SampleArgs) -> anyhow::Result<()> {
    let tasks = dataset::load_or_mock(args.dataset.as_deref());
    let sampled = dataset::sample_per_bug_type(&tasks, args.seed);
    dataset::save_jsonl(&sampled, &args.output)?;

    println!(
        "Sampled {} of {} tasks into {}",
        sampled.len(),
        tasks.len(),
        args.output.display()
    );
    for task in &sampled {
        println!(
            "  {} [{}]",
            task.task_id,
            task.bug_type.as_deref().unwrap_or("unknown")
        );
    }
    Ok(())
}

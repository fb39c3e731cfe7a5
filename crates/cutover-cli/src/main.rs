//! Cutover CLI
//!
//! The `cutover` command executes DNS cutover plans described as JSON.
//!
//! ## Commands
//!
//! - `run`: Execute a plan (live, dry run, or manual instructions)
//! - `validate`: Check a plan and the DNS providers it needs
//! - `instructions`: Print the manual runbook for a plan
//! - `template`: Print an example plan

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use cutover_core::{
    render_manual_instructions, CutoverEngine, CutoverPlan, EngineConfig, ExecuteOptions,
    ExecutionResult, HealthCheck, HealthCheckerConfig, RollbackTrigger, TriggerCondition,
};
use cutover_dns::{DnsChange, ProviderRegistry, RecordType};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use tracing::{info, warn, Level};

#[derive(Parser)]
#[command(name = "cutover")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Execute DNS cutover plans with health checks and rollback", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines and events
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a cutover plan
    Run {
        /// Path to the plan file (JSON)
        #[arg(short, long)]
        plan: PathBuf,

        /// Simulate every step without touching DNS or probing targets
        #[arg(long)]
        dry_run: bool,

        /// Print operator instructions instead of executing
        #[arg(long)]
        manual: bool,

        /// DNS provider for every change (default: each change's own, else manual)
        #[arg(long, env = "CUTOVER_PROVIDER")]
        provider: Option<String>,

        /// Plan-wide timeout in seconds
        #[arg(long)]
        timeout_secs: Option<u64>,
    },

    /// Validate a plan and the availability of its DNS providers
    Validate {
        /// Path to the plan file (JSON)
        #[arg(short, long)]
        plan: PathBuf,

        /// DNS provider to validate against
        #[arg(long, env = "CUTOVER_PROVIDER")]
        provider: Option<String>,
    },

    /// Print the manual runbook for a plan
    Instructions {
        /// Path to the plan file (JSON)
        #[arg(short, long)]
        plan: PathBuf,
    },

    /// Print an example plan
    Template,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    cutover_core::telemetry::init_tracing(cli.json, level);

    match cli.command {
        Commands::Run {
            plan,
            dry_run,
            manual,
            provider,
            timeout_secs,
        } => {
            let options = ExecuteOptions {
                dry_run,
                manual,
                timeout_secs,
                provider,
            };
            cmd_run(&plan, options, cli.json).await
        }
        Commands::Validate { plan, provider } => cmd_validate(&plan, provider).await,
        Commands::Instructions { plan } => cmd_instructions(&plan),
        Commands::Template => cmd_template(),
    }
}

fn build_engine() -> Result<CutoverEngine> {
    CutoverEngine::with_health_checker(
        ProviderRegistry::with_manual(),
        EngineConfig::from_env(),
        HealthCheckerConfig::from_env(),
    )
    .context("Failed to initialise health checker")
}

fn load_plan(path: &Path) -> Result<CutoverPlan> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read plan file: {:?}", path))?;
    serde_json::from_str(&content).with_context(|| format!("Invalid plan JSON in {:?}", path))
}

async fn cmd_run(path: &Path, options: ExecuteOptions, json: bool) -> Result<()> {
    let plan = load_plan(path)?;
    let plan_id = plan.id.clone();
    let manual = options.manual;
    let engine = build_engine()?;

    let handle = engine
        .execute(plan, options)
        .await
        .context("Failed to start cutover")?;
    let (mut events, join) = handle.into_parts();

    loop {
        tokio::select! {
            event = events.next() => match event {
                Some(event) if json => println!("{}", serde_json::to_string(&event)?),
                Some(event) => println!("{}", event.render()),
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                warn!(plan_id = %plan_id, "Interrupt received; cancelling cutover");
                if let Err(e) = engine.cancel(&plan_id).await {
                    warn!(plan_id = %plan_id, error = %e, "Cancel request ignored");
                }
            }
        }
    }

    let result = join.await.context("Cutover task failed")?;
    if manual {
        if let Some(instructions) = &result.instructions {
            print!("{}", instructions);
        }
        return Ok(());
    }
    print_result(&result)?;

    if !result.success {
        bail!(
            "Cutover {} finished with status {}",
            result.plan_id,
            result.status
        );
    }
    Ok(())
}

fn print_result(result: &ExecutionResult) -> Result<()> {
    let rendered =
        serde_json::to_string_pretty(result).context("Failed to serialise execution result")?;
    println!("{}", rendered);
    Ok(())
}

async fn cmd_validate(path: &Path, provider: Option<String>) -> Result<()> {
    let plan = load_plan(path)?;
    let engine = build_engine()?;
    let options = ExecuteOptions {
        provider,
        ..ExecuteOptions::default()
    };
    engine
        .validate_plan(&plan, &options)
        .await
        .with_context(|| format!("Plan {} is not valid", plan.id))?;
    info!(plan_id = %plan.id, "Plan validated");
    println!(
        "Plan '{}' is valid: {} pre-check(s), {} DNS change(s), {} post-check(s)",
        plan.name,
        plan.pre_checks.len(),
        plan.dns_changes.len(),
        plan.post_checks.len()
    );
    Ok(())
}

fn cmd_instructions(path: &Path) -> Result<()> {
    let mut plan = load_plan(path)?;
    if plan.steps.is_empty() {
        plan.build_steps();
    }
    plan.validate()
        .with_context(|| format!("Plan {} is not valid", plan.id))?;
    print!("{}", render_manual_instructions(&plan));
    Ok(())
}

fn cmd_template() -> Result<()> {
    let rendered =
        serde_json::to_string_pretty(&example_plan()).context("Failed to serialise template")?;
    println!("{}", rendered);
    Ok(())
}

fn example_plan() -> CutoverPlan {
    let mut plan = CutoverPlan::with_id("example-cutover", "bundle-001", "Move api.example.com");
    plan.dns_propagation_wait_secs = 60;
    plan.timeout_secs = Some(1800);
    plan.add_pre_check(
        HealthCheck::http("target-up", "New API healthy", "https://203.0.113.10/health", 200)
            .with_retries(3, 2000),
    )
    .add_dns_change(
        DnsChange::new(
            "api-a",
            "example.com",
            RecordType::A,
            "api",
            "198.51.100.7",
            "203.0.113.10",
        )
        .with_ttl(60),
    )
    .add_post_check(
        HealthCheck::dns("api-resolves", "api resolves to new IP", "api.example.com", "203.0.113.10")
            .with_retries(5, 10_000),
    )
    .add_post_check(HealthCheck::http(
        "api-up",
        "API healthy via DNS",
        "https://api.example.com/health",
        200,
    ))
    .add_rollback_trigger(RollbackTrigger::new(
        "api-down",
        TriggerCondition::HealthCheck {
            health_check_id: "api-up".to_string(),
            consecutive_failures: 1,
        },
    ));
    plan
}

//! Cascade Advisor - Real-Time Decision Pipeline
//!
//! Reads observations, validates them against recent history, and emits one
//! decision event per observation within a fixed cycle budget.
//!
//! # Usage
//!
//! ```bash
//! # Live observations from an upstream perception process
//! perception --json | ./cascade-advisor --stdin
//!
//! # Replay a recorded session, 500ms between observations
//! ./cascade-advisor --replay session.jsonl --delay-ms 500
//!
//! # Validate a config file and print the effective settings
//! ./cascade-advisor --config pipeline.toml check-config --dump
//!
//! # Show the last decisions from the audit log
//! ./cascade-advisor --decision-log ./data/decisions.db history --limit 10
//! ```
//!
//! # Environment Variables
//!
//! - `CASCADE_CONFIG`: Path to pipeline.toml (overridden by `--config`)
//! - `OPENAI_API_KEY`, `GEMINI_API_KEY`: Provider credentials (names are configurable)
//! - `RUST_LOG`: Logging level (default: info)

use anyhow::{Context, Result};
use cascade_advisor::baseline::{BaselineProvider, StrategyTable};
use cascade_advisor::config::{self, defaults, PipelineConfig};
use cascade_advisor::observability::{ChannelHook, HookSet, ObservabilityHook, TracingHook};
use cascade_advisor::pipeline::{
    Collaborators, DecisionOrchestrator, ProcessingLoop, ReplaySource, StdinSource,
};
use cascade_advisor::sink::{DecisionSink, JsonLinesSink, SinkSet};
use cascade_advisor::storage::DecisionLog;
use cascade_advisor::{llm, DecisionEvent};
use clap::Parser;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "cascade-advisor")]
#[command(about = "Real-time decision pipeline with ordered reasoning fallback")]
#[command(version)]
struct CliArgs {
    /// Path to pipeline.toml (default: $CASCADE_CONFIG, then ./pipeline.toml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Read JSON observations from stdin, one per line
    #[arg(long, conflicts_with = "replay")]
    stdin: bool,

    /// Replay observations from a JSON-lines file
    #[arg(long, value_name = "FILE")]
    replay: Option<PathBuf>,

    /// Delay between replayed observations (0 = as fast as possible)
    #[arg(long, default_value = "1000")]
    delay_ms: u64,

    /// Emit logs as JSON on stderr
    #[arg(long)]
    log_json: bool,

    /// sled decision log directory (overrides storage.decision_log)
    #[arg(long, value_name = "DIR", env = "CASCADE_DECISION_LOG")]
    decision_log: Option<PathBuf>,

    /// Write per-attempt and per-cycle audit records as JSON lines
    #[arg(long, value_name = "FILE")]
    audit_log: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<SubCommand>,
}

#[derive(clap::Subcommand, Debug)]
enum SubCommand {
    /// Load and validate the configuration, then exit
    CheckConfig {
        /// Print the effective configuration as TOML
        #[arg(long)]
        dump: bool,
    },

    /// Print recent decisions from the decision log
    History {
        /// Number of decisions to show, newest first
        #[arg(long, default_value = "20")]
        limit: usize,
    },
}

// ============================================================================
// Setup Helpers
// ============================================================================

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    match path {
        Some(p) => PipelineConfig::load_from_file(p)
            .with_context(|| format!("Failed to load config {}", p.display())),
        None => Ok(PipelineConfig::load()),
    }
}

fn load_baseline(config: &PipelineConfig) -> Result<Arc<dyn BaselineProvider>> {
    let table = match &config.baseline.table {
        Some(path) => StrategyTable::load(path)?,
        None => {
            info!("No strategy table configured, every lookup returns the table default");
            StrategyTable::default()
        }
    };
    Ok(Arc::new(table))
}

fn decision_log_path(args: &CliArgs, config: &PipelineConfig) -> Option<PathBuf> {
    args.decision_log
        .clone()
        .or_else(|| config.storage.decision_log.clone())
}

/// Drain audit records into a JSON-lines file until the hook is dropped.
fn spawn_audit_writer(
    path: &Path,
    mut rx: tokio::sync::mpsc::Receiver<cascade_advisor::observability::AuditRecord>,
) -> Result<tokio::task::JoinHandle<()>> {
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open audit log {}", path.display()))?;
    Ok(tokio::spawn(async move {
        while let Some(record) = rx.recv().await {
            let written = serde_json::to_string(&record)
                .map_err(std::io::Error::from)
                .and_then(|line| writeln!(file, "{line}"));
            if let Err(e) = written {
                warn!("Failed to write audit record: {}", e);
            }
        }
    }))
}

// ============================================================================
// Subcommands
// ============================================================================

fn run_check_config(config: &PipelineConfig, dump: bool) -> Result<()> {
    config.validate()?;
    let orch = config.orchestrator_config();
    println!("Configuration OK (session '{}')", config.session.name);
    println!("  history capacity:    {}", orch.history_capacity);
    println!("  confidence threshold: {:.2}", orch.confidence_threshold);
    println!("  cycle deadline:      {}ms", orch.cycle_deadline.as_millis());
    println!("  provider timeout:    {}ms", orch.provider_timeout.as_millis());
    println!("  provider order:      {}", orch.provider_order.join(" → "));
    for w in config::validation::validate_budget_ranges(config) {
        println!("  warning: {w}");
    }
    if dump {
        println!();
        print!("{}", config.to_toml()?);
    }
    Ok(())
}

fn run_history(path: &Path, limit: usize) -> Result<()> {
    let log = DecisionLog::open(path)?;
    let stats = log.stats();
    println!(
        "{} decisions logged ({} decision, {} uncertain, {} degraded)",
        log.count(),
        stats.decisions,
        stats.uncertain,
        stats.degraded
    );
    for emitted in log.recent(limit) {
        let meta = &emitted.metadata;
        let summary = match &emitted.event {
            DecisionEvent::Decision(r) => format!("{} {:.2} ({})", r.action, r.amount, r.provenance),
            DecisionEvent::Uncertain(a) => format!("uncertain ({a:.2})"),
            DecisionEvent::Degraded(b) => format!("degraded: {} {:.2}", b.action, b.amount),
        };
        println!(
            "  {} #{:<6} {:>5}ms  {}",
            meta.emitted_at.format("%H:%M:%S%.3f"),
            meta.sequence,
            meta.cycle_latency.as_millis(),
            summary
        );
    }
    Ok(())
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();
    init_tracing(args.log_json);

    let config = load_config(args.config.as_deref())?;

    match &args.command {
        Some(SubCommand::CheckConfig { dump }) => return run_check_config(&config, *dump),
        Some(SubCommand::History { limit }) => {
            let path = decision_log_path(&args, &config)
                .unwrap_or_else(|| PathBuf::from(defaults::DECISION_LOG_PATH));
            return run_history(&path, *limit);
        }
        None => {}
    }

    config.validate()?;

    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!("  Cascade Advisor");
    info!("  Session: {}", config.session.name);
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let providers = llm::build_providers(&config.providers)?;
    let baseline = load_baseline(&config)?;

    // Decisions go to stdout; logs stay on stderr.
    let mut sinks = SinkSet::new().with(Arc::new(JsonLinesSink::new(std::io::stdout())));
    let decision_log = match decision_log_path(&args, &config) {
        Some(path) => {
            let log = DecisionLog::open(&path)?;
            sinks = sinks.with(Arc::new(log.clone()));
            Some(log)
        }
        None => None,
    };
    let sink: Arc<dyn DecisionSink> = Arc::new(sinks);

    let mut hooks = HookSet::new().with(Arc::new(TracingHook));
    let mut audit_task = None;
    if let Some(path) = &args.audit_log {
        let (hook, rx) = ChannelHook::new(defaults::HOOK_CHANNEL_CAPACITY);
        audit_task = Some(spawn_audit_writer(path, rx)?);
        hooks = hooks.with(Arc::new(hook));
    }
    let hook: Arc<dyn ObservabilityHook> = Arc::new(hooks);

    let orchestrator = DecisionOrchestrator::new(
        config.orchestrator_config(),
        Collaborators::new(providers, baseline, sink).with_hook(hook),
    )?;

    // Graceful shutdown via Ctrl+C
    let cancel_token = CancellationToken::new();
    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("🛑 Received Ctrl+C, initiating shutdown...");
        shutdown_token.cancel();
    });

    let processing = ProcessingLoop::new(orchestrator, cancel_token);
    let stats = match &args.replay {
        Some(path) => {
            info!("📥 Input: replay {} ({}ms between observations)", path.display(), args.delay_ms);
            processing.run(ReplaySource::from_jsonl(path, args.delay_ms)?).await
        }
        None => {
            if !args.stdin {
                info!("No --replay file given, reading observations from stdin");
            }
            info!("📥 Input: stdin (JSON observations)");
            processing.run(StdinSource::new()).await
        }
    };

    if let Some(log) = decision_log {
        if let Err(e) = log.flush() {
            warn!("Failed to flush decision log: {}", e);
        }
    }
    // The orchestrator (and with it the audit hook's sender) is gone by now.
    if let Some(task) = audit_task {
        task.await.ok();
    }

    info!("{}", stats);
    info!("✓ Cascade Advisor shutdown complete");
    Ok(())
}

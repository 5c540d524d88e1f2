use std::path::PathBuf;
use std::process::exit;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use osprobe::engine::{EnginePhase, ProbeEngine, RunObserver};
use osprobe::finding::Finding;
use osprobe::report::Report;
use osprobe::target::Target;
use osprobe::Config;

#[derive(Parser)]
#[command(name = "osprobe")]
#[command(version)]
#[command(about = "OSINT probe engine: usernames, domains, hosts and email addresses")]
struct Args {
    /// Username to search across social platforms (repeatable)
    #[arg(short, long)]
    username: Vec<String>,

    /// Domain to analyze: DNS, WHOIS, web technologies (repeatable)
    #[arg(short, long)]
    domain: Vec<String>,

    /// IPv4 address to analyze: reverse DNS, geolocation (repeatable)
    #[arg(short, long)]
    ip: Vec<String>,

    /// Email address to analyze: MX, SPF, DMARC (repeatable)
    #[arg(short, long)]
    email: Vec<String>,

    /// Concurrent probes per batch (1-20)
    #[arg(long)]
    concurrency: Option<usize>,

    /// Per-probe timeout in seconds (5-60)
    #[arg(long)]
    timeout: Option<u64>,

    /// Also scan well-known TCP ports on IP targets
    #[arg(long)]
    deep_scan: bool,

    /// Write the JSON report to this path instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Config file path (default: ~/.osprobe/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn targets(&self) -> Vec<Target> {
        let mut targets = Vec::new();
        targets.extend(self.username.iter().map(Target::username));
        targets.extend(self.domain.iter().map(Target::domain));
        targets.extend(self.ip.iter().map(Target::host));
        targets.extend(self.email.iter().map(Target::email));
        targets
    }
}

/// Prints progress and per-target summaries to stderr, keeping stdout clean
/// for the JSON report.
struct CliObserver;

impl RunObserver for CliObserver {
    fn on_progress(&self, percent: f32, label: &str) {
        eprintln!("[{:>5.1}%] {}", percent, label);
    }

    fn on_finding(&self, finding: &Finding) {
        eprintln!("  {} -> {:?}", finding.source, finding.status);
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let filter = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(args).await {
        error!("{:#}", e);
        exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    let mut config = Config::load(args.config.as_deref())?;
    if let Some(concurrency) = args.concurrency {
        config.concurrency = concurrency;
    }
    if let Some(timeout) = args.timeout {
        config.timeout_secs = timeout;
    }
    if args.deep_scan {
        config.deep_scan = true;
    }

    let targets = args.targets();
    info!("Submitting {} targets", targets.len());

    let engine = ProbeEngine::with_network(config)?.with_observer(std::sync::Arc::new(CliObserver));
    let handle = engine.start_run(targets)?;

    // First Ctrl-C requests cooperative cancellation; the in-flight target
    // still finishes and partial results are exported.
    let state = handle.state();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Cancellation requested, finishing current target...");
            state.request_cancel();
        }
    });

    handle.wait().await;

    match engine.phase() {
        EnginePhase::Completed => info!("Run completed"),
        EnginePhase::Cancelled => info!("Run cancelled, exporting partial results"),
        phase => anyhow::bail!("run ended abnormally: {:?}", phase),
    }

    let report = Report::from_store(&engine.store());
    match &args.output {
        Some(path) => report.write_to(path)?,
        None => println!("{}", report.to_json()?),
    }

    Ok(())
}

//! prerender CLI
//!
//! Usage: prerender [OPTIONS]
//!
//! Serves the built site in `dist/`, snapshots the root page in headless
//! Chrome and overwrites `dist/index.html` with the rendered markup. Exits
//! with status 1 if any stage fails.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use log::{error, info};
use prerender::{BrowserConfig, PrerenderConfig, Prerenderer, Quiescence, ServerConfig, SnapshotReport, Viewport};
use tracing_subscriber::EnvFilter;

/// Prerender a client-rendered site into its static entry document
#[derive(Parser, Debug)]
#[command(name = "prerender")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Built output directory
    #[arg(long, default_value = "dist")]
    dist: PathBuf,

    /// Entry document inside the output directory
    #[arg(long, default_value = "index.html")]
    entry: String,

    /// Loopback address to serve on
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port to serve on
    #[arg(long, default_value_t = 4173)]
    port: u16,

    /// Fixed grace period after network idle, in milliseconds
    #[arg(long, default_value_t = 3000)]
    settle_ms: u64,

    /// Wait until the DOM has not changed for this many milliseconds instead
    /// of the fixed grace period
    #[arg(long, conflicts_with = "ready_expr")]
    dom_quiet_ms: Option<u64>,

    /// Wait until this page expression is truthy instead of the fixed grace
    /// period
    #[arg(long)]
    ready_expr: Option<String>,

    /// Upper bound for --dom-quiet-ms / --ready-expr, in milliseconds
    #[arg(long, default_value_t = 10000)]
    settle_max_ms: u64,

    /// Navigation and network-idle timeout, in milliseconds
    #[arg(long, default_value_t = 30000)]
    timeout_ms: u64,

    /// Mount node that must contain rendered content
    #[arg(long, default_value = "#root")]
    mount: String,

    /// Skip the mount node check
    #[arg(long)]
    no_verify: bool,

    /// Chrome/Chromium binary (auto-detected by default)
    #[arg(long)]
    chrome: Option<PathBuf>,

    /// Disable the Chrome sandbox (needed when running as root in containers)
    #[arg(long)]
    no_sandbox: bool,

    /// Print the run report as JSON on stdout
    #[arg(long)]
    json: bool,

    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn quiescence(&self) -> Quiescence {
        let max = Duration::from_millis(self.settle_max_ms);
        match (&self.ready_expr, self.dom_quiet_ms) {
            (Some(expression), _) => Quiescence::ReadySignal { expression: expression.clone(), max },
            (None, Some(window)) => Quiescence::DomQuiet { window: Duration::from_millis(window), max },
            (None, None) => Quiescence::FixedDelay(Duration::from_millis(self.settle_ms)),
        }
    }

    fn into_config(self) -> PrerenderConfig {
        let quiescence = self.quiescence();
        PrerenderConfig {
            server: ServerConfig {
                root: self.dist,
                entry: self.entry,
                host: self.host,
                port: self.port,
                ..Default::default()
            },
            browser: BrowserConfig {
                viewport: Viewport::default(),
                timeout_ms: self.timeout_ms,
                sandbox: !self.no_sandbox,
                chrome_path: self.chrome,
                ..Default::default()
            },
            quiescence,
            mount_selector: (!self.no_verify).then_some(self.mount),
        }
    }
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "prerender=info,warn",
        1 => "prerender=debug,info",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn print_report(report: &SnapshotReport) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(report).context("failed to serialize report")?;
    println!("{}", json);
    Ok(())
}

/// The single operator-facing line for a failed run
fn failure_message(e: &prerender::Error) -> String {
    format!("Pre-rendering failed during {} stage: {}", e.stage(), e)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let json = cli.json;

    let prerenderer = Prerenderer::new(cli.into_config());
    match prerenderer.run().await {
        Ok(report) => {
            info!(
                "Done: {} now contains the rendered page \"{}\" ({} ms)",
                report.entry.display(),
                report.title,
                report.elapsed_ms
            );
            if json {
                if let Err(e) = print_report(&report) {
                    error!("{:#}", e);
                    return ExitCode::FAILURE;
                }
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{}", failure_message(&e));
            ExitCode::FAILURE
        }
    }
}

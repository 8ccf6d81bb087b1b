//! USSD CLI
//!
//! Runs scripted USSD scenarios against the in-memory platform.
//!
//! Usage from workspace root:
//!   cargo run --bin ussd -- run scenarios/balance.json
//!   cargo run --bin ussd -- run scenarios/balance.json --initial-delay-ms 500
//!   cargo run --bin ussd -- sims scenarios/balance.json
//!   cargo run --bin ussd -- check scenarios/balance.json

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{debug, info};
use ussd_launcher::platforms::memory::MemoryPlatform;
use ussd_launcher::{TimingOverrides, UssdLauncher};

mod scenario;

use scenario::Scenario;

#[derive(Parser)]
#[command(name = "ussd")]
#[command(about = "Drive multi-step USSD sessions from a script")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Parser, Debug)]
struct RunArgs {
    /// Scenario file (JSON)
    scenario: PathBuf,

    /// Delay between dialing and the first readiness check
    #[clap(long, env = "USSD_INITIAL_DELAY_MS")]
    initial_delay_ms: Option<u64>,

    /// Delay between a confirm click and the next readiness check
    #[clap(long, env = "USSD_OPTION_DELAY_MS")]
    option_delay_ms: Option<u64>,

    /// Attempts allowed per reply before it is skipped
    #[clap(long, env = "USSD_MAX_RETRIES")]
    max_retries: Option<u32>,

    /// Print the final report as JSON
    #[clap(long)]
    json: bool,

    /// Verbose output
    #[clap(long, short)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a scenario and print every dialog message
    Run(RunArgs),
    /// List the SIM cards a scenario declares
    Sims {
        /// Scenario file (JSON)
        scenario: PathBuf,
    },
    /// Validate a scenario without running it
    Check {
        /// Scenario file (JSON)
        scenario: PathBuf,
    },
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let default = if verbose { "debug" } else { "info" };
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Run(args) => run(args).await,
        Commands::Sims { scenario } => {
            init_logging(false);
            sims(scenario)
        }
        Commands::Check { scenario } => {
            init_logging(false);
            let scenario_file = scenario.display().to_string();
            Scenario::load(&scenario)?.check()?;
            println!("✅ {scenario_file} is valid");
            Ok(())
        }
    }
}

async fn run(args: RunArgs) -> Result<()> {
    init_logging(args.verbose);

    let scenario = Scenario::load(&args.scenario)?;
    scenario.check()?;

    let mut config = scenario.config.clone().with_overrides(&TimingOverrides {
        initial_delay_ms: args.initial_delay_ms,
        option_delay_ms: args.option_delay_ms,
    });
    if let Some(max_retries) = args.max_retries {
        config.max_retries = max_retries;
    }
    debug!(?config, "Effective session config");

    let memory = MemoryPlatform::new(scenario.screens());
    memory.telephony.set_sim_cards(scenario.sims.clone());
    let launcher = UssdLauncher::new(memory.platform(), config.clone());
    let forwarder = launcher.forward_events(memory.engine.subscribe());

    let mut request = launcher
        .request(&scenario.code, scenario.slot, scenario.options.clone())
        .with_config(config);
    if let Some(classification) = scenario.classification.clone() {
        request = request.with_classification(classification);
    }
    if let Some(message) = scenario.overlay_message.as_deref() {
        request = request.with_overlay(message);
    }

    info!("Dialing {} on slot {}", scenario.code, scenario.slot);
    let mut handle = launcher
        .multisession_ussd(request)
        .await
        .context("Failed to start USSD session")?;

    let mut step = 0;
    while let Some(message) = handle.next_message().await {
        step += 1;
        println!("📨 [{step}] {message}");
    }

    let report = handle.wait().await.context("USSD session failed")?;
    forwarder.abort();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "🏁 {} after {} replies",
            report.state, report.steps_delivered
        );
        for skipped in &report.skipped {
            println!(
                "⚠️  skipped '{}' after {} attempts",
                skipped.value, skipped.attempts
            );
        }
        if let Some(message) = &report.final_message {
            println!("Final message: {message}");
        }
    }
    Ok(())
}

fn sims(path: PathBuf) -> Result<()> {
    let scenario = Scenario::load(&path)?;
    let memory = MemoryPlatform::new(Vec::new());
    memory.telephony.set_sim_cards(scenario.sims);
    let launcher = UssdLauncher::new(memory.platform(), scenario.config);

    let cards = launcher
        .get_sim_cards()
        .context("Failed to read SIM cards")?;
    if cards.is_empty() {
        println!("No SIM cards declared in {}", path.display());
        return Ok(());
    }
    for sim in &cards {
        println!(
            "slot {} | subscription {} | {} | {}",
            sim.slot_index,
            sim.subscription_id,
            sim.display_name.as_deref().unwrap_or("-"),
            sim.carrier_name.as_deref().unwrap_or("-"),
        );
    }
    Ok(())
}

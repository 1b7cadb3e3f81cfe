//! ---
//! ems_section: "01-core-functionality"
//! ems_subsection: "binary"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Binary entrypoint for the LumiCert simulator daemon."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, FixedOffset, Timelike};
use clap::{Parser, Subcommand};
use lumicert_common::{init_tracing, AppConfig, OperatingMode};
use lumicert_core::{Clock, PublishLoop, SystemClock};
use lumicert_msg::MqttTransport;
use lumicert_sim::{FleetPayload, FleetSimulator, RngEntropy};
use tokio::signal;
use tracing::{info, warn};

const DEFAULT_CONFIG: &str = "configs/lumicert.toml";

#[derive(Debug, Parser)]
#[command(author, version, about = "LumiCert street-light telemetry simulator", long_about = None)]
struct Cli {
    #[arg(long, value_name = "FILE", help = "Path to configuration file")]
    config: Option<PathBuf>,

    #[arg(long, help = "Override relay control mode (auto or manual)")]
    mode: Option<OperatingMode>,

    #[arg(long, help = "Seed for a reproducible run")]
    seed: Option<u64>,

    #[arg(long, help = "Stop after this many ticks")]
    ticks: Option<u64>,

    #[arg(long, value_name = "MS", help = "Override the publish interval")]
    interval_ms: Option<u64>,

    #[arg(long, help = "Override the telemetry topic")]
    topic: Option<String>,

    #[arg(long, help = "Override the broker host")]
    host: Option<String>,

    #[arg(long, help = "Override the broker port")]
    port: Option<u16>,

    #[arg(long, env = "LUMICERT_MQTT_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Connect to the broker and publish until interrupted")]
    Run,
    #[command(about = "Assemble payloads offline and write them as JSON")]
    Generate {
        #[arg(long, default_value_t = 10)]
        ticks: u32,
        /// Output file path. Use '-' for stdout.
        #[arg(long, default_value = "-")]
        output: PathBuf,
        /// Local hour to stamp on the first payload
        #[arg(long, value_parser = clap::value_parser!(u32).range(0..24))]
        hour: Option<u32>,
    },
    #[command(about = "Validate the configuration and print the effective settings")]
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let loaded = AppConfig::load_with_source(cli.config.as_deref(), &[DEFAULT_CONFIG])?;
    let mut config = loaded.config;
    apply_overrides(&cli, &mut config);
    config
        .validate()
        .context("configuration rejected after command-line overrides")?;

    match &cli.command {
        None | Some(Commands::Run) => {
            init_tracing("lumicertd", &config.logging)?;
            match &loaded.source {
                Some(path) => info!(config_path = %path.display(), "configuration loaded"),
                None => info!("using built-in configuration defaults"),
            }
            run_daemon(&config, cli.ticks).await?;
        }
        Some(Commands::Generate {
            ticks,
            output,
            hour,
        }) => {
            let start = start_instant(SystemClock.now(), *hour)?;
            let payloads = generate_payloads(&config, *ticks, start)?;
            write_payloads(output, &payloads)?;
            if output.as_os_str() != "-" {
                eprintln!("generated {} payloads -> {}", payloads.len(), output.display());
            }
        }
        Some(Commands::CheckConfig) => {
            match &loaded.source {
                Some(path) => println!("# source: {}", path.display()),
                None => println!("# source: built-in defaults"),
            }
            print!("{}", toml::to_string_pretty(&config)?);
        }
    }

    Ok(())
}

fn apply_overrides(cli: &Cli, config: &mut AppConfig) {
    if let Some(mode) = cli.mode {
        config.simulation.mode = mode;
    }
    if let Some(seed) = cli.seed {
        config.simulation.seed = Some(seed);
    }
    if let Some(interval_ms) = cli.interval_ms {
        config.telemetry.interval = Duration::from_millis(interval_ms);
    }
    if let Some(topic) = &cli.topic {
        config.telemetry.topic = topic.clone();
    }
    if let Some(host) = &cli.host {
        config.broker.host = host.clone();
    }
    if let Some(port) = cli.port {
        config.broker.port = port;
    }
    if let Some(password) = &cli.password {
        config.broker.password = Some(password.clone());
    }
}

async fn run_daemon(config: &AppConfig, ticks: Option<u64>) -> Result<()> {
    let transport = Arc::new(MqttTransport::from_config(&config.broker));
    let mut publish_loop = PublishLoop::new(config, transport)?;
    if let Some(ticks) = ticks {
        publish_loop = publish_loop.with_tick_limit(ticks);
    }

    let shutdown = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!(error = %err, "unable to listen for ctrl-c; running until the tick limit");
            std::future::pending::<()>().await;
        }
    };
    let stats = publish_loop.run(shutdown).await.with_context(|| {
        format!(
            "unable to connect to mqtt broker {}:{}",
            config.broker.host, config.broker.port
        )
    })?;
    info!(
        ticks = stats.ticks,
        published = stats.published,
        failed = stats.failed,
        "simulator stopped"
    );
    Ok(())
}

/// First payload instant: `now`, or today at `hour:00:00` local time.
fn start_instant(now: DateTime<FixedOffset>, hour: Option<u32>) -> Result<DateTime<FixedOffset>> {
    match hour {
        None => Ok(now),
        Some(hour) => now
            .with_hour(hour)
            .and_then(|t| t.with_minute(0))
            .and_then(|t| t.with_second(0))
            .and_then(|t| t.with_nanosecond(0))
            .with_context(|| format!("hour {hour} is not representable today")),
    }
}

fn generate_payloads(
    config: &AppConfig,
    ticks: u32,
    start: DateTime<FixedOffset>,
) -> Result<Vec<FleetPayload>> {
    let mut simulator = FleetSimulator::new(&config.simulation)?;
    let mut entropy = RngEntropy::from_seed_option(config.simulation.seed);
    let step = chrono::Duration::from_std(config.telemetry.interval)
        .context("publish interval out of range")?;

    let mut payloads = Vec::with_capacity(ticks as usize);
    let mut now = start;
    for _ in 0..ticks {
        payloads.push(simulator.assemble(&now, &mut entropy));
        now += step;
    }
    Ok(payloads)
}

fn write_payloads(output: &Path, payloads: &[FleetPayload]) -> Result<()> {
    if output.as_os_str() == "-" {
        let mut stdout = io::stdout().lock();
        serde_json::to_writer_pretty(&mut stdout, payloads)?;
        stdout.write_all(b"\n")?;
    } else {
        let file = File::create(output)
            .with_context(|| format!("failed to create output file {}", output.display()))?;
        serde_json::to_writer_pretty(file, payloads)?;
    }
    Ok(())
}

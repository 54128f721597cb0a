//! # Zebra Probe CLI
//!
//! Command-line front end for the test-print session.
//!
//! ## Usage
//!
//! ```bash
//! # Test a network printer
//! zebra-probe test-print --host 10.0.0.5 --port 9100
//!
//! # Test a Bluetooth printer bound to an RFCOMM node
//! zebra-probe test-print --bluetooth AC:3F:A4:F0:94:3B
//!
//! # Re-run against the last printer that connected
//! zebra-probe test-print
//!
//! # Show what is saved
//! zebra-probe settings
//! ```
//!
//! Status lines go to stdout; diagnostics go to stderr and follow `RUST_LOG`.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use zebra_probe::{
    ProbeError,
    printer::SgdDetector,
    session::{
        ConnectionConfig, ConsoleReporter, SessionController, SessionState, StatusEvent,
        StatusReporter, report_until,
    },
    settings::{ConfigRepository, JsonFileRepository, SavedSettings},
    transport::{SystemConnector, Timeouts, network::DEFAULT_PORT},
};

/// Zebra Probe - label printer connection tester
#[derive(Parser, Debug)]
#[command(name = "zebra-probe")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Settings file (defaults to ~/.config/zebra-probe/settings.json)
    #[arg(long, global = true, env = "ZEBRA_PROBE_SETTINGS")]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Connect, check printer status and print a test label
    TestPrint {
        /// Bluetooth MAC address or RFCOMM device path
        #[arg(long, env = "ZEBRA_PROBE_BLUETOOTH")]
        bluetooth: Option<String>,

        /// Printer host name or IP address
        #[arg(long, env = "ZEBRA_PROBE_HOST")]
        host: Option<String>,

        /// Printer TCP port (defaults to the saved port, then 9100)
        #[arg(long, env = "ZEBRA_PROBE_PORT")]
        port: Option<String>,

        /// Seconds allowed for opening the connection
        #[arg(long, default_value = "10", value_parser = seconds())]
        open_timeout: u64,

        /// Seconds allowed for sending the label
        #[arg(long, default_value = "10", value_parser = seconds())]
        write_timeout: u64,

        /// Seconds to wait for each printer reply
        #[arg(long, default_value = "3", value_parser = seconds())]
        read_timeout: u64,

        /// Seconds before giving up on the whole run
        #[arg(long, default_value = "60", value_parser = seconds())]
        deadline: u64,
    },

    /// Show saved connection settings
    Settings,
}

/// Log filter used when `RUST_LOG` is unset
const DEFAULT_LOG_FILTER: &str = "zebra_probe=info";

/// Whole seconds, at least one. A zero timeout cannot bound a socket call.
fn seconds() -> clap::builder::RangedU64ValueParser<u64> {
    clap::value_parser!(u64).range(1..)
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    match run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<ExitCode, ProbeError> {
    let cli = Cli::parse();
    let repo = JsonFileRepository::new(
        cli.settings
            .unwrap_or_else(JsonFileRepository::default_path),
    );

    match cli.command {
        Commands::Settings => {
            let saved = repo.load()?;
            println!("Settings file: {}", repo.path().display());
            println!(
                "  Bluetooth address: {}",
                saved.bluetooth_address.as_deref().unwrap_or("-")
            );
            println!(
                "  Network host:      {}",
                saved.network_host.as_deref().unwrap_or("-")
            );
            println!(
                "  Network port:      {}",
                saved.network_port.as_deref().unwrap_or("-")
            );
            Ok(ExitCode::SUCCESS)
        }
        Commands::TestPrint {
            bluetooth,
            host,
            port,
            open_timeout,
            write_timeout,
            read_timeout,
            deadline,
        } => {
            let saved = repo.load()?;
            let config = choose_config(bluetooth, host, port, &saved)?;
            let timeouts = Timeouts {
                open: Duration::from_secs(open_timeout),
                write: Duration::from_secs(write_timeout),
                read: Duration::from_secs(read_timeout),
            };

            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?;
            let succeeded = runtime.block_on(test_print(
                config,
                timeouts,
                Duration::from_secs(deadline),
                &repo,
            ));

            Ok(if succeeded {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(2)
            })
        }
    }
}

/// Pick the connection from flags, falling back to saved settings.
fn choose_config(
    bluetooth: Option<String>,
    host: Option<String>,
    port: Option<String>,
    saved: &SavedSettings,
) -> Result<ConnectionConfig, ProbeError> {
    let default_port = DEFAULT_PORT.to_string();

    if let Some(address) = bluetooth {
        return Ok(ConnectionConfig::bluetooth(address));
    }

    if let Some(host) = host {
        let port = port
            .or_else(|| saved.network_port.clone())
            .unwrap_or(default_port);
        return Ok(ConnectionConfig::network(host, port));
    }

    saved
        .network_config(&default_port)
        .or_else(|| saved.bluetooth_config())
        .ok_or_else(|| {
            ProbeError::Settings(
                "No printer given: pass --bluetooth or --host (nothing saved yet)".to_string(),
            )
        })
}

async fn test_print(
    config: ConnectionConfig,
    timeouts: Timeouts,
    deadline: Duration,
    repo: &JsonFileRepository,
) -> bool {
    info!(target_printer = %config, "Starting test print");

    // Allow a little more than one read timeout for a complete reply
    let detector = SgdDetector::new(timeouts.read + timeouts.read / 2);
    let (controller, mut events) =
        SessionController::new(SystemConnector::new(timeouts), detector);
    let controller = Arc::new(controller);

    let mut reporter = SaveOnConnect {
        inner: ConsoleReporter::stdout(),
        repo,
        config: config.clone(),
    };

    let result = report_until(
        &mut events,
        &mut reporter,
        controller.run_with_deadline(config, deadline),
    )
    .await;

    match result {
        Ok(summary) => {
            info!(?summary, "Test print succeeded");
            true
        }
        Err(e) => {
            warn!(error = %e, "Test print failed");
            false
        }
    }
}

/// Console reporter that also persists the config once the link is up.
struct SaveOnConnect<'a> {
    inner: ConsoleReporter,
    repo: &'a JsonFileRepository,
    config: ConnectionConfig,
}

impl StatusReporter for SaveOnConnect<'_> {
    fn report(&mut self, event: &StatusEvent) {
        self.inner.report(event);

        if event.state == SessionState::Connected {
            if let Err(e) = self.repo.save(&self.config) {
                warn!(error = %e, "Failed to save connection settings");
            }
        }
    }
}

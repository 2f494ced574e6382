//! GroheBlue CLI
//!
//! Command-line client for GROHE Blue water dispensers.
//!
//! # Usage
//!
//! ```bash
//! # List the appliances registered to the account
//! groheblue devices
//!
//! # Dispense 250 ml of sparkling water
//! groheblue tap --type sparkling --amount 250
//!
//! # Reset the filter counter after a cartridge change
//! groheblue maintain reset-filter
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use groheblue_core::{
    default_config_path, ApplianceCommand, ApplianceId, ApplianceReading, ClientConfig,
    DashboardPoller, DispatchState, GroheClient, MaintenanceAction, TapType,
};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "groheblue")]
#[command(about = "Control GROHE Blue water dispensers through the GROHE cloud")]
#[command(version)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the current access token (masked) and its expiry
    Token {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Print the raw dashboard
    Dashboard,

    /// List appliances registered to the account
    Devices,

    /// Show measurements and state of an appliance
    Status {
        /// Appliance ID (defaults to the configured or first appliance)
        appliance: Option<String>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Dispense water
    Tap {
        /// Water type (still, medium, sparkling)
        #[arg(short = 't', long = "type")]
        tap_type: TapType,

        /// Amount in ml, a multiple of 50 up to 2000
        #[arg(short, long)]
        amount: u32,

        /// Appliance ID (defaults to the configured or first appliance)
        #[arg(long)]
        appliance: Option<String>,
    },

    /// Run a maintenance action
    Maintain {
        /// reset-co2, reset-filter, clean, measure, revoke-flush or auto-flush
        action: MaintenanceAction,

        /// Appliance ID (defaults to the configured or first appliance)
        #[arg(long)]
        appliance: Option<String>,
    },

    /// Poll the dashboard and print updates until Ctrl+C
    Watch {
        /// Poll interval in seconds (defaults to poll_interval_secs)
        #[arg(short, long)]
        interval: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = load_config(cli.config)?;
    let client = GroheClient::connect(&config)
        .await
        .context("Failed to sign in to the GROHE cloud")?;

    match cli.command {
        Commands::Token { format } => show_token(&client, &format).await,
        Commands::Dashboard => show_dashboard(&client).await,
        Commands::Devices => list_devices(&client).await,
        Commands::Status { appliance, format } => show_status(&client, appliance, &format).await,
        Commands::Tap {
            tap_type,
            amount,
            appliance,
        } => {
            let appliance = resolve_appliance(&client, appliance).await?;
            send(&client, ApplianceCommand::dispense(appliance, tap_type, amount)).await
        }
        Commands::Maintain { action, appliance } => {
            let appliance = resolve_appliance(&client, appliance).await?;
            send(&client, ApplianceCommand::maintenance(appliance, action)).await
        }
        Commands::Watch { interval } => watch(client, interval).await,
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<PathBuf>) -> Result<ClientConfig> {
    let path = match path {
        Some(path) => path,
        None => default_config_path()?,
    };

    let config = ClientConfig::load(&path)
        .with_context(|| format!("Failed to load configuration from {:?}", path))?;
    info!("Loaded configuration from {:?}", path);
    Ok(config)
}

async fn resolve_appliance(client: &GroheClient, explicit: Option<String>) -> Result<ApplianceId> {
    match explicit {
        Some(id) => Ok(ApplianceId::new(id)),
        None => client
            .default_appliance()
            .await
            .context("Failed to determine which appliance to use"),
    }
}

/// Show only the first and last four characters of a token.
fn mask(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    if chars.len() <= 12 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}...{tail}")
}

async fn show_token(client: &GroheClient, format: &str) -> Result<()> {
    let token = client.get_access_token().await?;
    let expires_at = client
        .tokens()
        .expires_at()
        .map(|at| at.to_rfc3339())
        .unwrap_or_default();

    match format {
        "json" => {
            let value = serde_json::json!({
                "access_token": mask(token.expose()),
                "expires_at": expires_at,
            });
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        _ => {
            println!("Access token: {}", mask(token.expose()));
            println!("Expires at:   {}", expires_at);
        }
    }
    Ok(())
}

async fn show_dashboard(client: &GroheClient) -> Result<()> {
    let snapshot = client.fetch_dashboard().await?;
    println!("{}", serde_json::to_string_pretty(snapshot.as_value())?);
    Ok(())
}

async fn list_devices(client: &GroheClient) -> Result<()> {
    let devices = client.devices().await?;
    if devices.is_empty() {
        println!("No appliances found");
        return Ok(());
    }

    println!("Appliances:");
    for device in devices {
        println!("  {}", device.appliance_id);
        println!("    Name:     {}", device.name.as_deref().unwrap_or("-"));
        println!("    Serial:   {}", device.serial_number.as_deref().unwrap_or("-"));
        println!("    Firmware: {}", device.version.as_deref().unwrap_or("-"));
        println!("    Room:     {}", device.room);
    }
    Ok(())
}

async fn show_status(client: &GroheClient, appliance: Option<String>, format: &str) -> Result<()> {
    let appliance = resolve_appliance(client, appliance).await?;
    let reading = client.reading(&appliance).await?;

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&reading)?),
        _ => print_reading(&reading),
    }
    Ok(())
}

fn print_reading(reading: &ApplianceReading) {
    fn show<T: std::fmt::Display>(value: &Option<T>) -> String {
        value.as_ref().map_or_else(|| "-".to_string(), ToString::to_string)
    }

    let m = &reading.measurement;
    let s = &reading.state;

    println!("{} ({})", reading.summary.appliance_id, reading.summary.name.as_deref().unwrap_or("unnamed"));
    println!("  Remaining CO2:     {} % ({} l)", show(&m.remaining_co2), show(&m.remaining_co2_liters));
    println!("  Remaining filter:  {} % ({} l)", show(&m.remaining_filter), show(&m.remaining_filter_liters));
    println!("  Filter type:       {}", show(&reading.filter_type));
    println!("  CO2 empty:         {}", show(&s.co2_empty));
    println!("  Filter empty:      {}", show(&s.filter_empty));
    println!("  Error bitfield:    {}", show(&s.system_error_bitfield));
    println!("  Cleanings:         {}", show(&m.cleaning_count));
    println!("  Last cleaning:     {}", show(&m.date_of_cleaning));
    println!("  Filter changes:    {}", show(&m.filter_change_count));
    println!("  Power cuts:        {}", show(&m.power_cut_count));
    println!("  Operating time:    {} min", show(&m.operating_time));
    println!("  Last withdrawal:   {} min ago", show(&m.time_since_last_withdrawal));
    println!("  Measured at:       {}", show(&m.timestamp));
}

async fn send(client: &GroheClient, command: ApplianceCommand) -> Result<()> {
    let report = client.dispatch(&command).await?;

    match report.state {
        DispatchState::Success => {
            println!("{} sent to {}", command.action(), command.appliance_id());
            Ok(())
        }
        DispatchState::Failed(reason) => {
            bail!(
                "{} was not delivered after {} attempt(s): {:?}",
                command.action(),
                report.attempts,
                reason
            )
        }
    }
}

async fn watch(client: GroheClient, interval: Option<u64>) -> Result<()> {
    let interval = interval
        .map(std::time::Duration::from_secs)
        .unwrap_or_else(|| client.config().poll_interval());

    let handle = DashboardPoller::new(Arc::new(client), interval).spawn();
    let mut updates = handle.subscribe();

    println!("Watching dashboard every {:?}. Press Ctrl+C to stop.", interval);

    loop {
        tokio::select! {
            changed = updates.changed() => {
                changed.context("Poller stopped unexpectedly")?;
                let latest = updates.borrow_and_update().clone();
                if let Some(snapshot) = latest {
                    for device in snapshot.appliances() {
                        match snapshot.reading(&device.appliance_id) {
                            Ok(reading) => print_reading(&reading),
                            Err(e) => eprintln!("{}: {}", device.appliance_id, e),
                        }
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    handle.stop().await;
    Ok(())
}

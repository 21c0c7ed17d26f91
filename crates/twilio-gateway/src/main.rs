//! twilio-gateway: standalone Twilio provider server
//!
//! Runs the webhook server and logs every provider event.
//!
//! Usage:
//!   twilio-gateway           - Start the webhook server
//!   twilio-gateway --help    - Show help

use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;
use twilio_provider::{ProviderConfig, ProviderEvent, TwilioProvider};

/// Run mode
enum RunMode {
    /// Webhook server
    Server,
    /// Show help
    Help,
    /// Show version
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    match parse_args() {
        RunMode::Help => {
            print_help();
            return Ok(());
        }
        RunMode::Version => {
            println!("twilio-gateway {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        RunMode::Server => {}
    }

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    dotenvy::dotenv().ok();

    let config = ProviderConfig::load().map_err(|e| anyhow::anyhow!("Config error: {}", e))?;
    let provider = TwilioProvider::new(config)
        .map_err(|e| anyhow::anyhow!("Failed to create Twilio provider: {}", e))?;

    tracing::info!("Starting twilio-gateway for '{}'...", provider.config().name);

    let events = provider.subscribe();
    let logger = tokio::spawn(log_events(events));

    provider
        .init_vendor()
        .map_err(|e| anyhow::anyhow!("Failed to initialize Twilio vendor: {}", e))?;

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let server = tokio::spawn(async move { provider.run(shutdown_rx).await });

    tracing::info!("Press Ctrl+C to exit");
    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down...");

    let _ = shutdown_tx.send(());
    match server.await? {
        Ok(()) => {}
        Err(e) => tracing::error!("Webhook server error: {}", e),
    }
    logger.abort();

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Log provider events the way a host framework would consume them
async fn log_events(mut events: broadcast::Receiver<ProviderEvent>) {
    loop {
        match events.recv().await {
            Ok(ProviderEvent::Notice(notice)) => {
                tracing::warn!("{}\n{}", notice.title, notice.instructions.join("\n"));
            }
            Ok(event) => {
                let payload = serde_json::to_string(&event).unwrap_or_default();
                tracing::info!(event = event.name(), "{}", payload);
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!("Event logger lagged, skipped {} events", skipped);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Parse command line arguments
fn parse_args() -> RunMode {
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--help" | "-h" => return RunMode::Help,
            "--version" | "-v" => return RunMode::Version,
            _ => {}
        }
    }

    RunMode::Server
}

/// Print help message
fn print_help() {
    println!("twilio-gateway - Twilio WhatsApp/SMS provider");
    println!();
    println!("Usage:");
    println!("  twilio-gateway           Start the webhook server");
    println!("  twilio-gateway --help    Show this help message");
    println!("  twilio-gateway --version Show version");
    println!();
    println!("Configuration is read from twilio-gateway.toml if present, otherwise from:");
    println!("  TWILIO_ACCOUNT_SID       Twilio account SID (required)");
    println!("  TWILIO_AUTH_TOKEN        Twilio auth token (required)");
    println!("  TWILIO_VENDOR_NUMBER     Number to send from (required)");
    println!("  BOT_NAME                 Bot name (default: bot)");
    println!("  PORT                     Webhook server port (default: 3000)");
    println!("  PUBLIC_URL               Public base URL for local media");
    println!("  TWILIO_API_BASE_URL      Twilio API base URL (default: https://api.twilio.com)");
}

// Preapproval Relay - Main Entry Point
//
// Runs the intake API and offers operator commands:
// - serve: HTTP intake API with webhook relay
// - send-test: deliver a sample webhook and report the outcome
// - check-config: print the effective configuration

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use preapproval_relay::api::{self, handlers::lead_payload, ClientId};
use preapproval_relay::applications::Application;
use preapproval_relay::config::Config;
use preapproval_relay::telemetry;
use preapproval_relay::webhooks::{
    DeliveryOptions, DeliveryOutcome, DeliveryService, APPLICATION_SUBMITTED_EVENT,
    LEAD_ENGAGEMENT_EVENT,
};
use serde_json::{json, Map, Value};
use std::path::PathBuf;
use tracing::info;

/// Preapproval Relay: merchant application intake and CRM webhook relay
#[derive(Parser, Debug)]
#[command(name = "preapproval-relay")]
#[command(version)]
#[command(about = "Merchant preapproval intake with CRM webhook relay", long_about = None)]
struct Args {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to a TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the intake API (default)
    Serve {
        /// Bind address override
        #[arg(long)]
        host: Option<String>,

        /// Port override
        #[arg(long)]
        port: Option<u16>,
    },
    /// Deliver a sample webhook to the configured destination
    SendTest {
        /// Which webhook to exercise
        #[arg(long, value_enum)]
        event: TestEvent,

        /// Destination override
        #[arg(long)]
        url: Option<String>,

        /// Log the envelope instead of sending it
        #[arg(long)]
        dry_run: bool,
    },
    /// Validate and print the effective configuration
    CheckConfig,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum TestEvent {
    Lead,
    Completion,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = load_config(args.config.as_ref())?;
    telemetry::init_tracing(&config.logging, args.verbose)?;

    info!("Preapproval Relay v{} starting...", env!("CARGO_PKG_VERSION"));

    match args.command.unwrap_or(Commands::Serve {
        host: None,
        port: None,
    }) {
        Commands::Serve { host, port } => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            api::serve(&config).await?;
        }
        Commands::SendTest {
            event,
            url,
            dry_run,
        } => {
            let outcome = send_test(&config, event, url, dry_run).await?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            if !outcome.succeeded {
                std::process::exit(1);
            }
        }
        Commands::CheckConfig => {
            let rendered =
                toml::to_string_pretty(&config).context("Failed to render configuration")?;
            println!("{}", rendered);
        }
    }

    Ok(())
}

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    match path {
        Some(path) => {
            if !path.exists() {
                bail!("Config file not found: {}", path.display());
            }
            Config::load_from_path(path)
        }
        None => Config::load(),
    }
}

/// Deliver a sample payload for `event` and return the outcome
async fn send_test(
    config: &Config,
    event: TestEvent,
    url: Option<String>,
    dry_run: bool,
) -> Result<DeliveryOutcome> {
    let delivery = DeliveryService::new(config.webhooks.retry_config())
        .context("Failed to create webhook delivery service")?;
    let options = DeliveryOptions {
        dry_run: dry_run || config.webhooks.dry_run,
    };

    let (name, configured, payload) = match event {
        TestEvent::Lead => (
            LEAD_ENGAGEMENT_EVENT,
            config.webhooks.lead_in_url(),
            sample_lead_payload(),
        ),
        TestEvent::Completion => (
            APPLICATION_SUBMITTED_EVENT,
            config.webhooks.completion_url(),
            Value::Object(sample_application().completion_payload()),
        ),
    };
    let destination = url.as_deref().or(configured);

    info!(event = name, destination = destination.unwrap_or("<unset>"), "Sending test webhook");
    Ok(delivery.deliver(name, destination, &payload, options).await)
}

fn sample_lead_payload() -> Value {
    let tracking = json!({
        "page": "/preapproval",
        "referrer": "send-test",
        "action": "form_focus"
    });
    let tracking = tracking.as_object().cloned().unwrap_or_default();
    lead_payload(&ClientId("127.0.0.1".into()), &tracking, Some("preapproval-relay/send-test"))
}

fn sample_application() -> Application {
    let mut fields = Map::new();
    fields.insert("legalName".into(), json!("Sample Merchant LLC"));
    fields.insert("dbaName".into(), json!("Sample Coffee"));
    fields.insert("contactFirstName".into(), json!("Test"));
    fields.insert("contactLastName".into(), json!("Applicant"));
    fields.insert("businessEmail".into(), json!("owner@example.com"));
    fields.insert("contactPhone".into(), json!("555-0100"));
    Application::new(fields)
}

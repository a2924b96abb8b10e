use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use gcp_client::{BigQueryClient, GcpSession, PubSubClient, StorageClient, TableRef};
use lighthouse_client::{ChromeLauncher, LighthouseCli};
use siteaudit_common::{AuditConfig, Environment};
use siteaudit_pipeline::traits::{BigQueryWarehouse, GcsBlobStore, PubSubTopic};
use siteaudit_pipeline::{catalog, normalizer, serializer, server, Dependencies, Orchestrator};

#[derive(Parser)]
#[command(name = "siteaudit", about = "Scheduled Lighthouse audits into Cloud Storage and BigQuery")]
struct Cli {
    /// Path to the JSON config file
    #[arg(long, env = "SITEAUDIT_CONFIG", default_value = "config.json", global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the Pub/Sub push endpoint
    Serve {
        #[arg(long, env = "PORT", default_value_t = 8080)]
        port: u16,
    },
    /// Run one invocation for a plain-text trigger message
    Trigger { message: String },
    /// Print the normalized record of a stored Lighthouse result as NDJSON
    Normalize { lhr: PathBuf, site_id: String },
    /// Print the config file JSON Schema
    Schema,
}

const CRATE_TARGETS: [&str; 4] = ["siteaudit_pipeline", "siteaudit_common", "lighthouse_client", "gcp_client"];

/// `base` plus info level for every workspace crate.
fn log_filter(mut filter: EnvFilter) -> Result<EnvFilter> {
    for target in CRATE_TARGETS {
        filter = filter.add_directive(format!("{target}=info").parse()?);
    }
    Ok(filter)
}

fn init_tracing() -> Result<()> {
    let filter = log_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))?;

    if std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json")) {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Schema => {
            println!("{}", serde_json::to_string_pretty(&AuditConfig::json_schema())?);
            Ok(())
        }
        Command::Normalize { lhr, site_id } => {
            let text = std::fs::read_to_string(&lhr).with_context(|| format!("Failed to read {}", lhr.display()))?;
            let value: serde_json::Value = serde_json::from_str(&text)?;
            let record = normalizer::normalize(&value, &site_id)?;
            print!("{}", serializer::to_ndjson(&[record])?);
            Ok(())
        }
        Command::Trigger { message } => {
            init_tracing()?;
            let orchestrator = build_orchestrator(&cli.config).await?;
            let outcome = orchestrator.handle_message(&message).await;
            server::log_outcome(None, None, &outcome);
            Ok(())
        }
        Command::Serve { port } => {
            init_tracing()?;
            let orchestrator = Arc::new(build_orchestrator(&cli.config).await?);
            let app = server::router(orchestrator);

            let addr = format!("0.0.0.0:{port}");
            info!("siteaudit listening on {addr}");
            let listener = tokio::net::TcpListener::bind(&addr).await?;
            axum::serve(listener, app).await?;
            Ok(())
        }
    }
}

async fn build_orchestrator(config_path: &Path) -> Result<Orchestrator> {
    let environment = Environment::from_env();
    environment.log_redacted();

    let config = AuditConfig::load(config_path, &environment)?;
    config.log_summary();

    let session = GcpSession::discover().await?;
    info!("GCP credentials loaded");

    let table = TableRef {
        project_id: config.project_id.clone(),
        dataset_id: config.dataset_id.clone(),
        table_id: config.table_id.clone(),
    };

    let deps = Dependencies {
        blob_store: Arc::new(GcsBlobStore::new(
            StorageClient::new(session.clone()),
            config.gcs.bucket_name.clone(),
        )),
        warehouse: Arc::new(BigQueryWarehouse::new(BigQueryClient::new(session.clone()), table)),
        publisher: Arc::new(PubSubTopic::new(
            PubSubClient::new(session),
            config.project_id.clone(),
            config.pubsub_topic_id.clone(),
        )),
        launcher: Arc::new(ChromeLauncher::from_env()),
        auditor: Arc::new(LighthouseCli::from_env()),
        catalog: catalog::from_config(&config, &environment),
    };

    Ok(Orchestrator::new(config, environment, deps))
}

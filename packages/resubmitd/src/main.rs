use std::{sync::Arc, time::Duration};

use clap::Parser;
use color_eyre::{Result, eyre::Context};
use http::{HeaderName, header::InvalidHeaderName};
use resubmit::{BodyEncoding, GuardConfig, Identity, SubmissionTracker};
use resubmitd::ledger::Ledger;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Config {
    /// Port to listen on
    #[arg(long, env = "PORT", default_value = "3000")]
    port: u16,

    /// Host to bind to
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    host: String,

    /// How long a submission is remembered, in milliseconds
    #[arg(long, env = "RESUBMIT_TTL_MS", default_value = "5000")]
    ttl_ms: u64,

    /// Largest body checked for duplicates, in bytes
    #[arg(long, env = "RESUBMIT_MAX_BODY_BYTES", default_value_t = GuardConfig::DEFAULT_MAX_BODY_BYTES)]
    max_body_bytes: usize,

    /// Content type prefixes checked for duplicates
    #[arg(
        long,
        env = "RESUBMIT_CONTENT_TYPES",
        value_delimiter = ',',
        default_value = "application/json"
    )]
    content_types: Vec<String>,

    /// Header identifying the caller; duplicates are global when unset
    #[arg(long, env = "RESUBMIT_IDENTITY_HEADER", value_parser = parse_header_name)]
    identity_header: Option<HeaderName>,

    /// Treat JSON bodies that differ only in formatting or key order as equal
    #[arg(long, env = "RESUBMIT_CANONICAL_JSON")]
    canonical_json: bool,

    /// How often expired submissions are swept, in milliseconds
    #[arg(long, env = "RESUBMIT_SWEEP_INTERVAL_MS", default_value = "30000")]
    sweep_interval_ms: u64,
}

impl Config {
    fn guard_config(&self) -> GuardConfig {
        GuardConfig::builder()
            .ttl(Duration::from_millis(self.ttl_ms))
            .max_body_bytes(self.max_body_bytes)
            .eligible_content_types(self.content_types.clone())
            .identity(match &self.identity_header {
                Some(header) => Identity::Header(header.clone()),
                None => Identity::Global,
            })
            .body_encoding(if self.canonical_json {
                BodyEncoding::CanonicalJson
            } else {
                BodyEncoding::Exact
            })
            .build()
    }
}

fn parse_header_name(value: &str) -> Result<HeaderName, InvalidHeaderName> {
    HeaderName::try_from(value)
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::parse();
    color_eyre::install()?;

    resubmitd::telemetry::init();

    let guard = config.guard_config();
    tracing::info!(?guard, "resubmitd.config");

    let tracker = Arc::new(SubmissionTracker::new());
    let sweeper = tracker.spawn_sweeper(Duration::from_millis(config.sweep_interval_ms));
    let app = resubmitd::app(guard, tracker, Ledger::new());

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("bind {addr}"))?;
    tracing::info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::error!(?err, "install ctrl-c handler");
            }
        })
        .await?;

    sweeper.abort();
    tracing::info!("shutdown complete");
    Ok(())
}

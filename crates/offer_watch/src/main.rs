//! Command-line watcher: polls the offers of one ride request and logs the
//! ranked list every time it changes.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use offer_core::backend::HttpOfferBackend;
use offer_core::payment::HttpPaymentHandoff;
use offer_core::routing::{build_route_provider, RouteProviderKind};
use offer_core::{EngineConfig, OfferBoard, OfferStatus, RequestId, SelectionController, SelectionState};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "offer_watch", about = "Watch ranked driver offers for a ride request")]
struct Cli {
    /// Ride request to watch
    #[arg(long, env = "OFFER_REQUEST_ID")]
    request_id: String,

    /// TOML engine configuration (defaults apply when omitted)
    #[arg(long, env = "OFFER_CONFIG")]
    config: Option<PathBuf>,

    /// Search radius in meters; must be one of the configured options
    #[arg(long)]
    radius: Option<u32>,

    /// Offer backend base URL
    #[arg(long, env = "OFFER_BACKEND_URL")]
    base_url: Option<String>,

    /// Bearer token for the backend and payment service
    #[arg(long, env = "OFFER_AUTH_TOKEN", hide_env_values = true)]
    auth_token: Option<String>,

    /// API key for the distance-matrix routing provider
    #[arg(long, env = "OFFER_ROUTING_API_KEY", hide_env_values = true)]
    routing_api_key: Option<String>,

    /// Cancel the request on Ctrl-C instead of just leaving
    #[arg(long)]
    cancel_on_exit: bool,

    /// Enable debug logging (overridden by RUST_LOG)
    #[arg(short, long)]
    verbose: bool,
}

fn load_config(cli: &Cli) -> anyhow::Result<EngineConfig> {
    let mut config = match &cli.config {
        Some(path) => EngineConfig::from_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => EngineConfig::default(),
    };
    if let Some(base_url) = &cli.base_url {
        config.backend.base_url = base_url.clone();
    }
    if let Some(token) = &cli.auth_token {
        config.backend.auth_token = Some(token.clone());
    }
    if let Some(key) = &cli.routing_api_key {
        if !apply_routing_api_key(&mut config.route_provider, key) {
            warn!(
                provider = ?config.route_provider,
                "routing API key ignored, the configured route provider does not take one"
            );
        }
    }
    config.validate()?;
    Ok(config)
}

/// Override the provider's API key. Returns false when the provider has none.
fn apply_routing_api_key(provider: &mut RouteProviderKind, key: &str) -> bool {
    match provider {
        RouteProviderKind::DistanceMatrix { api_key, .. } => {
            *api_key = key.to_string();
            true
        }
        RouteProviderKind::StraightLine | RouteProviderKind::Osrm { .. } => false,
    }
}

fn log_board(board: &OfferBoard) {
    info!(
        status = ?board.status,
        radius_m = board.radius.meters(),
        offers = board.ranked.len(),
        selection = board.selection.name(),
        candidate = ?board.selection.candidate(),
        "offer board updated"
    );
    for (rank, offer) in board.ranked.iter().enumerate() {
        info!(
            rank = rank + 1,
            id = %offer.id(),
            name = %offer.candidate.name,
            distance_m = ?offer.distance_m.map(|d| d.round()),
            duration_s = ?offer.duration_secs.map(|d| d.round()),
            source = ?offer.distance_source,
            price = ?offer.candidate.price,
            "offer"
        );
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = load_config(&cli)?;
    let backend = HttpOfferBackend::new(&config.backend, config.http_timeout())
        .context("building offer backend client")?;
    let routes = build_route_provider(
        &config.route_provider,
        config.http_timeout(),
        config.route_cache_capacity,
    )
    .context("building route provider")?;
    let payment = HttpPaymentHandoff::new(&config.backend, config.http_timeout())
        .context("building payment client")?;

    let controller = SelectionController::new(
        RequestId::from(cli.request_id.as_str()),
        config,
        Arc::new(backend),
        routes,
        Arc::new(payment),
    )?;

    if let Some(radius) = cli.radius {
        controller.set_radius(radius).await?;
    }

    let mut boards = controller.subscribe();
    controller.start();
    info!(request_id = %controller.request_id(), "watching offers, Ctrl-C to stop");

    loop {
        tokio::select! {
            changed = boards.changed() => {
                if changed.is_err() {
                    break;
                }
                let board = boards.borrow_and_update().clone();
                log_board(&board);
                if board.status == OfferStatus::Closed
                    || matches!(board.selection, SelectionState::Confirmed(_))
                {
                    break;
                }
            }
            signal = tokio::signal::ctrl_c() => {
                if let Err(err) = signal {
                    warn!(error = %err, "failed to listen for Ctrl-C");
                }
                if cli.cancel_on_exit {
                    controller.cancel_request().await?;
                } else {
                    controller.shutdown();
                }
                break;
            }
        }
    }

    let stats = controller.sync_stats();
    info!(
        fetches = stats.fetches_started,
        failed = stats.fetches_failed,
        skipped = stats.skipped_in_flight,
        "offer watch finished"
    );
    Ok(())
}

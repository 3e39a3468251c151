use clap::Parser;
use miette::{IntoDiagnostic, Result};
use promopay::application::gateway::{GatewayConfig, PaymentGateway};
use promopay::application::ledger::PromotionLedger;
use promopay::domain::promotion::{Collection, PromotionRecord};
use promopay::infrastructure::in_memory::{InMemoryPromotionStore, LoggingOrderSink};
use promopay::interfaces::http::{AppState, router};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Address to bind the HTTP server on
    #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0:8080")]
    bind: String,

    /// Absolute checkout URL on the payment gateway host
    #[arg(long, env = "GATEWAY_HOST")]
    gateway_host: String,

    /// Shared HMAC secret agreed with the gateway
    #[arg(long, env = "GATEWAY_SECRET", hide_env_values = true)]
    gateway_secret: String,

    /// Merchant identifier issued by the gateway
    #[arg(long, env = "GATEWAY_MERCHANT_CODE")]
    merchant_code: String,

    /// URL the gateway redirects the payer to after checkout
    #[arg(long, env = "GATEWAY_RETURN_URL")]
    return_url: String,

    /// Locale used when a checkout request does not specify one
    #[arg(long, env = "GATEWAY_LOCALE", default_value = "en")]
    default_locale: String,

    /// JSON file of promotion records to seed the store with, keyed by
    /// collection name
    #[arg(long, env = "PROMOTIONS_FILE")]
    promotions: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let cli = Cli::parse();

    // Gateway misconfiguration is fatal at startup, never per request.
    let gateway = PaymentGateway::new(GatewayConfig {
        host: cli.gateway_host,
        secret: cli.gateway_secret,
        merchant_code: cli.merchant_code,
        return_url: cli.return_url,
        default_locale: cli.default_locale,
    })
    .into_diagnostic()?;

    let store = InMemoryPromotionStore::new();
    if let Some(path) = cli.promotions {
        let seeded = seed_promotions(&store, &path).await?;
        info!(count = seeded, file = %path.display(), "seeded promotion records");
    }

    let state = Arc::new(AppState {
        ledger: PromotionLedger::new(Box::new(store)),
        gateway,
        orders: Box::new(LoggingOrderSink),
    });

    let listener = TcpListener::bind(&cli.bind).await.into_diagnostic()?;
    info!("listening on {}", cli.bind);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .into_diagnostic()?;

    Ok(())
}

async fn seed_promotions(store: &InMemoryPromotionStore, path: &PathBuf) -> Result<usize> {
    let raw = tokio::fs::read_to_string(path).await.into_diagnostic()?;
    let collections: HashMap<Collection, Vec<PromotionRecord>> =
        serde_json::from_str(&raw).into_diagnostic()?;

    let mut count = 0;
    for (collection, records) in collections {
        for record in records {
            store.insert(collection, record).await;
            count += 1;
        }
    }
    Ok(count)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
        info!("received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
        info!("received terminate signal, shutting down");
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

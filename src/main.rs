//! Application entry point.

use std::env;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use dotenvy::dotenv;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use escrow_auth_service::api::{HttpConfig, RateLimitConfig, build_router};
use escrow_auth_service::app::{AppState, OtpPolicy, WorkerConfig, spawn_worker};
use escrow_auth_service::infra::{PostgresClient, PostgresConfig, TwilioConfig, TwilioSmsGateway};

/// Application configuration
struct Config {
    database_url: String,
    host: String,
    port: u16,
    enable_rate_limiting: bool,
    rate_limit_config: RateLimitConfig,
    http_config: HttpConfig,
    worker_config: WorkerConfig,
    policy: OtpPolicy,
    /// Twilio credentials (optional - uses mock mode if not set)
    twilio: Option<TwilioConfig>,
}

impl Config {
    fn from_env() -> Result<Self> {
        let database_url = env::var("DATABASE_URL").context("DATABASE_URL not set")?;
        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(3000);
        let enable_rate_limiting = env::var("ENABLE_RATE_LIMITING")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        let enable_reaper = env::var("ENABLE_CHALLENGE_REAPER")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(true);
        let reaper_interval_secs = env::var("REAPER_INTERVAL_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .unwrap_or(60);

        let worker_config = WorkerConfig {
            enabled: enable_reaper,
            poll_interval: Duration::from_secs(reaper_interval_secs),
        };

        let policy = OtpPolicy::from_env().context("Invalid OTP policy configuration")?;
        let twilio = TwilioConfig::from_env().context("Invalid Twilio configuration")?;

        Ok(Self {
            database_url,
            host,
            port,
            enable_rate_limiting,
            rate_limit_config: RateLimitConfig::from_env(),
            http_config: HttpConfig::from_env(),
            worker_config,
            policy,
            twilio,
        })
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug,sqlx=warn"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    init_tracing();

    info!("🔐 Escrow Auth Service v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env()?;

    info!("📦 Initializing infrastructure...");

    let postgres_client = PostgresClient::new(&config.database_url, PostgresConfig::default())
        .await
        .context("Failed to connect to PostgreSQL")?;
    postgres_client
        .run_migrations()
        .await
        .context("Failed to apply migrations")?;
    info!("   ✓ Database connected and migrations applied");
    let postgres_client = Arc::new(postgres_client);

    let twilio_configured = config.twilio.is_some();
    let gateway = TwilioSmsGateway::new(config.twilio).context("Failed to build SMS gateway")?;
    if twilio_configured {
        info!("   ✓ SMS gateway created (Twilio)");
    } else {
        warn!("   ⚠ SMS gateway created (MOCK MODE - no TWILIO_ACCOUNT_SID)");
    }

    info!(
        "   ✓ OTP policy: {} symbols, ttl {}s, {} attempts, {} requests per {}s",
        config.policy.code_length,
        config.policy.ttl.num_seconds(),
        config.policy.max_attempts,
        config.policy.rate_limit_max_requests,
        config.policy.rate_limit_window.num_seconds()
    );

    let app_state = Arc::new(AppState::with_policy(
        Arc::clone(&postgres_client) as _,
        postgres_client as _,
        Arc::new(gateway),
        config.policy,
    ));

    let reaper_shutdown_tx = if config.worker_config.enabled {
        let (_handle, shutdown_tx) =
            spawn_worker(Arc::clone(&app_state.service), config.worker_config.clone());
        info!(
            "   ✓ Challenge reaper started (interval: {}s)",
            config.worker_config.poll_interval.as_secs()
        );
        Some(shutdown_tx)
    } else {
        info!("   ○ Challenge reaper disabled");
        None
    };

    let rate_limit = if config.enable_rate_limiting {
        info!("   ✓ Rate limiting enabled");
        Some(config.rate_limit_config)
    } else {
        info!("   ○ Rate limiting disabled");
        None
    };
    let router = build_router(app_state, &config.http_config, rate_limit);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!("🚀 Server starting on http://{}", addr);
    info!("📖 Swagger UI available at http://{}/swagger-ui", addr);
    info!("📄 OpenAPI spec at http://{}/api-docs/openapi.json", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(tx) = reaper_shutdown_tx {
        let _ = tx.send(true);
    }

    info!("Server shutdown complete");
    Ok(())
}

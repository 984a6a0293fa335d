use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bookings::config::Config;
use bookings::mail::{self, MailWorker};
use bookings::session;
use bookings::AppState;

#[derive(Parser, Debug)]
#[command(name = "bookings")]
#[command(author, version, about = "Bed and breakfast booking website", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "bookings.toml")]
    config: PathBuf,

    /// Override log level
    #[arg(short, long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(&cli.config)?;

    // Initialize logging
    let log_level = cli
        .log_level
        .as_ref()
        .unwrap_or(&config.logging.level)
        .clone();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting bookings v{}", env!("CARGO_PKG_VERSION"));

    // Initialize database
    let db = bookings::db::init(&config.database).await?;

    // Seed the admin account when one is configured
    if let (Some(email), Some(password)) = (&config.auth.admin_email, &config.auth.admin_password) {
        bookings::db::ensure_admin_user(&db, email, password, &config.auth.admin_name).await?;
    }

    // Start the mail worker
    let (mail_tx, mail_rx) = mail::channel();
    let worker = MailWorker::new(
        mail_rx,
        mail::sender_from_config(&config.mail),
        config.mail.template_dir.clone(),
    );
    tokio::spawn(async move {
        worker.run().await;
    });

    let state = Arc::new(AppState::new(config.clone(), db, mail_tx));
    session::spawn_cleanup_task(state.sessions.clone(), config.session.cleanup_interval_secs);

    let app = bookings::web::create_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Listening on http://{}", addr);
    if !config.mail.smtp_enabled() {
        tracing::warn!("No SMTP host configured, outgoing mail will only be logged");
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}

//! # Todo Reminder Bot Main Entry Point
//!
//! Initializes logging, loads configuration, sets up the database,
//! restores pending reminders, and runs the Telegram bot next to the
//! health check server.

use anyhow::Result;
use std::sync::Arc;
use teloxide::prelude::*;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use todo_reminder_bot::bot::handlers::BotHandler;
use todo_reminder_bot::bot::notifier::TelegramNotifier;
use todo_reminder_bot::config::Config;
use todo_reminder_bot::database::connection::DatabaseManager;
use todo_reminder_bot::services::health::HealthService;
use todo_reminder_bot::services::todo::TodoService;
use todo_reminder_bot::utils::datetime::LocalClock;
use todo_reminder_bot::utils::logging::log_system_event;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "todo_reminder_bot=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    info!("Starting Todo Reminder Bot v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "Configuration loaded - Database: {}, HTTP Port: {}, Reminder lead: {} min",
        config.database_url, config.http_port, config.reminder_lead_minutes
    );

    // Initialize database
    info!("Initializing database connection...");
    let db = Arc::new(DatabaseManager::new(&config.database_url).await?);
    info!("Running database migrations...");
    db.run_migrations().await?;
    info!("Database initialized successfully");

    // Load tasks and reminders
    let bot = Bot::new(&config.telegram_bot_token);
    let notifier = Arc::new(TelegramNotifier::new(bot.clone()));
    let service = Arc::new(
        TodoService::load(db.clone(), notifier, Arc::new(LocalClock))
            .await?
            .with_reminder_lead(config.reminder_lead()),
    );

    let report = service.reconcile_on_startup().await?;
    log_system_event(
        "reminders_restored",
        Some(&format!("{} re-armed, {} discarded", report.rearmed, report.discarded)),
    );
    service.scheduler().start();

    let handler = BotHandler::new(service.clone());
    info!("Telegram bot initialized successfully");

    // Initialize health service
    let health_service = HealthService::new(db.clone(), service.clone());
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.http_port))
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind to port {}: {}", config.http_port, e))?;

    info!("Health check server starting on port {}", config.http_port);

    let bot_task = tokio::spawn(async move {
        Dispatcher::builder(bot, handler.schema())
            .dependencies(dptree::deps![handler.storage()])
            .enable_ctrlc_handler()
            .build()
            .dispatch()
            .await;
    });

    let health_task = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, health_service.router).await {
            tracing::error!("Health server error: {}", e);
        }
    });

    // Wait for either task to complete (which would indicate shutdown)
    tokio::select! {
        result = bot_task => {
            if let Err(e) = result {
                tracing::error!("Bot task error: {}", e);
            }
        }
        result = health_task => {
            if let Err(e) = result {
                tracing::error!("Health task error: {}", e);
            }
        }
    }

    service.scheduler().stop().await;

    log_system_event("shutdown", None);
    Ok(())
}

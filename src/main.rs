//! Referral Gate - Main Entry Point
//!
//! A Telegram bot that requires channel subscriptions, credits inviters and
//! rewards them with a private group invite link.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::mpsc;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use referral_bots::commands::{CommandHandler, DispatcherMessage, UpdateDispatcher};
use referral_bots::config::GateSettings;
use referral_bots::referral::{GatePolicy, PgReferralStore, ReferralGate};
use referral_bots::telegram::BotApi;

/// Telegram referral gate bot.
#[derive(Parser, Debug)]
#[command(name = "referral_gate")]
#[command(about = "Subscription-gated referral bot with invite-link rewards")]
#[command(version)]
struct Args {
    /// Path to the .env file for environment variables.
    #[arg(long, default_value = ".env")]
    env_file: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level);

    if let Err(e) = dotenvy::from_filename(&args.env_file) {
        debug!("Could not load .env file ({}): {}", args.env_file, e);
    }

    let settings =
        GateSettings::from_env().context("Failed to load gate configuration from environment")?;

    let api = Arc::new(
        BotApi::new(&settings.api_url, &settings.bot_token, settings.poll_timeout_secs)
            .context("Failed to create Bot API client")?,
    );

    let bot_username = match settings.bot_username.clone() {
        Some(name) => name,
        None => api
            .get_me()
            .await
            .context("Failed to fetch bot identity")?
            .username
            .context("Bot account has no username")?,
    };
    info!("Running as @{}", bot_username);

    let store = Arc::new(
        PgReferralStore::connect(&settings.database_url)
            .await
            .context("Failed to connect to database")?,
    );

    info!(
        "Loaded {} admin(s), reward after {} referral(s) ({:?})",
        settings.admin_ids.len(),
        settings.referral_threshold,
        settings.reward_policy
    );

    let gate = Arc::new(ReferralGate::new(
        Arc::clone(&api) as _,
        Arc::clone(&store) as _,
        GatePolicy {
            admin_ids: settings.admin_ids,
            bot_username,
            secret_group_id: settings.secret_group_id,
            threshold: settings.referral_threshold,
            reward_policy: settings.reward_policy,
        },
    ));

    let handler = Arc::new(CommandHandler::new(gate));
    let dispatcher = UpdateDispatcher::new(Arc::clone(&api), handler);

    let (dispatcher_tx, dispatcher_rx) = mpsc::channel::<DispatcherMessage>(1);
    let dispatcher_handle = tokio::spawn(async move {
        dispatcher.run(dispatcher_rx).await;
    });

    info!("Bot is running. Use Ctrl+C to stop.");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;
    info!("Received Ctrl+C, shutting down...");

    let _ = dispatcher_tx.send(DispatcherMessage::Shutdown).await;
    if let Err(e) = dispatcher_handle.await {
        tracing::error!("Dispatcher task failed: {}", e);
    }
    store.close().await;

    Ok(())
}

/// Initializes the logging subsystem.
fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

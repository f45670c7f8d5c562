//! Post Correlator - Main Entry Point
//!
//! A Telegram userbot that comments under the discussion copy of every new
//! post in its watched channels.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use dialoguer::{Input, Password};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use referral_bots::config::{CorrelatorConfig, NotifierConfig, TelegramConfig};
use referral_bots::correlator::{HttpNotifier, LogNotifier, Notifier, PostCorrelator, PostOutcome};
use referral_bots::telegram::{MtprotoUpdate, TelegramBot, TelegramDiscussionFeed, TelegramError};

/// Telegram userbot that comments under new channel posts.
#[derive(Parser, Debug)]
#[command(name = "post_correlator")]
#[command(about = "Reply under the discussion copy of every new channel post")]
#[command(version)]
struct Args {
    /// Path to the correlator JSON configuration file.
    #[arg(short, long, default_value = "correlator.json")]
    config: String,

    /// Path to the .env file for environment variables.
    #[arg(long, default_value = ".env")]
    env_file: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Generate an example configuration file and exit.
    #[arg(long)]
    generate_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level);

    if args.generate_config {
        return generate_example_config();
    }

    if let Err(e) = dotenvy::from_filename(&args.env_file) {
        debug!("Could not load .env file ({}): {}", args.env_file, e);
    }

    let tg_config = TelegramConfig::from_env()
        .context("Failed to load Telegram configuration from environment")?;

    let notifier: Arc<dyn Notifier> = match NotifierConfig::from_env()
        .context("Failed to load notifier configuration from environment")?
    {
        Some(config) => Arc::new(
            HttpNotifier::new(&config).context("Failed to create notifier client")?,
        ),
        None => {
            warn!("NOTIFIER_BOT_TOKEN is not set, notices go to the log");
            Arc::new(LogNotifier)
        }
    };

    let config = CorrelatorConfig::load_from_file(&args.config)
        .context("Failed to load correlator configuration")?;
    config
        .validate()
        .context("Correlator configuration validation failed")?;

    info!(
        "Loaded {} channel link(s) and {} comment(s)",
        config.channels.len(),
        config.comments.len()
    );

    let bot = TelegramBot::connect(&tg_config)
        .await
        .context("Failed to connect to Telegram")?;

    if !bot.is_authorized().await.context("Failed to check authorization")? {
        authenticate(&bot, &tg_config).await?;
    }

    let bot = Arc::new(bot);

    let (feed, missing) = TelegramDiscussionFeed::resolve(Arc::clone(&bot), &config.peer_ids())
        .await
        .context("Failed to load dialogs")?;
    if !missing.is_empty() {
        bot.disconnect();
        bail!(
            "Configured peers not found among dialogs (join them first): {:?}",
            missing
        );
    }

    let correlator = Arc::new(PostCorrelator::new(
        Arc::new(feed),
        notifier,
        Arc::new(config),
    ));

    let mut updates = bot.updates().await.context("Failed to start update stream")?;
    let mut tasks = JoinSet::new();

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!("Userbot is running. Use Ctrl+C to stop.");

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Received Ctrl+C, shutting down...");
                break;
            }
            update = updates.next() => {
                match update {
                    Ok(MtprotoUpdate::NewMessage(message)) => {
                        let channel_id = message.peer_id().bare_id();
                        if !correlator.watches(channel_id) {
                            continue;
                        }

                        let post_id = message.id();
                        let correlator = Arc::clone(&correlator);
                        tasks.spawn(async move {
                            let outcome = correlator.on_new_post(channel_id, post_id).await;
                            if let PostOutcome::Failed(reason) = &outcome {
                                debug!("Post {} ended with failure: {}", post_id, reason);
                            }
                        });
                    }
                    Ok(_) => {}
                    Err(e) => {
                        let e = TelegramError::from(e);
                        if let TelegramError::FloodWait(seconds) = e {
                            warn!("Flood wait on update stream: {} seconds", seconds);
                        } else {
                            error!("Update stream error: {}", e);
                        }
                    }
                }
            }
        }

        while let Some(joined) = tasks.try_join_next() {
            if let Err(e) = joined {
                error!("Post handler panicked: {}", e);
            }
        }
    }

    if !tasks.is_empty() {
        info!("Waiting for {} in-flight search(es)", tasks.len());
    }
    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            error!("Post handler panicked: {}", e);
        }
    }

    bot.disconnect();

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

/// Generates an example configuration file.
fn generate_example_config() -> Result<()> {
    let example = CorrelatorConfig::example();
    example.save_to_file("correlator.example.json")?;

    println!("✓ Example configuration written to: correlator.example.json");
    println!("\nTo use this userbot:");
    println!("1. Copy correlator.example.json to correlator.json");
    println!("2. Map each source channel to its discussion group and edit the comments");
    println!("3. Create a .env file with TG_API_ID and TG_API_HASH");
    println!("4. Optionally add NOTIFIER_BOT_TOKEN and NOTIFIER_CHAT_ID for status notices");
    println!("5. Run: post_correlator");

    Ok(())
}

/// Handles Telegram authentication.
async fn authenticate(bot: &TelegramBot, config: &TelegramConfig) -> Result<()> {
    info!("Authentication required");

    let phone: String = Input::new()
        .with_prompt("Enter your phone number (with country code)")
        .interact_text()?;

    let token = bot
        .request_login_code(&phone, &config.api_hash)
        .await
        .context("Failed to request login code")?;

    info!("Login code sent to your Telegram app");

    let code: String = Input::new()
        .with_prompt("Enter the login code")
        .interact_text()?;

    match bot.sign_in(&token, &code).await {
        Ok(()) => Ok(()),
        Err(TelegramError::PasswordRequired(password_token)) => {
            info!("Two-factor authentication is enabled");

            let hint = password_token.hint().unwrap_or("no hint");
            info!("Password hint: {}", hint);

            let password: String = Password::new()
                .with_prompt("Enter your 2FA password")
                .interact()?;

            bot.check_password(password_token, &password)
                .await
                .context("2FA authentication failed")?;

            Ok(())
        }
        Err(e) => Err(e).context("Authentication failed"),
    }
}

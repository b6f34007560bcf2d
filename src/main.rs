//! Moksha Karma Daemon
//!
//! Runs the hourly accrual job and the weekly reminder job against the
//! karma database.
//!
//! ## Usage
//!
//! ```bash
//! # Start the scheduler with defaults
//! moksha-karma
//!
//! # Start with custom config
//! moksha-karma --config /path/to/config.toml
//!
//! # One accrual pass, then exit
//! moksha-karma accrue
//!
//! # One reminder pass, then exit
//! moksha-karma remind
//!
//! # Print database statistics
//! moksha-karma stats
//! ```
//!
//! SMTP settings may also come from the environment (or a `.env` file):
//! `SMTP_HOST`, `SMTP_PORT`, `SMTP_USERNAME`, `SMTP_PASSWORD`,
//! `SMTP_SENDER_EMAIL`, `SMTP_SENDER_NAME`.

use clap::{Parser, Subcommand};
use moksha_karma::services::events::spawn_audit_log;
use moksha_karma::services::mail::mailer_from_config;
use moksha_karma::{spawn_periodic, Config, KarmaDb, Services, SmtpConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "moksha-karma")]
#[command(about = "Karma accrual and reminder daemon for the Moksha Protocol")]
struct Args {
    /// Path to config file
    #[arg(short, long, env = "MOKSHA_CONFIG")]
    config: Option<PathBuf>,

    /// Data directory (database and default config location)
    #[arg(long, env = "MOKSHA_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Public site URL used in outbound mail
    #[arg(long, env = "MOKSHA_SITE_URL")]
    site_url: Option<String>,

    /// SMTP relay host; enables real mail delivery
    #[arg(long, env = "SMTP_HOST")]
    smtp_host: Option<String>,

    #[arg(long, env = "SMTP_PORT", default_value_t = 587)]
    smtp_port: u16,

    #[arg(long, env = "SMTP_USERNAME")]
    smtp_username: Option<String>,

    #[arg(long, env = "SMTP_PASSWORD", hide_env_values = true)]
    smtp_password: Option<String>,

    #[arg(long, env = "SMTP_SENDER_EMAIL")]
    smtp_sender_email: Option<String>,

    #[arg(long, env = "SMTP_SENDER_NAME", default_value = "Moksha Protocol")]
    smtp_sender_name: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the accrual and reminder schedulers (default)
    Run,
    /// Run one accrual pass and exit
    Accrue,
    /// Run one reminder pass and exit
    Remind,
    /// Print database statistics as JSON
    Stats,
}

impl Args {
    /// SMTP settings from flags/env, when enough of them are present
    fn smtp_override(&self) -> Option<SmtpConfig> {
        let host = self.smtp_host.clone()?;
        match (&self.smtp_username, &self.smtp_password, &self.smtp_sender_email) {
            (Some(username), Some(password), Some(sender_email)) => Some(SmtpConfig {
                host,
                port: self.smtp_port,
                username: username.clone(),
                password: password.clone(),
                sender_email: sender_email.clone(),
                sender_name: self.smtp_sender_name.clone(),
            }),
            _ => {
                warn!("SMTP_HOST set without username, password and sender email; ignoring");
                None
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let _ = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("moksha_karma=info".parse()?),
        )
        .init();

    let args = Args::parse();

    // Load config
    let mut config = if let Some(config_path) = &args.config {
        Config::load(config_path)?
    } else {
        Config::default()
    };

    // Apply CLI overrides
    if let Some(dir) = &args.data_dir {
        config.data_dir = dir.clone();
    }
    if let Some(url) = &args.site_url {
        config.site_url = url.clone();
    }
    if let Some(smtp) = args.smtp_override() {
        config.smtp = Some(smtp);
    }
    config.validate()?;

    // Ensure data directory exists
    tokio::fs::create_dir_all(&config.data_dir).await?;

    // Save default config if it doesn't exist
    let config_path = config.config_path();
    if args.config.is_none() && !config_path.exists() {
        config.save(&config_path)?;
        info!(path = %config_path.display(), "Created default config");
    }

    let db = Arc::new(KarmaDb::open(&config.database_path())?);
    let mailer = mailer_from_config(config.smtp.as_ref())?;
    let services = Services::new(db.clone(), mailer.clone(), &config);

    match args.command.unwrap_or(Command::Run) {
        Command::Accrue => {
            let report = services.accrual.run().await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Remind => {
            let report = services.reminders.run().await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Stats => {
            println!("{}", serde_json::to_string_pretty(&db.stats()?)?);
        }
        Command::Run => {
            info!(
                data_dir = %config.data_dir.display(),
                mailer = mailer.name(),
                accrual_secs = config.accrual_interval_secs,
                reminder_secs = config.reminder_interval_secs,
                "Starting moksha-karma"
            );

            spawn_audit_log(services.events.clone());

            let (shutdown_tx, _) = broadcast::channel::<()>(1);
            let accrual = spawn_periodic(
                services.accrual.clone(),
                config.accrual_interval(),
                shutdown_tx.subscribe(),
            );
            let reminders = spawn_periodic(
                services.reminders.clone(),
                config.reminder_interval(),
                shutdown_tx.subscribe(),
            );

            tokio::signal::ctrl_c().await?;
            info!("Shutdown signal received");
            let _ = shutdown_tx.send(());

            let _ = tokio::join!(accrual, reminders);
            info!("moksha-karma stopped");
        }
    }

    Ok(())
}

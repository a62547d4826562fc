mod cli;
pub mod compose;
pub mod config;
pub mod encrypt;
mod logging;
pub mod mail;
pub mod quote;
mod units;
mod utils;

use anyhow::Context;
use chrono::{Local, NaiveDate};
use lettre::Transport;
use log::{error, info};
use tokio::runtime::Runtime;

pub use cli::{Cli, LogLevel};
pub use logging::init_logging;
pub use units::Seconds;

use crate::{
    compose::EmailContent,
    config::{Config, Secrets},
    encrypt::Encryptor,
    mail::Envelope,
    quote::{QuoteClient, QuoteOutcome},
};

pub fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::load(cli.get_config_path().as_deref()).context("Failed to load config")?;
    let secrets = Secrets::try_from(&cli).context("Configuration incomplete")?;
    let transport = mail::smtp_transport(&config, &secrets).context("Failed to set up mailer")?;
    send_daily_quote(&config, &secrets, &transport, Local::now().date_naive())?;
    info!("Completed");
    Ok(())
}

/// Fetches the quote and builds the mail text. Fetch failures end up as placeholder text.
pub fn compose_content(
    config: &Config,
    secrets: &Secrets,
    date: NaiveDate,
) -> anyhow::Result<EmailContent> {
    let rt = Runtime::new().context("Failed to create async runtime")?;
    let outcome = match QuoteClient::new(config, &secrets.api_token) {
        Ok(client) => rt.block_on(client.fetch_outcome()),
        Err(e) => {
            error!("Unable to build quote client: {e}");
            QuoteOutcome::Unavailable(e)
        }
    };
    let content = EmailContent::compose(&outcome, date);
    info!("Mail content created");
    Ok(content)
}

/// The whole fetch, compose, encrypt and send sequence over any transport
pub fn send_daily_quote<T>(
    config: &Config,
    secrets: &Secrets,
    transport: &T,
    date: NaiveDate,
) -> anyhow::Result<()>
where
    T: Transport,
    T::Error: std::fmt::Display,
{
    let envelope = Envelope::new(&secrets.sender_email, &secrets.recipient_email)
        .context("Invalid mail address")?;
    let content = compose_content(config, secrets, date)?;
    let encrypted = Encryptor::from_config(config)
        .encrypt(
            content.as_str(),
            &secrets.public_key,
            &config.recipient_key_id,
        )
        .context("Failed to encrypt content")?;
    mail::send_with(transport, &envelope, config, &encrypted)
        .context("Failed to send encrypted mail")?;
    Ok(())
}

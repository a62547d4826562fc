use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use log::LevelFilter;

#[derive(Parser, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default)]
#[command(
    author,
    version,
    about,
    long_about = "Fetches a motivational quote, encrypts it with the recipient's OpenPGP key and mails it."
)]
pub struct Cli {
    /// Specify config file to use
    ///
    /// If not specified uses `config.json` in the working directory when it exists, otherwise
    /// built in defaults
    #[arg(long = "config", short, value_name = "PATH")]
    pub config_filename: Option<String>,

    /// Set logging level to use
    #[arg(long, short, value_enum, default_value_t = LogLevel::Info)]
    pub log_level: LogLevel,

    /// Folder the rolling log file is written to
    #[arg(long, value_name = "DIR", default_value = "log")]
    pub log_dir: PathBuf,

    /// Token for the quote API
    #[arg(long, env = "ALAPI_TOKEN", hide_env_values = true)]
    pub api_token: Option<String>,

    /// Address the encrypted quote is delivered to
    #[arg(long, env = "RECIPIENT_EMAIL")]
    pub recipient_email: Option<String>,

    /// Account used to log in to the mail server, also used as the sender address
    #[arg(long, env = "GMAIL_USER")]
    pub sender_email: Option<String>,

    /// App password for the sender account
    #[arg(long, env = "GMAIL_APP_PASSWORD", hide_env_values = true)]
    pub sender_password: Option<String>,

    /// ASCII armored public key block of the recipient
    #[arg(long, env = "PGP_PUBLIC_KEY", hide_env_values = true)]
    pub public_key: Option<String>,
}

impl Cli {
    /// Returns the config file to load if any
    pub fn get_config_path(&self) -> Option<PathBuf> {
        match self.config_filename.as_ref() {
            Some(val) => Some(PathBuf::from(val)),
            None => {
                let default = PathBuf::from("config.json");
                default.exists().then_some(default)
            }
        }
    }
}

/// Exists to provide better help messages variants copied from LevelFilter as
/// that's the type that is actually needed
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug, Default)]
pub enum LogLevel {
    /// Nothing emitted in this mode
    Off,
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(value: LogLevel) -> Self {
        match value {
            LogLevel::Off => LevelFilter::Off,
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Trace => LevelFilter::Trace,
        }
    }
}

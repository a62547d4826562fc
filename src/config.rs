use std::{fs, path::Path};

use anyhow::Context;
use log::{debug, info};
use serde::Deserialize;
use thiserror::Error;

use crate::{encrypt::RecipientKeyId, mail::BodyFormat, Cli, Seconds};

/// Settings that are not secret, loaded from an optional JSON file
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Endpoint of the quote API, the token and format are added as query parameters
    pub quote_api_url: String,

    /// Hard timeout for the quote request
    pub request_timeout: Seconds,

    /// Mail submission server, STARTTLS is always negotiated
    pub smtp_host: String,

    pub smtp_port: u16,

    /// Timeout for each SMTP command
    pub smtp_timeout: Seconds,

    /// Key ID (or fingerprint) of the recipient key messages are encrypted to
    pub recipient_key_id: RecipientKeyId,

    pub subject: String,

    /// Layout of the mail body carrying the ciphertext
    pub body_format: BodyFormat,

    /// Program invoked by the fallback encryption strategy
    pub gpg_program: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            quote_api_url: "https://v3.alapi.cn/api/mingyan".to_string(),
            request_timeout: 10.into(),
            smtp_host: "smtp.gmail.com".to_string(),
            smtp_port: 587,
            smtp_timeout: 30.into(),
            recipient_key_id: RecipientKeyId::default(),
            subject: "每日励志名言".to_string(),
            body_format: BodyFormat::default(),
            gpg_program: "gpg".to_string(),
        }
    }
}

impl Config {
    pub fn load_from(config_path: &Path) -> anyhow::Result<Config> {
        debug!("Loading Config from: {config_path:?}");
        let file_contents = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read contents of {config_path:?}"))?;
        let result = serde_json::from_str(&file_contents)
            .with_context(|| format!("Failed to parse contents of {config_path:?}"))?;
        Ok(result)
    }

    /// Loads the file if one is given otherwise falls back to the defaults
    pub fn load(config_path: Option<&Path>) -> anyhow::Result<Config> {
        match config_path {
            Some(path) => Self::load_from(path),
            None => {
                info!("No config file found, using defaults");
                Ok(Self::default())
            }
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required environment variables: {}", .0.join(", "))]
    MissingVariables(Vec<&'static str>),
}

/// Values read once from the environment at start up. Never logged.
#[derive(Clone, PartialEq, Eq)]
pub struct Secrets {
    pub api_token: String,
    pub recipient_email: String,
    pub sender_email: String,
    pub sender_password: String,
    pub public_key: String,
}

impl std::fmt::Debug for Secrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Secrets")
            .field("recipient_email", &self.recipient_email)
            .field("sender_email", &self.sender_email)
            .finish_non_exhaustive()
    }
}

impl TryFrom<&Cli> for Secrets {
    type Error = ConfigError;

    /// Empty values are treated the same as absent ones and all missing names are reported together
    fn try_from(cli: &Cli) -> Result<Self, Self::Error> {
        let mut missing = vec![];
        let mut take = |value: &Option<String>, name: &'static str| -> String {
            match value.as_deref().map(str::trim) {
                Some(v) if !v.is_empty() => v.to_string(),
                _ => {
                    missing.push(name);
                    String::new()
                }
            }
        };
        let result = Self {
            api_token: take(&cli.api_token, "ALAPI_TOKEN"),
            recipient_email: take(&cli.recipient_email, "RECIPIENT_EMAIL"),
            sender_email: take(&cli.sender_email, "GMAIL_USER"),
            sender_password: take(&cli.sender_password, "GMAIL_APP_PASSWORD"),
            public_key: take(&cli.public_key, "PGP_PUBLIC_KEY"),
        };
        if missing.is_empty() {
            Ok(result)
        } else {
            Err(ConfigError::MissingVariables(missing))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn full_cli() -> Cli {
        Cli {
            api_token: Some("T".into()),
            recipient_email: Some("to@example.com".into()),
            sender_email: Some("from@example.com".into()),
            sender_password: Some("app password".into()),
            public_key: Some("-----BEGIN PGP PUBLIC KEY BLOCK-----".into()),
            ..Default::default()
        }
    }

    #[test]
    fn secrets_all_present() {
        // Arrange
        let cli = full_cli();

        // Act
        let actual = Secrets::try_from(&cli).unwrap();

        // Assert
        assert_eq!(actual.api_token, "T");
        assert_eq!(actual.sender_email, "from@example.com");
    }

    #[test]
    fn secrets_report_every_missing_name() {
        // Arrange
        let cli = Cli {
            api_token: None,
            sender_password: Some("   ".into()),
            ..full_cli()
        };

        // Act
        let actual = Secrets::try_from(&cli).unwrap_err();

        // Assert
        assert_eq!(
            actual,
            ConfigError::MissingVariables(vec!["ALAPI_TOKEN", "GMAIL_APP_PASSWORD"])
        );
        assert_eq!(
            actual.to_string(),
            "Missing required environment variables: ALAPI_TOKEN, GMAIL_APP_PASSWORD"
        );
    }

    #[test]
    fn secrets_debug_hides_values() {
        let secrets = Secrets::try_from(&full_cli()).unwrap();
        let actual = format!("{secrets:?}");
        assert!(!actual.contains("app password"));
        assert!(!actual.contains("PUBLIC KEY"));
    }

    #[test]
    fn partial_file_keeps_defaults() {
        // Arrange
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"smtp_port": 2525, "recipient_key_id": "2c7a206205038d34", "body_format": "inline"}}"#
        )
        .unwrap();

        // Act
        let actual = Config::load(Some(file.path())).unwrap();

        // Assert
        assert_eq!(actual.smtp_port, 2525);
        assert_eq!(actual.recipient_key_id.as_str(), "2C7A206205038D34");
        assert_eq!(actual.body_format, BodyFormat::Inline);
        assert_eq!(actual.smtp_host, "smtp.gmail.com");
        assert_eq!(actual.request_timeout, Seconds::from(10));
    }

    #[test]
    fn invalid_key_id_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"recipient_key_id": "not hex"}}"#).unwrap();
        assert!(Config::load_from(file.path()).is_err());
    }

    #[test]
    fn no_file_gives_defaults() {
        let actual = Config::load(None).unwrap();
        assert_eq!(actual, Config::default());
        assert_eq!(actual.recipient_key_id.as_str(), "171EBC63CE71906C");
    }
}

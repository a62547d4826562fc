//! OpenPGP encryption of the mail body for a single recipient key.
//!
//! Each [`EncryptionStrategy`] imports the recipient key into its own [`EphemeralKeyring`] and
//! encrypts to it. The [`Encryptor`] tries the strategies in order and returns the first
//! success, the keyring of every attempt is removed before the next one starts.

mod gpg;
mod keyring;
mod native;

use std::{fmt::Display, io, str::FromStr};

use log::{debug, error, info};
use serde::Deserialize;
use thiserror::Error;

use crate::config::Config;
pub use gpg::GpgCommand;
pub use keyring::EphemeralKeyring;
pub use native::NativeOpenPgp;

pub const ARMOR_HEADER: &str = "-----BEGIN PGP MESSAGE-----";

const DEFAULT_RECIPIENT_KEY_ID: &str = "171EBC63CE71906C";

#[derive(Debug, Error)]
pub enum EncryptError {
    #[error("key import failed: {0}")]
    KeyImport(String),
    #[error("encryption failed: {status}\n{diagnostic}")]
    Encryption { status: String, diagnostic: String },
    #[error("keyring I/O failed: {0}")]
    Io(#[from] io::Error),
    #[error("failed to run {program:?}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Error)]
#[error("invalid key id {0:?}, expected 16 or 40 hex digits")]
pub struct InvalidKeyId(String);

/// Long key ID or full v4 fingerprint, stored as upper case hex
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub struct RecipientKeyId(String);

impl RecipientKeyId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True if `key_id` (16 hex digits) identifies this recipient. A fingerprint matches
    /// the key ID made from its low 64 bits.
    pub fn matches(&self, key_id: &str) -> bool {
        key_id.len() == 16 && self.0.ends_with(&key_id.to_ascii_uppercase())
    }
}

impl Default for RecipientKeyId {
    fn default() -> Self {
        Self(DEFAULT_RECIPIENT_KEY_ID.to_string())
    }
}

impl FromStr for RecipientKeyId {
    type Err = InvalidKeyId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().trim_start_matches("0x");
        if matches!(s.len(), 16 | 40) && s.chars().all(|c| c.is_ascii_hexdigit()) {
            Ok(Self(s.to_ascii_uppercase()))
        } else {
            Err(InvalidKeyId(s.to_string()))
        }
    }
}

impl TryFrom<String> for RecipientKeyId {
    type Error = InvalidKeyId;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl Display for RecipientKeyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// ASCII armored ciphertext, only constructed from text that starts with the armor header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArmoredMessage(String);

impl ArmoredMessage {
    pub fn new(text: String) -> Result<Self, EncryptError> {
        if text.trim_start().starts_with(ARMOR_HEADER) {
            Ok(Self(text))
        } else {
            Err(EncryptError::Encryption {
                status: "output is not an ASCII armored message".to_string(),
                diagnostic: text.lines().next().unwrap_or_default().to_string(),
            })
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ArmoredMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One way of running the import then encrypt sequence
pub trait EncryptionStrategy {
    /// Used in log messages
    fn name(&self) -> &str;

    /// Imports `key_material` into `keyring` and returns the IDs or fingerprints of the keys found
    fn import_key(
        &self,
        keyring: &EphemeralKeyring,
        key_material: &str,
    ) -> Result<Vec<String>, EncryptError>;

    /// Encrypts to `recipient` using only keys imported into `keyring`. The key is trusted as is.
    fn encrypt(
        &self,
        keyring: &EphemeralKeyring,
        plaintext: &str,
        recipient: &RecipientKeyId,
    ) -> Result<ArmoredMessage, EncryptError>;
}

pub struct Encryptor {
    strategies: Vec<Box<dyn EncryptionStrategy>>,
}

impl Encryptor {
    pub fn new(strategies: Vec<Box<dyn EncryptionStrategy>>) -> Self {
        Self { strategies }
    }

    /// Embedded OpenPGP first with the external gpg program as fallback
    pub fn from_config(config: &Config) -> Self {
        Self::new(vec![
            Box::new(NativeOpenPgp),
            Box::new(GpgCommand::new(&config.gpg_program)),
        ])
    }

    /// Returns the first successful result. If all strategies fail the error of the first one is
    /// returned, the others are only logged.
    pub fn encrypt(
        &self,
        plaintext: &str,
        key_material: &str,
        recipient: &RecipientKeyId,
    ) -> Result<ArmoredMessage, EncryptError> {
        let mut first_error = None;
        for strategy in &self.strategies {
            match Self::attempt(strategy.as_ref(), plaintext, key_material, recipient) {
                Ok(armored) => {
                    info!("Content encrypted for {recipient} using {}", strategy.name());
                    return Ok(armored);
                }
                Err(e) => {
                    error!("Encryption using {} failed: {e}", strategy.name());
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }
        Err(first_error.unwrap_or_else(|| EncryptError::Encryption {
            status: "no encryption strategy configured".to_string(),
            diagnostic: String::new(),
        }))
    }

    fn attempt(
        strategy: &dyn EncryptionStrategy,
        plaintext: &str,
        key_material: &str,
        recipient: &RecipientKeyId,
    ) -> Result<ArmoredMessage, EncryptError> {
        let keyring = EphemeralKeyring::create()?;
        debug!("Importing public key using {}", strategy.name());
        let imported = strategy.import_key(&keyring, key_material)?;
        if imported.is_empty() {
            return Err(EncryptError::KeyImport(
                "no usable key found in the key material".to_string(),
            ));
        }
        info!("Imported keys: {}", imported.join(", "));
        strategy.encrypt(&keyring, plaintext, recipient)
    }
}

use std::fmt::Display;

use lettre::{
    address::AddressError,
    message::{
        header::{
            ContentDisposition, ContentType, ContentTypeErr, Header, HeaderName, HeaderValue,
        },
        Mailbox, MultiPart, SinglePart,
    },
    transport::smtp::authentication::Credentials,
    Message, SmtpTransport, Transport,
};
use log::{debug, info};
use serde::Deserialize;
use thiserror::Error;
use uuid::Uuid;

use crate::{
    config::{Config, Secrets},
    encrypt::{ArmoredMessage, RecipientKeyId},
};

const PGP_ENCRYPTED: &str = "application/pgp-encrypted";
const CONTROL_BODY: &str = "Version: 1\r\n";
const ATTACHMENT_NAME: &str = "encrypted.asc";

/// How the ciphertext is laid out in the mail
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BodyFormat {
    /// `multipart/encrypted` as described in RFC 3156
    #[default]
    Rfc3156,
    /// Armored text as a plain body with an `X-PGP-Key-ID` header
    Inline,
}

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("invalid address {address:?}: {source}")]
    Address {
        address: String,
        #[source]
        source: AddressError,
    },
    #[error("invalid content type: {0}")]
    ContentType(#[from] ContentTypeErr),
    #[error("failed to build message: {0}")]
    Build(#[from] lettre::error::Error),
    #[error("failed to connect to {host}: {source}")]
    Connect {
        host: String,
        #[source]
        source: lettre::transport::smtp::Error,
    },
    #[error("failed to send message: {0}")]
    Transport(String),
}

/// Names the key the body is encrypted to so the reader knows which key to use
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PgpKeyIdHeader(String);

impl Header for PgpKeyIdHeader {
    fn name() -> HeaderName {
        HeaderName::new_from_ascii_str("X-PGP-Key-ID")
    }

    fn parse(s: &str) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        Ok(Self(s.trim().to_string()))
    }

    fn display(&self) -> HeaderValue {
        HeaderValue::new(Self::name(), self.0.clone())
    }
}

/// Who the mail goes from and to
#[derive(Debug, Clone)]
pub struct Envelope {
    pub from: Mailbox,
    pub to: Mailbox,
}

impl Envelope {
    pub fn new(from: &str, to: &str) -> Result<Self, DeliveryError> {
        Ok(Self {
            from: parse_mailbox(from)?,
            to: parse_mailbox(to)?,
        })
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox, DeliveryError> {
    address.parse().map_err(|source| DeliveryError::Address {
        address: address.to_string(),
        source,
    })
}

pub fn build_message(
    envelope: &Envelope,
    subject: &str,
    body: &ArmoredMessage,
    key_id: &RecipientKeyId,
    format: BodyFormat,
) -> Result<Message, DeliveryError> {
    let builder = Message::builder()
        .from(envelope.from.clone())
        .to(envelope.to.clone())
        .subject(subject)
        .date_now()
        .message_id(Some(format!(
            "<{}@{}>",
            Uuid::new_v4(),
            envelope.from.email.domain()
        )));

    let message = match format {
        BodyFormat::Rfc3156 => {
            let control = SinglePart::builder()
                .header(ContentType::parse(PGP_ENCRYPTED)?)
                .body(CONTROL_BODY.to_string());
            let encrypted = SinglePart::builder()
                .header(ContentType::parse(&format!(
                    "application/octet-stream; name=\"{ATTACHMENT_NAME}\""
                ))?)
                .header(ContentDisposition::inline_with_name(ATTACHMENT_NAME))
                .body(body.to_string());
            builder.multipart(
                MultiPart::encrypted(PGP_ENCRYPTED.to_string())
                    .singlepart(control)
                    .singlepart(encrypted),
            )?
        }
        BodyFormat::Inline => builder
            .header(ContentType::TEXT_PLAIN)
            .header(PgpKeyIdHeader(key_id.to_string()))
            .body(body.to_string())?,
    };
    Ok(message)
}

/// Submits `message` over `transport`, the envelope recipients come from the `To` header
pub fn deliver<T>(transport: &T, message: &Message) -> Result<(), DeliveryError>
where
    T: Transport,
    T::Error: Display,
{
    debug!("Submitting message to {:?}", message.envelope().to());
    transport
        .send(message)
        .map_err(|e| DeliveryError::Transport(e.to_string()))?;
    Ok(())
}

/// Authenticated STARTTLS submission to the configured server
pub fn smtp_transport(config: &Config, secrets: &Secrets) -> Result<SmtpTransport, DeliveryError> {
    let transport = SmtpTransport::starttls_relay(&config.smtp_host)
        .map_err(|source| DeliveryError::Connect {
            host: config.smtp_host.clone(),
            source,
        })?
        .port(config.smtp_port)
        .timeout(Some(config.smtp_timeout.into()))
        .credentials(Credentials::new(
            secrets.sender_email.clone(),
            secrets.sender_password.clone(),
        ))
        .build();
    Ok(transport)
}

/// Builds the mail for `body` according to `config` and submits it over `transport`
pub fn send_with<T>(
    transport: &T,
    envelope: &Envelope,
    config: &Config,
    body: &ArmoredMessage,
) -> Result<(), DeliveryError>
where
    T: Transport,
    T::Error: Display,
{
    let message = build_message(
        envelope,
        &config.subject,
        body,
        &config.recipient_key_id,
        config.body_format,
    )?;
    info!(
        "Sending encrypted mail to {} via {}:{}",
        envelope.to, config.smtp_host, config.smtp_port
    );
    deliver(transport, &message)?;
    info!("Mail sent");
    Ok(())
}

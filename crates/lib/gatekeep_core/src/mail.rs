//! Outbound mail capability.
//!
//! Uses SMTP via lettre when configured; otherwise messages are logged.

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::transport::smtp::Error as SmtpError;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use thiserror::Error;
use tracing::{debug, info};

/// Errors that can occur when sending email.
#[derive(Debug, Error)]
pub enum MailError {
    #[error("SMTP error: {0}")]
    Smtp(#[from] SmtpError),

    #[error("Failed to build message: {0}")]
    MessageBuild(#[from] lettre::error::Error),

    #[error("Invalid email address: {0}")]
    InvalidAddress(String),
}

/// `Send(to, subject, body)`.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), MailError>;
}

/// SMTP relay settings.
#[derive(Clone, Debug)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    /// `From:` address.
    pub sender: String,
}

/// STARTTLS SMTP relay mailer.
#[derive(Clone)]
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    sender: String,
}

impl SmtpMailer {
    pub fn new(config: &SmtpConfig) -> Result<Self, MailError> {
        let credentials = Credentials::new(config.username.clone(), config.password.clone());
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)?
            .port(config.port)
            .credentials(credentials)
            .build();
        Ok(Self {
            transport,
            sender: config.sender.clone(),
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), MailError> {
        let message = Message::builder()
            .from(
                self.sender
                    .parse()
                    .map_err(|_| MailError::InvalidAddress(self.sender.clone()))?,
            )
            .to(to
                .parse()
                .map_err(|_| MailError::InvalidAddress(to.to_string()))?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())?;

        self.transport.send(message).await?;
        info!(to = %to, subject = %subject, "email sent");
        Ok(())
    }
}

/// Logs messages instead of delivering them. Used when SMTP is not configured.
#[derive(Clone, Debug, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), MailError> {
        info!(to = %to, subject = %subject, "SMTP not configured, email not sent");
        debug!(body = %body, "unsent email body");
        Ok(())
    }
}

/// Subject line of the verification email.
pub const VERIFICATION_SUBJECT: &str = "Please Verify Your Email Address";

/// Body of the verification email.
pub fn verification_body(link: &str) -> String {
    format!(
        "Hello,\n\nPlease verify your email address by clicking the following link:\n{link}\n\nThank you!"
    )
}

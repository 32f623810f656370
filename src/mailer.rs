//! Outgoing email.

use anyhow::Result;
use async_trait::async_trait;
use lettre::message::{header::ContentType, Mailbox};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::config::NotifierConfig;
use crate::http;

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<()>;
}

/// SMTP over implicit TLS, authenticated with the sender's credentials.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    /// # Errors
    ///
    /// Fails if the sender address or password environment variables are
    /// missing, or the sender address does not parse.
    pub fn new(config: &NotifierConfig) -> Result<Self> {
        let sender = http::api_key(&config.sender_env)?;
        let password = http::api_key(&config.password_env)?;

        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_host)?
            .port(config.smtp_port)
            .credentials(Credentials::new(sender.clone(), password))
            .build();

        Ok(Self {
            transport,
            from: sender.parse()?,
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<()> {
        let message = Message::builder()
            .from(self.from.clone())
            .to(to.parse()?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())?;

        self.transport.send(message).await?;
        tracing::info!(to, subject, "email sent");
        Ok(())
    }
}

/// Logs instead of sending. Used for `notify --dry-run`.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<()> {
        tracing::info!(to, subject, "dry run, email not sent");
        println!("--- To: {} | {} ---\n{}\n", to, subject, body);
        Ok(())
    }
}

//! Outbound email over an authenticated SMTP session.
//!
//! Sending is not idempotent: every successful [`Mailer::send`] delivers a new
//! message to the relay.

mod smtp;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lettre::Address;
use tokio::time::timeout;
use tracing::{info, warn};

use crate::config::SmtpConfig;
use crate::error::MailError;

pub use smtp::StartTlsTransport;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EmailMessage {
    pub recipient: String,
    pub subject: String,
    pub body: String,
}

/// A message whose addresses have already been validated.
#[derive(Clone, Debug)]
pub struct OutboundEmail {
    pub from: Address,
    pub to: Address,
    pub subject: String,
    pub body: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Delivery {
    pub recipient: String,
    pub subject: String,
}

/// Opens sessions against a relay.
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn open(&self, host: &str, port: u16) -> Result<Box<dyn MailSession>, MailError>;
}

/// One live relay session. `close` is called exactly once per opened session.
#[async_trait]
pub trait MailSession: Send {
    async fn login(&mut self, login: &str, password: &str) -> Result<(), MailError>;
    async fn send(&mut self, email: &OutboundEmail) -> Result<(), MailError>;
    async fn close(&mut self);
}

#[derive(Clone)]
pub struct Mailer {
    config: SmtpConfig,
    transport: Arc<dyn MailTransport>,
}

impl std::fmt::Debug for Mailer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mailer")
            .field("host", &self.config.host)
            .field("port", &self.config.port)
            .field("sender", &self.config.sender)
            .finish()
    }
}

impl Mailer {
    pub fn new(config: SmtpConfig) -> Self {
        let transport = StartTlsTransport::new(config.timeout);
        Self::with_transport(config, transport)
    }

    pub fn with_transport<T>(config: SmtpConfig, transport: T) -> Self
    where
        T: MailTransport + 'static,
    {
        Self {
            config,
            transport: Arc::new(transport),
        }
    }

    pub async fn send(&self, message: &EmailMessage) -> Result<Delivery, MailError> {
        let login = self
            .config
            .login
            .as_deref()
            .ok_or(MailError::MissingCredentials("MAILTRAP_LOGIN"))?;
        let password = self
            .config
            .password
            .as_deref()
            .ok_or(MailError::MissingCredentials("MAILTRAP_PASSWORD"))?;
        let host = self
            .config
            .host
            .as_deref()
            .ok_or(MailError::MissingCredentials("MAILTRAP_HOST"))?;

        let email = OutboundEmail {
            from: parse_address("sender", &self.config.sender)?,
            to: parse_address("recipient", &message.recipient)?,
            subject: message.subject.clone(),
            body: message.body.clone(),
        };

        let port = self.config.port;
        let mut session = within("connect", self.config.timeout, self.transport.open(host, port))
            .await?;

        let outcome = self.deliver(session.as_mut(), login, password, &email).await;

        if timeout(self.config.timeout, session.close()).await.is_err() {
            warn!(host, port, "SMTP session did not close cleanly");
        }

        match &outcome {
            Ok(()) => info!(recipient = %message.recipient, subject = %message.subject, "email sent"),
            Err(err) => warn!(recipient = %message.recipient, error = %err, "email not sent"),
        }

        outcome.map(|()| Delivery {
            recipient: message.recipient.clone(),
            subject: message.subject.clone(),
        })
    }

    async fn deliver(
        &self,
        session: &mut dyn MailSession,
        login: &str,
        password: &str,
        email: &OutboundEmail,
    ) -> Result<(), MailError> {
        within("login", self.config.timeout, session.login(login, password)).await?;
        within("send", self.config.timeout, session.send(email)).await
    }
}

async fn within<T, F>(stage: &'static str, limit: Duration, future: F) -> Result<T, MailError>
where
    F: Future<Output = Result<T, MailError>>,
{
    timeout(limit, future)
        .await
        .map_err(|_| MailError::Timeout {
            stage,
            timeout: limit,
        })?
}

fn parse_address(field: &'static str, value: &str) -> Result<Address, MailError> {
    value
        .trim()
        .parse::<Address>()
        .map_err(|err| MailError::InvalidAddress {
            field,
            value: value.to_string(),
            message: err.to_string(),
        })
}

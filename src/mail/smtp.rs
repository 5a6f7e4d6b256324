use std::time::Duration;

use async_trait::async_trait;
use lettre::Message;
use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::{Credentials, Mechanism};
use lettre::transport::smtp::client::{AsyncSmtpConnection, TlsParameters};
use lettre::transport::smtp::extension::ClientId;
use tracing::debug;

use super::{MailSession, MailTransport, OutboundEmail};
use crate::error::MailError;

const HELLO_NAME: &str = "localhost";

/// Plaintext connect followed by a STARTTLS upgrade.
#[derive(Debug, Clone)]
pub struct StartTlsTransport {
    timeout: Duration,
}

impl StartTlsTransport {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl MailTransport for StartTlsTransport {
    async fn open(&self, host: &str, port: u16) -> Result<Box<dyn MailSession>, MailError> {
        let hello = ClientId::Domain(HELLO_NAME.to_string());

        let mut connection =
            AsyncSmtpConnection::connect_tokio1((host, port), Some(self.timeout), &hello, None, None)
                .await
                .map_err(|err| MailError::Connect {
                    host: host.to_string(),
                    port,
                    message: err.to_string(),
                })?;

        let tls = TlsParameters::new(host.to_string()).map_err(|err| MailError::Smtp {
            stage: "starttls",
            message: err.to_string(),
        })?;
        connection
            .starttls(tls, &hello)
            .await
            .map_err(|err| MailError::Smtp {
                stage: "starttls",
                message: err.to_string(),
            })?;

        debug!(host, port, "SMTP session upgraded to TLS");
        Ok(Box::new(SmtpSession { connection }))
    }
}

struct SmtpSession {
    connection: AsyncSmtpConnection,
}

#[async_trait]
impl MailSession for SmtpSession {
    async fn login(&mut self, login: &str, password: &str) -> Result<(), MailError> {
        let credentials = Credentials::new(login.to_string(), password.to_string());
        self.connection
            .auth(&[Mechanism::Plain, Mechanism::Login], &credentials)
            .await
            .map_err(|err| MailError::Smtp {
                stage: "login",
                message: err.to_string(),
            })?;
        Ok(())
    }

    async fn send(&mut self, email: &OutboundEmail) -> Result<(), MailError> {
        let message = compose(email)?;
        self.connection
            .send(message.envelope(), &message.formatted())
            .await
            .map_err(|err| MailError::Smtp {
                stage: "send",
                message: err.to_string(),
            })?;
        Ok(())
    }

    async fn close(&mut self) {
        if let Err(err) = self.connection.quit().await {
            debug!(error = %err, "SMTP QUIT failed; dropping connection");
        }
    }
}

/// Single-part `text/plain` message with From, To and Subject headers.
fn compose(email: &OutboundEmail) -> Result<Message, MailError> {
    Message::builder()
        .from(Mailbox::new(None, email.from.clone()))
        .to(Mailbox::new(None, email.to.clone()))
        .subject(email.subject.clone())
        .header(ContentType::TEXT_PLAIN)
        .body(email.body.clone())
        .map_err(|err| MailError::Compose(err.to_string()))
}

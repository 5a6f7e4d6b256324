use std::sync::Arc;

use serde::Deserialize;
use serde_json::json;
use tracing::info;

use super::{ToolSpec, parse_arguments};
use crate::error::{SchemaError, ToolError};
use crate::mail::{EmailMessage, Mailer};

pub const SEND_USER_EMAIL: &str = "send_user_email";

#[derive(Debug, Deserialize)]
struct EmailArgs {
    recipient_email: String,
    subject: String,
    body: String,
}

/// Every successful call sends a real message; repeated calls send duplicates.
pub fn email_tool(mailer: Arc<Mailer>) -> Result<ToolSpec, SchemaError> {
    Ok(ToolSpec::new(
        SEND_USER_EMAIL,
        "Sends a plain-text email to a user. ALWAYS use this tool when the user \
         specifically asks to 'send an email' or 'contact' a user.",
    )
    .with_schema(json!({
        "type": "object",
        "properties": {
            "recipient_email": {
                "type": "string",
                "description": "The email address of the user."
            },
            "subject": {
                "type": "string",
                "description": "The subject line of the email."
            },
            "body": {
                "type": "string",
                "description": "The main content of the email."
            }
        },
        "required": ["recipient_email", "subject", "body"],
        "additionalProperties": false
    }))?
    .with_handler(move |args| {
        let mailer = mailer.clone();
        async move {
            let EmailArgs {
                recipient_email,
                subject,
                body,
            } = parse_arguments(SEND_USER_EMAIL, args)?;
            info!(recipient = %recipient_email, "tool call: {SEND_USER_EMAIL}");

            let delivery = mailer
                .send(&EmailMessage {
                    recipient: recipient_email,
                    subject,
                    body,
                })
                .await
                .map_err(|err| ToolError::failed(err.kind(), err.to_string()))?;

            Ok(format!(
                "Email sent to {} with subject '{}'.",
                delivery.recipient, delivery.subject
            ))
        }
    }))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::error::FailureKind;
    use crate::mail::testing::{RecordingTransport, smtp_config};

    fn args() -> serde_json::Value {
        json!({
            "recipient_email": "bill@example.com",
            "subject": "Status Update",
            "body": "Your request has been processed."
        })
    }

    #[tokio::test]
    async fn sends_and_reports_delivery() {
        let transport = RecordingTransport::default();
        let mailer = Mailer::with_transport(smtp_config(), transport.clone());
        let tool = email_tool(Arc::new(mailer)).expect("schema valid");

        let text = tool.execute(args()).await.expect("email sent");

        assert_eq!(
            text,
            "Email sent to bill@example.com with subject 'Status Update'."
        );
        assert_eq!(transport.calls().len(), 4);
    }

    #[tokio::test]
    async fn missing_credentials_surface_as_configuration_failure() {
        let transport = RecordingTransport::default();
        let mut config = smtp_config();
        config.login = None;
        config.password = None;
        let tool = email_tool(Arc::new(Mailer::with_transport(config, transport.clone())))
            .expect("schema valid");

        let err = tool.execute(args()).await.expect_err("not configured");

        assert_eq!(err.kind(), FailureKind::Configuration);
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn missing_body_is_rejected_before_sending() {
        let transport = RecordingTransport::default();
        let tool = email_tool(Arc::new(Mailer::with_transport(
            smtp_config(),
            transport.clone(),
        )))
        .expect("schema valid");

        let err = tool
            .execute(json!({"recipient_email": "bill@example.com", "subject": "Hi"}))
            .await
            .expect_err("body required");

        assert!(matches!(err, ToolError::InvalidArguments { .. }));
        assert!(transport.calls().is_empty());
    }
}

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::StatusApiConfig;
use crate::error::StatusError;

pub const STATUS_UNKNOWN: &str = "Status Unknown";

/// A status as reported by the remote service. Kept as a string: the client
/// does not assume the service only knows the demo statuses.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserStatus {
    pub user_id: i64,
    pub app_status: String,
}

#[derive(Debug, Clone)]
pub struct StatusClient {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl StatusClient {
    pub fn new(config: &StatusApiConfig) -> Result<Self, StatusError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|err| StatusError::Unreachable {
                url: config.base_url.clone(),
                message: err.to_string(),
            })?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            timeout: config.timeout,
        })
    }

    fn endpoint(&self, user_id: i64) -> String {
        format!("{}/users/{user_id}/status", self.base_url)
    }

    /// Single GET, no retries.
    pub async fn fetch(&self, user_id: i64) -> Result<UserStatus, StatusError> {
        let url = self.endpoint(user_id);
        debug!(%url, "fetching user status");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|err| self.classify(&url, err))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let detail = extract_detail(&body);
            warn!(%url, status = status.as_u16(), %detail, "status service rejected lookup");

            return Err(if status == StatusCode::NOT_FOUND {
                StatusError::NotFound { user_id, detail }
            } else {
                StatusError::Protocol {
                    status: status.as_u16(),
                    detail,
                }
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|err| self.classify(&url, err))?;
        let payload = serde_json::from_slice::<Value>(&body)
            .map_err(|err| StatusError::Malformed(err.to_string()))?;

        parse_status(user_id, &payload)
    }

    fn classify(&self, url: &str, err: reqwest::Error) -> StatusError {
        if err.is_timeout() {
            StatusError::Timeout(self.timeout)
        } else if err.is_decode() {
            StatusError::Malformed(err.to_string())
        } else {
            StatusError::Unreachable {
                url: url.to_string(),
                message: err.to_string(),
            }
        }
    }
}

fn parse_status(user_id: i64, payload: &Value) -> Result<UserStatus, StatusError> {
    let object = payload
        .as_object()
        .ok_or_else(|| StatusError::Malformed("expected a JSON object".to_string()))?;

    let app_status = match object.get("app_status") {
        None | Some(Value::Null) => STATUS_UNKNOWN.to_string(),
        Some(Value::String(status)) => status.clone(),
        Some(other) => {
            return Err(StatusError::Malformed(format!(
                "app_status must be a string, got {other}"
            )));
        }
    };

    Ok(UserStatus {
        user_id,
        app_status,
    })
}

fn extract_detail(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| {
            value
                .get("detail")
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.trim().to_string())
}

//! Process configuration, read once at startup.
//!
//! Every value comes from the environment (a `.env` file is honoured by the
//! binaries through `dotenvy`):
//! - `STATUS_API_BASE_URL` - status service base URL. Defaults to `http://127.0.0.1:8001`.
//! - `STATUS_API_BIND` - bind address of the mock status service. Defaults to `127.0.0.1:8001`.
//! - `STATUS_API_TIMEOUT_SECS` - per-request timeout for status lookups. Defaults to `10`.
//! - `MAILTRAP_HOST` / `MAILTRAP_LOGIN` / `MAILTRAP_PASSWORD` - SMTP relay and credentials.
//! - `MAILTRAP_PORT` - SMTP submission port. Defaults to `587`.
//! - `MAIL_SENDER` - `From` address of outbound mail. Defaults to `support@example.com`.
//! - `SMTP_TIMEOUT_SECS` - per-step SMTP timeout. Defaults to `10`.
//! - `GOOGLE_API_KEY` (or `GEMINI_API_KEY`) - model credential.
//! - `GEMINI_MODEL` - model name. Defaults to `gemini-2.5-flash`.
//! - `GEMINI_TEMPERATURE` - sampling temperature. Defaults to `0`.
//! - `MODEL_TIMEOUT_SECS` - model request timeout. Defaults to `60`.
//!
//! The SMTP credentials are optional here: a missing credential only fails the
//! email tool when it is called, the rest of the agent keeps working.

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

pub const DEFAULT_STATUS_API_BASE_URL: &str = "http://127.0.0.1:8001";
pub const DEFAULT_STATUS_API_BIND: &str = "127.0.0.1:8001";
pub const DEFAULT_SMTP_PORT: u16 = 587;
pub const DEFAULT_SENDER: &str = "support@example.com";
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful customer service agent. \
Use the appropriate tool(s) to assist the user. If you use a tool, always summarize \
the tool's result clearly. Be concise and professional.";

#[derive(Debug, Clone)]
pub struct StatusApiConfig {
    pub base_url: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: Option<String>,
    pub port: u16,
    pub login: Option<String>,
    pub password: Option<String>,
    pub sender: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct ModelSettings {
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub status_api: StatusApiConfig,
    pub status_bind: SocketAddr,
    pub smtp: SmtpConfig,
    pub model: ModelSettings,
    pub system_prompt: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup. Blank values
    /// count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let status_api = StatusApiConfig {
            base_url: get("STATUS_API_BASE_URL")
                .unwrap_or_else(|| DEFAULT_STATUS_API_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            timeout: secs(&get, "STATUS_API_TIMEOUT_SECS", 10)?,
        };

        let status_bind = parse_or(&get, "STATUS_API_BIND", || {
            SocketAddr::from_str(DEFAULT_STATUS_API_BIND).map_err(|_| {
                ConfigError::InvalidValue {
                    key: "STATUS_API_BIND",
                    value: DEFAULT_STATUS_API_BIND.to_string(),
                }
            })
        })?;

        let smtp = SmtpConfig {
            host: get("MAILTRAP_HOST"),
            port: parse_or(&get, "MAILTRAP_PORT", || Ok(DEFAULT_SMTP_PORT))?,
            login: get("MAILTRAP_LOGIN"),
            password: get("MAILTRAP_PASSWORD"),
            sender: get("MAIL_SENDER").unwrap_or_else(|| DEFAULT_SENDER.to_string()),
            timeout: secs(&get, "SMTP_TIMEOUT_SECS", 10)?,
        };

        let model = ModelSettings {
            api_key: get("GOOGLE_API_KEY").or_else(|| get("GEMINI_API_KEY")),
            model: get("GEMINI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            temperature: parse_or(&get, "GEMINI_TEMPERATURE", || Ok(0.0))?,
            timeout: secs(&get, "MODEL_TIMEOUT_SECS", 60)?,
        };

        Ok(Self {
            status_api,
            status_bind,
            smtp,
            model,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        })
    }
}

fn parse_or<T, G, D>(get: &G, key: &'static str, default: D) -> Result<T, ConfigError>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
    D: FnOnce() -> Result<T, ConfigError>,
{
    match get(key) {
        Some(raw) => raw
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidValue { key, value: raw }),
        None => default(),
    }
}

fn secs<G>(get: &G, key: &'static str, default: u64) -> Result<Duration, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    let value = parse_or(get, key, || Ok(default))?;
    if value == 0 {
        return Err(ConfigError::InvalidValue {
            key,
            value: value.to_string(),
        });
    }
    Ok(Duration::from_secs(value))
}

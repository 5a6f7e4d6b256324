use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::agent::ConversationTurn;

/// Classification carried by every failed tool result.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Unreachable,
    Timeout,
    NotFound,
    MalformedResponse,
    Protocol,
    Configuration,
    InvalidInput,
    General,
}

impl FailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unreachable => "unreachable",
            Self::Timeout => "timeout",
            Self::NotFound => "not_found",
            Self::MalformedResponse => "malformed_response",
            Self::Protocol => "protocol",
            Self::Configuration => "configuration",
            Self::InvalidInput => "invalid_input",
            Self::General => "general",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(&'static str),
    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
}

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("tool schema must be a JSON object")]
    SchemaNotObject,
    #[error("tool schema must declare type=object")]
    RootTypeMustBeObject,
    #[error("required must be an array of strings")]
    InvalidRequired,
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("tool not found: {0}")]
    NotFound(String),
    #[error("invalid tool arguments for {tool}: {message}")]
    InvalidArguments { tool: String, message: String },
    #[error("{message}")]
    Failed { kind: FailureKind, message: String },
    #[error(transparent)]
    Schema(#[from] SchemaError),
}

impl ToolError {
    pub fn failed(kind: FailureKind, message: impl Into<String>) -> Self {
        Self::Failed {
            kind,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            Self::NotFound(_) | Self::InvalidArguments { .. } => FailureKind::InvalidInput,
            Self::Failed { kind, .. } => *kind,
            Self::Schema(_) => FailureKind::General,
        }
    }
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider request failed: {0}")]
    Request(String),
    #[error("provider response invalid: {0}")]
    Response(String),
}

#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Tool(#[from] ToolError),
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error("max iterations reached ({max_iterations})")]
    MaxIterationsReached { max_iterations: u32 },
    #[error("agent stream ended without final response")]
    MissingFinalResponse,
    #[error("conversation must end with a user turn")]
    MissingUserTurn,
    #[error("agent configuration error: {0}")]
    Config(String),
}

impl AgentError {
    /// True when the loop ran but the model never produced a usable answer.
    pub fn is_unanswered(&self) -> bool {
        matches!(
            self,
            Self::MaxIterationsReached { .. } | Self::MissingFinalResponse
        )
    }
}

/// A failed exchange. `turns` keeps every tool turn that completed before
/// `source` ended the loop.
#[derive(Debug, Error)]
#[error("{source}")]
pub struct ExchangeError {
    pub turns: Vec<ConversationTurn>,
    #[source]
    pub source: AgentError,
}

#[derive(Debug, Error)]
pub enum StatusError {
    #[error("status service unreachable at {url}: {message}")]
    Unreachable { url: String, message: String },
    #[error("status service did not answer within {0:?}")]
    Timeout(std::time::Duration),
    #[error("user {user_id} not found: {detail}")]
    NotFound { user_id: i64, detail: String },
    #[error("status service returned HTTP {status}: {detail}")]
    Protocol { status: u16, detail: String },
    #[error("malformed status response: {0}")]
    Malformed(String),
}

impl StatusError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Unreachable { .. } => FailureKind::Unreachable,
            Self::Timeout(_) => FailureKind::Timeout,
            Self::NotFound { .. } => FailureKind::NotFound,
            Self::Protocol { .. } => FailureKind::Protocol,
            Self::Malformed(_) => FailureKind::MalformedResponse,
        }
    }
}

#[derive(Debug, Error)]
pub enum MailError {
    #[error("SMTP credentials are not configured (missing {0})")]
    MissingCredentials(&'static str),
    #[error("invalid {field} address '{value}': {message}")]
    InvalidAddress {
        field: &'static str,
        value: String,
        message: String,
    },
    #[error("could not connect to SMTP relay {host}:{port}: {message}")]
    Connect {
        host: String,
        port: u16,
        message: String,
    },
    #[error("SMTP {stage} failed: {message}")]
    Smtp {
        stage: &'static str,
        message: String,
    },
    #[error("SMTP {stage} did not complete within {timeout:?}")]
    Timeout {
        stage: &'static str,
        timeout: std::time::Duration,
    },
    #[error("could not compose email: {0}")]
    Compose(String),
}

impl MailError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::MissingCredentials(_) => FailureKind::Configuration,
            Self::InvalidAddress { .. } => FailureKind::InvalidInput,
            Self::Connect { .. } => FailureKind::Unreachable,
            Self::Smtp { .. } => FailureKind::Protocol,
            Self::Timeout { .. } => FailureKind::Timeout,
            Self::Compose(_) => FailureKind::General,
        }
    }
}

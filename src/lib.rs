//! Customer-service agent for Rust.
//!
//! Surface:
//! - `Agent` loop that lets a `ChatModel` pick tools until it answers
//! - Gemini adapter via `GeminiModel`
//! - `get_user_status` (HTTP) and `send_user_email` (SMTP) tools
//! - `status` mock service serving the demo account table
//! - `AppConfig` read once from the environment

pub mod agent;
pub mod config;
pub mod error;
pub mod llm;
pub mod mail;
pub mod status;
pub mod support;
pub mod telemetry;
pub mod tools;

pub use agent::{
    Agent, AgentBuilder, AgentConfig, AgentEvent, ConversationTurn, Role, ToolInvocation, query,
    query_stream,
};
pub use config::AppConfig;
pub use error::{
    AgentError, ConfigError, ExchangeError, FailureKind, MailError, ProviderError, SchemaError,
    StatusError, ToolError,
};
pub use llm::{
    ChatModel, GeminiModel, GeminiModelConfig, ModelCompletion, ModelMessage, ModelToolCall,
    ModelToolChoice, ModelToolDefinition, NextAction,
};
pub use tools::{ToolResult, ToolSpec};

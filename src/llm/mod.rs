mod gemini;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{FailureKind, ProviderError};

pub use gemini::{GeminiModel, GeminiModelConfig};

#[derive(Clone, Debug, PartialEq)]
pub enum ModelMessage {
    System(String),
    User(String),
    Assistant {
        content: Option<String>,
        tool_calls: Vec<ModelToolCall>,
    },
    ToolResult {
        tool_call_id: String,
        tool_name: String,
        content: String,
        failure: Option<FailureKind>,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub struct ModelToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
    /// Opaque provider token that must be echoed back with the call.
    pub signature: Option<String>,
}

impl ModelToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
            signature: None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ModelToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModelToolChoice {
    Auto,
    None,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ModelCompletion {
    pub text: Option<String>,
    pub thinking: Option<String>,
    pub tool_calls: Vec<ModelToolCall>,
    pub usage: Option<ModelUsage>,
}

/// Token counts reported with a completion. Logged per loop iteration.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ModelUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// What the model asked for on one turn of the loop.
#[derive(Clone, Debug, PartialEq)]
pub enum NextAction {
    InvokeTools(Vec<ModelToolCall>),
    FinalAnswer(String),
}

impl ModelCompletion {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn tool_calls(tool_calls: Vec<ModelToolCall>) -> Self {
        Self {
            tool_calls,
            ..Self::default()
        }
    }

    pub fn next_action(&self) -> NextAction {
        if self.tool_calls.is_empty() {
            NextAction::FinalAnswer(self.text.clone().unwrap_or_default())
        } else {
            NextAction::InvokeTools(self.tool_calls.clone())
        }
    }
}

#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn invoke(
        &self,
        messages: &[ModelMessage],
        tools: &[ModelToolDefinition],
        tool_choice: ModelToolChoice,
    ) -> Result<ModelCompletion, ProviderError>;
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn completion_without_tool_calls_is_a_final_answer() {
        assert_eq!(
            ModelCompletion::text("done").next_action(),
            NextAction::FinalAnswer("done".to_string())
        );
        assert_eq!(
            ModelCompletion::default().next_action(),
            NextAction::FinalAnswer(String::new())
        );
    }

    #[test]
    fn tool_calls_take_precedence_over_text() {
        let call = ModelToolCall::new("call_1", "get_user_status", json!({"user_id": 101}));
        let mut completion = ModelCompletion::tool_calls(vec![call.clone()]);
        completion.text = Some("checking".to_string());

        assert_eq!(completion.next_action(), NextAction::InvokeTools(vec![call]));
    }
}

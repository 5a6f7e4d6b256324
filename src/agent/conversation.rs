use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::FailureKind;
use crate::llm::{ModelMessage, ModelToolCall};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    Tool,
}

/// The tool invocation a tool turn answers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub id: String,
    pub name: String,
    pub arguments: Value,
    /// Provider token echoed back when the call is replayed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call: Option<ToolInvocation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,
}

impl ConversationTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            tool_call: None,
            failure: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            tool_call: None,
            failure: None,
        }
    }

    pub fn tool(
        invocation: ToolInvocation,
        content: impl Into<String>,
        failure: Option<FailureKind>,
    ) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
            tool_call: Some(invocation),
            failure,
        }
    }
}

/// Model-facing replay of earlier turns. A tool turn becomes the call that
/// produced it followed by its result; a tool turn without its invocation
/// cannot be replayed and is skipped.
pub(crate) fn replay(turns: &[ConversationTurn]) -> Vec<ModelMessage> {
    let mut messages = Vec::with_capacity(turns.len());

    for turn in turns {
        match turn.role {
            Role::User => messages.push(ModelMessage::User(turn.content.clone())),
            Role::Assistant => messages.push(ModelMessage::Assistant {
                content: Some(turn.content.clone()),
                tool_calls: Vec::new(),
            }),
            Role::Tool => {
                let Some(call) = &turn.tool_call else {
                    continue;
                };
                messages.push(ModelMessage::Assistant {
                    content: None,
                    tool_calls: vec![ModelToolCall {
                        id: call.id.clone(),
                        name: call.name.clone(),
                        arguments: call.arguments.clone(),
                        signature: call.signature.clone(),
                    }],
                });
                messages.push(ModelMessage::ToolResult {
                    tool_call_id: call.id.clone(),
                    tool_name: call.name.clone(),
                    content: turn.content.clone(),
                    failure: turn.failure,
                });
            }
        }
    }

    messages
}

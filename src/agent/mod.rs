mod conversation;

use std::collections::HashMap;
use std::sync::Arc;

use async_stream::try_stream;
use futures_util::{Stream, StreamExt};
use tracing::{debug, info, warn};

use crate::error::{AgentError, ExchangeError, FailureKind};
use crate::llm::{
    ChatModel, ModelCompletion, ModelMessage, ModelToolCall, ModelToolChoice, ModelToolDefinition,
    NextAction,
};
use crate::tools::{ToolResult, ToolSpec};

pub use conversation::{ConversationTurn, Role, ToolInvocation};

#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub max_iterations: u32,
    pub system_prompt: Option<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: 24,
            system_prompt: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AgentEvent {
    Thinking {
        content: String,
    },
    Text {
        content: String,
    },
    ToolCall {
        tool: String,
        args_json: serde_json::Value,
        tool_call_id: String,
        signature: Option<String>,
    },
    ToolResult {
        tool: String,
        result_text: String,
        tool_call_id: String,
        failure: Option<FailureKind>,
    },
    FinalResponse {
        content: String,
    },
}

#[derive(Default)]
pub struct AgentBuilder {
    model: Option<Arc<dyn ChatModel>>,
    tools: Vec<ToolSpec>,
    config: AgentConfig,
}

impl AgentBuilder {
    pub fn model<M>(mut self, model: M) -> Self
    where
        M: ChatModel + 'static,
    {
        self.model = Some(Arc::new(model));
        self
    }

    pub fn shared_model(mut self, model: Arc<dyn ChatModel>) -> Self {
        self.model = Some(model);
        self
    }

    pub fn tool(mut self, tool: ToolSpec) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn tools(mut self, tools: Vec<ToolSpec>) -> Self {
        self.tools.extend(tools);
        self
    }

    pub fn config(mut self, config: AgentConfig) -> Self {
        self.config = config;
        self
    }

    pub fn system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(system_prompt.into());
        self
    }

    pub fn max_iterations(mut self, max_iterations: u32) -> Self {
        self.config.max_iterations = max_iterations;
        self
    }

    pub fn build(self) -> Result<Agent, AgentError> {
        let Some(model) = self.model else {
            return Err(AgentError::Config(
                "agent model must be configured via AgentBuilder::model(...)".to_string(),
            ));
        };

        let mut tool_map = HashMap::new();
        for tool in &self.tools {
            if tool_map
                .insert(tool.name().to_string(), tool.clone())
                .is_some()
            {
                return Err(AgentError::Config(format!(
                    "duplicate tool registered: {}",
                    tool.name()
                )));
            }
        }

        let tool_definitions = self
            .tools
            .iter()
            .map(|tool| ModelToolDefinition {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                parameters: tool.json_schema().clone(),
            })
            .collect();

        Ok(Agent {
            model,
            tool_definitions,
            tool_map,
            config: self.config,
            history: Vec::new(),
        })
    }
}

/// A model bound to a tool set under one system instruction. Keeps the
/// model-facing history across calls until [`Agent::clear_history`].
pub struct Agent {
    model: Arc<dyn ChatModel>,
    tool_definitions: Vec<ModelToolDefinition>,
    tool_map: HashMap<String, ToolSpec>,
    config: AgentConfig,
    history: Vec<ModelMessage>,
}

impl Agent {
    pub fn builder() -> AgentBuilder {
        AgentBuilder::default()
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    pub fn messages_len(&self) -> usize {
        self.history.len()
    }

    pub async fn query(&mut self, user_message: impl Into<String>) -> Result<String, AgentError> {
        let stream = self.query_stream(user_message);
        futures_util::pin_mut!(stream);

        let mut final_response: Option<String> = None;

        while let Some(event) = stream.next().await {
            if let AgentEvent::FinalResponse { content } = event? {
                final_response = Some(content);
            }
        }

        final_response.ok_or(AgentError::MissingFinalResponse)
    }

    /// Runs one exchange over a caller-owned conversation whose last turn is
    /// the new user message. Earlier turns replace the agent's history. The
    /// result is the input followed by one tool turn per invocation and the
    /// final assistant turn. On failure the error carries the conversation
    /// with every tool turn that completed.
    pub async fn respond(
        &mut self,
        mut turns: Vec<ConversationTurn>,
    ) -> Result<Vec<ConversationTurn>, ExchangeError> {
        let outcome = {
            let stream = self.respond_stream(&mut turns);
            futures_util::pin_mut!(stream);

            let mut outcome = Ok(());
            while let Some(event) = stream.next().await {
                if let Err(err) = event {
                    outcome = Err(err);
                    break;
                }
            }
            outcome
        };

        let answered = turns.last().is_some_and(|turn| turn.role == Role::Assistant);
        match outcome {
            Ok(()) if answered => Ok(turns),
            Ok(()) => Err(ExchangeError {
                turns,
                source: AgentError::MissingFinalResponse,
            }),
            Err(source) => Err(ExchangeError { turns, source }),
        }
    }

    /// Streaming form of [`Agent::respond`]. Tool turns and the final
    /// assistant turn are appended to `turns` as they complete.
    pub fn respond_stream<'a>(
        &'a mut self,
        turns: &'a mut Vec<ConversationTurn>,
    ) -> impl Stream<Item = Result<AgentEvent, AgentError>> + 'a {
        try_stream! {
            let user_message = match turns.last() {
                Some(turn) if turn.role == Role::User => turn.content.clone(),
                _ => Err::<String, AgentError>(AgentError::MissingUserTurn)?,
            };

            self.history = self.system_messages();
            self.history
                .extend(conversation::replay(&turns[..turns.len() - 1]));

            let mut pending_calls: HashMap<String, ToolInvocation> = HashMap::new();
            let stream = self.query_stream(user_message);
            futures_util::pin_mut!(stream);

            while let Some(event) = stream.next().await {
                let event = event?;
                record_turn(turns, &mut pending_calls, &event);
                yield event;
            }
        }
    }

    pub fn query_stream(
        &mut self,
        user_message: impl Into<String>,
    ) -> impl Stream<Item = Result<AgentEvent, AgentError>> + '_ {
        let user_message = user_message.into();

        try_stream! {
            if self.history.is_empty() {
                self.history = self.system_messages();
            }

            self.history.push(ModelMessage::User(user_message));

            let tool_choice = if self.tool_definitions.is_empty() {
                ModelToolChoice::None
            } else {
                ModelToolChoice::Auto
            };

            for iteration in 1..=self.config.max_iterations {
                debug!(iteration, history = self.history.len(), "awaiting model decision");

                let completion = self
                    .model
                    .invoke(&self.history, &self.tool_definitions, tool_choice)
                    .await?;

                if let Some(thinking) = completion.thinking.clone() {
                    yield AgentEvent::Thinking { content: thinking };
                }

                if let Some(usage) = &completion.usage {
                    debug!(
                        iteration,
                        input_tokens = usage.input_tokens,
                        output_tokens = usage.output_tokens,
                        "model usage"
                    );
                }

                self.append_assistant_message(&completion);

                if let Some(text) = completion.text.clone() {
                    if !text.is_empty() {
                        yield AgentEvent::Text { content: text };
                    }
                }

                let tool_calls = match completion.next_action() {
                    NextAction::FinalAnswer(content) => {
                        info!(iteration, "agent produced final answer");
                        yield AgentEvent::FinalResponse { content };
                        return;
                    }
                    NextAction::InvokeTools(tool_calls) => tool_calls,
                };

                for tool_call in tool_calls {
                    yield AgentEvent::ToolCall {
                        tool: tool_call.name.clone(),
                        args_json: tool_call.arguments.clone(),
                        tool_call_id: tool_call.id.clone(),
                        signature: tool_call.signature.clone(),
                    };

                    let result = self.execute_tool_call(&tool_call).await;
                    self.history.push(ModelMessage::ToolResult {
                        tool_call_id: tool_call.id.clone(),
                        tool_name: tool_call.name.clone(),
                        content: result.content.clone(),
                        failure: result.failure,
                    });

                    yield AgentEvent::ToolResult {
                        tool: tool_call.name,
                        result_text: result.content,
                        tool_call_id: tool_call.id,
                        failure: result.failure,
                    };
                }
            }

            warn!(max_iterations = self.config.max_iterations, "agent loop did not converge");
            Err::<(), AgentError>(AgentError::MaxIterationsReached {
                max_iterations: self.config.max_iterations,
            })?;
        }
    }

    fn system_messages(&self) -> Vec<ModelMessage> {
        self.config
            .system_prompt
            .iter()
            .map(|prompt| ModelMessage::System(prompt.clone()))
            .collect()
    }

    fn append_assistant_message(&mut self, completion: &ModelCompletion) {
        self.history.push(ModelMessage::Assistant {
            content: completion.text.clone(),
            tool_calls: completion.tool_calls.clone(),
        });
    }

    async fn execute_tool_call(&self, tool_call: &ModelToolCall) -> ToolResult {
        let Some(tool) = self.tool_map.get(&tool_call.name) else {
            warn!(tool = %tool_call.name, "model requested unknown tool");
            return ToolResult::failure(
                FailureKind::InvalidInput,
                format!("Unknown tool '{}'.", tool_call.name),
            );
        };

        let result = ToolResult::from(tool.execute(tool_call.arguments.clone()).await);
        match result.failure {
            None => info!(tool = %tool_call.name, "tool succeeded"),
            Some(kind) => warn!(tool = %tool_call.name, %kind, error = %result.content, "tool failed"),
        }
        result
    }
}

fn record_turn(
    turns: &mut Vec<ConversationTurn>,
    pending_calls: &mut HashMap<String, ToolInvocation>,
    event: &AgentEvent,
) {
    match event {
        AgentEvent::ToolCall {
            tool,
            args_json,
            tool_call_id,
            signature,
        } => {
            pending_calls.insert(
                tool_call_id.clone(),
                ToolInvocation {
                    id: tool_call_id.clone(),
                    name: tool.clone(),
                    arguments: args_json.clone(),
                    signature: signature.clone(),
                },
            );
        }
        AgentEvent::ToolResult {
            tool,
            result_text,
            tool_call_id,
            failure,
        } => {
            let invocation = pending_calls
                .remove(tool_call_id)
                .unwrap_or_else(|| ToolInvocation {
                    id: tool_call_id.clone(),
                    name: tool.clone(),
                    arguments: serde_json::Value::Null,
                    signature: None,
                });
            turns.push(ConversationTurn::tool(
                invocation,
                result_text.clone(),
                *failure,
            ));
        }
        AgentEvent::FinalResponse { content } => {
            turns.push(ConversationTurn::assistant(content.clone()));
        }
        AgentEvent::Thinking { .. } | AgentEvent::Text { .. } => {}
    }
}

pub async fn query(
    agent: &mut Agent,
    user_message: impl Into<String>,
) -> Result<String, AgentError> {
    agent.query(user_message).await
}

pub fn query_stream(
    agent: &mut Agent,
    user_message: impl Into<String>,
) -> impl Stream<Item = Result<AgentEvent, AgentError>> + '_ {
    agent.query_stream(user_message)
}

#[cfg(test)]
mod tests;

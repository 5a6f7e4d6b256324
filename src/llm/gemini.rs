use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::debug;

use crate::config::ModelSettings;
use crate::error::{FailureKind, ProviderError};
use crate::llm::{
    ChatModel, ModelCompletion, ModelMessage, ModelToolCall, ModelToolChoice, ModelToolDefinition,
    ModelUsage,
};

const DEFAULT_API_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Debug, Clone)]
pub struct GeminiModelConfig {
    pub api_key: String,
    pub model: String,
    pub api_base_url: Option<String>,
    pub temperature: Option<f32>,
    pub max_output_tokens: Option<u32>,
    pub timeout: Duration,
}

impl GeminiModelConfig {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            api_base_url: None,
            temperature: Some(0.0),
            max_output_tokens: Some(2048),
            timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GeminiModel {
    client: Client,
    config: GeminiModelConfig,
}

impl GeminiModel {
    pub fn new(config: GeminiModelConfig) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|err| ProviderError::Request(err.to_string()))?;

        Ok(Self { client, config })
    }

    pub fn from_settings(settings: &ModelSettings) -> Result<Self, ProviderError> {
        let api_key = settings.api_key.clone().ok_or_else(|| {
            ProviderError::Request("GOOGLE_API_KEY (or GEMINI_API_KEY) is not set".to_string())
        })?;

        let mut config = GeminiModelConfig::new(api_key, settings.model.clone());
        config.temperature = Some(settings.temperature);
        config.timeout = settings.timeout;
        Self::new(config)
    }

    fn endpoint(&self) -> String {
        let base = self
            .config
            .api_base_url
            .as_deref()
            .unwrap_or(DEFAULT_API_BASE_URL)
            .trim_end_matches('/');
        format!("{base}/models/{}:generateContent", self.config.model)
    }
}

#[async_trait]
impl ChatModel for GeminiModel {
    async fn invoke(
        &self,
        messages: &[ModelMessage],
        tools: &[ModelToolDefinition],
        tool_choice: ModelToolChoice,
    ) -> Result<ModelCompletion, ProviderError> {
        let request = build_request(messages, tools, tool_choice, &self.config);
        debug!(
            model = %self.config.model,
            contents = request.contents.len(),
            "invoking gemini"
        );

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|err| ProviderError::Request(err.to_string()))?;

        if !response.status().is_success() {
            return Err(ProviderError::Request(api_error_message(response).await));
        }

        let payload = response
            .json::<GenerateContentResponse>()
            .await
            .map_err(|err| ProviderError::Response(err.to_string()))?;

        parse_completion(payload)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<SystemInstruction>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ToolDeclarations>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_config: Option<ToolConfig>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
struct Content {
    role: String,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct SystemInstruction {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ToolDeclarations {
    function_declarations: Vec<FunctionDeclaration>,
}

#[derive(Debug, Serialize)]
struct FunctionDeclaration {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ToolConfig {
    function_calling_config: FunctionCallingConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FunctionCallingConfig {
    mode: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    thought: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    thought_signature: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    function_call: Option<FunctionCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    function_response: Option<FunctionResponse>,
}

impl Part {
    fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
struct FunctionCall {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    name: Option<String>,
    #[serde(default)]
    args: Option<Value>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
struct FunctionResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    name: String,
    response: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    prompt_token_count: Option<u32>,
    candidates_token_count: Option<u32>,
    thoughts_token_count: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    code: Option<u16>,
    status: Option<String>,
    message: Option<String>,
}

fn build_request(
    messages: &[ModelMessage],
    tools: &[ModelToolDefinition],
    tool_choice: ModelToolChoice,
    config: &GeminiModelConfig,
) -> GenerateContentRequest {
    let (contents, system) = to_contents(messages);

    let (tools, tool_config) = if tools.is_empty() {
        (Vec::new(), None)
    } else {
        let declarations = tools
            .iter()
            .map(|tool| FunctionDeclaration {
                name: tool.name.clone(),
                description: tool.description.clone(),
                parameters: strip_unsupported_keywords(tool.parameters.clone()),
            })
            .collect();

        let mode = match tool_choice {
            ModelToolChoice::Auto => "AUTO",
            ModelToolChoice::None => "NONE",
        };

        (
            vec![ToolDeclarations {
                function_declarations: declarations,
            }],
            Some(ToolConfig {
                function_calling_config: FunctionCallingConfig { mode },
            }),
        )
    };

    GenerateContentRequest {
        contents,
        system_instruction: system.map(|text| SystemInstruction {
            parts: vec![Part::text(text)],
        }),
        tools,
        tool_config,
        generation_config: GenerationConfig {
            temperature: config.temperature,
            max_output_tokens: config.max_output_tokens,
        },
    }
}

fn to_contents(messages: &[ModelMessage]) -> (Vec<Content>, Option<String>) {
    let mut system_lines = Vec::new();
    let mut contents: Vec<Content> = Vec::new();

    for message in messages {
        match message {
            ModelMessage::System(text) if !text.is_empty() => system_lines.push(text.clone()),
            ModelMessage::System(_) => {}
            ModelMessage::User(text) if !text.is_empty() => contents.push(Content {
                role: "user".to_string(),
                parts: vec![Part::text(text.clone())],
            }),
            ModelMessage::User(_) => {}
            ModelMessage::Assistant {
                content,
                tool_calls,
            } => {
                let mut parts = Vec::new();
                if let Some(text) = content.as_deref().filter(|text| !text.is_empty()) {
                    parts.push(Part::text(text));
                }
                parts.extend(tool_calls.iter().map(|call| Part {
                    thought_signature: call.signature.clone(),
                    function_call: Some(FunctionCall {
                        id: Some(call.id.clone()),
                        name: Some(call.name.clone()),
                        args: Some(call.arguments.clone()),
                    }),
                    ..Part::default()
                }));

                if !parts.is_empty() {
                    contents.push(Content {
                        role: "model".to_string(),
                        parts,
                    });
                }
            }
            ModelMessage::ToolResult {
                tool_call_id,
                tool_name,
                content,
                failure,
            } => {
                let part = Part {
                    function_response: Some(FunctionResponse {
                        id: Some(tool_call_id.clone()),
                        name: tool_name.clone(),
                        response: tool_response_payload(content, *failure),
                    }),
                    ..Part::default()
                };

                // Parallel calls answer in a single user turn.
                let answers_open_turn = contents.last().is_some_and(|last| {
                    last.role == "user"
                        && last.parts.iter().all(|p| p.function_response.is_some())
                });
                match contents.last_mut() {
                    Some(last) if answers_open_turn => last.parts.push(part),
                    _ => contents.push(Content {
                        role: "user".to_string(),
                        parts: vec![part],
                    }),
                }
            }
        }
    }

    let system = (!system_lines.is_empty()).then(|| system_lines.join("\n\n"));
    (contents, system)
}

fn tool_response_payload(content: &str, failure: Option<FailureKind>) -> Value {
    match failure {
        Some(kind) => json!({"error": content, "kind": kind}),
        None => json!({"result": content}),
    }
}

fn parse_completion(response: GenerateContentResponse) -> Result<ModelCompletion, ProviderError> {
    let Some(candidate) = response.candidates.into_iter().next() else {
        return Err(ProviderError::Response(
            "gemini response has no candidates".to_string(),
        ));
    };

    let mut text = Vec::new();
    let mut thinking = Vec::new();
    let mut tool_calls = Vec::new();

    let parts = candidate
        .content
        .map(|content| content.parts)
        .unwrap_or_default();

    if parts.is_empty()
        && let Some(reason) = candidate.finish_reason.filter(|r| r != "STOP")
    {
        return Err(ProviderError::Response(format!(
            "gemini returned no content (finishReason={reason})"
        )));
    }

    for (index, part) in parts.into_iter().enumerate() {
        if let Some(call) = part.function_call {
            let name = call.name.ok_or_else(|| {
                ProviderError::Response("gemini functionCall missing name".to_string())
            })?;
            tool_calls.push(ModelToolCall {
                id: call.id.unwrap_or_else(|| format!("call_{}", index + 1)),
                name,
                arguments: call.args.unwrap_or_else(|| json!({})),
                signature: part.thought_signature,
            });
        } else if let Some(chunk) = part.text {
            if part.thought == Some(true) {
                thinking.push(chunk);
            } else {
                text.push(chunk);
            }
        }
    }

    let usage = response.usage_metadata.map(|usage| ModelUsage {
        input_tokens: usage.prompt_token_count.unwrap_or(0),
        output_tokens: usage
            .candidates_token_count
            .unwrap_or(0)
            .saturating_add(usage.thoughts_token_count.unwrap_or(0)),
    });

    Ok(ModelCompletion {
        text: (!text.is_empty()).then(|| text.join("")),
        thinking: (!thinking.is_empty()).then(|| thinking.join("\n")),
        tool_calls,
        usage,
    })
}

async fn api_error_message(response: reqwest::Response) -> String {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();

    match serde_json::from_str::<ErrorEnvelope>(&body) {
        Ok(ErrorEnvelope { error }) => format!(
            "gemini api error {} {}: {}",
            error.code.unwrap_or(status.as_u16()),
            error.status.unwrap_or_else(|| status.to_string()),
            error
                .message
                .unwrap_or_else(|| "no message".to_string())
        ),
        Err(_) if body.is_empty() => format!("gemini api request failed ({status})"),
        Err(_) => format!("gemini api request failed ({status}): {body}"),
    }
}

/// Gemini rejects several JSON Schema keywords that are fine elsewhere.
fn strip_unsupported_keywords(schema: Value) -> Value {
    match schema {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(key, _)| {
                    !matches!(key.as_str(), "additionalProperties" | "default" | "$schema")
                })
                .map(|(key, value)| (key, strip_unsupported_keywords(value)))
                .collect::<Map<_, _>>(),
        ),
        Value::Array(values) => {
            Value::Array(values.into_iter().map(strip_unsupported_keywords).collect())
        }
        other => other,
    }
}

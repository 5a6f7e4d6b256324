mod email;
mod status;

use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::config::AppConfig;
use crate::error::{FailureKind, SchemaError, StatusError, ToolError};
use crate::mail::Mailer;
use crate::status::StatusClient;

pub use email::{SEND_USER_EMAIL, email_tool};
pub use status::{GET_USER_STATUS, status_tool};

/// Outcome of one tool invocation as seen by the agent loop and the model.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ToolResult {
    pub content: String,
    pub failure: Option<FailureKind>,
}

impl ToolResult {
    pub fn success(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            failure: None,
        }
    }

    pub fn failure(kind: FailureKind, content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            failure: Some(kind),
        }
    }

    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }
}

impl From<Result<String, ToolError>> for ToolResult {
    fn from(result: Result<String, ToolError>) -> Self {
        match result {
            Ok(content) => Self::success(content),
            Err(err) => Self::failure(err.kind(), err.to_string()),
        }
    }
}

type ToolHandler = dyn Fn(Value) -> BoxFuture<'static, Result<String, ToolError>> + Send + Sync;

#[derive(Clone)]
pub struct ToolSpec {
    name: String,
    description: String,
    json_schema: Value,
    handler: Arc<ToolHandler>,
}

impl std::fmt::Debug for ToolSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolSpec")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("json_schema", &self.json_schema)
            .finish()
    }
}

impl ToolSpec {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            json_schema: serde_json::json!({
                "type": "object",
                "properties": {},
                "required": [],
                "additionalProperties": true,
            }),
            handler: Arc::new(|_args| {
                Box::pin(async {
                    Err(ToolError::failed(
                        FailureKind::General,
                        "tool handler not configured",
                    ))
                })
            }),
        }
    }

    pub fn with_schema(mut self, schema: Value) -> Result<Self, SchemaError> {
        validate_schema(&schema)?;
        self.json_schema = schema;
        Ok(self)
    }

    pub fn with_handler<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<String, ToolError>> + Send + 'static,
    {
        self.handler = Arc::new(move |args| Box::pin(handler(args)));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn json_schema(&self) -> &Value {
        &self.json_schema
    }

    pub async fn execute(&self, args: Value) -> Result<String, ToolError> {
        validate_arguments(self.name(), &self.json_schema, &args)?;
        (self.handler)(args).await
    }
}

/// Both customer-service tools, wired from one configuration.
pub fn support_tools(config: &AppConfig) -> Result<Vec<ToolSpec>, ToolError> {
    let status_client = StatusClient::new(&config.status_api)
        .map_err(|err: StatusError| ToolError::failed(err.kind(), err.to_string()))?;
    let mailer = Mailer::new(config.smtp.clone());

    Ok(vec![
        status_tool(Arc::new(status_client))?,
        email_tool(Arc::new(mailer))?,
    ])
}

pub(crate) fn parse_arguments<T>(tool: &str, args: Value) -> Result<T, ToolError>
where
    T: DeserializeOwned,
{
    serde_json::from_value(args).map_err(|err| ToolError::InvalidArguments {
        tool: tool.to_string(),
        message: err.to_string(),
    })
}

fn validate_schema(schema: &Value) -> Result<(), SchemaError> {
    let schema_obj = schema.as_object().ok_or(SchemaError::SchemaNotObject)?;

    match schema_obj.get("type").and_then(Value::as_str) {
        Some("object") => {}
        _ => return Err(SchemaError::RootTypeMustBeObject),
    }

    if let Some(required) = schema_obj.get("required") {
        let all_strings = required
            .as_array()
            .is_some_and(|items| items.iter().all(Value::is_string));
        if !all_strings {
            return Err(SchemaError::InvalidRequired);
        }
    }

    Ok(())
}

fn validate_arguments(tool_name: &str, schema: &Value, args: &Value) -> Result<(), ToolError> {
    let invalid = |message: String| ToolError::InvalidArguments {
        tool: tool_name.to_string(),
        message,
    };

    let args_obj = args
        .as_object()
        .ok_or_else(|| invalid("arguments must be a JSON object".to_string()))?;

    let required = schema
        .get("required")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();
    for field_name in required.iter().filter_map(Value::as_str) {
        if !args_obj.contains_key(field_name) {
            return Err(invalid(format!("missing required field: {field_name}")));
        }
    }

    let properties = schema.get("properties").and_then(Value::as_object);
    let closed = schema.get("additionalProperties").and_then(Value::as_bool) == Some(false);

    for (key, value) in args_obj {
        let field_schema = properties.and_then(|properties| properties.get(key));
        if field_schema.is_none() && closed {
            return Err(invalid(format!("unknown field: {key}")));
        }

        let type_name = field_schema
            .and_then(|field| field.get("type"))
            .and_then(Value::as_str);
        if let Some(type_name) = type_name
            && !value_matches_type(value, type_name)
        {
            return Err(invalid(format!("field '{key}' must be of type {type_name}")));
        }
    }

    Ok(())
}

fn value_matches_type(value: &Value, type_name: &str) -> bool {
    match type_name {
        "string" => value.is_string(),
        "integer" => value.is_i64() || value.is_u64(),
        "number" => value.is_number(),
        "boolean" => value.is_boolean(),
        "object" => value.is_object(),
        "array" => value.is_array(),
        "null" => value.is_null(),
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn echo_tool() -> ToolSpec {
        ToolSpec::new("echo", "repeat a word")
            .with_schema(json!({
                "type": "object",
                "properties": {"word": {"type": "string"}},
                "required": ["word"],
                "additionalProperties": false
            }))
            .expect("schema valid")
            .with_handler(|args| async move {
                let word = args
                    .get("word")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                Ok(word)
            })
    }

    #[test]
    fn schema_validation_rejects_non_object_root() {
        let result = ToolSpec::new("bad", "bad").with_schema(json!({"type": "string"}));
        assert!(matches!(result, Err(SchemaError::RootTypeMustBeObject)));

        let result = ToolSpec::new("bad", "bad")
            .with_schema(json!({"type": "object", "required": [1]}));
        assert!(matches!(result, Err(SchemaError::InvalidRequired)));
    }

    #[tokio::test]
    async fn argument_validation_reports_missing_required() {
        let err = echo_tool()
            .execute(json!({}))
            .await
            .expect_err("should fail");

        assert!(err.to_string().contains("missing required field"));
        assert_eq!(err.kind(), FailureKind::InvalidInput);
    }

    #[tokio::test]
    async fn argument_validation_rejects_unknown_and_mistyped_fields() {
        let err = echo_tool()
            .execute(json!({"word": "hi", "extra": true}))
            .await
            .expect_err("closed schema");
        assert!(err.to_string().contains("unknown field: extra"));

        let err = echo_tool()
            .execute(json!({"word": 5}))
            .await
            .expect_err("wrong type");
        assert!(err.to_string().contains("must be of type string"));
    }

    #[tokio::test]
    async fn unconfigured_handler_fails() {
        let err = ToolSpec::new("noop", "nothing")
            .execute(json!({}))
            .await
            .expect_err("no handler");
        assert_eq!(err.kind(), FailureKind::General);
    }

    #[test]
    fn tool_result_keeps_failure_kind() {
        let result = ToolResult::from(Err::<String, _>(ToolError::failed(
            FailureKind::Timeout,
            "took too long",
        )));
        assert_eq!(result.failure, Some(FailureKind::Timeout));
        assert_eq!(result.content, "took too long");
        assert!(!result.is_success());

        assert!(ToolResult::from(Ok::<_, ToolError>("fine".to_string())).is_success());
    }
}

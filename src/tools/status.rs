use std::sync::Arc;

use serde::Deserialize;
use serde_json::json;
use tracing::info;

use super::{ToolSpec, parse_arguments};
use crate::error::{SchemaError, ToolError};
use crate::status::StatusClient;

pub const GET_USER_STATUS: &str = "get_user_status";

#[derive(Debug, Deserialize)]
struct StatusArgs {
    user_id: i64,
}

pub fn status_tool(client: Arc<StatusClient>) -> Result<ToolSpec, SchemaError> {
    Ok(ToolSpec::new(
        GET_USER_STATUS,
        "Retrieves the current application status for a given user ID. \
         Use this when the user asks for the status of an account. \
         The input must be the user_id as an integer (e.g., 101).",
    )
    .with_schema(json!({
        "type": "object",
        "properties": {
            "user_id": {
                "type": "integer",
                "description": "Numeric account identifier, e.g. 101"
            }
        },
        "required": ["user_id"],
        "additionalProperties": false
    }))?
    .with_handler(move |args| {
        let client = client.clone();
        async move {
            let StatusArgs { user_id } = parse_arguments(GET_USER_STATUS, args)?;
            info!(user_id, "tool call: {GET_USER_STATUS}");

            let status = client
                .fetch(user_id)
                .await
                .map_err(|err| ToolError::failed(err.kind(), err.to_string()))?;

            Ok(format!("User {} Status: {}", status.user_id, status.app_status))
        }
    }))
}

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use serde_json::{Value, json};

use super::*;
use crate::config::StatusApiConfig;
use crate::error::{ProviderError, ToolError};
use crate::status::{StatusClient, StatusDirectory, spawn_local};
use crate::tools::{GET_USER_STATUS, status_tool};

#[derive(Default)]
struct MockModel {
    responses: Mutex<VecDeque<Result<ModelCompletion, ProviderError>>>,
    seen: Mutex<Vec<Vec<ModelMessage>>>,
}

impl MockModel {
    fn with_responses(responses: Vec<Result<ModelCompletion, ProviderError>>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(VecDeque::from(responses)),
            seen: Mutex::new(Vec::new()),
        })
    }

    fn seen(&self) -> Vec<Vec<ModelMessage>> {
        self.seen.lock().expect("lock poisoned").clone()
    }
}

#[async_trait]
impl ChatModel for MockModel {
    async fn invoke(
        &self,
        messages: &[ModelMessage],
        _tools: &[ModelToolDefinition],
        _tool_choice: ModelToolChoice,
    ) -> Result<ModelCompletion, ProviderError> {
        self.seen
            .lock()
            .expect("lock poisoned")
            .push(messages.to_vec());
        let mut guard = self.responses.lock().expect("lock poisoned");
        guard.pop_front().unwrap_or_else(|| {
            Err(ProviderError::Response(
                "no more mock model responses".to_string(),
            ))
        })
    }
}

fn agent_with(model: &Arc<MockModel>, tools: Vec<ToolSpec>) -> Agent {
    Agent::builder()
        .shared_model(model.clone())
        .tools(tools)
        .system_prompt("You are a helpful customer service agent.")
        .build()
        .expect("agent builds")
}

fn lookup_tool() -> ToolSpec {
    ToolSpec::new(GET_USER_STATUS, "canned status")
        .with_schema(json!({
            "type": "object",
            "properties": {"user_id": {"type": "integer"}},
            "required": ["user_id"],
            "additionalProperties": false
        }))
        .expect("valid schema")
        .with_handler(|args| async move {
            let user_id = args
                .get("user_id")
                .and_then(Value::as_i64)
                .ok_or_else(|| ToolError::failed(FailureKind::InvalidInput, "user_id missing"))?;
            Ok(format!("User {user_id} Status: Active"))
        })
}

fn fail_tool() -> ToolSpec {
    ToolSpec::new("send_user_email", "always unconfigured")
        .with_schema(json!({
            "type": "object",
            "properties": {},
            "required": [],
            "additionalProperties": false
        }))
        .expect("valid schema")
        .with_handler(|_args| async move {
            Err(ToolError::failed(
                FailureKind::Configuration,
                "SMTP credentials are not configured",
            ))
        })
}

fn tool_call(id: &str, name: &str, arguments: Value) -> ModelToolCall {
    ModelToolCall::new(id, name, arguments)
}

async fn collect_events(agent: &mut Agent, message: &str) -> Vec<AgentEvent> {
    agent
        .query_stream(message)
        .collect::<Vec<_>>()
        .await
        .into_iter()
        .collect::<Result<Vec<_>, _>>()
        .expect("events ok")
}

#[tokio::test]
async fn query_returns_no_tool_response() {
    let model = MockModel::with_responses(vec![Ok(ModelCompletion::text("hello"))]);
    let mut agent = agent_with(&model, vec![]);

    let response = agent.query("hi").await.expect("query succeeds");

    assert_eq!(response, "hello");
    assert_eq!(
        model.seen()[0],
        vec![
            ModelMessage::System("You are a helpful customer service agent.".to_string()),
            ModelMessage::User("hi".to_string()),
        ]
    );
}

#[tokio::test]
async fn tool_call_then_final_response_flow() {
    let model = MockModel::with_responses(vec![
        Ok(ModelCompletion::tool_calls(vec![tool_call(
            "call_1",
            GET_USER_STATUS,
            json!({"user_id": 101}),
        )])),
        Ok(ModelCompletion::text("Account 101 is Active.")),
    ]);
    let mut agent = agent_with(&model, vec![lookup_tool()]);

    let events = collect_events(&mut agent, "status of 101?").await;

    assert_eq!(events.len(), 4);
    assert!(matches!(events[0], AgentEvent::ToolCall { .. }));
    assert_eq!(
        events[1],
        AgentEvent::ToolResult {
            tool: GET_USER_STATUS.to_string(),
            result_text: "User 101 Status: Active".to_string(),
            tool_call_id: "call_1".to_string(),
            failure: None,
        }
    );
    assert_eq!(
        events[3],
        AgentEvent::FinalResponse {
            content: "Account 101 is Active.".to_string()
        }
    );

    let second_call = &model.seen()[1];
    assert_eq!(
        second_call.last(),
        Some(&ModelMessage::ToolResult {
            tool_call_id: "call_1".to_string(),
            tool_name: GET_USER_STATUS.to_string(),
            content: "User 101 Status: Active".to_string(),
            failure: None,
        })
    );
}

#[tokio::test]
async fn tool_failure_is_fed_back_and_loop_finishes() {
    let model = MockModel::with_responses(vec![
        Ok(ModelCompletion::tool_calls(vec![tool_call(
            "call_4",
            "send_user_email",
            json!({}),
        )])),
        Ok(ModelCompletion::text("I could not send the email.")),
    ]);
    let mut agent = agent_with(&model, vec![fail_tool()]);

    let events = collect_events(&mut agent, "email bill").await;

    assert!(events.iter().any(|event| matches!(
        event,
        AgentEvent::ToolResult {
            failure: Some(FailureKind::Configuration),
            ..
        }
    )));
    assert_eq!(
        events.last(),
        Some(&AgentEvent::FinalResponse {
            content: "I could not send the email.".to_string()
        })
    );

    let fed_back = model.seen()[1].last().cloned();
    assert!(matches!(
        fed_back,
        Some(ModelMessage::ToolResult {
            failure: Some(FailureKind::Configuration),
            ..
        })
    ));
}

#[tokio::test]
async fn unknown_tool_is_reported_to_the_model() {
    let model = MockModel::with_responses(vec![
        Ok(ModelCompletion::tool_calls(vec![tool_call(
            "call_9",
            "delete_account",
            json!({"user_id": 101}),
        )])),
        Ok(ModelCompletion::text("I can't do that.")),
    ]);
    let mut agent = agent_with(&model, vec![lookup_tool()]);

    let events = collect_events(&mut agent, "delete 101").await;

    assert!(events.iter().any(|event| matches!(
        event,
        AgentEvent::ToolResult {
            result_text,
            failure: Some(FailureKind::InvalidInput),
            ..
        } if result_text.contains("Unknown tool 'delete_account'")
    )));
}

#[tokio::test]
async fn invalid_arguments_are_reported_to_the_model() {
    let model = MockModel::with_responses(vec![
        Ok(ModelCompletion::tool_calls(vec![tool_call(
            "call_2",
            GET_USER_STATUS,
            json!({"user_id": "one-oh-one"}),
        )])),
        Ok(ModelCompletion::text("Which account?")),
    ]);
    let mut agent = agent_with(&model, vec![lookup_tool()]);

    let response = agent.query("status please").await.expect("finishes");

    assert_eq!(response, "Which account?");
    let fed_back = model.seen()[1].last().cloned();
    assert!(matches!(
        fed_back,
        Some(ModelMessage::ToolResult {
            failure: Some(FailureKind::InvalidInput),
            ..
        })
    ));
}

#[tokio::test]
async fn max_iterations_error_when_tool_loop_never_finishes() {
    let model = MockModel::with_responses(vec![Ok(ModelCompletion::tool_calls(vec![
        tool_call("call_3", GET_USER_STATUS, json!({"user_id": 101})),
    ]))]);
    let mut agent = Agent::builder()
        .shared_model(model.clone())
        .tool(lookup_tool())
        .max_iterations(1)
        .build()
        .expect("agent builds");

    let err = agent.query("loop").await.expect_err("must fail");
    assert!(matches!(err, AgentError::MaxIterationsReached { .. }));
    assert!(err.is_unanswered());
}

#[tokio::test]
async fn provider_errors_propagate() {
    let model = MockModel::with_responses(vec![Err(ProviderError::Request(
        "503 unavailable".to_string(),
    ))]);
    let mut agent = agent_with(&model, vec![]);

    let err = agent.query("hi").await.expect_err("provider down");
    assert!(matches!(err, AgentError::Provider(_)));
    assert!(!err.is_unanswered());
}

#[tokio::test]
async fn history_is_kept_between_queries_until_cleared() {
    let model = MockModel::with_responses(vec![
        Ok(ModelCompletion::text("first")),
        Ok(ModelCompletion::text("second")),
    ]);
    let mut agent = agent_with(&model, vec![]);

    agent.query("one").await.expect("first query");
    assert_eq!(agent.messages_len(), 3);

    agent.query("two").await.expect("second query");
    assert_eq!(agent.messages_len(), 5);
    assert_eq!(model.seen()[1].len(), 4);

    agent.clear_history();
    assert_eq!(agent.messages_len(), 0);
}

#[test]
fn builder_rejects_missing_model_and_duplicate_tools() {
    let err = Agent::builder().build().err().expect("model required");
    assert!(matches!(err, AgentError::Config(_)));

    let err = Agent::builder()
        .model(MockModel::default())
        .tool(lookup_tool())
        .tool(lookup_tool())
        .build()
        .err()
        .expect("duplicate tool");
    assert!(err.to_string().contains("duplicate tool registered"));
}

#[tokio::test]
async fn respond_appends_tool_and_assistant_turns() {
    let model = MockModel::with_responses(vec![
        Ok(ModelCompletion::tool_calls(vec![tool_call(
            "call_1",
            GET_USER_STATUS,
            json!({"user_id": 102}),
        )])),
        Ok(ModelCompletion::text("Account 102 is Active.")),
    ]);
    let mut agent = agent_with(&model, vec![lookup_tool()]);

    let turns = agent
        .respond(vec![ConversationTurn::user("status of 102?")])
        .await
        .expect("exchange succeeds");

    assert_eq!(turns.len(), 3);
    assert_eq!(turns[0], ConversationTurn::user("status of 102?"));
    assert_eq!(turns[1].role, Role::Tool);
    assert_eq!(turns[1].content, "User 102 Status: Active");
    assert_eq!(
        turns[1].tool_call,
        Some(ToolInvocation {
            id: "call_1".to_string(),
            name: GET_USER_STATUS.to_string(),
            arguments: json!({"user_id": 102}),
            signature: None,
        })
    );
    assert_eq!(turns[2], ConversationTurn::assistant("Account 102 is Active."));
}

#[tokio::test]
async fn respond_replays_earlier_turns() {
    let model = MockModel::with_responses(vec![Ok(ModelCompletion::text("You're welcome."))]);
    let mut agent = agent_with(&model, vec![lookup_tool()]);

    let earlier = vec![
        ConversationTurn::user("status of 101?"),
        ConversationTurn::tool(
            ToolInvocation {
                id: "call_1".to_string(),
                name: GET_USER_STATUS.to_string(),
                arguments: json!({"user_id": 101}),
                signature: None,
            },
            "User 101 Status: Active",
            None,
        ),
        ConversationTurn::assistant("Account 101 is Active."),
        ConversationTurn::user("thanks"),
    ];

    let turns = agent.respond(earlier).await.expect("exchange succeeds");
    assert_eq!(turns.len(), 5);

    let seen = &model.seen()[0];
    assert_eq!(seen.len(), 6);
    assert!(matches!(seen[0], ModelMessage::System(_)));
    assert!(matches!(
        &seen[2],
        ModelMessage::Assistant { tool_calls, .. } if tool_calls.len() == 1
    ));
    assert!(matches!(seen[3], ModelMessage::ToolResult { .. }));
    assert_eq!(seen[5], ModelMessage::User("thanks".to_string()));
}

#[tokio::test]
async fn respond_requires_a_trailing_user_turn() {
    let model = MockModel::with_responses(vec![]);
    let mut agent = agent_with(&model, vec![]);

    let err = agent
        .respond(vec![ConversationTurn::assistant("hello")])
        .await
        .expect_err("no user turn");
    assert!(matches!(err.source, AgentError::MissingUserTurn));
    assert_eq!(err.turns, vec![ConversationTurn::assistant("hello")]);

    let err = agent.respond(Vec::new()).await.expect_err("empty");
    assert!(matches!(err.source, AgentError::MissingUserTurn));
    assert!(model.seen().is_empty());
}

#[tokio::test]
async fn respond_keeps_completed_tool_turns_when_the_loop_gives_up() {
    let model = MockModel::with_responses(vec![Ok(ModelCompletion::tool_calls(vec![
        tool_call("call_3", GET_USER_STATUS, json!({"user_id": 101})),
    ]))]);
    let mut agent = Agent::builder()
        .shared_model(model.clone())
        .tool(lookup_tool())
        .max_iterations(1)
        .build()
        .expect("agent builds");

    let err = agent
        .respond(vec![ConversationTurn::user("loop")])
        .await
        .expect_err("must fail");

    assert!(matches!(
        err.source,
        AgentError::MaxIterationsReached { max_iterations: 1 }
    ));
    assert_eq!(err.turns.len(), 2);
    assert_eq!(err.turns[1].role, Role::Tool);
    assert_eq!(err.turns[1].content, "User 101 Status: Active");
    assert_eq!(
        err.turns[1].tool_call.as_ref().map(|call| call.id.as_str()),
        Some("call_3")
    );
}

#[tokio::test]
async fn respond_keeps_tool_turns_when_the_provider_fails_afterwards() {
    let model = MockModel::with_responses(vec![
        Ok(ModelCompletion::tool_calls(vec![tool_call(
            "call_7",
            "send_user_email",
            json!({}),
        )])),
        Err(ProviderError::Request("503 unavailable".to_string())),
    ]);
    let mut agent = agent_with(&model, vec![fail_tool()]);

    let err = agent
        .respond(vec![ConversationTurn::user("email bill")])
        .await
        .expect_err("provider down");

    assert!(matches!(err.source, AgentError::Provider(_)));
    assert_eq!(err.turns.len(), 2);
    assert_eq!(err.turns[1].failure, Some(FailureKind::Configuration));
}

#[tokio::test]
async fn respond_stream_records_each_turn_as_it_completes() {
    let mut call = tool_call("call_1", GET_USER_STATUS, json!({"user_id": 104}));
    call.signature = Some("sig-1".to_string());
    let model = MockModel::with_responses(vec![
        Ok(ModelCompletion::tool_calls(vec![call])),
        Ok(ModelCompletion::text("Account 104 is Active.")),
    ]);
    let mut agent = agent_with(&model, vec![lookup_tool()]);
    let mut turns = vec![ConversationTurn::user("status of 104?")];

    let mut recorded = Vec::new();
    {
        let stream = agent.respond_stream(&mut turns);
        futures_util::pin_mut!(stream);
        while let Some(event) = stream.next().await {
            recorded.push(event.expect("event ok"));
        }
    }

    assert!(matches!(
        &recorded[0],
        AgentEvent::ToolCall { signature: Some(signature), .. } if signature == "sig-1"
    ));
    assert_eq!(turns.len(), 3);
    assert_eq!(
        turns[1].tool_call.as_ref().and_then(|call| call.signature.as_deref()),
        Some("sig-1")
    );
    assert_eq!(turns[2], ConversationTurn::assistant("Account 104 is Active."));
}

#[tokio::test]
async fn status_question_runs_against_mock_service() {
    let addr = spawn_local(StatusDirectory::seeded()).await;
    let client = StatusClient::new(&StatusApiConfig {
        base_url: format!("http://{addr}"),
        timeout: Duration::from_secs(5),
    })
    .expect("client builds");

    let model = MockModel::with_responses(vec![
        Ok(ModelCompletion::tool_calls(vec![tool_call(
            "call_1",
            GET_USER_STATUS,
            json!({"user_id": 101}),
        )])),
        Ok(ModelCompletion::text("The account with ID 101 is Active.")),
    ]);
    let mut agent = agent_with(
        &model,
        vec![status_tool(Arc::new(client)).expect("schema valid")],
    );

    let turns = agent
        .respond(vec![ConversationTurn::user(
            "What is the application status for the account with ID 101?",
        )])
        .await
        .expect("exchange succeeds");

    assert_eq!(turns[1].content, "User 101 Status: Active");
    assert_eq!(turns[1].failure, None);
    assert_eq!(
        turns.last().map(|turn| turn.content.as_str()),
        Some("The account with ID 101 is Active.")
    );
}

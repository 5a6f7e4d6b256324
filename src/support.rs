use crate::agent::Agent;
use crate::config::AppConfig;
use crate::error::AgentError;
use crate::llm::GeminiModel;
use crate::tools::support_tools;

pub const NO_ACTIONABLE_ANSWER: &str = "Sorry, I could not work out an answer to that.";

/// Gemini bound to both support tools under the configured system prompt.
pub fn support_agent(config: &AppConfig) -> Result<Agent, AgentError> {
    let model = GeminiModel::from_settings(&config.model)?;
    let tools = support_tools(config)?;

    Agent::builder()
        .model(model)
        .tools(tools)
        .system_prompt(config.system_prompt.clone())
        .build()
}

/// User-facing text for the outcome of one exchange.
pub fn render_answer(result: &Result<String, AgentError>) -> String {
    match result {
        Ok(answer) if !answer.trim().is_empty() => answer.clone(),
        Ok(_) => NO_ACTIONABLE_ANSWER.to_string(),
        Err(err) if err.is_unanswered() => NO_ACTIONABLE_ANSWER.to_string(),
        Err(err) => format!("Agent error: {err}"),
    }
}

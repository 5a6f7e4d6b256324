use std::error::Error;

use futures_util::{StreamExt, pin_mut};
use support_agent_rs::support::{render_answer, support_agent};
use support_agent_rs::{AgentEvent, AppConfig, ConversationTurn, Role, telemetry};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

const BANNER: &str = "Multi-tool support agent. Ask about an account status (e.g. ID 101) \
or ask it to send an email. /reset clears the conversation, /quit exits.";

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenvy::dotenv().ok();
    telemetry::init();

    let config = AppConfig::from_env()?;
    let mut agent = support_agent(&config)?;
    if config.smtp.login.is_none() || config.smtp.password.is_none() {
        eprintln!("note: MAILTRAP_LOGIN/MAILTRAP_PASSWORD are not set; emails will fail");
    }

    println!("{BANNER}");

    let mut history: Vec<ConversationTurn> = Vec::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        stdout.write_all(b"\nyou> ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let prompt = line.trim();

        match prompt {
            "" => continue,
            "/quit" | "/exit" => break,
            "/reset" => {
                history.clear();
                println!("(conversation cleared)");
                continue;
            }
            _ => {}
        }

        let mut turns = history.clone();
        turns.push(ConversationTurn::user(prompt));

        let outcome = {
            let stream = agent.respond_stream(&mut turns);
            pin_mut!(stream);

            let mut outcome = Ok(());
            while let Some(event) = stream.next().await {
                match event {
                    Ok(AgentEvent::ToolCall {
                        tool, args_json, ..
                    }) => println!("  [agent action] {tool} {args_json}"),
                    Ok(AgentEvent::ToolResult {
                        result_text,
                        failure: Some(kind),
                        ..
                    }) => println!("  [tool failed: {kind}] {result_text}"),
                    Ok(AgentEvent::ToolResult { result_text, .. }) => {
                        println!("  [tool result] {result_text}")
                    }
                    Ok(_) => {}
                    Err(err) => {
                        outcome = Err(err);
                        break;
                    }
                }
            }
            outcome
        };

        let answer = outcome.map(|()| {
            turns
                .last()
                .filter(|turn| turn.role == Role::Assistant)
                .map(|turn| turn.content.clone())
                .unwrap_or_default()
        });
        println!("agent> {}", render_answer(&answer));

        // Tool turns from a failed exchange are kept: email sends are not idempotent.
        history = turns;
    }

    Ok(())
}

use std::error::Error;

use support_agent_rs::support::{render_answer, support_agent};
use support_agent_rs::{AppConfig, ConversationTurn, telemetry};

const CASES: [(&str, &str); 2] = [
    (
        "Tool Selection (Status Check)",
        "What is the application status for the account with ID 101?",
    ),
    (
        "Tool Selection (Email Send)",
        "Please send a quick email to bill@example.com with the subject 'Status Update' \
         and body 'Your request has been processed.'",
    ),
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenvy::dotenv().ok();
    telemetry::init();

    let config = AppConfig::from_env()?;
    let mut agent = support_agent(&config)?;

    for (index, (title, question)) in CASES.iter().enumerate() {
        let case = index + 1;
        println!("\n--- Test Case {case}: {title} ---");

        let result = agent
            .respond(vec![ConversationTurn::user(*question)])
            .await
            .map(|turns| {
                turns
                    .last()
                    .map(|turn| turn.content.clone())
                    .unwrap_or_default()
            })
            .map_err(|err| err.source);

        println!("Q{case}: {question}");
        println!("A{case}: {}", render_answer(&result));
    }

    Ok(())
}

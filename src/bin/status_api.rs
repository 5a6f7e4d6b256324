use std::error::Error;
use std::sync::Arc;

use support_agent_rs::status::{self, StatusDirectory};
use support_agent_rs::{AppConfig, telemetry};
use tokio::net::TcpListener;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenvy::dotenv().ok();
    telemetry::init();

    let config = AppConfig::from_env()?;
    let listener = TcpListener::bind(config.status_bind).await?;
    println!(
        "User status mock API on http://{}/users/{{user_id}}/status",
        listener.local_addr()?
    );

    status::serve(listener, Arc::new(StatusDirectory::seeded()), shutdown_signal()).await?;
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutting down status service");
    }
}

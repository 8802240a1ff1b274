use grassbot::agent::{Agent, AgentError};
use grassbot::config::Config;
use tracing_subscriber::EnvFilter;

#[snafu::report]
#[tokio::main]
async fn main() -> Result<(), AgentError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = Config::load()?;
    Agent::new(config).run().await
}

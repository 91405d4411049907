use anyhow::Context;
use tokio::io::BufReader;

use college_intake::config::{IntakeConfig, SessionConfig};
use college_intake::driver::{SessionEnd, run_session};
use college_intake::intake::IntakeAgent;
use college_intake::llm::{LlmConfig, create_provider};
use college_intake::store::JsonFileProfileStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env is fine; real environment variables still apply.
    let _ = dotenvy::dotenv();

    // Logs go to stderr so stdout stays the conversation.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let llm_config = LlmConfig::from_env().context("loading LLM configuration")?;
    let intake_config = IntakeConfig::from_env().context("loading intake configuration")?;
    let session = SessionConfig::from_env();

    let llm = create_provider(&llm_config).context("creating LLM provider")?;
    let agent = IntakeAgent::new(llm, intake_config);

    let store = JsonFileProfileStore::open(&session.profiles_path)
        .await
        .with_context(|| format!("opening profile store at {}", session.profiles_path.display()))?;

    let input = BufReader::new(tokio::io::stdin());
    let mut output = tokio::io::stdout();
    let end = run_session(&agent, &store, &session.client_id, input, &mut output)
        .await
        .context("intake session failed")?;

    tracing::info!(?end, path = %store.path().display(), "Session over");
    if end == SessionEnd::Cancelled {
        eprintln!("Intake cancelled. Progress is saved; run again to resume.");
    }
    Ok(())
}

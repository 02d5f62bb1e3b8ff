//! Example: the hosted JSON-mode flag.
//!
//! Sends the same instruction with JSON mode off and on, then runs it through
//! the validating client. Requires `OPENAI_API_KEY` (optionally
//! `OPENAI_BASE_URL` / `OPENAI_MODEL`).

use structured_json_output::prelude::*;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let base = ChatBackendConfig::from_env()?
        .with_system_prompt("You are a helpful assistant designed to output JSON.")
        .with_temperature(0.0);

    let plain = ChatBackend::new(base.clone().with_json_mode(false))?;
    let json_mode = ChatBackend::new(base.clone().with_json_mode(true))?;

    let prompt = "Who won the world series in 2020? Answer in JSON.";
    println!("--- JSON mode off ---\n{}", plain.generate_text(prompt).await?);
    println!("--- JSON mode on ---\n{}", json_mode.generate_text(prompt).await?);

    let schema = Schema::builder()
        .title("WorldSeriesWinner")
        .field("team", FieldType::String, "name of the winning team")
        .field("year", FieldType::Integer, "season year")
        .optional_field("venue", FieldType::String, "where the final game was played")
        .build()?;

    let client = StructuredClientBuilder::new()
        .with_chat_backend(base)
        .with_max_attempts(3)
        .build()?;
    let result = client
        .generate("Who won the world series in 2020?", &schema)
        .await?;

    match &result {
        GenerationResult::Success { value, attempts } => {
            println!("Validated after {attempts} attempt(s): {value:#}");
        }
        GenerationResult::Failure { attempts, .. } => {
            println!("Gave up after {attempts} attempts:");
            for violation in result.violations() {
                println!("  - {violation}");
            }
        }
    }

    Ok(())
}

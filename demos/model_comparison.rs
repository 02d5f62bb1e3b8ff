//! Example: comparing model variants on the same structured request.
//!
//! Requires `OPENAI_API_KEY`. Model names can be overridden with
//! `COMPARE_MODELS=model-a,model-b`.

use std::env;

use structured_json_output::prelude::*;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Deserialize, JsonSchema)]
#[allow(dead_code)]
struct Joke {
    /// question to set up a joke
    setup: String,
    /// answer to resolve the joke
    punchline: String,
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let models = env::var("COMPARE_MODELS")
        .unwrap_or_else(|_| "gpt-3.5-turbo-1106,gpt-4-1106-preview".to_string());
    let base = ChatBackendConfig::from_env()?.with_json_mode(true);

    let mut comparison = ModelComparison::new().with_max_attempts(2);
    for model in models.split(',').map(str::trim).filter(|m| !m.is_empty()) {
        let backend = ChatBackend::new(base.clone().with_model(model))?;
        comparison = comparison.with_backend(model, backend);
    }

    let schema = Schema::for_type::<Joke>()?;
    let report = comparison
        .run("Tell me a joke about crabs.", &schema)
        .await?;

    print!("{}", report.summary());
    if let Some(best) = report.fastest_success() {
        println!("Fastest valid answer from {}:", best.label);
        let joke: Joke = best.result.clone().into_typed()?;
        println!("{joke:#?}");
    }

    Ok(())
}

//! Example: corrective retries, offline.
//!
//! A scripted backend first drops a field, then returns the wrong type, then
//! gets it right. Run with `RUST_LOG=structured_json_output=debug` to watch
//! each attempt.

use structured_json_output::prelude::*;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Deserialize, JsonSchema)]
#[allow(dead_code)]
struct Actor {
    /// name of an actor
    name: String,
    /// list of names of films they starred in
    film_names: Vec<String>,
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let backend = MockGenerator::scripted([
        r#"{"name": "Tom Hanks"}"#,
        r#"{"name": "Tom Hanks", "film_names": "Forrest Gump"}"#,
        r#"{"name": "Tom Hanks", "film_names": ["Forrest Gump", "Cast Away", "Big"]}"#,
    ]);

    let client = StructuredClientBuilder::new()
        .with_backend(backend.clone())
        .with_max_attempts(3)
        .build()?;

    let result = client
        .generate_typed::<Actor>("Generate the filmography for a random actor.")
        .await?;
    println!("attempts: {}", result.attempts());

    for (idx, prompt) in backend.prompts().await.iter().enumerate().skip(1) {
        println!("--- corrective prompt #{idx} ---\n{prompt}\n");
    }

    let actor: Actor = result.into_typed()?;
    println!("{actor:#?}");
    Ok(())
}

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, info, instrument, trace, warn};
use uuid::Uuid;

use crate::{
    client::ClientConfig,
    error::{Result, StructuredError},
    generator::TextGenerator,
    models::{AttemptOutcome, GenerationAttempt, GenerationResult},
    prompt,
    schema::Schema,
    validation::{self, summarize, Violation},
};

/// Extra check run on schema-valid values, e.g. deserialization into a Rust type.
pub type OutputCheck<'a> = &'a (dyn Fn(&Value) -> Vec<Violation> + Send + Sync);

/// A single instruction paired with the schema its answer must satisfy.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    id: Uuid,
    instruction: String,
    schema: Arc<Schema>,
}

impl GenerationRequest {
    /// Fails when the instruction is empty or whitespace.
    pub fn new(instruction: impl Into<String>, schema: impl Into<Arc<Schema>>) -> Result<Self> {
        let instruction = instruction.into();
        if instruction.trim().is_empty() {
            return Err(StructuredError::InvalidRequest(
                "instruction must not be empty".to_string(),
            ));
        }
        Ok(Self {
            id: Uuid::new_v4(),
            instruction,
            schema: schema.into(),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn instruction(&self) -> &str {
        &self.instruction
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }
}

/// Generate a JSON object matching `schema`, retrying with corrective feedback.
///
/// Makes at most `max_attempts` backend calls (values below 1 are treated as
/// 1). Malformed output, schema violations and transport failures all end up
/// in the returned [`GenerationResult`]; the only `Err` is an empty
/// instruction.
///
/// ```rust
/// use structured_json_output::{generate, FieldType, MockGenerator, Schema};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> structured_json_output::Result<()> {
/// let schema = Schema::builder()
///     .field("setup", FieldType::String, "question to set up a joke")
///     .field("punchline", FieldType::String, "answer to resolve the joke")
///     .build()?;
/// let backend = MockGenerator::scripted([
///     r#"{"setup": "Why did the crab never share?"}"#,
///     r#"{"setup": "Why did the crab never share?", "punchline": "Because he's shellfish."}"#,
/// ]);
///
/// let result = generate("Tell me a joke.", &schema, 3, &backend).await?;
/// assert!(result.is_success());
/// assert_eq!(result.attempts(), 2);
/// # Ok(())
/// # }
/// ```
pub async fn generate<G>(
    instruction: &str,
    schema: &Schema,
    max_attempts: usize,
    backend: &G,
) -> Result<GenerationResult>
where
    G: TextGenerator + ?Sized,
{
    let request = GenerationRequest::new(instruction, schema.clone())?;
    let config = ClientConfig {
        max_attempts,
        ..ClientConfig::default()
    };
    Ok(run_attempts(&request, backend, &config, None).await)
}

/// The bounded generate-validate-correct loop.
#[instrument(
    skip_all,
    fields(request_id = %request.id(), max_attempts = config.max_attempts.max(1))
)]
pub(crate) async fn run_attempts<G>(
    request: &GenerationRequest,
    backend: &G,
    config: &ClientConfig,
    extra_check: Option<OutputCheck<'_>>,
) -> GenerationResult
where
    G: TextGenerator + ?Sized,
{
    let max_attempts = config.max_attempts.max(1);
    let schema = request.schema();
    let mut prompt = prompt::initial_prompt(request.instruction(), schema);
    let mut index = 1usize;

    loop {
        let started_at = Utc::now();
        debug!(attempt = index, prompt_len = prompt.len(), "Invoking backend");

        let (raw_output, outcome, transport_error) =
            match call_backend(backend, &prompt, config.attempt_timeout).await {
                Ok(raw) => {
                    debug!(attempt = index, raw_response_length = raw.len(), "Received backend response");
                    trace!(raw_response = %raw, "Raw backend text");
                    let outcome = match validation::parse_and_validate(&raw, schema) {
                        Ok(value) => {
                            let extra = extra_check.map(|check| check(&value)).unwrap_or_default();
                            if extra.is_empty() {
                                AttemptOutcome::Valid(value)
                            } else {
                                AttemptOutcome::Invalid(extra)
                            }
                        }
                        Err(violations) => AttemptOutcome::Invalid(violations),
                    };
                    (Some(raw), outcome, None)
                }
                Err(err) => {
                    let violation = Violation::transport(err.to_string(), err.is_retryable());
                    (None, AttemptOutcome::Invalid(vec![violation]), Some(err))
                }
            };

        let violations = match outcome {
            AttemptOutcome::Valid(value) => {
                info!(attempts = index, "Generated schema-conformant response");
                return GenerationResult::Success {
                    value,
                    attempts: index,
                };
            }
            AttemptOutcome::Invalid(violations) => violations,
        };

        warn!(
            attempt = index,
            violations = %summarize(&violations),
            "Attempt failed"
        );

        let attempt = GenerationAttempt {
            index,
            started_at,
            raw_output,
            outcome: AttemptOutcome::Invalid(violations),
        };

        if index >= max_attempts {
            warn!(attempts = index, "Attempts exhausted");
            return GenerationResult::Failure {
                last_attempt: attempt,
                attempts: index,
            };
        }

        match transport_error {
            // Nothing to correct: resend the same prompt, honoring rate-limit hints.
            Some(err) if !err.is_retryable() => {
                warn!(error = %err, "Backend error is not retryable; resending without backoff");
            }
            Some(err) => {
                if let Some(secs) = err.retry_delay() {
                    let delay = Duration::from_secs(secs).min(config.max_backoff);
                    debug!(delay_ms = delay.as_millis() as u64, "Backing off before retry");
                    tokio::time::sleep(delay).await;
                }
            }
            None => {
                prompt = prompt::corrective_prompt(request.instruction(), schema, &attempt);
            }
        }
        index += 1;
    }
}

async fn call_backend<G>(backend: &G, prompt: &str, timeout: Option<Duration>) -> Result<String>
where
    G: TextGenerator + ?Sized,
{
    match timeout {
        Some(limit) => tokio::time::timeout(limit, backend.generate_text(prompt))
            .await
            .map_err(|_| StructuredError::Timeout {
                millis: limit.as_millis() as u64,
            })?,
        None => backend.generate_text(prompt).await,
    }
}

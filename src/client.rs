use std::sync::Arc;
use std::time::Duration;

use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::{
    chat::{ChatBackend, ChatBackendConfig},
    error::{Result, StructuredError},
    generator::{MockGenerator, MockRequest, TextGenerator},
    models::GenerationResult,
    request::{run_attempts, GenerationRequest, OutputCheck},
    schema::Schema,
    validation::Violation,
};

/// Global configuration options for the client.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Maximum backend invocations per generation (default: 3)
    pub max_attempts: usize,
    /// Per-attempt deadline; an expired attempt counts as a transport failure (default: none)
    pub attempt_timeout: Option<Duration>,
    /// Upper bound on rate-limit backoff between attempts (default: 30s)
    pub max_backoff: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            attempt_timeout: None,
            max_backoff: Duration::from_secs(30),
        }
    }
}

/// Builder for [`StructuredClient`].
#[derive(Default)]
pub struct StructuredClientBuilder {
    backend: Option<Arc<dyn TextGenerator>>,
    chat: Option<ChatBackendConfig>,
    config: ClientConfig,
}

impl StructuredClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder preconfigured with a chat-completions backend read from the environment.
    pub fn from_env() -> Result<Self> {
        Ok(Self::new().with_chat_backend(ChatBackendConfig::from_env()?))
    }

    /// Use an arbitrary backend.
    pub fn with_backend(mut self, backend: impl TextGenerator + 'static) -> Self {
        self.backend = Some(Arc::new(backend));
        self.chat = None;
        self
    }

    /// Use a shared backend.
    pub fn with_shared_backend(mut self, backend: Arc<dyn TextGenerator>) -> Self {
        self.backend = Some(backend);
        self.chat = None;
        self
    }

    /// Talk to an OpenAI-compatible chat-completions endpoint.
    pub fn with_chat_backend(mut self, config: ChatBackendConfig) -> Self {
        self.chat = Some(config);
        self.backend = None;
        self
    }

    /// Provide a mock handler to answer all requests.
    ///
    /// This is primarily intended for unit tests where network calls should be avoided.
    pub fn with_mock(
        self,
        handler: impl Fn(MockRequest) -> Result<String> + Send + Sync + 'static,
    ) -> Self {
        self.with_backend(MockGenerator::new(handler))
    }

    /// Set the maximum number of backend invocations per generation.
    pub fn with_max_attempts(mut self, attempts: usize) -> Self {
        self.config.max_attempts = attempts.max(1);
        self
    }

    /// Abandon any single backend call that runs longer than `timeout`.
    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.config.attempt_timeout = Some(timeout);
        self
    }

    pub fn with_max_backoff(mut self, backoff: Duration) -> Self {
        self.config.max_backoff = backoff;
        self
    }

    /// Apply a complete client configuration.
    pub fn with_config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the client.
    pub fn build(self) -> Result<StructuredClient> {
        let backend: Arc<dyn TextGenerator> = match (self.backend, self.chat) {
            (Some(backend), _) => backend,
            (None, Some(chat)) => Arc::new(ChatBackend::new(chat)?),
            (None, None) => {
                return Err(StructuredError::Config(
                    "no backend configured; call with_backend, with_chat_backend or with_mock"
                        .to_string(),
                ))
            }
        };
        let mut config = self.config;
        config.max_attempts = config.max_attempts.max(1);
        Ok(StructuredClient { backend, config })
    }
}

/// Schema-constrained generation against a single backend.
#[derive(Clone)]
pub struct StructuredClient {
    backend: Arc<dyn TextGenerator>,
    config: ClientConfig,
}

impl StructuredClient {
    pub fn builder() -> StructuredClientBuilder {
        StructuredClientBuilder::new()
    }

    /// Generate a value for `schema` using the configured attempt budget.
    pub async fn generate(&self, instruction: &str, schema: &Schema) -> Result<GenerationResult> {
        let request = GenerationRequest::new(instruction, schema.clone())?;
        Ok(self.execute(&request).await)
    }

    /// Same as [`generate`](Self::generate) with an explicit attempt budget.
    pub async fn generate_with_attempts(
        &self,
        instruction: &str,
        schema: &Schema,
        max_attempts: usize,
    ) -> Result<GenerationResult> {
        let request = GenerationRequest::new(instruction, schema.clone())?;
        let config = ClientConfig {
            max_attempts: max_attempts.max(1),
            ..self.config.clone()
        };
        Ok(run_attempts(&request, self.backend.as_ref(), &config, None).await)
    }

    /// Run a prepared request. Never fails: problems end up in the result.
    pub async fn execute(&self, request: &GenerationRequest) -> GenerationResult {
        run_attempts(request, self.backend.as_ref(), &self.config, None).await
    }

    /// Generate a value for the schema derived from `T`.
    ///
    /// Values that satisfy the schema but still fail to deserialize into `T`
    /// are fed back to the model like any other violation, so a successful
    /// result always converts with [`GenerationResult::into_typed`].
    #[instrument(skip_all, fields(target = std::any::type_name::<T>()))]
    pub async fn generate_typed<T>(&self, instruction: &str) -> Result<GenerationResult>
    where
        T: JsonSchema + DeserializeOwned,
    {
        let schema = Schema::for_type::<T>()?;
        debug!(fields = schema.fields().len(), "Derived schema for target type");
        let request = GenerationRequest::new(instruction, schema)?;
        let deserializes = |value: &Value| match serde_json::from_value::<T>(value.clone()) {
            Ok(_) => Vec::new(),
            Err(err) => vec![Violation::deserialize(err.to_string())],
        };
        let check: OutputCheck<'_> = &deserializes;
        Ok(run_attempts(&request, self.backend.as_ref(), &self.config, Some(check)).await)
    }

    /// Quick generation with minimal ceremony; exhaustion becomes an error.
    ///
    /// # Example
    /// ```rust,no_run
    /// # use structured_json_output::StructuredClientBuilder;
    /// # use schemars::JsonSchema;
    /// # use serde::Deserialize;
    /// #[derive(Debug, Deserialize, JsonSchema)]
    /// struct Person { name: String }
    ///
    /// # async fn example() -> std::result::Result<(), Box<dyn std::error::Error>> {
    /// let client = StructuredClientBuilder::from_env()?.build()?;
    /// let person: Person = client.quick_generate("Name: Alice").await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn quick_generate<T>(&self, instruction: &str) -> Result<T>
    where
        T: JsonSchema + DeserializeOwned,
    {
        self.generate_typed::<T>(instruction).await?.into_typed()
    }

    pub fn backend(&self) -> Arc<dyn TextGenerator> {
        self.backend.clone()
    }

    /// Get the current client configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }
}

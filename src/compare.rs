//! Side-by-side runs of one request across model variants.

use std::fmt::Write;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::future::join_all;
use tokio::sync::Semaphore;
use tracing::{info, instrument};

use crate::{
    client::ClientConfig,
    error::{Result, StructuredError},
    generator::TextGenerator,
    models::GenerationResult,
    request::{run_attempts, GenerationRequest},
    schema::Schema,
    validation::summarize,
};

/// Outcome for one labelled backend.
#[derive(Debug, Clone)]
pub struct ComparisonEntry {
    pub label: String,
    pub result: GenerationResult,
    pub latency: Duration,
}

/// Results of a [`ModelComparison`] run, in registration order.
#[derive(Debug, Clone)]
pub struct ComparisonReport {
    pub started_at: DateTime<Utc>,
    pub entries: Vec<ComparisonEntry>,
}

impl ComparisonReport {
    pub fn entry(&self, label: &str) -> Option<&ComparisonEntry> {
        self.entries.iter().find(|e| e.label == label)
    }

    pub fn successes(&self) -> usize {
        self.entries.iter().filter(|e| e.result.is_success()).count()
    }

    /// Lowest-latency entry that produced a valid value.
    pub fn fastest_success(&self) -> Option<&ComparisonEntry> {
        self.entries
            .iter()
            .filter(|e| e.result.is_success())
            .min_by_key(|e| e.latency)
    }

    /// One line per backend: label, status, attempts and latency.
    pub fn summary(&self) -> String {
        let mut out = String::new();
        for entry in &self.entries {
            let status = if entry.result.is_success() {
                "ok".to_string()
            } else {
                format!("failed ({})", summarize(entry.result.violations()))
            };
            let _ = writeln!(
                out,
                "{:<24} {} attempts={} latency={}ms",
                entry.label,
                status,
                entry.result.attempts(),
                entry.latency.as_millis()
            );
        }
        out
    }
}

/// Runs the same instruction and schema against several backends.
pub struct ModelComparison {
    backends: Vec<(String, Arc<dyn TextGenerator>)>,
    config: ClientConfig,
    concurrency: usize,
}

impl Default for ModelComparison {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelComparison {
    pub fn new() -> Self {
        Self {
            backends: Vec::new(),
            config: ClientConfig::default(),
            concurrency: 4,
        }
    }

    pub fn with_backend(mut self, label: impl Into<String>, backend: impl TextGenerator + 'static) -> Self {
        self.backends.push((label.into(), Arc::new(backend)));
        self
    }

    pub fn with_shared_backend(mut self, label: impl Into<String>, backend: Arc<dyn TextGenerator>) -> Self {
        self.backends.push((label.into(), backend));
        self
    }

    pub fn with_config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_max_attempts(mut self, attempts: usize) -> Self {
        self.config.max_attempts = attempts.max(1);
        self
    }

    /// How many backends may be in flight at once.
    pub fn with_concurrency(mut self, n: usize) -> Self {
        self.concurrency = n.max(1);
        self
    }

    #[instrument(skip_all, fields(backends = self.backends.len()))]
    pub async fn run(&self, instruction: &str, schema: &Schema) -> Result<ComparisonReport> {
        if self.backends.is_empty() {
            return Err(StructuredError::Config(
                "comparison needs at least one backend".to_string(),
            ));
        }
        let request = GenerationRequest::new(instruction, schema.clone())?;
        let semaphore = Semaphore::new(self.concurrency);
        let started_at = Utc::now();

        let runs = self.backends.iter().map(|(label, backend)| {
            let request = &request;
            let semaphore = &semaphore;
            async move {
                let _permit = semaphore.acquire().await.ok();
                let start = Instant::now();
                let result = run_attempts(request, backend.as_ref(), &self.config, None).await;
                let latency = start.elapsed();
                info!(
                    label = %label,
                    success = result.is_success(),
                    attempts = result.attempts(),
                    latency_ms = latency.as_millis() as u64,
                    "Backend finished"
                );
                ComparisonEntry {
                    label: label.clone(),
                    result,
                    latency,
                }
            }
        });

        Ok(ComparisonReport {
            started_at,
            entries: join_all(runs).await,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{schema::FieldType, MockGenerator};

    #[tokio::test]
    async fn empty_comparison_is_a_config_error() {
        let schema = Schema::builder()
            .field("a", FieldType::String, "")
            .build()
            .unwrap();
        let err = ModelComparison::new().run("x", &schema).await.unwrap_err();
        assert!(matches!(err, StructuredError::Config(_)));
    }

    #[tokio::test]
    async fn summary_has_a_line_per_backend() {
        let schema = Schema::builder()
            .field("a", FieldType::String, "")
            .build()
            .unwrap();
        let report = ModelComparison::new()
            .with_backend("good", MockGenerator::scripted([r#"{"a": "x"}"#]))
            .with_backend("bad", MockGenerator::scripted(["not json"]))
            .with_max_attempts(1)
            .run("Give me a", &schema)
            .await
            .unwrap();

        let summary = report.summary();
        assert_eq!(summary.lines().count(), 2);
        assert!(summary.lines().next().unwrap().contains("ok attempts=1"));
        assert!(summary.contains("failed (response is not valid JSON"));
    }
}

//! Abstract text generation interface.
//!
//! This module defines the `TextGenerator` trait, the only capability the
//! generation loop needs from a model: take a prompt, return raw text or a
//! transport error. Hosted services, local models and test mocks all plug in
//! here.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::{Result, StructuredError};

/// Abstract interface for text generation.
///
/// # Example
///
/// ```rust,ignore
/// use structured_json_output::generator::TextGenerator;
///
/// async fn summarize(generator: &dyn TextGenerator, document: &str) -> Result<String> {
///     generator.generate_text(&format!("Summarize: {document}")).await
/// }
/// ```
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generate a response for `prompt`.
    ///
    /// Errors are transport-level failures (unreachable service, HTTP error,
    /// timeout). Whatever text comes back, well-formed or not, is `Ok`.
    async fn generate_text(&self, prompt: &str) -> Result<String>;
}

#[async_trait]
impl<G: TextGenerator + ?Sized> TextGenerator for Arc<G> {
    async fn generate_text(&self, prompt: &str) -> Result<String> {
        (**self).generate_text(prompt).await
    }
}

#[async_trait]
impl<G: TextGenerator + ?Sized> TextGenerator for Box<G> {
    async fn generate_text(&self, prompt: &str) -> Result<String> {
        (**self).generate_text(prompt).await
    }
}

/// Handler used by [`MockGenerator`] to answer requests.
pub type MockHandler = Arc<dyn Fn(MockRequest) -> Result<String> + Send + Sync>;

/// View of a single call passed to a [`MockHandler`].
#[derive(Debug, Clone)]
pub struct MockRequest {
    /// 1-based index of this call on the mock.
    pub call_index: usize,
    /// The full prompt sent by the caller.
    pub prompt: String,
}

/// In-process backend for tests and offline demos.
///
/// Records every prompt it receives so tests can assert on invocation counts
/// and on the content of corrective prompts.
#[derive(Clone)]
pub struct MockGenerator {
    handler: MockHandler,
    calls: Arc<AtomicUsize>,
    prompts: Arc<Mutex<Vec<String>>>,
}

impl MockGenerator {
    pub fn new(handler: impl Fn(MockRequest) -> Result<String> + Send + Sync + 'static) -> Self {
        Self {
            handler: Arc::new(handler),
            calls: Arc::new(AtomicUsize::new(0)),
            prompts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Replay `responses` in order; the last one repeats once the script runs out.
    pub fn scripted<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let script: Vec<String> = responses.into_iter().map(Into::into).collect();
        Self::new(move |req| {
            script
                .get(req.call_index - 1)
                .or_else(|| script.last())
                .cloned()
                .ok_or_else(|| StructuredError::Backend("mock script is empty".to_string()))
        })
    }

    /// Number of times the backend has been invoked.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Prompts received so far, in call order.
    pub async fn prompts(&self) -> Vec<String> {
        self.prompts.lock().await.clone()
    }
}

#[async_trait]
impl TextGenerator for MockGenerator {
    async fn generate_text(&self, prompt: &str) -> Result<String> {
        let call_index = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.prompts.lock().await.push(prompt.to_string());
        (self.handler)(MockRequest {
            call_index,
            prompt: prompt.to_string(),
        })
    }
}

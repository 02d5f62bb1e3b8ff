//! Schema-constrained JSON generation from text-generation backends.
//!
//! This crate sends an instruction plus a declarative [`Schema`] to a
//! [`TextGenerator`], validates what comes back, and retries with corrective
//! feedback (the previous output and every violation found) up to a fixed
//! attempt budget. Malformed model output never surfaces as an error: callers
//! always get a [`GenerationResult`].
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use structured_json_output::prelude::*;
//!
//! #[derive(Debug, Deserialize, JsonSchema)]
//! struct Joke {
//!     /// question to set up a joke
//!     setup: String,
//!     /// answer to resolve the joke
//!     punchline: String,
//! }
//!
//! #[tokio::main]
//! async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
//!     let client = StructuredClientBuilder::from_env()?
//!         .with_max_attempts(3)
//!         .build()?;
//!
//!     let joke: Joke = client.quick_generate("Tell me a joke about crabs.").await?;
//!     println!("{} {}", joke.setup, joke.punchline);
//!     Ok(())
//! }
//! ```

pub mod chat;
pub mod client;
pub mod compare;
pub mod error;
pub mod generator;
pub mod models;
pub mod prompt;
pub mod request;
pub mod schema;
pub mod validation;

pub use chat::{ChatBackend, ChatBackendConfig, ResponseFormat};
pub use client::{ClientConfig, StructuredClient, StructuredClientBuilder};
pub use compare::{ComparisonEntry, ComparisonReport, ModelComparison};
pub use error::{Result, ResultExt, StructuredError};
pub use generator::{MockGenerator, MockHandler, MockRequest, TextGenerator};
pub use models::{AttemptOutcome, GenerationAttempt, GenerationResult};
pub use request::{generate, GenerationRequest};
pub use schema::{Field, FieldType, Schema, SchemaBuilder};
pub use validation::{Violation, ViolationKind};

/// Prelude module for convenient imports.
///
/// ```rust
/// use structured_json_output::prelude::*;
/// ```
pub mod prelude {
    pub use crate::chat::{ChatBackend, ChatBackendConfig, ResponseFormat};
    pub use crate::client::{ClientConfig, StructuredClient, StructuredClientBuilder};
    pub use crate::compare::{ComparisonReport, ModelComparison};
    pub use crate::error::{Result, ResultExt, StructuredError};
    pub use crate::generator::{MockGenerator, MockRequest, TextGenerator};
    pub use crate::models::GenerationResult;
    pub use crate::request::{generate, GenerationRequest};
    pub use crate::schema::{Field, FieldType, Schema};
    pub use crate::validation::{Violation, ViolationKind};

    // Re-export commonly used external types
    pub use schemars::JsonSchema;
    pub use serde::{Deserialize, Serialize};
}

//! Financial Analysis Orchestrator
//!
//! Drives a company name through a fixed pipeline:
//! - Resolves the company to a ticker symbol
//! - Fetches financial metrics, falling back to a secondary provider
//! - Asks a language model for a structured analysis and re-asks when malformed
//! - Writes a report artifact
//!
//! Every run ends in `Completed` or `Failed` with a typed `FailureKind`.
//!
//! LOOP:
//! ROUTE → EXECUTE → OBSERVE → APPLY → ROUTE ... → TERMINATE

pub mod agent;
pub mod api;
pub mod completion;
pub mod config;
pub mod error;
pub mod fallback;
pub mod gemini;
pub mod metrics;
pub mod models;
pub mod router;
pub mod state;
pub mod tools;

pub use error::{FailureKind, OrchestrationError, Result};

// Re-export common types
pub use agent::Orchestrator;
pub use config::{OrchestratorConfig, ProviderConfig};
pub use models::*;
pub use state::TaskState;

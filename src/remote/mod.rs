//! Remote dependencies driven by the demo binary.
//!
//! # Data Flow
//! ```text
//! Guarded::call       → BlockingQuestionClient (GET)  | SimulatedDependency::ask_blocking
//! Guarded::call_async → QuestionClient (POST)         | SimulatedDependency::ask
//! ```

pub mod client;
pub mod simulated;

pub use client::{BlockingQuestionClient, QuestionClient, RemoteError, DEFAULT_URL};
pub use simulated::SimulatedDependency;

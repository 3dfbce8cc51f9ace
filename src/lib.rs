//! repairbench: LLM repair harness over HumanEvalFix-style tasks.
//!
//! This library verifies candidate programs against held-out tests in
//! killed-on-deadline interpreter subprocesses and drives an iterative
//! repair loop that feeds structured verdicts back to a model.

// Core modules
pub mod cli;
pub mod dataset;
pub mod error;
pub mod eval;
pub mod harness;
pub mod llm;
pub mod repair;
pub mod storage;
pub mod verifier;

// Re-export commonly used error types
pub use error::{DatasetError, LlmError};

//! vbc-validator library interface
//!
//! Loads VBC performance-report extracts, runs the validation checkers,
//! optionally asks an LLM for per-episode diagnostics, and renders the
//! HTML report. Exposed as a library for integration testing.

pub mod diagnosis;
pub mod loader;
pub mod logging;
pub mod pipeline;
pub mod report;
pub mod validators;

//! # VBC Common Library
//!
//! Shared code for the VBC validation workspace including:
//! - Error and result types
//! - Run configuration (TOML bootstrap + environment overrides)
//! - Domain models (flags, contracts, reference ranges)
//! - Tabular datasets and typed per-dataset records
//! - Human-readable number formatting for flag narratives

pub mod config;
pub mod dataset;
pub mod error;
pub mod human_fmt;
pub mod models;

pub use error::{Error, Result};
pub use models::{Category, Contract, Flag, FlagSequence, MetricValue, Severity};

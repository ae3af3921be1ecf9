//! Scenario and stress harness for the arenalloc engines.
//!
//! This crate provides:
//! - Scripted scenarios: the demonstration sequence plus per-engine placement checks
//! - A runner that executes them and records JSONL structured logs
//! - A stress driver sharing one allocator across threads behind a mutex

#![forbid(unsafe_code)]

pub mod error;
pub mod runner;
pub mod scenarios;
pub mod stress;
pub mod structured_log;

pub use error::HarnessError;
pub use runner::{ScenarioResult, ScenarioRunner};
pub use stress::{StressConfig, StressReport, run_stress};

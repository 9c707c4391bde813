//! Testdeck - Test Session Orchestration Engine and Local Runner
//!
//! Schedules test suites across browser and interactive environments,
//! aggregates per-test results into session totals and renders them as
//! xUnit, lcov, JSON or CSV reports.
//!
//! The engine side (`suite`, `scheduler`, `session`, `environment`) is
//! embedded by an orchestrator process that owns the HTTP transport. The
//! runner side (`client`, `reporter`, `output`) backs the `testdeck`
//! binary, which drives a remote orchestrator over its JSON API.

pub mod cli;
pub mod client;
pub mod config;
pub mod environment;
pub mod models;
pub mod output;
pub mod reporter;
pub mod scheduler;
pub mod session;
pub mod suite;
pub mod utils;

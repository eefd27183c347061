//! ---
//! bco_section: "01-core-functionality"
//! bco_subsection: "module"
//! bco_type: "source"
//! bco_scope: "code"
//! bco_description: "Shared primitives and utilities for the continuity engine."
//! bco_version: "v0.0.0-prealpha"
//! bco_owner: "tbd"
//! ---
//! Core shared primitives for the R-BCO workspace.
//! This crate exposes engine configuration loading, the injectable clock
//! abstraction, and tracing bootstrap consumed across the workspace.

pub mod config;
pub mod logging;
pub mod time;

pub use config::{
    ApiConfig, ApiRole, AuditConfig, EngineConfig, LoggingConfig, MetricsConfig, MonitorConfig,
    SimulationConfig, VerifierConfig,
};
pub use logging::{init_tracing, ConsoleTarget, LogFormat};
pub use time::{Clock, ManualClock, SharedClock, SystemClock};

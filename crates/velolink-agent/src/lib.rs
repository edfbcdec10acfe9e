//! VeloLink agent library.
//!
//! The agent binary wires a [`velolink_core`] telemetry pipeline to a
//! TOML configuration file and a handful of CLI overrides. Everything it
//! does is re-usable from here: load an [`AgentConfig`], convert its
//! sections into the core option types, and hand them to
//! `velolink_core::supervisor::run`.
//!
//! # Configuration
//!
//! The agent reads `~/.config/velolink/agent.toml` by default (see
//! [`default_config_path`]). All sections and keys are optional:
//!
//! ```toml
//! [collector]
//! url = "http://collector.local:8080"
//! source = "garage-trainer"
//!
//! [device]
//! name_contains = "KICKR"
//! ```

pub mod config;

pub use config::{
    AgentConfig, CollectorConfig, ConfigError, DeviceConfig, ScanConfig, SessionConfig,
    SupervisorConfig, ValidationError, default_config_path,
};

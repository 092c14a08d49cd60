//! Configuration, logging, and shared utilities for the Hostex bridge.
//!
//! This crate owns the concerns every other bridge crate leans on:
//! - YAML configuration with serde defaults and env overrides
//! - tracing initialization
//! - the shared `CoreError` type
//! - display-timezone parsing with a UTC fallback

mod config;
mod error;
mod logging;

pub use config::{
    Config, HomeserverConfig, HostexConfig, DEFAULT_POLL_INTERVAL_SECS, DEFAULT_TIMEZONE,
};
pub use error::{CoreError, CoreResult};
pub use logging::init_logging;

//! Helpdesk Common - Shared configuration, error types and logging for the helpdesk bot.
//!
//! This crate provides:
//! - Configuration types and loading (file, `.env`, environment overrides)
//! - Configuration validation
//! - Error types
//! - Logging setup

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod logging;
pub mod validation;

pub use config::{
    Config, LlmConfig, ObservabilityConfig, Provenance, ReplyRole, SessionConfig, TelegramConfig,
    TranscriptConfig,
};
pub use error::{Error, Result};
pub use validation::{Validate, ValidationError, ValidationResult};

//! Configuration validation.
//!
//! The bot refuses to start unless both secrets are present and the
//! remaining settings are within valid ranges.

use thiserror::Error;

use crate::config::{Config, LlmConfig, ObservabilityConfig, SessionConfig, TelegramConfig};

/// Configuration validation error.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Multiple validation errors: {0:?}")]
    Multiple(Vec<ValidationError>),
}

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Trait for validatable configuration sections.
pub trait Validate {
    /// Validate this configuration section.
    fn validate(&self) -> ValidationResult<()>;
}

fn require(value: Option<&str>, field: &str) -> ValidationResult<()> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(()),
        _ => Err(ValidationError::MissingField {
            field: field.to_string(),
        }),
    }
}

impl Validate for Config {
    fn validate(&self) -> ValidationResult<()> {
        let mut errors: Vec<ValidationError> = [
            self.telegram.validate(),
            self.llm.validate(),
            self.session.validate(),
            self.observability.validate(),
        ]
        .into_iter()
        .filter_map(Result::err)
        .collect();

        if errors.is_empty() {
            Ok(())
        } else if errors.len() == 1 {
            Err(errors.remove(0))
        } else {
            Err(ValidationError::Multiple(errors))
        }
    }
}

impl Config {
    /// Load, apply environment overrides and validate.
    pub fn load_and_validate() -> anyhow::Result<Self> {
        let config = Self::load_with_env()?;
        Validate::validate(&config).map_err(|e| anyhow::anyhow!("{}", e))?;
        Ok(config)
    }
}

impl Validate for TelegramConfig {
    fn validate(&self) -> ValidationResult<()> {
        require(self.bot_token.as_deref(), "telegram.bot_token (TELEGRAM_BOT_TOKEN)")?;

        if self.poll_timeout_secs == 0 {
            return Err(ValidationError::InvalidValue {
                field: "telegram.poll_timeout_secs".into(),
                reason: "must be greater than 0".into(),
            });
        }

        Ok(())
    }
}

impl Validate for LlmConfig {
    fn validate(&self) -> ValidationResult<()> {
        require(self.credentials.as_deref(), "llm.credentials (GIGACHAT_CREDENTIALS)")?;

        if self.timeout_secs == 0 {
            return Err(ValidationError::InvalidValue {
                field: "llm.timeout_secs".into(),
                reason: "must be greater than 0".into(),
            });
        }

        Ok(())
    }
}

impl Validate for SessionConfig {
    fn validate(&self) -> ValidationResult<()> {
        if self.system_prompt.trim().is_empty() {
            return Err(ValidationError::InvalidValue {
                field: "session.system_prompt".into(),
                reason: "must not be empty".into(),
            });
        }
        Ok(())
    }
}

impl Validate for ObservabilityConfig {
    fn validate(&self) -> ValidationResult<()> {
        const LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];
        const FORMATS: &[&str] = &["json", "pretty"];

        if !LEVELS.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(ValidationError::InvalidValue {
                field: "observability.log_level".into(),
                reason: format!("must be one of {LEVELS:?}"),
            });
        }

        if !FORMATS.contains(&self.log_format.as_str()) {
            return Err(ValidationError::InvalidValue {
                field: "observability.log_format".into(),
                reason: format!("must be one of {FORMATS:?}"),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> Config {
        let mut config = Config::default();
        config.telegram.bot_token = Some("123:ABC".into());
        config.llm.credentials = Some("secret".into());
        config
    }

    #[test]
    fn test_valid_config() {
        assert!(Validate::validate(&valid_config()).is_ok());
    }

    #[test]
    fn test_missing_token() {
        let mut config = valid_config();
        config.telegram.bot_token = None;

        let err = Validate::validate(&config).unwrap_err();
        assert!(matches!(err, ValidationError::MissingField { ref field } if field.contains("TELEGRAM_BOT_TOKEN")));
    }

    #[test]
    fn test_blank_credentials_are_missing() {
        let mut config = valid_config();
        config.llm.credentials = Some("   ".into());

        let err = Validate::validate(&config).unwrap_err();
        assert!(matches!(err, ValidationError::MissingField { ref field } if field.contains("GIGACHAT_CREDENTIALS")));
    }

    #[test]
    fn test_both_secrets_missing() {
        let err = Validate::validate(&Config::default()).unwrap_err();
        match err {
            ValidationError::Multiple(errors) => assert_eq!(errors.len(), 2),
            other => panic!("expected Multiple, got {other:?}"),
        }
    }

    #[test]
    fn test_invalid_log_format() {
        let mut config = valid_config();
        config.observability.log_format = "xml".into();
        assert!(matches!(
            Validate::validate(&config),
            Err(ValidationError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_zero_poll_timeout() {
        let mut config = valid_config();
        config.telegram.poll_timeout_secs = 0;
        assert!(Validate::validate(&config).is_err());
    }
}

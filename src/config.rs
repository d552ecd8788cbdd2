//! Configuration types, loaded from environment variables.

use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::channels::email::EmailConfig;
use crate::error::ConfigError;
use crate::llm::LlmConfig;

/// Read `key`, falling back to `default` when unset or blank.
pub fn env_or(key: &str, default: &str) -> String {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

/// Read and parse `key`, falling back to `default` when unset.
///
/// A set but unparseable value is an error, not a silent default.
pub fn env_parse<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    parse_value(key, std::env::var(key).ok(), default)
}

fn parse_value<T>(key: &str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(default),
        Some(value) => value.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("'{value}': {e}"),
        }),
    }
}

/// Top-level configuration for the `sales-assist` binary.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// JSONL file mirroring the interaction log.
    pub interactions_path: PathBuf,
    /// Directory for the rolling log file.
    pub log_dir: PathBuf,
    /// How often queued replies are drained and analyzed.
    pub drain_interval: Duration,
    /// `None` when email is not configured.
    pub email: Option<EmailConfig>,
    pub llm: LlmConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            interactions_path: PathBuf::from(env_or(
                "SALES_INTERACTIONS_PATH",
                "customer_interactions.jsonl",
            )),
            log_dir: PathBuf::from(env_or("SALES_LOG_DIR", "./logs")),
            drain_interval: Duration::from_secs(env_parse("SALES_DRAIN_INTERVAL_SECS", 60)?),
            email: EmailConfig::from_env()?,
            llm: LlmConfig::from_env()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_value_defaults_when_unset_or_blank() {
        assert_eq!(parse_value("PORT", None, 993u16).unwrap(), 993);
        assert_eq!(parse_value("PORT", Some("  ".into()), 993u16).unwrap(), 993);
    }

    #[test]
    fn parse_value_reads_set_value() {
        assert_eq!(parse_value("PORT", Some(" 1143 ".into()), 993u16).unwrap(), 1143);
    }

    #[test]
    fn parse_value_rejects_garbage() {
        let err = parse_value("EMAIL_IMAP_PORT", Some("abc".into()), 993u16).unwrap_err();
        match err {
            ConfigError::InvalidValue { key, message } => {
                assert_eq!(key, "EMAIL_IMAP_PORT");
                assert!(message.starts_with("'abc'"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn env_or_falls_back_for_unset_key() {
        assert_eq!(
            env_or("SALES_ASSIST_TEST_SURELY_UNSET", "fallback"),
            "fallback"
        );
    }
}

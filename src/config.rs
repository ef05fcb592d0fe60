//! Configuration types, loaded from a JSON file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

/// Bouncer configuration.
///
/// Loaded once at startup from the JSON file named on the command line and
/// passed by reference into the rest of the program. Never mutated after
/// load.
#[derive(Debug, Clone, Deserialize)]
pub struct GlobalConfig {
    /// Path to the downloaded OAuth 2.0 client credentials (JSON).
    pub credentials_file: PathBuf,
    /// Path to the cached OAuth 2.0 token (JSON); rewritten on refresh.
    pub token_file: PathBuf,
    /// Permission scope URLs requested for the mail API.
    #[serde(default)]
    pub scopes: Vec<String>,
    /// Standard response prepended to replies unless overridden per sender.
    pub default_prefix: String,
    /// Seconds to wait after a successful send before deleting the reply.
    pub delete_delay: u64,
    /// Maximum number of concurrent send/delete operations in flight.
    pub pool_size: usize,
    /// Logging setup. Unknown keys are ignored.
    #[serde(default)]
    pub logging_config: LoggingConfig,
    /// Per-sender overrides, keyed by from address.
    #[serde(default)]
    pub reply_mapping: BTreeMap<String, SenderOverride>,
}

/// Per-sender override of the reply defaults. All fields optional; absent
/// fields inherit the global defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SenderOverride {
    /// Address to send the reply to when the sender cannot receive mail.
    #[serde(default)]
    pub to: Option<String>,
    /// Response to prepend instead of `default_prefix`.
    #[serde(default)]
    pub prefix: Option<String>,
    /// Number of reply copies to send (>= 1).
    #[serde(default)]
    pub multiple: Option<u32>,
    /// Retain the reply in the sent box for record keeping.
    #[serde(default)]
    pub keep_reply: Option<bool>,
}

/// Logging setup carried in the config file.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive, e.g. `"info"` or `"mail_bouncer=debug"`.
    pub level: String,
    /// Optional log file; stderr when absent.
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

impl GlobalConfig {
    /// Load and validate configuration from a JSON file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Unreadable {
            path: path.display().to_string(),
            source,
        })?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Check invariants the type system cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pool_size < 1 {
            return Err(ConfigError::InvalidValue {
                key: "pool_size".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        for (sender, attrs) in &self.reply_mapping {
            if let Some(multiple) = attrs.multiple {
                if multiple < 1 {
                    return Err(ConfigError::InvalidValue {
                        key: format!("reply_mapping.{sender}.multiple"),
                        message: "must be at least 1".to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Delete delay as a `Duration`.
    pub fn delete_delay(&self) -> Duration {
        Duration::from_secs(self.delete_delay)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn base_json() -> serde_json::Value {
        serde_json::json!({
            "credentials_file": "/tmp/credentials.json",
            "token_file": "/tmp/token.json",
            "scopes": ["https://mail.example.com/scope"],
            "default_prefix": "[BLOCKED] ",
            "delete_delay": 5,
            "pool_size": 4,
            "logging_config": {"level": "debug"},
            "reply_mapping": {
                "spam@x.com": {"multiple": 3},
                "ads@y.com": {"to": "void@y.com", "prefix": "No thanks. ", "keep_reply": true}
            }
        })
    }

    #[test]
    fn parses_full_config() {
        let config: GlobalConfig = serde_json::from_value(base_json()).unwrap();
        config.validate().unwrap();
        assert_eq!(config.default_prefix, "[BLOCKED] ");
        assert_eq!(config.pool_size, 4);
        assert_eq!(config.delete_delay(), Duration::from_secs(5));
        assert_eq!(config.reply_mapping["spam@x.com"].multiple, Some(3));
        assert_eq!(
            config.reply_mapping["ads@y.com"].to.as_deref(),
            Some("void@y.com")
        );
        assert_eq!(config.reply_mapping["ads@y.com"].keep_reply, Some(true));
    }

    #[test]
    fn rejects_zero_pool_size() {
        let mut json = base_json();
        json["pool_size"] = serde_json::json!(0);
        let config: GlobalConfig = serde_json::from_value(json).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("pool_size"));
    }

    #[test]
    fn rejects_zero_multiple() {
        let mut json = base_json();
        json["reply_mapping"]["spam@x.com"]["multiple"] = serde_json::json!(0);
        let config: GlobalConfig = serde_json::from_value(json).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("multiple"));
    }

    #[test]
    fn empty_mapping_and_missing_logging_default() {
        let json = serde_json::json!({
            "credentials_file": "/tmp/c.json",
            "token_file": "/tmp/t.json",
            "default_prefix": "",
            "delete_delay": 0,
            "pool_size": 1
        });
        let config: GlobalConfig = serde_json::from_value(json).unwrap();
        config.validate().unwrap();
        assert!(config.reply_mapping.is_empty());
        assert_eq!(config.logging_config.level, "info");
        assert!(config.logging_config.file.is_none());
    }

    #[test]
    fn load_reports_unreadable_file() {
        let err = GlobalConfig::load(Path::new("/nonexistent/bouncer.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Unreadable { .. }));
    }

    #[test]
    fn load_reports_malformed_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{not json").unwrap();
        let err = GlobalConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn load_round_trips_through_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{}", base_json()).unwrap();
        let config = GlobalConfig::load(file.path()).unwrap();
        assert_eq!(config.reply_mapping.len(), 2);
    }
}

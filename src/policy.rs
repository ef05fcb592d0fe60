//! Policy resolution — merges global defaults with per-sender overrides.

use crate::config::GlobalConfig;
use crate::error::ConfigError;

/// Fully-specified reply policy for one sender. Immutable once resolved;
/// lives for a single processing run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPolicy {
    /// Where the reply goes: the override `to`, else the sender itself.
    pub recipient: String,
    /// Text prepended to the reply body.
    pub body_prefix: String,
    /// Number of identical reply copies to send (>= 1).
    pub reply_count: u32,
    /// Keep the sent reply instead of deleting it after the delay.
    pub retain_reply: bool,
}

/// Resolve the policy for one sender address.
///
/// Override fields win when present and non-empty; everything else falls
/// back to the global defaults. `to` has no global counterpart — its
/// fallback is the sender address itself, so a reply with no override
/// bounces straight back.
pub fn resolve(global: &GlobalConfig, sender: &str) -> Result<ResolvedPolicy, ConfigError> {
    if global.pool_size < 1 {
        return Err(ConfigError::InvalidValue {
            key: "pool_size".to_string(),
            message: "must be at least 1".to_string(),
        });
    }

    let overrides = global.reply_mapping.get(sender).cloned().unwrap_or_default();

    let reply_count = overrides.multiple.unwrap_or(1);
    if reply_count < 1 {
        return Err(ConfigError::InvalidValue {
            key: format!("reply_mapping.{sender}.multiple"),
            message: "must be at least 1".to_string(),
        });
    }

    let recipient = overrides
        .to
        .filter(|to| !to.is_empty())
        .unwrap_or_else(|| sender.to_string());

    let body_prefix = overrides
        .prefix
        .filter(|prefix| !prefix.is_empty())
        .unwrap_or_else(|| global.default_prefix.clone());

    Ok(ResolvedPolicy {
        recipient,
        body_prefix,
        reply_count,
        retain_reply: overrides.keep_reply.unwrap_or(false),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SenderOverride;

    fn make_config(overrides: &[(&str, SenderOverride)]) -> GlobalConfig {
        serde_json::from_value::<GlobalConfig>(serde_json::json!({
            "credentials_file": "/tmp/c.json",
            "token_file": "/tmp/t.json",
            "default_prefix": "[BLOCKED] ",
            "delete_delay": 5,
            "pool_size": 2,
            "reply_mapping": {}
        }))
        .map(|mut config| {
            for (sender, over) in overrides {
                config
                    .reply_mapping
                    .insert((*sender).to_string(), over.clone());
            }
            config
        })
        .unwrap()
    }

    #[test]
    fn defaults_apply_when_no_override() {
        let config = make_config(&[]);
        let policy = resolve(&config, "spam@x.com").unwrap();
        assert_eq!(
            policy,
            ResolvedPolicy {
                recipient: "spam@x.com".to_string(),
                body_prefix: "[BLOCKED] ".to_string(),
                reply_count: 1,
                retain_reply: false,
            }
        );
    }

    #[test]
    fn multiple_only_override_keeps_other_defaults() {
        let config = make_config(&[(
            "spam@x.com",
            SenderOverride {
                multiple: Some(3),
                ..Default::default()
            },
        )]);
        let policy = resolve(&config, "spam@x.com").unwrap();
        assert_eq!(policy.recipient, "spam@x.com");
        assert_eq!(policy.body_prefix, "[BLOCKED] ");
        assert_eq!(policy.reply_count, 3);
        assert!(!policy.retain_reply);
    }

    #[test]
    fn full_override_wins() {
        let config = make_config(&[(
            "ads@y.com",
            SenderOverride {
                to: Some("void@y.com".to_string()),
                prefix: Some("No thanks. ".to_string()),
                multiple: Some(2),
                keep_reply: Some(true),
            },
        )]);
        let policy = resolve(&config, "ads@y.com").unwrap();
        assert_eq!(policy.recipient, "void@y.com");
        assert_eq!(policy.body_prefix, "No thanks. ");
        assert_eq!(policy.reply_count, 2);
        assert!(policy.retain_reply);
    }

    #[test]
    fn empty_override_strings_fall_back() {
        let config = make_config(&[(
            "spam@x.com",
            SenderOverride {
                to: Some(String::new()),
                prefix: Some(String::new()),
                ..Default::default()
            },
        )]);
        let policy = resolve(&config, "spam@x.com").unwrap();
        assert_eq!(policy.recipient, "spam@x.com");
        assert_eq!(policy.body_prefix, "[BLOCKED] ");
    }

    #[test]
    fn zero_multiple_is_a_config_error() {
        let config = make_config(&[(
            "spam@x.com",
            SenderOverride {
                multiple: Some(0),
                ..Default::default()
            },
        )]);
        let err = resolve(&config, "spam@x.com").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn resolution_is_deterministic() {
        let config = make_config(&[(
            "spam@x.com",
            SenderOverride {
                multiple: Some(3),
                ..Default::default()
            },
        )]);
        let first = resolve(&config, "spam@x.com").unwrap();
        let second = resolve(&config, "spam@x.com").unwrap();
        assert_eq!(first, second);
    }
}

//! Model-builder configuration, loadable from TOML.

use serde::Deserialize;
use thiserror::Error as ThisError;

/// Default name of the implicit principal key property.
pub const DEFAULT_SHADOW_KEY_PROPERTY: &str = "TempId";

/// Default upper bound on entity, property and navigation names.
pub const DEFAULT_MAX_NAME_LEN: usize = 128;

///
/// ConfigError
///

#[derive(Debug, ThisError)]
pub enum ConfigError {
    #[error("invalid model config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid model config: {0}")]
    Invalid(String),
}

///
/// PostCheckPolicy
///
/// What happens when a navigation change has already resolved its conflicts
/// but the final relationship does not carry the requested navigations.
///

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum PostCheckPolicy {
    /// Restore the graph to its state before the operation.
    #[default]
    Strict,
    /// Keep the conflict-resolution side effects and only report failure.
    Tolerant,
}

///
/// ModelConfig
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ModelConfig {
    pub post_check: PostCheckPolicy,
    pub shadow_key_property: String,
    pub dispatch_notifications: bool,
    pub max_name_len: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            post_check: PostCheckPolicy::default(),
            shadow_key_property: DEFAULT_SHADOW_KEY_PROPERTY.to_string(),
            dispatch_notifications: true,
            max_name_len: DEFAULT_MAX_NAME_LEN,
        }
    }
}

impl ModelConfig {
    /// Parse and validate a TOML document; missing keys take their defaults.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.shadow_key_property.is_empty() {
            return Err(ConfigError::Invalid(
                "shadow_key_property must not be empty".to_string(),
            ));
        }
        if self.max_name_len == 0 {
            return Err(ConfigError::Invalid(
                "max_name_len must be greater than zero".to_string(),
            ));
        }
        if self.shadow_key_property.len() > self.max_name_len {
            return Err(ConfigError::Invalid(format!(
                "shadow_key_property '{}' exceeds max_name_len {}",
                self.shadow_key_property, self.max_name_len
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config = ModelConfig::from_toml_str("").unwrap();
        assert_eq!(config, ModelConfig::default());
        assert_eq!(config.post_check, PostCheckPolicy::Strict);
    }

    #[test]
    fn overrides_are_applied() {
        let config = ModelConfig::from_toml_str(
            r#"
            post_check = "tolerant"
            shadow_key_property = "SurrogateId"
            dispatch_notifications = false
            "#,
        )
        .unwrap();

        assert_eq!(config.post_check, PostCheckPolicy::Tolerant);
        assert_eq!(config.shadow_key_property, "SurrogateId");
        assert!(!config.dispatch_notifications);
        assert_eq!(config.max_name_len, DEFAULT_MAX_NAME_LEN);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = ModelConfig::from_toml_str("post_chek = \"strict\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn empty_shadow_key_is_invalid() {
        let err = ModelConfig::from_toml_str("shadow_key_property = \"\"").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }
}

//! Provider configuration
//!
//! The API key comes from the provider configuration block (`falKey`) and
//! falls back to the `FAL_KEY` environment variable.

use std::collections::HashMap;
use std::fmt;

use falform_core::resource::Value;
use falform_core::schema::{AttributeSchema, AttributeType, ResourceSchema};

/// Environment variable consulted when no key is configured
pub const FAL_KEY_ENV: &str = "FAL_KEY";

/// Configuration for the fal provider
#[derive(Clone)]
pub struct FalConfig {
    /// Explicitly configured API key
    pub fal_key: Option<String>,
    /// Path or name of the fal CLI
    pub fal_bin: String,
    /// Path or name of git
    pub git_bin: String,
}

impl FalConfig {
    pub const DEFAULT_FAL_BIN: &'static str = "fal";
    pub const DEFAULT_GIT_BIN: &'static str = "git";

    /// Create a configuration with an explicit key
    pub fn with_key(key: impl Into<String>) -> Self {
        Self {
            fal_key: Some(key.into()),
            ..Self::default()
        }
    }

    /// Create a configuration from a provider configuration block
    pub fn from_attributes(attributes: &HashMap<String, Value>) -> Self {
        let get = |key: &str| {
            attributes
                .get(key)
                .and_then(Value::as_str)
                .map(str::to_string)
        };

        Self {
            fal_key: get("falKey"),
            fal_bin: get("falBin").unwrap_or_else(|| Self::DEFAULT_FAL_BIN.to_string()),
            git_bin: get("gitBin").unwrap_or_else(|| Self::DEFAULT_GIT_BIN.to_string()),
        }
    }

    /// Resolve the API key: configured value first, then `FAL_KEY`.
    ///
    /// Returns an empty string when neither is set; callers decide whether
    /// that is an error.
    pub fn resolve_key(&self) -> String {
        self.resolve_key_with(std::env::var(FAL_KEY_ENV).ok())
    }

    fn resolve_key_with(&self, from_env: Option<String>) -> String {
        match &self.fal_key {
            Some(key) if !key.is_empty() => key.clone(),
            _ => from_env.unwrap_or_default(),
        }
    }

    /// Schema of the provider configuration block
    pub fn schema() -> ResourceSchema {
        ResourceSchema::new("provider")
            .with_description("Configuration for the fal provider")
            .attribute(
                AttributeSchema::new("falKey", AttributeType::String)
                    .sensitive()
                    .with_description(
                        "The FAL API key for authentication. Can also be set via FAL_KEY environment variable.",
                    ),
            )
            .attribute(
                AttributeSchema::new("falBin", AttributeType::String)
                    .with_default(Value::String(Self::DEFAULT_FAL_BIN.to_string()))
                    .with_description("Path to the fal CLI"),
            )
            .attribute(
                AttributeSchema::new("gitBin", AttributeType::String)
                    .with_default(Value::String(Self::DEFAULT_GIT_BIN.to_string()))
                    .with_description("Path to git"),
            )
    }
}

impl Default for FalConfig {
    fn default() -> Self {
        Self {
            fal_key: None,
            fal_bin: Self::DEFAULT_FAL_BIN.to_string(),
            git_bin: Self::DEFAULT_GIT_BIN.to_string(),
        }
    }
}

impl fmt::Debug for FalConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FalConfig")
            .field("fal_key", &self.fal_key.as_ref().map(|_| "****"))
            .field("fal_bin", &self.fal_bin)
            .field("git_bin", &self.git_bin)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_key_wins_over_environment() {
        let config = FalConfig::with_key("explicit");
        assert_eq!(config.resolve_key_with(Some("env".to_string())), "explicit");
    }

    #[test]
    fn empty_key_falls_back_to_environment() {
        let config = FalConfig::with_key("");
        assert_eq!(config.resolve_key_with(Some("env".to_string())), "env");

        let config = FalConfig::default();
        assert_eq!(config.resolve_key_with(Some("env".to_string())), "env");
    }

    #[test]
    fn missing_everywhere_resolves_empty() {
        assert_eq!(FalConfig::default().resolve_key_with(None), "");
    }

    #[test]
    fn from_attributes_reads_config_block() {
        let mut attrs = HashMap::new();
        attrs.insert("falKey".to_string(), Value::String("k-123".to_string()));
        attrs.insert("falBin".to_string(), Value::String("/opt/fal".to_string()));

        let config = FalConfig::from_attributes(&attrs);
        assert_eq!(config.fal_key.as_deref(), Some("k-123"));
        assert_eq!(config.fal_bin, "/opt/fal");
        assert_eq!(config.git_bin, "git");
    }

    #[test]
    fn debug_masks_key() {
        let rendered = format!("{:?}", FalConfig::with_key("super-secret"));
        assert!(!rendered.contains("super-secret"));
    }
}

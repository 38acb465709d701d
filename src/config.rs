//! Flow-control configuration

use serde::{Deserialize, Serialize};

use crate::{classifier::ClassificationTable, error::ConfigError};

/// Configuration for the outbound delivery flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowConfig {
    /// Bounce classification rule table.
    #[serde(default)]
    pub classifier: ClassificationTable,

    /// Maximum delivery attempts before a retryable failure becomes a
    /// soft give-up.
    ///
    /// Default: 25 attempts
    #[serde(default = "defaults::max_attempts")]
    pub max_attempts: u32,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            classifier: ClassificationTable::default(),
            max_attempts: defaults::max_attempts(),
        }
    }
}

impl FlowConfig {
    /// Parse a configuration from RON text.
    ///
    /// # Errors
    /// [`ConfigError::Parse`] if the text is not valid configuration;
    /// nothing of a rejected configuration takes effect.
    pub fn from_ron_str(text: &str) -> Result<Self, ConfigError> {
        ron::Options::default()
            .with_default_extension(ron::extensions::Extensions::IMPLICIT_SOME)
            .from_str(text)
            .map_err(|error| ConfigError::Parse(error.to_string()))
    }
}

mod defaults {
    pub const fn max_attempts() -> u32 {
        25
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::{classifier::BounceCategory, domain::Domain};

    #[test]
    fn defaults() {
        let config = FlowConfig::default();
        assert_eq!(config.max_attempts, 25);
        assert!(!config.classifier.providers.is_empty());
    }

    #[test]
    fn parses_partial_config_with_field_defaults() {
        let config = FlowConfig::from_ron_str("(max_attempts: 3)").unwrap();
        assert_eq!(config.max_attempts, 3);
        // Omitting the classifier keeps the built-in provider table.
        assert_eq!(config.classifier.spam_signature, "spam");
        assert!(!config.classifier.providers.is_empty());
    }

    #[test]
    fn parses_full_config() {
        let config = FlowConfig::from_ron_str(
            r#"(
                max_attempts: 5,
                classifier: (
                    spam_signature: "spam",
                    providers: {
                        "yahoo.com": [
                            (pattern: "delivery error", category: InvalidRecipient),
                        ],
                    },
                ),
            )"#,
        )
        .unwrap();

        assert_eq!(config.max_attempts, 5);
        assert_eq!(
            config
                .classifier
                .classify(&Domain::new("yahoo.com"), "delivery error"),
            BounceCategory::InvalidRecipient
        );
    }

    #[test]
    fn rejects_malformed_config() {
        let error = FlowConfig::from_ron_str("(max_attempts: )").unwrap_err();
        assert!(matches!(error, ConfigError::Parse(_)));
    }
}

mod embedder;
mod event_bus;
mod llm;
mod orchestrator;
mod persistence;
mod quality;
mod server;

pub use embedder::*;
pub use event_bus::*;
pub use llm::*;
pub use orchestrator::*;
pub use persistence::*;
pub use quality::*;
pub use server::*;

use serde::{Deserialize, Serialize};
use std::fmt;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub embedder: EmbedderConfig,
    #[serde(default)]
    pub quality: QualityConfig,
    #[serde(default)]
    pub persistence: PersistenceConfig,
    #[serde(default)]
    pub event_bus: EventBusConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl Config {
    /// Validate the configuration and return a list of issues. Empty vec
    /// means the config is good; any `Error`-severity entry should abort
    /// startup.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if self.server.port == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "server.port".into(),
                message: "port must be greater than 0".into(),
            });
        }

        if self.llm.startup_policy == LlmStartupPolicy::RequireOne && self.llm.providers.is_empty()
        {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "llm.providers".into(),
                message: "startup_policy is require_one but no providers are configured".into(),
            });
        }

        let weights = &self.quality.health;
        let sum = weights.coherence + weights.contradiction + weights.r#loop + weights.citation;
        if (sum - 1.0).abs() > 1e-6 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "quality.health".into(),
                message: format!("health weights sum to {sum}, not 1.0; will be re-normalized"),
            });
        }

        if self.quality.loop_detection.min_repetitions < 2 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "quality.loop_detection.min_repetitions".into(),
                message: "min_repetitions must be >= 2".into(),
            });
        }

        if self.persistence.database_url.is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "persistence.database_url".into(),
                message: "database_url must not be empty".into(),
            });
        }

        errors
    }

    pub fn has_fatal_errors(errors: &[ConfigError]) -> bool {
        errors.iter().any(|e| e.severity == ConfigSeverity::Error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates_clean() {
        let cfg = Config::default();
        let errors = cfg.validate();
        assert!(!Config::has_fatal_errors(&errors), "{errors:?}");
    }

    #[test]
    fn zero_port_is_fatal() {
        let mut cfg = Config::default();
        cfg.server.port = 0;
        let errors = cfg.validate();
        assert!(Config::has_fatal_errors(&errors));
    }

    #[test]
    fn require_one_with_no_providers_is_fatal() {
        let mut cfg = Config::default();
        cfg.llm.startup_policy = LlmStartupPolicy::RequireOne;
        let errors = cfg.validate();
        assert!(Config::has_fatal_errors(&errors));
    }

    #[test]
    fn skewed_weights_is_warning_not_fatal() {
        let mut cfg = Config::default();
        cfg.quality.health.citation = 0.5;
        let errors = cfg.validate();
        assert!(!Config::has_fatal_errors(&errors));
        assert!(errors.iter().any(|e| e.field == "quality.health"));
    }

    #[test]
    fn config_error_display_format() {
        let e = ConfigError {
            severity: ConfigSeverity::Error,
            field: "x.y".into(),
            message: "broken".into(),
        };
        assert_eq!(format!("{e}"), "[ERROR] x.y: broken");
    }
}

//! Configuration loading (spec.md §6), grounded in the teacher's
//! `infrastructure/config/loader.rs`: a `figment` chain of programmatic
//! defaults → project YAML → local YAML override → `AEGIS_`-prefixed env
//! vars, extracted into a typed config then validated.

use std::collections::HashMap;

use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::domain::errors::ConfigError;
use crate::domain::models::AgentProfile;

/// `workflow.*` (spec.md §6).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WorkflowConfig {
    pub max_active_tasks: usize,
    pub max_active_thoughts: usize,
    pub round_delay_seconds: f64,
    pub max_ponder_rounds: u32,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            max_active_tasks: 10,
            max_active_thoughts: 50,
            round_delay_seconds: 1.0,
            max_ponder_rounds: 5,
        }
    }
}

/// `guardrails.*` (spec.md §6).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GuardrailsSection {
    pub entropy_threshold: f64,
    pub coherence_threshold: f64,
}

impl Default for GuardrailsSection {
    fn default() -> Self {
        Self {
            entropy_threshold: 0.65,
            coherence_threshold: 0.6,
        }
    }
}

impl From<&GuardrailsSection> for crate::services::guardrails::GuardrailsConfig {
    fn from(section: &GuardrailsSection) -> Self {
        Self {
            entropy_threshold: section.entropy_threshold,
            coherence_threshold: section.coherence_threshold,
        }
    }
}

/// `cirisnode.*` (spec.md §6): the only named external collaborator base
/// URL carried in config, consumed by whichever `CommunicationService`/
/// wise-authority adapter a deployment wires in.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct CirisNodeConfig {
    pub base_url: Option<String>,
}

/// `scheduler.*` (spec.md §6).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SchedulerSection {
    pub check_interval_seconds: u64,
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self { check_interval_seconds: 60 }
    }
}

/// `observer.*` (spec.md §6).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ObserverSection {
    pub passive_context_limit: usize,
}

impl Default for ObserverSection {
    fn default() -> Self {
        Self { passive_context_limit: 10 }
    }
}

/// `database.*`: not named in spec.md §6 directly but required to locate the
/// SQLite file the persistence adapter opens, matching the teacher's
/// `database.path` key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: ".aegis/aegis.db".to_string() }
    }
}

/// Top-level runtime configuration (spec.md §6). Every key the spec names is
/// a field here; all have defaults so `AegisConfig::default()` is a valid
/// (if inert) configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AegisConfig {
    pub workflow: WorkflowConfig,
    pub agent_mode: String,
    pub default_profile: String,
    pub agent_profiles: HashMap<String, AgentProfile>,
    pub guardrails: GuardrailsSection,
    pub cirisnode: CirisNodeConfig,
    pub scheduler: SchedulerSection,
    pub observer: ObserverSection,
    pub database: DatabaseConfig,
    pub logging: crate::infrastructure::logging::LogConfig,
}

impl Default for AegisConfig {
    fn default() -> Self {
        let mut agent_profiles = HashMap::new();
        agent_profiles.insert("default".to_string(), AgentProfile::default());
        Self {
            workflow: WorkflowConfig::default(),
            agent_mode: "cli".to_string(),
            default_profile: "default".to_string(),
            agent_profiles,
            guardrails: GuardrailsSection::default(),
            cirisnode: CirisNodeConfig::default(),
            scheduler: SchedulerSection::default(),
            observer: ObserverSection::default(),
            database: DatabaseConfig::default(),
            logging: crate::infrastructure::logging::LogConfig::default(),
        }
    }
}

impl AegisConfig {
    pub fn selected_profile(&self) -> Result<&AgentProfile, ConfigError> {
        self.agent_profiles
            .get(&self.default_profile)
            .ok_or_else(|| ConfigError::MissingField(format!("agent_profiles.{}", self.default_profile)))
    }
}

/// Loads and validates an `AegisConfig`, mirroring the teacher's
/// `ConfigLoader` (project config, optional local override, env highest
/// priority).
pub struct ConfigLoader;

impl ConfigLoader {
    /// Precedence (lowest to highest): programmatic defaults,
    /// `.aegis/config.yaml`, `.aegis/local.yaml`, `AEGIS_*` env vars.
    pub fn load() -> Result<AegisConfig, ConfigError> {
        let config: AegisConfig = Figment::new()
            .merge(Serialized::defaults(AegisConfig::default()))
            .merge(Yaml::file(".aegis/config.yaml"))
            .merge(Yaml::file(".aegis/local.yaml"))
            .merge(Env::prefixed("AEGIS_").split("__"))
            .extract()
            .map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        Self::validate(&config)?;
        Ok(config)
    }

    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<AegisConfig, ConfigError> {
        let config: AegisConfig = Figment::new()
            .merge(Serialized::defaults(AegisConfig::default()))
            .merge(Yaml::file(path.as_ref()))
            .extract()
            .map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        Self::validate(&config)?;
        Ok(config)
    }

    pub fn validate(config: &AegisConfig) -> Result<(), ConfigError> {
        if config.workflow.max_active_tasks == 0 {
            return Err(ConfigError::InvalidValue {
                field: "workflow.max_active_tasks".into(),
                value: "0".into(),
            });
        }
        if config.workflow.max_active_thoughts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "workflow.max_active_thoughts".into(),
                value: "0".into(),
            });
        }
        if !(0.0..=1.0).contains(&config.guardrails.entropy_threshold) {
            return Err(ConfigError::InvalidValue {
                field: "guardrails.entropy_threshold".into(),
                value: config.guardrails.entropy_threshold.to_string(),
            });
        }
        if !(0.0..=1.0).contains(&config.guardrails.coherence_threshold) {
            return Err(ConfigError::InvalidValue {
                field: "guardrails.coherence_threshold".into(),
                value: config.guardrails.coherence_threshold.to_string(),
            });
        }
        if config.scheduler.check_interval_seconds == 0 {
            return Err(ConfigError::InvalidValue {
                field: "scheduler.check_interval_seconds".into(),
                value: "0".into(),
            });
        }
        if config.database.path.is_empty() {
            return Err(ConfigError::MissingField("database.path".into()));
        }
        if !config.agent_profiles.contains_key(&config.default_profile) {
            return Err(ConfigError::MissingField(format!(
                "agent_profiles.{}",
                config.default_profile
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = AegisConfig::default();
        ConfigLoader::validate(&config).expect("default config should validate");
    }

    #[test]
    fn missing_default_profile_is_rejected() {
        let mut config = AegisConfig::default();
        config.default_profile = "nonexistent".to_string();
        let err = ConfigLoader::validate(&config).unwrap_err();
        assert!(matches!(err, ConfigError::MissingField(_)));
    }

    #[test]
    fn out_of_range_entropy_threshold_is_rejected() {
        let mut config = AegisConfig::default();
        config.guardrails.entropy_threshold = 1.5;
        let err = ConfigLoader::validate(&config).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn zero_check_interval_is_rejected() {
        let mut config = AegisConfig::default();
        config.scheduler.check_interval_seconds = 0;
        let err = ConfigLoader::validate(&config).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn yaml_parsing_overrides_defaults() {
        let yaml = r"
workflow:
  max_active_tasks: 20
  max_ponder_rounds: 3
guardrails:
  entropy_threshold: 0.8
scheduler:
  check_interval_seconds: 30
";
        let config: AegisConfig = Figment::new()
            .merge(Serialized::defaults(AegisConfig::default()))
            .merge(Yaml::string(yaml))
            .extract()
            .unwrap();
        assert_eq!(config.workflow.max_active_tasks, 20);
        assert_eq!(config.workflow.max_ponder_rounds, 3);
        assert_eq!(config.workflow.max_active_thoughts, 50, "unset fields keep their default");
        assert!((config.guardrails.entropy_threshold - 0.8).abs() < f64::EPSILON);
        assert_eq!(config.scheduler.check_interval_seconds, 30);
        ConfigLoader::validate(&config).unwrap();
    }

    #[test]
    fn hierarchical_merge_last_writer_wins() {
        let base = "workflow:\n  max_active_tasks: 5\n";
        let over = "workflow:\n  max_active_tasks: 15\n";
        let config: AegisConfig = Figment::new()
            .merge(Serialized::defaults(AegisConfig::default()))
            .merge(Yaml::string(base))
            .merge(Yaml::string(over))
            .extract()
            .unwrap();
        assert_eq!(config.workflow.max_active_tasks, 15);
    }
}

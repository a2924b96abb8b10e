use std::env;
use std::path::Path;

use lighthouse_client::LighthouseFlags;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::ConfigError;
use crate::types::{subject_id_errors, Subject};

/// How the idempotency gate keys its cooldown window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum GatePolicy {
    /// Every distinct trigger message (subject, variant, device) has its own window.
    #[default]
    PerMessage,
    /// All triggers for a subject share one window.
    PerSubject,
}

/// What a broadcast reports when some subjects fail to publish.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum FanOutPolicy {
    /// Every subject still runs; the broadcast fails if any subject failed.
    #[default]
    AllOrNothing,
    /// Failures are logged and counted; the broadcast succeeds.
    BestEffort,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GcsConfig {
    pub bucket_name: String,
}

/// Which top-level sections of an external catalog document are flattened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExternalSourceConfig {
    #[serde(default = "default_sections")]
    pub sections: Vec<String>,
}

impl Default for ExternalSourceConfig {
    fn default() -> Self {
        Self {
            sections: default_sections(),
        }
    }
}

fn default_sections() -> Vec<String> {
    ["help", "fmcTariffs", "mobileTariffs", "mobilePhones", "fixedTariffs"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_table_id() -> String {
    "reports".to_string()
}

/// Static configuration, loaded once at startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuditConfig {
    pub project_id: String,

    /// Subject catalog. May be empty when `SOURCE_URL` supplies it instead.
    #[serde(default)]
    pub source: Vec<Subject>,

    #[serde(default)]
    pub lighthouse_flags: LighthouseFlags,

    /// Cooldown between audits of the same trigger, in milliseconds.
    pub min_time_between_triggers: u64,

    pub dataset_id: String,

    #[serde(default = "default_table_id")]
    pub table_id: String,

    pub pubsub_topic_id: String,

    pub gcs: GcsConfig,

    #[serde(default)]
    pub gate_policy: GatePolicy,

    #[serde(default)]
    pub fan_out_policy: FanOutPolicy,

    #[serde(default)]
    pub external_source: ExternalSourceConfig,
}

impl AuditConfig {
    /// Read, parse and validate a config file. Any problem is fatal to startup.
    pub fn load(path: impl AsRef<Path>, environment: &Environment) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text, environment)
    }

    pub fn from_json(text: &str, environment: &Environment) -> Result<Self, ConfigError> {
        let config: AuditConfig = serde_json::from_str(text)?;
        config.validate(environment)?;
        Ok(config)
    }

    pub fn validate(&self, environment: &Environment) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        for (name, value) in [
            ("projectId", &self.project_id),
            ("datasetId", &self.dataset_id),
            ("tableId", &self.table_id),
            ("pubsubTopicId", &self.pubsub_topic_id),
            ("gcs.bucketName", &self.gcs.bucket_name),
        ] {
            if value.trim().is_empty() {
                errors.push(format!("{name} must not be empty"));
            }
        }

        if self.min_time_between_triggers == 0 {
            errors.push("minTimeBetweenTriggers must be greater than zero".to_string());
        } else if i64::try_from(self.min_time_between_triggers).is_err() {
            errors.push(format!("minTimeBetweenTriggers must be at most {}", i64::MAX));
        }

        if self.source.is_empty() && environment.source_url.is_none() {
            errors.push("source must list at least one subject when SOURCE_URL is unset".to_string());
        }

        errors.extend(subject_id_errors(&self.source, |i| format!("source[{i}].id")));
        for (i, subject) in self.source.iter().enumerate() {
            match url::Url::parse(&subject.url) {
                Ok(u) if u.scheme() == "http" || u.scheme() == "https" => {}
                _ => errors.push(format!("source[{i}].url \"{}\" is not an http(s) URL", subject.url)),
            }
        }

        if self.external_source.sections.is_empty() {
            errors.push("externalSource.sections must not be empty".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(errors))
        }
    }

    pub fn json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(AuditConfig)
    }

    pub fn log_summary(&self) {
        info!(
            project = self.project_id.as_str(),
            subjects = self.source.len(),
            dataset = self.dataset_id.as_str(),
            table = self.table_id.as_str(),
            topic = self.pubsub_topic_id.as_str(),
            bucket = self.gcs.bucket_name.as_str(),
            cooldown_ms = self.min_time_between_triggers,
            gate_policy = ?self.gate_policy,
            fan_out_policy = ?self.fan_out_policy,
            "Configuration validated successfully"
        );
    }
}

/// Settings supplied by the deployment environment rather than the config file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Environment {
    /// External catalog URL (`SOURCE_URL`).
    pub source_url: Option<String>,
    /// Sent verbatim as the `Authorization` header (`SOURCE_AUTH`).
    pub source_auth: Option<String>,
    /// Blocked-request patterns for third-party-blocked audits (`THIRDPARTY_TO_BLOCK`).
    pub third_party_to_block: Option<Vec<String>>,
}

impl Environment {
    pub fn from_env() -> Self {
        Self {
            source_url: non_empty_env("SOURCE_URL"),
            source_auth: non_empty_env("SOURCE_AUTH"),
            third_party_to_block: non_empty_env("THIRDPARTY_TO_BLOCK").map(|v| split_list(&v)),
        }
    }

    pub fn log_redacted(&self) {
        let source_auth = if self.source_auth.is_some() { "<set>" } else { "<unset>" };
        info!(
            source_url = self.source_url.as_deref().unwrap_or("<static>"),
            source_auth,
            third_party_patterns = self.third_party_to_block.as_ref().map_or(0, Vec::len),
            "Environment loaded"
        );
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Split a comma-separated list, dropping blanks.
pub fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r#"{
        "projectId": "lighthouse-monitor",
        "source": [
            {"id": "googlesearch", "url": "https://www.google.com/"},
            {"id": "ebay", "url": "https://www.ebay.com/"}
        ],
        "lighthouseFlags": {"output": ["html", "csv"], "emulatedFormFactor": "mobile"},
        "minTimeBetweenTriggers": 300000,
        "datasetId": "lighthouse",
        "pubsubTopicId": "launch-lighthouse",
        "gcs": {"bucketName": "lighthouse-reports"}
    }"#;

    fn env() -> Environment {
        Environment::default()
    }

    #[test]
    fn valid_config_loads_with_defaults() {
        let config = AuditConfig::from_json(VALID, &env()).unwrap();
        assert_eq!(config.source.len(), 2);
        assert_eq!(config.table_id, "reports");
        assert_eq!(config.gate_policy, GatePolicy::PerMessage);
        assert_eq!(config.fan_out_policy, FanOutPolicy::AllOrNothing);
        assert_eq!(config.external_source.sections.len(), 5);
        assert_eq!(config.lighthouse_flags.output, vec!["html", "csv"]);
    }

    #[test]
    fn missing_required_key_is_a_parse_error() {
        let mut value: serde_json::Value = serde_json::from_str(VALID).unwrap();
        value.as_object_mut().unwrap().remove("pubsubTopicId");
        let err = AuditConfig::from_json(&value.to_string(), &env()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
        assert!(err.to_string().contains("pubsubTopicId"));
    }

    #[test]
    fn subject_without_url_is_rejected() {
        let mut value: serde_json::Value = serde_json::from_str(VALID).unwrap();
        value["source"][0].as_object_mut().unwrap().remove("url");
        let err = AuditConfig::from_json(&value.to_string(), &env()).unwrap_err();
        assert!(err.to_string().contains("url"));
    }

    #[test]
    fn duplicate_and_reserved_ids_are_invalid() {
        let mut value: serde_json::Value = serde_json::from_str(VALID).unwrap();
        value["source"][1]["id"] = "googlesearch".into();
        value["source"]
            .as_array_mut()
            .unwrap()
            .push(serde_json::json!({"id": "all", "url": "https://example.com/"}));

        match AuditConfig::from_json(&value.to_string(), &env()).unwrap_err() {
            ConfigError::Invalid(errors) => {
                assert_eq!(errors.len(), 2);
                assert!(errors[0].contains("duplicated"));
                assert!(errors[1].contains("reserved"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn empty_source_requires_external_catalog() {
        let mut value: serde_json::Value = serde_json::from_str(VALID).unwrap();
        value["source"] = serde_json::json!([]);
        let text = value.to_string();

        assert!(AuditConfig::from_json(&text, &env()).is_err());

        let external = Environment {
            source_url: Some("https://cdn.example.com/catalog".to_string()),
            ..Default::default()
        };
        assert!(AuditConfig::from_json(&text, &external).is_ok());
    }

    #[test]
    fn id_with_separator_is_invalid() {
        let mut value: serde_json::Value = serde_json::from_str(VALID).unwrap();
        value["source"][1]["id"] = "my_site".into();

        match AuditConfig::from_json(&value.to_string(), &env()).unwrap_err() {
            ConfigError::Invalid(errors) => {
                assert_eq!(errors, vec!["source[1].id \"my_site\" must not contain '_'".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn cooldown_beyond_i64_is_invalid() {
        let mut value: serde_json::Value = serde_json::from_str(VALID).unwrap();
        value["minTimeBetweenTriggers"] = u64::MAX.into();
        let err = AuditConfig::from_json(&value.to_string(), &env()).unwrap_err();
        assert!(err.to_string().contains("minTimeBetweenTriggers must be at most"));
    }

    #[test]
    fn zero_cooldown_is_invalid() {
        let mut value: serde_json::Value = serde_json::from_str(VALID).unwrap();
        value["minTimeBetweenTriggers"] = 0.into();
        let err = AuditConfig::from_json(&value.to_string(), &env()).unwrap_err();
        assert!(err.to_string().contains("minTimeBetweenTriggers"));
    }

    #[test]
    fn policies_parse_from_camel_case() {
        let mut value: serde_json::Value = serde_json::from_str(VALID).unwrap();
        value["gatePolicy"] = "perSubject".into();
        value["fanOutPolicy"] = "bestEffort".into();
        let config = AuditConfig::from_json(&value.to_string(), &env()).unwrap();
        assert_eq!(config.gate_policy, GatePolicy::PerSubject);
        assert_eq!(config.fan_out_policy, FanOutPolicy::BestEffort);
    }

    #[test]
    fn load_reads_file_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, VALID).unwrap();
        assert!(AuditConfig::load(&path, &env()).is_ok());

        let missing = AuditConfig::load(dir.path().join("nope.json"), &env()).unwrap_err();
        assert!(matches!(missing, ConfigError::Io { .. }));
    }

    #[test]
    fn split_list_drops_blanks() {
        assert_eq!(
            split_list("googletagmanager.com, ,doubleclick.net,"),
            vec!["googletagmanager.com", "doubleclick.net"]
        );
    }

    #[test]
    fn schema_lists_required_keys() {
        let schema = serde_json::to_value(AuditConfig::json_schema()).unwrap();
        let required = schema["required"].as_array().unwrap();
        for key in ["projectId", "minTimeBetweenTriggers", "datasetId", "pubsubTopicId", "gcs"] {
            assert!(required.iter().any(|v| v == key), "{key} should be required");
        }
    }
}

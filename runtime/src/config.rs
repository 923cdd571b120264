//! Engine configuration
//!
//! Loaded from TOML. Every field has a default so an empty file is a valid
//! configuration: discover run-time channels under `propulsion` and keep them
//! alive with the default timings.
//!
//! ```toml
//! silence_delay_secs = 10
//! transmit_interval_secs = 5
//! companions = ["revolutions", "temperature"]
//!
//! [[channels]]
//! path = "propulsion.port.runTime"
//! source = "n2k-on-ve.can-socket.16"
//! name = "Port engine"
//! ```

use crate::error::ConfigError;
use heartwire_core::CompanionSpec;
use heartwire_core::path::MIN_SEGMENTS;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_SELF_LABEL: &str = "heartwire";
pub const DEFAULT_DOMAIN_ROOT: &str = "propulsion";

/// One explicitly configured channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub path: String,
    /// Authority (source label, numeric address or `label.address`) whose
    /// updates are treated as genuine. Unset means any source is accepted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ChannelConfig {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            source: None,
            name: None,
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// The configured authority, with blank strings treated as unset.
    pub fn source_filter(&self) -> Option<String> {
        self.source
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Source label stamped on every synthetic delta.
    pub self_label: String,
    /// Root segment every channel path must start with; also the discovery root.
    pub domain_root: String,
    pub min_segments: usize,
    pub silence_delay_secs: u64,
    pub transmit_interval_secs: u64,
    pub max_channels: usize,
    /// Run discovery, report, and do nothing else.
    pub discovery_only: bool,
    /// Companion field names (see the companion table) published with every replay.
    pub companions: Vec<String>,
    pub channels: Vec<ChannelConfig>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            self_label: DEFAULT_SELF_LABEL.to_string(),
            domain_root: DEFAULT_DOMAIN_ROOT.to_string(),
            min_segments: MIN_SEGMENTS,
            silence_delay_secs: 10,
            transmit_interval_secs: 5,
            max_channels: 8,
            discovery_only: false,
            companions: vec!["revolutions".to_string()],
            channels: Vec::new(),
        }
    }
}

impl EngineConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = toml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let input = std::fs::read_to_string(path)?;
        Self::from_toml_str(&input)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.self_label.trim().is_empty() {
            return Err(ConfigError::Invalid("self_label must not be empty".into()));
        }
        if self.domain_root.trim().is_empty() || self.domain_root.contains('.') {
            return Err(ConfigError::Invalid(format!(
                "domain_root `{}` must be a single path segment",
                self.domain_root
            )));
        }
        if self.min_segments < 2 {
            return Err(ConfigError::Invalid("min_segments must be at least 2".into()));
        }
        if self.silence_delay_secs == 0 {
            return Err(ConfigError::Invalid("silence_delay_secs must be positive".into()));
        }
        if self.transmit_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "transmit_interval_secs must be positive".into(),
            ));
        }
        if self.max_channels == 0 {
            return Err(ConfigError::Invalid("max_channels must be positive".into()));
        }
        if let Some(unknown) = self
            .companions
            .iter()
            .find(|name| CompanionSpec::lookup(name).is_none())
        {
            return Err(ConfigError::Invalid(format!(
                "unknown companion field `{unknown}`"
            )));
        }
        Ok(())
    }

    pub fn silence_delay(&self) -> Duration {
        Duration::from_secs(self.silence_delay_secs)
    }

    pub fn transmit_interval(&self) -> Duration {
        Duration::from_secs(self.transmit_interval_secs)
    }

    /// Companion specs in configured order, duplicates and unknown names dropped.
    pub fn companion_specs(&self) -> Vec<&'static CompanionSpec> {
        let mut specs: Vec<&'static CompanionSpec> = Vec::new();
        for spec in self.companions.iter().filter_map(|n| CompanionSpec::lookup(n)) {
            if !specs.iter().any(|s| s.name == spec.name) {
                specs.push(spec);
            }
        }
        specs
    }

    pub fn with_channel(mut self, channel: ChannelConfig) -> Self {
        self.channels.push(channel);
        self
    }

    pub fn with_companions<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.companions = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_timing(mut self, silence_delay_secs: u64, transmit_interval_secs: u64) -> Self {
        self.silence_delay_secs = silence_delay_secs;
        self.transmit_interval_secs = transmit_interval_secs;
        self
    }

    pub fn discovery_only(mut self) -> Self {
        self.discovery_only = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.silence_delay(), Duration::from_secs(10));
        assert_eq!(config.transmit_interval(), Duration::from_secs(5));
    }

    #[test]
    fn test_parse_channels() {
        let config = EngineConfig::from_toml_str(
            r#"
            silence_delay_secs = 15
            companions = ["revolutions", "temperature", "revolutions"]

            [[channels]]
            path = "propulsion.port.runTime"
            source = " n2k.16 "
            name = "Port"

            [[channels]]
            path = "propulsion.stbd.runTime"
            source = ""
            "#,
        )
        .unwrap();

        assert_eq!(config.silence_delay_secs, 15);
        assert_eq!(config.channels.len(), 2);
        assert_eq!(config.channels[0].source_filter().as_deref(), Some("n2k.16"));
        assert_eq!(config.channels[1].source_filter(), None);
        let names: Vec<_> = config.companion_specs().iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["revolutions", "temperature"]);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        assert!(matches!(
            EngineConfig::from_toml_str("transmit_interval_secs = 0"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            EngineConfig::from_toml_str("companions = [\"torque\"]"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            EngineConfig::from_toml_str("self_label = \"  \""),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            EngineConfig::from_toml_str("silence_delay_secs = \"ten\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "max_channels = 2\ndiscovery_only = true").unwrap();

        let config = EngineConfig::load(file.path()).unwrap();
        assert_eq!(config.max_channels, 2);
        assert!(config.discovery_only);
    }
}

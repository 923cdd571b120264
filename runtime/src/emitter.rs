//! Synthetic Emitter
//!
//! Builds the replay delta for a silent channel and publishes it under the
//! engine's own source label.

use crate::channel::MonitoredChannel;
use heartwire_core::{BusAdapter, BusError, CompanionKind, Delta, SourceMeta};
use serde_json::{Value, json};
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
pub struct SyntheticEmitter {
    source: SourceMeta,
}

impl SyntheticEmitter {
    pub fn new(self_label: &str) -> Self {
        Self {
            source: SourceMeta::labeled(self_label.trim()),
        }
    }

    /// Primary value verbatim, active companions zeroed, passive companions at
    /// their last genuine reading. Passive fields never observed are omitted.
    pub fn build(
        &self,
        channel: &MonitoredChannel,
        last_value: &Value,
        last_known_companion: &BTreeMap<String, Value>,
    ) -> Delta {
        let mut delta = Delta::new(self.source.clone());
        delta.push(channel.primary.as_str(), last_value.clone());

        for field in &channel.companions {
            match field.kind {
                CompanionKind::Active => delta.push(&field.path, json!(0)),
                CompanionKind::Passive => {
                    if let Some(value) = last_known_companion.get(&field.name) {
                        delta.push(&field.path, value.clone());
                    }
                }
            }
        }
        delta
    }

    /// Publish once. Failures are logged and returned; the caller's next tick
    /// is the retry.
    pub async fn emit(&self, bus: &dyn BusAdapter, delta: Delta) -> Result<(), BusError> {
        let values = delta.values.len();
        match bus.publish(delta).await {
            Ok(()) => {
                tracing::debug!(values, "Published synthetic delta");
                Ok(())
            }
            Err(err) => {
                tracing::warn!(error = %err, "Failed to publish synthetic delta");
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChannelConfig;
    use heartwire_core::path::MIN_SEGMENTS;
    use heartwire_core::{ChannelPath, CompanionSpec, MemoryBus};

    fn channel(companions: &[&str]) -> MonitoredChannel {
        let path =
            ChannelPath::parse("propulsion.port.runTime", "propulsion", MIN_SEGMENTS).unwrap();
        let specs: Vec<_> = companions
            .iter()
            .filter_map(|n| CompanionSpec::lookup(n))
            .collect();
        MonitoredChannel::new(path, &ChannelConfig::new("propulsion.port.runTime"), &specs)
    }

    #[test]
    fn test_build_zeroes_active_and_replays_passive() {
        let emitter = SyntheticEmitter::new(" heartwire ");
        let channel = channel(&["revolutions", "temperature", "oilTemperature"]);
        let mut known = BTreeMap::new();
        known.insert("temperature".to_string(), json!(351.2));

        let delta = emitter.build(&channel, &json!(7200), &known);

        assert_eq!(delta.source, SourceMeta::labeled("heartwire"));
        assert_eq!(delta.value_of("propulsion.port.runTime"), Some(&json!(7200)));
        assert_eq!(delta.value_of("propulsion.port.revolutions"), Some(&json!(0)));
        assert_eq!(delta.value_of("propulsion.port.temperature"), Some(&json!(351.2)));
        assert_eq!(delta.value_of("propulsion.port.oilTemperature"), None);
        assert_eq!(delta.values.len(), 3);
    }

    #[tokio::test]
    async fn test_emit_reports_failure() {
        let bus = MemoryBus::new();
        let emitter = SyntheticEmitter::new("heartwire");
        let delta = emitter.build(&channel(&[]), &json!(1), &BTreeMap::new());

        bus.set_available(false);
        assert!(emitter.emit(&bus, delta.clone()).await.is_err());
        bus.set_available(true);
        assert!(emitter.emit(&bus, delta).await.is_ok());
        assert_eq!(bus.published().len(), 1);
    }
}

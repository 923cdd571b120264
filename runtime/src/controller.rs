//! Engine Controller
//!
//! Owns the channel collection. `start` runs discovery, merges it with the
//! explicit configuration, validates every entry, restores last values and
//! spawns one worker per channel. `stop` cancels every worker and waits for
//! it, so no timer survives the call.
//!
//! Nothing here is global: several engines can share one bus (or not) and run
//! side by side.

use crate::arbiter::{SourceArbiter, Verdict};
use crate::channel::{ChannelMachine, MonitoredChannel, Timing};
use crate::config::{ChannelConfig, EngineConfig};
use crate::discovery::{self, DiscoveredChannel};
use crate::error::EngineError;
use crate::status::{ChannelSnapshot, EngineHealth, EngineStatus};
use crate::worker::ChannelWorker;
use heartwire_core::{BusAdapter, BusError, ChannelPath, SourceMeta, Subscription, leaf_value};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

struct ChannelHandle {
    id: String,
    status: watch::Receiver<ChannelSnapshot>,
    task: JoinHandle<()>,
}

pub struct Engine {
    bus: Arc<dyn BusAdapter>,
    cancel: CancellationToken,
    channels: Vec<ChannelHandle>,
    discovered: Vec<DiscoveredChannel>,
    skipped: Vec<String>,
    health: EngineHealth,
}

impl Engine {
    pub fn new(bus: Arc<dyn BusAdapter>) -> Self {
        Self {
            bus,
            cancel: CancellationToken::new(),
            channels: Vec::new(),
            discovered: Vec::new(),
            skipped: Vec::new(),
            health: EngineHealth::Stopped,
        }
    }

    /// Start (or restart) the engine with `config`.
    ///
    /// Only an invalid configuration is an error. Bad channel entries and
    /// failed subscriptions are skipped and reported through [`Engine::status`].
    pub async fn start(&mut self, config: EngineConfig) -> Result<(), EngineError> {
        config.validate()?;
        self.stop().await;
        self.cancel = CancellationToken::new();

        let mut bus_unavailable = false;
        self.discovered = match self.bus.read_current(&config.domain_root).await {
            Ok(tree) => discovery::discover(tree.as_ref(), &config.domain_root),
            Err(err) => {
                tracing::warn!(
                    error = %err,
                    root = %config.domain_root,
                    "Discovery could not read the state tree"
                );
                bus_unavailable |= matches!(err, BusError::Unavailable(_));
                Vec::new()
            }
        };

        if config.discovery_only {
            for candidate in &self.discovered {
                tracing::info!(
                    path = %candidate.path,
                    unit = %candidate.unit,
                    source = %candidate.source,
                    "Discovery candidate"
                );
            }
            tracing::info!(
                count = self.discovered.len(),
                "Discovery-only mode, no channels created"
            );
            self.health = if bus_unavailable {
                EngineHealth::Degraded
            } else {
                EngineHealth::DiscoveryOnly
            };
            return Ok(());
        }

        let entries = merge_entries(&config.channels, &self.discovered);
        let channels = self.build_channels(&config, entries);

        let timing = Timing {
            silence_delay: config.silence_delay(),
            transmit_interval: config.transmit_interval(),
        };
        for channel in channels {
            let path = channel.primary.to_string();
            match self.spawn_channel(channel, &config.self_label, timing).await {
                Ok(handle) => self.channels.push(handle),
                Err(err) => {
                    tracing::error!(
                        path = %path,
                        error = %err,
                        "Failed to subscribe channel, skipping"
                    );
                    bus_unavailable |= matches!(err, BusError::Unavailable(_));
                    self.skipped.push(format!("{path}: {err}"));
                }
            }
        }

        self.health = if bus_unavailable && self.channels.is_empty() {
            EngineHealth::Degraded
        } else {
            EngineHealth::Running
        };
        tracing::info!(
            channels = self.channels.len(),
            skipped = self.skipped.len(),
            health = ?self.health,
            "Engine started"
        );
        Ok(())
    }

    /// Cancel every channel and wait for its worker to finish. Idempotent.
    pub async fn stop(&mut self) {
        self.cancel.cancel();
        let stopping = self.channels.len();
        for handle in self.channels.drain(..) {
            if let Err(err) = handle.task.await {
                tracing::error!(
                    channel = %handle.id,
                    error = %err,
                    "Channel worker ended abnormally"
                );
            }
        }
        if stopping > 0 {
            tracing::info!(channels = stopping, "Engine stopped");
        }
        self.discovered.clear();
        self.skipped.clear();
        self.health = EngineHealth::Stopped;
    }

    pub fn health(&self) -> EngineHealth {
        self.health
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn discovered(&self) -> &[DiscoveredChannel] {
        &self.discovered
    }

    pub fn status(&self) -> EngineStatus {
        let channels: Vec<ChannelSnapshot> = self
            .channels
            .iter()
            .map(|handle| handle.status.borrow().clone())
            .collect();
        EngineStatus {
            health: self.health,
            active_channels: channels.len(),
            channels,
            discovered: self.discovered.clone(),
            skipped: self.skipped.clone(),
        }
    }

    /// Validate, de-duplicate and cap the merged entries.
    fn build_channels(
        &mut self,
        config: &EngineConfig,
        entries: Vec<ChannelConfig>,
    ) -> Vec<MonitoredChannel> {
        let specs = config.companion_specs();
        let mut seen_paths = HashSet::new();
        let mut seen_ids = HashSet::new();
        let mut channels = Vec::new();

        for entry in entries {
            let parsed =
                ChannelPath::parse(&entry.path, &config.domain_root, config.min_segments);
            let path = match parsed {
                Ok(path) => path,
                Err(err) => {
                    tracing::warn!(error = %err, "Skipping invalid channel entry");
                    self.skipped.push(err.to_string());
                    continue;
                }
            };
            if !seen_paths.insert(path.to_string()) {
                tracing::warn!(path = %path, "Skipping duplicate channel entry");
                self.skipped.push(format!("{path}: duplicate entry"));
                continue;
            }
            if channels.len() >= config.max_channels {
                tracing::warn!(path = %path, max = config.max_channels, "Channel limit reached");
                self.skipped
                    .push(format!("{path}: channel limit {} reached", config.max_channels));
                continue;
            }

            let mut channel = MonitoredChannel::new(path, &entry, &specs);
            if !seen_ids.insert(channel.id.clone()) {
                channel.id = format!("{}.{}", channel.id, channel.primary.leaf());
                seen_ids.insert(channel.id.clone());
            }
            channels.push(channel);
        }
        channels
    }

    async fn spawn_channel(
        &self,
        channel: MonitoredChannel,
        self_label: &str,
        timing: Timing,
    ) -> Result<ChannelHandle, BusError> {
        let primary = self.bus.subscribe(channel.primary.as_str()).await?;
        let mut companions: Vec<Subscription> = Vec::with_capacity(channel.companions.len());
        for field in &channel.companions {
            match self.bus.subscribe(&field.path).await {
                Ok(sub) => companions.push(sub),
                Err(err) => {
                    tracing::warn!(
                        path = %field.path,
                        error = %err,
                        "Companion subscription failed, replaying without live updates"
                    );
                }
            }
        }

        let restored = self
            .restore_value(&channel, &SourceArbiter::new(self_label))
            .await;
        let id = channel.id.clone();
        let span =
            tracing::info_span!("channel", channel.id = %id, channel.path = %channel.primary);
        tracing::info!(
            channel = %id,
            name = channel.display_name(),
            restored = ?restored,
            authority = ?channel.source_filter,
            companions = channel.companions.len(),
            "Monitoring channel"
        );

        let machine =
            ChannelMachine::new(channel, self_label, timing, restored, Instant::now());
        let (status_tx, status_rx) = watch::channel(machine.snapshot());
        let worker = ChannelWorker {
            machine,
            bus: self.bus.clone(),
            primary,
            companions,
            status: status_tx,
            cancel: self.cancel.child_token(),
        };
        let task = tokio::spawn(worker.run().instrument(span));

        Ok(ChannelHandle {
            id,
            status: status_rx,
            task,
        })
    }

    /// Current bus value first, persisted value second. Non-numeric values are
    /// ignored, and so is a current value from a source the channel does not trust.
    async fn restore_value(
        &self,
        channel: &MonitoredChannel,
        arbiter: &SourceArbiter,
    ) -> Option<Value> {
        match self.bus.read_current(channel.primary.as_str()).await {
            Ok(Some(node)) if leaf_value(&node).is_number() => {
                let source = node
                    .get("$source")
                    .and_then(Value::as_str)
                    .map(SourceMeta::from_ref);
                // The engine's own replay carries the last genuine value verbatim.
                match arbiter.classify(channel.source_filter.as_deref(), source.as_ref()) {
                    Verdict::Unauthorized => {
                        tracing::info!(
                            source = ?source,
                            "Current value is from an unauthorized source, not restoring it"
                        );
                    }
                    Verdict::SelfAuthored | Verdict::Authorized | Verdict::Permissive => {
                        return Some(leaf_value(&node).clone());
                    }
                }
            }
            Ok(_) => {}
            Err(err) => {
                tracing::debug!(error = %err, "Could not read current value");
            }
        }

        match self.bus.read_persisted(&channel.persist_key()).await {
            Ok(Some(value)) if value.is_number() => Some(value),
            Ok(_) => None,
            Err(err) => {
                tracing::debug!(error = %err, "Could not read persisted value");
                None
            }
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("health", &self.health)
            .field("channels", &self.channels.len())
            .finish()
    }
}

/// Explicit entries win. Discovered paths are used only when nothing is
/// configured explicitly; a partial explicit list is never augmented.
pub fn merge_entries(
    explicit: &[ChannelConfig],
    discovered: &[DiscoveredChannel],
) -> Vec<ChannelConfig> {
    if !explicit.is_empty() {
        return explicit.to_vec();
    }
    discovered
        .iter()
        .map(|candidate| ChannelConfig::new(candidate.path.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(path: &str) -> DiscoveredChannel {
        DiscoveredChannel {
            path: path.into(),
            unit: "s".into(),
            source: "n2k.16".into(),
        }
    }

    #[test]
    fn test_merge_prefers_explicit_configuration() {
        let explicit =
            vec![ChannelConfig::new("propulsion.port.runTime").with_source("16")];
        let discovered = vec![
            candidate("propulsion.port.runTime"),
            candidate("propulsion.stbd.runTime"),
        ];

        let merged = merge_entries(&explicit, &discovered);
        assert_eq!(merged, explicit);
    }

    #[test]
    fn test_merge_falls_back_to_discovery() {
        let discovered = vec![candidate("propulsion.port.runTime")];
        let merged = merge_entries(&[], &discovered);
        assert_eq!(merged, vec![ChannelConfig::new("propulsion.port.runTime")]);
        assert_eq!(merged[0].source_filter(), None);
    }
}

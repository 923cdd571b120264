//! Channel State Machine
//!
//! One [`ChannelMachine`] per monitored channel. It is a plain synchronous
//! value: the worker task feeds it events and timer expirations and acts on
//! what it returns. The only timer a channel has is the instant stored inside
//! its current [`Phase`], so a silence deadline and an injection tick can never
//! be armed at the same time.
//!
//! ```text
//!   restored value ──▶ Live ──deadline──▶ Injecting ──tick──▶ Injecting ...
//!                       ▲  │                  │
//!                       │  └─deadline, no value──▶ SilentPending
//!                       │                     │        │
//!                       └──── genuine update ─┴────────┘
//!   no value ──▶ SilentPending
//! ```

use crate::arbiter::{SourceArbiter, Verdict};
use crate::config::ChannelConfig;
use crate::emitter::SyntheticEmitter;
use crate::status::ChannelSnapshot;
use chrono::{DateTime, Utc};
use heartwire_core::{BusEvent, ChannelPath, CompanionField, CompanionKind, CompanionSpec, Delta};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

/// Prefix of the persisted-store key holding a channel's last genuine value.
pub const PERSIST_KEY_PREFIX: &str = "heartwire.lastValue";

/// Static description of a monitored channel, fixed at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitoredChannel {
    pub id: String,
    pub name: Option<String>,
    pub primary: ChannelPath,
    pub companions: Vec<CompanionField>,
    pub source_filter: Option<String>,
}

impl MonitoredChannel {
    pub fn new(primary: ChannelPath, config: &ChannelConfig, specs: &[&CompanionSpec]) -> Self {
        let companions = specs
            .iter()
            .map(|spec| CompanionField::resolve(spec, &primary))
            .collect();
        Self {
            id: primary.id(),
            name: config.name.clone(),
            source_filter: config.source_filter(),
            companions,
            primary,
        }
    }

    pub fn persist_key(&self) -> String {
        format!("{PERSIST_KEY_PREFIX}.{}", self.id)
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }

    pub fn companion_by_path(&self, path: &str) -> Option<&CompanionField> {
        self.companions.iter().find(|c| c.path == path)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelState {
    Live,
    SilentPending,
    Injecting,
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ChannelState::Live => "live",
            ChannelState::SilentPending => "silent",
            ChannelState::Injecting => "injecting",
        })
    }
}

/// Tagged state; the instant is the one active timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Live { deadline: Instant },
    SilentPending,
    Injecting { next_tick: Instant },
}

#[derive(Debug, Clone, Copy)]
pub struct Timing {
    pub silence_delay: Duration,
    pub transmit_interval: Duration,
}

/// What happened to an inbound event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ingest {
    Accepted,
    /// The engine's own synthetic value coming back.
    SelfAuthored,
    Unauthorized,
    /// Not a number. Ignored for state purposes.
    NotNumeric,
    /// A path this channel does not monitor.
    Unknown,
}

/// Result of a timer expiration.
#[derive(Debug, Clone, PartialEq)]
pub enum Wake {
    /// Woken early or by a stale timer; nothing to do.
    Idle,
    /// Silence detected with nothing to replay.
    Silenced,
    /// Silence detected; first replay delta.
    StartedInjecting(Delta),
    Tick(Delta),
}

pub struct ChannelMachine {
    channel: MonitoredChannel,
    arbiter: SourceArbiter,
    emitter: SyntheticEmitter,
    timing: Timing,
    phase: Phase,
    last_value: Option<Value>,
    last_seen: Option<DateTime<Utc>>,
    last_known_companion: BTreeMap<String, Value>,
    known_sources: BTreeSet<String>,
    injections: u64,
    publish_failures: u64,
}

impl ChannelMachine {
    /// A restored numeric value arms the silence window immediately, so a
    /// channel whose transmitter is already off at startup still gets replayed.
    pub fn new(
        channel: MonitoredChannel,
        self_label: &str,
        timing: Timing,
        restored: Option<Value>,
        now: Instant,
    ) -> Self {
        let last_value = restored.filter(Value::is_number);
        let phase = match last_value {
            Some(_) => Phase::Live {
                deadline: now + timing.silence_delay,
            },
            None => Phase::SilentPending,
        };

        Self {
            channel,
            arbiter: SourceArbiter::new(self_label),
            emitter: SyntheticEmitter::new(self_label),
            timing,
            phase,
            last_value,
            last_seen: None,
            last_known_companion: BTreeMap::new(),
            known_sources: BTreeSet::new(),
            injections: 0,
            publish_failures: 0,
        }
    }

    pub fn channel(&self) -> &MonitoredChannel {
        &self.channel
    }

    pub fn emitter(&self) -> &SyntheticEmitter {
        &self.emitter
    }

    pub fn state(&self) -> ChannelState {
        match self.phase {
            Phase::Live { .. } => ChannelState::Live,
            Phase::SilentPending => ChannelState::SilentPending,
            Phase::Injecting { .. } => ChannelState::Injecting,
        }
    }

    pub fn last_value(&self) -> Option<&Value> {
        self.last_value.as_ref()
    }

    pub fn known_sources(&self) -> &BTreeSet<String> {
        &self.known_sources
    }

    pub fn last_known_companion(&self, field: &str) -> Option<&Value> {
        self.last_known_companion.get(field)
    }

    /// The single instant at which this channel next needs attention.
    pub fn next_wakeup(&self) -> Option<Instant> {
        match self.phase {
            Phase::Live { deadline } => Some(deadline),
            Phase::SilentPending => None,
            Phase::Injecting { next_tick } => Some(next_tick),
        }
    }

    /// Handle an update of the primary path.
    pub fn on_primary(&mut self, event: &BusEvent, now: Instant) -> Ingest {
        let verdict = self
            .arbiter
            .classify(self.channel.source_filter.as_deref(), event.source.as_ref());
        if verdict == Verdict::SelfAuthored {
            return Ingest::SelfAuthored;
        }

        if let Some(identity) = event.source.as_ref().and_then(|s| s.identity()) {
            if self.known_sources.insert(identity.clone()) {
                tracing::info!(source = %identity, ?verdict, "New source observed");
            }
        }

        if !verdict.accepts() {
            tracing::debug!(source = ?event.source, "Ignoring update from unauthorized source");
            return Ingest::Unauthorized;
        }
        if !event.value.is_number() {
            tracing::debug!(value = %event.value, "Ignoring non-numeric update");
            return Ingest::NotNumeric;
        }

        if let Phase::Injecting { .. } = self.phase {
            tracing::info!(injections = self.injections, "Genuine updates resumed");
        }
        self.last_value = Some(event.value.clone());
        self.last_seen = Some(event.timestamp);
        self.phase = Phase::Live {
            deadline: now + self.timing.silence_delay,
        };
        Ingest::Accepted
    }

    /// Handle an update of one of the companion paths. Never touches timers.
    pub fn on_companion(&mut self, event: &BusEvent) -> Ingest {
        let Some(field) = self.channel.companion_by_path(&event.path) else {
            return Ingest::Unknown;
        };
        match self
            .arbiter
            .classify(self.channel.source_filter.as_deref(), event.source.as_ref())
        {
            Verdict::SelfAuthored => return Ingest::SelfAuthored,
            Verdict::Unauthorized => return Ingest::Unauthorized,
            Verdict::Authorized | Verdict::Permissive => {}
        }
        if !event.value.is_number() {
            return Ingest::NotNumeric;
        }
        if field.kind == CompanionKind::Passive {
            self.last_known_companion
                .insert(field.name.clone(), event.value.clone());
        }
        Ingest::Accepted
    }

    /// Handle expiry of the current phase's timer.
    pub fn on_timer(&mut self, now: Instant) -> Wake {
        match self.phase {
            Phase::Live { deadline } if now >= deadline => match self.build_delta() {
                Some(delta) => {
                    tracing::info!(
                        value = ?self.last_value,
                        silence = ?self.timing.silence_delay,
                        "Channel silent, starting injection"
                    );
                    self.phase = Phase::Injecting {
                        next_tick: now + self.timing.transmit_interval,
                    };
                    self.injections += 1;
                    Wake::StartedInjecting(delta)
                }
                None => {
                    self.phase = Phase::SilentPending;
                    Wake::Silenced
                }
            },
            Phase::Injecting { next_tick } if now >= next_tick => match self.build_delta() {
                Some(delta) => {
                    let mut following = next_tick + self.timing.transmit_interval;
                    if following <= now {
                        following = now + self.timing.transmit_interval;
                    }
                    self.phase = Phase::Injecting {
                        next_tick: following,
                    };
                    self.injections += 1;
                    Wake::Tick(delta)
                }
                None => {
                    self.phase = Phase::SilentPending;
                    Wake::Silenced
                }
            },
            _ => Wake::Idle,
        }
    }

    pub fn record_publish_failure(&mut self) {
        self.publish_failures += 1;
    }

    pub fn snapshot(&self) -> ChannelSnapshot {
        ChannelSnapshot {
            id: self.channel.id.clone(),
            name: self.channel.name.clone(),
            path: self.channel.primary.to_string(),
            state: self.state(),
            last_value: self.last_value.clone(),
            last_seen: self.last_seen,
            source_filter: self.channel.source_filter.clone(),
            known_sources: self.known_sources.iter().cloned().collect(),
            injections: self.injections,
            publish_failures: self.publish_failures,
        }
    }

    fn build_delta(&self) -> Option<Delta> {
        let value = self.last_value.as_ref()?;
        Some(
            self.emitter
                .build(&self.channel, value, &self.last_known_companion),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use heartwire_core::SourceMeta;
    use heartwire_core::path::MIN_SEGMENTS;
    use serde_json::json;

    const PRIMARY: &str = "propulsion.port.runTime";
    const D: Duration = Duration::from_secs(10);
    const I: Duration = Duration::from_secs(5);

    fn machine(filter: Option<&str>, restored: Option<Value>, now: Instant) -> ChannelMachine {
        let mut config = ChannelConfig::new(PRIMARY);
        config.source = filter.map(str::to_string);
        let specs: Vec<_> = ["revolutions", "temperature"]
            .iter()
            .filter_map(|n| CompanionSpec::lookup(n))
            .collect();
        let path = ChannelPath::parse(PRIMARY, "propulsion", MIN_SEGMENTS).unwrap();
        let channel = MonitoredChannel::new(path, &config, &specs);
        let timing = Timing {
            silence_delay: D,
            transmit_interval: I,
        };
        ChannelMachine::new(channel, "heartwire", timing, restored, now)
    }

    fn update(path: &str, value: Value, source: &str) -> BusEvent {
        BusEvent::new(path, value, Some(SourceMeta::from_ref(source)))
    }

    #[test]
    fn test_starts_silent_without_value() {
        let t0 = Instant::now();
        let mut m = machine(None, None, t0);
        assert_eq!(m.state(), ChannelState::SilentPending);
        assert_eq!(m.next_wakeup(), None);
        assert_eq!(m.on_timer(t0 + D * 100), Wake::Idle);
        assert_eq!(m.state(), ChannelState::SilentPending);
    }

    #[test]
    fn test_restored_value_arms_silence_window() {
        let t0 = Instant::now();
        let mut m = machine(None, Some(json!(3600)), t0);
        assert_eq!(m.state(), ChannelState::Live);
        assert_eq!(m.next_wakeup(), Some(t0 + D));

        assert_eq!(m.on_timer(t0 + D - Duration::from_millis(1)), Wake::Idle);
        let Wake::StartedInjecting(delta) = m.on_timer(t0 + D) else {
            panic!("expected injection to start");
        };
        assert_eq!(delta.value_of(PRIMARY), Some(&json!(3600)));
        assert_eq!(m.state(), ChannelState::Injecting);
        assert_eq!(m.next_wakeup(), Some(t0 + D + I));
    }

    #[test]
    fn test_restored_non_numeric_value_is_discarded() {
        let m = machine(None, Some(json!("3600")), Instant::now());
        assert_eq!(m.state(), ChannelState::SilentPending);
        assert!(m.last_value().is_none());
    }

    #[test]
    fn test_injection_ticks_at_interval() {
        let t0 = Instant::now();
        let mut m = machine(None, None, t0);
        assert_eq!(m.on_primary(&update(PRIMARY, json!(100), "n2k.16"), t0), Ingest::Accepted);

        assert!(matches!(m.on_timer(t0 + D), Wake::StartedInjecting(_)));
        assert_eq!(m.on_timer(t0 + D + I / 2), Wake::Idle);
        let Wake::Tick(delta) = m.on_timer(t0 + D + I) else {
            panic!("expected tick");
        };
        assert_eq!(delta.value_of(PRIMARY), Some(&json!(100)));
        assert_eq!(m.next_wakeup(), Some(t0 + D + I * 2));
        assert_eq!(m.snapshot().injections, 2);
    }

    #[test]
    fn test_genuine_update_cancels_injection() {
        let t0 = Instant::now();
        let mut m = machine(None, Some(json!(1)), t0);
        assert!(matches!(m.on_timer(t0 + D), Wake::StartedInjecting(_)));

        let resumed = t0 + D + Duration::from_secs(2);
        assert_eq!(m.on_primary(&update(PRIMARY, json!(2), "n2k.16"), resumed), Ingest::Accepted);
        assert_eq!(m.state(), ChannelState::Live);
        assert_eq!(m.next_wakeup(), Some(resumed + D));
        // The tick that would have fired at t0+D+I is gone.
        assert_eq!(m.on_timer(t0 + D + I), Wake::Idle);
        assert_eq!(m.last_value(), Some(&json!(2)));
    }

    #[test]
    fn test_self_authored_update_is_ignored() {
        let t0 = Instant::now();
        let mut m = machine(None, Some(json!(5)), t0);
        let later = t0 + Duration::from_secs(9);

        let echo = update(PRIMARY, json!(5), "heartwire");
        assert_eq!(m.on_primary(&echo, later), Ingest::SelfAuthored);
        assert_eq!(m.next_wakeup(), Some(t0 + D));
        assert!(m.known_sources().is_empty());
    }

    #[test]
    fn test_unauthorized_source_is_recorded_only() {
        let t0 = Instant::now();
        let mut m = machine(Some("A"), Some(json!(1)), t0);

        let other = BusEvent::new(PRIMARY, json!(42), Some(SourceMeta::labeled("B")));
        assert_eq!(m.on_primary(&other, t0 + Duration::from_secs(3)), Ingest::Unauthorized);
        assert_eq!(m.last_value(), Some(&json!(1)));
        assert_eq!(m.next_wakeup(), Some(t0 + D));
        assert!(m.known_sources().contains("B"));

        let authority = BusEvent::new(PRIMARY, json!(2), Some(SourceMeta::labeled("a")));
        assert_eq!(m.on_primary(&authority, t0 + Duration::from_secs(4)), Ingest::Accepted);
        assert_eq!(m.last_value(), Some(&json!(2)));
    }

    #[test]
    fn test_non_numeric_update_does_not_reset_timer() {
        let t0 = Instant::now();
        let mut m = machine(None, Some(json!(1)), t0);
        let bad = update(PRIMARY, json!("n/a"), "n2k.16");
        assert_eq!(m.on_primary(&bad, t0 + Duration::from_secs(5)), Ingest::NotNumeric);
        assert_eq!(m.next_wakeup(), Some(t0 + D));
    }

    #[test]
    fn test_missing_source_metadata_is_accepted() {
        let t0 = Instant::now();
        let mut m = machine(Some("A"), None, t0);
        let anonymous = BusEvent::new(PRIMARY, json!(9), None);
        assert_eq!(m.on_primary(&anonymous, t0), Ingest::Accepted);
        assert_eq!(m.state(), ChannelState::Live);
    }

    #[test]
    fn test_companions_in_replay() {
        let t0 = Instant::now();
        let mut m = machine(None, None, t0);
        let rpm = "propulsion.port.revolutions";
        let temp = "propulsion.port.temperature";

        assert_eq!(m.on_companion(&update(rpm, json!(35.5), "n2k.16")), Ingest::Accepted);
        assert_eq!(m.on_companion(&update(temp, json!(353.15), "n2k.16")), Ingest::Accepted);
        assert_eq!(m.on_companion(&update(temp, json!(0), "heartwire")), Ingest::SelfAuthored);
        let boost = update("propulsion.port.boost", json!(1), "n2k.16");
        assert_eq!(m.on_companion(&boost), Ingest::Unknown);
        assert_eq!(m.last_known_companion("revolutions"), None);
        assert_eq!(m.next_wakeup(), None);

        m.on_primary(&update(PRIMARY, json!(10), "n2k.16"), t0);
        let Wake::StartedInjecting(delta) = m.on_timer(t0 + D) else {
            panic!("expected injection to start");
        };
        assert_eq!(delta.value_of(rpm), Some(&json!(0)));
        assert_eq!(delta.value_of(temp), Some(&json!(353.15)));
    }
}

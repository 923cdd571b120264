//! Status surface
//!
//! Human-readable (and serializable) view of the engine: active channels,
//! their injection state, and what discovery found. Advisory only.

use crate::channel::ChannelState;
use crate::discovery::DiscoveredChannel;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

// ============================================================================
// Engine health
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineHealth {
    Stopped,
    Running,
    /// Discovery ran and reported; no channels by request.
    DiscoveryOnly,
    /// The bus was unreachable at start. Waits for an explicit restart.
    Degraded,
}

impl EngineHealth {
    pub fn display_text(&self) -> &'static str {
        match self {
            EngineHealth::Stopped => "Stopped",
            EngineHealth::Running => "Running",
            EngineHealth::DiscoveryOnly => "Discovery only",
            EngineHealth::Degraded => "Degraded (bus unavailable at start)",
        }
    }
}

// ============================================================================
// Channel snapshot
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelSnapshot {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub path: String,
    pub state: ChannelState,
    pub last_value: Option<Value>,
    pub last_seen: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_filter: Option<String>,
    pub known_sources: Vec<String>,
    pub injections: u64,
    pub publish_failures: u64,
}

impl fmt::Display for ChannelSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = self
            .last_value
            .as_ref()
            .map_or_else(|| "-".to_string(), Value::to_string);
        write!(
            f,
            "{} ({}): {} value={} injections={}",
            self.name.as_deref().unwrap_or(&self.id),
            self.path,
            self.state,
            value,
            self.injections
        )?;
        if self.publish_failures > 0 {
            write!(f, " publish_failures={}", self.publish_failures)?;
        }
        if let Some(filter) = &self.source_filter {
            write!(f, " authority={filter}")?;
        }
        if !self.known_sources.is_empty() {
            write!(f, " sources=[{}]", self.known_sources.join(", "))?;
        }
        Ok(())
    }
}

// ============================================================================
// Engine status
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineStatus {
    pub health: EngineHealth,
    pub active_channels: usize,
    pub channels: Vec<ChannelSnapshot>,
    pub discovered: Vec<DiscoveredChannel>,
    /// Configuration entries that were not turned into channels, with the reason.
    pub skipped: Vec<String>,
}

impl EngineStatus {
    pub fn injecting(&self) -> usize {
        self.channels
            .iter()
            .filter(|c| c.state == ChannelState::Injecting)
            .count()
    }

    pub fn channel(&self, id: &str) -> Option<&ChannelSnapshot> {
        self.channels.iter().find(|c| c.id == id)
    }
}

impl fmt::Display for EngineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{}: {} active channel(s), {} injecting",
            self.health.display_text(),
            self.active_channels,
            self.injecting()
        )?;
        for channel in &self.channels {
            writeln!(f, "  - {channel}")?;
        }
        if !self.discovered.is_empty() {
            writeln!(f, "Discovered {} candidate(s):", self.discovered.len())?;
            for candidate in &self.discovered {
                writeln!(f, "  - {candidate}")?;
            }
        }
        for reason in &self.skipped {
            writeln!(f, "Skipped: {reason}")?;
        }
        Ok(())
    }
}

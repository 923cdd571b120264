//! Companion fields published alongside a channel's primary value.
//!
//! Active fields describe something the engine is *doing* (speed, pressure,
//! flow) and are forced to zero while a channel is replayed. Passive fields
//! describe a state that persists after shutdown (temperatures) and are
//! replayed at their last genuine reading.

use crate::path::ChannelPath;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompanionKind {
    Active,
    Passive,
}

/// Entry in the fixed companion table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompanionSpec {
    pub name: &'static str,
    pub suffix: &'static str,
    pub kind: CompanionKind,
}

pub const COMPANION_TABLE: &[CompanionSpec] = &[
    CompanionSpec {
        name: "revolutions",
        suffix: "revolutions",
        kind: CompanionKind::Active,
    },
    CompanionSpec {
        name: "oilPressure",
        suffix: "oilPressure",
        kind: CompanionKind::Active,
    },
    CompanionSpec {
        name: "fuelRate",
        suffix: "fuel.rate",
        kind: CompanionKind::Active,
    },
    CompanionSpec {
        name: "temperature",
        suffix: "temperature",
        kind: CompanionKind::Passive,
    },
    CompanionSpec {
        name: "coolantTemperature",
        suffix: "coolantTemperature",
        kind: CompanionKind::Passive,
    },
    CompanionSpec {
        name: "oilTemperature",
        suffix: "oilTemperature",
        kind: CompanionKind::Passive,
    },
];

impl CompanionSpec {
    /// Look up a logical field name (case-insensitive).
    pub fn lookup(name: &str) -> Option<&'static CompanionSpec> {
        let name = name.trim();
        COMPANION_TABLE
            .iter()
            .find(|spec| spec.name.eq_ignore_ascii_case(name))
    }
}

/// A companion field resolved against one channel's primary path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompanionField {
    pub name: String,
    pub path: String,
    pub kind: CompanionKind,
}

impl CompanionField {
    pub fn resolve(spec: &CompanionSpec, primary: &ChannelPath) -> Self {
        Self {
            name: spec.name.to_string(),
            path: primary.sibling(spec.suffix),
            kind: spec.kind,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::MIN_SEGMENTS;

    #[test]
    fn test_lookup_is_case_insensitive() {
        assert_eq!(CompanionSpec::lookup("RPM"), None);
        assert_eq!(
            CompanionSpec::lookup("Revolutions").map(|s| s.kind),
            Some(CompanionKind::Active)
        );
        assert_eq!(
            CompanionSpec::lookup("oiltemperature").map(|s| s.kind),
            Some(CompanionKind::Passive)
        );
    }

    #[test]
    fn test_resolve_against_primary() {
        let primary =
            ChannelPath::parse("propulsion.stbd.runTime", "propulsion", MIN_SEGMENTS).unwrap();
        let spec = CompanionSpec::lookup("fuelRate").unwrap();
        let field = CompanionField::resolve(spec, &primary);
        assert_eq!(field.path, "propulsion.stbd.fuel.rate");
        assert_eq!(field.kind, CompanionKind::Active);
    }
}

//! Source Arbiter
//!
//! Decides whether an inbound value is genuine. The engine's own republished
//! values come back through the same subscriptions and must never count as
//! liveness, otherwise a silent channel would keep itself alive forever.

use heartwire_core::SourceMeta;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// Published by this engine. Ignored entirely.
    SelfAuthored,
    /// Matches the channel's configured authority.
    Authorized,
    /// An authority is configured and this is not it. Recorded, not applied.
    Unauthorized,
    /// No authority configured, or no source metadata to judge by.
    Permissive,
}

impl Verdict {
    pub fn accepts(self) -> bool {
        matches!(self, Verdict::Authorized | Verdict::Permissive)
    }
}

#[derive(Debug, Clone)]
pub struct SourceArbiter {
    self_label: String,
}

impl SourceArbiter {
    pub fn new(self_label: &str) -> Self {
        Self {
            self_label: self_label.trim().to_string(),
        }
    }

    pub fn is_self(&self, source: &SourceMeta) -> bool {
        source
            .label
            .as_deref()
            .is_some_and(|label| label.trim() == self.self_label)
    }

    pub fn classify(&self, filter: Option<&str>, source: Option<&SourceMeta>) -> Verdict {
        // Metadata without a label or an address says nothing about the sender.
        let Some(source) = source.filter(|s| s.identity().is_some()) else {
            return Verdict::Permissive;
        };
        if self.is_self(source) {
            return Verdict::SelfAuthored;
        }
        match filter {
            None => Verdict::Permissive,
            Some(authority) if source.matches(authority) => Verdict::Authorized,
            Some(_) => Verdict::Unauthorized,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arbiter() -> SourceArbiter {
        SourceArbiter::new("heartwire")
    }

    #[test]
    fn test_self_label_is_rejected_even_with_matching_filter() {
        let own = SourceMeta::labeled("heartwire");
        assert_eq!(arbiter().classify(None, Some(&own)), Verdict::SelfAuthored);
        assert_eq!(
            arbiter().classify(Some("heartwire"), Some(&own)),
            Verdict::SelfAuthored
        );
        assert!(!Verdict::SelfAuthored.accepts());
    }

    #[test]
    fn test_unfiltered_channel_is_permissive() {
        let chartplotter = SourceMeta::new("n2k", "3");
        assert_eq!(arbiter().classify(None, Some(&chartplotter)), Verdict::Permissive);
        assert!(Verdict::Permissive.accepts());
    }

    #[test]
    fn test_filter_matches_label_or_numeric_id() {
        let engine = SourceMeta::new("n2k", "16");
        assert_eq!(arbiter().classify(Some("16"), Some(&engine)), Verdict::Authorized);
        assert_eq!(arbiter().classify(Some("N2K.16"), Some(&engine)), Verdict::Authorized);
        assert_eq!(arbiter().classify(Some("17"), Some(&engine)), Verdict::Unauthorized);
        assert!(!Verdict::Unauthorized.accepts());
    }

    #[test]
    fn test_missing_metadata_is_accepted() {
        assert_eq!(arbiter().classify(Some("16"), None), Verdict::Permissive);
        assert_eq!(
            arbiter().classify(Some("16"), Some(&SourceMeta::default())),
            Verdict::Permissive
        );
    }

    #[test]
    fn test_padded_self_label_still_recognizes_own_echo() {
        let arbiter = SourceArbiter::new(" heartwire ");
        let echo = SourceMeta::labeled("heartwire");
        assert_eq!(arbiter.classify(None, Some(&echo)), Verdict::SelfAuthored);
        assert_eq!(
            arbiter.classify(None, Some(&SourceMeta::labeled("heartwire "))),
            Verdict::SelfAuthored
        );
    }
}

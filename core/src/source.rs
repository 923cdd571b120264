//! Source identity carried alongside every bus value.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Metadata describing who put a value on the bus.
///
/// `label` is the human-readable connection label (e.g. `"n2k-on-ve.can-socket"`),
/// `src` the transmitter's numeric address on that connection (e.g. `"16"`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src: Option<String>,
}

impl SourceMeta {
    pub fn labeled(label: impl Into<String>) -> Self {
        Self {
            label: Some(label.into()),
            src: None,
        }
    }

    pub fn new(label: impl Into<String>, src: impl Into<String>) -> Self {
        Self {
            label: Some(label.into()),
            src: Some(src.into()),
        }
    }

    /// Stable identity used for diagnostics: `label.src`, or whichever half exists.
    pub fn identity(&self) -> Option<String> {
        match (self.label.as_deref(), self.src.as_deref()) {
            (Some(label), Some(src)) => Some(format!("{label}.{src}")),
            (Some(label), None) => Some(label.to_string()),
            (None, Some(src)) => Some(src.to_string()),
            (None, None) => None,
        }
    }

    /// Parse a `$source` reference string such as `"n2k.16"` or `"heartwire"`.
    ///
    /// The last dot-separated segment is taken as `src` when it is numeric.
    pub fn from_ref(reference: &str) -> Self {
        let reference = reference.trim();
        match reference.rsplit_once('.') {
            Some((label, src)) if !src.is_empty() && src.chars().all(|c| c.is_ascii_digit()) => {
                Self::new(label, src)
            }
            _ => Self::labeled(reference),
        }
    }

    /// True when any of `label`, `src` or `identity()` equals `candidate`
    /// after trimming and case-folding.
    pub fn matches(&self, candidate: &str) -> bool {
        let wanted = normalize(candidate);
        if wanted.is_empty() {
            return false;
        }
        let by_label = self.label.as_deref().map(normalize);
        let by_src = self.src.as_deref().map(normalize);
        let by_identity = self.identity().as_deref().map(normalize);

        [by_label, by_src, by_identity]
            .into_iter()
            .flatten()
            .any(|have| have == wanted)
    }
}

impl fmt::Display for SourceMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.identity() {
            Some(identity) => f.write_str(&identity),
            None => f.write_str("unknown"),
        }
    }
}

fn normalize(s: &str) -> String {
    s.trim().to_lowercase()
}

//! Hierarchical channel paths (`propulsion.<entity>.runTime`).

use crate::error::PathError;
use std::fmt;

/// Default minimum number of dot-separated segments: root, entity, leaf.
pub const MIN_SEGMENTS: usize = 3;

/// A validated primary path for a monitored channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChannelPath {
    raw: String,
    segments: Vec<String>,
}

impl ChannelPath {
    /// Validate `path` against the expected shape: at least `min_segments`
    /// non-empty segments, the first of which is `root`. A path always needs a
    /// root and a leaf, so `min_segments` below 2 is raised to 2.
    pub fn parse(path: &str, root: &str, min_segments: usize) -> Result<Self, PathError> {
        let min_segments = min_segments.max(2);
        let raw = path.trim();
        let segments: Vec<String> = raw.split('.').map(str::to_string).collect();

        if segments.iter().any(|s| s.trim().is_empty()) {
            return Err(PathError::EmptySegment(raw.to_string()));
        }
        if segments.len() < min_segments {
            return Err(PathError::TooShort {
                path: raw.to_string(),
                found: segments.len(),
                min: min_segments,
            });
        }
        if segments[0] != root {
            return Err(PathError::WrongRoot {
                path: raw.to_string(),
                root: root.to_string(),
            });
        }

        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn leaf(&self) -> &str {
        &self.segments[self.segments.len() - 1]
    }

    /// Entity segments strictly between root and leaf, joined with `.`.
    pub fn id(&self) -> String {
        self.segments[1..self.segments.len() - 1].join(".")
    }

    /// Sibling path obtained by replacing the leaf with `suffix`.
    pub fn sibling(&self, suffix: &str) -> String {
        let parent = &self.segments[..self.segments.len() - 1];
        format!("{}.{}", parent.join("."), suffix)
    }
}

impl fmt::Display for ChannelPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_path() {
        let path =
            ChannelPath::parse("propulsion.port.runTime", "propulsion", MIN_SEGMENTS).unwrap();
        assert_eq!(path.id(), "port");
        assert_eq!(path.leaf(), "runTime");
        assert_eq!(path.sibling("revolutions"), "propulsion.port.revolutions");
        assert_eq!(path.sibling("fuel.rate"), "propulsion.port.fuel.rate");
    }

    #[test]
    fn test_multi_segment_entity() {
        let path =
            ChannelPath::parse("propulsion.main.port.runTime", "propulsion", MIN_SEGMENTS)
                .unwrap();
        assert_eq!(path.id(), "main.port");
    }

    #[test]
    fn test_rejects_malformed_paths() {
        assert!(matches!(
            ChannelPath::parse("propulsion.runTime", "propulsion", MIN_SEGMENTS),
            Err(PathError::TooShort { found: 2, .. })
        ));
        assert!(matches!(
            ChannelPath::parse("electrical.port.runTime", "propulsion", MIN_SEGMENTS),
            Err(PathError::WrongRoot { .. })
        ));
        assert!(matches!(
            ChannelPath::parse("propulsion..runTime", "propulsion", MIN_SEGMENTS),
            Err(PathError::EmptySegment(_))
        ));
        assert!(ChannelPath::parse("", "propulsion", MIN_SEGMENTS).is_err());
    }

    #[test]
    fn test_min_segments_never_below_root_and_leaf() {
        assert!(matches!(
            ChannelPath::parse("propulsion", "propulsion", 0),
            Err(PathError::TooShort { found: 1, min: 2, .. })
        ));

        let path = ChannelPath::parse("propulsion.runTime", "propulsion", 1).unwrap();
        assert_eq!(path.id(), "");
        assert_eq!(path.sibling("revolutions"), "propulsion.revolutions");
    }
}

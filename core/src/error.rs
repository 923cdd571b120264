use thiserror::Error;

/// Failures reported by a [`BusAdapter`](crate::bus::BusAdapter).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BusError {
    #[error("Bus is unavailable: {0}")]
    Unavailable(String),

    #[error("Bus rejected the update: {0}")]
    Rejected(String),

    #[error("Subscription to {0} is closed")]
    SubscriptionClosed(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for BusError {
    fn from(err: serde_json::Error) -> Self {
        BusError::Serialization(err.to_string())
    }
}

/// Reasons a channel path does not have the expected hierarchical shape.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PathError {
    #[error("path `{path}` has {found} segments, at least {min} required")]
    TooShort {
        path: String,
        found: usize,
        min: usize,
    },

    #[error("path `{path}` must start with `{root}`")]
    WrongRoot { path: String, root: String },

    #[error("path `{0}` contains an empty segment")]
    EmptySegment(String),
}

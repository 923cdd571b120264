use crate::source::SourceMeta;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// One `{path, value}` pair inside a delta.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathValue {
    pub path: String,
    pub value: Value,
}

impl PathValue {
    pub fn new(path: impl Into<String>, value: Value) -> Self {
        Self {
            path: path.into(),
            value,
        }
    }
}

/// A timestamped update published on the bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Delta {
    pub source: SourceMeta,
    pub timestamp: DateTime<Utc>,
    pub values: Vec<PathValue>,
}

impl Delta {
    pub fn new(source: SourceMeta) -> Self {
        Self {
            source,
            timestamp: Utc::now(),
            values: Vec::new(),
        }
    }

    pub fn with_value(mut self, path: impl Into<String>, value: Value) -> Self {
        self.values.push(PathValue::new(path, value));
        self
    }

    pub fn push(&mut self, path: impl Into<String>, value: Value) {
        self.values.push(PathValue::new(path, value));
    }

    pub fn value_of(&self, path: &str) -> Option<&Value> {
        self.values.iter().find(|pv| pv.path == path).map(|pv| &pv.value)
    }

    /// Render in the `{"context", "updates": [...]}` envelope bus servers expect.
    pub fn to_envelope(&self, context: &str) -> Value {
        json!({
            "context": context,
            "updates": [{
                "source": self.source,
                "$source": self.source.identity(),
                "timestamp": self.timestamp.to_rfc3339(),
                "values": self.values,
            }]
        })
    }
}

pub mod arbiter;
pub mod channel;
pub mod config;
pub mod controller;
pub mod discovery;
pub mod emitter;
pub mod error;
pub mod status;
mod worker;

pub mod prelude {
    pub use crate::config::{ChannelConfig, EngineConfig};
    pub use crate::controller::Engine;
    pub use crate::error::{ConfigError, EngineError};
    pub use crate::status::{ChannelSnapshot, EngineHealth, EngineStatus};
}

pub use arbiter::{SourceArbiter, Verdict};
pub use channel::{ChannelMachine, ChannelState, Ingest, MonitoredChannel, Timing, Wake};
pub use config::{ChannelConfig, EngineConfig};
pub use controller::{Engine, merge_entries};
pub use discovery::{DiscoveredChannel, discover};
pub use emitter::SyntheticEmitter;
pub use error::{ConfigError, EngineError};
pub use status::{ChannelSnapshot, EngineHealth, EngineStatus};

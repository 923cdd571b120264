//! heartwire facade crate.
//!
//! Re-exports the bus vocabulary (`heartwire-core`) and the engine
//! (`heartwire-runtime`) behind a single entry point.
//!
//! ```no_run
//! use heartwire::prelude::*;
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), EngineError> {
//! let bus = MemoryBus::new();
//! let mut engine = Engine::new(Arc::new(bus));
//! engine
//!     .start(EngineConfig::default().with_channel(ChannelConfig::new("propulsion.port.runTime")))
//!     .await?;
//! println!("{}", engine.status());
//! engine.stop().await;
//! # Ok(())
//! # }
//! ```

pub use heartwire_core as core;
pub use heartwire_runtime as runtime;

pub use heartwire_core::{BusAdapter, BusEvent, Delta, MemoryBus, SourceMeta, Subscription};
pub use heartwire_runtime::{Engine, EngineConfig, EngineStatus};

pub mod prelude {
    pub use heartwire_core::prelude::*;
    pub use heartwire_runtime::prelude::*;
}

#[cfg(test)]
mod tests {
    use super::prelude::*;
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_prelude_drives_engine() {
        let bus = MemoryBus::with_tree(json!({
            "propulsion": {"main": {"engineHours": {"value": 12.0, "$source": "j1939.0"}}}
        }));
        let mut engine = Engine::new(Arc::new(bus.clone()));
        engine.start(EngineConfig::default()).await.unwrap();

        assert_eq!(engine.health(), EngineHealth::Running);
        assert_eq!(engine.status().discovered[0].unit, "h");

        tokio::time::sleep(std::time::Duration::from_secs(11)).await;
        assert_eq!(bus.published().len(), 1);
        engine.stop().await;
    }
}

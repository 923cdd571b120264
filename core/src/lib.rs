pub mod bus;
pub mod companion;
pub mod delta;
pub mod error;
pub mod memory;
pub mod path;
pub mod source;

pub use bus::{BusAdapter, BusEvent, Subscription, leaf_value};
pub use companion::{CompanionField, CompanionKind, CompanionSpec};
pub use delta::{Delta, PathValue};
pub use error::{BusError, PathError};
pub use memory::MemoryBus;
pub use path::ChannelPath;
pub use source::SourceMeta;

pub mod prelude {
    pub use crate::bus::{BusAdapter, BusEvent, Subscription};
    pub use crate::delta::{Delta, PathValue};
    pub use crate::error::{BusError, PathError};
    pub use crate::memory::MemoryBus;
    pub use crate::path::ChannelPath;
    pub use crate::source::SourceMeta;
}

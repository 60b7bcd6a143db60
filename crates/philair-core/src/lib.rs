// philair-core: Device-state coordination between philair-api clients and
// home-automation consumers.

pub mod capability;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod reconnect;
pub mod registry;
pub mod stream;
pub mod watchdog;

// ── Primary re-exports ──────────────────────────────────────────────
pub use capability::{DescriptorOverrides, FanControl, ModelCatalog, ModelDescriptor};
pub use config::CoordinatorConfig;
pub use coordinator::{ConnectionState, Coordinator, ListenerHandle};
pub use error::CoreError;
pub use reconnect::ReconnectConfig;
pub use registry::ListenerId;
pub use stream::{StatusWatch, StatusWatchStream};
pub use watchdog::{Watchdog, WatchdogCallback};

// Data types callers need alongside the coordinator.
pub use philair_api::{DeviceStatus, DeviceTarget, StatusPatch, StatusValue};

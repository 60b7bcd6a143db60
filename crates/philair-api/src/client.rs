// Device client capability surface.
//
// The lower-level protocol library implements these two traits; the
// coordinator only ever talks to a device through them.

use std::fmt;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::status::{DeviceStatus, StatusPatch, StatusValue};

/// Default CoAP port of the purifier's control endpoint.
pub const DEFAULT_PORT: u16 = 5683;

/// Continuous stream of status snapshots from one observe subscription.
///
/// An `Err` item or the end of the stream means the subscription is dead.
pub type StatusStream = BoxStream<'static, Result<DeviceStatus, Error>>;

// ── DeviceTarget ─────────────────────────────────────────────────────

/// Network endpoint of a single device.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceTarget {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

impl DeviceTarget {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }
}

impl fmt::Display for DeviceTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

// ── Traits ───────────────────────────────────────────────────────────

/// An open session to one device.
#[async_trait]
pub trait DeviceClient: Send + Sync + 'static {
    /// One-shot read of the full status.
    async fn fetch_status(&self) -> Result<DeviceStatus, Error>;

    /// Start an observe subscription. Dropping the stream ends it.
    fn observe_status(&self) -> StatusStream;

    async fn set_control_value(&self, key: &str, value: StatusValue) -> Result<(), Error>;

    /// Write several keys in a single control request.
    async fn set_control_values(&self, values: &StatusPatch) -> Result<(), Error>;

    /// Close the session. Later calls on this client fail with [`Error::Closed`].
    async fn shutdown(&self) -> Result<(), Error>;
}

/// Opens sessions to a device.
///
/// Connection setup may hang on an unreachable host; callers apply their
/// own timeout.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Client: DeviceClient;

    async fn connect(&self, target: &DeviceTarget) -> Result<Self::Client, Error>;
}

// philair-api: Device client capability surface for Philips air purifiers.
//
// The wire protocol lives in a lower-level client library; this crate only
// names the operations the coordinator needs from it and the data types
// flowing through them.

pub mod client;
pub mod error;
pub mod status;

pub use client::{Connector, DeviceClient, DeviceTarget, StatusStream, DEFAULT_PORT};
pub use error::Error;
pub use status::{DeviceStatus, StatusPatch, StatusValue};

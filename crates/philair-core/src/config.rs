// ── Runtime coordinator configuration ──
//
// Describes which device to talk to and how to keep the session alive.
// Never touches disk: philair-config builds one of these and hands it in.

use std::time::Duration;

use philair_api::DeviceTarget;

use crate::reconnect::ReconnectConfig;

/// Configuration for coordinating a single device.
#[derive(Debug, Clone, PartialEq)]
pub struct CoordinatorConfig {
    /// Device endpoint.
    pub target: DeviceTarget,
    /// Upper bound on opening a session, for setup and for each reconnect attempt.
    pub setup_timeout: Duration,
    /// Expected interval between observe pushes.
    pub base_interval: Duration,
    /// Pushes that may be missed before the session is considered dead.
    pub missed_packet_threshold: u32,
    /// Reset the watchdog on every received snapshot.
    ///
    /// When off, the watchdog only fires on its own schedule, forcing a
    /// reconnect every watchdog period while listeners exist.
    pub watchdog_enabled: bool,
    pub reconnect: ReconnectConfig,
}

impl CoordinatorConfig {
    pub fn new(target: DeviceTarget) -> Self {
        Self {
            target,
            setup_timeout: Duration::from_secs(25),
            base_interval: Duration::from_secs(60),
            missed_packet_threshold: 3,
            watchdog_enabled: true,
            reconnect: ReconnectConfig::default(),
        }
    }

    /// Silence longer than this triggers a reconnect.
    pub fn watchdog_timeout(&self) -> Duration {
        self.base_interval * self.missed_packet_threshold.max(1)
    }
}

// Shared helpers for coordinator integration tests: an in-memory device
// with a scriptable connector and client.

#![allow(dead_code, clippy::unwrap_used)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use philair_api::{
    Connector, DeviceClient, DeviceStatus, DeviceTarget, Error, StatusPatch, StatusStream,
    StatusValue,
};
use philair_core::{Coordinator, CoordinatorConfig};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

// ── Tracing ─────────────────────────────────────────────────────────

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// ── Fake device ─────────────────────────────────────────────────────

/// One simulated purifier. Every session opened through its connector
/// shares this state.
#[derive(Clone)]
pub struct FakeDevice {
    state: Arc<Mutex<DeviceState>>,
}

#[derive(Default)]
struct DeviceState {
    status: DeviceStatus,
    connects: usize,
    closed_sessions: usize,
    failing_connects: usize,
    connect_delay: Option<Duration>,
    fail_writes: bool,
    writes: Vec<StatusPatch>,
    observers: Vec<Observer>,
    next_session: usize,
}

struct Observer {
    session: usize,
    tx: mpsc::UnboundedSender<Result<DeviceStatus, Error>>,
}

impl FakeDevice {
    pub fn new(status: DeviceStatus) -> Self {
        Self {
            state: Arc::new(Mutex::new(DeviceState {
                status,
                ..DeviceState::default()
            })),
        }
    }

    pub fn connector(&self) -> FakeConnector {
        FakeConnector {
            device: self.clone(),
        }
    }

    /// Connection attempts started, successful or not.
    pub fn connects(&self) -> usize {
        self.state.lock().unwrap().connects
    }

    pub fn closed_sessions(&self) -> usize {
        self.state.lock().unwrap().closed_sessions
    }

    /// Observe subscriptions whose stream is still held by someone.
    pub fn active_observers(&self) -> usize {
        self.state
            .lock()
            .unwrap()
            .observers
            .iter()
            .filter(|o| !o.tx.is_closed())
            .count()
    }

    pub fn writes(&self) -> Vec<StatusPatch> {
        self.state.lock().unwrap().writes.clone()
    }

    pub fn fail_next_connects(&self, count: usize) {
        self.state.lock().unwrap().failing_connects = count;
    }

    pub fn set_connect_delay(&self, delay: Option<Duration>) {
        self.state.lock().unwrap().connect_delay = delay;
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.state.lock().unwrap().fail_writes = fail;
    }

    /// Device-side state change, pushed to every live observer.
    pub fn push(&self, status: DeviceStatus) {
        let mut state = self.state.lock().unwrap();
        state.status = status.clone();
        for observer in &state.observers {
            let _ = observer.tx.send(Ok(status.clone()));
        }
    }

    /// Every observe stream yields an error.
    pub fn fail_streams(&self) {
        let state = self.state.lock().unwrap();
        for observer in &state.observers {
            let _ = observer.tx.send(Err(Error::StreamClosed {
                reason: "observe cancelled by peer".into(),
            }));
        }
    }

    /// Every observe stream ends.
    pub fn end_streams(&self) {
        self.state.lock().unwrap().observers.clear();
    }
}

// ── Connector / client ──────────────────────────────────────────────

pub struct FakeConnector {
    device: FakeDevice,
}

#[async_trait]
impl Connector for FakeConnector {
    type Client = FakeClient;

    async fn connect(&self, target: &DeviceTarget) -> Result<FakeClient, Error> {
        let (delay, fail, session) = {
            let mut state = self.device.state.lock().unwrap();
            state.connects += 1;
            let fail = state.failing_connects > 0;
            if fail {
                state.failing_connects -= 1;
            }
            state.next_session += 1;
            (state.connect_delay, fail, state.next_session)
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if fail {
            return Err(Error::Connect {
                target: target.to_string(),
                reason: "host unreachable".into(),
            });
        }

        Ok(FakeClient {
            device: self.device.clone(),
            session,
            closed: AtomicBool::new(false),
        })
    }
}

pub struct FakeClient {
    device: FakeDevice,
    session: usize,
    closed: AtomicBool,
}

impl FakeClient {
    fn ensure_open(&self) -> Result<(), Error> {
        if self.closed.load(Ordering::SeqCst) {
            Err(Error::Closed)
        } else {
            Ok(())
        }
    }

    fn write(&self, patch: StatusPatch) -> Result<(), Error> {
        self.ensure_open()?;
        let mut state = self.device.state.lock().unwrap();
        if state.fail_writes {
            return Err(Error::Rejected {
                message: "device busy".into(),
            });
        }
        state.status.apply(&patch);
        state.writes.push(patch);
        Ok(())
    }
}

#[async_trait]
impl DeviceClient for FakeClient {
    async fn fetch_status(&self) -> Result<DeviceStatus, Error> {
        self.ensure_open()?;
        Ok(self.device.state.lock().unwrap().status.clone())
    }

    fn observe_status(&self) -> StatusStream {
        let (tx, rx) = mpsc::unbounded_channel();
        self.device.state.lock().unwrap().observers.push(Observer {
            session: self.session,
            tx,
        });
        UnboundedReceiverStream::new(rx).boxed()
    }

    async fn set_control_value(&self, key: &str, value: StatusValue) -> Result<(), Error> {
        self.write(StatusPatch::single(key, value))
    }

    async fn set_control_values(&self, values: &StatusPatch) -> Result<(), Error> {
        self.write(values.clone())
    }

    async fn shutdown(&self) -> Result<(), Error> {
        self.closed.store(true, Ordering::SeqCst);
        let mut state = self.device.state.lock().unwrap();
        state.closed_sessions += 1;
        let session = self.session;
        state.observers.retain(|o| o.session != session);
        Ok(())
    }
}

// ── Setup ───────────────────────────────────────────────────────────

pub fn status(pairs: &[(&str, &str)]) -> DeviceStatus {
    pairs.iter().copied().collect()
}

pub fn test_config() -> CoordinatorConfig {
    CoordinatorConfig::new(DeviceTarget::new("192.168.1.20"))
}

pub async fn connect(device: &FakeDevice) -> Coordinator<FakeConnector> {
    connect_with(device, test_config()).await
}

pub async fn connect_with(
    device: &FakeDevice,
    config: CoordinatorConfig,
) -> Coordinator<FakeConnector> {
    init_tracing();
    Coordinator::connect(device.connector(), config).await.unwrap()
}

/// Let spawned tasks run to their next suspension point.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

pub async fn advance_secs(secs: u64) {
    tokio::time::sleep(Duration::from_secs(secs)).await;
}

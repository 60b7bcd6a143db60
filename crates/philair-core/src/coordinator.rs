// ── Device coordinator ──
//
// Owns one device session: observes its status, fans snapshots out to
// listeners, forwards control writes, and replaces the session when the
// observe stream fails or goes silent.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use futures_util::StreamExt;
use philair_api::{Connector, DeviceClient, DeviceStatus, DeviceTarget, StatusPatch, StatusValue};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::CoordinatorConfig;
use crate::error::CoreError;
use crate::registry::{Listener, ListenerId, ListenerRegistry};
use crate::stream::StatusWatch;
use crate::watchdog::Watchdog;

// ── ConnectionState ──────────────────────────────────────────────

/// Connection state observable by consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum ConnectionState {
    /// No session. Initial state of a shut down coordinator, and the state
    /// after a reconnect ran out of attempts.
    Disconnected,
    /// Session open, nobody listening.
    Connected,
    Observing,
    Reconnecting { attempt: u32 },
}

// ── ListenerHandle ───────────────────────────────────────────────

/// Returned by [`Coordinator::add_listener`].
///
/// Dropping the handle does not unregister the listener; call
/// [`remove`](Self::remove).
pub struct ListenerHandle {
    id: ListenerId,
    owner: Weak<dyn ListenerOwner>,
}

impl ListenerHandle {
    pub fn id(&self) -> ListenerId {
        self.id
    }

    /// Unregister the listener. Safe to call more than once.
    pub fn remove(&self) {
        if let Some(owner) = self.owner.upgrade() {
            owner.remove_listener(self.id);
        }
    }
}

trait ListenerOwner: Send + Sync {
    fn remove_listener(&self, id: ListenerId);
}

// ── Coordinator ──────────────────────────────────────────────────

/// Coordinates a single device.
///
/// Cheaply cloneable via `Arc<CoordinatorInner>`. Call
/// [`shutdown`](Self::shutdown) before discarding it; background tasks keep
/// the session alive until then.
pub struct Coordinator<C: Connector> {
    inner: Arc<CoordinatorInner<C>>,
}

impl<C: Connector> Clone for Coordinator<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct CoordinatorInner<C: Connector> {
    connector: C,
    config: CoordinatorConfig,
    client: Mutex<Option<Arc<C::Client>>>,
    status: watch::Sender<Arc<DeviceStatus>>,
    connection_state: watch::Sender<ConnectionState>,
    listeners: ListenerRegistry,
    /// Held for the duration of one publish + notify round.
    fanout: Mutex<()>,
    observer: Mutex<Option<TaskSlot>>,
    reconnector: Mutex<Option<TaskSlot>>,
    next_generation: AtomicU64,
    watchdog: Watchdog,
    cancel: CancellationToken,
}

/// A spawned background task and the means to stop it.
struct TaskSlot {
    generation: u64,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl TaskSlot {
    fn stop(self) {
        self.cancel.cancel();
        self.handle.abort();
    }
}

impl<C: Connector> Coordinator<C> {
    /// Open the first session and read the initial status.
    ///
    /// Both steps share `config.setup_timeout`. Failures are returned as-is
    /// and never retried here; the caller decides whether to set up again.
    pub async fn connect(connector: C, config: CoordinatorConfig) -> Result<Self, CoreError> {
        let target = config.target.clone();
        let timeout = config.setup_timeout;
        debug!(host = %target, "setting up device session");

        let client = match tokio::time::timeout(timeout, connector.connect(&target)).await {
            Ok(Ok(client)) => client,
            Ok(Err(e)) => {
                warn!(host = %target, error = %e, "device setup failed");
                return Err(CoreError::SetupFailed {
                    target: target.to_string(),
                    reason: e.to_string(),
                });
            }
            Err(_) => {
                warn!(host = %target, "device setup timed out");
                return Err(setup_timeout(&target, timeout));
            }
        };

        let status = match tokio::time::timeout(timeout, client.fetch_status()).await {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => {
                close_quietly(&client).await;
                return Err(CoreError::SetupFailed {
                    target: target.to_string(),
                    reason: e.to_string(),
                });
            }
            Err(_) => {
                close_quietly(&client).await;
                return Err(setup_timeout(&target, timeout));
            }
        };

        info!(host = %target, keys = status.len(), "connected to device");
        Ok(Self::new(connector, client, status, config))
    }

    /// Wrap an already open session. Starts in [`ConnectionState::Connected`].
    pub fn new(connector: C, client: C::Client, status: DeviceStatus, config: CoordinatorConfig) -> Self {
        let (status_tx, _) = watch::channel(Arc::new(status));
        let (state_tx, _) = watch::channel(ConnectionState::Connected);

        let inner = Arc::new_cyclic(|weak: &Weak<CoordinatorInner<C>>| {
            let weak = weak.clone();
            let watchdog = Watchdog::new(
                config.watchdog_timeout(),
                Arc::new(move || {
                    if let Some(inner) = weak.upgrade() {
                        warn!(
                            host = %inner.config.target,
                            "no status within watchdog timeout, reconnecting"
                        );
                        inner.reconnect();
                    }
                }),
            );
            watchdog.set_auto_restart(true);

            CoordinatorInner {
                connector,
                config,
                client: Mutex::new(Some(Arc::new(client))),
                status: status_tx,
                connection_state: state_tx,
                listeners: ListenerRegistry::default(),
                fanout: Mutex::new(()),
                observer: Mutex::new(None),
                reconnector: Mutex::new(None),
                next_generation: AtomicU64::new(0),
                watchdog,
                cancel: CancellationToken::new(),
            }
        });

        Self { inner }
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.inner.config
    }

    pub fn target(&self) -> &DeviceTarget {
        &self.inner.config.target
    }

    // ── Status access ────────────────────────────────────────────

    /// The most recent snapshot. Retained across outages.
    pub fn status(&self) -> Arc<DeviceStatus> {
        self.inner.status.borrow().clone()
    }

    pub fn subscribe_status(&self) -> StatusWatch {
        StatusWatch::new(self.inner.status.subscribe())
    }

    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.connection_state.subscribe()
    }

    pub fn is_observing(&self) -> bool {
        lock(&self.inner.observer).is_some()
    }

    pub fn is_watchdog_armed(&self) -> bool {
        self.inner.watchdog.is_armed()
    }

    // ── Listeners ────────────────────────────────────────────────

    /// Register a callback run after every status change.
    ///
    /// The first listener starts observation. Callbacks run synchronously
    /// during fan-out and should only read [`status`](Self::status) and
    /// schedule their own work.
    pub fn add_listener<F>(&self, callback: F) -> ListenerHandle
    where
        F: Fn() + Send + Sync + 'static,
    {
        let id = self.inner.add_listener(Arc::new(callback));
        let owner: Weak<dyn ListenerOwner> = Arc::downgrade(&self.inner) as Weak<dyn ListenerOwner>;
        ListenerHandle { id, owner }
    }

    /// Unregister `id`. Unknown or already removed ids are ignored.
    pub fn remove_listener(&self, id: ListenerId) {
        self.inner.remove_listener(id);
    }

    pub fn listener_count(&self) -> usize {
        self.inner.listeners.len()
    }

    // ── Commands ─────────────────────────────────────────────────

    /// Write one key. On success the snapshot reflects it and every
    /// listener has been notified before this returns.
    pub async fn set_value(&self, key: &str, value: impl Into<StatusValue>) -> Result<(), CoreError> {
        let value = value.into();
        let client = self.inner.current_client()?;
        debug!(key, value = %value, "setting control value");

        client.set_control_value(key, value.clone()).await?;
        self.inner.publish_patch(&StatusPatch::single(key, value));
        Ok(())
    }

    /// Write several keys in one request. Same guarantees as
    /// [`set_value`](Self::set_value).
    ///
    /// An empty patch is not a write: nothing is sent, the snapshot is
    /// unchanged and no listener is notified.
    pub async fn set_values(&self, patch: &StatusPatch) -> Result<(), CoreError> {
        if patch.is_empty() {
            return Ok(());
        }
        let client = self.inner.current_client()?;
        debug!(keys = patch.len(), "setting control values");

        client.set_control_values(patch).await?;
        self.inner.publish_patch(patch);
        Ok(())
    }

    /// Fetch the full status once and publish it.
    pub async fn refresh(&self) -> Result<Arc<DeviceStatus>, CoreError> {
        let client = self.inner.current_client()?;
        let status = Arc::new(client.fetch_status().await?);
        self.inner.publish(Arc::clone(&status));
        Ok(status)
    }

    // ── Lifecycle ────────────────────────────────────────────────

    /// Replace the session, superseding any reconnect still in flight.
    pub fn reconnect(&self) {
        self.inner.reconnect();
    }

    /// Stop every background task and close the session.
    ///
    /// Safe to call when nothing is running. The coordinator must not be
    /// used afterwards.
    pub async fn shutdown(&self) {
        debug!(host = %self.inner.config.target, "shutting down coordinator");
        self.inner.cancel.cancel();

        if let Some(task) = lock(&self.inner.reconnector).take() {
            task.stop();
        }
        if let Some(task) = lock(&self.inner.observer).take() {
            task.stop();
        }
        self.inner.watchdog.cancel();

        let client = lock(&self.inner.client).take();
        if let Some(client) = client {
            if let Err(e) = client.shutdown().await {
                warn!(error = %e, "closing device session failed");
            }
        }

        self.inner.set_state(ConnectionState::Disconnected);
        info!(host = %self.inner.config.target, "coordinator shut down");
    }
}

// ── Internals ────────────────────────────────────────────────────

impl<C: Connector> ListenerOwner for CoordinatorInner<C> {
    fn remove_listener(&self, id: ListenerId) {
        let mut observer = lock(&self.observer);
        if !self.listeners.remove(id) {
            return;
        }

        debug!("last listener removed, stopping observation");
        if let Some(task) = observer.take() {
            task.stop();
        }
        drop(observer);
        self.watchdog.cancel();

        let connected = lock(&self.client).is_some();
        let reconnecting = lock(&self.reconnector).is_some();
        if connected && !reconnecting {
            self.set_state(ConnectionState::Connected);
        }
    }
}

impl<C: Connector> CoordinatorInner<C> {
    /// A first listener with no session to observe (the last reconnect gave
    /// up) starts a fresh reconnect unless one is already running.
    fn add_listener(self: &Arc<Self>, listener: Listener) -> ListenerId {
        let mut observer = lock(&self.observer);
        let (id, was_empty) = self.listeners.add(listener);
        let deferred = was_empty && !self.start_observing(&mut observer);
        drop(observer);

        if deferred {
            let no_session = lock(&self.client).is_none();
            let reconnecting = lock(&self.reconnector).is_some();
            if no_session && !reconnecting {
                debug!(listener = %id, "no session for new listener, reconnecting");
                self.reconnect();
            }
        }
        id
    }

    fn current_client(&self) -> Result<Arc<C::Client>, CoreError> {
        lock(&self.client).clone().ok_or(CoreError::NotConnected)
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = self.connection_state.send_replace(state);
        if previous != state {
            debug!(from = %previous, to = %state, "connection state changed");
        }
    }

    fn next_generation(&self) -> u64 {
        self.next_generation.fetch_add(1, Ordering::Relaxed)
    }

    // ── Fan-out ──────────────────────────────────────────────────

    fn publish(&self, status: Arc<DeviceStatus>) {
        let _round = lock(&self.fanout);
        self.status.send_replace(status);
        self.listeners.notify_all();
    }

    /// Merge `patch` into the current snapshot and notify.
    fn publish_patch(&self, patch: &StatusPatch) {
        let _round = lock(&self.fanout);
        self.status.send_modify(|status| Arc::make_mut(status).apply(patch));
        self.listeners.notify_all();
    }

    fn on_snapshot(&self, status: DeviceStatus) {
        if self.config.watchdog_enabled {
            self.watchdog.reset();
        }
        self.publish(Arc::new(status));
    }

    // ── Observation ──────────────────────────────────────────────

    /// Spawn the observe task into `slot` unless one is running.
    ///
    /// Returns `false` when observation could not start: no session yet, or
    /// the coordinator is shut down.
    fn start_observing(self: &Arc<Self>, slot: &mut Option<TaskSlot>) -> bool {
        if slot.is_some() {
            return true;
        }
        if self.cancel.is_cancelled() {
            return false;
        }
        let Ok(client) = self.current_client() else {
            debug!("no session, observation deferred");
            return false;
        };

        let generation = self.next_generation();
        let cancel = self.cancel.child_token();
        let handle = tokio::spawn(observe_loop(
            Arc::clone(self),
            client,
            generation,
            cancel.clone(),
        ));
        *slot = Some(TaskSlot {
            generation,
            cancel,
            handle,
        });

        self.watchdog.start();
        self.set_state(ConnectionState::Observing);
        debug!(generation, "observation started");
        true
    }

    fn observer_is_current(&self, generation: u64) -> bool {
        lock(&self.observer)
            .as_ref()
            .is_some_and(|task| task.generation == generation)
    }

    // ── Reconnect ────────────────────────────────────────────────

    fn reconnect(self: &Arc<Self>) {
        if self.cancel.is_cancelled() {
            return;
        }

        let mut reconnector = lock(&self.reconnector);
        if let Some(previous) = reconnector.take() {
            debug!(generation = previous.generation, "superseding reconnect in flight");
            previous.stop();
        }
        if let Some(task) = lock(&self.observer).take() {
            task.stop();
        }

        let generation = self.next_generation();
        let cancel = self.cancel.child_token();
        self.set_state(ConnectionState::Reconnecting { attempt: 1 });
        let handle = tokio::spawn(reconnect_task(Arc::clone(self), generation, cancel.clone()));
        *reconnector = Some(TaskSlot {
            generation,
            cancel,
            handle,
        });
    }

    /// Install `client` if reconnect `generation` is still authoritative.
    fn finish_reconnect(self: &Arc<Self>, generation: u64, client: C::Client) {
        let client = Arc::new(client);
        let mut reconnector = lock(&self.reconnector);
        let current = reconnector
            .as_ref()
            .is_some_and(|task| task.generation == generation);

        if !current || self.cancel.is_cancelled() {
            drop(reconnector);
            debug!(generation, "discarding session from superseded reconnect");
            tokio::spawn(async move { close_quietly(&*client).await });
            return;
        }

        *lock(&self.client) = Some(client);
        info!(host = %self.config.target, "reconnected to device");

        let mut observer = lock(&self.observer);
        if self.listeners.is_empty() {
            self.set_state(ConnectionState::Connected);
        } else if !self.start_observing(&mut observer) {
            warn!("observation did not start after reconnect");
        }
        drop(observer);

        *reconnector = None;
    }

    fn fail_reconnect(&self, generation: u64) {
        let mut reconnector = lock(&self.reconnector);
        if reconnector
            .as_ref()
            .is_some_and(|task| task.generation == generation)
        {
            *reconnector = None;
            self.set_state(ConnectionState::Disconnected);
        }
    }
}

// ── Background tasks ─────────────────────────────────────────────

async fn observe_loop<C: Connector>(
    inner: Arc<CoordinatorInner<C>>,
    client: Arc<C::Client>,
    generation: u64,
    cancel: CancellationToken,
) {
    let mut stream = client.observe_status();

    loop {
        let item = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                debug!(generation, "observation cancelled");
                return;
            }
            item = stream.next() => item,
        };

        match item {
            Some(Ok(status)) => {
                if !inner.observer_is_current(generation) {
                    return;
                }
                inner.on_snapshot(status);
            }
            Some(Err(e)) => {
                warn!(host = %inner.config.target, error = %e, "status stream failed");
                break;
            }
            None => {
                warn!(host = %inner.config.target, "status stream ended");
                break;
            }
        }
    }

    if !cancel.is_cancelled() && inner.observer_is_current(generation) {
        inner.reconnect();
    }
}

async fn reconnect_task<C: Connector>(
    inner: Arc<CoordinatorInner<C>>,
    generation: u64,
    cancel: CancellationToken,
) {
    let target = &inner.config.target;

    let previous = lock(&inner.client).take();
    if let Some(previous) = previous {
        tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            () = close_quietly(&*previous) => {}
        }
    }

    let mut attempt: u32 = 0;
    loop {
        if attempt > 0 {
            inner.set_state(ConnectionState::Reconnecting { attempt: attempt + 1 });
        }
        debug!(host = %target, attempt = attempt + 1, "opening new device session");

        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                debug!(generation, "reconnect cancelled");
                return;
            }
            result = tokio::time::timeout(inner.config.setup_timeout, inner.connector.connect(target)) => result,
        };

        match result {
            Ok(Ok(client)) => {
                inner.finish_reconnect(generation, client);
                return;
            }
            Ok(Err(e)) => {
                warn!(host = %target, error = %e, attempt = attempt + 1, "reconnect attempt failed");
            }
            Err(_) => {
                warn!(
                    host = %target,
                    timeout_secs = inner.config.setup_timeout.as_secs(),
                    attempt = attempt + 1,
                    "reconnect attempt timed out"
                );
            }
        }

        if inner.config.reconnect.exhausted(attempt) {
            error!(
                host = %target,
                attempts = attempt + 1,
                "reconnect attempts exhausted, waiting for the next trigger"
            );
            inner.fail_reconnect(generation);
            return;
        }

        let delay = inner.config.reconnect.delay_before_retry(attempt);
        debug!(
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            attempt = attempt + 1,
            "waiting before next reconnect attempt"
        );
        tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            () = tokio::time::sleep(delay) => {}
        }
        attempt += 1;
    }
}

// ── Helpers ──────────────────────────────────────────────────────

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn close_quietly<D: DeviceClient>(client: &D) {
    if let Err(e) = client.shutdown().await {
        debug!(error = %e, "closing device session failed");
    }
}

fn setup_timeout(target: &DeviceTarget, timeout: std::time::Duration) -> CoreError {
    CoreError::SetupTimeout {
        target: target.to_string(),
        timeout_secs: timeout.as_secs(),
    }
}

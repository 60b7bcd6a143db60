// ── Watchdog timer ──
//
// Restartable countdown that fires a callback when it is not reset in time.
// The coordinator arms it while observing and resets it on every pushed
// snapshot, so a silent observe subscription still ends in a reconnect.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

/// Invoked on expiry, on the watchdog's own task.
pub type WatchdogCallback = Arc<dyn Fn() + Send + Sync>;

/// A restartable countdown.
///
/// Created disarmed. Dropping the watchdog cancels any armed countdown.
pub struct Watchdog {
    inner: Arc<WatchdogInner>,
}

struct WatchdogInner {
    timeout: Mutex<Duration>,
    auto_restart: AtomicBool,
    callback: WatchdogCallback,
    job: Mutex<Option<Job>>,
    next_job: AtomicU64,
}

struct Job {
    id: u64,
    cancel: CancellationToken,
}

impl Watchdog {
    pub fn new(timeout: Duration, callback: WatchdogCallback) -> Self {
        Self {
            inner: Arc::new(WatchdogInner {
                timeout: Mutex::new(timeout),
                auto_restart: AtomicBool::new(false),
                callback,
                job: Mutex::new(None),
                next_job: AtomicU64::new(0),
            }),
        }
    }

    pub fn timeout(&self) -> Duration {
        *self.inner.timeout.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn auto_restart(&self) -> bool {
        self.inner.auto_restart.load(Ordering::Acquire)
    }

    /// Keep counting down again after each expiry.
    pub fn set_auto_restart(&self, enabled: bool) {
        self.inner.auto_restart.store(enabled, Ordering::Release);
    }

    /// Arm the countdown. Does nothing if it is already armed.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self) {
        let mut job = self.inner.lock_job();
        if job.is_some() {
            return;
        }

        let id = self.inner.next_job.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        *job = Some(Job {
            id,
            cancel: cancel.clone(),
        });
        drop(job);

        tokio::spawn(run_job(Arc::clone(&self.inner), id, cancel));
    }

    /// Restart the countdown from now, arming it if needed.
    ///
    /// If the callback is running, the old countdown ends once it returns.
    pub fn reset(&self) {
        self.cancel();
        self.start();
    }

    /// Disarm the countdown. A callback already running completes.
    pub fn cancel(&self) {
        if let Some(job) = self.inner.lock_job().take() {
            job.cancel.cancel();
        }
    }

    /// Change the timeout; takes effect immediately through a reset.
    pub fn set_timeout(&self, timeout: Duration) {
        *self
            .inner
            .timeout
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = timeout;
        self.reset();
    }

    pub fn is_armed(&self) -> bool {
        self.inner.lock_job().is_some()
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl WatchdogInner {
    fn lock_job(&self) -> std::sync::MutexGuard<'_, Option<Job>> {
        self.job.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn current_timeout(&self) -> Duration {
        *self.timeout.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Clear the slot if it still belongs to job `id`.
    fn release(&self, id: u64) {
        let mut job = self.lock_job();
        if job.as_ref().is_some_and(|j| j.id == id) {
            *job = None;
        }
    }
}

async fn run_job(inner: Arc<WatchdogInner>, id: u64, cancel: CancellationToken) {
    loop {
        let timeout = inner.current_timeout();
        debug!(?timeout, "watchdog armed");

        tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            () = tokio::time::sleep(timeout) => {}
        }

        debug!("watchdog expired");
        if catch_unwind(AssertUnwindSafe(|| (inner.callback)())).is_err() {
            error!("watchdog callback panicked");
        }

        // A reset or cancel issued during the callback lands here.
        if cancel.is_cancelled() {
            return;
        }
        if !inner.auto_restart.load(Ordering::Acquire) {
            inner.release(id);
            return;
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    fn counting_watchdog(timeout: Duration) -> (Watchdog, Arc<AtomicUsize>) {
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        let watchdog = Watchdog::new(
            timeout,
            Arc::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );
        (watchdog, fired)
    }

    async fn sleep_secs(secs: u64) {
        tokio::time::sleep(Duration::from_secs(secs)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn created_disarmed() {
        let (watchdog, fired) = counting_watchdog(Duration::from_secs(10));
        assert!(!watchdog.is_armed());

        sleep_secs(60).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn fires_once_after_timeout() {
        let (watchdog, fired) = counting_watchdog(Duration::from_secs(10));
        watchdog.start();

        sleep_secs(9).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        sleep_secs(2).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!watchdog.is_armed());

        sleep_secs(60).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn reset_postpones_expiry() {
        let (watchdog, fired) = counting_watchdog(Duration::from_secs(10));
        watchdog.start();

        sleep_secs(8).await;
        watchdog.reset();
        sleep_secs(8).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        sleep_secs(3).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn start_while_armed_does_not_postpone() {
        let (watchdog, fired) = counting_watchdog(Duration::from_secs(10));
        watchdog.start();

        sleep_secs(8).await;
        watchdog.start();
        sleep_secs(3).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_prevents_expiry() {
        let (watchdog, fired) = counting_watchdog(Duration::from_secs(10));
        watchdog.start();
        watchdog.cancel();
        assert!(!watchdog.is_armed());

        sleep_secs(30).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        // Cancelling a disarmed watchdog is harmless.
        watchdog.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn auto_restart_keeps_firing() {
        let (watchdog, fired) = counting_watchdog(Duration::from_secs(10));
        watchdog.set_auto_restart(true);
        watchdog.start();

        sleep_secs(35).await;
        assert_eq!(fired.load(Ordering::SeqCst), 3);
        assert!(watchdog.is_armed());

        watchdog.cancel();
        sleep_secs(30).await;
        assert_eq!(fired.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn set_timeout_takes_effect_immediately() {
        let (watchdog, fired) = counting_watchdog(Duration::from_secs(100));
        watchdog.start();

        sleep_secs(50).await;
        watchdog.set_timeout(Duration::from_secs(5));
        assert_eq!(watchdog.timeout(), Duration::from_secs(5));

        sleep_secs(6).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_from_callback_stops_auto_restart() {
        let fired = Arc::new(AtomicUsize::new(0));
        let slot: Arc<Mutex<Option<Arc<Watchdog>>>> = Arc::new(Mutex::new(None));

        let counter = Arc::clone(&fired);
        let callback_slot = Arc::clone(&slot);
        let watchdog = Arc::new(Watchdog::new(
            Duration::from_secs(10),
            Arc::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                if let Some(w) = callback_slot.lock().unwrap().as_ref() {
                    w.cancel();
                }
            }),
        ));
        *slot.lock().unwrap() = Some(Arc::clone(&watchdog));

        watchdog.set_auto_restart(true);
        watchdog.start();

        sleep_secs(45).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!watchdog.is_armed());

        slot.lock().unwrap().take();
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_callback_does_not_kill_the_timer() {
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        let watchdog = Watchdog::new(
            Duration::from_secs(10),
            Arc::new(move || {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    panic!("first expiry fails");
                }
            }),
        );
        watchdog.set_auto_restart(true);
        watchdog.start();

        sleep_secs(25).await;
        assert_eq!(fired.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn drop_disarms() {
        let (watchdog, fired) = counting_watchdog(Duration::from_secs(10));
        watchdog.start();
        drop(watchdog);

        sleep_secs(30).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }
}

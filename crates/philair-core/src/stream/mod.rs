// ── Status subscriptions ──
//
// Async access to the device snapshot for consumers that would rather
// await changes than register a listener callback.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_core::Stream;
use philair_api::{DeviceStatus, StatusPatch};
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

/// Follows the snapshot a [`Coordinator`](crate::Coordinator) publishes.
///
/// Every tick, successful write and refresh is visible here. Updates that
/// arrive faster than they are awaited collapse into the newest snapshot.
pub struct StatusWatch {
    receiver: watch::Receiver<Arc<DeviceStatus>>,
}

impl StatusWatch {
    pub(crate) fn new(receiver: watch::Receiver<Arc<DeviceStatus>>) -> Self {
        Self { receiver }
    }

    /// The newest published snapshot.
    pub fn snapshot(&self) -> Arc<DeviceStatus> {
        Arc::clone(&self.receiver.borrow())
    }

    /// Wait for a snapshot newer than the last one returned here.
    /// `None` once the coordinator is gone.
    pub async fn changed(&mut self) -> Option<Arc<DeviceStatus>> {
        self.receiver.changed().await.ok()?;
        Some(Arc::clone(&self.receiver.borrow_and_update()))
    }

    /// Wait until the device reports every key of `patch`, e.g. to confirm
    /// a write came back through observation. Returns immediately when the
    /// current snapshot already matches.
    pub async fn wait_for_patch(&mut self, patch: &StatusPatch) -> Option<Arc<DeviceStatus>> {
        let status = self
            .receiver
            .wait_for(|status| patch.matches(status, None))
            .await
            .ok()?;
        Some(Arc::clone(&status))
    }

    /// Snapshots as a `Stream`, starting with the current one.
    pub fn into_stream(self) -> StatusWatchStream {
        StatusWatchStream {
            inner: WatchStream::new(self.receiver),
        }
    }
}

/// `Stream` of device snapshots, see [`StatusWatch::into_stream`].
pub struct StatusWatchStream {
    inner: WatchStream<Arc<DeviceStatus>>,
}

impl Stream for StatusWatchStream {
    type Item = Arc<DeviceStatus>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

use futures_util::stream::{self, BoxStream, StreamExt};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tracing::debug;

/// Online/offline signal. Streams must yield the current status first and
/// afterwards every actual transition, in order.
pub trait ConnectivityObserver: Send + Sync {
    fn observe(&self) -> BoxStream<'static, bool>;
}

/// Connectivity fed by the platform shell through [`ShellConnectivity::set_online`].
///
/// Each subscriber gets its own queue, so a quick offline/online blip reaches
/// every observer as two transitions instead of collapsing into one value.
#[derive(Debug)]
pub struct ShellConnectivity {
    inner: Mutex<Subscribers>,
}

#[derive(Debug)]
struct Subscribers {
    online: bool,
    senders: Vec<mpsc::UnboundedSender<bool>>,
}

impl ShellConnectivity {
    pub fn new(online: bool) -> Self {
        Self {
            inner: Mutex::new(Subscribers {
                online,
                senders: Vec::new(),
            }),
        }
    }

    pub fn set_online(&self, online: bool) {
        let mut inner = self.lock();
        if inner.online == online {
            return;
        }
        inner.online = online;
        inner.senders.retain(|tx| tx.send(online).is_ok());
        debug!(online, observers = inner.senders.len(), "connectivity changed");
    }

    pub fn is_online(&self) -> bool {
        self.lock().online
    }

    fn lock(&self) -> MutexGuard<'_, Subscribers> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for ShellConnectivity {
    fn default() -> Self {
        Self::new(true)
    }
}

impl ConnectivityObserver for ShellConnectivity {
    fn observe(&self) -> BoxStream<'static, bool> {
        let (tx, rx) = mpsc::unbounded_channel();
        {
            // Seed and register under one lock so no transition slips between.
            let mut inner = self.lock();
            let _ = tx.send(inner.online);
            inner.senders.push(tx);
        }
        stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|online| (online, rx)) }).boxed()
    }
}

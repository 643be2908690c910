//! Swappable connection handles and the task that keeps them connected.
//!
//! Every external handle (work queue, cache, database) lives in a
//! [`ConnectionSlot`]. Components read the current handle on each use; the
//! [`Supervisor`] refills an empty slot, retrying after a fixed delay until a
//! connection succeeds.

use anyhow::Result;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

/// An atomically swappable, possibly empty connection handle.
pub struct ConnectionSlot<T: ?Sized> {
    name: &'static str,
    tx: Arc<watch::Sender<Option<Arc<T>>>>,
}

impl<T: ?Sized> Clone for ConnectionSlot<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            tx: Arc::clone(&self.tx),
        }
    }
}

impl<T: ?Sized> std::fmt::Debug for ConnectionSlot<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionSlot")
            .field("name", &self.name)
            .field("connected", &self.is_connected())
            .finish()
    }
}

impl<T: ?Sized> ConnectionSlot<T> {
    /// Empty slot.
    pub fn empty(name: &'static str) -> Self {
        let (tx, _rx) = watch::channel(None);
        Self {
            name,
            tx: Arc::new(tx),
        }
    }

    /// Slot holding `handle`.
    pub fn with(name: &'static str, handle: Arc<T>) -> Self {
        let slot = Self::empty(name);
        slot.install(handle);
        slot
    }

    /// Name used in logs.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Current handle, if connected.
    pub fn current(&self) -> Option<Arc<T>> {
        self.tx.borrow().clone()
    }

    /// True if a handle is installed.
    pub fn is_connected(&self) -> bool {
        self.tx.borrow().is_some()
    }

    /// Wait until a handle is installed.
    pub async fn wait(&self) -> Arc<T> {
        let mut rx = self.tx.subscribe();
        loop {
            if let Some(handle) = rx.borrow_and_update().clone() {
                return handle;
            }
            // Cannot fail: the sender lives in self.
            let _ = rx.changed().await;
        }
    }

    /// Install a fresh handle, replacing any previous one.
    pub fn install(&self, handle: Arc<T>) {
        self.tx.send_replace(Some(handle));
    }

    /// Drop `stale` after a transport fault.
    ///
    /// Does nothing if the slot already holds a different handle, so late
    /// reports about an old connection never clear a new one.
    pub fn invalidate(&self, stale: &Arc<T>) {
        let cleared = self.tx.send_if_modified(|current| match current {
            Some(handle) if Arc::ptr_eq(handle, stale) => {
                *current = None;
                true
            }
            _ => false,
        });
        if cleared {
            warn!("{} connection lost", self.name);
        }
    }

    /// Wait until the slot is empty.
    async fn wait_empty(&self) {
        let mut rx = self.tx.subscribe();
        // Cannot fail: the sender lives in self.
        let _ = rx.wait_for(Option::is_none).await;
    }
}

/// Reconnect loop for one slot.
#[derive(Debug)]
pub struct Supervisor<T: ?Sized> {
    slot: ConnectionSlot<T>,
    delay: Duration,
}

impl<T: ?Sized> Supervisor<T> {
    /// Supervise `slot`, waiting `delay` between failed attempts.
    pub fn new(slot: ConnectionSlot<T>, delay: Duration) -> Self {
        Self { slot, delay }
    }

    /// Keep the slot filled, forever.
    ///
    /// `connect` is called whenever the slot is empty. A failed attempt is
    /// logged and retried after the fixed delay.
    pub async fn run<F, Fut>(self, connect: F)
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<Arc<T>>>,
    {
        loop {
            self.slot.wait_empty().await;
            self.reconnect(&connect).await;
        }
    }

    /// Connect until one attempt succeeds and install the handle.
    pub async fn reconnect<F, Fut>(&self, connect: &F)
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<Arc<T>>>,
    {
        let mut attempt: u64 = 0;
        loop {
            attempt += 1;
            match connect().await {
                Ok(handle) => {
                    self.slot.install(handle);
                    info!("{} connected (attempt {})", self.slot.name(), attempt);
                    return;
                }
                Err(e) => {
                    warn!(
                        "transport fault: {} connect attempt {} failed: {:#}; retrying in {:?}",
                        self.slot.name(),
                        attempt,
                        e,
                        self.delay
                    );
                    tokio::time::sleep(self.delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_wait_returns_installed_handle() {
        let slot: ConnectionSlot<u32> = ConnectionSlot::empty("test");
        assert!(slot.current().is_none());

        let waiter = {
            let slot = slot.clone();
            tokio::spawn(async move { *slot.wait().await })
        };
        slot.install(Arc::new(7));
        assert_eq!(waiter.await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_invalidate_ignores_stale_handle() {
        let old = Arc::new(1u32);
        let slot = ConnectionSlot::with("test", Arc::clone(&old));

        let new = Arc::new(2u32);
        slot.install(Arc::clone(&new));
        slot.invalidate(&old);
        assert_eq!(slot.current().map(|h| *h), Some(2));

        slot.invalidate(&new);
        assert!(!slot.is_connected());
    }

    #[tokio::test]
    async fn test_supervisor_retries_until_connected() {
        let slot: ConnectionSlot<u32> = ConnectionSlot::empty("test");
        let attempts = Arc::new(AtomicU32::new(0));

        let supervisor = Supervisor::new(slot.clone(), Duration::from_millis(5));
        let counter = Arc::clone(&attempts);
        let handle = tokio::spawn(supervisor.run(move || {
            let counter = Arc::clone(&counter);
            async move {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    anyhow::bail!("refused");
                }
                Ok(Arc::new(n))
            }
        }));

        assert_eq!(*slot.wait().await, 3);

        // A lost connection is re-established.
        let current = slot.current().unwrap();
        slot.invalidate(&current);
        let next = slot.wait().await;
        assert_eq!(*next, 4);

        handle.abort();
    }
}

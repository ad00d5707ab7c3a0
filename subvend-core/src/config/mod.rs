//! Versioned runtime configuration.
//!
//! Admin updates (prices, treasury address) swap a complete new value into
//! the store; readers hold a read guard over one coherent version and can
//! never observe a half-updated configuration. Consumers that care about
//! changes subscribe for a wakeup instead of polling.

use std::sync::Arc;
use tokio::sync::{RwLock, RwLockReadGuard, watch};

/// A shared, versioned configuration value with change notification.
pub struct ConfigStore<T> {
    inner: Arc<Inner<T>>,
}

struct Inner<T> {
    data: RwLock<T>,
    version_tx: watch::Sender<u64>,
}

impl<T> ConfigStore<T> {
    pub fn new(initial: T) -> Self {
        let (version_tx, _) = watch::channel(0u64);
        Self {
            inner: Arc::new(Inner {
                data: RwLock::new(initial),
                version_tx,
            }),
        }
    }

    /// Read the current version.
    pub async fn read(&self) -> RwLockReadGuard<'_, T> {
        self.inner.data.read().await
    }

    /// Replace the stored value and notify all watchers.
    pub async fn update(&self, value: T) {
        let mut guard = self.inner.data.write().await;
        *guard = value;
        drop(guard);
        self.inner.version_tx.send_modify(|v| *v += 1);
    }

    pub fn version(&self) -> u64 {
        *self.inner.version_tx.borrow()
    }

    /// Subscribe to change notifications.
    pub fn subscribe(&self) -> ConfigWatcher {
        ConfigWatcher {
            version_rx: self.inner.version_tx.subscribe(),
        }
    }
}

impl<T> Clone for ConfigStore<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Receives a wakeup when the owning [`ConfigStore`] is updated.
pub struct ConfigWatcher {
    version_rx: watch::Receiver<u64>,
}

impl ConfigWatcher {
    /// Wait until the config store is updated. `Err` means the store was
    /// dropped.
    pub async fn changed(&mut self) -> Result<(), watch::error::RecvError> {
        self.version_rx.changed().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn swap_is_whole_value() {
        let store = ConfigStore::new((1, "one"));
        assert_eq!(*store.read().await, (1, "one"));
        store.update((2, "two")).await;
        assert_eq!(*store.read().await, (2, "two"));
        assert_eq!(store.version(), 1);
    }

    #[tokio::test]
    async fn watcher_sees_update() {
        let store = ConfigStore::new(0u32);
        let mut watcher = store.subscribe();
        store.update(7).await;
        watcher.changed().await.unwrap();
        assert_eq!(*store.read().await, 7);
    }
}

//! The contract between a [`Bluetooth`][crate::Bluetooth] adapter and the environment that
//! actually talks to devices.
//!
//! The adapter never touches a Bluetooth stack directly. Everything goes through a [`Host`]: on
//! Linux that is [`BluezHost`][crate::bluez::BluezHost], in tests it is usually an in-memory fake.

use std::{fmt, sync::Arc};

use futures_util::future::BoxFuture;

use crate::{options::RequestOptions, Result};

/// Callback invoked by a [`HostDevice`] when its transport goes away.
pub type DisconnectListener = Arc<dyn Fn() + Send + Sync>;

/// A host environment offering Bluetooth device selection.
pub trait Host: Send + Sync + 'static {
    type Device: HostDevice;

    /// Returns whether this environment can select devices at all.
    ///
    /// Must not change over the lifetime of the host.
    fn is_supported(&self) -> bool;

    /// Lets the environment (or its user) pick a device matching `options`.
    ///
    /// Rejects when selection is cancelled, no device matches, or permission is denied.
    fn request_device<'a>(
        &'a self,
        options: &'a RequestOptions,
    ) -> BoxFuture<'a, Result<Self::Device>>;
}

/// A device handle returned by [`Host::request_device`].
pub trait HostDevice: Clone + Send + Sync + 'static {
    /// Handle to an established transport (GATT server connection).
    type Server: Clone + Send + Sync + 'static;

    /// Establishes a transport to the device.
    fn connect(&self) -> BoxFuture<'_, Result<Self::Server>>;

    /// Arranges for `listener` to be called whenever the device's transport is severed.
    ///
    /// The listener must not be called anymore once the returned [`Subscription`] is detached.
    fn observe_disconnect(&self, listener: DisconnectListener) -> Subscription;
}

/// An active event observation.
///
/// Detaching runs the cleanup action registered by the host. This happens exactly once, either
/// through [`Subscription::unsubscribe`] or when the [`Subscription`] is dropped.
#[must_use = "dropping a `Subscription` detaches it immediately"]
pub struct Subscription {
    detach: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    /// Creates a [`Subscription`] that runs `detach` when it ends.
    pub fn new(detach: impl FnOnce() + Send + 'static) -> Self {
        Self {
            detach: Some(Box::new(detach)),
        }
    }

    /// A [`Subscription`] with nothing to clean up.
    pub fn noop() -> Self {
        Self { detach: None }
    }

    /// Detaches the observation.
    pub fn unsubscribe(mut self) {
        self.run_detach();
    }

    fn run_detach(&mut self) {
        if let Some(detach) = self.detach.take() {
            detach();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.run_detach();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.detach.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn detaches_once() {
        let count = Arc::new(AtomicUsize::new(0));

        let c = count.clone();
        let sub = Subscription::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        sub.unsubscribe();
        assert_eq!(count.load(Ordering::SeqCst), 1);

        let c = count.clone();
        drop(Subscription::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(count.load(Ordering::SeqCst), 2);

        Subscription::noop().unsubscribe();
    }
}

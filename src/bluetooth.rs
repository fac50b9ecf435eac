//! The connection-state adapter.

use std::{
    fmt,
    sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
};

use crate::{
    host::{DisconnectListener, Host, HostDevice, Subscription},
    options::AdapterConfig,
    signal::{Derived, Signal},
    Error, ErrorKind,
};

/// The transport handle type produced by a [`Host`]'s devices.
pub type ServerOf<H> = <<H as Host>::Device as HostDevice>::Server;

/// Where a [`Bluetooth`] adapter is in its request/connect/disconnect cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No device has been selected yet.
    Idle,
    /// [`Bluetooth::request_device`] is waiting for the host to select a device.
    Selecting,
    /// A device is selected, but no transport is established (connecting failed, or the device
    /// disconnected).
    Selected,
    /// A device is selected and a transport is being established.
    Connecting,
    /// A transport to the selected device is established.
    Connected,
}

struct Lifecycle {
    /// Incremented by every `request_device` call. Work tagged with an older generation is stale.
    generation: u64,
    subscription: Option<Subscription>,
    disposed: bool,
}

/// An observable view of a single Bluetooth device connection.
///
/// [`Bluetooth::request_device`] asks the [`Host`] to select a device, watches it for
/// disconnection and connects to it. The outcome is only ever reported through the adapter's
/// signals ([`Bluetooth::device`], [`Bluetooth::server`], [`Bluetooth::is_connected`],
/// [`Bluetooth::error`], ...), never by the call itself.
///
/// Disconnection is surfaced, not recovered from: when the device drops the connection, the
/// server is cleared and the device stays selected until the next request.
pub struct Bluetooth<H: Host> {
    host: Arc<H>,
    config: AdapterConfig,
    is_supported: Signal<bool>,
    device: Signal<Option<H::Device>>,
    server: Signal<Option<ServerOf<H>>>,
    error: Signal<Option<Arc<Error>>>,
    state: Signal<ConnectionState>,
    lifecycle: Arc<Mutex<Lifecycle>>,
}

impl<H: Host> Bluetooth<H> {
    /// Creates an adapter talking to `host`.
    ///
    /// The capability probe runs once, here.
    pub fn new(host: Arc<H>, config: AdapterConfig) -> Self {
        let supported = host.is_supported();
        log::debug!("creating Bluetooth adapter (supported: {})", supported);

        Self {
            host,
            config,
            is_supported: Signal::new(supported),
            device: Signal::new(None),
            server: Signal::new(None),
            error: Signal::new(None),
            state: Signal::new(ConnectionState::Idle),
            lifecycle: Arc::new(Mutex::new(Lifecycle {
                generation: 0,
                subscription: None,
                disposed: false,
            })),
        }
    }

    /// The host this adapter selects devices through.
    pub fn host(&self) -> &Arc<H> {
        &self.host
    }

    /// The configuration this adapter was created with.
    pub fn config(&self) -> &AdapterConfig {
        &self.config
    }

    /// Whether the host environment supports device selection.
    pub fn is_supported(&self) -> Signal<bool> {
        self.is_supported.clone()
    }

    /// The most recently selected device.
    pub fn device(&self) -> Signal<Option<H::Device>> {
        self.device.clone()
    }

    /// The transport to [`Bluetooth::device`], present while connected.
    pub fn server(&self) -> Signal<Option<ServerOf<H>>> {
        self.server.clone()
    }

    /// `true` exactly when [`Bluetooth::server`] is present.
    pub fn is_connected(&self) -> Derived<bool> {
        self.server.map(Option::is_some)
    }

    /// The last failure of [`Bluetooth::request_device`].
    ///
    /// Overwritten by every failure and cleared by the next fully successful request.
    /// Disconnections are not failures and never touch this.
    pub fn error(&self) -> Signal<Option<Arc<Error>>> {
        self.error.clone()
    }

    /// The adapter's current [`ConnectionState`].
    pub fn state(&self) -> Signal<ConnectionState> {
        self.state.clone()
    }

    fn lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        lock(&self.lifecycle)
    }

    fn is_current(&self, generation: u64) -> bool {
        let lifecycle = self.lifecycle();
        !lifecycle.disposed && lifecycle.generation == generation
    }

    /// Selects a device through the host and connects to it.
    ///
    /// Any disconnection listener left by a previous request is detached before anything else
    /// happens, so notifications about a superseded device cannot affect the new request.
    ///
    /// Never fails: every error is recorded in [`Bluetooth::error`].
    ///
    /// - If the host is unsupported, the error is [`ErrorKind::UnsupportedEnvironment`] and the
    ///   host is not contacted.
    /// - If selection fails ([`ErrorKind::SelectionFailed`]), the previously selected device and
    ///   server (if any) are kept, and the previous device is watched for disconnection again.
    /// - If connecting fails ([`ErrorKind::ConnectFailed`]), the new device stays selected
    ///   without a server.
    ///
    /// If another `request_device` call starts (or the adapter is disposed) while this one is
    /// suspended, this call's results are discarded.
    pub async fn request_device(&self) {
        let (generation, previous) = {
            let mut lifecycle = self.lifecycle();
            if lifecycle.disposed {
                log::warn!("`request_device` called on a disposed adapter, ignoring");
                return;
            }
            lifecycle.generation += 1;
            (lifecycle.generation, lifecycle.subscription.take())
        };
        if let Some(subscription) = previous {
            log::debug!("detaching disconnection listener of previous request");
            subscription.unsubscribe();
        }

        if !self.is_supported.get() {
            let e = Error::unsupported();
            log::warn!("{}", e);
            self.error.set(Some(Arc::new(e)));
            return;
        }

        log::debug!("requesting device (generation {})", generation);
        self.state.set(ConnectionState::Selecting);
        let selected = self
            .host
            .request_device(self.config.request_options())
            .await;
        if !self.is_current(generation) {
            log::debug!("device request {} was superseded, dropping its result", generation);
            return;
        }

        let device = match selected {
            Ok(device) => device,
            Err(e) => {
                let e = e.with_kind(ErrorKind::SelectionFailed);
                log::warn!("{}", e);
                self.error.set(Some(Arc::new(e)));
                self.rewatch_previous(generation);
                self.state.set(self.settled_state());
                return;
            }
        };

        log::debug!("device selected, connecting");
        if self.server.with(Option::is_some) {
            self.server.set(None);
        }
        self.device.set(Some(device.clone()));
        self.state.set(ConnectionState::Connecting);
        if !self.watch(generation, &device) {
            return;
        }

        let connected = device.connect().await;
        if !self.is_current(generation) {
            log::debug!("device request {} was superseded after connecting", generation);
            return;
        }

        match connected {
            Ok(server) => {
                log::debug!("connected");
                self.server.set(Some(server));
                self.error.set(None);
                self.state.set(ConnectionState::Connected);
            }
            Err(e) => {
                let e = e.with_kind(ErrorKind::ConnectFailed);
                log::warn!("{}", e);
                self.error.set(Some(Arc::new(e)));
                self.state.set(ConnectionState::Selected);
            }
        }
    }

    /// Attaches a disconnection listener for `generation` to `device`.
    ///
    /// Returns `false` (and detaches the new listener again) if `generation` is no longer current.
    fn watch(&self, generation: u64, device: &H::Device) -> bool {
        let subscription = device.observe_disconnect(self.disconnect_listener(generation));

        let stale = {
            let mut lifecycle = self.lifecycle();
            if lifecycle.disposed || lifecycle.generation != generation {
                Some(subscription)
            } else {
                lifecycle.subscription = Some(subscription);
                None
            }
        };
        match stale {
            Some(subscription) => {
                subscription.unsubscribe();
                false
            }
            None => true,
        }
    }

    /// After a failed re-selection, keeps the preserved server observed.
    fn rewatch_previous(&self, generation: u64) {
        if self.server.with(Option::is_none) {
            return;
        }
        if let Some(device) = self.device.get() {
            log::debug!("selection failed, watching the previous device again");
            self.watch(generation, &device);
        }
    }

    fn settled_state(&self) -> ConnectionState {
        if self.server.with(Option::is_some) {
            ConnectionState::Connected
        } else if self.device.with(Option::is_some) {
            ConnectionState::Selected
        } else {
            ConnectionState::Idle
        }
    }

    fn disconnect_listener(&self, generation: u64) -> DisconnectListener {
        let lifecycle: Weak<Mutex<Lifecycle>> = Arc::downgrade(&self.lifecycle);
        let server = self.server.clone();
        let state = self.state.clone();

        Arc::new(move || {
            let Some(lifecycle) = lifecycle.upgrade() else {
                return;
            };
            {
                let lifecycle = lock(&lifecycle);
                if lifecycle.disposed || lifecycle.generation != generation {
                    log::debug!(
                        "ignoring disconnection of a superseded device (generation {})",
                        generation
                    );
                    return;
                }
            }

            if server.with(Option::is_some) {
                log::debug!("device disconnected");
                server.set(None);
                state.set(ConnectionState::Selected);
            }
        })
    }

    /// Detaches the disconnection listener and freezes all signals.
    ///
    /// Later calls to [`Bluetooth::request_device`] do nothing, and change streams of this
    /// adapter's signals end. Calling this more than once has no further effect. The device is
    /// not disconnected.
    pub fn dispose(&self) {
        let subscription = {
            let mut lifecycle = self.lifecycle();
            if lifecycle.disposed {
                return;
            }
            lifecycle.disposed = true;
            lifecycle.subscription.take()
        };

        log::debug!("disposing Bluetooth adapter");
        if let Some(subscription) = subscription {
            subscription.unsubscribe();
        }

        self.device.close();
        self.server.close();
        self.error.close();
        self.state.close();
        self.is_supported.close();
    }
}

impl<H: Host> Drop for Bluetooth<H> {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl<H: Host> fmt::Debug for Bluetooth<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bluetooth")
            .field("supported", &self.is_supported.get())
            .field("state", &self.state.get())
            .field("has_device", &self.device.with(Option::is_some))
            .field("error", &self.error.get())
            .finish()
    }
}

fn lock(lifecycle: &Mutex<Lifecycle>) -> MutexGuard<'_, Lifecycle> {
    lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
}

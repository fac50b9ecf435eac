//! The BlueZ host environment.
//!
//! BlueZ has no device chooser, so [`BluezHost`] "selects" a device by running discovery on the
//! system's default adapter and picking the first device the [`RequestOptions`] accept.

mod adapter;
mod device;

pub use device::{BluezDevice, GattServer};

use std::sync::Arc;

use futures_util::future::BoxFuture;
use zbus::{fdo::ObjectManagerProxy, Connection};

use crate::{host::Host, options::RequestOptions, AdapterConfig, Bluetooth, Error, Result};

use self::adapter::{Adapter, Candidates};

/// A cloneable handle to a D-Bus connection.
#[derive(Clone)]
pub struct Session {
    conn: Connection,
}

impl Session {
    /// Connects to the system bus.
    pub async fn new() -> Result<Self> {
        Ok(Self {
            conn: Connection::system().await.map_err(Error::from)?,
        })
    }

    /// Connects to the BlueZ D-Bus object manager.
    async fn object_manager(&self) -> Result<ObjectManagerProxy<'static>> {
        Ok(ObjectManagerProxy::builder(&self.conn)
            .destination("org.bluez")
            .map_err(Error::from)?
            .path("/")
            .map_err(Error::from)?
            .build()
            .await
            .map_err(Error::from)?)
    }
}

/// A [`Host`] backed by BlueZ.
pub struct BluezHost {
    session: Option<Session>,
    supported: bool,
}

impl BluezHost {
    /// Creates a host on `session`, probing once for Bluetooth adapters.
    ///
    /// The host is unsupported if BlueZ exposes no adapter (or cannot be reached).
    pub async fn new(session: Session) -> Self {
        let supported = match Adapter::enumerate(&session).await {
            Ok(adapters) => !adapters.is_empty(),
            Err(e) => {
                log::warn!("failed to enumerate BlueZ adapters: {}", e);
                false
            }
        };
        log::debug!("BlueZ host supported: {}", supported);

        Self {
            session: Some(session),
            supported,
        }
    }

    /// Creates a host on the system bus.
    ///
    /// Never fails: when the system bus is unreachable, the returned host reports itself as
    /// unsupported.
    pub async fn system() -> Self {
        match Session::new().await {
            Ok(session) => Self::new(session).await,
            Err(e) => {
                log::warn!("cannot connect to the system bus: {}", e);
                Self {
                    session: None,
                    supported: false,
                }
            }
        }
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    async fn select(&self, options: &RequestOptions) -> Result<BluezDevice> {
        let Some(session) = &self.session else {
            return Err(Error::unsupported());
        };
        if options.filters.is_empty() && !options.accept_all_devices {
            return Err(Error::from(
                "either filters or `accept_all_devices` must be specified",
            ));
        }

        let adapter = Adapter::open(session).await?;
        // Subscribe before discovery starts so that no device is missed.
        let mut candidates = adapter.candidates().await?;
        let started = adapter.start_discovery().await?;

        let selected = first_match(&mut candidates, options).await;

        if started {
            if let Err(e) = adapter.stop_discovery().await {
                log::warn!("failed to stop discovery on {}: {}", adapter.device_name(), e);
            }
        }
        selected
    }
}

async fn first_match(
    candidates: &mut Candidates,
    options: &RequestOptions,
) -> Result<BluezDevice> {
    loop {
        let device = candidates.next().await?;

        let name = device.alias().await.ok();
        let services = match device.service_uuids().await {
            Ok(services) => services,
            Err(e) => {
                log::debug!("skipping {:?}: {}", device, e);
                continue;
            }
        };
        log::trace!("candidate {:?}: {:?} {:?}", device, name, services);

        if options.accepts(name.as_deref(), &services) {
            log::debug!("selected {:?} ({:?})", device, name);
            return Ok(device);
        }
    }
}

impl Host for BluezHost {
    type Device = BluezDevice;

    fn is_supported(&self) -> bool {
        self.supported
    }

    /// Runs discovery until a matching device shows up.
    ///
    /// There is no built-in timeout. `optional_services` are ignored, BlueZ grants access to
    /// all services of a connected device.
    fn request_device<'a>(
        &'a self,
        options: &'a RequestOptions,
    ) -> BoxFuture<'a, Result<BluezDevice>> {
        Box::pin(self.select(options))
    }
}

impl Bluetooth<BluezHost> {
    /// Creates an adapter using BlueZ on the system bus.
    pub async fn ambient(config: AdapterConfig) -> Self {
        Self::new(Arc::new(BluezHost::system().await), config)
    }
}

use core::fmt;
use std::str::FromStr;

use futures_util::{future::BoxFuture, StreamExt};
use zbus::{
    fdo::{PropertiesChangedStream, PropertiesProxy},
    zvariant::ObjectPath,
};

use super::Session;
use crate::{
    host::{DisconnectListener, HostDevice, Subscription},
    uuid::Uuid,
    Error, Result,
};

mod private {
    use zbus::dbus_proxy;

    #[dbus_proxy(
        interface = "org.bluez.Device1",
        default_service = "org.bluez",
        assume_defaults = false
    )]
    trait Device {
        async fn connect(&self) -> zbus::Result<()>;
        async fn disconnect(&self) -> zbus::Result<()>;

        #[dbus_proxy(property)]
        fn connected(&self) -> zbus::Result<bool>;

        #[dbus_proxy(property)]
        fn name(&self) -> zbus::Result<String>;

        #[dbus_proxy(property)]
        fn alias(&self) -> zbus::Result<String>;

        #[dbus_proxy(property, name = "UUIDs")]
        fn uuids(&self) -> zbus::Result<Vec<String>>;
    }
}

use private::DeviceProxy;

/// A remote device known to BlueZ.
///
/// Returned by [`BluezHost`][super::BluezHost] when a device is selected.
#[derive(Clone)]
pub struct BluezDevice {
    session: Session,
    proxy: DeviceProxy<'static>,
}

impl BluezDevice {
    pub(crate) async fn new(session: Session, path: ObjectPath<'static>) -> Result<Self> {
        let proxy = DeviceProxy::new(&session.conn, path)
            .await
            .map_err(Error::from)?;
        Ok(Self { session, proxy })
    }

    pub(crate) fn path(&self) -> ObjectPath<'static> {
        self.proxy.path().to_owned()
    }

    /// Returns the name the device advertises.
    ///
    /// Fails if the device has not advertised a name.
    pub async fn name(&self) -> Result<String> {
        self.proxy.name().await.map_err(Error::from)
    }

    /// Returns the user-friendly name assigned to the device.
    ///
    /// Falls back to the advertised name, or the address, when no alias was assigned.
    pub async fn alias(&self) -> Result<String> {
        self.proxy.alias().await.map_err(Error::from)
    }

    /// Returns the list of service [`Uuid`]s the device is advertising.
    pub async fn service_uuids(&self) -> Result<Vec<Uuid>> {
        self.proxy
            .uuids()
            .await
            .map_err(Error::from)?
            .into_iter()
            .map(|s| Uuid::from_str(&s).map_err(Error::from))
            .collect()
    }

    /// Returns whether the adapter is currently connected to this device.
    pub async fn is_connected(&self) -> Result<bool> {
        self.proxy.connected().await.map_err(Error::from)
    }

    async fn establish(&self) -> Result<GattServer> {
        // Connecting to a device we're already connected to can result in a cryptic
        // `le-connection-abort-by-local` error.
        if self.is_connected().await? {
            log::debug!("{:?} is already connected", self);
            return Ok(GattServer {
                device: self.clone(),
            });
        }

        if let Err(e) = self.proxy.connect().await {
            // Connecting is racy, so check if we ended up connecting anyway.
            if let Ok(true) = self.is_connected().await {
                log::debug!("connect to {:?} reported `{}`, but succeeded", self, e);
            } else {
                return Err(Error::from(e));
            }
        }

        Ok(GattServer {
            device: self.clone(),
        })
    }

    /// Returns a stream of `PropertiesChanged` signals of this device.
    pub(crate) async fn property_changes(&self) -> Result<PropertiesChangedStream<'static>> {
        let proxy = PropertiesProxy::builder(&self.session.conn)
            .path(self.proxy.path())
            .map_err(Error::from)?
            .destination("org.bluez")
            .map_err(Error::from)?
            .build()
            .await
            .map_err(Error::from)?;
        proxy
            .receive_properties_changed()
            .await
            .map_err(Error::from)
    }

    async fn watch_connection(self, listener: DisconnectListener) {
        let mut changes = self.proxy.receive_connected_changed().await;
        while let Some(change) = changes.next().await {
            match change.get().await {
                Ok(false) => {
                    log::debug!("{:?} disconnected", self);
                    listener();
                }
                Ok(true) => log::trace!("{:?} connected", self),
                Err(e) => log::warn!("cannot read connection state of {:?}: {}", self, e),
            }
        }

        // The device object is gone, and with it any connection.
        log::debug!("connection state stream of {:?} ended", self);
        listener();
    }
}

impl HostDevice for BluezDevice {
    type Server = GattServer;

    /// Connects to the device. Succeeds without doing anything if it is already connected.
    fn connect(&self) -> BoxFuture<'_, Result<GattServer>> {
        Box::pin(self.establish())
    }

    /// Watches the device's `Connected` property on the connection's executor.
    ///
    /// The watch task is cancelled when the [`Subscription`] is detached.
    fn observe_disconnect(&self, listener: DisconnectListener) -> Subscription {
        // `Connection::executor` is hidden from zbus' docs. It is the executor zbus runs its own
        // socket reader on, so the watch needs no runtime of ours; dropping the `Task` cancels it.
        let task = self.session.conn.executor().spawn(
            self.clone().watch_connection(listener),
            "blues-link disconnection watch",
        );
        Subscription::new(move || drop(task))
    }
}

impl fmt::Debug for BluezDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BluezDevice")
            .field("path", self.proxy.path())
            .finish()
    }
}

impl PartialEq for BluezDevice {
    fn eq(&self, other: &Self) -> bool {
        self.proxy.path() == other.proxy.path()
    }
}

impl Eq for BluezDevice {}

/// An established connection to a [`BluezDevice`].
#[derive(Debug, Clone)]
pub struct GattServer {
    device: BluezDevice,
}

impl GattServer {
    /// The device this connection belongs to.
    pub fn device(&self) -> &BluezDevice {
        &self.device
    }

    /// Queries BlueZ for whether the connection is still established.
    pub async fn is_connected(&self) -> Result<bool> {
        self.device.is_connected().await
    }

    /// Severs the connection.
    ///
    /// Does nothing if the device is already disconnected. A [`Bluetooth`][crate::Bluetooth]
    /// adapter watching the device observes this like any other disconnection.
    pub async fn disconnect(&self) -> Result<()> {
        if !self.is_connected().await? {
            return Ok(());
        }

        match self.device.proxy.disconnect().await {
            Ok(()) => Ok(()),
            Err(e) => {
                if let Ok(false) = self.is_connected().await {
                    return Ok(());
                }
                Err(Error::from(e))
            }
        }
    }
}

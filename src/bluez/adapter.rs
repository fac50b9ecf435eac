use std::{future::ready, pin::pin};

use futures_util::{
    stream::{select, FuturesUnordered},
    FutureExt, StreamExt,
};
use zbus::{
    dbus_proxy,
    fdo::{InterfacesAdded, InterfacesRemoved, PropertiesChangedStream},
    zvariant::ObjectPath,
    SignalStream,
};

use super::{BluezDevice, Session};
use crate::{Error, Result};

#[dbus_proxy(
    interface = "org.bluez.Adapter1",
    default_service = "org.bluez",
    assume_defaults = false
)]
trait Adapter {
    async fn start_discovery(&self) -> zbus::Result<()>;
    async fn stop_discovery(&self) -> zbus::Result<()>;

    #[dbus_proxy(property)]
    fn discovering(&self) -> zbus::Result<bool>;
}

/// Properties whose change may turn a device into a match.
const SELECTION_PROPERTIES: &[&str] = &["Name", "Alias", "UUIDs"];

/// A BlueZ Bluetooth adapter.
pub(crate) struct Adapter {
    session: Session,
    name: String,
    proxy: AdapterProxy<'static>,
}

impl Adapter {
    const PATH_PREFIX: &str = "/org/bluez/";

    /// Opens the system's default adapter (the first one by name).
    pub(crate) async fn open(session: &Session) -> Result<Self> {
        let mut adapters = Self::enumerate(session).await?;
        adapters.sort_by(|a, b| a.name.cmp(&b.name));

        match adapters.into_iter().next() {
            Some(adapter) => Ok(adapter),
            None => Err(Error::from("no adapter found")),
        }
    }

    pub(crate) async fn enumerate(session: &Session) -> Result<Vec<Self>> {
        let manager = session.object_manager().await?;
        let objects = manager.get_managed_objects().await.map_err(Error::from)?;

        let mut adapters = Vec::new();
        for (path, intfs) in &objects {
            if !intfs.contains_key("org.bluez.Adapter1") {
                continue;
            }
            let Some(name) = path.strip_prefix(Self::PATH_PREFIX) else {
                log::warn!("skipping adapter with unexpected path {}", path);
                continue;
            };

            match AdapterProxy::new(&session.conn, path.to_string()).await {
                Ok(proxy) => adapters.push(Adapter {
                    session: session.clone(),
                    name: name.to_string(),
                    proxy,
                }),
                Err(e) => log::error!("failed to open adapter {}: {}", name, e),
            }
        }

        Ok(adapters)
    }

    /// Returns the adapter's device name (eg. `hci0`).
    pub(crate) fn device_name(&self) -> &str {
        &self.name
    }

    /// Starts discovery unless it is already running.
    ///
    /// Returns whether this call started it (and should stop it again).
    pub(crate) async fn start_discovery(&self) -> Result<bool> {
        if self.proxy.discovering().await.map_err(Error::from)? {
            log::debug!("{} is already discovering", self.name);
            return Ok(false);
        }

        log::debug!("starting discovery on {}", self.name);
        self.proxy.start_discovery().await.map_err(Error::from)?;
        Ok(true)
    }

    pub(crate) async fn stop_discovery(&self) -> Result<()> {
        log::debug!("stopping discovery on {}", self.name);
        self.proxy.stop_discovery().await.map_err(Error::from)
    }

    /// Returns the [`Candidates`] for selection on this adapter: all devices it already knows,
    /// followed by every device discovered or updated later on.
    pub(crate) async fn candidates(&self) -> Result<Candidates> {
        let manager = self.session.object_manager().await?;
        let signals = manager.receive_all_signals().await.map_err(Error::from)?;

        let mut candidates = Candidates {
            session: self.session.clone(),
            adapter_path: self.proxy.path().to_owned(),
            signals,
            devices: Vec::new(),
            changes: Vec::new(),
            to_yield: Vec::new(),
        };

        let objects = manager.get_managed_objects().await.map_err(Error::from)?;
        for (path, intfs) in objects {
            if path.starts_with(self.proxy.path().as_str())
                && intfs.contains_key("org.bluez.Device1")
            {
                if let Some((device, changes)) = watch(&self.session, (*path).to_owned()).await {
                    candidates.to_yield.push(device.clone());
                    candidates.devices.push(device);
                    candidates.changes.push(changes);
                }
            }
        }

        Ok(candidates)
    }
}

async fn watch(
    session: &Session,
    path: ObjectPath<'static>,
) -> Option<(BluezDevice, PropertiesChangedStream<'static>)> {
    let device = match BluezDevice::new(session.clone(), path.clone()).await {
        Ok(device) => device,
        Err(e) => {
            log::warn!("skipping device at {}: {}", path, e);
            return None;
        }
    };
    match device.property_changes().await {
        Ok(changes) => Some((device, changes)),
        Err(e) => {
            log::warn!("cannot watch {} for changes (skipping device): {}", path, e);
            None
        }
    }
}

enum Event {
    Added(BluezDevice, PropertiesChangedStream<'static>),
    Removed(usize),
    Changed(usize),
}

/// Devices offered for selection.
pub(crate) struct Candidates {
    session: Session,
    adapter_path: ObjectPath<'static>,
    signals: SignalStream<'static>,
    devices: Vec<BluezDevice>,
    changes: Vec<PropertiesChangedStream<'static>>,
    to_yield: Vec<BluezDevice>,
}

impl Candidates {
    /// Yields the next device to consider.
    ///
    /// A device is yielded again whenever its name or advertised services change, since that
    /// may make it match. There is no timeout.
    pub(crate) async fn next(&mut self) -> Result<BluezDevice> {
        if let Some(device) = self.to_yield.pop() {
            return Ok(device);
        }

        loop {
            match self.next_event().await {
                Some(Event::Added(device, changes)) => {
                    self.devices.push(device.clone());
                    self.changes.push(changes);
                    return Ok(device);
                }
                Some(Event::Changed(i)) => return Ok(self.devices[i].clone()),
                Some(Event::Removed(i)) => {
                    let device = self.devices.swap_remove(i);
                    self.changes.swap_remove(i);
                    log::trace!("{:?} went away", device);
                }
                None => return Err(Error::from("discovery stream ended (adapter removed?)")),
            }
        }
    }

    async fn next_event(&mut self) -> Option<Event> {
        let session = &self.session;
        let adapter_path = &self.adapter_path;
        let devices = &self.devices;

        let added_removed = self.signals.by_ref().filter_map(|message| async move {
            if let Some(added) = InterfacesAdded::from_message(message.clone()) {
                let path = {
                    let args = added.args().ok()?;
                    if !args.object_path.starts_with(adapter_path.as_str())
                        || !args
                            .interfaces_and_properties
                            .contains_key("org.bluez.Device1")
                    {
                        return None;
                    }
                    args.object_path.to_owned()
                };
                let (device, changes) = watch(session, path).await?;
                Some(Event::Added(device, changes))
            } else if let Some(removed) = InterfacesRemoved::from_message(message) {
                let args = removed.args().ok()?;
                if !args.interfaces.contains(&"org.bluez.Device1") {
                    return None;
                }
                devices
                    .iter()
                    .position(|dev| dev.path() == args.object_path)
                    .map(Event::Removed)
            } else {
                None
            }
        });

        let changed: FuturesUnordered<_> = self
            .changes
            .iter_mut()
            .enumerate()
            .map(|(i, changes)| {
                changes.next().map(move |changed| {
                    let changed = changed?;
                    let args = changed.args().ok()?;
                    let relevant = args
                        .changed_properties
                        .keys()
                        .any(|name| SELECTION_PROPERTIES.contains(name));
                    relevant.then_some(Event::Changed(i))
                })
            })
            .collect();

        let mut stream = pin!(select(added_removed, changed.filter_map(ready)));
        stream.next().await
    }
}

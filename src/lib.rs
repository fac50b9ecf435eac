//! Observable Bluetooth device connections.
//!
//! A [`Bluetooth`] adapter asks a [`Host`][host::Host] to select a device, connects to it, and
//! keeps a set of [`Signal`]s up to date: the selected device, the connection (server), whether
//! it is connected, and the last error. Applications observe those signals instead of juggling
//! event subscriptions themselves.
//!
//! The default host on Linux is BlueZ, accessed over D-Bus ([`bluez::BluezHost`]).
//!
//! ```no_run
//! use blues_link::{AdapterConfig, Bluetooth, ScanFilter};
//!
//! # async fn run() -> blues_link::Result<()> {
//! let config = AdapterConfig::builder()
//!     .filter(ScanFilter::new().service(0x180D_u16))
//!     .build()?;
//! let bluetooth = Bluetooth::ambient(config).await;
//!
//! bluetooth.request_device().await;
//! if let Some(e) = bluetooth.error().get() {
//!     eprintln!("{}", e);
//! }
//! println!("connected: {}", bluetooth.is_connected().get());
//! # Ok(())
//! # }
//! ```

mod bluetooth;
pub mod bluez;
mod error;
pub mod host;
mod options;
pub mod signal;
pub mod uuid;

pub use bluetooth::{Bluetooth, ConnectionState, ServerOf};
pub use error::{Error, ErrorKind, Result};
pub use options::{AdapterConfig, AdapterConfigBuilder, RequestOptions, ScanFilter};
pub use signal::{Derived, Signal};

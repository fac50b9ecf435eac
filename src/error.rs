use std::fmt;

use crate::uuid::ParseUuidError;

/// A result type hardwired to use [`Error`] as its error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Broad category of an [`Error`].
///
/// Failures of [`Bluetooth::request_device`][crate::Bluetooth::request_device] are tagged with the
/// step that failed, so that consumers of the `error` signal can tell them apart without matching
/// on messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The host environment does not provide Bluetooth device access.
    UnsupportedEnvironment,
    /// Device selection was rejected or cancelled.
    SelectionFailed,
    /// A device was selected, but connecting to it failed.
    ConnectFailed,
    /// An [`AdapterConfig`][crate::AdapterConfig] was rejected at construction.
    InvalidConfig,
    /// Anything else (D-Bus failures, malformed data, ...).
    Other,
}

/// The primary error type used throughout this library.
#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    inner: Source,
}

impl Error {
    pub(crate) fn from(e: impl Into<Source>) -> Self {
        Self {
            kind: ErrorKind::Other,
            inner: e.into(),
        }
    }

    /// Creates an [`Error`] carrying a plain message.
    ///
    /// Intended for [`Host`][crate::host::Host] implementations that reject a request.
    pub fn other(msg: impl Into<String>) -> Self {
        let msg: String = msg.into();
        Self::from(msg)
    }

    /// Wraps an arbitrary error reported by a host environment.
    pub fn from_host<E>(e: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::from(Source::Host(Box::new(e)))
    }

    pub(crate) fn unsupported() -> Self {
        Self::other("Bluetooth is not supported by the host environment")
            .with_kind(ErrorKind::UnsupportedEnvironment)
    }

    pub(crate) fn invalid_config(msg: impl Into<String>) -> Self {
        Self::other(msg).with_kind(ErrorKind::InvalidConfig)
    }

    pub(crate) fn with_kind(mut self, kind: ErrorKind) -> Self {
        self.kind = kind;
        self
    }

    /// Returns the [`ErrorKind`] of this error.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ErrorKind::SelectionFailed => f.write_str("device selection failed: ")?,
            ErrorKind::ConnectFailed => f.write_str("failed to connect to device: ")?,
            ErrorKind::InvalidConfig => f.write_str("invalid adapter configuration: ")?,
            ErrorKind::UnsupportedEnvironment | ErrorKind::Other => {}
        }

        match &self.inner {
            Source::Zbus(e) => fmt::Display::fmt(e, f),
            Source::Fdo(e) => fmt::Display::fmt(e, f),
            Source::ParseUuidError(e) => fmt::Display::fmt(e, f),
            Source::Host(e) => fmt::Display::fmt(e, f),
            Source::Other(e) => fmt::Display::fmt(e, f),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.inner {
            Source::Zbus(e) => Some(e),
            Source::Fdo(e) => Some(e),
            Source::ParseUuidError(e) => Some(e),
            Source::Host(e) => Some(&**e),
            Source::Other(_) => None,
        }
    }
}

#[derive(Debug)]
pub(crate) enum Source {
    Zbus(zbus::Error),
    Fdo(zbus::fdo::Error),
    ParseUuidError(ParseUuidError),
    Host(Box<dyn std::error::Error + Send + Sync>),
    Other(String),
}

impl From<zbus::Error> for Source {
    fn from(value: zbus::Error) -> Self {
        Self::Zbus(value)
    }
}

impl From<zbus::fdo::Error> for Source {
    fn from(value: zbus::fdo::Error) -> Self {
        Self::Fdo(value)
    }
}

impl From<ParseUuidError> for Source {
    fn from(value: ParseUuidError) -> Self {
        Self::ParseUuidError(value)
    }
}

impl From<String> for Source {
    fn from(value: String) -> Self {
        Self::Other(value)
    }
}

impl From<&str> for Source {
    fn from(value: &str) -> Self {
        Self::Other(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error as _;

    use super::*;

    #[test]
    fn kind_prefixes_message() {
        let e = Error::other("device out of range").with_kind(ErrorKind::ConnectFailed);
        assert_eq!(e.kind(), ErrorKind::ConnectFailed);
        assert_eq!(
            e.to_string(),
            "failed to connect to device: device out of range"
        );

        let e = Error::unsupported();
        assert_eq!(e.kind(), ErrorKind::UnsupportedEnvironment);
        assert!(e.to_string().contains("not supported"));
    }

    #[test]
    fn host_errors_are_sources() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let e = Error::from_host(io).with_kind(ErrorKind::SelectionFailed);
        assert_eq!(e.to_string(), "device selection failed: denied");
        assert!(e.source().is_some());
        assert!(Error::other("x").source().is_none());
    }
}

//! Device selection options and adapter configuration.

use std::collections::HashSet;

use crate::{
    uuid::{ServiceId, Uuid},
    Error, Result,
};

/// A set of constraints a device must satisfy to be offered for selection.
///
/// Every constraint that is set must hold: the device must advertise *all* listed services, have
/// exactly the given name (if any), and a name starting with the given prefix (if any).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanFilter {
    pub services: Vec<ServiceId>,
    pub name: Option<String>,
    pub name_prefix: Option<String>,
}

impl ScanFilter {
    /// Creates a filter without constraints. Add at least one before using it.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requires the device to advertise `service`.
    pub fn service(mut self, service: impl Into<ServiceId>) -> Self {
        self.services.push(service.into());
        self
    }

    /// Requires the device's name to be exactly `name`.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Requires the device's name to start with `prefix`.
    pub fn name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.name_prefix = Some(prefix.into());
        self
    }

    fn is_empty(&self) -> bool {
        self.services.is_empty() && self.name.is_none() && self.name_prefix.is_none()
    }

    /// Returns whether a device with the given name and advertised services satisfies this
    /// filter.
    pub fn matches(&self, name: Option<&str>, advertised: &[Uuid]) -> bool {
        if let Some(expected) = &self.name {
            if name != Some(expected.as_str()) {
                return false;
            }
        }

        if let Some(prefix) = &self.name_prefix {
            if !name.map_or(false, |name| name.starts_with(prefix.as_str())) {
                return false;
            }
        }

        self.services
            .iter()
            .all(|service| advertised.contains(&service.uuid()))
    }

    fn validate(&self) -> Result<()> {
        if self.is_empty() {
            return Err(Error::invalid_config("scan filter has no constraints"));
        }
        if self.name_prefix.as_deref() == Some("") {
            return Err(Error::invalid_config("scan filter has an empty name prefix"));
        }
        Ok(())
    }
}

/// The options handed to the host environment's device selection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestOptions {
    pub filters: Vec<ScanFilter>,
    pub optional_services: Vec<ServiceId>,
    /// Offer every nearby device, ignoring `filters`.
    pub accept_all_devices: bool,
}

impl RequestOptions {
    /// Returns whether a device with the given name and advertised services may be selected
    /// under these options.
    pub fn accepts(&self, name: Option<&str>, advertised: &[Uuid]) -> bool {
        self.accept_all_devices
            || self
                .filters
                .iter()
                .any(|filter| filter.matches(name, advertised))
    }
}

/// Immutable configuration of a [`Bluetooth`][crate::Bluetooth] adapter.
///
/// The default configuration has no filters, no optional services, and does not accept all
/// devices. Use [`AdapterConfig::builder`] to customize it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdapterConfig {
    options: RequestOptions,
}

impl AdapterConfig {
    /// Starts building a customized [`AdapterConfig`].
    pub fn builder() -> AdapterConfigBuilder {
        AdapterConfigBuilder::default()
    }

    /// Returns the configured filters, in the order they were added.
    pub fn filters(&self) -> &[ScanFilter] {
        &self.options.filters
    }

    /// Returns the optional services, without duplicates.
    pub fn optional_services(&self) -> &[ServiceId] {
        &self.options.optional_services
    }

    /// Returns whether every nearby device is offered for selection.
    pub fn accept_all_devices(&self) -> bool {
        self.options.accept_all_devices
    }

    /// Returns the merged options passed to [`Host::request_device`].
    ///
    /// [`Host::request_device`]: crate::host::Host::request_device
    pub fn request_options(&self) -> &RequestOptions {
        &self.options
    }
}

/// Builder for [`AdapterConfig`].
#[derive(Debug, Default)]
pub struct AdapterConfigBuilder {
    options: RequestOptions,
}

impl AdapterConfigBuilder {
    /// Adds a [`ScanFilter`]. Filters are alternatives: a device matching any of them is offered.
    pub fn filter(mut self, filter: ScanFilter) -> Self {
        self.options.filters.push(filter);
        self
    }

    /// Declares a service the application wants to access after connecting, without requiring
    /// devices to advertise it.
    pub fn optional_service(mut self, service: impl Into<ServiceId>) -> Self {
        self.options.optional_services.push(service.into());
        self
    }

    /// Offers every nearby device in the selection.
    ///
    /// This can result in lots of unrelated devices being offered. It cannot be combined with
    /// [`AdapterConfigBuilder::filter`].
    pub fn accept_all_devices(mut self, accept: bool) -> Self {
        self.options.accept_all_devices = accept;
        self
    }

    /// Validates the collected options and builds the [`AdapterConfig`].
    ///
    /// # Errors
    ///
    /// Returns an [`ErrorKind::InvalidConfig`][crate::ErrorKind::InvalidConfig] error if a filter
    /// has no constraints or an empty name prefix, or if `accept_all_devices` is combined with
    /// filters.
    pub fn build(self) -> Result<AdapterConfig> {
        if self.options.accept_all_devices && !self.options.filters.is_empty() {
            return Err(Error::invalid_config(
                "`accept_all_devices` cannot be combined with filters",
            ));
        }
        for filter in &self.options.filters {
            filter.validate()?;
        }

        let mut options = self.options;
        let mut seen = HashSet::new();
        options.optional_services.retain(|service| seen.insert(*service));
        Ok(AdapterConfig { options })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    const HEART_RATE: u16 = 0x180d;
    const BATTERY: u16 = 0x180f;

    #[test]
    fn filter_matching() {
        let filter = ScanFilter::new().service(HEART_RATE).name_prefix("Polar");
        let hr = [Uuid::from_u16(HEART_RATE), Uuid::from_u16(BATTERY)];

        assert!(filter.matches(Some("Polar H10"), &hr));
        assert!(!filter.matches(Some("Garmin HRM"), &hr));
        assert!(!filter.matches(None, &hr));
        assert!(!filter.matches(Some("Polar H10"), &hr[1..]));

        let exact = ScanFilter::new().name("lamp");
        assert!(exact.matches(Some("lamp"), &[]));
        assert!(!exact.matches(Some("lamp 2"), &[]));
    }

    #[test]
    fn filters_are_alternatives() {
        let config = AdapterConfig::builder()
            .filter(ScanFilter::new().name("a"))
            .filter(ScanFilter::new().service(BATTERY))
            .build()
            .unwrap();
        let options = config.request_options();
        assert!(options.accepts(Some("a"), &[]));
        assert!(options.accepts(Some("b"), &[Uuid::from_u16(BATTERY)]));
        assert!(!options.accepts(Some("b"), &[]));
    }

    #[test]
    fn defaults() {
        let config = AdapterConfig::default();
        assert!(config.filters().is_empty());
        assert!(config.optional_services().is_empty());
        assert!(!config.accept_all_devices());
        assert!(!config.request_options().accepts(Some("anything"), &[]));

        let all = AdapterConfig::builder()
            .accept_all_devices(true)
            .build()
            .unwrap();
        assert!(all.request_options().accepts(None, &[]));
    }

    #[test]
    fn validation() {
        let err = AdapterConfig::builder()
            .filter(ScanFilter::new())
            .build()
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidConfig);

        let err = AdapterConfig::builder()
            .filter(ScanFilter::new().name_prefix(""))
            .build()
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidConfig);

        let err = AdapterConfig::builder()
            .accept_all_devices(true)
            .filter(ScanFilter::new().name("x"))
            .build()
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidConfig);
    }

    #[test]
    fn optional_services_deduplicated_in_order() {
        let config = AdapterConfig::builder()
            .accept_all_devices(true)
            .optional_service(BATTERY)
            .optional_service(HEART_RATE)
            .optional_service(BATTERY)
            .optional_service(HEART_RATE)
            .build()
            .unwrap();
        assert_eq!(
            config.optional_services(),
            &[ServiceId::from(BATTERY), ServiceId::from(HEART_RATE)]
        );
    }
}

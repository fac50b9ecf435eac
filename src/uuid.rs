//! Bluetooth UUIDs and service identifiers.

use core::fmt;
use std::str::FromStr;

/// A 128-bit UUID, identifying a Bluetooth service or characteristic.
///
/// Construct one with [`Uuid::from_static`] (usable in `const` context), from a 16- or 32-bit
/// alias assigned by the Bluetooth SIG, or by parsing a string via [`FromStr`].
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Uuid([u8; 16]);

impl Uuid {
    const BASE: Self = Self::from_static("00000000-0000-1000-8000-00805f9b34fb");

    /// Offsets of the `-` separators in the hyphenated form.
    const DASHES: [usize; 4] = [8, 13, 18, 23];

    const fn parse(s: &str) -> Result<Self, ParseUuidError> {
        const fn nibble(digit: u8) -> Option<u8> {
            match digit {
                b'0'..=b'9' => Some(digit - b'0'),
                b'a'..=b'f' => Some(digit - b'a' + 10),
                b'A'..=b'F' => Some(digit - b'A' + 10),
                _ => None,
            }
        }

        let bytes = s.as_bytes();
        if bytes.len() < 36 {
            return Err(ParseUuidError(ErrorKind::Eof));
        }
        if bytes.len() > 36 {
            return Err(ParseUuidError(ErrorKind::TrailingData));
        }

        let mut out = [0; 16];
        let mut pos = 0;
        let mut byte = 0;
        let mut dash = 0;
        while pos < bytes.len() {
            if dash < Self::DASHES.len() && pos == Self::DASHES[dash] {
                if bytes[pos] != b'-' {
                    return Err(ParseUuidError(ErrorKind::InvalidDash));
                }
                dash += 1;
                pos += 1;
                continue;
            }

            let (Some(high), Some(low)) = (nibble(bytes[pos]), nibble(bytes[pos + 1])) else {
                return Err(ParseUuidError(ErrorKind::InvalidDigit));
            };
            out[byte] = (high << 4) | low;
            byte += 1;
            pos += 2;
        }

        Ok(Self(out))
    }

    /// Creates a [`Uuid`] from a static string, potentially at compile time.
    ///
    /// Panics if the string is invalid.
    pub const fn from_static(s: &'static str) -> Self {
        match Self::parse(s) {
            Ok(uuid) => uuid,
            Err(_) => panic!("malformed UUID"),
        }
    }

    /// Creates a [`Uuid`] from a 16-bit alias.
    pub const fn from_u16(short: u16) -> Self {
        Self::from_u32(short as u32)
    }

    /// Creates a [`Uuid`] from a 32-bit alias.
    pub const fn from_u32(alias: u32) -> Self {
        let [a, b, c, d] = alias.to_be_bytes();
        let mut uuid = Self::BASE;
        uuid.0[0] = a;
        uuid.0[1] = b;
        uuid.0[2] = c;
        uuid.0[3] = d;
        uuid
    }

    /// Returns the 16-bit alias of this [`Uuid`], if it is derived from the Bluetooth base UUID
    /// and fits in 16 bits.
    pub fn as_u16(&self) -> Option<u16> {
        let alias = u32::from_be_bytes([self.0[0], self.0[1], self.0[2], self.0[3]]);
        if self.0[4..] != Self::BASE.0[4..] {
            return None;
        }
        u16::try_from(alias).ok()
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl From<u16> for Uuid {
    fn from(value: u16) -> Self {
        Self::from_u16(value)
    }
}

impl FromStr for Uuid {
    type Err = ParseUuidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Uuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, byte) in self.0.iter().enumerate() {
            if matches!(i, 4 | 6 | 8 | 10) {
                f.write_str("-")?;
            }
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Uuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// The error type returned by the [`FromStr`] implementations of [`Uuid`] and [`ServiceId`].
#[derive(Debug)]
pub struct ParseUuidError(ErrorKind);

#[derive(Debug)]
enum ErrorKind {
    Eof,
    InvalidDigit,
    InvalidDash,
    TrailingData,
    UnknownName,
}

impl fmt::Display for ParseUuidError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match &self.0 {
            ErrorKind::Eof => "unexpected end of input",
            ErrorKind::InvalidDigit => "invalid hex digit",
            ErrorKind::InvalidDash => "invalid character (`-` expected)",
            ErrorKind::TrailingData => "invalid trailing data",
            ErrorKind::UnknownName => "unknown service name",
        };
        f.write_str(s)
    }
}

impl std::error::Error for ParseUuidError {}

/// Identifies a GATT service in device filters and in the list of optional services.
///
/// Accepts the same spellings a device chooser does: a full UUID, a `0x`-prefixed 16- or 32-bit
/// alias, or one of the well-known service names below (`"heart_rate"`, `"battery_service"`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ServiceId(Uuid);

impl ServiceId {
    const NAMED: &'static [(&'static str, u16)] = &[
        ("generic_access", 0x1800),
        ("generic_attribute", 0x1801),
        ("immediate_alert", 0x1802),
        ("link_loss", 0x1803),
        ("tx_power", 0x1804),
        ("current_time", 0x1805),
        ("health_thermometer", 0x1809),
        ("device_information", 0x180a),
        ("heart_rate", 0x180d),
        ("battery_service", 0x180f),
        ("blood_pressure", 0x1810),
        ("human_interface_device", 0x1812),
        ("running_speed_and_cadence", 0x1814),
        ("cycling_speed_and_cadence", 0x1816),
        ("cycling_power", 0x1818),
        ("location_and_navigation", 0x1819),
        ("environmental_sensing", 0x181a),
        ("body_composition", 0x181b),
        ("user_data", 0x181c),
        ("weight_scale", 0x181d),
        ("fitness_machine", 0x1826),
    ];

    pub const fn new(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the [`Uuid`] this identifier resolves to.
    pub fn uuid(&self) -> Uuid {
        self.0
    }
}

impl From<Uuid> for ServiceId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl From<u16> for ServiceId {
    fn from(value: u16) -> Self {
        Self(Uuid::from_u16(value))
    }
}

impl FromStr for ServiceId {
    type Err = ParseUuidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            if hex.is_empty() || hex.len() > 8 {
                return Err(ParseUuidError(ErrorKind::InvalidDigit));
            }
            let alias = u32::from_str_radix(hex, 16)
                .map_err(|_| ParseUuidError(ErrorKind::InvalidDigit))?;
            return Ok(Self(Uuid::from_u32(alias)));
        }

        if let Some((_, alias)) = Self::NAMED.iter().find(|(name, _)| *name == s) {
            return Ok(Self(Uuid::from_u16(*alias)));
        }

        if s.contains('-') {
            return Uuid::from_str(s).map(Self);
        }

        Err(ParseUuidError(ErrorKind::UnknownName))
    }
}

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_roundtrip() {
        assert_eq!(
            Uuid::BASE.to_string(),
            "00000000-0000-1000-8000-00805f9b34fb"
        );
    }

    #[test]
    fn aliases() {
        let hr = Uuid::from_u16(0x180D);
        assert_eq!(hr.to_string(), "0000180d-0000-1000-8000-00805f9b34fb");
        assert_eq!(hr.as_u16(), Some(0x180D));
        assert_eq!(Uuid::from_u32(0x1234_5678).as_u16(), None);
        assert_eq!(
            Uuid::from_static("7c9ac820-0886-4e50-bcca-588b883f8649").as_u16(),
            None
        );
    }

    #[test]
    fn parse_errors() {
        Uuid::from_str("").unwrap_err();
        Uuid::from_str("0000180d-0000-1000-8000-00805f9b34f").unwrap_err();
        Uuid::from_str("0000180d-0000-1000-8000-00805f9b34fb0").unwrap_err();
        Uuid::from_str("0000180d_0000-1000-8000-00805f9b34fb").unwrap_err();
        Uuid::from_str("0000180z-0000-1000-8000-00805f9b34fb").unwrap_err();
        assert_eq!(
            Uuid::from_str("0000180D-0000-1000-8000-00805F9B34FB").unwrap(),
            Uuid::from_u16(0x180d)
        );
    }

    #[test]
    fn service_ids() {
        let hr = ServiceId::from(0x180d_u16);
        assert_eq!("heart_rate".parse::<ServiceId>().unwrap(), hr);
        assert_eq!("0x180d".parse::<ServiceId>().unwrap(), hr);
        assert_eq!(
            "0000180d-0000-1000-8000-00805f9b34fb"
                .parse::<ServiceId>()
                .unwrap(),
            hr
        );
        "no_such_service".parse::<ServiceId>().unwrap_err();
        "0x".parse::<ServiceId>().unwrap_err();
        "0x123456789".parse::<ServiceId>().unwrap_err();
    }
}

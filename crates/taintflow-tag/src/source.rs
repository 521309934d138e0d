//! Known taint sources and their bit assignments.

use crate::tag::Tag;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A sensitive data source with a fixed bit position.
///
/// The enumeration is open on the tag side: a [`Tag`] may carry bits that
/// no variant names yet. Those render as unrecognized rather than failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaintSource {
    /// Location data.
    Location,
    /// Address book contents.
    Contacts,
    /// Microphone input.
    Mic,
    /// The device phone number.
    PhoneNumber,
    /// GPS location fix.
    LocationGps,
    /// Network-derived location.
    LocationNet,
    /// Last known location.
    LocationLast,
    /// Camera frames.
    Camera,
    /// Accelerometer readings.
    Accelerometer,
    /// SMS message content.
    Sms,
    /// Device IMEI.
    Imei,
    /// Subscriber IMSI.
    Imsi,
    /// SIM card ICCID.
    Iccid,
    /// Device serial number.
    DeviceSn,
    /// Account data.
    Account,
    /// Browsing history.
    History,
    /// User-entered passwords.
    Password,
}

impl TaintSource {
    /// Every known source, in bit order.
    pub const ALL: [TaintSource; 17] = [
        Self::Location,
        Self::Contacts,
        Self::Mic,
        Self::PhoneNumber,
        Self::LocationGps,
        Self::LocationNet,
        Self::LocationLast,
        Self::Camera,
        Self::Accelerometer,
        Self::Sms,
        Self::Imei,
        Self::Imsi,
        Self::Iccid,
        Self::DeviceSn,
        Self::Account,
        Self::History,
        Self::Password,
    ];

    /// Union of every known source bit.
    pub const KNOWN_MASK: u32 = 0x0001_ffff;

    /// Returns the single-bit tag for this source.
    #[inline]
    #[must_use]
    pub const fn tag(self) -> Tag {
        Tag::from_bits(self.bit())
    }

    /// Returns the raw bit for this source.
    #[must_use]
    pub const fn bit(self) -> u32 {
        match self {
            Self::Location => 0x0000_0001,
            Self::Contacts => 0x0000_0002,
            Self::Mic => 0x0000_0004,
            Self::PhoneNumber => 0x0000_0008,
            Self::LocationGps => 0x0000_0010,
            Self::LocationNet => 0x0000_0020,
            Self::LocationLast => 0x0000_0040,
            Self::Camera => 0x0000_0080,
            Self::Accelerometer => 0x0000_0100,
            Self::Sms => 0x0000_0200,
            Self::Imei => 0x0000_0400,
            Self::Imsi => 0x0000_0800,
            Self::Iccid => 0x0000_1000,
            Self::DeviceSn => 0x0000_2000,
            Self::Account => 0x0000_4000,
            Self::History => 0x0000_8000,
            Self::Password => 0x0001_0000,
        }
    }

    /// Returns the human-readable source name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Location => "Location",
            Self::Contacts => "Contacts",
            Self::Mic => "Microphone",
            Self::PhoneNumber => "Phone Number",
            Self::LocationGps => "Location (GPS)",
            Self::LocationNet => "Location (Network)",
            Self::LocationLast => "Location (Last)",
            Self::Camera => "Camera",
            Self::Accelerometer => "Accelerometer",
            Self::Sms => "SMS",
            Self::Imei => "IMEI",
            Self::Imsi => "IMSI",
            Self::Iccid => "ICCID",
            Self::DeviceSn => "Device Serial Number",
            Self::Account => "Account",
            Self::History => "History",
            Self::Password => "Password",
        }
    }

    /// Returns the snake_case identifier used in configuration and the CLI.
    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            Self::Location => "location",
            Self::Contacts => "contacts",
            Self::Mic => "mic",
            Self::PhoneNumber => "phone_number",
            Self::LocationGps => "location_gps",
            Self::LocationNet => "location_net",
            Self::LocationLast => "location_last",
            Self::Camera => "camera",
            Self::Accelerometer => "accelerometer",
            Self::Sms => "sms",
            Self::Imei => "imei",
            Self::Imsi => "imsi",
            Self::Iccid => "iccid",
            Self::DeviceSn => "device_sn",
            Self::Account => "account",
            Self::History => "history",
            Self::Password => "password",
        }
    }

    /// Looks up the source owning exactly `bit`.
    #[must_use]
    pub fn from_bit(bit: u32) -> Option<Self> {
        Self::ALL.iter().copied().find(|source| source.bit() == bit)
    }
}

impl fmt::Display for TaintSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error returned when a source identifier does not name a known source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownSource(pub String);

impl fmt::Display for UnknownSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown taint source '{}'", self.0)
    }
}

impl std::error::Error for UnknownSource {}

impl FromStr for TaintSource {
    type Err = UnknownSource;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|source| source.key() == wanted)
            .ok_or_else(|| UnknownSource(s.to_string()))
    }
}

//! Device enumeration and selection.
//!
//! A [`Selector`] picks a device by index or by serial number.

use std::{
    fmt::Display,
    str::FromStr,
};

use crate::{
    Error,
    api::{
        DeviceInfo,
        HwVersion,
        MAX_DEVICES,
    },
    session::Session,
};

/// Returns the devices attached to the system.
///
/// Devices that are already selected by a process are not listed.
pub fn devices(session: &Session) -> Result<Vec<DeviceInfo>, Error> {
    let _lock = session.lock_device_api();
    get_devices(session)
}

fn get_devices(session: &Session) -> Result<Vec<DeviceInfo>, Error> {
    let result = session.api().get_devices();
    tracing::debug!(
        ndevices = result.as_ref().map(|devices| devices.len()).ok(),
        "sdrplay_api_GetDevices"
    );
    let mut devices = result.map_err(|error| {
        tracing::error!(%error, "sdrplay_api_GetDevices failed");
        Error::from_api("sdrplay_api_GetDevices", error)
    })?;
    devices.truncate(MAX_DEVICES);
    Ok(devices)
}

/// Picks a device by index or serial number.
///
/// Selectors of up to two characters are device indices. Empty selectors,
/// as well as `''` and `""`, pick the first device. Anything longer is a
/// serial number.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Selector {
    Index(usize),
    Serial(String),
}

impl Default for Selector {
    fn default() -> Self {
        Self::Index(0)
    }
}

impl FromStr for Selector {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() <= 2 {
            if s.is_empty() || s == "''" || s == "\"\"" {
                Ok(Self::Index(0))
            }
            else {
                s.parse()
                    .map(Self::Index)
                    .map_err(|_| {
                        Error::DeviceNotFound {
                            selector: s.to_owned(),
                        }
                    })
            }
        }
        else {
            Ok(Self::Serial(s.to_owned()))
        }
    }
}

impl Display for Selector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Index(index) => write!(f, "{index}"),
            Self::Serial(serial) => write!(f, "{serial}"),
        }
    }
}

impl Selector {
    /// Finds the selected device among `devices`. It must be of the
    /// requested hardware version.
    pub fn select<'a>(&self, devices: &'a [DeviceInfo], hw_version: HwVersion) -> Option<&'a DeviceInfo> {
        match self {
            Self::Index(index) => {
                devices
                    .get(*index)
                    .filter(|device| device.hw_version == hw_version)
            }
            Self::Serial(serial) => {
                devices
                    .iter()
                    .find(|device| device.hw_version == hw_version && device.serial == *serial)
            }
        }
    }
}

/// Looks up a device for [`Rsp::open`][crate::Rsp::open]. Must be called
/// with the device API locked.
pub(crate) fn rsp_select(
    session: &Session,
    hw_version: HwVersion,
    selector: &Selector,
) -> Result<DeviceInfo, Error> {
    let devices = get_devices(session)?;
    selector
        .select(&devices, hw_version)
        .cloned()
        .ok_or_else(|| {
            tracing::error!(%selector, ?hw_version, "sdrplay device not found");
            Error::DeviceNotFound {
                selector: selector.to_string(),
            }
        })
}

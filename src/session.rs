//! API session.

use std::sync::Arc;

use crate::{
    Error,
    api::{
        API_VERSION,
        Api,
        DeviceInfo,
    },
};

/// An open session with the SDRplay API library.
///
/// The library is process-wide, so there should only be one session at a
/// time. Devices hold an `Arc<Session>`, so the session is closed after the
/// last device is dropped.
#[derive(derive_more::Debug)]
pub struct Session {
    #[debug(skip)]
    api: Arc<dyn Api>,
    version: f32,
    closed: bool,
}

impl Session {
    /// Opens the library and checks its version.
    pub fn open(api: Arc<dyn Api>) -> Result<Arc<Self>, Error> {
        let result = api.open();
        tracing::debug!(?result, "sdrplay_api_Open");
        if let Err(error) = result {
            tracing::error!(
                %error,
                "sdrplay_api_Open failed. is the SDRplay API service running? try restarting it."
            );
            return Err(Error::from_api("sdrplay_api_Open", error));
        }

        let version = match api.api_version() {
            Ok(version) => version,
            Err(error) => {
                tracing::error!(%error, "sdrplay_api_ApiVersion failed");
                let result = api.close();
                tracing::debug!(?result, "sdrplay_api_Close");
                return Err(Error::from_api("sdrplay_api_ApiVersion", error));
            }
        };
        tracing::debug!(version, "sdrplay_api_ApiVersion");

        if version != API_VERSION {
            tracing::warn!(
                library = version,
                expected = API_VERSION,
                "sdrplay api version mismatch"
            );
        }

        Ok(Arc::new(Self {
            api,
            version,
            closed: false,
        }))
    }

    pub fn api(&self) -> &Arc<dyn Api> {
        &self.api
    }

    /// Version reported by the library.
    pub fn version(&self) -> f32 {
        self.version
    }

    /// Devices attached to the system that aren't selected yet.
    pub fn devices(&self) -> Result<Vec<DeviceInfo>, Error> {
        crate::enumerate::devices(self)
    }

    /// Closes the library. This also happens when the session is dropped.
    pub fn close(mut self) {
        self.close_impl();
    }

    fn close_impl(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let result = self.api.close();
        tracing::debug!(?result, "sdrplay_api_Close");
        if let Err(error) = result {
            tracing::error!(%error, "sdrplay_api_Close failed");
        }
    }

    /// Locks the device API until the guard is dropped.
    ///
    /// Enumeration, selection and release of devices happen under this
    /// lock. Failures are logged, and the operations proceed regardless.
    pub(crate) fn lock_device_api(&self) -> DeviceApiLock<'_> {
        let result = self.api.lock_device_api();
        tracing::debug!(?result, "sdrplay_api_LockDeviceApi");
        if let Err(error) = result {
            tracing::error!(%error, "sdrplay_api_LockDeviceApi failed");
        }
        DeviceApiLock { session: self }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close_impl();
    }
}

pub(crate) struct DeviceApiLock<'a> {
    session: &'a Session,
}

impl Drop for DeviceApiLock<'_> {
    fn drop(&mut self) {
        let result = self.session.api.unlock_device_api();
        tracing::debug!(?result, "sdrplay_api_UnlockDeviceApi");
        if let Err(error) = result {
            tracing::error!(%error, "sdrplay_api_UnlockDeviceApi failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::{
        Error,
        api::{
            Api,
            ApiError,
            HwVersion,
            sim::SimulatedApi,
        },
        session::Session,
    };

    #[test]
    fn open_and_close() {
        let api = Arc::new(SimulatedApi::new());
        let session = Session::open(api.clone()).unwrap();
        assert!(api.is_open());
        assert_eq!(session.version(), 3.15);
        drop(session);
        assert!(!api.is_open());
    }

    #[test]
    fn explicit_close() {
        let api = Arc::new(SimulatedApi::new());
        let session = Arc::into_inner(Session::open(api.clone()).unwrap()).unwrap();
        session.close();
        assert!(!api.is_open());
    }

    #[test]
    fn lists_unselected_devices() {
        let api = Arc::new(
            SimulatedApi::new()
                .with_device(HwVersion::RSP1A, "1A0001")
                .with_device(HwVersion::RSPDX, "DX0001"),
        );
        let session = Session::open(api).unwrap();
        let devices = session.devices().unwrap();
        assert_eq!(devices.len(), 2);
        assert_eq!(devices[1].serial, "DX0001");
    }

    #[test]
    fn version_mismatch_is_not_fatal() {
        let api = Arc::new(SimulatedApi::new());
        api.set_version(3.07);
        let session = Session::open(api).unwrap();
        assert_eq!(session.version(), 3.07);
    }

    #[test]
    fn open_failure_is_fatal() {
        let api = Arc::new(SimulatedApi::new());
        // the library refuses a second open
        api.open().unwrap();
        let error = Session::open(api).unwrap_err();
        assert!(matches!(
            error,
            Error::SdrplayApi {
                function: "sdrplay_api_Open",
                error: ApiError::ALREADY_INITIALISED,
            }
        ));
    }
}

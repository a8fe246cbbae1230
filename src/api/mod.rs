//! Interface to the SDRplay API library.
//!
//! The vendor library is a process-wide C library that owns the USB devices
//! and runs its own threads for sample delivery and events. This module
//! models its surface as the [`Api`] trait, together with Rust mirrors of
//! the data types it exchanges. A binding to the real library implements
//! [`Api`]; the crate itself only ever talks to the trait.

mod params;
#[cfg(any(test, feature = "sim"))]
pub mod sim;

use std::{
    fmt::{
        Debug,
        Display,
    },
    sync::Arc,
};

use bitflags::bitflags;

pub use self::params::{
    Agc,
    AgcControl,
    BwType,
    ControlParams,
    DcOffset,
    DcOffsetTuner,
    Decimation,
    DevParams,
    DeviceParams,
    GainParams,
    IfType,
    Rsp1aParams,
    Rsp1aTunerParams,
    Rsp2AmPortSelect,
    Rsp2AntennaSelect,
    Rsp2Params,
    Rsp2TunerParams,
    RspDuoAmPortSelect,
    RspDuoParams,
    RspDuoTunerParams,
    RspDxAntennaSelect,
    RspDxParams,
    RxChannelParams,
    TunerParams,
};

/// Version of the SDRplay API this crate was written against.
pub const API_VERSION: f32 = 3.15;

/// Maximum number of devices the library reports.
pub const MAX_DEVICES: usize = 16;

/// Status code returned by a failed SDRplay API call.
///
/// Success is represented by `Ok(_)`, so this never holds
/// `sdrplay_api_Success`.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ApiError(pub i32);

impl ApiError {
    pub const FAIL: Self = Self(1);
    pub const INVALID_PARAM: Self = Self(2);
    pub const OUT_OF_RANGE: Self = Self(3);
    pub const GAIN_UPDATE_ERROR: Self = Self(4);
    pub const RF_UPDATE_ERROR: Self = Self(5);
    pub const FS_UPDATE_ERROR: Self = Self(6);
    pub const HW_ERROR: Self = Self(7);
    pub const ALIASING_ERROR: Self = Self(8);
    pub const ALREADY_INITIALISED: Self = Self(9);
    pub const NOT_INITIALISED: Self = Self(10);
    pub const NOT_ENABLED: Self = Self(11);
    pub const HW_VER_ERROR: Self = Self(12);
    pub const OUT_OF_MEM_ERROR: Self = Self(13);
    pub const SERVICE_NOT_RESPONDING: Self = Self(14);
    pub const START_PENDING: Self = Self(15);
    pub const STOP_PENDING: Self = Self(16);
    pub const INVALID_MODE: Self = Self(17);

    /// The error string the library would report for this code.
    pub fn as_str(&self) -> &'static str {
        match *self {
            Self::FAIL => "sdrplay_api_Fail",
            Self::INVALID_PARAM => "sdrplay_api_InvalidParam",
            Self::OUT_OF_RANGE => "sdrplay_api_OutOfRange",
            Self::GAIN_UPDATE_ERROR => "sdrplay_api_GainUpdateError",
            Self::RF_UPDATE_ERROR => "sdrplay_api_RfUpdateError",
            Self::FS_UPDATE_ERROR => "sdrplay_api_FsUpdateError",
            Self::HW_ERROR => "sdrplay_api_HwError",
            Self::ALIASING_ERROR => "sdrplay_api_AliasingError",
            Self::ALREADY_INITIALISED => "sdrplay_api_AlreadyInitialised",
            Self::NOT_INITIALISED => "sdrplay_api_NotInitialised",
            Self::NOT_ENABLED => "sdrplay_api_NotEnabled",
            Self::HW_VER_ERROR => "sdrplay_api_HwVerError",
            Self::OUT_OF_MEM_ERROR => "sdrplay_api_OutOfMemError",
            Self::SERVICE_NOT_RESPONDING => "sdrplay_api_ServiceNotResponding",
            Self::START_PENDING => "sdrplay_api_StartPending",
            Self::STOP_PENDING => "sdrplay_api_StopPending",
            Self::INVALID_MODE => "sdrplay_api_InvalidMode",
            _ => "unknown error",
        }
    }
}

impl Debug for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ApiError({}: {})", self.0, self.as_str())
    }
}

impl Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::error::Error for ApiError {}

/// Hardware version byte reported by the library, identifying the model.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HwVersion(pub u8);

impl HwVersion {
    pub const RSP1: Self = Self(1);
    pub const RSP2: Self = Self(2);
    pub const RSPDUO: Self = Self(3);
    pub const RSPDX: Self = Self(4);
    pub const RSP1B: Self = Self(6);
    pub const RSPDX_R2: Self = Self(7);
    pub const RSP1A: Self = Self(255);
}

impl Debug for HwVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            Self::RSP1 => write!(f, "HwVersion::RSP1"),
            Self::RSP2 => write!(f, "HwVersion::RSP2"),
            Self::RSPDUO => write!(f, "HwVersion::RSPDUO"),
            Self::RSPDX => write!(f, "HwVersion::RSPDX"),
            Self::RSP1B => write!(f, "HwVersion::RSP1B"),
            Self::RSPDX_R2 => write!(f, "HwVersion::RSPDX_R2"),
            Self::RSP1A => write!(f, "HwVersion::RSP1A"),
            _ => write!(f, "HwVersion({})", self.0),
        }
    }
}

/// Tuner selector. On everything but the RSPduo this is always `A`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TunerSelect {
    #[default]
    Neither = 0,
    A = 1,
    B = 2,
    Both = 3,
}

impl TunerSelect {
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0b11 {
            0 => Self::Neither,
            1 => Self::A,
            2 => Self::B,
            _ => Self::Both,
        }
    }

    pub fn bits(self) -> u8 {
        self as u8
    }

    /// Whether `self` and `other` share a tuner.
    pub fn intersects(self, other: Self) -> bool {
        self.bits() & other.bits() != 0
    }
}

bitflags! {
    /// RSPduo operating modes.
    ///
    /// The enumeration reports the set of modes a device can currently be
    /// opened in, selection narrows it to exactly one.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct RspDuoMode: u8 {
        const SINGLE_TUNER = 0x01;
        const DUAL_TUNER = 0x02;
        const MASTER = 0x04;
        const SLAVE = 0x08;
    }
}

/// Opaque handle the library uses to identify a device.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DeviceHandle(pub usize);

/// A device as reported by [`Api::get_devices`].
#[derive(Clone, Debug, PartialEq)]
pub struct DeviceInfo {
    pub serial: String,
    pub hw_version: HwVersion,
    pub tuner: TunerSelect,
    pub rspduo_mode: RspDuoMode,
    pub rspduo_sample_freq: f64,
    pub valid: bool,
    pub handle: DeviceHandle,
}

bitflags! {
    /// Which parameter groups an [`Api::update`] call pushes to the hardware.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct ReasonForUpdate: u32 {
        const DEV_FS = 0x0000_0001;
        const DEV_PPM = 0x0000_0002;
        const DEV_SYNC_UPDATE = 0x0000_0004;
        const DEV_RESET_FLAGS = 0x0000_0008;
        const RSP1A_BIAS_T_CONTROL = 0x0000_0010;
        const RSP1A_RF_NOTCH_CONTROL = 0x0000_0020;
        const RSP1A_RF_DAB_NOTCH_CONTROL = 0x0000_0040;
        const RSP2_BIAS_T_CONTROL = 0x0000_0080;
        const RSP2_AM_PORT_SELECT = 0x0000_0100;
        const RSP2_ANTENNA_CONTROL = 0x0000_0200;
        const RSP2_RF_NOTCH_CONTROL = 0x0000_0400;
        const RSP2_EXT_REF_CONTROL = 0x0000_0800;
        const RSPDUO_EXT_REF_CONTROL = 0x0000_1000;
        const MASTER_SPARE_1 = 0x0000_2000;
        const MASTER_SPARE_2 = 0x0000_4000;
        const TUNER_GR = 0x0000_8000;
        const TUNER_GR_LIMITS = 0x0001_0000;
        const TUNER_FRF = 0x0002_0000;
        const TUNER_BW_TYPE = 0x0004_0000;
        const TUNER_IF_TYPE = 0x0008_0000;
        const TUNER_DC_OFFSET = 0x0010_0000;
        const TUNER_LO_MODE = 0x0020_0000;
        const CTRL_DC_OFFSET_IQ_IMBALANCE = 0x0040_0000;
        const CTRL_DECIMATION = 0x0080_0000;
        const CTRL_AGC = 0x0100_0000;
        const CTRL_ADSB_MODE = 0x0200_0000;
        const CTRL_OVERLOAD_MSG_ACK = 0x0400_0000;
        const RSPDUO_BIAS_T_CONTROL = 0x0800_0000;
        const RSPDUO_AM_PORT_SELECT = 0x1000_0000;
        const RSPDUO_TUNER1_AM_NOTCH_CONTROL = 0x2000_0000;
        const RSPDUO_RF_NOTCH_CONTROL = 0x4000_0000;
        const RSPDUO_RF_DAB_NOTCH_CONTROL = 0x8000_0000;
    }
}

bitflags! {
    /// Second word of update reasons, used by the RSPdx family.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct ReasonForUpdateExt1: u32 {
        const RSPDX_HDR_ENABLE = 0x0000_0001;
        const RSPDX_BIAS_T_CONTROL = 0x0000_0002;
        const RSPDX_ANTENNA_CONTROL = 0x0000_0004;
        const RSPDX_RF_NOTCH_CONTROL = 0x0000_0008;
        const RSPDX_RF_DAB_NOTCH_CONTROL = 0x0000_0010;
        const RSPDX_HDR_BW = 0x0000_0020;
        const RSPDUO_RESET_SLAVE_FLAGS = 0x0000_0040;
    }
}

/// Metadata passed along with every burst of samples.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StreamCbParams {
    pub first_sample_num: u32,
    /// gain reduction change took effect
    pub gr_changed: bool,
    /// center frequency change took effect
    pub rf_changed: bool,
    /// sample rate change took effect
    pub fs_changed: bool,
    pub num_samples: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PowerOverloadChange {
    Detected,
    Corrected,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RspDuoModeChange {
    MasterInitialised,
    SlaveAttached,
    SlaveDetached,
    SlaveInitialised,
    SlaveUninitialised,
    MasterDllDisappeared,
    SlaveDllDisappeared,
}

/// Asynchronous notifications delivered through [`Callbacks::event`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Event {
    GainChange {
        gr_db: u32,
        lna_gr_db: u32,
        current_gain: f64,
    },
    PowerOverloadChange(PowerOverloadChange),
    DeviceRemoved,
    RspDuoModeChange(RspDuoModeChange),
    DeviceFailure,
}

/// Callbacks registered with [`Api::init`].
///
/// These are invoked on threads owned by the library. The stream callbacks
/// for A and B may run concurrently with each other, but never with
/// themselves.
pub trait Callbacks: Send + Sync {
    fn stream_a(&self, xi: &[i16], xq: &[i16], params: &StreamCbParams, reset: bool);

    fn stream_b(&self, xi: &[i16], xq: &[i16], params: &StreamCbParams, reset: bool);

    fn event(&self, event: Event, tuner: TunerSelect);
}

/// The SDRplay API library.
///
/// Device parameters are owned by the caller and pushed with [`Api::init`]
/// and [`Api::update`].
pub trait Api: Send + Sync {
    fn open(&self) -> Result<(), ApiError>;

    fn close(&self) -> Result<(), ApiError>;

    fn api_version(&self) -> Result<f32, ApiError>;

    fn lock_device_api(&self) -> Result<(), ApiError>;

    fn unlock_device_api(&self) -> Result<(), ApiError>;

    fn get_devices(&self) -> Result<Vec<DeviceInfo>, ApiError>;

    /// Take exclusive ownership of a device. `device` carries the requested
    /// tuner and RSPduo mode.
    fn select_device(&self, device: &DeviceInfo) -> Result<(), ApiError>;

    fn release_device(&self, device: &DeviceInfo) -> Result<(), ApiError>;

    /// Default parameters for a selected device.
    fn get_device_params(&self, handle: DeviceHandle) -> Result<DeviceParams, ApiError>;

    /// Start streaming. The library keeps `callbacks` until [`Api::uninit`].
    fn init(
        &self,
        handle: DeviceHandle,
        params: &DeviceParams,
        callbacks: Arc<dyn Callbacks>,
    ) -> Result<(), ApiError>;

    fn uninit(&self, handle: DeviceHandle) -> Result<(), ApiError>;

    fn update(
        &self,
        handle: DeviceHandle,
        tuner: TunerSelect,
        params: &DeviceParams,
        reason: ReasonForUpdate,
        reason_ext1: ReasonForUpdateExt1,
    ) -> Result<(), ApiError>;

    /// Swap the active tuner of an RSPduo in single tuner mode while
    /// streaming. Returns the now active tuner.
    fn swap_rspduo_active_tuner(
        &self,
        handle: DeviceHandle,
        current: TunerSelect,
        tuner1_am_port: RspDuoAmPortSelect,
    ) -> Result<TunerSelect, ApiError>;

    fn debug_enable(&self, handle: DeviceHandle, enable: bool) -> Result<(), ApiError>;
}

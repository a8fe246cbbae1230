//! # Streaming driver for SDRplay RSP receivers
//!
//! This crate drives the SDRplay family of USB receivers (RSP1, RSP1A,
//! RSP1B, RSP2, RSPduo, RSPdx and RSPdx-R2) through the SDRplay API
//! library, and exposes each device as a pull based sample source.
//!
//! The library is abstracted behind the [`api::Api`] trait. Open a
//! [`Session`] with an implementation of it, then open an [`Rsp`] for a
//! device:
//!
//! ```ignore
//! let session = Session::open(api)?;
//! let mut rsp = Rsp::open(session, Model::Rsp1a, "", RspOptions::default())?;
//! rsp.set_sample_rate(2e6);
//! rsp.set_center_freq(100e6);
//! rsp.start()?;
//! let mut samples = vec![Complex::default(); 4096];
//! let n = rsp.work(&mut [&mut samples[..]]);
//! ```
//!
//! # Internals
//!
//! The library delivers samples on its own threads. They are copied into a
//! ring buffer per stream, from which [`Rsp::work`] copies them out again,
//! blocking on either side when the buffer is full or empty. Parameter
//! changes are pushed to the hardware with an update call, and by default
//! the control thread waits until the stream callback reports that the
//! change took effect.

pub mod api;
mod bridge;
mod capabilities;
mod command;
mod controller;
mod enumerate;
mod events;
mod ring_buffer;
mod session;
mod update;

use std::{
    str::FromStr,
    time::Duration,
};

use bytemuck::{
    Pod,
    Zeroable,
};
use num_complex::Complex;

pub use crate::{
    api::ApiError,
    bridge::RunStatus,
    capabilities::{
        BANDWIDTHS,
        Capabilities,
        GainTableMode,
        Model,
        auto_bandwidth,
        closest_lna_state,
    },
    command::{
        CommandSender,
        CommandValue,
    },
    controller::{
        Bandwidth,
        Rsp,
        RspDuoModeSelect,
        SampleRates,
    },
    enumerate::{
        Selector,
        devices,
    },
    ring_buffer::DEFAULT_RING_BUFFER_SIZE,
    session::Session,
    update::DEFAULT_UPDATE_TIMEOUT,
};

/// Errors returned when opening or starting a device.
///
/// Setters never fail. They log problems and return the current value.
#[derive(Clone, Debug, thiserror::Error)]
pub enum Error {
    #[error("sdrplay api error: {function} returned {error}")]
    SdrplayApi {
        function: &'static str,
        error: ApiError,
    },
    #[error("sdrplay device not found: {selector:?}")]
    DeviceNotFound { selector: String },
    #[error("invalid RSPduo mode")]
    InvalidRspDuoMode,
    #[error("invalid RSPduo antenna")]
    InvalidRspDuoAntenna,
    #[error("unknown RSPduo mode: {mode:?}")]
    UnknownRspDuoMode { mode: String },
    #[error("unknown output type: {output_type:?}")]
    UnknownOutputType { output_type: String },
    #[error("failed to allocate ring buffer of {capacity} samples")]
    BufferAllocation { capacity: usize },
    #[error("sample type {requested:?} doesn't match output type {configured:?}")]
    WrongSampleType {
        requested: OutputType,
        configured: OutputType,
    },
    #[error("command channel closed")]
    CommandChannelClosed,
    #[error("invalid value for command {key:?}: {value:?}")]
    InvalidCommandValue { key: String, value: CommandValue },
}

impl Error {
    pub(crate) fn from_api(function: &'static str, error: ApiError) -> Self {
        Self::SdrplayApi { function, error }
    }
}

/// A closed interval, used for frequency, sample rate and gain ranges.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Range {
    pub min: f64,
    pub max: f64,
}

impl Range {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

/// Sample format handed out by [`Rsp::work`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum OutputType {
    /// interleaved 32 bit float complex, scaled to [-1, 1)
    #[default]
    Fc32,
    /// interleaved 16 bit integer pairs, as delivered by the hardware
    Sc16,
}

impl OutputType {
    /// Size of one sample in bytes.
    pub fn item_size(&self) -> usize {
        match self {
            Self::Fc32 => std::mem::size_of::<Complex<f32>>(),
            Self::Sc16 => std::mem::size_of::<Sc16>(),
        }
    }
}

impl FromStr for OutputType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fc32" => Ok(Self::Fc32),
            "sc16" => Ok(Self::Sc16),
            _ => {
                Err(Error::UnknownOutputType {
                    output_type: s.to_owned(),
                })
            }
        }
    }
}

/// 16 bit IQ sample, as delivered by the hardware.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct Sc16 {
    /// I: in-phase / real component
    pub i: i16,
    /// Q: quadrature / imaginary component
    pub q: i16,
}

/// Sample types [`Rsp::work`] can produce.
pub trait Sample: Pod + Send + 'static {
    const OUTPUT_TYPE: OutputType;

    fn from_iq(i: i16, q: i16) -> Self;
}

impl Sample for Complex<f32> {
    const OUTPUT_TYPE: OutputType = OutputType::Fc32;

    fn from_iq(i: i16, q: i16) -> Self {
        Complex::new(f32::from(i) / 32768.0, f32::from(q) / 32768.0)
    }
}

impl Sample for Sc16 {
    const OUTPUT_TYPE: OutputType = OutputType::Sc16;

    fn from_iq(i: i16, q: i16) -> Self {
        Self { i, q }
    }
}

/// Output stream configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StreamArgs {
    pub output_type: OutputType,
    /// number of output streams. 2 is only valid for an RSPduo in dual tuner
    /// mode.
    pub channels: usize,
}

impl Default for StreamArgs {
    fn default() -> Self {
        Self {
            output_type: OutputType::Fc32,
            channels: 1,
        }
    }
}

/// Options for opening an [`Rsp`].
#[derive(Clone, Debug)]
pub struct RspOptions {
    pub stream_args: StreamArgs,

    /// how long a synchronous update waits for the hardware to acknowledge
    pub update_timeout: Duration,

    /// wait for sample rate, frequency and gain changes to take effect
    /// before a setter returns
    pub synchronous_updates: bool,

    /// capacity of each ring buffer in samples. must be a power of two.
    pub ring_buffer_size: usize,
}

impl Default for RspOptions {
    fn default() -> Self {
        Self {
            stream_args: StreamArgs::default(),
            update_timeout: DEFAULT_UPDATE_TIMEOUT,
            synchronous_updates: true,
            ring_buffer_size: DEFAULT_RING_BUFFER_SIZE,
        }
    }
}

//! Device and receive channel parameters exchanged with the library.
//!
//! [`Default`] gives the values the library reports for a freshly selected
//! device.

use crate::api::TunerSelect;

/// IF bandwidth in kHz.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct BwType(pub u32);

impl BwType {
    pub const UNDEFINED: Self = Self(0);
    pub const BW_0_200: Self = Self(200);
    pub const BW_0_300: Self = Self(300);
    pub const BW_0_600: Self = Self(600);
    pub const BW_1_536: Self = Self(1536);
    pub const BW_5_000: Self = Self(5000);
    pub const BW_6_000: Self = Self(6000);
    pub const BW_7_000: Self = Self(7000);
    pub const BW_8_000: Self = Self(8000);

    pub fn hz(self) -> f64 {
        f64::from(self.0) * 1e3
    }
}

/// Intermediate frequency in kHz.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct IfType(pub i32);

impl IfType {
    pub const UNDEFINED: Self = Self(-1);
    pub const ZERO: Self = Self(0);
    pub const IF_0_450: Self = Self(450);
    pub const IF_1_620: Self = Self(1620);
    pub const IF_2_048: Self = Self(2048);
}

impl Default for IfType {
    fn default() -> Self {
        Self::ZERO
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AgcControl {
    #[default]
    Disable,
    Hz100,
    Hz50,
    Hz5,
    /// loop parameters are taken from [`Agc`]
    ControlEnable,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Rsp2AntennaSelect {
    #[default]
    A,
    B,
}

/// AM port 1 is the Hi-Z input.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Rsp2AmPortSelect {
    Port1,
    #[default]
    Port2,
}

/// AM port 1 is the High Z input of tuner 1.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RspDuoAmPortSelect {
    Port1,
    #[default]
    Port2,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RspDxAntennaSelect {
    #[default]
    A,
    B,
    C,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Rsp1aParams {
    pub rf_notch_enable: bool,
    pub rf_dab_notch_enable: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Rsp2Params {
    pub ext_ref_output_enable: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RspDuoParams {
    pub ext_ref_output_enable: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RspDxParams {
    pub hdr_enable: bool,
    pub bias_t_enable: bool,
    pub antenna_sel: RspDxAntennaSelect,
    pub rf_notch_enable: bool,
    pub rf_dab_notch_enable: bool,
}

/// Parameters shared by all tuners of a device. Slave devices don't have
/// these.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DevParams {
    pub ppm: f64,
    pub fs_hz: f64,
    pub rsp1a: Rsp1aParams,
    pub rsp2: Rsp2Params,
    pub rspduo: RspDuoParams,
    pub rspdx: RspDxParams,
}

impl Default for DevParams {
    fn default() -> Self {
        Self {
            ppm: 0.0,
            fs_hz: 2e6,
            rsp1a: Default::default(),
            rsp2: Default::default(),
            rspduo: Default::default(),
            rspdx: Default::default(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GainParams {
    /// IF gain reduction in dB
    pub gr_db: u32,
    pub lna_state: u8,
}

impl Default for GainParams {
    fn default() -> Self {
        Self {
            gr_db: 50,
            lna_state: 0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DcOffsetTuner {
    pub dc_cal: u8,
    pub speed_up: u8,
    pub track_time: u32,
}

impl Default for DcOffsetTuner {
    fn default() -> Self {
        Self {
            dc_cal: 3,
            speed_up: 0,
            track_time: 1,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TunerParams {
    pub bw_type: BwType,
    pub if_type: IfType,
    pub rf_hz: f64,
    pub gain: GainParams,
    pub dc_offset_tuner: DcOffsetTuner,
}

impl Default for TunerParams {
    fn default() -> Self {
        Self {
            bw_type: BwType::BW_0_200,
            if_type: IfType::ZERO,
            rf_hz: 200e6,
            gain: Default::default(),
            dc_offset_tuner: Default::default(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DcOffset {
    pub dc_enable: bool,
    pub iq_enable: bool,
}

impl Default for DcOffset {
    fn default() -> Self {
        Self {
            dc_enable: true,
            iq_enable: true,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Decimation {
    pub enable: bool,
    pub decimation_factor: u8,
}

impl Default for Decimation {
    fn default() -> Self {
        Self {
            enable: false,
            decimation_factor: 1,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Agc {
    pub enable: AgcControl,
    pub set_point_dbfs: i32,
    pub attack_ms: u16,
    pub decay_ms: u16,
    pub decay_delay_ms: u16,
    pub decay_threshold_db: u16,
    pub sync_update: i32,
}

impl Default for Agc {
    fn default() -> Self {
        Self {
            enable: AgcControl::Hz50,
            set_point_dbfs: -60,
            attack_ms: 0,
            decay_ms: 0,
            decay_delay_ms: 0,
            decay_threshold_db: 0,
            sync_update: 0,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ControlParams {
    pub dc_offset: DcOffset,
    pub decimation: Decimation,
    pub agc: Agc,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Rsp1aTunerParams {
    pub bias_t_enable: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Rsp2TunerParams {
    pub bias_t_enable: bool,
    pub am_port_sel: Rsp2AmPortSelect,
    pub antenna_sel: Rsp2AntennaSelect,
    pub rf_notch_enable: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RspDuoTunerParams {
    pub bias_t_enable: bool,
    pub tuner1_am_port_sel: RspDuoAmPortSelect,
    pub tuner1_am_notch_enable: bool,
    pub rf_notch_enable: bool,
    pub rf_dab_notch_enable: bool,
}

/// Parameters of one receive channel (tuner).
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RxChannelParams {
    pub tuner: TunerParams,
    pub ctrl: ControlParams,
    pub rsp1a_tuner: Rsp1aTunerParams,
    pub rsp2_tuner: Rsp2TunerParams,
    pub rspduo_tuner: RspDuoTunerParams,
}

/// All parameters of a selected device.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DeviceParams {
    pub dev: Option<DevParams>,
    pub rx_channel_a: RxChannelParams,
    /// only present on an RSPduo
    pub rx_channel_b: Option<RxChannelParams>,
}

impl DeviceParams {
    /// The receive channel for `tuner`. Anything but `B` addresses
    /// channel A.
    pub fn rx_channel(&self, tuner: TunerSelect) -> &RxChannelParams {
        match (tuner, &self.rx_channel_b) {
            (TunerSelect::B, Some(channel)) => channel,
            _ => &self.rx_channel_a,
        }
    }

    pub fn rx_channel_mut(&mut self, tuner: TunerSelect) -> &mut RxChannelParams {
        match (tuner, &mut self.rx_channel_b) {
            (TunerSelect::B, Some(channel)) => channel,
            _ => &mut self.rx_channel_a,
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::api::{
        DeviceParams,
        RxChannelParams,
        TunerSelect,
    };

    #[test]
    fn tuner_b_falls_back_to_channel_a_without_second_channel() {
        let mut params = DeviceParams::default();
        params.rx_channel_mut(TunerSelect::B).tuner.rf_hz = 100e6;
        assert_eq!(params.rx_channel_a.tuner.rf_hz, 100e6);
    }

    #[test]
    fn tuner_b_addresses_second_channel() {
        let mut params = DeviceParams {
            rx_channel_b: Some(RxChannelParams::default()),
            ..Default::default()
        };
        params.rx_channel_mut(TunerSelect::B).tuner.rf_hz = 100e6;
        assert_eq!(params.rx_channel(TunerSelect::B).tuner.rf_hz, 100e6);
        assert_eq!(params.rx_channel(TunerSelect::Both).tuner.rf_hz, 200e6);
    }
}

//! Per-model capability tables.
//!
//! Everything here is static data and pure lookups. The per-model
//! differences in where a setting lives in the parameter structures are
//! expressed as plain functions stored in [`Capabilities`].

use crate::{
    Range,
    api::{
        BwType,
        DeviceParams,
        HwVersion,
        IfType,
        ReasonForUpdate,
        ReasonForUpdateExt1,
        Rsp2AmPortSelect,
        Rsp2AntennaSelect,
        RspDuoAmPortSelect,
        RspDxAntennaSelect,
        TunerSelect,
    },
};

/// Frequencies a device can tune to.
pub const FREQUENCY_RANGE: Range = Range::new(1e3, 2000e6);

/// IF gain range in dB.
pub const IF_GAIN_RANGE: Range = Range::new(-59.0, -20.0);

/// Sample rates of single tuner operation.
pub const SAMPLE_RATE_RANGE: Range = Range::new(62.5e3, 10.66e6);

/// Sample rates of an RSPduo in dual tuner, master or slave mode.
pub const RSPDUO_SAMPLE_RATES: &[f64] = &[62.5e3, 125e3, 250e3, 500e3, 1000e3, 2000e3];

/// Sample rates that use low-IF mode with a 6 MHz ADC clock.
const LOW_IF_SAMPLE_RATES: &[f64] = &[62.5e3, 125e3, 250e3, 500e3, 1000e3, 2000e3];

/// IF bandwidths supported by the tuners, in Hz.
pub const BANDWIDTHS: &[f64] = &[
    200e3, 300e3, 600e3, 1536e3, 5000e3, 6000e3, 7000e3, 8000e3,
];

pub const GAIN_NAMES: &[&str] = &["IF", "RF", "LNAstate"];

/// The RSP models.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Model {
    Rsp1,
    Rsp1a,
    Rsp1b,
    Rsp2,
    RspDuo,
    RspDx,
    RspDxR2,
}

impl Model {
    pub const ALL: [Model; 7] = [
        Self::Rsp1,
        Self::Rsp1a,
        Self::Rsp1b,
        Self::Rsp2,
        Self::RspDuo,
        Self::RspDx,
        Self::RspDxR2,
    ];

    pub fn hw_version(self) -> HwVersion {
        match self {
            Self::Rsp1 => HwVersion::RSP1,
            Self::Rsp1a => HwVersion::RSP1A,
            Self::Rsp1b => HwVersion::RSP1B,
            Self::Rsp2 => HwVersion::RSP2,
            Self::RspDuo => HwVersion::RSPDUO,
            Self::RspDx => HwVersion::RSPDX,
            Self::RspDxR2 => HwVersion::RSPDX_R2,
        }
    }

    pub fn from_hw_version(hw_version: HwVersion) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|model| model.hw_version() == hw_version)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Rsp1 => "RSP1",
            Self::Rsp1a => "RSP1A",
            Self::Rsp1b => "RSP1B",
            Self::Rsp2 => "RSP2",
            Self::RspDuo => "RSPduo",
            Self::RspDx => "RSPdx",
            Self::RspDxR2 => "RSPdx-R2",
        }
    }

    pub fn capabilities(self) -> &'static Capabilities {
        match self {
            Self::Rsp1 => &RSP1,
            Self::Rsp1a => &RSP1A,
            Self::Rsp1b => &RSP1B,
            Self::Rsp2 => &RSP2,
            Self::RspDuo => &RSPDUO,
            Self::RspDx => &RSPDX,
            Self::RspDxR2 => &RSPDX_R2,
        }
    }
}

/// Modes that select between RF gain reduction tables besides frequency.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GainTableMode {
    /// the Hi-Z input is in use
    pub high_z: bool,
    /// HDR mode is enabled
    pub hdr: bool,
}

/// A set of parameter groups that have to be pushed to the hardware.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct Change {
    pub reason: ReasonForUpdate,
    pub reason_ext1: ReasonForUpdateExt1,
}

impl Change {
    pub const NONE: Self = Self {
        reason: ReasonForUpdate::empty(),
        reason_ext1: ReasonForUpdateExt1::empty(),
    };

    pub const fn reason(reason: ReasonForUpdate) -> Self {
        Self {
            reason,
            reason_ext1: ReasonForUpdateExt1::empty(),
        }
    }

    pub const fn ext1(reason_ext1: ReasonForUpdateExt1) -> Self {
        Self {
            reason: ReasonForUpdate::empty(),
            reason_ext1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.reason.is_empty() && self.reason_ext1.is_empty()
    }
}

impl std::ops::BitOrAssign<ReasonForUpdate> for Change {
    fn bitor_assign(&mut self, rhs: ReasonForUpdate) {
        self.reason |= rhs;
    }
}

/// An on/off setting and the update that pushes it.
#[derive(Clone, Copy, derive_more::Debug)]
pub(crate) struct Toggle {
    /// the flag in the parameters, if the parameter block is present
    #[debug(skip)]
    pub field: fn(&mut DeviceParams, TunerSelect) -> Option<&mut bool>,
    pub change: Change,
}

impl Toggle {
    pub fn get(&self, params: &DeviceParams, tuner: TunerSelect) -> Option<bool> {
        let mut params = params.clone();
        (self.field)(&mut params, tuner).map(|flag| *flag)
    }
}

/// How a model selects its antenna.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum AntennaKind {
    Fixed,
    Rsp2,
    RspDx,
    RspDuo,
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct Rsp2Antenna {
    pub name: &'static str,
    pub antenna_sel: Rsp2AntennaSelect,
    pub am_port_sel: Rsp2AmPortSelect,
}

pub(crate) const RSP2_ANTENNAS: &[Rsp2Antenna] = &[
    Rsp2Antenna {
        name: "Antenna A",
        antenna_sel: Rsp2AntennaSelect::A,
        am_port_sel: Rsp2AmPortSelect::Port2,
    },
    Rsp2Antenna {
        name: "Antenna B",
        antenna_sel: Rsp2AntennaSelect::B,
        am_port_sel: Rsp2AmPortSelect::Port2,
    },
    Rsp2Antenna {
        name: "Hi-Z",
        antenna_sel: Rsp2AntennaSelect::A,
        am_port_sel: Rsp2AmPortSelect::Port1,
    },
];

pub(crate) const RSPDX_ANTENNAS: &[(&str, RspDxAntennaSelect)] = &[
    ("Antenna A", RspDxAntennaSelect::A),
    ("Antenna B", RspDxAntennaSelect::B),
    ("Antenna C", RspDxAntennaSelect::C),
];

#[derive(Clone, Copy, Debug)]
pub(crate) struct RspDuoAntenna {
    pub name: &'static str,
    pub tuner: TunerSelect,
    pub am_port_sel: RspDuoAmPortSelect,
}

pub(crate) const RSPDUO_ANTENNAS: &[RspDuoAntenna] = &[
    RspDuoAntenna {
        name: "Both Tuners",
        tuner: TunerSelect::Both,
        am_port_sel: RspDuoAmPortSelect::Port2,
    },
    RspDuoAntenna {
        name: "High Z",
        tuner: TunerSelect::A,
        am_port_sel: RspDuoAmPortSelect::Port1,
    },
    RspDuoAntenna {
        name: "Tuner 1 50 ohm",
        tuner: TunerSelect::A,
        am_port_sel: RspDuoAmPortSelect::Port2,
    },
    RspDuoAntenna {
        name: "Tuner 2 50 ohm",
        tuner: TunerSelect::B,
        am_port_sel: RspDuoAmPortSelect::Port2,
    },
];

pub(crate) fn rspduo_antenna(name: &str) -> Option<&'static RspDuoAntenna> {
    RSPDUO_ANTENNAS.iter().find(|antenna| antenna.name == name)
}

/// What a model can do, and where its settings live.
#[derive(derive_more::Debug)]
pub struct Capabilities {
    pub model: Model,
    #[debug(skip)]
    pub(crate) rf_gain_reductions: fn(f64, GainTableMode) -> &'static [i32],
    #[debug(skip)]
    pub(crate) gain_table_mode: fn(&DeviceParams, TunerSelect) -> GainTableMode,
    pub(crate) antennas: AntennaKind,
    pub(crate) rf_notch: Option<Toggle>,
    pub(crate) dab_notch: Option<Toggle>,
    pub(crate) am_notch: Option<Toggle>,
    pub(crate) bias_t: Option<Toggle>,
    pub(crate) hdr: Option<Toggle>,
}

impl Capabilities {
    /// RF gain reduction steps in dB, indexed by LNA state.
    pub fn rf_gain_reductions(&self, frequency: f64, mode: GainTableMode) -> &'static [i32] {
        (self.rf_gain_reductions)(frequency, mode)
    }

    pub fn has_rf_notch(&self) -> bool {
        self.rf_notch.is_some()
    }

    pub fn has_dab_notch(&self) -> bool {
        self.dab_notch.is_some()
    }

    pub fn has_am_notch(&self) -> bool {
        self.am_notch.is_some()
    }

    pub fn has_bias_t(&self) -> bool {
        self.bias_t.is_some()
    }

    pub fn has_hdr(&self) -> bool {
        self.hdr.is_some()
    }
}

fn no_gain_table_mode(_params: &DeviceParams, _tuner: TunerSelect) -> GainTableMode {
    GainTableMode::default()
}

fn rsp2_gain_table_mode(params: &DeviceParams, tuner: TunerSelect) -> GainTableMode {
    let rsp2 = &params.rx_channel(tuner).rsp2_tuner;
    GainTableMode {
        high_z: rsp2.antenna_sel == Rsp2AntennaSelect::A
            && rsp2.am_port_sel == Rsp2AmPortSelect::Port1,
        hdr: false,
    }
}

fn rspduo_gain_table_mode(params: &DeviceParams, tuner: TunerSelect) -> GainTableMode {
    GainTableMode {
        high_z: tuner == TunerSelect::A
            && params.rx_channel(tuner).rspduo_tuner.tuner1_am_port_sel
                == RspDuoAmPortSelect::Port1,
        hdr: false,
    }
}

fn rspdx_gain_table_mode(params: &DeviceParams, _tuner: TunerSelect) -> GainTableMode {
    GainTableMode {
        high_z: false,
        hdr: params.dev.is_some_and(|dev| dev.rspdx.hdr_enable),
    }
}

fn rsp1_gain_reductions(frequency: f64, _mode: GainTableMode) -> &'static [i32] {
    if frequency <= 420e6 {
        &[0, 24, 19, 43]
    }
    else if frequency <= 1000e6 {
        &[0, 7, 19, 26]
    }
    else if frequency <= 2000e6 {
        &[0, 5, 19, 24]
    }
    else {
        &[]
    }
}

fn rsp1a_gain_reductions(frequency: f64, _mode: GainTableMode) -> &'static [i32] {
    if frequency <= 60e6 {
        &[0, 6, 12, 18, 37, 42, 61]
    }
    else if frequency <= 420e6 {
        &[0, 6, 12, 18, 20, 26, 32, 38, 57, 62]
    }
    else if frequency <= 1000e6 {
        &[0, 7, 13, 19, 20, 27, 33, 39, 45, 64]
    }
    else if frequency <= 2000e6 {
        &[0, 6, 12, 20, 26, 32, 38, 43, 62]
    }
    else {
        &[]
    }
}

fn rsp1b_gain_reductions(frequency: f64, _mode: GainTableMode) -> &'static [i32] {
    if frequency <= 50e6 {
        &[0, 6, 12, 18, 37, 42, 61]
    }
    else if frequency <= 420e6 {
        &[0, 6, 12, 18, 20, 26, 32, 38, 57, 62]
    }
    else if frequency <= 1000e6 {
        &[0, 7, 13, 19, 20, 27, 33, 39, 45, 64]
    }
    else if frequency <= 2000e6 {
        &[0, 6, 12, 20, 26, 32, 38, 43, 62]
    }
    else {
        &[]
    }
}

fn rsp2_gain_reductions(frequency: f64, mode: GainTableMode) -> &'static [i32] {
    if frequency <= 60e6 && mode.high_z {
        &[0, 6, 12, 18, 37]
    }
    else if frequency <= 420e6 {
        &[0, 10, 15, 21, 24, 34, 39, 45, 64]
    }
    else if frequency <= 1000e6 {
        &[0, 7, 10, 17, 22, 41]
    }
    else if frequency <= 2000e6 {
        &[0, 5, 21, 15, 15, 34]
    }
    else {
        &[]
    }
}

fn rspduo_gain_reductions(frequency: f64, mode: GainTableMode) -> &'static [i32] {
    if frequency <= 60e6 && !mode.high_z {
        &[0, 6, 12, 18, 37, 42, 61]
    }
    else if frequency <= 60e6 {
        &[0, 6, 12, 18, 37]
    }
    else if frequency <= 420e6 {
        &[0, 6, 12, 18, 20, 26, 32, 38, 57, 62]
    }
    else if frequency <= 1000e6 {
        &[0, 7, 13, 19, 20, 27, 33, 39, 45, 64]
    }
    else if frequency <= 2000e6 {
        &[0, 6, 12, 20, 26, 32, 38, 43, 62]
    }
    else {
        &[]
    }
}

fn rspdx_gain_reductions(frequency: f64, mode: GainTableMode) -> &'static [i32] {
    if frequency <= 2e6 && mode.hdr {
        &[
            0, 3, 6, 9, 12, 15, 18, 21, 24, 25, 27, 30, 33, 36, 39, 42, 45, 48, 51, 54, 57, 60,
        ]
    }
    else if frequency <= 12e6 {
        &[
            0, 3, 6, 9, 12, 15, 24, 27, 30, 33, 36, 39, 42, 45, 48, 51, 54, 57, 60,
        ]
    }
    else if frequency <= 60e6 {
        &[
            0, 3, 6, 9, 12, 15, 18, 24, 27, 30, 33, 36, 39, 42, 45, 48, 51, 54, 57, 60,
        ]
    }
    else if frequency <= 250e6 {
        &[
            0, 3, 6, 9, 12, 15, 24, 27, 30, 33, 36, 39, 42, 45, 48, 51, 54, 57, 60, 63, 66, 69,
            72, 75, 78, 81, 84,
        ]
    }
    else if frequency <= 420e6 {
        &[
            0, 3, 6, 9, 12, 15, 18, 24, 27, 30, 33, 36, 39, 42, 45, 48, 51, 54, 57, 60, 63, 66,
            69, 72, 75, 78, 81, 84,
        ]
    }
    else if frequency <= 1000e6 {
        &[
            0, 7, 10, 13, 16, 19, 22, 25, 31, 34, 37, 40, 43, 46, 49, 52, 55, 58, 61, 64, 67,
        ]
    }
    else if frequency <= 2000e6 {
        &[
            0, 5, 8, 11, 14, 17, 20, 32, 35, 38, 41, 44, 47, 50, 53, 56, 59, 62, 65,
        ]
    }
    else {
        &[]
    }
}

fn rsp1a_rf_notch(params: &mut DeviceParams, _tuner: TunerSelect) -> Option<&mut bool> {
    params
        .dev
        .as_mut()
        .map(|dev| &mut dev.rsp1a.rf_notch_enable)
}

fn rsp1a_dab_notch(params: &mut DeviceParams, _tuner: TunerSelect) -> Option<&mut bool> {
    params
        .dev
        .as_mut()
        .map(|dev| &mut dev.rsp1a.rf_dab_notch_enable)
}

fn rsp1a_bias_t(params: &mut DeviceParams, tuner: TunerSelect) -> Option<&mut bool> {
    Some(&mut params.rx_channel_mut(tuner).rsp1a_tuner.bias_t_enable)
}

fn rsp2_rf_notch(params: &mut DeviceParams, tuner: TunerSelect) -> Option<&mut bool> {
    Some(&mut params.rx_channel_mut(tuner).rsp2_tuner.rf_notch_enable)
}

fn rsp2_bias_t(params: &mut DeviceParams, tuner: TunerSelect) -> Option<&mut bool> {
    Some(&mut params.rx_channel_mut(tuner).rsp2_tuner.bias_t_enable)
}

fn rspduo_rf_notch(params: &mut DeviceParams, tuner: TunerSelect) -> Option<&mut bool> {
    Some(&mut params.rx_channel_mut(tuner).rspduo_tuner.rf_notch_enable)
}

fn rspduo_dab_notch(params: &mut DeviceParams, tuner: TunerSelect) -> Option<&mut bool> {
    Some(&mut params.rx_channel_mut(tuner).rspduo_tuner.rf_dab_notch_enable)
}

fn rspduo_am_notch(params: &mut DeviceParams, tuner: TunerSelect) -> Option<&mut bool> {
    Some(&mut params.rx_channel_mut(tuner).rspduo_tuner.tuner1_am_notch_enable)
}

fn rspduo_bias_t(params: &mut DeviceParams, tuner: TunerSelect) -> Option<&mut bool> {
    Some(&mut params.rx_channel_mut(tuner).rspduo_tuner.bias_t_enable)
}

fn rspdx_rf_notch(params: &mut DeviceParams, _tuner: TunerSelect) -> Option<&mut bool> {
    params
        .dev
        .as_mut()
        .map(|dev| &mut dev.rspdx.rf_notch_enable)
}

fn rspdx_dab_notch(params: &mut DeviceParams, _tuner: TunerSelect) -> Option<&mut bool> {
    params
        .dev
        .as_mut()
        .map(|dev| &mut dev.rspdx.rf_dab_notch_enable)
}

fn rspdx_bias_t(params: &mut DeviceParams, _tuner: TunerSelect) -> Option<&mut bool> {
    params
        .dev
        .as_mut()
        .map(|dev| &mut dev.rspdx.bias_t_enable)
}

fn rspdx_hdr(params: &mut DeviceParams, _tuner: TunerSelect) -> Option<&mut bool> {
    params.dev.as_mut().map(|dev| &mut dev.rspdx.hdr_enable)
}

const RSP1: Capabilities = Capabilities {
    model: Model::Rsp1,
    rf_gain_reductions: rsp1_gain_reductions,
    gain_table_mode: no_gain_table_mode,
    antennas: AntennaKind::Fixed,
    rf_notch: None,
    dab_notch: None,
    am_notch: None,
    bias_t: None,
    hdr: None,
};

const RSP1A: Capabilities = Capabilities {
    model: Model::Rsp1a,
    rf_gain_reductions: rsp1a_gain_reductions,
    gain_table_mode: no_gain_table_mode,
    antennas: AntennaKind::Fixed,
    rf_notch: Some(Toggle {
        field: rsp1a_rf_notch,
        change: Change::reason(ReasonForUpdate::RSP1A_RF_NOTCH_CONTROL),
    }),
    dab_notch: Some(Toggle {
        field: rsp1a_dab_notch,
        change: Change::reason(ReasonForUpdate::RSP1A_RF_DAB_NOTCH_CONTROL),
    }),
    am_notch: None,
    bias_t: Some(Toggle {
        field: rsp1a_bias_t,
        change: Change::reason(ReasonForUpdate::RSP1A_BIAS_T_CONTROL),
    }),
    hdr: None,
};

const RSP1B: Capabilities = Capabilities {
    model: Model::Rsp1b,
    rf_gain_reductions: rsp1b_gain_reductions,
    ..RSP1A
};

const RSP2: Capabilities = Capabilities {
    model: Model::Rsp2,
    rf_gain_reductions: rsp2_gain_reductions,
    gain_table_mode: rsp2_gain_table_mode,
    antennas: AntennaKind::Rsp2,
    rf_notch: Some(Toggle {
        field: rsp2_rf_notch,
        change: Change::reason(ReasonForUpdate::RSP2_RF_NOTCH_CONTROL),
    }),
    dab_notch: None,
    am_notch: None,
    bias_t: Some(Toggle {
        field: rsp2_bias_t,
        change: Change::reason(ReasonForUpdate::RSP2_BIAS_T_CONTROL),
    }),
    hdr: None,
};

const RSPDUO: Capabilities = Capabilities {
    model: Model::RspDuo,
    rf_gain_reductions: rspduo_gain_reductions,
    gain_table_mode: rspduo_gain_table_mode,
    antennas: AntennaKind::RspDuo,
    rf_notch: Some(Toggle {
        field: rspduo_rf_notch,
        change: Change::reason(ReasonForUpdate::RSPDUO_RF_NOTCH_CONTROL),
    }),
    dab_notch: Some(Toggle {
        field: rspduo_dab_notch,
        change: Change::reason(ReasonForUpdate::RSPDUO_RF_DAB_NOTCH_CONTROL),
    }),
    am_notch: Some(Toggle {
        field: rspduo_am_notch,
        change: Change::reason(ReasonForUpdate::RSPDUO_TUNER1_AM_NOTCH_CONTROL),
    }),
    bias_t: Some(Toggle {
        field: rspduo_bias_t,
        change: Change::reason(ReasonForUpdate::RSPDUO_BIAS_T_CONTROL),
    }),
    hdr: None,
};

const RSPDX: Capabilities = Capabilities {
    model: Model::RspDx,
    rf_gain_reductions: rspdx_gain_reductions,
    gain_table_mode: rspdx_gain_table_mode,
    antennas: AntennaKind::RspDx,
    rf_notch: Some(Toggle {
        field: rspdx_rf_notch,
        change: Change::ext1(ReasonForUpdateExt1::RSPDX_RF_NOTCH_CONTROL),
    }),
    dab_notch: Some(Toggle {
        field: rspdx_dab_notch,
        change: Change::ext1(ReasonForUpdateExt1::RSPDX_RF_DAB_NOTCH_CONTROL),
    }),
    am_notch: None,
    bias_t: Some(Toggle {
        field: rspdx_bias_t,
        change: Change::ext1(ReasonForUpdateExt1::RSPDX_BIAS_T_CONTROL),
    }),
    hdr: Some(Toggle {
        field: rspdx_hdr,
        change: Change::ext1(ReasonForUpdateExt1::RSPDX_HDR_ENABLE),
    }),
};

const RSPDX_R2: Capabilities = Capabilities {
    model: Model::RspDxR2,
    ..RSPDX
};

/// Index of the step in `gain_reductions` closest to `gain`.
///
/// `gain` is in dB relative to maximum gain, so it's the negative of a gain
/// reduction. The steps are not sorted, so this scans them all. On a tie
/// the first step wins.
pub fn closest_lna_state(gain: f64, gain_reductions: &[i32]) -> u8 {
    let gain_reduction = -gain as i32;
    let mut lna_state = 0;
    let mut min_diff = gain_reduction.abs();
    for (index, step) in gain_reductions.iter().enumerate() {
        let diff = (gain_reduction - step).abs();
        if diff < min_diff {
            lna_state = index;
            min_diff = diff;
        }
    }
    lna_state as u8
}

/// Gain range covered by a gain reduction table.
pub(crate) fn rf_gain_range(gain_reductions: &[i32]) -> Range {
    let max = gain_reductions.iter().max().copied().unwrap_or_default();
    let min = gain_reductions.iter().min().copied().unwrap_or_default();
    Range::new(-f64::from(max), -f64::from(min))
}

/// Snaps a bandwidth in Hz to a tuner bandwidth, allowing a margin of 1 kHz.
pub(crate) fn bandwidth_type(bandwidth: f64) -> BwType {
    let with_margin = bandwidth + 1e3;
    if with_margin < 300e3 {
        BwType::BW_0_200
    }
    else if with_margin < 600e3 {
        BwType::BW_0_300
    }
    else if with_margin < 1536e3 {
        BwType::BW_0_600
    }
    else if with_margin < 5000e3 {
        BwType::BW_1_536
    }
    else if with_margin < 6000e3 {
        BwType::BW_5_000
    }
    else if with_margin < 7000e3 {
        BwType::BW_6_000
    }
    else if with_margin < 8000e3 {
        BwType::BW_7_000
    }
    else {
        BwType::BW_8_000
    }
}

/// The largest tuner bandwidth that doesn't exceed `sample_rate`, or the
/// smallest one if none fits.
pub fn auto_bandwidth(sample_rate: f64) -> BwType {
    let mut largest = BANDWIDTHS[0];
    for bandwidth in BANDWIDTHS {
        if *bandwidth > sample_rate + 1e3 {
            break;
        }
        largest = *bandwidth;
    }
    bandwidth_type(largest)
}

/// ADC clock, decimation and IF mode that produce a sample rate.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct SampleRatePlan {
    pub sample_rate: f64,
    pub fs_hz: f64,
    pub decimation: u8,
    pub if_type: IfType,
}

/// Plan for single tuner operation.
pub(crate) fn sample_rate_plan(rate: f64) -> Option<SampleRatePlan> {
    if !SAMPLE_RATE_RANGE.contains(rate) {
        return None;
    }

    if LOW_IF_SAMPLE_RATES.contains(&rate) {
        let decimation = (2000e3 / rate) as u8;
        return Some(SampleRatePlan {
            sample_rate: 2000e3 / f64::from(decimation),
            fs_hz: 6000e3,
            decimation,
            if_type: IfType::IF_1_620,
        });
    }

    let mut decimation = 1u8;
    while decimation <= 32 {
        let fs_hz = rate * f64::from(decimation);
        if fs_hz > 2000e3 {
            return Some(SampleRatePlan {
                sample_rate: rate,
                fs_hz,
                decimation,
                if_type: IfType::ZERO,
            });
        }
        decimation *= 2;
    }

    None
}

/// Plan for an RSPduo in dual tuner, master or slave mode. These run the
/// ADC at the fixed RSPduo sample frequency in low-IF mode.
pub(crate) fn rspduo_sample_rate_plan(rate: f64, rspduo_sample_freq: f64) -> Option<SampleRatePlan> {
    if !RSPDUO_SAMPLE_RATES.contains(&rate) {
        return None;
    }
    let decimation = (2000e3 / rate) as u8;
    Some(SampleRatePlan {
        sample_rate: 2000e3 / f64::from(decimation),
        fs_hz: rspduo_sample_freq,
        decimation,
        if_type: if rspduo_sample_freq == 8000e3 {
            IfType::IF_2_048
        }
        else {
            IfType::IF_1_620
        },
    })
}

#[cfg(test)]
mod tests {
    use crate::{
        api::{
            BwType,
            DeviceParams,
            HwVersion,
            IfType,
            Rsp2AmPortSelect,
            TunerSelect,
        },
        capabilities::{
            GainTableMode,
            Model,
            auto_bandwidth,
            bandwidth_type,
            closest_lna_state,
            rf_gain_range,
            rspduo_sample_rate_plan,
            sample_rate_plan,
        },
    };

    const RSP1A_HF: &[i32] = &[0, 6, 12, 18, 37, 42, 61];

    #[test]
    fn closest_gain_step_picks_minimum_distance() {
        // gain -20 dB is a reduction of 20 dB: 18 is closer than 12
        let lna_state = closest_lna_state(-20.0, RSP1A_HF);
        assert_eq!(RSP1A_HF[usize::from(lna_state)], 18);
    }

    #[test]
    fn closest_gain_step_tie_goes_to_first_seen() {
        // 15 is 3 dB away from both 12 and 18
        let lna_state = closest_lna_state(-15.0, RSP1A_HF);
        assert_eq!(RSP1A_HF[usize::from(lna_state)], 12);

        // the steps of the RSP2 L-band table aren't sorted
        let table = &[0, 5, 21, 15, 15, 34];
        assert_eq!(closest_lna_state(-16.0, table), 3);
        assert_eq!(closest_lna_state(-18.0, table), 2);
    }

    #[test]
    fn closest_gain_step_of_empty_table_is_zero() {
        assert_eq!(closest_lna_state(-20.0, &[]), 0);
    }

    #[test]
    fn auto_bandwidth_for_2mhz_is_1536khz() {
        assert_eq!(auto_bandwidth(2e6), BwType::BW_1_536);
        assert_eq!(auto_bandwidth(8e6), BwType::BW_8_000);
        assert_eq!(auto_bandwidth(62.5e3), BwType::BW_0_200);
        assert_eq!(auto_bandwidth(299.5e3), BwType::BW_0_300);
    }

    #[test]
    fn bandwidth_is_snapped_with_margin() {
        assert_eq!(bandwidth_type(200e3), BwType::BW_0_200);
        assert_eq!(bandwidth_type(299e3), BwType::BW_0_300);
        assert_eq!(bandwidth_type(1e6), BwType::BW_0_600);
        assert_eq!(bandwidth_type(1536e3), BwType::BW_1_536);
        assert_eq!(bandwidth_type(10e6), BwType::BW_8_000);
    }

    #[test]
    fn gain_table_breakpoints_are_inclusive() {
        let caps = Model::Rsp1a.capabilities();
        let mode = GainTableMode::default();
        assert_eq!(caps.rf_gain_reductions(60e6, mode).len(), 7);
        assert_eq!(caps.rf_gain_reductions(60e6 + 1.0, mode).len(), 10);
        assert_eq!(caps.rf_gain_reductions(420e6, mode).len(), 10);
        assert_eq!(caps.rf_gain_reductions(2000e6, mode).len(), 9);
        assert!(caps.rf_gain_reductions(2000e6 + 1.0, mode).is_empty());
    }

    #[test]
    fn rspdx_hdr_table_only_below_2mhz() {
        let caps = Model::RspDx.capabilities();
        let hdr = GainTableMode {
            hdr: true,
            ..Default::default()
        };
        assert_eq!(caps.rf_gain_reductions(1e6, hdr).len(), 22);
        assert_eq!(caps.rf_gain_reductions(1e6, GainTableMode::default()).len(), 19);
        assert_eq!(caps.rf_gain_reductions(3e6, hdr).len(), 19);
    }

    #[test]
    fn rsp2_high_z_follows_antenna_and_am_port() {
        let caps = Model::Rsp2.capabilities();
        let mut params = DeviceParams::default();
        assert!(!(caps.gain_table_mode)(&params, TunerSelect::A).high_z);
        params.rx_channel_a.rsp2_tuner.am_port_sel = Rsp2AmPortSelect::Port1;
        let mode = (caps.gain_table_mode)(&params, TunerSelect::A);
        assert!(mode.high_z);
        assert_eq!(caps.rf_gain_reductions(10e6, mode), &[0, 6, 12, 18, 37]);
    }

    #[test]
    fn rf_gain_range_is_negated_reductions() {
        let range = rf_gain_range(RSP1A_HF);
        assert_eq!(range.min, -61.0);
        assert_eq!(range.max, 0.0);
    }

    #[test]
    fn low_if_rates_use_6mhz_clock() {
        let plan = sample_rate_plan(250e3).unwrap();
        assert_eq!(plan.fs_hz, 6000e3);
        assert_eq!(plan.decimation, 8);
        assert_eq!(plan.if_type, IfType::IF_1_620);
        assert_eq!(plan.sample_rate, 250e3);
    }

    #[test]
    fn zero_if_rates_decimate_until_clock_exceeds_2mhz() {
        let plan = sample_rate_plan(3e6).unwrap();
        assert_eq!((plan.fs_hz, plan.decimation), (3e6, 1));
        assert_eq!(plan.if_type, IfType::ZERO);

        let plan = sample_rate_plan(1.92e6).unwrap();
        assert_eq!((plan.fs_hz, plan.decimation), (3.84e6, 2));

        let plan = sample_rate_plan(100e3).unwrap();
        assert_eq!((plan.fs_hz, plan.decimation), (3.2e6, 32));

        assert!(sample_rate_plan(50e3).is_none());
        assert!(sample_rate_plan(20e6).is_none());
    }

    #[test]
    fn rspduo_rates_follow_sample_freq() {
        let plan = rspduo_sample_rate_plan(500e3, 8e6).unwrap();
        assert_eq!(plan.fs_hz, 8e6);
        assert_eq!(plan.decimation, 4);
        assert_eq!(plan.if_type, IfType::IF_2_048);
        assert!(rspduo_sample_rate_plan(3e6, 6e6).is_none());
    }

    #[test]
    fn models_map_to_hw_versions() {
        assert_eq!(Model::from_hw_version(HwVersion::RSP1A), Some(Model::Rsp1a));
        assert_eq!(Model::from_hw_version(HwVersion(42)), None);
        for model in Model::ALL {
            assert_eq!(model.capabilities().model, model);
        }
    }
}

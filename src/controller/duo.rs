//! RSPduo modes, antenna switching and independent tuner addressing.

use std::{
    fmt::Display,
    str::FromStr,
};

use crate::{
    Error,
    Range,
    api::{
        DeviceInfo,
        ReasonForUpdate,
        RspDuoMode,
        RspDuoModeChange,
        TunerSelect,
    },
    bridge::RunStatus,
    capabilities::{
        Change,
        RSPDUO_ANTENNAS,
        rspduo_antenna,
    },
    controller::{
        Rsp,
        requested_agc,
    },
};

/// The modes an RSPduo can be opened in.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum RspDuoModeSelect {
    /// one tuner at a time, with all sample rates
    #[default]
    SingleTuner,
    /// both tuners, tuned together
    DualTunerDiversity,
    /// both tuners, each with its own frequency, gain and AGC
    DualTunerIndependentRx,
    /// one tuner, sharing the device with a slave on the other tuner
    Master,
    /// like [`Master`][Self::Master], with an 8 MHz ADC clock
    Master8Mhz,
    /// the other tuner of a device opened in master mode
    Slave,
}

impl RspDuoModeSelect {
    pub const ALL: [Self; 6] = [
        Self::SingleTuner,
        Self::DualTunerDiversity,
        Self::DualTunerIndependentRx,
        Self::Master,
        Self::Master8Mhz,
        Self::Slave,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::SingleTuner => "Single Tuner",
            Self::DualTunerDiversity => "Dual Tuner (diversity reception)",
            Self::DualTunerIndependentRx => "Dual Tuner (independent RX)",
            Self::Master => "Master",
            Self::Master8Mhz => "Master (SR=8Mhz)",
            Self::Slave => "Slave",
        }
    }

    pub fn rspduo_mode(self) -> RspDuoMode {
        match self {
            Self::SingleTuner => RspDuoMode::SINGLE_TUNER,
            Self::DualTunerDiversity | Self::DualTunerIndependentRx => RspDuoMode::DUAL_TUNER,
            Self::Master | Self::Master8Mhz => RspDuoMode::MASTER,
            Self::Slave => RspDuoMode::SLAVE,
        }
    }

    /// ADC clock of the mode, or 0 if the mode keeps the device's.
    pub fn sample_freq(self) -> f64 {
        match self {
            Self::SingleTuner | Self::Slave => 0.0,
            Self::DualTunerDiversity | Self::DualTunerIndependentRx | Self::Master => 6e6,
            Self::Master8Mhz => 8e6,
        }
    }

    pub fn independent_rx(self) -> bool {
        self == Self::DualTunerIndependentRx
    }

    pub fn is_single_tuner(self) -> bool {
        self == Self::SingleTuner
    }

    pub fn is_dual_tuner(self) -> bool {
        self.rspduo_mode() == RspDuoMode::DUAL_TUNER
    }

    pub fn is_master(self) -> bool {
        self.rspduo_mode() == RspDuoMode::MASTER
    }

    /// Mode change assumed until the first mode change event arrives. A
    /// master starts without a slave.
    pub(crate) fn initial_mode_change(self) -> RspDuoModeChange {
        if self.is_master() {
            RspDuoModeChange::SlaveDllDisappeared
        }
        else {
            RspDuoModeChange::SlaveAttached
        }
    }
}

impl FromStr for RspDuoModeSelect {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|mode| mode.name() == s)
            .ok_or_else(|| {
                Error::UnknownRspDuoMode {
                    mode: s.to_owned(),
                }
            })
    }
}

impl Display for RspDuoModeSelect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Checks `mode` and `antenna` against what the device can currently do,
/// and writes them into `device` for selection.
pub(super) fn select(
    device: &mut DeviceInfo,
    mode: RspDuoModeSelect,
    antenna: &str,
) -> Result<(), Error> {
    if !device.rspduo_mode.intersects(mode.rspduo_mode()) {
        tracing::error!(
            mode = mode.name(),
            available = ?device.rspduo_mode,
            "invalid RSPduo mode selection"
        );
        return Err(Error::InvalidRspDuoMode);
    }
    device.rspduo_mode = mode.rspduo_mode();

    if mode.sample_freq() > 0.0 {
        device.rspduo_sample_freq = mode.sample_freq();
    }

    let Some(antenna) = rspduo_antenna(antenna)
        .filter(|antenna| device.tuner.intersects(antenna.tuner))
    else {
        tracing::error!(
            antenna,
            available = ?device.tuner,
            "invalid RSPduo antenna selection"
        );
        return Err(Error::InvalidRspDuoAntenna);
    };
    device.tuner = antenna.tuner;

    Ok(())
}

impl Rsp {
    /// The mode an RSPduo was opened in, or `None` for other models.
    pub fn rspduo_mode(&self) -> Option<RspDuoModeSelect> {
        self.rspduo
    }

    /// Antennas that can be selected in the current mode.
    pub(super) fn rspduo_antennas(&self) -> Vec<&'static str> {
        let Some(mode) = self.rspduo
        else {
            return vec![];
        };
        RSPDUO_ANTENNAS
            .iter()
            .filter(|antenna| {
                if mode.is_single_tuner() || mode.is_master() {
                    matches!(antenna.tuner, TunerSelect::A | TunerSelect::B)
                }
                else {
                    antenna.tuner == self.device.tuner
                }
            })
            .map(|antenna| antenna.name)
            .collect()
    }

    pub(super) fn rspduo_antenna(&self) -> &'static str {
        let am_port_sel = self
            .params
            .rx_channel(self.device.tuner)
            .rspduo_tuner
            .tuner1_am_port_sel;
        RSPDUO_ANTENNAS
            .iter()
            .find(|antenna| antenna.tuner == self.device.tuner && antenna.am_port_sel == am_port_sel)
            .map_or("Unknown", |antenna| antenna.name)
    }

    /// Whether a slave device is attached to this master.
    fn rspduo_slave_attached(&self) -> bool {
        matches!(
            self.bridge.shared.rspduo_mode_change(),
            Some(RspDuoModeChange::SlaveAttached | RspDuoModeChange::SlaveInitialised)
        )
    }

    fn set_active_tuner(&mut self, tuner: TunerSelect) {
        self.device.tuner = tuner;
        self.bridge.shared.set_tuner(tuner);
    }

    /// Switches tuner and AM port of an RSPduo.
    ///
    /// While streaming, a tuner switch swaps the active tuner in single
    /// tuner mode, and restarts the stream in master mode. A master can't
    /// switch tuners while a slave is attached.
    pub(super) fn set_rspduo_antenna(&mut self, name: &str) -> &'static str {
        let Some(antenna) = rspduo_antenna(name)
            .filter(|antenna| self.rspduo_antennas().contains(&antenna.name))
        else {
            tracing::warn!(antenna = name, "invalid antenna");
            return self.rspduo_antenna();
        };
        let Some(mode) = self.rspduo
        else {
            return self.rspduo_antenna();
        };

        let tuner = antenna.tuner;
        let mut am_port_sel = antenna.am_port_sel;
        let current = self
            .params
            .rx_channel(self.device.tuner)
            .rspduo_tuner
            .tuner1_am_port_sel;
        if tuner == self.device.tuner && am_port_sel == current {
            return self.rspduo_antenna();
        }

        if self.run_status() == RunStatus::Idle {
            self.set_active_tuner(tuner);
            self.params
                .rx_channel_mut(tuner)
                .rspduo_tuner
                .tuner1_am_port_sel = am_port_sel;
            return self.rspduo_antenna();
        }

        if tuner != self.device.tuner {
            if mode.is_single_tuner() {
                let result = self.session.api().swap_rspduo_active_tuner(
                    self.device.handle,
                    self.device.tuner,
                    am_port_sel,
                );
                tracing::debug!(?result, "sdrplay_api_SwapRspDuoActiveTuner");
                match result {
                    Ok(tuner) => self.set_active_tuner(tuner),
                    Err(error) => {
                        tracing::error!(%error, "sdrplay_api_SwapRspDuoActiveTuner failed");
                    }
                }
            }
            else if mode.is_master() {
                if self.rspduo_slave_attached() {
                    tracing::warn!("cannot change tuner in master mode while a slave is attached");
                    am_port_sel = current;
                }
                else {
                    self.stop();
                    self.set_active_tuner(tuner);
                    self.params
                        .rx_channel_mut(tuner)
                        .rspduo_tuner
                        .tuner1_am_port_sel = am_port_sel;
                    if let Err(error) = self.start() {
                        tracing::error!(%error, "restart after tuner change failed");
                    }
                }
            }
        }

        let tuner = self.device.tuner;
        let rspduo_tuner = &mut self.params.rx_channel_mut(tuner).rspduo_tuner;
        if rspduo_tuner.tuner1_am_port_sel != am_port_sel {
            rspduo_tuner.tuner1_am_port_sel = am_port_sel;
            self.apply(Change::reason(ReasonForUpdate::RSPDUO_AM_PORT_SELECT), tuner);
        }

        self.rspduo_antenna()
    }

    /// Maps a tuner index to a tuner. Index 1 is tuner B, anything else is
    /// tuner A. Only valid in independent RX mode.
    fn independent_tuner(&self, tuner: usize) -> Option<TunerSelect> {
        if !self.is_independent_rx() {
            tracing::warn!(tuner, "invalid call: device is not in independent RX mode");
            return None;
        }
        if tuner != 1 {
            Some(TunerSelect::A)
        }
        else {
            Some(TunerSelect::B)
        }
    }

    fn is_independent_rx(&self) -> bool {
        self.rspduo.is_some_and(|mode| mode.independent_rx())
    }

    /// Tunes tuner `tuner` (0 or 1) in independent RX mode.
    pub fn set_tuner_center_freq(&mut self, tuner: usize, freq: f64) -> f64 {
        match self.independent_tuner(tuner) {
            Some(tuner) => self.set_center_freq_on(tuner, freq),
            None => 0.0,
        }
    }

    pub fn tuner_center_freq(&self, tuner: usize) -> f64 {
        self.independent_tuner(tuner)
            .map_or(0.0, |tuner| self.params.rx_channel(tuner).tuner.rf_hz)
    }

    pub fn set_tuner_gain(&mut self, tuner: usize, gain: f64, name: &str) -> f64 {
        match self.independent_tuner(tuner) {
            Some(tuner) => self.set_gain_on(tuner, gain, name),
            None => 0.0,
        }
    }

    pub fn tuner_gain(&self, tuner: usize, name: &str) -> f64 {
        self.independent_tuner(tuner)
            .map_or(0.0, |tuner| self.gain_on(tuner, name))
    }

    pub fn tuner_gain_range(&self, tuner: usize, name: &str) -> Range {
        self.independent_tuner(tuner)
            .map_or(Range::new(0.0, 0.0), |tuner| self.gain_range_on(tuner, name))
    }

    pub fn set_tuner_gain_mode(&mut self, tuner: usize, automatic: bool) -> bool {
        match self.independent_tuner(tuner) {
            Some(tuner) => self.set_gain_mode_on(tuner, automatic),
            None => false,
        }
    }

    pub fn tuner_gain_mode(&self, tuner: usize) -> bool {
        self.independent_tuner(tuner)
            .is_some_and(|tuner| self.gain_mode_on(tuner))
    }

    /// Tunes both tuners with one update, in independent RX mode.
    pub fn set_center_freq_both(&mut self, freq_a: f64, freq_b: f64) -> [f64; 2] {
        if !self.is_independent_rx() {
            tracing::warn!("invalid call: device is not in independent RX mode");
            return [0.0; 2];
        }

        let mut change = Change::NONE;
        for (tuner, freq) in [(TunerSelect::A, freq_a), (TunerSelect::B, freq_b)] {
            let params = &mut self.params.rx_channel_mut(tuner).tuner;
            if params.rf_hz != freq {
                params.rf_hz = freq;
                change |= ReasonForUpdate::TUNER_FRF;
            }
        }
        self.apply(change, TunerSelect::Both);

        [
            self.params.rx_channel(TunerSelect::A).tuner.rf_hz,
            self.params.rx_channel(TunerSelect::B).tuner.rf_hz,
        ]
    }

    /// Sets gain `name` of both tuners with one update, in independent RX
    /// mode.
    pub fn set_gain_both(&mut self, gain_a: f64, gain_b: f64, name: &str) -> [f64; 2] {
        if !self.is_independent_rx() {
            tracing::warn!("invalid call: device is not in independent RX mode");
            return [0.0; 2];
        }

        let mut change = Change::NONE;
        for (tuner, gain) in [(TunerSelect::A, gain_a), (TunerSelect::B, gain_b)] {
            let Some(requested) = self.requested_gain(tuner, gain, name)
            else {
                continue;
            };
            let params = &mut self.params.rx_channel_mut(tuner).tuner.gain;
            if *params != requested {
                *params = requested;
                change |= ReasonForUpdate::TUNER_GR;
            }
        }
        self.apply(change, TunerSelect::Both);

        [
            self.gain_on(TunerSelect::A, name),
            self.gain_on(TunerSelect::B, name),
        ]
    }

    /// Enables or disables the AGC of both tuners with one update, in
    /// independent RX mode.
    pub fn set_gain_mode_both(&mut self, automatic_a: bool, automatic_b: bool) -> [bool; 2] {
        if !self.is_independent_rx() {
            tracing::warn!("invalid call: device is not in independent RX mode");
            return [false; 2];
        }

        let mut change = Change::NONE;
        for (tuner, automatic) in [(TunerSelect::A, automatic_a), (TunerSelect::B, automatic_b)] {
            let agc = &mut self.params.rx_channel_mut(tuner).ctrl.agc;
            if let Some(requested) = requested_agc(agc, automatic) {
                *agc = requested;
                change |= ReasonForUpdate::CTRL_AGC;
            }
        }
        self.apply(change, TunerSelect::Both);

        [
            self.gain_mode_on(TunerSelect::A),
            self.gain_mode_on(TunerSelect::B),
        ]
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use num_complex::Complex;

    use crate::{
        Error,
        RspOptions,
        StreamArgs,
        api::{
            DeviceHandle,
            DeviceInfo,
            Event,
            HwVersion,
            ReasonForUpdate,
            RspDuoAmPortSelect,
            RspDuoMode,
            RspDuoModeChange,
            TunerSelect,
            sim::SimulatedApi,
        },
        bridge::RunStatus,
        controller::{
            Rsp,
            RspDuoModeSelect,
            SampleRates,
            duo::select,
            tests::stream,
        },
        session::Session,
    };

    fn all_modes() -> RspDuoMode {
        RspDuoMode::SINGLE_TUNER | RspDuoMode::DUAL_TUNER | RspDuoMode::MASTER
    }

    fn open(
        mode: RspDuoModeSelect,
        antenna: &str,
        channels: usize,
    ) -> (Arc<SimulatedApi>, Rsp) {
        let api = Arc::new(SimulatedApi::new().with_rspduo("D0001", all_modes(), TunerSelect::Both));
        let session = Session::open(api.clone()).unwrap();
        let options = RspOptions {
            stream_args: StreamArgs {
                channels,
                ..Default::default()
            },
            ..Default::default()
        };
        let rsp = Rsp::open_rspduo(session, "", mode, antenna, options).unwrap();
        (api, rsp)
    }

    fn device(rspduo_mode: RspDuoMode, tuner: TunerSelect) -> DeviceInfo {
        DeviceInfo {
            serial: "D0001".to_owned(),
            hw_version: HwVersion::RSPDUO,
            tuner,
            rspduo_mode,
            rspduo_sample_freq: 0.0,
            valid: true,
            handle: DeviceHandle(1),
        }
    }

    #[test]
    fn mode_names_round_trip() {
        for mode in RspDuoModeSelect::ALL {
            assert_eq!(mode.name().parse::<RspDuoModeSelect>().unwrap(), mode);
        }
        assert!(matches!(
            "Master (SR=8MHz)".parse::<RspDuoModeSelect>(),
            Err(Error::UnknownRspDuoMode { .. })
        ));
    }

    #[test]
    fn select_sets_mode_sample_freq_and_tuner() {
        let mut info = device(all_modes(), TunerSelect::Both);
        select(&mut info, RspDuoModeSelect::Master8Mhz, "Tuner 2 50 ohm").unwrap();
        assert_eq!(info.rspduo_mode, RspDuoMode::MASTER);
        assert_eq!(info.rspduo_sample_freq, 8e6);
        assert_eq!(info.tuner, TunerSelect::B);
    }

    #[test]
    fn select_rejects_unavailable_mode_and_antenna() {
        let mut info = device(RspDuoMode::SLAVE, TunerSelect::B);
        assert!(matches!(
            select(&mut info, RspDuoModeSelect::SingleTuner, "Tuner 1 50 ohm"),
            Err(Error::InvalidRspDuoMode)
        ));

        let mut info = device(RspDuoMode::SLAVE, TunerSelect::B);
        assert!(matches!(
            select(&mut info, RspDuoModeSelect::Slave, "Tuner 1 50 ohm"),
            Err(Error::InvalidRspDuoAntenna)
        ));
        assert!(matches!(
            select(&mut info, RspDuoModeSelect::Slave, "Tuner 3"),
            Err(Error::InvalidRspDuoAntenna)
        ));
    }

    #[test]
    fn opened_selection_reaches_the_library() {
        let (api, rsp) = open(RspDuoModeSelect::DualTunerDiversity, "Both Tuners", 2);
        let selection = api.selection(rsp.device().handle).unwrap();
        assert_eq!(selection.rspduo_mode, RspDuoMode::DUAL_TUNER);
        assert_eq!(selection.tuner, TunerSelect::Both);
        assert_eq!(selection.rspduo_sample_freq, 6e6);
        assert_eq!(rsp.io_signature(), (2, 8));
    }

    #[test]
    fn high_z_antenna_selects_am_port_1() {
        let (_api, rsp) = open(RspDuoModeSelect::SingleTuner, "High Z", 1);
        assert_eq!(
            rsp.params().rx_channel_a.rspduo_tuner.tuner1_am_port_sel,
            RspDuoAmPortSelect::Port1
        );
        assert_eq!(rsp.antenna(), "High Z");
    }

    #[test]
    fn antenna_lists_follow_the_mode() {
        let (_api, rsp) = open(RspDuoModeSelect::SingleTuner, "Tuner 1 50 ohm", 1);
        assert_eq!(
            rsp.antennas(),
            ["High Z", "Tuner 1 50 ohm", "Tuner 2 50 ohm"]
        );

        let (_api, rsp) = open(RspDuoModeSelect::DualTunerIndependentRx, "Both Tuners", 2);
        assert_eq!(rsp.antennas(), ["Both Tuners"]);
    }

    #[test]
    fn dual_tuner_modes_use_the_discrete_rate_list() {
        let (_api, mut rsp) = open(RspDuoModeSelect::DualTunerDiversity, "Both Tuners", 2);
        assert!(matches!(rsp.sample_rates(), SampleRates::List(_)));
        assert_eq!(rsp.set_sample_rate(3e6), 0.0);
        assert_eq!(rsp.set_sample_rate(500e3), 500e3);
        assert_eq!(rsp.params().dev.unwrap().fs_hz, 6e6);
        assert_eq!(rsp.params().rx_channel_a.ctrl.decimation.decimation_factor, 4);
    }

    #[test]
    fn work_returns_the_same_count_for_both_streams() {
        let (api, mut rsp) = open(RspDuoModeSelect::DualTunerDiversity, "Both Tuners", 2);
        let handle = rsp.device().handle;
        stream(&mut rsp);

        api.deliver(handle, 0, &[1, 2, 3, 4, 5], &[0; 5]);
        api.deliver(handle, 1, &[6, 7, 8], &[0; 3]);

        let mut a = [Complex::<f32>::default(); 8];
        let mut b = [Complex::<f32>::default(); 8];
        assert_eq!(rsp.work(&mut [&mut a[..], &mut b[..]]), 3);
        assert_eq!(rsp.bridge.ring_buffers[0].counters(), (5, 3));
        assert_eq!(rsp.total_samples(), [3, 3]);
    }

    #[test]
    fn single_output_stream_ignores_the_second_tuner() {
        let (api, mut rsp) = open(RspDuoModeSelect::DualTunerDiversity, "Both Tuners", 1);
        let handle = rsp.device().handle;
        stream(&mut rsp);
        assert!(!rsp.bridge.ring_buffers[1].is_allocated());

        api.deliver(handle, 1, &[6, 7, 8], &[0; 3]);
        api.deliver(handle, 0, &[1], &[0]);
        let mut a = [Complex::<f32>::default(); 8];
        assert_eq!(rsp.work(&mut [&mut a[..]]), 1);
    }

    #[test]
    fn independent_accessors_need_independent_rx_mode() {
        let (api, mut rsp) = open(RspDuoModeSelect::DualTunerDiversity, "Both Tuners", 2);
        stream(&mut rsp);
        assert_eq!(rsp.set_tuner_center_freq(1, 100e6), 0.0);
        assert_eq!(rsp.tuner_gain(0, "IF"), 0.0);
        assert_eq!(rsp.set_center_freq_both(100e6, 101e6), [0.0; 2]);
        assert!(api.updates().is_empty());
    }

    #[test]
    fn independent_tuners_are_addressed_separately() {
        let (api, mut rsp) = open(RspDuoModeSelect::DualTunerIndependentRx, "Both Tuners", 2);
        stream(&mut rsp);

        assert_eq!(rsp.set_tuner_center_freq(1, 433e6), 433e6);
        assert_eq!(rsp.tuner_center_freq(0), 200e6);
        assert_eq!(rsp.set_tuner_gain(0, -30.0, "IF"), -30.0);
        assert_eq!(rsp.tuner_gain(1, "IF"), -50.0);

        let updates = api.updates();
        assert_eq!(updates[0].tuner, TunerSelect::B);
        assert_eq!(updates[0].reason, ReasonForUpdate::TUNER_FRF);
        assert_eq!(updates[1].tuner, TunerSelect::A);
    }

    #[test]
    fn both_setters_push_one_update() {
        let (api, mut rsp) = open(RspDuoModeSelect::DualTunerIndependentRx, "Both Tuners", 2);
        stream(&mut rsp);

        assert_eq!(rsp.set_center_freq_both(100e6, 101e6), [100e6, 101e6]);
        assert_eq!(rsp.set_gain_both(-30.0, -40.0, "IF"), [-30.0, -40.0]);
        assert_eq!(rsp.set_gain_mode_both(true, true), [true, true]);
        assert_eq!(rsp.set_gain_mode_both(true, false), [true, false]);

        let updates = api.updates();
        assert_eq!(updates.len(), 4);
        assert!(updates.iter().all(|update| update.tuner == TunerSelect::Both));
        assert_eq!(updates[2].reason, ReasonForUpdate::CTRL_AGC);
    }

    #[test]
    fn idle_antenna_change_only_updates_the_selection() {
        let (api, mut rsp) = open(RspDuoModeSelect::SingleTuner, "Tuner 1 50 ohm", 1);
        assert_eq!(rsp.set_antenna("Tuner 2 50 ohm"), "Tuner 2 50 ohm");
        assert_eq!(rsp.device().tuner, TunerSelect::B);
        assert!(api.updates().is_empty());

        assert_eq!(rsp.set_antenna("Both Tuners"), "Tuner 2 50 ohm");
    }

    #[test]
    fn single_tuner_mode_swaps_tuners_while_streaming() {
        let (api, mut rsp) = open(RspDuoModeSelect::SingleTuner, "Tuner 1 50 ohm", 1);
        let handle = rsp.device().handle;
        stream(&mut rsp);

        assert_eq!(rsp.set_antenna("Tuner 2 50 ohm"), "Tuner 2 50 ohm");
        assert_eq!(rsp.device().tuner, TunerSelect::B);
        assert_eq!(rsp.bridge.shared.tuner(), TunerSelect::B);
        assert_eq!(api.selection(handle).unwrap().tuner, TunerSelect::B);
        assert!(api.updates().is_empty());

        // back to tuner A, and on to the Hi-Z port
        assert_eq!(rsp.set_antenna("High Z"), "High Z");
        let updates = api.updates();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].reason, ReasonForUpdate::RSPDUO_AM_PORT_SELECT);
        assert_eq!(updates[0].tuner, TunerSelect::A);
    }

    #[test]
    fn master_with_slave_keeps_its_tuner() {
        let (api, mut rsp) = open(RspDuoModeSelect::Master, "Tuner 1 50 ohm", 1);
        let handle = rsp.device().handle;
        stream(&mut rsp);

        api.emit_event(
            handle,
            Event::RspDuoModeChange(RspDuoModeChange::SlaveAttached),
            TunerSelect::A,
        );
        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
        while rsp.bridge.shared.rspduo_mode_change() != Some(RspDuoModeChange::SlaveAttached) {
            assert!(std::time::Instant::now() < deadline, "event wasn't handled");
            std::thread::sleep(std::time::Duration::from_millis(5));
        }

        assert_eq!(rsp.set_antenna("Tuner 2 50 ohm"), "Tuner 1 50 ohm");
        assert_eq!(rsp.device().tuner, TunerSelect::A);
        assert_eq!(rsp.run_status(), RunStatus::Streaming);
    }

    #[test]
    fn master_without_slave_restarts_on_the_new_tuner() {
        let (api, mut rsp) = open(RspDuoModeSelect::Master, "Tuner 1 50 ohm", 1);
        let handle = rsp.device().handle;
        stream(&mut rsp);

        assert_eq!(rsp.set_antenna("Tuner 2 50 ohm"), "Tuner 2 50 ohm");
        assert_eq!(rsp.device().tuner, TunerSelect::B);
        assert_eq!(rsp.run_status(), RunStatus::Initialized);
        assert!(api.is_streaming(handle));
    }
}

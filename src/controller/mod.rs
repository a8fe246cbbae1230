//! The device controller.
//!
//! [`Rsp`] owns a selected device and mirrors its parameters. Setters
//! mutate the mirrored parameters and push the touched groups with
//! [`Update::apply`]. What differs between models is looked up in the
//! model's [`Capabilities`].

mod antenna;
mod duo;

use std::{
    sync::Arc,
    time::Duration,
};

use num_complex::Complex;
use tokio::sync::mpsc;

pub use self::duo::RspDuoModeSelect;
use crate::{
    Error,
    OutputType,
    Range,
    RspOptions,
    Sample,
    Sc16,
    api::{
        Agc,
        AgcControl,
        Callbacks,
        DcOffsetTuner,
        DeviceInfo,
        DeviceParams,
        GainParams,
        ReasonForUpdate,
        RspDuoAmPortSelect,
        TunerSelect,
    },
    bridge::{
        RunStatus,
        Shared,
        StreamBridge,
    },
    capabilities::{
        BANDWIDTHS,
        Capabilities,
        Change,
        FREQUENCY_RANGE,
        GAIN_NAMES,
        IF_GAIN_RANGE,
        Model,
        RSPDUO_SAMPLE_RATES,
        SAMPLE_RATE_RANGE,
        SampleRatePlan,
        Toggle,
        auto_bandwidth,
        bandwidth_type,
        closest_lna_state,
        rf_gain_range,
        rspduo_antenna,
        rspduo_sample_rate_plan,
        sample_rate_plan,
    },
    command::{
        COMMAND_QUEUE_SIZE,
        CommandBatch,
        CommandSender,
    },
    enumerate::{
        Selector,
        rsp_select,
    },
    events::spawn_event_thread,
    session::Session,
    update::{
        Update,
        UpdateOutcome,
    },
};

/// IF bandwidth request.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum Bandwidth {
    /// the largest bandwidth that doesn't exceed the sample rate
    #[default]
    Auto,
    Hz(f64),
}

/// Sample rates a device accepts in its current mode.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SampleRates {
    Range(Range),
    List(&'static [f64]),
}

impl SampleRates {
    pub fn contains(&self, rate: f64) -> bool {
        match self {
            Self::Range(range) => range.contains(rate),
            Self::List(rates) => rates.contains(&rate),
        }
    }
}

/// An open SDRplay RSP device.
///
/// The device is selected while this exists and released on drop. Call
/// [`start`][Self::start] to register the stream callbacks, then
/// [`work`][Self::work] repeatedly to pull samples.
///
/// Setters can be called at any time. They always update the parameters
/// that [`start`][Self::start] hands to the library, and while streaming
/// they push the change to the hardware. Invalid arguments are logged, and
/// the setter returns the unchanged current value.
#[derive(derive_more::Debug)]
pub struct Rsp {
    session: Arc<Session>,
    device: DeviceInfo,
    capabilities: &'static Capabilities,
    params: DeviceParams,

    /// 0 until a sample rate is set
    sample_rate: f64,

    options: RspOptions,

    /// number of streams delivered by the hardware
    nchannels: usize,

    /// number of streams handed out by `work`
    streams: usize,

    /// `None` if this isn't an RSPduo
    rspduo: Option<RspDuoModeSelect>,

    bridge: Arc<StreamBridge>,

    #[debug(skip)]
    pub(crate) commands: mpsc::Receiver<CommandBatch>,
    command_sender: CommandSender,

    /// samples handed out by `work`, per stream
    total_samples: [u64; 2],
}

impl Rsp {
    /// Opens a device of the given model.
    ///
    /// An RSPduo is opened in single tuner mode on tuner 1. Use
    /// [`open_rspduo`][Self::open_rspduo] to pick another mode.
    pub fn open(
        session: Arc<Session>,
        model: Model,
        selector: &str,
        options: RspOptions,
    ) -> Result<Self, Error> {
        if model == Model::RspDuo {
            return Self::open_rspduo(
                session,
                selector,
                RspDuoModeSelect::default(),
                "Tuner 1 50 ohm",
                options,
            );
        }
        Self::open_impl(session, model, selector, None, options)
    }

    /// Opens an RSPduo in `mode`, using `antenna` initially.
    pub fn open_rspduo(
        session: Arc<Session>,
        selector: &str,
        mode: RspDuoModeSelect,
        antenna: &str,
        options: RspOptions,
    ) -> Result<Self, Error> {
        Self::open_impl(session, Model::RspDuo, selector, Some((mode, antenna)), options)
    }

    fn open_impl(
        session: Arc<Session>,
        model: Model,
        selector: &str,
        rspduo: Option<(RspDuoModeSelect, &str)>,
        mut options: RspOptions,
    ) -> Result<Self, Error> {
        let selector: Selector = selector.parse()?;

        if !options.ring_buffer_size.is_power_of_two() {
            let ring_buffer_size = options.ring_buffer_size.next_power_of_two();
            tracing::warn!(
                requested = options.ring_buffer_size,
                ring_buffer_size,
                "ring buffer size must be a power of two"
            );
            options.ring_buffer_size = ring_buffer_size;
        }

        let api = session.api().clone();

        let device = {
            let _lock = session.lock_device_api();

            let mut device = rsp_select(&session, model.hw_version(), &selector)?;
            if let Some((mode, antenna)) = rspduo {
                duo::select(&mut device, mode, antenna)?;
            }

            let result = api.select_device(&device);
            tracing::debug!(?result, serial = device.serial, "sdrplay_api_SelectDevice");
            if let Err(error) = result {
                tracing::error!(%error, serial = device.serial, "sdrplay_api_SelectDevice failed");
                return Err(Error::from_api("sdrplay_api_SelectDevice", error));
            }

            device
        };

        let result = api.get_device_params(device.handle);
        tracing::debug!(ok = result.is_ok(), "sdrplay_api_GetDeviceParams");
        let mut params = match result {
            Ok(params) => params,
            Err(error) => {
                tracing::error!(%error, "sdrplay_api_GetDeviceParams failed");
                release_device(&session, &device);
                return Err(Error::from_api("sdrplay_api_GetDeviceParams", error));
            }
        };

        let rspduo = rspduo.map(|(mode, antenna)| {
            // the antenna was validated by `duo::select`
            if rspduo_antenna(antenna)
                .is_some_and(|antenna| antenna.am_port_sel == RspDuoAmPortSelect::Port1)
            {
                params
                    .rx_channel_mut(device.tuner)
                    .rspduo_tuner
                    .tuner1_am_port_sel = RspDuoAmPortSelect::Port1;
            }
            mode
        });

        let nchannels = if rspduo.is_some_and(|mode| mode.is_dual_tuner()) {
            2
        }
        else {
            1
        };
        let mut streams = options.stream_args.channels;
        if streams == 0 || streams > nchannels {
            tracing::warn!(
                channels = streams,
                nchannels,
                "invalid number of output channels"
            );
            streams = streams.clamp(1, nchannels);
        }

        let shared = Arc::new(Shared::new(api, device.handle, device.tuner));
        if let Some(mode) = rspduo {
            shared.set_rspduo_mode_change(mode.initial_mode_change());
        }
        let events = spawn_event_thread(shared.clone());
        let bridge = Arc::new(StreamBridge::new(
            shared,
            options.ring_buffer_size,
            events,
        ));

        let (sender, commands) = mpsc::channel(COMMAND_QUEUE_SIZE);

        tracing::info!(
            model = model.name(),
            serial = device.serial,
            ?rspduo,
            "sdrplay device opened"
        );

        Ok(Self {
            session,
            device,
            capabilities: model.capabilities(),
            params,
            sample_rate: 0.0,
            options,
            nchannels,
            streams,
            rspduo,
            bridge,
            commands,
            command_sender: CommandSender::new(sender),
            total_samples: [0; 2],
        })
    }

    pub fn model(&self) -> Model {
        self.capabilities.model
    }

    pub fn capabilities(&self) -> &'static Capabilities {
        self.capabilities
    }

    pub fn device(&self) -> &DeviceInfo {
        &self.device
    }

    /// The mirrored device parameters.
    pub fn params(&self) -> &DeviceParams {
        &self.params
    }

    pub fn run_status(&self) -> RunStatus {
        self.bridge.shared.run_status.load()
    }

    /// A handle to send commands to this device, see [`CommandSender`].
    pub fn command_sender(&self) -> CommandSender {
        self.command_sender.clone()
    }

    /// Number of output streams and the size of one sample in bytes.
    pub fn io_signature(&self) -> (usize, usize) {
        (self.streams, self.options.stream_args.output_type.item_size())
    }

    pub fn output_type(&self) -> OutputType {
        self.options.stream_args.output_type
    }

    /// Samples handed out by [`work`][Self::work] so far, per stream.
    pub fn total_samples(&self) -> [u64; 2] {
        self.total_samples
    }

    /// Allocates the ring buffers and registers the callbacks with the
    /// library.
    pub fn start(&mut self) -> Result<(), Error> {
        if self.run_status() != RunStatus::Idle {
            tracing::warn!("device already started");
            return Ok(());
        }

        for ring_buffer in &self.bridge.ring_buffers[..self.streams] {
            if let Err(error) = ring_buffer.allocate() {
                self.release_ring_buffers();
                return Err(error);
            }
        }
        self.bridge.reset_streams();
        self.bridge.shared.set_tuner(self.device.tuner);

        let callbacks: Arc<dyn Callbacks> = self.bridge.clone();
        let result = self
            .session
            .api()
            .init(self.device.handle, &self.params, callbacks);
        tracing::debug!(?result, "sdrplay_api_Init");
        if let Err(error) = result {
            tracing::error!(%error, "sdrplay_api_Init failed");
            self.release_ring_buffers();
            return Err(Error::from_api("sdrplay_api_Init", error));
        }

        self.bridge.shared.set_hardware_params(&self.params);
        self.bridge.shared.run_status.store(RunStatus::Initialized);
        Ok(())
    }

    /// Unregisters the callbacks and releases the ring buffers.
    ///
    /// A stream callback blocked on a full ring buffer returns, and its
    /// samples are dropped.
    pub fn stop(&mut self) {
        let run_status = self.bridge.shared.run_status.swap(RunStatus::Idle);
        self.release_ring_buffers();

        if run_status >= RunStatus::Initialized {
            let result = self.session.api().uninit(self.device.handle);
            tracing::debug!(?result, "sdrplay_api_Uninit");
            if let Err(error) = result {
                tracing::error!(%error, "sdrplay_api_Uninit failed");
            }
        }
    }

    fn release_ring_buffers(&self) {
        for ring_buffer in &self.bridge.ring_buffers {
            ring_buffer.release();
        }
    }

    /// Pulls samples into `outputs`, one slice per stream.
    ///
    /// Blocks until samples are available, then returns how many samples
    /// were written to each output. The same number is written to every
    /// output. Returns 0 if the device isn't started, or if `S` isn't the
    /// configured output type.
    ///
    /// Pending commands are handled first.
    pub fn work<S: Sample>(&mut self, outputs: &mut [&mut [S]]) -> usize {
        self.process_commands();

        if S::OUTPUT_TYPE != self.options.stream_args.output_type {
            let error = Error::WrongSampleType {
                requested: S::OUTPUT_TYPE,
                configured: self.options.stream_args.output_type,
            };
            tracing::error!(%error);
            return 0;
        }

        let run_status = self.run_status();
        if run_status < RunStatus::Initialized {
            return 0;
        }
        if run_status == RunStatus::Initialized {
            self.bridge
                .shared
                .run_status
                .transition(RunStatus::Initialized, RunStatus::Streaming);
        }

        let streams = outputs.len().min(self.streams);
        if streams == 0 {
            return 0;
        }

        // the streams are produced in ascending order. reading the highest
        // one first makes sure the lower ones have at least as many samples.
        let mut produced = usize::MAX;
        for stream in (0..streams).rev() {
            let output = &mut outputs[stream];
            let max = output.len().min(produced);
            produced = self.bridge.ring_buffers[stream].read(&mut output[..max]);
        }

        for total in &mut self.total_samples[..streams] {
            *total += produced as u64;
        }
        produced
    }

    /// Like [`work`][Self::work], but with untyped output buffers.
    ///
    /// The buffers are cast to the configured output type, so they must be
    /// aligned to it and hold a whole number of samples.
    pub fn work_raw(&mut self, outputs: &mut [&mut [u8]]) -> usize {
        match self.options.stream_args.output_type {
            OutputType::Fc32 => self.work_bytes::<Complex<f32>>(outputs),
            OutputType::Sc16 => self.work_bytes::<Sc16>(outputs),
        }
    }

    fn work_bytes<S: Sample>(&mut self, outputs: &mut [&mut [u8]]) -> usize {
        let mut typed: [&mut [S]; 2] = Default::default();
        let count = outputs.len().min(typed.len());
        for (slot, output) in typed.iter_mut().zip(outputs.iter_mut()) {
            match bytemuck::try_cast_slice_mut::<u8, S>(output) {
                Ok(samples) => *slot = samples,
                Err(error) => {
                    tracing::error!(?error, "invalid output buffer");
                    return 0;
                }
            }
        }
        self.work(&mut typed[..count])
    }

    /// The tuner the control surface addresses.
    fn tuner(&self) -> TunerSelect {
        self.device.tuner
    }

    fn is_rspduo_single_tuner(&self) -> bool {
        self.rspduo.is_none_or(|mode| mode.is_single_tuner())
    }

    /// Pushes `change` to the hardware if streaming.
    fn apply(&self, change: Change, tuner: TunerSelect) -> UpdateOutcome {
        let update = Update {
            api: self.session.api().as_ref(),
            handle: self.device.handle,
            params: &self.params,
            run_status: self.run_status(),
            acknowledgements: &self.bridge.acknowledgements,
            timeout: self
                .options
                .synchronous_updates
                .then_some(self.options.update_timeout),
        };
        let outcome = update.apply(change, tuner);

        if matches!(
            outcome,
            UpdateOutcome::Sent | UpdateOutcome::Acknowledged | UpdateOutcome::TimedOut
        ) {
            self.bridge.shared.set_hardware_params(&self.params);
        }
        outcome
    }

    /// Whether setters wait for the hardware to acknowledge sample rate,
    /// frequency and gain changes.
    pub fn set_synchronous_updates(&mut self, synchronous: bool) {
        self.options.synchronous_updates = synchronous;
    }

    pub fn set_update_timeout(&mut self, timeout: Duration) {
        self.options.update_timeout = timeout;
    }

    // sample rate

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn sample_rates(&self) -> SampleRates {
        if self.is_rspduo_single_tuner() {
            SampleRates::Range(SAMPLE_RATE_RANGE)
        }
        else {
            SampleRates::List(RSPDUO_SAMPLE_RATES)
        }
    }

    pub fn set_sample_rate(&mut self, rate: f64) -> f64 {
        let plan = if self.is_rspduo_single_tuner() {
            sample_rate_plan(rate)
        }
        else {
            rspduo_sample_rate_plan(rate, self.device.rspduo_sample_freq)
        };
        let Some(plan) = plan
        else {
            tracing::warn!(rate, "invalid sample rate");
            return self.sample_rate;
        };
        if rate == self.sample_rate {
            return self.sample_rate;
        }

        self.sample_rate = plan.sample_rate;
        self.update_sample_rate_and_decimation(&plan);
        self.sample_rate
    }

    fn update_sample_rate_and_decimation(&mut self, plan: &SampleRatePlan) {
        let tuner = self.tuner();
        let mut change = Change::NONE;

        if let Some(dev) = &mut self.params.dev {
            if dev.fs_hz != plan.fs_hz {
                dev.fs_hz = plan.fs_hz;
                change |= ReasonForUpdate::DEV_FS;
            }
        }

        let bw_type = auto_bandwidth(self.sample_rate);
        let channel = self.params.rx_channel_mut(tuner);

        let decimation = &mut channel.ctrl.decimation;
        let enable = plan.decimation > 1;
        if decimation.enable != enable || decimation.decimation_factor != plan.decimation {
            decimation.enable = enable;
            decimation.decimation_factor = plan.decimation;
            change |= ReasonForUpdate::CTRL_DECIMATION;
        }

        if channel.tuner.if_type != plan.if_type {
            channel.tuner.if_type = plan.if_type;
            change |= ReasonForUpdate::TUNER_IF_TYPE;
        }

        if channel.tuner.bw_type != bw_type {
            channel.tuner.bw_type = bw_type;
            change |= ReasonForUpdate::TUNER_BW_TYPE;
        }

        self.apply(change, tuner);
    }

    // center frequency

    pub fn center_freq(&self) -> f64 {
        self.params.rx_channel(self.tuner()).tuner.rf_hz
    }

    pub fn set_center_freq(&mut self, freq: f64) -> f64 {
        self.set_center_freq_on(self.tuner(), freq)
    }

    fn set_center_freq_on(&mut self, tuner: TunerSelect, freq: f64) -> f64 {
        let channel = self.params.rx_channel_mut(tuner);
        if channel.tuner.rf_hz != freq {
            channel.tuner.rf_hz = freq;
            self.apply(Change::reason(ReasonForUpdate::TUNER_FRF), tuner);
        }
        self.params.rx_channel(tuner).tuner.rf_hz
    }

    pub fn freq_range(&self) -> Range {
        FREQUENCY_RANGE
    }

    // bandwidth

    /// IF bandwidth in Hz.
    pub fn bandwidth(&self) -> f64 {
        self.params.rx_channel(self.tuner()).tuner.bw_type.hz()
    }

    pub fn bandwidths(&self) -> &'static [f64] {
        BANDWIDTHS
    }

    pub fn set_bandwidth(&mut self, bandwidth: Bandwidth) -> f64 {
        let bw_type = match bandwidth {
            Bandwidth::Auto => auto_bandwidth(self.sample_rate),
            Bandwidth::Hz(bandwidth) => {
                if bandwidth > self.sample_rate {
                    tracing::warn!(
                        bandwidth,
                        sample_rate = self.sample_rate,
                        "invalid bandwidth: larger than the sample rate"
                    );
                    return self.bandwidth();
                }
                bandwidth_type(bandwidth)
            }
        };

        let tuner = self.tuner();
        let channel = self.params.rx_channel_mut(tuner);
        if channel.tuner.bw_type != bw_type {
            channel.tuner.bw_type = bw_type;
            self.apply(Change::reason(ReasonForUpdate::TUNER_BW_TYPE), tuner);
        }
        self.bandwidth()
    }

    // gains

    pub fn gain_names(&self) -> &'static [&'static str] {
        GAIN_NAMES
    }

    /// Sets the gain `name` in dB. `LNAstate` takes the raw step index.
    pub fn set_gain(&mut self, gain: f64, name: &str) -> f64 {
        self.set_gain_on(self.tuner(), gain, name)
    }

    pub fn gain(&self, name: &str) -> f64 {
        self.gain_on(self.tuner(), name)
    }

    pub fn gain_range(&self, name: &str) -> Range {
        self.gain_range_on(self.tuner(), name)
    }

    fn set_gain_on(&mut self, tuner: TunerSelect, gain: f64, name: &str) -> f64 {
        if !GAIN_NAMES.contains(&name) {
            tracing::error!(name, "invalid gain name");
            return 0.0;
        }

        if let Some(requested) = self.requested_gain(tuner, gain, name) {
            let params = &mut self.params.rx_channel_mut(tuner).tuner.gain;
            if *params != requested {
                *params = requested;
                self.apply(Change::reason(ReasonForUpdate::TUNER_GR), tuner);
            }
        }
        self.gain_on(tuner, name)
    }

    /// The gain parameters of `tuner` with gain `name` set to `gain`, or
    /// `None` if `gain` can't be set.
    fn requested_gain(&self, tuner: TunerSelect, gain: f64, name: &str) -> Option<GainParams> {
        let mut params = self.params.rx_channel(tuner).tuner.gain;
        match name {
            "IF" => {
                if !IF_GAIN_RANGE.contains(gain) {
                    tracing::warn!(gain, range = ?IF_GAIN_RANGE, "IF gain out of range");
                    return None;
                }
                params.gr_db = (-gain) as u32;
            }
            "RF" => {
                let gain_reductions = self.gain_reductions(tuner);
                if gain_reductions.is_empty() {
                    tracing::warn!(
                        freq = self.params.rx_channel(tuner).tuner.rf_hz,
                        "no RF gain steps at this frequency"
                    );
                    return None;
                }
                params.lna_state = closest_lna_state(gain, gain_reductions);
            }
            "LNAstate" => {
                let steps = self.gain_reductions(tuner).len();
                if gain < 0.0 || gain >= steps as f64 {
                    tracing::warn!(lna_state = gain, steps, "invalid LNA state");
                    return None;
                }
                params.lna_state = gain as u8;
            }
            _ => return None,
        }
        Some(params)
    }

    fn gain_on(&self, tuner: TunerSelect, name: &str) -> f64 {
        let gain = &self.params.rx_channel(tuner).tuner.gain;
        match name {
            "IF" => -f64::from(gain.gr_db),
            "RF" => self.rf_gain(tuner),
            "LNAstate" => f64::from(gain.lna_state),
            _ => {
                tracing::error!(name, "invalid gain name");
                0.0
            }
        }
    }

    fn gain_range_on(&self, tuner: TunerSelect, name: &str) -> Range {
        match name {
            "IF" => IF_GAIN_RANGE,
            "RF" => rf_gain_range(self.gain_reductions(tuner)),
            "LNAstate" => {
                let steps = self.gain_reductions(tuner).len();
                Range::new(0.0, steps.saturating_sub(1) as f64)
            }
            _ => {
                tracing::error!(name, "invalid gain name");
                Range::new(0.0, 0.0)
            }
        }
    }

    /// RF gain reduction table for the current frequency and mode.
    fn gain_reductions(&self, tuner: TunerSelect) -> &'static [i32] {
        let mode = (self.capabilities.gain_table_mode)(&self.params, tuner);
        let freq = self.params.rx_channel(tuner).tuner.rf_hz;
        self.capabilities.rf_gain_reductions(freq, mode)
    }

    fn rf_gain(&self, tuner: TunerSelect) -> f64 {
        let lna_state = self.params.rx_channel(tuner).tuner.gain.lna_state;
        match self.gain_reductions(tuner).get(usize::from(lna_state)) {
            Some(gain_reduction) => -f64::from(*gain_reduction),
            None => {
                tracing::warn!(lna_state, "LNA state outside of the RF gain table");
                0.0
            }
        }
    }

    // AGC

    /// Enables or disables the AGC. Returns whether it is enabled.
    pub fn set_gain_mode(&mut self, automatic: bool) -> bool {
        self.set_gain_mode_on(self.tuner(), automatic)
    }

    pub fn gain_mode(&self) -> bool {
        self.gain_mode_on(self.tuner())
    }

    fn set_gain_mode_on(&mut self, tuner: TunerSelect, automatic: bool) -> bool {
        let agc = &mut self.params.rx_channel_mut(tuner).ctrl.agc;
        if let Some(requested) = requested_agc(agc, automatic) {
            *agc = requested;
            self.apply(Change::reason(ReasonForUpdate::CTRL_AGC), tuner);
        }
        self.gain_mode_on(tuner)
    }

    fn gain_mode_on(&self, tuner: TunerSelect) -> bool {
        self.params.rx_channel(tuner).ctrl.agc.enable != AgcControl::Disable
    }

    /// AGC setpoint in dBFS.
    pub fn agc_setpoint(&self) -> f64 {
        f64::from(self.params.rx_channel(self.tuner()).ctrl.agc.set_point_dbfs)
    }

    pub fn set_agc_setpoint(&mut self, setpoint: f64) -> f64 {
        let tuner = self.tuner();
        let set_point_dbfs = setpoint as i32;
        let agc = &mut self.params.rx_channel_mut(tuner).ctrl.agc;
        if agc.set_point_dbfs != set_point_dbfs {
            agc.set_point_dbfs = set_point_dbfs;
            self.apply(Change::reason(ReasonForUpdate::CTRL_AGC), tuner);
        }
        self.agc_setpoint()
    }

    // frequency correction

    /// Frequency correction in ppm. 0 on an RSPduo slave.
    pub fn freq_corr(&self) -> f64 {
        self.params.dev.map_or(0.0, |dev| dev.ppm)
    }

    pub fn set_freq_corr(&mut self, ppm: f64) -> f64 {
        let tuner = self.tuner();
        let Some(dev) = &mut self.params.dev
        else {
            tracing::warn!("frequency correction isn't available on an RSPduo slave");
            return self.freq_corr();
        };
        if dev.ppm != ppm {
            dev.ppm = ppm;
            self.apply(Change::reason(ReasonForUpdate::DEV_PPM), tuner);
        }
        self.freq_corr()
    }

    // DC offset and IQ imbalance correction

    pub fn dc_offset_mode(&self) -> bool {
        self.params.rx_channel(self.tuner()).ctrl.dc_offset.dc_enable
    }

    pub fn set_dc_offset_mode(&mut self, automatic: bool) -> bool {
        let tuner = self.tuner();
        let channel = self.params.rx_channel_mut(tuner);
        if channel.ctrl.dc_offset.dc_enable != automatic {
            channel.ctrl.dc_offset.dc_enable = automatic;
            channel.tuner.dc_offset_tuner = DcOffsetTuner {
                dc_cal: 4,
                speed_up: 0,
                track_time: 63,
            };
            self.apply(
                Change::reason(ReasonForUpdate::CTRL_DC_OFFSET_IQ_IMBALANCE),
                tuner,
            );
        }
        self.dc_offset_mode()
    }

    pub fn iq_balance_mode(&self) -> bool {
        self.params.rx_channel(self.tuner()).ctrl.dc_offset.iq_enable
    }

    /// Enables or disables IQ imbalance correction. This needs DC offset
    /// correction, which is enabled along with it.
    pub fn set_iq_balance_mode(&mut self, automatic: bool) -> bool {
        let tuner = self.tuner();
        let dc_offset = &mut self.params.rx_channel_mut(tuner).ctrl.dc_offset;
        if dc_offset.iq_enable != automatic {
            dc_offset.dc_enable = true;
            dc_offset.iq_enable = automatic;
            self.apply(
                Change::reason(ReasonForUpdate::CTRL_DC_OFFSET_IQ_IMBALANCE),
                tuner,
            );
        }
        self.iq_balance_mode()
    }

    // model specific toggles

    pub fn rf_notch_filter(&self) -> bool {
        self.toggle(self.capabilities.rf_notch)
    }

    pub fn set_rf_notch_filter(&mut self, enable: bool) -> bool {
        self.set_toggle(self.capabilities.rf_notch, "RF notch filter", enable)
    }

    pub fn dab_notch_filter(&self) -> bool {
        self.toggle(self.capabilities.dab_notch)
    }

    pub fn set_dab_notch_filter(&mut self, enable: bool) -> bool {
        self.set_toggle(self.capabilities.dab_notch, "DAB notch filter", enable)
    }

    pub fn am_notch_filter(&self) -> bool {
        self.toggle(self.capabilities.am_notch)
    }

    pub fn set_am_notch_filter(&mut self, enable: bool) -> bool {
        self.set_toggle(self.capabilities.am_notch, "AM notch filter", enable)
    }

    pub fn bias_t(&self) -> bool {
        self.toggle(self.capabilities.bias_t)
    }

    pub fn set_bias_t(&mut self, enable: bool) -> bool {
        self.set_toggle(self.capabilities.bias_t, "bias-T", enable)
    }

    pub fn hdr_mode(&self) -> bool {
        self.toggle(self.capabilities.hdr)
    }

    pub fn set_hdr_mode(&mut self, enable: bool) -> bool {
        self.set_toggle(self.capabilities.hdr, "HDR mode", enable)
    }

    fn toggle(&self, toggle: Option<Toggle>) -> bool {
        toggle
            .and_then(|toggle| toggle.get(&self.params, self.tuner()))
            .unwrap_or_default()
    }

    fn set_toggle(&mut self, toggle: Option<Toggle>, name: &'static str, enable: bool) -> bool {
        let Some(toggle) = toggle
        else {
            tracing::warn!(model = self.capabilities.model.name(), "{name} not supported");
            return false;
        };

        let tuner = self.tuner();
        let Some(flag) = (toggle.field)(&mut self.params, tuner)
        else {
            tracing::warn!("{name} isn't available on an RSPduo slave");
            return false;
        };
        if *flag != enable {
            *flag = enable;
            self.apply(toggle.change, tuner);
        }
        enable
    }

    // diagnostics

    /// Enables verbose debug output of the library.
    pub fn set_debug_mode(&mut self, enable: bool) {
        let result = self.session.api().debug_enable(self.device.handle, enable);
        tracing::debug!(?result, enable, "sdrplay_api_DebugEnable");
        if let Err(error) = result {
            tracing::error!(%error, "sdrplay_api_DebugEnable failed");
        }
    }

    /// Checks the sample numbers of consecutive bursts, and warns about
    /// gaps.
    pub fn set_sample_sequence_gaps_check(&mut self, enable: bool) {
        self.bridge.set_check_gaps(enable);
    }

    /// Number of sample sequence gaps detected on `stream`.
    pub fn sample_sequence_gaps(&self, stream: usize) -> u64 {
        self.bridge.gaps(stream.min(1))
    }

    /// Logs gain change events.
    pub fn set_show_gain_changes(&mut self, enable: bool) {
        self.bridge
            .shared
            .show_gain_changes
            .store(enable, std::sync::atomic::Ordering::Relaxed);
    }

    /// Logs the mirrored device parameters at debug level.
    pub fn log_device_config(&self) {
        tracing::debug!(
            serial = self.device.serial,
            hw_version = ?self.device.hw_version,
            tuner = ?self.device.tuner,
            rspduo_mode = ?self.device.rspduo_mode,
            rspduo_sample_freq = self.device.rspduo_sample_freq,
            nchannels = self.nchannels,
            streams = self.streams,
            "device"
        );
        tracing::debug!(dev = ?self.params.dev, "device parameters");
        tracing::debug!(params = ?self.params.rx_channel_a, "rx channel A");
        if let Some(rx_channel_b) = &self.params.rx_channel_b {
            tracing::debug!(params = ?rx_channel_b, "rx channel B");
        }
    }
}

impl Drop for Rsp {
    fn drop(&mut self) {
        if self.run_status() >= RunStatus::Initialized {
            self.stop();
        }
        release_device(&self.session, &self.device);
        tracing::info!(
            serial = self.device.serial,
            total_samples = ?self.total_samples,
            "sdrplay device closed"
        );
    }
}

/// AGC parameters for switching the AGC on or off, or `None` if it already
/// is.
fn requested_agc(agc: &Agc, automatic: bool) -> Option<Agc> {
    let enable = if automatic {
        AgcControl::ControlEnable
    }
    else {
        AgcControl::Disable
    };
    (agc.enable != enable).then_some(Agc {
        enable,
        set_point_dbfs: -30,
        attack_ms: 0,
        decay_ms: 0,
        decay_delay_ms: 0,
        decay_threshold_db: 0,
        sync_update: 0,
    })
}

fn release_device(session: &Session, device: &DeviceInfo) {
    let _lock = session.lock_device_api();
    let result = session.api().release_device(device);
    tracing::debug!(?result, serial = device.serial, "sdrplay_api_ReleaseDevice");
    if let Err(error) = result {
        tracing::error!(%error, "sdrplay_api_ReleaseDevice failed");
    }
}

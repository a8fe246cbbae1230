//! An in-process stand-in for the SDRplay API library.
//!
//! [`SimulatedApi`] keeps a list of devices, tracks selection and streaming
//! state, and records every [`Api::update`] call. Samples and events are
//! injected by the caller with [`SimulatedApi::deliver`] and
//! [`SimulatedApi::emit_event`], which invoke the registered callbacks on
//! the calling thread, just like the library does on its own threads.

use std::{
    collections::HashMap,
    sync::Arc,
};

use parking_lot::Mutex;

use crate::api::{
    API_VERSION,
    Api,
    ApiError,
    Callbacks,
    DevParams,
    DeviceHandle,
    DeviceInfo,
    DeviceParams,
    Event,
    HwVersion,
    ReasonForUpdate,
    ReasonForUpdateExt1,
    RspDuoAmPortSelect,
    RspDuoMode,
    RxChannelParams,
    StreamCbParams,
    TunerSelect,
};

/// An update pushed to the simulated hardware.
#[derive(Clone, Debug, PartialEq)]
pub struct UpdateCall {
    pub handle: DeviceHandle,
    pub tuner: TunerSelect,
    pub reason: ReasonForUpdate,
    pub reason_ext1: ReasonForUpdateExt1,
    pub params: DeviceParams,
}

#[derive(derive_more::Debug)]
struct State {
    open: bool,
    version: f32,
    devices: Vec<DeviceInfo>,
    /// selected devices, as passed to `select_device`
    selected: HashMap<DeviceHandle, DeviceInfo>,
    #[debug(skip)]
    streaming: HashMap<DeviceHandle, Arc<dyn Callbacks>>,
    updates: Vec<UpdateCall>,
    acknowledge_updates: bool,
    fail_init: bool,
    debug: HashMap<DeviceHandle, bool>,
    stream_counters: HashMap<(DeviceHandle, usize), u32>,
}

#[derive(Debug)]
pub struct SimulatedApi {
    state: Mutex<State>,
}

impl Default for SimulatedApi {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedApi {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                open: false,
                version: API_VERSION,
                devices: vec![],
                selected: HashMap::new(),
                streaming: HashMap::new(),
                updates: vec![],
                acknowledge_updates: true,
                fail_init: false,
                debug: HashMap::new(),
                stream_counters: HashMap::new(),
            }),
        }
    }

    /// Adds a single tuner device.
    pub fn with_device(self, hw_version: HwVersion, serial: &str) -> Self {
        self.push_device(hw_version, serial, TunerSelect::A, RspDuoMode::empty(), 0.0);
        self
    }

    /// Adds an RSPduo that can currently be opened in `modes`.
    pub fn with_rspduo(self, serial: &str, modes: RspDuoMode, tuner: TunerSelect) -> Self {
        self.push_device(HwVersion::RSPDUO, serial, tuner, modes, 0.0);
        self
    }

    fn push_device(
        &self,
        hw_version: HwVersion,
        serial: &str,
        tuner: TunerSelect,
        rspduo_mode: RspDuoMode,
        rspduo_sample_freq: f64,
    ) {
        let mut state = self.state.lock();
        let handle = DeviceHandle(state.devices.len() + 1);
        state.devices.push(DeviceInfo {
            serial: serial.to_owned(),
            hw_version,
            tuner,
            rspduo_mode,
            rspduo_sample_freq,
            valid: true,
            handle,
        });
    }

    /// The version `api_version` reports.
    pub fn set_version(&self, version: f32) {
        self.state.lock().version = version;
    }

    /// Whether updates touching sample rate, frequency or gain are
    /// acknowledged through the stream callback right away. Enabled by
    /// default.
    pub fn set_acknowledge_updates(&self, acknowledge: bool) {
        self.state.lock().acknowledge_updates = acknowledge;
    }

    pub fn set_fail_init(&self, fail: bool) {
        self.state.lock().fail_init = fail;
    }

    pub fn is_open(&self) -> bool {
        self.state.lock().open
    }

    pub fn is_selected(&self, handle: DeviceHandle) -> bool {
        self.state.lock().selected.contains_key(&handle)
    }

    pub fn is_streaming(&self, handle: DeviceHandle) -> bool {
        self.state.lock().streaming.contains_key(&handle)
    }

    pub fn debug_enabled(&self, handle: DeviceHandle) -> bool {
        self.state.lock().debug.get(&handle).copied().unwrap_or_default()
    }

    /// The device info passed to `select_device` for `handle`.
    pub fn selection(&self, handle: DeviceHandle) -> Option<DeviceInfo> {
        self.state.lock().selected.get(&handle).cloned()
    }

    pub fn updates(&self) -> Vec<UpdateCall> {
        self.state.lock().updates.clone()
    }

    pub fn clear_updates(&self) {
        self.state.lock().updates.clear();
    }

    fn callbacks(&self, handle: DeviceHandle) -> Option<Arc<dyn Callbacks>> {
        self.state.lock().streaming.get(&handle).cloned()
    }

    /// Delivers a burst of samples on `stream` (0 for A, 1 for B).
    ///
    /// Sample numbers continue from the previous burst on the same stream.
    /// Returns `false` if the device isn't streaming.
    pub fn deliver(&self, handle: DeviceHandle, stream: usize, xi: &[i16], xq: &[i16]) -> bool {
        let first_sample_num = {
            let mut state = self.state.lock();
            let counter = state.stream_counters.entry((handle, stream)).or_default();
            let first = *counter;
            *counter = counter.wrapping_add(xi.len() as u32);
            first
        };
        let params = StreamCbParams {
            first_sample_num,
            num_samples: xi.len() as u32,
            ..Default::default()
        };
        self.deliver_with(handle, stream, xi, xq, &params)
    }

    /// Delivers a burst with explicit callback parameters.
    pub fn deliver_with(
        &self,
        handle: DeviceHandle,
        stream: usize,
        xi: &[i16],
        xq: &[i16],
        params: &StreamCbParams,
    ) -> bool {
        let Some(callbacks) = self.callbacks(handle)
        else {
            return false;
        };
        if stream == 0 {
            callbacks.stream_a(xi, xq, params, false);
        }
        else {
            callbacks.stream_b(xi, xq, params, false);
        }
        true
    }

    pub fn emit_event(&self, handle: DeviceHandle, event: Event, tuner: TunerSelect) -> bool {
        let Some(callbacks) = self.callbacks(handle)
        else {
            return false;
        };
        callbacks.event(event, tuner);
        true
    }

    fn check_open(state: &State) -> Result<(), ApiError> {
        if state.open {
            Ok(())
        }
        else {
            Err(ApiError::SERVICE_NOT_RESPONDING)
        }
    }
}

impl Api for SimulatedApi {
    fn open(&self) -> Result<(), ApiError> {
        let mut state = self.state.lock();
        if state.open {
            return Err(ApiError::ALREADY_INITIALISED);
        }
        state.open = true;
        Ok(())
    }

    fn close(&self) -> Result<(), ApiError> {
        let mut state = self.state.lock();
        Self::check_open(&state)?;
        state.open = false;
        Ok(())
    }

    fn api_version(&self) -> Result<f32, ApiError> {
        let state = self.state.lock();
        Self::check_open(&state)?;
        Ok(state.version)
    }

    fn lock_device_api(&self) -> Result<(), ApiError> {
        Self::check_open(&self.state.lock())
    }

    fn unlock_device_api(&self) -> Result<(), ApiError> {
        Self::check_open(&self.state.lock())
    }

    fn get_devices(&self) -> Result<Vec<DeviceInfo>, ApiError> {
        let state = self.state.lock();
        Self::check_open(&state)?;
        Ok(state
            .devices
            .iter()
            .filter(|device| !state.selected.contains_key(&device.handle))
            .cloned()
            .collect())
    }

    fn select_device(&self, device: &DeviceInfo) -> Result<(), ApiError> {
        let mut state = self.state.lock();
        Self::check_open(&state)?;
        if !state.devices.iter().any(|d| d.handle == device.handle) {
            return Err(ApiError::INVALID_PARAM);
        }
        if state.selected.contains_key(&device.handle) {
            return Err(ApiError::FAIL);
        }
        state.selected.insert(device.handle, device.clone());
        Ok(())
    }

    fn release_device(&self, device: &DeviceInfo) -> Result<(), ApiError> {
        let mut state = self.state.lock();
        Self::check_open(&state)?;
        if state.selected.remove(&device.handle).is_none() {
            return Err(ApiError::FAIL);
        }
        state.streaming.remove(&device.handle);
        Ok(())
    }

    fn get_device_params(&self, handle: DeviceHandle) -> Result<DeviceParams, ApiError> {
        let state = self.state.lock();
        let device = state.selected.get(&handle).ok_or(ApiError::NOT_ENABLED)?;
        let mut params = DeviceParams::default();
        if device.hw_version == HwVersion::RSPDUO {
            params.rx_channel_b = Some(RxChannelParams::default());
            if device.rspduo_mode == RspDuoMode::SLAVE {
                params.dev = None;
            }
            else {
                params.dev = Some(DevParams::default());
            }
        }
        else {
            params.dev = Some(DevParams::default());
        }
        Ok(params)
    }

    fn init(
        &self,
        handle: DeviceHandle,
        _params: &DeviceParams,
        callbacks: Arc<dyn Callbacks>,
    ) -> Result<(), ApiError> {
        let mut state = self.state.lock();
        if !state.selected.contains_key(&handle) {
            return Err(ApiError::NOT_ENABLED);
        }
        if state.fail_init {
            return Err(ApiError::HW_ERROR);
        }
        if state.streaming.contains_key(&handle) {
            return Err(ApiError::ALREADY_INITIALISED);
        }
        state.streaming.insert(handle, callbacks);
        state.stream_counters.retain(|(h, _), _| *h != handle);
        Ok(())
    }

    fn uninit(&self, handle: DeviceHandle) -> Result<(), ApiError> {
        let mut state = self.state.lock();
        state
            .streaming
            .remove(&handle)
            .map(|_| ())
            .ok_or(ApiError::NOT_INITIALISED)
    }

    fn update(
        &self,
        handle: DeviceHandle,
        tuner: TunerSelect,
        params: &DeviceParams,
        reason: ReasonForUpdate,
        reason_ext1: ReasonForUpdateExt1,
    ) -> Result<(), ApiError> {
        let acknowledge = {
            let mut state = self.state.lock();
            let Some(callbacks) = state.streaming.get(&handle).cloned()
            else {
                return Err(ApiError::NOT_INITIALISED);
            };
            state.updates.push(UpdateCall {
                handle,
                tuner,
                reason,
                reason_ext1,
                params: params.clone(),
            });
            state.acknowledge_updates.then_some(callbacks)
        };

        // the hardware reports applied changes with the next burst of samples
        if let Some(callbacks) = acknowledge {
            let ack = StreamCbParams {
                fs_changed: reason
                    .intersects(ReasonForUpdate::DEV_FS | ReasonForUpdate::CTRL_DECIMATION),
                rf_changed: reason.contains(ReasonForUpdate::TUNER_FRF),
                gr_changed: reason.contains(ReasonForUpdate::TUNER_GR),
                ..Default::default()
            };
            if ack.fs_changed || ack.rf_changed || ack.gr_changed {
                if tuner == TunerSelect::B {
                    callbacks.stream_b(&[], &[], &ack, false);
                }
                else {
                    callbacks.stream_a(&[], &[], &ack, false);
                }
            }
        }

        Ok(())
    }

    fn swap_rspduo_active_tuner(
        &self,
        handle: DeviceHandle,
        current: TunerSelect,
        _tuner1_am_port: RspDuoAmPortSelect,
    ) -> Result<TunerSelect, ApiError> {
        let mut state = self.state.lock();
        if !state.streaming.contains_key(&handle) {
            return Err(ApiError::NOT_INITIALISED);
        }
        let device = state.selected.get_mut(&handle).ok_or(ApiError::NOT_ENABLED)?;
        if device.rspduo_mode != RspDuoMode::SINGLE_TUNER {
            return Err(ApiError::INVALID_MODE);
        }
        let swapped = match current {
            TunerSelect::A => TunerSelect::B,
            TunerSelect::B => TunerSelect::A,
            _ => return Err(ApiError::INVALID_PARAM),
        };
        device.tuner = swapped;
        Ok(swapped)
    }

    fn debug_enable(&self, handle: DeviceHandle, enable: bool) -> Result<(), ApiError> {
        let mut state = self.state.lock();
        Self::check_open(&state)?;
        state.debug.insert(handle, enable);
        Ok(())
    }
}

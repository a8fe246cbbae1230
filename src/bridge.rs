//! The callbacks registered with the library.
//!
//! [`StreamBridge`] receives sample bursts on the library's threads and
//! writes them into the ring buffer of their stream. It also folds in the
//! change flags of each burst, and forwards events to the event thread.

use std::sync::{
    Arc,
    atomic::{
        AtomicBool,
        AtomicU8,
        AtomicU32,
        AtomicU64,
        Ordering,
    },
};

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::{
    api::{
        Api,
        Callbacks,
        DeviceHandle,
        DeviceParams,
        Event,
        RspDuoModeChange,
        StreamCbParams,
        TunerSelect,
    },
    events::EventMessage,
    ring_buffer::RingBuffer,
    update::Acknowledgements,
};

/// Streaming state of a device.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum RunStatus {
    /// no streaming session with the library
    Idle = 0,
    /// callbacks are registered, but [`Rsp::work`][crate::Rsp::work] wasn't
    /// called yet
    Initialized = 1,
    Streaming = 2,
}

#[derive(Debug)]
pub(crate) struct AtomicRunStatus(AtomicU8);

impl AtomicRunStatus {
    pub fn new(run_status: RunStatus) -> Self {
        Self(AtomicU8::new(run_status as u8))
    }

    fn from_u8(value: u8) -> RunStatus {
        match value {
            0 => RunStatus::Idle,
            1 => RunStatus::Initialized,
            _ => RunStatus::Streaming,
        }
    }

    pub fn load(&self) -> RunStatus {
        Self::from_u8(self.0.load(Ordering::Acquire))
    }

    pub fn store(&self, run_status: RunStatus) {
        self.0.store(run_status as u8, Ordering::Release);
    }

    pub fn swap(&self, run_status: RunStatus) -> RunStatus {
        Self::from_u8(self.0.swap(run_status as u8, Ordering::AcqRel))
    }

    /// Sets `new` if the status is `current`. Returns whether it did.
    pub fn transition(&self, current: RunStatus, new: RunStatus) -> bool {
        self.0
            .compare_exchange(
                current as u8,
                new as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }
}

/// Device state shared by the controller, the callbacks and the event
/// thread.
#[derive(derive_more::Debug)]
pub(crate) struct Shared {
    #[debug(skip)]
    pub api: Arc<dyn Api>,
    pub handle: DeviceHandle,
    pub run_status: AtomicRunStatus,

    /// active tuner, as [`TunerSelect::bits`]
    tuner: AtomicU8,

    /// parameters as last pushed to the hardware
    hardware_params: Mutex<DeviceParams>,

    pub show_gain_changes: AtomicBool,

    /// last RSPduo mode change event
    rspduo_mode_change: Mutex<Option<RspDuoModeChange>>,
}

impl Shared {
    pub fn new(api: Arc<dyn Api>, handle: DeviceHandle, tuner: TunerSelect) -> Self {
        Self {
            api,
            handle,
            run_status: AtomicRunStatus::new(RunStatus::Idle),
            tuner: AtomicU8::new(tuner.bits()),
            hardware_params: Mutex::new(DeviceParams::default()),
            show_gain_changes: AtomicBool::new(false),
            rspduo_mode_change: Mutex::new(None),
        }
    }

    pub fn tuner(&self) -> TunerSelect {
        TunerSelect::from_bits(self.tuner.load(Ordering::Acquire))
    }

    pub fn set_tuner(&self, tuner: TunerSelect) {
        self.tuner.store(tuner.bits(), Ordering::Release);
    }

    pub fn hardware_params(&self) -> DeviceParams {
        self.hardware_params.lock().clone()
    }

    pub fn set_hardware_params(&self, params: &DeviceParams) {
        self.hardware_params.lock().clone_from(params);
    }

    pub fn rspduo_mode_change(&self) -> Option<RspDuoModeChange> {
        *self.rspduo_mode_change.lock()
    }

    pub fn set_rspduo_mode_change(&self, change: RspDuoModeChange) {
        *self.rspduo_mode_change.lock() = Some(change);
    }
}

#[derive(Debug)]
pub(crate) struct StreamBridge {
    pub shared: Arc<Shared>,

    /// one ring buffer per stream
    pub ring_buffers: [RingBuffer; 2],

    pub acknowledgements: Acknowledgements,

    check_gaps: AtomicBool,

    /// expected first sample number of the next burst, per stream
    next_sample_num: [AtomicU32; 2],

    /// number of sample sequence gaps detected, per stream
    gaps: [AtomicU64; 2],

    events: mpsc::Sender<EventMessage>,
}

impl StreamBridge {
    pub fn new(
        shared: Arc<Shared>,
        ring_buffer_size: usize,
        events: mpsc::Sender<EventMessage>,
    ) -> Self {
        Self {
            shared,
            ring_buffers: [
                RingBuffer::new(ring_buffer_size),
                RingBuffer::new(ring_buffer_size),
            ],
            acknowledgements: Acknowledgements::default(),
            check_gaps: AtomicBool::new(false),
            next_sample_num: [AtomicU32::new(0), AtomicU32::new(0)],
            gaps: [AtomicU64::new(0), AtomicU64::new(0)],
            events,
        }
    }

    pub fn set_check_gaps(&self, enable: bool) {
        self.check_gaps.store(enable, Ordering::Relaxed);
    }

    pub fn gaps(&self, stream: usize) -> u64 {
        self.gaps[stream].load(Ordering::Relaxed)
    }

    /// Resets the per-run stream state.
    pub fn reset_streams(&self) {
        for next in &self.next_sample_num {
            next.store(0, Ordering::Relaxed);
        }
    }

    fn stream(&self, stream: usize, xi: &[i16], xq: &[i16], params: &StreamCbParams, reset: bool) {
        self.acknowledgements.report(params);

        // a stop might be in progress
        if self.shared.run_status.load() != RunStatus::Streaming {
            return;
        }

        if reset {
            tracing::debug!(stream, "stream reset");
        }

        if params.num_samples > 0 && self.check_gaps.load(Ordering::Relaxed) {
            self.check_gap(stream, params);
        }

        if !self.ring_buffers[stream].write(xi, xq) {
            tracing::trace!(stream, samples = xi.len(), "burst discarded");
        }
    }

    fn check_gap(&self, stream: usize, params: &StreamCbParams) {
        let next = self.next_sample_num[stream].swap(
            params.first_sample_num.wrapping_add(params.num_samples),
            Ordering::Relaxed,
        );
        if next != 0 && params.first_sample_num != next {
            let gap = params.first_sample_num.wrapping_sub(next);
            self.gaps[stream].fetch_add(1, Ordering::Relaxed);
            tracing::warn!(
                stream,
                next,
                first = params.first_sample_num,
                "sample num gap: {gap} -> {} x {} + {}",
                gap / params.num_samples,
                params.num_samples,
                gap % params.num_samples,
            );
        }
    }
}

impl Callbacks for StreamBridge {
    fn stream_a(&self, xi: &[i16], xq: &[i16], params: &StreamCbParams, reset: bool) {
        self.stream(0, xi, xq, params, reset);
    }

    fn stream_b(&self, xi: &[i16], xq: &[i16], params: &StreamCbParams, reset: bool) {
        self.stream(1, xi, xq, params, reset);
    }

    fn event(&self, event: Event, tuner: TunerSelect) {
        if let Err(error) = self.events.try_send(EventMessage { event, tuner }) {
            tracing::warn!(?event, ?tuner, %error, "dropping event");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio::sync::mpsc;

    use crate::{
        Sc16,
        api::{
            Callbacks,
            DeviceHandle,
            Event,
            StreamCbParams,
            TunerSelect,
            sim::SimulatedApi,
        },
        bridge::{
            RunStatus,
            Shared,
            StreamBridge,
        },
        events::EventMessage,
    };

    fn bridge() -> (StreamBridge, mpsc::Receiver<EventMessage>) {
        let shared = Arc::new(Shared::new(
            Arc::new(SimulatedApi::new()),
            DeviceHandle(1),
            TunerSelect::A,
        ));
        let (sender, receiver) = mpsc::channel(4);
        let bridge = StreamBridge::new(shared, 64, sender);
        for ring_buffer in &bridge.ring_buffers {
            ring_buffer.allocate().unwrap();
        }
        (bridge, receiver)
    }

    fn params(first_sample_num: u32, num_samples: u32) -> StreamCbParams {
        StreamCbParams {
            first_sample_num,
            num_samples,
            ..Default::default()
        }
    }

    #[test]
    fn discards_samples_unless_streaming() {
        let (bridge, _events) = bridge();
        bridge.shared.run_status.store(RunStatus::Initialized);
        bridge.stream_a(&[1, 2], &[3, 4], &params(0, 2), false);
        assert_eq!(bridge.ring_buffers[0].counters(), (0, 0));

        bridge.shared.run_status.store(RunStatus::Streaming);
        bridge.stream_a(&[1, 2], &[3, 4], &params(2, 2), false);
        bridge.stream_b(&[5], &[6], &params(0, 1), false);
        assert_eq!(bridge.ring_buffers[0].counters(), (2, 0));
        assert_eq!(bridge.ring_buffers[1].counters(), (1, 0));

        let mut output = [Sc16::default(); 2];
        assert_eq!(bridge.ring_buffers[1].read(&mut output), 1);
        assert_eq!(output[0], Sc16 { i: 5, q: 6 });
    }

    #[test]
    fn bursts_for_unallocated_streams_are_dropped() {
        let (bridge, _events) = bridge();
        bridge.ring_buffers[1].release();
        bridge.shared.run_status.store(RunStatus::Streaming);

        bridge.stream_b(&[5, 6], &[7, 8], &params(0, 2), false);
        bridge.stream_a(&[1], &[2], &params(0, 1), false);
        assert!(!bridge.ring_buffers[1].is_allocated());
        assert_eq!(bridge.ring_buffers[0].counters(), (1, 0));
    }

    #[test]
    fn detects_sample_number_gaps() {
        let (bridge, _events) = bridge();
        bridge.shared.run_status.store(RunStatus::Streaming);
        bridge.set_check_gaps(true);

        let xi = [0; 8];
        bridge.stream_a(&xi, &xi, &params(100, 8), false);
        bridge.stream_a(&xi, &xi, &params(108, 8), false);
        assert_eq!(bridge.gaps(0), 0);

        // two bursts missing
        bridge.stream_a(&xi, &xi, &params(132, 8), false);
        assert_eq!(bridge.gaps(0), 1);

        // sample numbers wrap around
        bridge.stream_b(&xi, &xi, &params(u32::MAX - 3, 8), false);
        bridge.stream_b(&xi, &xi, &params(4, 8), false);
        assert_eq!(bridge.gaps(1), 0);
    }

    #[test]
    fn reset_streams_restarts_gap_detection() {
        let (bridge, _events) = bridge();
        bridge.shared.run_status.store(RunStatus::Streaming);
        bridge.set_check_gaps(true);

        let xi = [0; 4];
        bridge.stream_a(&xi, &xi, &params(40, 4), false);
        bridge.reset_streams();
        bridge.stream_a(&xi, &xi, &params(0, 4), false);
        assert_eq!(bridge.gaps(0), 0);
    }

    #[test]
    fn forwards_events() {
        let (bridge, mut events) = bridge();
        bridge.event(Event::DeviceRemoved, TunerSelect::A);
        let message = events.try_recv().unwrap();
        assert_eq!(message.event, Event::DeviceRemoved);
        assert_eq!(message.tuner, TunerSelect::A);
    }
}

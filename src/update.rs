//! Pushing parameter changes to the hardware.
//!
//! Every setter mutates the controller's copy of the device parameters and
//! then calls [`Update::apply`] with the parameter groups it touched. While
//! streaming this issues one `sdrplay_api_Update` call. Sample rate,
//! frequency and gain reduction changes are acknowledged by the hardware
//! through flags in the next stream callback, and by default `apply` waits
//! for them.

use std::time::{
    Duration,
    Instant,
};

use bitflags::bitflags;
use parking_lot::{
    Condvar,
    Mutex,
};

use crate::{
    api::{
        Api,
        DeviceHandle,
        DeviceParams,
        ReasonForUpdate,
        StreamCbParams,
        TunerSelect,
    },
    bridge::RunStatus,
    capabilities::Change,
};

/// default time to wait for the hardware to acknowledge an update
pub const DEFAULT_UPDATE_TIMEOUT: Duration = Duration::from_millis(500);

bitflags! {
    /// Changes the hardware acknowledges through the stream callback.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub(crate) struct ChangeFlags: u8 {
        const SAMPLE_RATE = 0x01;
        const FREQUENCY = 0x02;
        const GAIN_REDUCTION = 0x04;
    }
}

impl ChangeFlags {
    /// The acknowledgements an update with `reason` produces.
    fn expected(reason: ReasonForUpdate) -> Self {
        let mut flags = Self::empty();
        if reason.intersects(ReasonForUpdate::DEV_FS | ReasonForUpdate::CTRL_DECIMATION) {
            flags |= Self::SAMPLE_RATE;
        }
        if reason.contains(ReasonForUpdate::TUNER_FRF) {
            flags |= Self::FREQUENCY;
        }
        if reason.contains(ReasonForUpdate::TUNER_GR) {
            flags |= Self::GAIN_REDUCTION;
        }
        flags
    }

    fn reported(params: &StreamCbParams) -> Self {
        let mut flags = Self::empty();
        flags.set(Self::SAMPLE_RATE, params.fs_changed);
        flags.set(Self::FREQUENCY, params.rf_changed);
        flags.set(Self::GAIN_REDUCTION, params.gr_changed);
        flags
    }

    fn describe(self) -> &'static str {
        if self == Self::SAMPLE_RATE {
            "sample rate/decimation"
        }
        else if self == Self::FREQUENCY {
            "frequency"
        }
        else {
            "gain reduction"
        }
    }
}

/// Change flags set by the stream callbacks and awaited by [`Update::apply`].
#[derive(Debug, Default)]
pub(crate) struct Acknowledgements {
    flags: Mutex<ChangeFlags>,

    /// notified whenever a flag is set
    changed: Condvar,
}

impl Acknowledgements {
    /// Folds in the change flags of a stream callback.
    pub fn report(&self, params: &StreamCbParams) {
        let reported = ChangeFlags::reported(params);
        if reported.is_empty() {
            return;
        }

        let mut flags = self.flags.lock();
        flags.insert(reported);
        self.changed.notify_all();
    }

    fn clear(&self, flags: ChangeFlags) {
        self.flags.lock().remove(flags);
    }

    /// Waits until all of `flags` are set. Returns the ones that weren't set
    /// within `timeout`.
    fn wait(&self, flags: ChangeFlags, timeout: Duration) -> ChangeFlags {
        let deadline = Instant::now() + timeout;
        let mut state = self.flags.lock();
        while !state.contains(flags) {
            if self.changed.wait_until(&mut state, deadline).timed_out() {
                break;
            }
        }
        flags.difference(*state)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum UpdateOutcome {
    /// not streaming, or nothing changed
    Skipped,
    /// sent without waiting for an acknowledgement
    Sent,
    Acknowledged,
    TimedOut,
    Failed,
}

/// Everything needed to push parameters to a device.
pub(crate) struct Update<'a> {
    pub api: &'a dyn Api,
    pub handle: DeviceHandle,
    pub params: &'a DeviceParams,
    pub run_status: RunStatus,
    pub acknowledgements: &'a Acknowledgements,
    /// wait this long for acknowledgements, or don't wait if `None`
    pub timeout: Option<Duration>,
}

impl Update<'_> {
    pub fn apply(&self, change: Change, tuner: TunerSelect) -> UpdateOutcome {
        if change.is_empty() || self.run_status != RunStatus::Streaming {
            return UpdateOutcome::Skipped;
        }

        let awaited = if self.timeout.is_some() {
            ChangeFlags::expected(change.reason)
        }
        else {
            ChangeFlags::empty()
        };
        self.acknowledgements.clear(awaited);

        let result = self.api.update(
            self.handle,
            tuner,
            self.params,
            change.reason,
            change.reason_ext1,
        );
        tracing::debug!(
            ?result,
            ?tuner,
            reason = ?change.reason,
            reason_ext1 = ?change.reason_ext1,
            "sdrplay_api_Update"
        );
        if let Err(error) = result {
            tracing::error!(%error, reason = ?change.reason, "sdrplay_api_Update failed");
            return UpdateOutcome::Failed;
        }

        let Some(timeout) = self.timeout
        else {
            return UpdateOutcome::Sent;
        };
        if awaited.is_empty() {
            return UpdateOutcome::Sent;
        }

        let missing = self.acknowledgements.wait(awaited, timeout);
        if missing.is_empty() {
            UpdateOutcome::Acknowledged
        }
        else {
            for flag in missing.iter() {
                tracing::warn!(?timeout, "{} update timeout", flag.describe());
            }
            UpdateOutcome::TimedOut
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::Arc,
        time::{
            Duration,
            Instant,
        },
    };

    use crate::{
        api::{
            Api,
            Callbacks,
            DeviceHandle,
            DeviceParams,
            Event,
            HwVersion,
            ReasonForUpdate,
            ReasonForUpdateExt1,
            StreamCbParams,
            TunerSelect,
            sim::SimulatedApi,
        },
        bridge::RunStatus,
        capabilities::Change,
        update::{
            Acknowledgements,
            Update,
            UpdateOutcome,
        },
    };

    struct Reporter(Arc<Acknowledgements>);

    impl Callbacks for Reporter {
        fn stream_a(&self, _xi: &[i16], _xq: &[i16], params: &StreamCbParams, _reset: bool) {
            self.0.report(params);
        }

        fn stream_b(&self, _xi: &[i16], _xq: &[i16], params: &StreamCbParams, _reset: bool) {
            self.0.report(params);
        }

        fn event(&self, _event: Event, _tuner: TunerSelect) {}
    }

    fn streaming_device() -> (SimulatedApi, DeviceHandle, Arc<Acknowledgements>) {
        let api = SimulatedApi::new().with_device(HwVersion::RSP1A, "1234");
        api.open().unwrap();
        let device = api.get_devices().unwrap().remove(0);
        api.select_device(&device).unwrap();
        let acknowledgements = Arc::new(Acknowledgements::default());
        api.init(
            device.handle,
            &DeviceParams::default(),
            Arc::new(Reporter(acknowledgements.clone())),
        )
        .unwrap();
        (api, device.handle, acknowledgements)
    }

    #[test]
    fn acknowledged_update_returns_without_waiting() {
        let (api, handle, acknowledgements) = streaming_device();
        let params = DeviceParams::default();
        let update = Update {
            api: &api,
            handle,
            params: &params,
            run_status: RunStatus::Streaming,
            acknowledgements: &acknowledgements,
            timeout: Some(Duration::from_secs(5)),
        };

        let started = Instant::now();
        let outcome = update.apply(Change::reason(ReasonForUpdate::TUNER_FRF), TunerSelect::A);
        assert_eq!(outcome, UpdateOutcome::Acknowledged);
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(api.updates().len(), 1);
    }

    #[test]
    fn missing_acknowledgement_times_out_without_failing() {
        let (api, handle, acknowledgements) = streaming_device();
        api.set_acknowledge_updates(false);
        let params = DeviceParams::default();
        let update = Update {
            api: &api,
            handle,
            params: &params,
            run_status: RunStatus::Streaming,
            acknowledgements: &acknowledgements,
            timeout: Some(Duration::from_millis(500)),
        };

        let started = Instant::now();
        let outcome = update.apply(Change::reason(ReasonForUpdate::TUNER_FRF), TunerSelect::A);
        let elapsed = started.elapsed();

        assert_eq!(outcome, UpdateOutcome::TimedOut);
        assert!(elapsed >= Duration::from_millis(500));
        assert!(elapsed < Duration::from_millis(1500));
        // the request still reached the hardware
        assert_eq!(api.updates()[0].reason, ReasonForUpdate::TUNER_FRF);
    }

    #[test]
    fn stale_acknowledgement_is_cleared_before_update() {
        let (api, handle, acknowledgements) = streaming_device();
        api.set_acknowledge_updates(false);
        acknowledgements.report(&StreamCbParams {
            rf_changed: true,
            ..Default::default()
        });
        let params = DeviceParams::default();
        let update = Update {
            api: &api,
            handle,
            params: &params,
            run_status: RunStatus::Streaming,
            acknowledgements: &acknowledgements,
            timeout: Some(Duration::from_millis(50)),
        };
        assert_eq!(
            update.apply(Change::reason(ReasonForUpdate::TUNER_FRF), TunerSelect::A),
            UpdateOutcome::TimedOut
        );
    }

    #[test]
    fn asynchronous_update_doesnt_wait() {
        let (api, handle, acknowledgements) = streaming_device();
        api.set_acknowledge_updates(false);
        let params = DeviceParams::default();
        let update = Update {
            api: &api,
            handle,
            params: &params,
            run_status: RunStatus::Streaming,
            acknowledgements: &acknowledgements,
            timeout: None,
        };
        assert_eq!(
            update.apply(Change::reason(ReasonForUpdate::TUNER_GR), TunerSelect::A),
            UpdateOutcome::Sent
        );
    }

    #[test]
    fn toggles_are_sent_without_waiting() {
        let (api, handle, acknowledgements) = streaming_device();
        api.set_acknowledge_updates(false);
        let params = DeviceParams::default();
        let update = Update {
            api: &api,
            handle,
            params: &params,
            run_status: RunStatus::Streaming,
            acknowledgements: &acknowledgements,
            timeout: Some(Duration::from_secs(5)),
        };
        let change = Change::ext1(ReasonForUpdateExt1::RSPDX_HDR_ENABLE);
        assert_eq!(update.apply(change, TunerSelect::A), UpdateOutcome::Sent);
        assert_eq!(
            api.updates()[0].reason_ext1,
            ReasonForUpdateExt1::RSPDX_HDR_ENABLE
        );
    }

    #[test]
    fn nothing_is_sent_unless_streaming() {
        let (api, handle, acknowledgements) = streaming_device();
        let params = DeviceParams::default();
        for run_status in [RunStatus::Idle, RunStatus::Initialized] {
            let update = Update {
                api: &api,
                handle,
                params: &params,
                run_status,
                acknowledgements: &acknowledgements,
                timeout: Some(Duration::from_secs(5)),
            };
            assert_eq!(
                update.apply(Change::reason(ReasonForUpdate::TUNER_FRF), TunerSelect::A),
                UpdateOutcome::Skipped
            );
        }

        let update = Update {
            api: &api,
            handle,
            params: &params,
            run_status: RunStatus::Streaming,
            acknowledgements: &acknowledgements,
            timeout: Some(Duration::from_secs(5)),
        };
        assert_eq!(update.apply(Change::NONE, TunerSelect::A), UpdateOutcome::Skipped);
        assert!(api.updates().is_empty());
    }
}

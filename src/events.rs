//! Device events.
//!
//! The event callback only forwards events. They are handled on a separate
//! thread, which acknowledges power overload messages and tracks RSPduo mode
//! changes.

use std::{
    sync::Arc,
    thread,
};

use tokio::sync::mpsc;

use crate::{
    api::{
        Event,
        PowerOverloadChange,
        ReasonForUpdate,
        ReasonForUpdateExt1,
        TunerSelect,
    },
    bridge::{
        RunStatus,
        Shared,
    },
};

/// Events buffered between the event callback and the event thread.
const EVENT_QUEUE_SIZE: usize = 32;

#[derive(Clone, Copy, Debug)]
pub(crate) struct EventMessage {
    pub event: Event,
    pub tuner: TunerSelect,
}

/// Spawns the thread that handles events for a device.
///
/// The thread terminates once all senders are dropped.
pub(crate) fn spawn_event_thread(shared: Arc<Shared>) -> mpsc::Sender<EventMessage> {
    let (sender, receiver) = mpsc::channel(EVENT_QUEUE_SIZE);
    thread::spawn(move || event_thread(shared, receiver));
    sender
}

fn event_thread(shared: Arc<Shared>, mut receiver: mpsc::Receiver<EventMessage>) {
    let _guard = tracing::debug_span!("event thread", handle = ?shared.handle).entered();
    tracing::debug!("event thread started");

    while let Some(message) = receiver.blocking_recv() {
        handle_event(&shared, message.event, message.tuner);
    }

    tracing::debug!("event queue closed");
}

pub(crate) fn handle_event(shared: &Shared, event: Event, tuner: TunerSelect) {
    match event {
        Event::GainChange {
            gr_db,
            lna_gr_db,
            current_gain,
        } => {
            if shared
                .show_gain_changes
                .load(std::sync::atomic::Ordering::Relaxed)
            {
                tracing::info!(?tuner, gr_db, lna_gr_db, current_gain, "gain change");
            }
        }
        Event::PowerOverloadChange(change) => {
            // only meaningful while samples are flowing
            if shared.run_status.load() != RunStatus::Streaming {
                return;
            }

            match change {
                PowerOverloadChange::Detected => {
                    tracing::warn!(?tuner, "overload detected - please reduce gain");
                }
                PowerOverloadChange::Corrected => {
                    tracing::warn!(?tuner, "overload corrected");
                }
            }

            // the hardware only reports the next overload change after this
            let result = shared.api.update(
                shared.handle,
                shared.tuner(),
                &shared.hardware_params(),
                ReasonForUpdate::CTRL_OVERLOAD_MSG_ACK,
                ReasonForUpdateExt1::empty(),
            );
            tracing::debug!(?result, "sdrplay_api_Update(Ctrl_OverloadMsgAck)");
            if let Err(error) = result {
                tracing::error!(%error, "failed to acknowledge overload message");
            }
        }
        Event::DeviceRemoved => {
            tracing::error!(?tuner, "device removed");
        }
        Event::DeviceFailure => {
            tracing::error!(?tuner, "device failure");
        }
        Event::RspDuoModeChange(change) => {
            tracing::info!(?change, "RSPduo mode change");
            shared.set_rspduo_mode_change(change);
        }
    }
}

//! Commands for a device, sent from other threads or tasks.
//!
//! A [`CommandSender`] queues batches of `(key, value)` pairs. The device
//! handles them on the thread that calls [`Rsp::work`], before it pulls
//! samples, so setters never race with streaming.

use tokio::sync::mpsc;
use tracing::Span;

use crate::{
    Error,
    controller::Rsp,
};

/// Command batches buffered per device.
pub(crate) const COMMAND_QUEUE_SIZE: usize = 16;

/// Value of a command.
#[derive(Clone, Debug, PartialEq)]
pub enum CommandValue {
    Bool(bool),
    String(String),
    Double(f64),
    Int(i64),
}

impl CommandValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(value) => Some(value),
            _ => None,
        }
    }

    /// Numeric value. Integers are converted.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Double(value) => Some(*value),
            Self::Int(value) => Some(*value as f64),
            _ => None,
        }
    }
}

impl From<bool> for CommandValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<&str> for CommandValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<String> for CommandValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<f64> for CommandValue {
    fn from(value: f64) -> Self {
        Self::Double(value)
    }
}

impl From<i64> for CommandValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

#[derive(Debug)]
pub(crate) struct CommandBatch {
    pub commands: Vec<(String, CommandValue)>,

    /// span of the sender
    pub span: Span,
}

/// Sends commands to an [`Rsp`].
///
/// Recognized keys are `freq`, `rate` and `gain` (IF gain) with numeric
/// values, `agc`, `rf_notch_filter`, `dab_notch_filter`, `am_notch_filter`,
/// `biasT` and `hdr_mode` with boolean values, and `antenna` with a string
/// value. A value of the wrong type drops the rest of its batch.
#[derive(Clone, Debug)]
pub struct CommandSender {
    sender: mpsc::Sender<CommandBatch>,
}

impl CommandSender {
    pub(crate) fn new(sender: mpsc::Sender<CommandBatch>) -> Self {
        Self { sender }
    }

    fn batch<I, K>(commands: I) -> CommandBatch
    where
        I: IntoIterator<Item = (K, CommandValue)>,
        K: Into<String>,
    {
        CommandBatch {
            commands: commands
                .into_iter()
                .map(|(key, value)| (key.into(), value))
                .collect(),
            span: Span::current(),
        }
    }

    pub async fn send<I, K>(&self, commands: I) -> Result<(), Error>
    where
        I: IntoIterator<Item = (K, CommandValue)>,
        K: Into<String>,
    {
        self.sender
            .send(Self::batch(commands))
            .await
            .map_err(|_| Error::CommandChannelClosed)
    }

    /// Sends from outside of an async runtime.
    ///
    /// # Panics
    ///
    /// Panics if called within an async execution context.
    pub fn blocking_send<I, K>(&self, commands: I) -> Result<(), Error>
    where
        I: IntoIterator<Item = (K, CommandValue)>,
        K: Into<String>,
    {
        self.sender
            .blocking_send(Self::batch(commands))
            .map_err(|_| Error::CommandChannelClosed)
    }

    /// Sends if there is room in the queue. A full queue drops the batch
    /// with a warning.
    pub fn try_send<I, K>(&self, commands: I) -> Result<(), Error>
    where
        I: IntoIterator<Item = (K, CommandValue)>,
        K: Into<String>,
    {
        match self.sender.try_send(Self::batch(commands)) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!("command queue full, dropping commands");
                Ok(())
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(Error::CommandChannelClosed),
        }
    }
}

impl Rsp {
    /// Handles all queued command batches. Returns the number of batches.
    ///
    /// [`work`][Self::work] calls this before pulling samples.
    pub fn process_commands(&mut self) -> usize {
        let mut processed = 0;
        while let Ok(batch) = self.commands.try_recv() {
            let CommandBatch { commands, span } = batch;
            let _guard = span.enter();
            for (key, value) in commands {
                if let Err(error) = self.handle_command(&key, &value) {
                    tracing::error!(%error, "dropping remaining commands");
                    break;
                }
            }
            processed += 1;
        }
        processed
    }

    fn handle_command(&mut self, key: &str, value: &CommandValue) -> Result<(), Error> {
        let invalid = || {
            Error::InvalidCommandValue {
                key: key.to_owned(),
                value: value.clone(),
            }
        };
        let as_bool = || value.as_bool().ok_or_else(invalid);
        let as_f64 = || value.as_f64().ok_or_else(invalid);

        tracing::debug!(key, ?value, "command");
        match key {
            "rf_notch_filter" => {
                self.set_rf_notch_filter(as_bool()?);
            }
            "dab_notch_filter" => {
                self.set_dab_notch_filter(as_bool()?);
            }
            "am_notch_filter" => {
                self.set_am_notch_filter(as_bool()?);
            }
            "biasT" => {
                self.set_bias_t(as_bool()?);
            }
            "hdr_mode" => {
                self.set_hdr_mode(as_bool()?);
            }
            "antenna" => {
                let antenna = value.as_str().ok_or_else(invalid)?;
                self.set_antenna(antenna);
            }
            "freq" => {
                self.set_center_freq(as_f64()?);
            }
            "rate" => {
                self.set_sample_rate(as_f64()?);
            }
            "gain" => {
                self.set_gain(as_f64()?, "IF");
            }
            "agc" => {
                self.set_gain_mode(as_bool()?);
            }
            _ => tracing::warn!(key, "unknown command"),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        CommandValue,
        Error,
        RspOptions,
        api::{
            Rsp2AntennaSelect,
            sim::SimulatedApi,
        },
        capabilities::Model,
        controller::{
            Rsp,
            tests::open_with,
        },
    };

    fn open(model: Model) -> Rsp {
        let api = SimulatedApi::new().with_device(model.hw_version(), "S0001");
        open_with(api, model, RspOptions::default()).1
    }

    #[test]
    fn commands_apply_on_processing() {
        let mut rsp = open(Model::Rsp2);
        let sender = rsp.command_sender();
        sender
            .blocking_send([
                ("freq", CommandValue::from(100e6)),
                ("agc", false.into()),
                ("antenna", "Antenna B".into()),
                ("biasT", true.into()),
            ])
            .unwrap();
        assert_eq!(rsp.center_freq(), 200e6);

        assert_eq!(rsp.process_commands(), 1);
        assert_eq!(rsp.center_freq(), 100e6);
        assert!(!rsp.gain_mode());
        assert_eq!(
            rsp.params().rx_channel_a.rsp2_tuner.antenna_sel,
            Rsp2AntennaSelect::B
        );
        assert!(rsp.bias_t());
        assert_eq!(rsp.process_commands(), 0);
    }

    #[test]
    fn integers_are_numeric() {
        let mut rsp = open(Model::Rsp1a);
        rsp.command_sender()
            .blocking_send([("rate", CommandValue::Int(2_000_000))])
            .unwrap();
        rsp.process_commands();
        assert_eq!(rsp.sample_rate(), 2e6);
    }

    #[test]
    fn wrong_value_type_drops_rest_of_batch() {
        let mut rsp = open(Model::Rsp1a);
        let sender = rsp.command_sender();
        sender
            .blocking_send([
                ("gain", CommandValue::from(-30.0)),
                ("freq", "100 MHz".into()),
                ("rate", 2e6.into()),
            ])
            .unwrap();
        sender
            .blocking_send([("rate", CommandValue::from(1e6))])
            .unwrap();

        assert_eq!(rsp.process_commands(), 2);
        assert_eq!(rsp.gain("IF"), -30.0);
        assert_eq!(rsp.center_freq(), 200e6);
        assert_eq!(rsp.sample_rate(), 1e6);
    }

    #[test]
    fn unknown_keys_are_skipped() {
        let mut rsp = open(Model::Rsp1a);
        rsp.command_sender()
            .blocking_send([
                ("lo_offset", CommandValue::from(1e3)),
                ("gain", (-40.0).into()),
            ])
            .unwrap();
        rsp.process_commands();
        assert_eq!(rsp.gain("IF"), -40.0);
    }

    #[test]
    fn sending_to_a_dropped_device_fails() {
        let rsp = open(Model::Rsp1a);
        let sender = rsp.command_sender();
        drop(rsp);
        assert!(matches!(
            sender.blocking_send([("freq", CommandValue::from(1e6))]),
            Err(Error::CommandChannelClosed)
        ));
        assert!(matches!(
            sender.try_send([("freq", CommandValue::from(1e6))]),
            Err(Error::CommandChannelClosed)
        ));
    }

    #[tokio::test]
    async fn async_send() {
        let mut rsp = open(Model::Rsp1a);
        rsp.command_sender()
            .send([("freq", CommandValue::from(433.92e6))])
            .await
            .unwrap();
        rsp.process_commands();
        assert_eq!(rsp.center_freq(), 433.92e6);
    }
}

//! Liveness pings while the connection is open.

use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use super::connection::Input;

/// Emits a tick into the connection loop every `interval` while running.
///
/// Every start bumps the epoch carried by the ticks, and stop bumps it
/// again, so a tick already queued when the monitor stops is rejected by
/// [`Heartbeat::accepts`].
pub(crate) struct Heartbeat {
    interval: Duration,
    epoch: u64,
    task: Option<JoinHandle<()>>,
}

impl Heartbeat {
    pub(crate) fn new(interval: Duration) -> Self {
        Self {
            interval,
            epoch: 0,
            task: None,
        }
    }

    pub(crate) fn start(&mut self, inputs: &UnboundedSender<Input>) {
        self.stop();

        let epoch = self.epoch;
        // interval_at panics on a zero period
        let period = self.interval.max(Duration::from_millis(1));
        let inputs = inputs.clone();
        self.task = Some(tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if inputs.send(Input::HeartbeatTick { epoch }).is_err() {
                    break;
                }
            }
        }));
    }

    pub(crate) fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.epoch = self.epoch.wrapping_add(1);
    }

    #[cfg(test)]
    pub(crate) fn is_running(&self) -> bool {
        self.task.is_some()
    }

    /// Whether a tick stamped `epoch` comes from the running monitor.
    pub(crate) fn accepts(&self, epoch: u64) -> bool {
        self.task.is_some() && epoch == self.epoch
    }
}

impl Drop for Heartbeat {
    fn drop(&mut self) {
        self.stop();
    }
}

//! Reconnection after an unintended closure.

use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;

use super::connection::Input;

/// Fixed-delay reconnection.
///
/// At most one attempt is pending at a time. The delay is constant across
/// consecutive failures; under sustained server unavailability the client
/// retries at a fixed rate.
pub(crate) struct ReconnectPolicy {
    delay: Duration,
    epoch: u64,
    pending: Option<JoinHandle<()>>,
}

impl ReconnectPolicy {
    pub(crate) fn new(delay: Duration) -> Self {
        Self {
            delay,
            epoch: 0,
            pending: None,
        }
    }

    pub(crate) fn delay(&self) -> Duration {
        self.delay
    }

    /// Schedule a reconnect after the fixed delay. Returns `false` if one is
    /// already pending.
    pub(crate) fn schedule(&mut self, inputs: &UnboundedSender<Input>) -> bool {
        if self.pending.is_some() {
            return false;
        }

        self.epoch = self.epoch.wrapping_add(1);
        let epoch = self.epoch;
        let delay = self.delay;
        let inputs = inputs.clone();
        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = inputs.send(Input::ReconnectDue { epoch });
        }));
        true
    }

    pub(crate) fn cancel(&mut self) {
        if let Some(task) = self.pending.take() {
            task.abort();
        }
        self.epoch = self.epoch.wrapping_add(1);
    }

    #[cfg(test)]
    pub(crate) fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Consume the pending attempt if `epoch` belongs to it.
    pub(crate) fn take_due(&mut self, epoch: u64) -> bool {
        if self.pending.is_some() && epoch == self.epoch {
            self.pending = None;
            true
        } else {
            false
        }
    }
}

impl Drop for ReconnectPolicy {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::unbounded_channel;

    #[tokio::test(start_paused = true)]
    async fn fires_once_after_the_fixed_delay() {
        let (tx, mut rx) = unbounded_channel();
        let mut policy = ReconnectPolicy::new(Duration::from_secs(5));

        assert!(policy.schedule(&tx));
        assert!(!policy.schedule(&tx));

        tokio::time::sleep(Duration::from_millis(4_999)).await;
        assert!(rx.try_recv().is_err());

        tokio::time::sleep(Duration::from_millis(2)).await;
        let Ok(Input::ReconnectDue { epoch }) = rx.try_recv() else {
            panic!("expected the reconnect");
        };
        assert!(rx.try_recv().is_err());

        assert!(policy.take_due(epoch));
        assert!(!policy.take_due(epoch));
        assert!(!policy.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_prevents_the_attempt() {
        let (tx, mut rx) = unbounded_channel();
        let mut policy = ReconnectPolicy::new(Duration::from_secs(5));

        policy.schedule(&tx);
        policy.cancel();
        assert!(!policy.is_pending());

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn a_due_signal_from_a_cancelled_attempt_is_stale() {
        let (tx, mut rx) = unbounded_channel();
        let mut policy = ReconnectPolicy::new(Duration::from_secs(1));

        policy.schedule(&tx);
        tokio::time::sleep(Duration::from_millis(1_001)).await;
        policy.cancel();
        policy.schedule(&tx);

        let Ok(Input::ReconnectDue { epoch }) = rx.try_recv() else {
            panic!("expected the first attempt's signal");
        };
        assert!(!policy.take_due(epoch));
        assert!(policy.is_pending());
    }
}

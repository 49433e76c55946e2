use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::debug;

use crate::player::{
    events::{ControlEvent, ControllerHandle},
    state::Ticket,
};

/// Retry iff someone is listening when the decision is taken.
pub fn should_retry(present: bool) -> bool {
    present
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AfterEnd {
    Replay,
    Teardown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AfterFailure {
    RetryLater,
    Teardown,
}

/// What to do when a stream stops, and the delayed retry timer.
#[derive(Debug, Clone, Copy)]
pub struct Recovery {
    delay: Duration,
}

impl Recovery {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Clean end of stream: loop straight away.
    pub fn after_end(&self, present: bool) -> AfterEnd {
        if should_retry(present) {
            AfterEnd::Replay
        } else {
            AfterEnd::Teardown
        }
    }

    /// Supplier, join or player failure: back off first.
    pub fn after_failure(&self, present: bool) -> AfterFailure {
        if should_retry(present) {
            AfterFailure::RetryLater
        } else {
            AfterFailure::Teardown
        }
    }

    /// Sends `RetryDue(ticket)` after the delay. The controller re-checks
    /// presence and the ticket when it arrives; aborting the handle cancels.
    pub fn schedule<I: Send + 'static>(
        &self,
        ticket: Ticket,
        notifier: ControllerHandle<I>,
    ) -> JoinHandle<()> {
        let delay = self.delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if !notifier.send(ControlEvent::RetryDue(ticket)) {
                debug!("Retry {} fired after controller shutdown", ticket);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decisions_follow_presence() {
        let recovery = Recovery::new(Duration::from_secs(5));
        assert_eq!(recovery.after_end(true), AfterEnd::Replay);
        assert_eq!(recovery.after_end(false), AfterEnd::Teardown);
        assert_eq!(recovery.after_failure(true), AfterFailure::RetryLater);
        assert_eq!(recovery.after_failure(false), AfterFailure::Teardown);
    }

    #[tokio::test(start_paused = true)]
    async fn schedule_fires_after_delay() {
        let (notifier, mut rx) = ControllerHandle::<()>::channel();
        let recovery = Recovery::new(Duration::from_millis(5000));
        let ticket = Ticket {
            generation: 3,
            attempt: 7,
        };

        let started = tokio::time::Instant::now();
        let _timer = recovery.schedule(ticket, notifier);

        match rx.recv().await {
            Some(ControlEvent::RetryDue(t)) => assert_eq!(t, ticket),
            other => panic!("unexpected event {other:?}"),
        }
        assert!(started.elapsed() >= Duration::from_millis(5000));
    }

    #[tokio::test(start_paused = true)]
    async fn aborted_timer_never_fires() {
        let (notifier, mut rx) = ControllerHandle::<()>::channel();
        let recovery = Recovery::new(Duration::from_millis(5000));

        let timer = recovery.schedule(Ticket::default(), notifier);
        timer.abort();

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(rx.try_recv().is_err());
    }
}

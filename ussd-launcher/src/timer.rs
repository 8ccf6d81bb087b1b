use std::collections::HashMap;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::time::delay_queue::{DelayQueue, Key};

/// The deferred steps a session schedules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// Check the dialog and try the head-of-queue reply.
    RetryTick,
    /// Click the confirm control after a verified injection.
    ConfirmClick,
    /// Capture the final dialog and finish the session.
    CompletionGrace,
}

/// At most one pending deadline per [`TimerKind`]. Scheduling a kind that is
/// already pending moves its deadline.
#[derive(Default)]
pub struct Timers {
    queue: DelayQueue<TimerKind>,
    pending: HashMap<TimerKind, (Key, Instant)>,
}

impl Timers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, kind: TimerKind, delay: Duration) {
        let deadline = Instant::now() + delay;
        match self.pending.get_mut(&kind) {
            Some((key, at)) => {
                self.queue.reset_at(key, deadline);
                *at = deadline;
            }
            None => {
                let key = self.queue.insert_at(kind, deadline);
                self.pending.insert(kind, (key, deadline));
            }
        }
    }

    /// Move the deadline of `kind` forward to `now + delay` if that is earlier
    /// than what is pending, or schedule it if nothing is. Returns whether
    /// anything changed.
    pub fn schedule_no_later_than(&mut self, kind: TimerKind, delay: Duration) -> bool {
        let deadline = Instant::now() + delay;
        match self.pending.get(&kind) {
            Some((_, at)) if *at <= deadline => false,
            _ => {
                self.schedule(kind, delay);
                true
            }
        }
    }

    pub fn cancel(&mut self, kind: TimerKind) {
        if let Some((key, _)) = self.pending.remove(&kind) {
            self.queue.remove(&key);
        }
    }

    pub fn clear(&mut self) {
        self.queue.clear();
        self.pending.clear();
    }

    pub fn is_pending(&self, kind: TimerKind) -> bool {
        self.pending.contains_key(&kind)
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Next expired timer. Returns `Pending` while nothing is scheduled, so
    /// it can sit in a `select!` without spinning.
    pub fn poll_expired(&mut self, cx: &mut Context<'_>) -> Poll<TimerKind> {
        match self.queue.poll_expired(cx) {
            Poll::Ready(Some(expired)) => {
                let kind = expired.into_inner();
                self.pending.remove(&kind);
                Poll::Ready(kind)
            }
            Poll::Ready(None) | Poll::Pending => Poll::Pending,
        }
    }

    pub async fn next_expired(&mut self) -> TimerKind {
        std::future::poll_fn(|cx| self.poll_expired(cx)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_expires_in_deadline_order() {
        let mut timers = Timers::new();
        timers.schedule(TimerKind::CompletionGrace, Duration::from_millis(300));
        timers.schedule(TimerKind::RetryTick, Duration::from_millis(100));

        assert_eq!(timers.next_expired().await, TimerKind::RetryTick);
        assert!(!timers.is_pending(TimerKind::RetryTick));
        assert_eq!(timers.next_expired().await, TimerKind::CompletionGrace);
        assert!(timers.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reschedule_moves_deadline() {
        let mut timers = Timers::new();
        timers.schedule(TimerKind::RetryTick, Duration::from_millis(1000));
        assert!(!timers.schedule_no_later_than(TimerKind::RetryTick, Duration::from_millis(2000)));
        assert!(timers.schedule_no_later_than(TimerKind::RetryTick, Duration::from_millis(200)));

        let start = Instant::now();
        assert_eq!(timers.next_expired().await, TimerKind::RetryTick);
        assert_eq!(start.elapsed(), Duration::from_millis(200));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleared_timers_never_fire() {
        let mut timers = Timers::new();
        timers.schedule(TimerKind::ConfirmClick, Duration::from_millis(10));
        timers.clear();

        let fired = tokio::time::timeout(Duration::from_secs(5), timers.next_expired()).await;
        assert!(fired.is_err());
    }
}

//! Keep-alive heartbeat with an optional pong deadline
//!
//! By default the heartbeat is send-only: pings keep the connection alive and
//! pong replies are discarded, so a half-open connection is only noticed once
//! the transport itself errors. Setting a pong timeout turns a missed reply
//! into a lost connection.

use std::time::Duration;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

/// Heartbeat timing for one open connection
#[derive(Debug)]
pub struct Heartbeat {
    interval: Duration,
    pong_timeout: Option<Duration>,
    /// When the oldest unanswered ping was sent
    awaiting_since: Option<Instant>,
}

impl Heartbeat {
    pub fn new(interval: Duration, pong_timeout: Option<Duration>) -> Self {
        Self {
            interval: interval.max(Duration::from_millis(1)),
            pong_timeout,
            awaiting_since: None,
        }
    }

    /// Ticker whose first tick is one full interval from now
    pub fn ticker(&self) -> Interval {
        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker
    }

    /// A ping went out at `now`
    pub fn record_ping(&mut self, now: Instant) {
        if self.awaiting_since.is_none() {
            self.awaiting_since = Some(now);
        }
    }

    /// A pong came back; any outstanding ping is answered
    pub fn record_pong(&mut self) {
        self.awaiting_since = None;
    }

    /// When the connection counts as lost, if a deadline is being tracked
    pub fn deadline(&self) -> Option<Instant> {
        Some(self.awaiting_since? + self.pong_timeout?)
    }
}

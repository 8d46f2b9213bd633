// src/protocol/heartbeat.rs
// =============================================================================
// Liveness tracking for one connection.
//
// Every `interval` we send a ping. If no pong comes back within `timeout`,
// the peer is considered gone and the connection is closed so the peer can
// reconnect with a fresh socket.
//
// The state machine takes the current Instant as a parameter instead of
// reading the clock itself, so tests can drive it without sleeping.
// =============================================================================

use std::time::{Duration, Instant};

use crate::config::HeartbeatConfig;

/// Close code sent when a pong never arrives (application range 4000-4999).
pub const HEARTBEAT_CLOSE_CODE: u16 = 4000;
pub const HEARTBEAT_CLOSE_REASON: &str = "heartbeat timeout";

const MIN_CHECK_PERIOD: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatAction {
    /// Nothing to do yet.
    Wait,
    /// Time to send a ping.
    SendPing,
    /// The last ping was never answered.
    TimedOut,
}

#[derive(Debug)]
pub struct Heartbeat {
    interval: Duration,
    timeout: Duration,
    last_ping: Instant,
    awaiting_since: Option<Instant>,
}

impl Heartbeat {
    pub fn new(config: &HeartbeatConfig, now: Instant) -> Self {
        Self {
            interval: config.interval,
            timeout: config.timeout,
            last_ping: now,
            awaiting_since: None,
        }
    }

    /// How often the connection loop should call `poll`.
    pub fn check_period(&self) -> Duration {
        (self.interval.min(self.timeout) / 4).max(MIN_CHECK_PERIOD)
    }

    pub fn poll(&mut self, now: Instant) -> HeartbeatAction {
        if let Some(since) = self.awaiting_since {
            if now.saturating_duration_since(since) >= self.timeout {
                return HeartbeatAction::TimedOut;
            }
            return HeartbeatAction::Wait;
        }

        if now.saturating_duration_since(self.last_ping) >= self.interval {
            self.last_ping = now;
            self.awaiting_since = Some(now);
            return HeartbeatAction::SendPing;
        }

        HeartbeatAction::Wait
    }

    pub fn on_pong(&mut self) {
        self.awaiting_since = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn heartbeat(start: Instant) -> Heartbeat {
        let config = HeartbeatConfig {
            interval: Duration::from_secs(30),
            timeout: Duration::from_secs(10),
        };
        Heartbeat::new(&config, start)
    }

    #[test]
    fn test_ping_after_interval() {
        let start = Instant::now();
        let mut hb = heartbeat(start);

        assert_eq!(hb.poll(start + Duration::from_secs(29)), HeartbeatAction::Wait);
        assert_eq!(hb.poll(start + Duration::from_secs(30)), HeartbeatAction::SendPing);
        // Still waiting for the pong, so no second ping
        assert_eq!(hb.poll(start + Duration::from_secs(31)), HeartbeatAction::Wait);
    }

    #[test]
    fn test_missing_pong_times_out() {
        let start = Instant::now();
        let mut hb = heartbeat(start);

        hb.poll(start + Duration::from_secs(30));
        assert_eq!(hb.poll(start + Duration::from_secs(39)), HeartbeatAction::Wait);
        assert_eq!(hb.poll(start + Duration::from_secs(40)), HeartbeatAction::TimedOut);
    }

    #[test]
    fn test_pong_resets_the_cycle() {
        let start = Instant::now();
        let mut hb = heartbeat(start);

        hb.poll(start + Duration::from_secs(30));
        hb.on_pong();
        assert_eq!(hb.poll(start + Duration::from_secs(45)), HeartbeatAction::Wait);
        assert_eq!(hb.poll(start + Duration::from_secs(60)), HeartbeatAction::SendPing);
    }

    #[test]
    fn test_check_period_is_fraction_of_shortest_window() {
        let hb = heartbeat(Instant::now());
        assert_eq!(hb.check_period(), Duration::from_millis(2500));
    }
}

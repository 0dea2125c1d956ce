//! Continuous-scan health checks.
//!
//! A long-running scan can go quiet without reporting an error: the adapter
//! stops delivering advertisements while the discovery session stays open.
//! Backends run a [`ScanWatchdog`] on a [`ScanHealthPolicy::check_interval`]
//! tick during continuous scans and restart discovery when it says so.

use std::time::Duration;

use tokio::time::Instant;

/// Timing and limits for the continuous-scan watchdog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanHealthPolicy {
    /// How often backends run the check.
    pub check_interval: Duration,
    /// Silence longer than this counts as a stalled scan.
    pub stall_threshold: Duration,
    /// Minimum time between two restarts.
    pub restart_backoff: Duration,
    /// Restarts allowed per scan; afterwards the scan is left running as is.
    pub max_restarts: u32,
}

impl Default for ScanHealthPolicy {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(5),
            stall_threshold: Duration::from_secs(45),
            restart_backoff: Duration::from_secs(30),
            max_restarts: 5,
        }
    }
}

/// Tracks scan activity and decides when a stalled scan should restart.
#[derive(Debug, Clone)]
pub struct ScanWatchdog {
    policy: ScanHealthPolicy,
    last_event: Instant,
    last_restart: Option<Instant>,
    restarts: u32,
}

impl ScanWatchdog {
    /// Start watching a scan that began at `started`.
    #[must_use]
    pub const fn new(policy: ScanHealthPolicy, started: Instant) -> Self {
        Self {
            policy,
            last_event: started,
            last_restart: None,
            restarts: 0,
        }
    }

    /// The policy in force.
    #[must_use]
    pub const fn policy(&self) -> &ScanHealthPolicy {
        &self.policy
    }

    /// Note that the scan produced something at `at`.
    pub fn record_event(&mut self, at: Instant) {
        self.last_event = at;
    }

    /// How long the scan has been silent.
    #[must_use]
    pub fn silent_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_event)
    }

    /// Whether the scan is stalled and a restart is allowed right now.
    #[must_use]
    pub fn should_restart(&self, now: Instant) -> bool {
        let backed_off = self
            .last_restart
            .map_or(true, |at| now.saturating_duration_since(at) > self.policy.restart_backoff);
        self.silent_for(now) > self.policy.stall_threshold
            && backed_off
            && self.restarts < self.policy.max_restarts
    }

    /// Note a restart at `at`; silence is measured from here on.
    pub fn record_restart(&mut self, at: Instant) {
        self.restarts += 1;
        self.last_restart = Some(at);
        self.last_event = at;
    }

    /// Restarts so far.
    #[must_use]
    pub const fn restarts(&self) -> u32 {
        self.restarts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> ScanHealthPolicy {
        ScanHealthPolicy {
            check_interval: Duration::from_secs(1),
            stall_threshold: Duration::from_secs(10),
            restart_backoff: Duration::from_secs(20),
            max_restarts: 2,
        }
    }

    #[test]
    fn test_quiet_scan_below_threshold_is_healthy() {
        let t0 = Instant::now();
        let mut watchdog = ScanWatchdog::new(policy(), t0);
        assert!(!watchdog.should_restart(t0 + Duration::from_secs(10)));

        watchdog.record_event(t0 + Duration::from_secs(8));
        assert!(!watchdog.should_restart(t0 + Duration::from_secs(15)));
        assert_eq!(watchdog.silent_for(t0 + Duration::from_secs(15)), Duration::from_secs(7));
    }

    #[test]
    fn test_stall_triggers_restart() {
        let t0 = Instant::now();
        let watchdog = ScanWatchdog::new(policy(), t0);
        assert!(watchdog.should_restart(t0 + Duration::from_secs(11)));
    }

    #[test]
    fn test_restart_backoff_and_cap() {
        let t0 = Instant::now();
        let mut watchdog = ScanWatchdog::new(policy(), t0);

        let first = t0 + Duration::from_secs(11);
        watchdog.record_restart(first);
        assert_eq!(watchdog.restarts(), 1);

        // stalled again, but still inside the backoff window
        assert!(!watchdog.should_restart(first + Duration::from_secs(15)));

        let second = first + Duration::from_secs(21);
        assert!(watchdog.should_restart(second));
        watchdog.record_restart(second);

        // cap reached
        assert!(!watchdog.should_restart(second + Duration::from_secs(60)));
        assert_eq!(watchdog.restarts(), 2);
    }

    #[test]
    fn test_default_policy() {
        let policy = ScanHealthPolicy::default();
        assert_eq!(policy.check_interval, Duration::from_secs(5));
        assert_eq!(policy.stall_threshold, Duration::from_secs(45));
        assert_eq!(policy.restart_backoff, Duration::from_secs(30));
        assert_eq!(policy.max_restarts, 5);
    }
}

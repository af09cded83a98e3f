//! Wall-clock gating of batch processing.
//!
//! Runs are confined to a UTC time-of-day window so batches land in
//! off-peak pricing hours. The window may wrap midnight (the default
//! one does: 16:30 to 00:00 UTC).

use chrono::{DateTime, NaiveTime, Utc};
use tracing::info;

#[derive(Debug, Clone, Copy)]
pub struct WindowConfig {
    pub enabled: bool,
    pub start: NaiveTime,
    pub stop: NaiveTime,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            start: NaiveTime::from_hms_opt(16, 30, 0).unwrap(),
            stop: NaiveTime::from_hms_opt(0, 0, 0).unwrap(),
        }
    }
}

pub struct TimeWindowGovernor {
    cfg: WindowConfig,
}

impl TimeWindowGovernor {
    pub fn new(cfg: WindowConfig) -> Self {
        Self { cfg }
    }

    /// Whether another project may be started at `now`. Consulted once
    /// per project, so a boundary crossed mid-project still lets the
    /// in-flight project finish.
    pub fn may_continue(&self, now: DateTime<Utc>) -> bool {
        if !self.cfg.enabled {
            return true;
        }
        let t = now.time();
        if self.cfg.start < self.cfg.stop {
            t >= self.cfg.start && t < self.cfg.stop
        } else {
            // Wraps midnight.
            t >= self.cfg.start || t < self.cfg.stop
        }
    }

    /// Blocks until the window's start boundary when governance is
    /// enabled and the window has not opened yet today.
    pub async fn wait_for_open(&self) {
        if !self.cfg.enabled {
            return;
        }
        let now = Utc::now();
        if self.may_continue(now) {
            return;
        }
        let t = now.time();
        if t < self.cfg.start {
            let wait = self.cfg.start.signed_duration_since(t);
            let secs = wait.num_seconds().max(0) as u64;
            info!(
                start = %self.cfg.start,
                wait_seconds = secs,
                "waiting for processing window to open"
            );
            tokio::time::sleep(std::time::Duration::from_secs(secs)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, h, m, 0).unwrap()
    }

    #[test]
    fn disabled_governance_always_continues() {
        let gov = TimeWindowGovernor::new(WindowConfig {
            enabled: false,
            ..WindowConfig::default()
        });
        assert!(gov.may_continue(at(3, 0)));
    }

    #[test]
    fn stop_before_now_halts_on_first_check() {
        let gov = TimeWindowGovernor::new(WindowConfig {
            enabled: true,
            start: NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
            stop: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
        });
        assert!(!gov.may_continue(at(11, 0)));
    }

    #[test]
    fn default_window_wraps_midnight() {
        let gov = TimeWindowGovernor::new(WindowConfig::default());
        assert!(gov.may_continue(at(17, 0)));
        assert!(gov.may_continue(at(23, 59)));
        assert!(!gov.may_continue(at(12, 0)));
        assert!(!gov.may_continue(at(0, 0)));
    }

    #[test]
    fn non_wrapping_window_bounds_are_half_open() {
        let gov = TimeWindowGovernor::new(WindowConfig {
            enabled: true,
            start: NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
            stop: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
        });
        assert!(gov.may_continue(at(8, 0)));
        assert!(gov.may_continue(at(9, 59)));
        assert!(!gov.may_continue(at(10, 0)));
        assert!(!gov.may_continue(at(7, 59)));
    }
}

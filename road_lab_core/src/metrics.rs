use std::time::{Duration, Instant};

use serde::Serialize;

/// Counters for one run. Reset at every run start.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Metrics {
    pub total_steps: u64,
    pub discoveries: u64,
    pub redundant_discoveries: u64,
    /// Tick on which the last agent reached its goal.
    pub finished_tick: Option<u64>,
    #[serde(skip)]
    pub started_at: Option<Instant>,
    #[serde(skip)]
    pub finished_at: Option<Instant>,
}

impl Metrics {
    /// Fresh counters with the clock started now.
    pub fn started() -> Self {
        Metrics {
            started_at: Some(Instant::now()),
            ..Metrics::default()
        }
    }

    pub fn record_step(&mut self) {
        self.total_steps += 1;
    }

    pub fn record_discovery(&mut self) {
        self.discoveries += 1;
    }

    pub fn record_redundant(&mut self) {
        self.redundant_discoveries += 1;
    }

    /// Marks the run finished. Only the first call has any effect; returns
    /// whether this call was it.
    pub fn finish(&mut self, tick: u64) -> bool {
        if self.finished_tick.is_some() {
            return false;
        }
        self.finished_tick = Some(tick);
        self.finished_at = Some(Instant::now());
        true
    }

    pub fn is_finished(&self) -> bool {
        self.finished_tick.is_some()
    }

    /// Share of discoveries that told the group something new, in percent.
    /// Zero when nothing was discovered.
    pub fn efficiency(&self) -> f64 {
        if self.discoveries == 0 {
            return 0.0;
        }
        (self.discoveries - self.redundant_discoveries) as f64 / self.discoveries as f64 * 100.0
    }

    /// Wall-clock time from start to finish, if the run has finished.
    pub fn duration(&self) -> Option<Duration> {
        Some(self.finished_at?.duration_since(self.started_at?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn efficiency_is_zero_without_discoveries() {
        assert_eq!(Metrics::default().efficiency(), 0.0);
    }

    #[test]
    fn efficiency_discounts_redundancy() {
        let mut metrics = Metrics::default();
        for _ in 0..4 {
            metrics.record_discovery();
        }
        metrics.record_redundant();
        assert!((metrics.efficiency() - 75.0).abs() < 1e-9);
    }

    #[test]
    fn finish_is_recorded_once() {
        let mut metrics = Metrics::started();
        assert!(metrics.duration().is_none());
        assert!(metrics.finish(10));
        let first = metrics.finished_at;
        assert!(!metrics.finish(20));
        assert_eq!(metrics.finished_tick, Some(10));
        assert_eq!(metrics.finished_at, first);
        assert!(metrics.duration().is_some());
    }

    #[test]
    fn unstarted_runs_have_no_duration() {
        let mut metrics = Metrics::default();
        metrics.finish(1);
        assert!(metrics.duration().is_none());
    }
}

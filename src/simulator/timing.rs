//! Timing results for benchmark scenarios.

use std::time::Duration;

/// Wall-clock timings for one scenario run: the aggregate plus one sample
/// per operation or batch, in execution order. Samples are appended and
/// never pruned or deduplicated.
#[derive(Debug, Clone)]
pub struct ScenarioResult {
    pub scenario: String,
    pub total: Duration,
    pub per_op: Vec<Duration>,
}

impl ScenarioResult {
    pub fn new(scenario: impl Into<String>, total: Duration, per_op: Vec<Duration>) -> Self {
        ScenarioResult {
            scenario: scenario.into(),
            total,
            per_op,
        }
    }

    pub fn secs(&self) -> f64 {
        self.total.as_secs_f64()
    }

    pub fn mean_op(&self) -> Option<Duration> {
        if self.per_op.is_empty() {
            return None;
        }
        Some(self.per_op.iter().sum::<Duration>() / self.per_op.len() as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mean_is_none_for_empty_run() {
        let result = ScenarioResult::new("noop", Duration::ZERO, vec![]);
        assert_eq!(result.mean_op(), None);
    }

    #[test]
    fn mean_averages_samples() {
        let result = ScenarioResult::new(
            "insertion",
            Duration::from_millis(30),
            vec![Duration::from_millis(10), Duration::from_millis(20)],
        );
        assert_eq!(result.mean_op(), Some(Duration::from_millis(15)));
    }
}

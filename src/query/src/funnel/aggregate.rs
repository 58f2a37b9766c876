use common::funnel::MedianKind;
use serde::Serialize;

use crate::funnel::attempt::FunnelAttempt;
use crate::funnel::breakdown::BreakdownKey;

/// Aggregated statistics of one step in one partition. Times are seconds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepResult {
    pub step: usize,
    pub count: u64,
    pub dropped_off: u64,
    // from the previous step, absent if nobody converted
    pub average_conversion_time: Option<f64>,
    pub median_conversion_time: Option<f64>,
    pub average_time_from_start: Option<f64>,
    pub conversion_ratio: f64,
    pub step_conversion_ratio: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub breakdown_value: Option<BreakdownKey>,
}

#[derive(Debug, Clone, Default, PartialEq)]
struct StepAccumulator {
    count: u64,
    // ms from the previous step
    deltas: Vec<i64>,
    // ms from the first step
    total_time_from_start: i128,
}

impl StepAccumulator {
    fn merge(&mut self, other: StepAccumulator) {
        self.count += other.count;
        self.deltas.extend(other.deltas);
        self.total_time_from_start += other.total_time_from_start;
    }
}

/// Per step counts and conversion times of selected attempts.
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregator {
    steps: Vec<StepAccumulator>,
}

impl Aggregator {
    pub fn new(steps_len: usize) -> Self {
        Self {
            steps: vec![StepAccumulator::default(); steps_len],
        }
    }

    pub fn push(&mut self, attempt: &FunnelAttempt) {
        let steps = attempt.steps();
        for (stage, step) in steps.iter().enumerate().take(self.steps.len()) {
            let acc = &mut self.steps[stage];
            acc.count += 1;
            if stage > 0 {
                acc.deltas.push(step.ts - steps[stage - 1].ts);
                acc.total_time_from_start += (step.ts - steps[0].ts) as i128;
            }
        }
    }

    pub fn merge(&mut self, other: Aggregator) {
        for (acc, other) in self.steps.iter_mut().zip(other.steps) {
            acc.merge(other);
        }
    }

    /// Actors that reached the first step.
    pub fn total(&self) -> u64 {
        self.steps.first().map(|s| s.count).unwrap_or_default()
    }

    pub fn finalize(mut self, median_kind: MedianKind, breakdown: Option<BreakdownKey>) -> Vec<StepResult> {
        let first = self.total();
        let counts = self.steps.iter().map(|s| s.count).collect::<Vec<_>>();

        self.steps
            .iter_mut()
            .enumerate()
            .map(|(idx, acc)| {
                let (average, median_time, from_start) = if idx == 0 || acc.deltas.is_empty() {
                    (None, None, None)
                } else {
                    let n = acc.deltas.len() as f64;
                    let sum = acc.deltas.iter().map(|d| *d as i128).sum::<i128>();
                    (
                        Some(sum as f64 / n / 1000.),
                        median(&mut acc.deltas, median_kind).map(|v| v / 1000.),
                        Some(acc.total_time_from_start as f64 / n / 1000.),
                    )
                };
                let next = counts.get(idx + 1).copied().unwrap_or(acc.count);
                let prev = if idx == 0 { acc.count } else { counts[idx - 1] };

                StepResult {
                    step: idx,
                    count: acc.count,
                    dropped_off: acc.count.saturating_sub(next),
                    average_conversion_time: average,
                    median_conversion_time: median_time,
                    average_time_from_start: from_start,
                    conversion_ratio: ratio(acc.count, first),
                    step_conversion_ratio: if idx == 0 && acc.count > 0 {
                        1.
                    } else {
                        ratio(acc.count, prev)
                    },
                    breakdown_value: breakdown.clone(),
                }
            })
            .collect()
    }
}

fn ratio(a: u64, b: u64) -> f64 {
    if b == 0 { 0. } else { a as f64 / b as f64 }
}

/// Median of `values` in ms. Sorts in place.
pub fn median(values: &mut [i64], kind: MedianKind) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_unstable();
    let n = values.len();
    if n % 2 == 1 {
        return Some(values[n / 2] as f64);
    }

    match kind {
        MedianKind::Midpoint => {
            Some((values[n / 2 - 1] as f64 + values[n / 2] as f64) / 2.)
        }
        MedianKind::Lower => Some(values[n / 2 - 1] as f64),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::funnel::attempt::Step;

    fn attempt(ts: &[i64]) -> FunnelAttempt {
        FunnelAttempt::new(
            ts.iter()
                .enumerate()
                .map(|(step, ts)| Step {
                    step,
                    ts: *ts * 1000,
                    row_id: step,
                })
                .collect(),
        )
    }

    #[test]
    fn test_median() {
        assert_eq!(median(&mut [], MedianKind::Midpoint), None);
        assert_eq!(median(&mut [3, 1, 2], MedianKind::Midpoint), Some(2.));
        assert_eq!(median(&mut [7200, 3600], MedianKind::Midpoint), Some(5400.));
        assert_eq!(median(&mut [7200, 3600], MedianKind::Lower), Some(3600.));
        assert_eq!(median(&mut [4, 1, 3, 2], MedianKind::Lower), Some(2.));
    }

    #[test]
    fn test_aggregate() {
        let mut agg = Aggregator::new(3);
        agg.push(&attempt(&[0, 3600, 10800]));
        agg.push(&attempt(&[100, 7300]));
        agg.push(&attempt(&[50]));

        let res = agg.finalize(MedianKind::Midpoint, None);
        let counts = res.iter().map(|r| r.count).collect::<Vec<_>>();
        assert_eq!(counts, vec![3, 2, 1]);
        let dropped = res.iter().map(|r| r.dropped_off).collect::<Vec<_>>();
        assert_eq!(dropped, vec![1, 1, 0]);

        assert_eq!(res[0].average_conversion_time, None);
        assert_eq!(res[0].median_conversion_time, None);
        assert_eq!(res[0].step_conversion_ratio, 1.);
        assert_eq!(res[1].average_conversion_time, Some(5400.));
        assert_eq!(res[1].median_conversion_time, Some(5400.));
        assert_eq!(res[2].average_conversion_time, Some(7200.));
        assert_eq!(res[2].average_time_from_start, Some(10800.));
        assert_eq!(res[2].conversion_ratio, 1. / 3.);
        assert_eq!(res[2].step_conversion_ratio, 0.5);
    }

    #[test]
    fn test_empty() {
        let res = Aggregator::new(2).finalize(MedianKind::Midpoint, None);
        assert_eq!(res.len(), 2);
        for r in res {
            assert_eq!(r.count, 0);
            assert_eq!(r.average_conversion_time, None);
            assert_eq!(r.median_conversion_time, None);
            assert_eq!(r.conversion_ratio, 0.);
            assert_eq!(r.step_conversion_ratio, 0.);
        }
    }

    #[test]
    fn test_merge_equals_single() {
        let attempts = vec![
            attempt(&[0, 60, 120]),
            attempt(&[0, 30]),
            attempt(&[10, 40, 400]),
            attempt(&[5]),
        ];
        let mut single = Aggregator::new(3);
        attempts.iter().for_each(|a| single.push(a));

        let mut left = Aggregator::new(3);
        let mut right = Aggregator::new(3);
        attempts[..2].iter().for_each(|a| left.push(a));
        attempts[2..].iter().for_each(|a| right.push(a));
        right.merge(left);

        assert_eq!(
            single.finalize(MedianKind::Midpoint, None),
            right.finalize(MedianKind::Midpoint, None)
        );
    }
}

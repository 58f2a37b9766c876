use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use ahash::RandomState;
use common::event::Event;
use common::funnel::MedianKind;
use common::funnel::Touch;
use serde::Serialize;

use crate::funnel::aggregate::Aggregator;
use crate::funnel::aggregate::StepResult;
use crate::funnel::attempt::FunnelAttempt;

/// Breakdown value of an actor, one entry per breakdown property.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct BreakdownKey(pub Vec<String>);

impl fmt::Display for BreakdownKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join(", "))
    }
}

impl From<&str> for BreakdownKey {
    fn from(v: &str) -> Self {
        BreakdownKey(vec![v.to_string()])
    }
}

impl From<Vec<String>> for BreakdownKey {
    fn from(v: Vec<String>) -> Self {
        BreakdownKey(v)
    }
}

/// Computes the breakdown value of an actor from their selected attempt.
pub trait BreakdownResolver: Send + Sync + fmt::Debug {
    fn resolve(&self, events: &[Event], attempt: &FunnelAttempt) -> BreakdownKey;
}

pub type BreakdownRef = Arc<dyn BreakdownResolver>;

/// Property values of the event at the touched step. Missing values are empty strings.
#[derive(Debug, Clone)]
pub struct PropertyBreakdown {
    properties: Vec<String>,
    touch: Touch,
}

impl PropertyBreakdown {
    pub fn new(properties: Vec<String>, touch: Touch) -> Self {
        Self { properties, touch }
    }
}

impl BreakdownResolver for PropertyBreakdown {
    fn resolve(&self, events: &[Event], attempt: &FunnelAttempt) -> BreakdownKey {
        let step = match &self.touch {
            Touch::First => attempt.steps().first(),
            Touch::Last => attempt.steps().last(),
            Touch::Step { step } => attempt.find_step(*step),
        };
        let event = step.and_then(|s| events.get(s.row_id));

        let values = self
            .properties
            .iter()
            .map(|prop| {
                event
                    .and_then(|e| e.property(prop))
                    .map(|v| v.to_string())
                    .unwrap_or_default()
            })
            .collect();

        BreakdownKey(values)
    }
}

/// Aggregators per breakdown value. Without a breakdown there is a single `None` partition.
#[derive(Debug, Clone)]
pub struct Partitioner {
    steps_len: usize,
    partitions: HashMap<Option<BreakdownKey>, Aggregator, RandomState>,
}

impl Partitioner {
    pub fn new(steps_len: usize) -> Self {
        Self {
            steps_len,
            partitions: HashMap::default(),
        }
    }

    pub fn push(&mut self, key: Option<BreakdownKey>, attempt: &FunnelAttempt) {
        self.partitions
            .entry(key)
            .or_insert_with(|| Aggregator::new(self.steps_len))
            .push(attempt);
    }

    pub fn merge(&mut self, other: Partitioner) {
        for (key, agg) in other.partitions {
            match self.partitions.get_mut(&key) {
                Some(existing) => existing.merge(agg),
                None => {
                    self.partitions.insert(key, agg);
                }
            }
        }
    }

    /// Result rows per partition, largest partitions first.
    /// An empty population yields one key-less row of zeros, breakdown or not.
    pub fn finalize(self, median: MedianKind) -> Vec<Vec<StepResult>> {
        let mut partitions = self.partitions.into_iter().collect::<Vec<_>>();
        if partitions.is_empty() {
            partitions.push((None, Aggregator::new(self.steps_len)));
        }
        partitions.sort_by(|(ka, a), (kb, b)| b.total().cmp(&a.total()).then_with(|| ka.cmp(kb)));

        partitions
            .into_iter()
            .map(|(key, agg)| agg.finalize(median, key))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use chrono::DateTime;

    use super::*;
    use crate::funnel::attempt::Step;

    fn events() -> Vec<Event> {
        let ts = DateTime::from_timestamp(0, 0).unwrap();
        vec![
            Event::new("e1", ts).with_property("country", "de"),
            Event::new("e2", ts).with_property("country", "us").with_property("os", "ios"),
            Event::new("e3", ts).with_property("country", "uk"),
        ]
    }

    fn attempt(rows: &[usize]) -> FunnelAttempt {
        FunnelAttempt::new(
            rows.iter()
                .enumerate()
                .map(|(step, row_id)| Step {
                    step,
                    ts: *row_id as i64,
                    row_id: *row_id,
                })
                .collect(),
        )
    }

    #[test]
    fn test_property_breakdown() {
        let cases = vec![
            (Touch::First, vec!["de", ""]),
            (Touch::Last, vec!["us", "ios"]),
            (Touch::Step { step: 1 }, vec!["us", "ios"]),
            (Touch::Step { step: 2 }, vec!["", ""]),
        ];

        let events = events();
        let attempt = attempt(&[0, 1]);
        for (touch, exp) in cases {
            let b = PropertyBreakdown::new(vec!["country".to_string(), "os".to_string()], touch.clone());
            let exp = BreakdownKey(exp.into_iter().map(String::from).collect());
            assert_eq!(b.resolve(&events, &attempt), exp, "touch {touch:?}");
        }
    }

    #[test]
    fn test_partitions_order() {
        let mut p = Partitioner::new(2);
        p.push(Some("b".into()), &attempt(&[0]));
        p.push(Some("a".into()), &attempt(&[0, 1]));
        p.push(Some("c".into()), &attempt(&[0]));
        p.push(Some("c".into()), &attempt(&[0]));

        let mut other = Partitioner::new(2);
        other.push(Some("b".into()), &attempt(&[0, 1]));
        p.merge(other);

        let res = p.finalize(MedianKind::Midpoint);
        let keys = res
            .iter()
            .map(|rows| rows[0].breakdown_value.clone().unwrap().to_string())
            .collect::<Vec<_>>();
        assert_eq!(keys, vec!["b", "c", "a"]);
        assert_eq!(res[0][1].count, 1);
    }

    #[test]
    fn test_empty_population() {
        let res = Partitioner::new(3).finalize(MedianKind::Midpoint);
        assert_eq!(res.len(), 1);
        assert!(res[0].iter().all(|r| r.count == 0 && r.breakdown_value.is_none()));
        assert!(res[0].iter().all(|r| r.average_conversion_time.is_none()));
    }
}

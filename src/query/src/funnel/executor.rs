use std::collections::HashSet;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

use common::event::ActorEvents;
use common::event::Event;
use common::event::RawEvent;
use common::ActorId;
use common::types::METRIC_FUNNEL_ACTORS_PROCESSED_TOTAL;
use common::types::METRIC_FUNNEL_EVENTS_SKIPPED_TOTAL;
use common::types::METRIC_FUNNEL_EXECUTION_TIME_MS;
use crossbeam::channel::bounded;
use metrics::counter;
use metrics::histogram;
use tracing::debug;
use tracing::instrument;
use tracing::warn;

use crate::error::QueryError;
use crate::error::Result;
use crate::funnel::aggregate::StepResult;
use crate::funnel::attempt::AttemptBuilder;
use crate::funnel::attribution::ActorIndex;
use crate::funnel::breakdown::BreakdownKey;
use crate::funnel::breakdown::Partitioner;
use crate::funnel::selector::select;
use crate::funnel::selector::ActorResult;
use crate::funnel::Funnel;

/// Cooperative cancellation of a running pass. Checked between actors.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone)]
pub struct FunnelOutput {
    // one row set per breakdown value, largest first
    pub partitions: Vec<Vec<StepResult>>,
    pub actors: ActorIndex,
    pub processed_actors: usize,
    pub skipped_events: usize,
    // results cover only the processed actors
    pub cancelled: bool,
}

impl FunnelOutput {
    /// Rows of the first partition, the only one without breakdown.
    pub fn steps(&self) -> &[StepResult] {
        self.partitions.first().map(|p| p.as_slice()).unwrap_or_default()
    }

    pub fn partition(&self, key: &BreakdownKey) -> Option<&[StepResult]> {
        self.partitions
            .iter()
            .find(|rows| rows.first().and_then(|r| r.breakdown_value.as_ref()) == Some(key))
            .map(|rows| rows.as_slice())
    }

    pub fn actors_at(
        &self,
        step: usize,
        key: Option<&BreakdownKey>,
    ) -> HashSet<ActorId> {
        self.actors.actors_at(step, key)
    }
}

// worker local state, reduced once all workers are done
struct Partial {
    partitioner: Partitioner,
    actors: ActorIndex,
    processed: usize,
    skipped: usize,
}

impl Partial {
    fn new(funnel: &Funnel) -> Self {
        Self {
            partitioner: Partitioner::new(funnel.steps().len()),
            actors: ActorIndex::new(),
            processed: 0,
            skipped: 0,
        }
    }

    fn push(&mut self, funnel: &Funnel, actor: ActorEvents) {
        let (result, skipped) = funnel.evaluate_actor(actor);
        self.processed += 1;
        self.skipped += skipped;
        if let Some(result) = result {
            self.partitioner.push(result.breakdown.clone(), &result.attempt);
            self.actors.push(&result);
        }
    }

    fn merge(&mut self, other: Partial) {
        self.partitioner.merge(other.partitioner);
        self.actors.merge(other.actors);
        self.processed += other.processed;
        self.skipped += other.skipped;
    }
}

/// Validates and orders the events of one actor. Malformed events are dropped.
pub fn normalize(actor: &str, events: Vec<RawEvent>) -> (Vec<Event>, usize) {
    let mut skipped = 0;
    let mut out = Vec::with_capacity(events.len());
    for raw in events {
        match Event::try_from(raw) {
            Ok(e) => out.push(e),
            Err(err) => {
                warn!(actor, "skipping event: {err}");
                skipped += 1;
            }
        }
    }
    out.sort_by_key(|e| e.ts);

    (out, skipped)
}

impl Funnel {
    /// Selected attempt of one actor, if they ever matched the first step.
    pub fn evaluate_actor(&self, actor: ActorEvents) -> (Option<ActorResult>, usize) {
        let (events, skipped) = normalize(&actor.actor, actor.events);
        let attempts =
            AttemptBuilder::new(self.steps(), self.window(), self.order(), self.exclude())
                .build(&events);

        let result = select(attempts).map(|attempt| {
            let breakdown = self
                .breakdown()
                .map(|b| b.resolve(&events, &attempt));
            ActorResult {
                actor: actor.actor,
                attempt,
                breakdown,
            }
        });

        (result, skipped)
    }

    pub fn run<I>(&self, population: I) -> Result<FunnelOutput>
    where I: IntoIterator<Item = ActorEvents> {
        self.run_with_cancel(population, &CancelHandle::new())
    }

    #[instrument(level = "debug", skip_all)]
    pub fn run_with_cancel<I>(&self, population: I, cancel: &CancelHandle) -> Result<FunnelOutput>
    where I: IntoIterator<Item = ActorEvents> {
        let start = Instant::now();
        let partial = if self.workers() == 1 {
            let mut partial = Partial::new(self);
            for actor in population {
                if cancel.is_cancelled() {
                    break;
                }
                partial.push(self, actor);
            }
            partial
        } else {
            self.run_parallel(population.into_iter(), cancel)?
        };

        let cancelled = cancel.is_cancelled();
        counter!(METRIC_FUNNEL_ACTORS_PROCESSED_TOTAL).increment(partial.processed as u64);
        counter!(METRIC_FUNNEL_EVENTS_SKIPPED_TOTAL).increment(partial.skipped as u64);
        let elapsed = start.elapsed();
        histogram!(METRIC_FUNNEL_EXECUTION_TIME_MS).record(elapsed.as_millis() as f64);
        debug!(
            actors = partial.processed,
            skipped_events = partial.skipped,
            cancelled,
            "elapsed: {:?}",
            elapsed
        );

        Ok(FunnelOutput {
            partitions: partial.partitioner.finalize(self.median()),
            actors: partial.actors,
            processed_actors: partial.processed,
            skipped_events: partial.skipped,
            cancelled,
        })
    }

    fn run_parallel<I>(&self, population: I, cancel: &CancelHandle) -> Result<Partial>
    where I: Iterator<Item = ActorEvents> {
        let workers = self.workers();
        let batch_size = self.batch_size();
        let (tx, rx) = bounded::<Vec<ActorEvents>>(workers * 2);

        crossbeam::scope(|s| {
            let handles = (0..workers)
                .map(|_| {
                    let rx = rx.clone();
                    s.spawn(move |_| {
                        let mut partial = Partial::new(self);
                        while let Ok(batch) = rx.recv() {
                            for actor in batch {
                                if cancel.is_cancelled() {
                                    break;
                                }
                                partial.push(self, actor);
                            }
                        }
                        partial
                    })
                })
                .collect::<Vec<_>>();
            drop(rx);

            let mut batch = Vec::with_capacity(batch_size);
            for actor in population {
                if cancel.is_cancelled() {
                    break;
                }
                batch.push(actor);
                if batch.len() == batch_size {
                    let full = std::mem::replace(&mut batch, Vec::with_capacity(batch_size));
                    if tx.send(full).is_err() {
                        break;
                    }
                }
            }
            if !batch.is_empty() {
                // all workers gone means they panicked, join reports it
                let _ = tx.send(batch);
            }
            drop(tx);

            let mut out = Partial::new(self);
            for h in handles {
                let partial = h
                    .join()
                    .map_err(|_| QueryError::Internal("funnel worker panicked".to_string()))?;
                out.merge(partial);
            }

            Ok::<_, QueryError>(out)
        })
        .map_err(|_| QueryError::Internal("funnel workers panicked".to_string()))?
    }
}

#[cfg(test)]
mod tests {
    use common::funnel::TimeIntervalUnit;
    use tracing_test::traced_test;

    use super::*;
    use crate::event_eq;
    use crate::funnel::ConversionWindow;
    use crate::funnel::Options;
    use crate::test_util::parse_markdown_events;

    fn funnel(workers: usize) -> Funnel {
        let mut opts = Options::new(
            event_eq!("e1", "e2"),
            ConversionWindow::try_new(1, TimeIntervalUnit::Hour).unwrap(),
        );
        opts.workers = workers;
        opts.batch_size = 2;
        Funnel::try_new(opts).unwrap()
    }

    #[traced_test]
    #[test]
    fn test_normalize_skips_and_sorts() {
        let data = r#"
| actor | ts                  | event |
|-------|---------------------|-------|
| 1     | 2020-01-01 12:10:00 | e2    |
| 1     | 2020-01-01 12:00:00 | e1    |
| 1     |                     | e1    |
| 1     | 2020-01-01 12:05:00 |       |
"#;
        let actors = parse_markdown_events(data).unwrap();
        let (events, skipped) = normalize("1", actors[0].events.clone());
        assert_eq!(skipped, 2);
        let names = events.iter().map(|e| e.event.as_str()).collect::<Vec<_>>();
        assert_eq!(names, vec!["e1", "e2"]);
        assert!(logs_contain("skipping event"));
    }

    #[test]
    fn test_evaluate_actor_without_first_step() {
        let actor = ActorEvents::new("1", vec![RawEvent {
            actor: Some("1".to_string()),
            event: Some("e2".to_string()),
            ts: chrono::DateTime::from_timestamp(0, 0),
            ..Default::default()
        }]);
        let (res, skipped) = funnel(1).evaluate_actor(actor);
        assert!(res.is_none());
        assert_eq!(skipped, 0);
    }

    #[test]
    fn test_parallel_equals_single() -> anyhow::Result<()> {
        let data = r#"
| actor | ts                  | event |
|-------|---------------------|-------|
| 1     | 2020-01-01 12:00:00 | e1    |
| 1     | 2020-01-01 12:10:00 | e2    |
| 2     | 2020-01-01 12:00:00 | e1    |
| 3     | 2020-01-01 12:00:00 | e1    |
| 3     | 2020-01-01 12:30:00 | e2    |
| 4     | 2020-01-01 12:00:00 | e2    |
| 5     | 2020-01-01 12:00:00 | e1    |
| 5     | 2020-01-01 14:00:00 | e2    |
"#;
        let single = funnel(1).run(parse_markdown_events(data)?)?;
        let parallel = funnel(3).run(parse_markdown_events(data)?)?;

        assert_eq!(single.partitions, parallel.partitions);
        assert_eq!(single.actors, parallel.actors);
        assert_eq!(single.processed_actors, 5);
        assert_eq!(parallel.processed_actors, 5);
        assert_eq!(single.steps()[0].count, 4);
        assert_eq!(single.steps()[1].count, 2);
        assert_eq!(single.steps()[1].average_conversion_time, Some(1200.));

        Ok(())
    }

    #[test]
    fn test_cancelled_before_start() -> anyhow::Result<()> {
        let data = r#"
| actor | ts                  | event |
|-------|---------------------|-------|
| 1     | 2020-01-01 12:00:00 | e1    |
| 2     | 2020-01-01 12:00:00 | e1    |
"#;
        for workers in [1, 2] {
            let cancel = CancelHandle::new();
            cancel.cancel();
            let out = funnel(workers).run_with_cancel(parse_markdown_events(data)?, &cancel)?;
            assert!(out.cancelled);
            assert_eq!(out.processed_actors, 0);
            assert_eq!(out.steps()[0].count, 0);
        }

        Ok(())
    }
}

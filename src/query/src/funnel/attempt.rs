use common::event::Event;
use common::funnel::OrderType;
use tracing::trace;

use crate::funnel::matcher::matches;
use crate::funnel::ConversionWindow;
use crate::funnel::ExcludeDefinition;
use crate::funnel::StepDefinition;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum DebugStep {
    NewAttempt,
    Step,
    // strict order: an earlier step matched again, attempt can't advance anymore
    Blocked,
    ExcludeViolation,
    OutOfWindow,
    Complete,
}

/// One reached step of an attempt.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct Step {
    // step definition index
    pub step: usize,
    // ms
    pub ts: i64,
    // position of the event in the actor's sequence
    pub row_id: usize,
}

/// One traversal of the funnel anchored at a single first-step match.
/// Steps are in reaching order, so `steps[k]` is where the attempt entered stage k.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct FunnelAttempt {
    steps: Vec<Step>,
}

impl FunnelAttempt {
    pub fn new(steps: Vec<Step>) -> Self {
        Self { steps }
    }

    /// Number of reached steps.
    #[inline]
    pub fn depth(&self) -> usize {
        self.steps.len()
    }

    #[inline]
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn start(&self) -> i64 {
        self.steps.first().map(|s| s.ts).unwrap_or_default()
    }

    pub fn last_ts(&self) -> i64 {
        self.steps.last().map(|s| s.ts).unwrap_or_default()
    }

    /// Reached step by its definition index.
    pub fn find_step(&self, step: usize) -> Option<&Step> {
        self.steps.iter().find(|s| s.step == step)
    }
}

#[derive(Debug, Clone)]
struct InProgress {
    steps: Vec<Step>,
    // unordered: which definitions are already taken
    taken: Vec<bool>,
    // the attempt can't reach anything after this ts
    expires: i64,
    blocked: bool,
}

impl InProgress {
    fn new(step: Step, steps_len: usize, expires: i64) -> Self {
        let mut taken = vec![false; steps_len];
        taken[step.step] = true;
        let mut steps = Vec::with_capacity(steps_len);
        steps.push(step);

        Self {
            steps,
            taken,
            expires,
            blocked: false,
        }
    }

    #[inline]
    fn start(&self) -> i64 {
        self.steps[0].ts
    }

    fn finish(mut self, order: OrderType) -> FunnelAttempt {
        if order == OrderType::Unordered {
            self.steps.sort_by_key(|s| (s.ts, s.row_id));
        }

        FunnelAttempt::new(self.steps)
    }
}

enum Advance {
    Continue,
    Complete,
    Excluded,
}

/// Walks one actor's events and produces every attempt they made.
pub struct AttemptBuilder<'a> {
    steps: &'a [StepDefinition],
    window: ConversionWindow,
    order: OrderType,
    exclude: &'a [ExcludeDefinition],
    debug: Option<Vec<(usize, DebugStep)>>,
}

impl<'a> AttemptBuilder<'a> {
    pub fn new(
        steps: &'a [StepDefinition],
        window: ConversionWindow,
        order: OrderType,
        exclude: &'a [ExcludeDefinition],
    ) -> Self {
        Self {
            steps,
            window,
            order,
            exclude,
            debug: None,
        }
    }

    /// Records every decision as (row_id, step) for inspection.
    pub fn with_debug(mut self) -> Self {
        self.debug = Some(Vec::with_capacity(100));
        self
    }

    pub fn debug(&self) -> &[(usize, DebugStep)] {
        self.debug.as_deref().unwrap_or_default()
    }

    #[inline]
    fn step_window(&self, step: usize) -> ConversionWindow {
        self.steps[step].window.unwrap_or(self.window)
    }

    fn expires(&self, start: i64) -> i64 {
        self.steps
            .iter()
            .map(|s| s.window.unwrap_or(self.window).end(start))
            .max()
            .unwrap_or(start)
    }

    fn push_debug(&mut self, row_id: usize, step: DebugStep) {
        if let Some(debug) = &mut self.debug {
            debug.push((row_id, step));
        }
    }

    /// `events` must be sorted by timestamp.
    pub fn build(&mut self, events: &[Event]) -> Vec<FunnelAttempt> {
        let steps_len = self.steps.len();
        let mut active: Vec<InProgress> = Vec::new();
        let mut done: Vec<FunnelAttempt> = Vec::new();
        let mut last_seed: Option<i64> = None;
        let mut matched = vec![false; steps_len];
        let mut excluded = vec![false; self.exclude.len()];

        for (row_id, event) in events.iter().enumerate() {
            let ts = event.ts_millis();
            for (idx, step) in self.steps.iter().enumerate() {
                matched[idx] = matches(event, step);
            }
            for (idx, excl) in self.exclude.iter().enumerate() {
                excluded[idx] = excl.predicate.evaluate(event);
            }

            // finalize attempts whose window is over
            let mut idx = 0;
            while idx < active.len() {
                if ts > active[idx].expires {
                    let attempt = active.swap_remove(idx);
                    self.push_debug(row_id, DebugStep::OutOfWindow);
                    done.push(attempt.finish(self.order));
                } else {
                    idx += 1;
                }
            }

            let mut idx = 0;
            while idx < active.len() {
                match self.advance(&mut active[idx], row_id, ts, &matched, &excluded) {
                    Advance::Continue => idx += 1,
                    Advance::Complete => {
                        let attempt = active.swap_remove(idx);
                        self.push_debug(row_id, DebugStep::Complete);
                        done.push(attempt.finish(self.order));
                    }
                    Advance::Excluded => {
                        active.swap_remove(idx);
                        self.push_debug(row_id, DebugStep::ExcludeViolation);
                    }
                }
            }

            // the same event may also open a new attempt
            let seed = match self.order {
                OrderType::Strict | OrderType::Sequential => matched[0].then_some(0),
                OrderType::Unordered => matched.iter().position(|m| *m),
            };
            if let Some(step) = seed {
                if last_seed == Some(ts) {
                    continue;
                }
                last_seed = Some(ts);
                self.push_debug(row_id, DebugStep::NewAttempt);
                let attempt =
                    InProgress::new(Step { step, ts, row_id }, steps_len, self.expires(ts));
                if steps_len == 1 {
                    self.push_debug(row_id, DebugStep::Complete);
                    done.push(attempt.finish(self.order));
                } else {
                    active.push(attempt);
                }
            }
        }

        for attempt in active {
            done.push(attempt.finish(self.order));
        }
        trace!(attempts = done.len(), "attempts built");

        done
    }

    fn advance(
        &mut self,
        attempt: &mut InProgress,
        row_id: usize,
        ts: i64,
        matched: &[bool],
        excluded: &[bool],
    ) -> Advance {
        let depth = attempt.steps.len();
        let start = attempt.start();

        let next = match self.order {
            OrderType::Strict => (!attempt.blocked
                && matched[depth]
                && self.step_window(depth).contains(start, ts))
            .then_some(depth),
            OrderType::Sequential => {
                (matched[depth] && self.step_window(depth).contains(start, ts)).then_some(depth)
            }
            OrderType::Unordered => (0..self.steps.len()).find(|idx| {
                matched[*idx] && !attempt.taken[*idx] && self.step_window(*idx).contains(start, ts)
            }),
        };

        if let Some(step) = next {
            attempt.steps.push(Step { step, ts, row_id });
            attempt.taken[step] = true;
            self.push_debug(row_id, DebugStep::Step);
            if attempt.steps.len() == self.steps.len() {
                return Advance::Complete;
            }
            return Advance::Continue;
        }

        // waiting between stage depth-1 and stage depth
        for (idx, excl) in self.exclude.iter().enumerate() {
            if !excluded[idx] {
                continue;
            }
            let applies = match excl.steps {
                None => true,
                Some(steps) => steps.from < depth && depth <= steps.to,
            };
            if applies {
                return Advance::Excluded;
            }
        }

        // a repeat at the timestamp of the last reached step is not in between steps
        if self.order == OrderType::Strict
            && !attempt.blocked
            && ts > attempt.steps[depth - 1].ts
            && matched[..depth].iter().any(|m| *m)
        {
            attempt.blocked = true;
            self.push_debug(row_id, DebugStep::Blocked);
        }

        Advance::Continue
    }
}

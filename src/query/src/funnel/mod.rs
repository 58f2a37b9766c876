use common::config;
use common::event::Event;
use common::funnel::ExcludeSteps;
use common::funnel::MedianKind;
use common::funnel::OrderType;

use crate::error::QueryError;
use crate::error::Result;
use crate::funnel::breakdown::BreakdownRef;
use crate::funnel::matcher::predicate_fn;
use crate::funnel::matcher::PredicateRef;

pub mod aggregate;
pub mod attempt;
pub mod attribution;
pub mod breakdown;
pub mod executor;
pub mod matcher;
pub mod selector;
mod window;

pub use aggregate::StepResult;
pub use attempt::DebugStep;
pub use attempt::FunnelAttempt;
pub use attribution::ActorIndex;
pub use breakdown::BreakdownKey;
pub use executor::CancelHandle;
pub use executor::FunnelOutput;
pub use window::ConversionWindow;

#[derive(Debug, Clone)]
pub struct StepDefinition {
    pub index: usize,
    pub predicate: PredicateRef,
    // overrides the funnel window for this step, measured from the first step
    pub window: Option<ConversionWindow>,
}

#[derive(Debug, Clone)]
pub struct ExcludeDefinition {
    pub predicate: PredicateRef,
    // between all steps if not set
    pub steps: Option<ExcludeSteps>,
}

#[derive(Debug, Clone)]
pub struct Options {
    pub steps: Vec<StepDefinition>,
    pub window: ConversionWindow,
    pub order: OrderType,
    pub exclude: Option<Vec<ExcludeDefinition>>,
    pub breakdown: Option<BreakdownRef>,
    pub median: MedianKind,
    pub workers: usize,
    pub batch_size: usize,
}

impl Options {
    pub fn new(steps: Vec<StepDefinition>, window: ConversionWindow) -> Self {
        let engine = config::Engine::default();
        Self {
            steps,
            window,
            order: OrderType::default(),
            exclude: None,
            breakdown: None,
            median: engine.median,
            workers: engine.workers,
            batch_size: engine.batch_size,
        }
    }
}

/// Validated funnel ready to run over a population.
#[derive(Debug, Clone)]
pub struct Funnel {
    steps: Vec<StepDefinition>,
    window: ConversionWindow,
    order: OrderType,
    exclude: Vec<ExcludeDefinition>,
    breakdown: Option<BreakdownRef>,
    median: MedianKind,
    workers: usize,
    batch_size: usize,
}

impl Funnel {
    pub fn try_new(opts: Options) -> Result<Self> {
        let mut steps = opts.steps;
        if steps.is_empty() {
            return Err(QueryError::InvalidStepDefinition(
                "funnel should have at least one step".to_string(),
            ));
        }
        steps.sort_by_key(|s| s.index);
        for (idx, step) in steps.iter().enumerate() {
            if step.index != idx {
                return Err(QueryError::InvalidStepDefinition(format!(
                    "step indices should be contiguous from 0, expected {idx}, got {}",
                    step.index
                )));
            }
        }

        let exclude = opts.exclude.unwrap_or_default();
        for excl in exclude.iter() {
            if let Some(s) = &excl.steps {
                if s.from >= s.to || s.to >= steps.len() {
                    return Err(QueryError::InvalidStepDefinition(format!(
                        "invalid exclusion steps {}..{} for {} steps",
                        s.from,
                        s.to,
                        steps.len()
                    )));
                }
            }
        }

        Ok(Self {
            steps,
            window: opts.window,
            order: opts.order,
            exclude,
            breakdown: opts.breakdown,
            median: opts.median,
            workers: opts.workers.max(1),
            batch_size: opts.batch_size.max(1),
        })
    }

    pub fn steps(&self) -> &[StepDefinition] {
        &self.steps
    }

    pub fn window(&self) -> ConversionWindow {
        self.window
    }

    pub fn order(&self) -> OrderType {
        self.order
    }

    pub fn exclude(&self) -> &[ExcludeDefinition] {
        &self.exclude
    }

    pub fn breakdown(&self) -> Option<&BreakdownRef> {
        self.breakdown.as_ref()
    }

    pub fn median(&self) -> MedianKind {
        self.median
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }
}

pub fn event_eq_(event: &str) -> PredicateRef {
    let name = event.to_string();
    predicate_fn(format!("event = {event}"), move |e: &Event| e.event == name)
}

pub fn steps_from(predicates: Vec<PredicateRef>) -> Vec<StepDefinition> {
    predicates
        .into_iter()
        .enumerate()
        .map(|(index, predicate)| StepDefinition {
            index,
            predicate,
            window: None,
        })
        .collect()
}

#[macro_export]
macro_rules! event_eq {
    ($($name:literal),+) => {
        $crate::funnel::steps_from(vec![
            $($crate::funnel::event_eq_($name),)+
            ])
        }
    }

#[cfg(test)]
mod tests {
    use common::funnel::ExcludeSteps;
    use common::funnel::TimeIntervalUnit;

    use super::*;

    fn window() -> ConversionWindow {
        ConversionWindow::try_new(1, TimeIntervalUnit::Day).unwrap()
    }

    #[test]
    fn test_steps_are_sorted_by_index() {
        let mut steps = event_eq!("a", "b", "c");
        steps.reverse();
        let funnel = Funnel::try_new(Options::new(steps, window())).unwrap();
        let idx = funnel.steps().iter().map(|s| s.index).collect::<Vec<_>>();
        assert_eq!(idx, vec![0, 1, 2]);
    }

    #[test]
    fn test_invalid_steps() {
        assert!(matches!(
            Funnel::try_new(Options::new(vec![], window())),
            Err(QueryError::InvalidStepDefinition(_))
        ));

        let mut steps = event_eq!("a", "b");
        steps[1].index = 2;
        assert!(matches!(
            Funnel::try_new(Options::new(steps, window())),
            Err(QueryError::InvalidStepDefinition(_))
        ));

        let mut steps = event_eq!("a", "b");
        steps[1].index = 0;
        assert!(matches!(
            Funnel::try_new(Options::new(steps, window())),
            Err(QueryError::InvalidStepDefinition(_))
        ));
    }

    #[test]
    fn test_invalid_exclude_steps() {
        for (from, to) in [(1, 1), (2, 1), (0, 3)] {
            let mut opts = Options::new(event_eq!("a", "b", "c"), window());
            opts.exclude = Some(vec![ExcludeDefinition {
                predicate: event_eq_("x"),
                steps: Some(ExcludeSteps::new(from, to)),
            }]);
            assert!(
                Funnel::try_new(opts).is_err(),
                "exclude steps {from}..{to} should be rejected"
            );
        }
    }

    #[test]
    fn test_workers_at_least_one() {
        let mut opts = Options::new(event_eq!("a"), window());
        opts.workers = 0;
        opts.batch_size = 0;
        let funnel = Funnel::try_new(opts).unwrap();
        assert_eq!(funnel.workers(), 1);
        assert_eq!(funnel.batch_size(), 1);
    }
}

use std::sync::Arc;

use common::config;
use common::funnel::Funnel as FunnelRequest;
use common::funnel::Touch;
use tracing::debug;

use crate::error::QueryError;
use crate::error::Result;
use crate::funnel::breakdown::BreakdownRef;
use crate::funnel::breakdown::PropertyBreakdown;
use crate::funnel::ConversionWindow;
use crate::funnel::ExcludeDefinition;
use crate::funnel::Funnel;
use crate::funnel::Options;
use crate::funnel::StepDefinition;
use crate::queries::event_predicate;

/// Compiles a funnel request into a runnable funnel.
pub fn build(req: &FunnelRequest, cfg: &config::Engine) -> Result<Funnel> {
    let window = ConversionWindow::try_from(&req.time_window)?;

    let steps = req
        .steps
        .iter()
        .map(|step| {
            Ok(StepDefinition {
                index: step.index,
                predicate: event_predicate(&step.event, &step.filters)?,
                window: step
                    .time_window
                    .as_ref()
                    .map(ConversionWindow::try_from)
                    .transpose()?,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let exclude = req
        .exclude
        .as_ref()
        .map(|exclude| {
            exclude
                .iter()
                .map(|e| {
                    Ok(ExcludeDefinition {
                        predicate: event_predicate(&e.event, &e.filters)?,
                        steps: e.steps,
                    })
                })
                .collect::<Result<Vec<_>>>()
        })
        .transpose()?;

    let breakdown: Option<BreakdownRef> = match &req.breakdown {
        None => None,
        Some(b) => {
            if b.properties.is_empty() {
                return Err(QueryError::InvalidStepDefinition(
                    "breakdown should have at least one property".to_string(),
                ));
            }
            if let Touch::Step { step } = b.touch {
                if step >= steps.len() {
                    return Err(QueryError::InvalidStepDefinition(format!(
                        "breakdown touches step {step}, funnel has {} steps",
                        steps.len()
                    )));
                }
            }
            Some(Arc::new(PropertyBreakdown::new(b.properties.clone(), b.touch.clone())) as BreakdownRef)
        }
    };

    debug!(steps = steps.len(), order = ?req.order, "funnel built");

    Funnel::try_new(Options {
        steps,
        window,
        order: req.order,
        exclude,
        breakdown,
        median: cfg.median,
        workers: cfg.workers,
        batch_size: cfg.batch_size,
    })
}

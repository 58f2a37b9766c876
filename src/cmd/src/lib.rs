use std::collections::BTreeSet;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use common::ActorId;
use common::event::ActorEvents;
use query::funnel::CancelHandle;
use query::funnel::FunnelOutput;
use query::funnel::StepResult;
use serde::Serialize;
use tracing::info;
use tracing::warn;

use crate::error::Result;

pub mod config;
pub mod error;
pub mod input;

#[derive(Debug, Clone)]
pub struct Run {
    pub funnel: PathBuf,
    pub events: PathBuf,
    pub timeout: Option<Duration>,
    pub actors: bool,
}

#[derive(Debug, Serialize)]
pub struct Report {
    pub partitions: Vec<Vec<StepResult>>,
    pub processed_actors: usize,
    pub skipped_events: usize,
    pub cancelled: bool,
    // actors per step over all partitions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actors: Option<Vec<BTreeSet<ActorId>>>,
}

impl Report {
    pub fn new(out: FunnelOutput, steps: usize, with_actors: bool) -> Self {
        let actors = with_actors.then(|| {
            (0..steps)
                .map(|step| out.actors_at(step, None).into_iter().collect())
                .collect()
        });

        Report {
            partitions: out.partitions,
            processed_actors: out.processed_actors,
            skipped_events: out.skipped_events,
            cancelled: out.cancelled,
            actors,
        }
    }
}

/// Loads inputs and runs one funnel pass.
pub fn run(args: &Run, cfg: common::config::Config) -> Result<Report> {
    let req = input::read_funnel(&args.funnel)?;
    let funnel = query::queries::funnel::build(&req, &cfg.engine)?;

    let events = input::read_events(&args.events)?;
    let (population, skipped) = ActorEvents::group(events);
    if skipped > 0 {
        warn!("{skipped} events without actor skipped");
    }
    info!(
        actors = population.len(),
        steps = funnel.steps().len(),
        workers = funnel.workers(),
        "running funnel"
    );

    let cancel = CancelHandle::new();
    if let Some(timeout) = args.timeout {
        let cancel = cancel.clone();
        thread::spawn(move || {
            thread::sleep(timeout);
            cancel.cancel();
        });
    }

    let out = funnel.run_with_cancel(population, &cancel)?;
    if out.cancelled {
        warn!(
            processed = out.processed_actors,
            "timed out, results cover processed actors only"
        );
    }

    let mut report = Report::new(out, funnel.steps().len(), args.actors);
    report.skipped_events += skipped;

    Ok(report)
}

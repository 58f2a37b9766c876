use std::collections::HashMap;
use std::collections::HashSet;

use ahash::RandomState;
use common::ActorId;

use crate::funnel::breakdown::BreakdownKey;
use crate::funnel::selector::ActorResult;

/// Actors that reached each step, per breakdown partition.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActorIndex {
    // depth reached by each actor
    partitions: HashMap<Option<BreakdownKey>, HashMap<ActorId, usize, RandomState>, RandomState>,
}

impl ActorIndex {
    pub fn new() -> Self {
        Self {
            partitions: HashMap::default(),
        }
    }

    pub fn push(&mut self, result: &ActorResult) {
        let depth = result.attempt.depth();
        if depth == 0 {
            return;
        }
        self.partitions
            .entry(result.breakdown.clone())
            .or_insert_with(HashMap::default)
            .insert(result.actor.clone(), depth);
    }

    pub fn merge(&mut self, other: ActorIndex) {
        for (key, actors) in other.partitions {
            self.partitions
                .entry(key)
                .or_insert_with(HashMap::default)
                .extend(actors);
        }
    }

    fn collect<F>(&self, key: Option<&BreakdownKey>, f: F) -> HashSet<ActorId>
    where F: Fn(usize) -> bool {
        self.partitions
            .iter()
            .filter(|(k, _)| key.is_none() || k.as_ref() == key)
            .flat_map(|(_, actors)| actors.iter())
            .filter(|(_, depth)| f(**depth))
            .map(|(actor, _)| actor.clone())
            .collect()
    }

    /// Actors whose selected attempt reached `step`. `None` looks through all partitions.
    pub fn actors_at(&self, step: usize, key: Option<&BreakdownKey>) -> HashSet<ActorId> {
        self.collect(key, |depth| depth > step)
    }

    /// Actors that reached `step` but not the next one.
    pub fn dropped_off_at(&self, step: usize, key: Option<&BreakdownKey>) -> HashSet<ActorId> {
        self.collect(key, |depth| depth == step + 1)
    }

    pub fn len(&self) -> usize {
        self.partitions.values().map(|a| a.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

use std::fmt;
use std::sync::Arc;

use common::event::Event;
use common::event::PropValue;
use common::funnel::EventRef;
use common::funnel::PropValueFilter;
use common::funnel::PropValueOperation;
use regex::Regex;

use crate::error::QueryError;
use crate::error::Result;
use crate::funnel::StepDefinition;

/// Compiled match predicate. The engine never looks inside it.
pub trait StepPredicate: Send + Sync + fmt::Debug {
    fn evaluate(&self, event: &Event) -> bool;
}

pub type PredicateRef = Arc<dyn StepPredicate>;

/// Does `event` satisfy `step`?
#[inline]
pub fn matches(event: &Event, step: &StepDefinition) -> bool {
    step.predicate.evaluate(event)
}

/// Wraps a closure as a predicate.
pub fn predicate_fn<F>(name: impl Into<String>, f: F) -> PredicateRef
where F: Fn(&Event) -> bool + Send + Sync + 'static {
    Arc::new(FnPredicate {
        name: name.into(),
        f,
    })
}

struct FnPredicate<F> {
    name: String,
    f: F,
}

impl<F> fmt::Debug for FnPredicate<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FnPredicate({})", self.name)
    }
}

impl<F> StepPredicate for FnPredicate<F>
where F: Fn(&Event) -> bool + Send + Sync
{
    fn evaluate(&self, event: &Event) -> bool {
        (self.f)(event)
    }
}

/// Event name plus property filters, all of which must hold.
#[derive(Debug)]
pub struct EventPredicate {
    event: EventRef,
    filters: Vec<PropertyPredicate>,
}

impl EventPredicate {
    pub fn try_new(event: EventRef, filters: Option<&[PropValueFilter]>) -> Result<Self> {
        let filters = filters
            .unwrap_or_default()
            .iter()
            .map(PropertyPredicate::try_new)
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { event, filters })
    }
}

impl StepPredicate for EventPredicate {
    fn evaluate(&self, event: &Event) -> bool {
        let name_matches = match &self.event {
            EventRef::Regular(name) => event.event == *name,
            EventRef::Any => true,
        };

        name_matches && self.filters.iter().all(|f| f.evaluate(event))
    }
}

#[derive(Debug, Clone, Copy)]
enum Cmp {
    Gt,
    Gte,
    Lt,
    Lte,
}

#[derive(Debug)]
enum Op {
    Eq(Vec<PropValue>),
    Neq(Vec<PropValue>),
    Cmp(Cmp, Vec<f64>),
    True,
    False,
    Exists,
    Empty,
    // any pattern matches, or none of them when negated
    Pattern { patterns: Vec<Regex>, negated: bool },
}

#[derive(Debug)]
struct PropertyPredicate {
    property: String,
    op: Op,
}

impl PropertyPredicate {
    fn try_new(filter: &PropValueFilter) -> Result<Self> {
        let values = || -> Result<&Vec<PropValue>> {
            match &filter.value {
                Some(v) if !v.is_empty() => Ok(v),
                _ => Err(QueryError::InvalidFilter(format!(
                    "{:?} on {:?} needs at least one value",
                    filter.operation, filter.property
                ))),
            }
        };
        let numbers = || -> Result<Vec<f64>> {
            values()?
                .iter()
                .map(|v| {
                    v.as_f64().ok_or_else(|| {
                        QueryError::InvalidFilter(format!(
                            "{v:?} is not a number (property {:?})",
                            filter.property
                        ))
                    })
                })
                .collect()
        };
        let patterns = |f: fn(&str) -> String| -> Result<Vec<Regex>> {
            values()?
                .iter()
                .map(|v| {
                    Regex::new(&f(&v.to_string())).map_err(|err| {
                        QueryError::InvalidFilter(format!(
                            "bad pattern {v:?} (property {:?}): {err}",
                            filter.property
                        ))
                    })
                })
                .collect()
        };

        let op = match filter.operation {
            PropValueOperation::Eq => Op::Eq(values()?.clone()),
            PropValueOperation::Neq => Op::Neq(values()?.clone()),
            PropValueOperation::Gt => Op::Cmp(Cmp::Gt, numbers()?),
            PropValueOperation::Gte => Op::Cmp(Cmp::Gte, numbers()?),
            PropValueOperation::Lt => Op::Cmp(Cmp::Lt, numbers()?),
            PropValueOperation::Lte => Op::Cmp(Cmp::Lte, numbers()?),
            PropValueOperation::True => Op::True,
            PropValueOperation::False => Op::False,
            PropValueOperation::Exists => Op::Exists,
            PropValueOperation::Empty => Op::Empty,
            PropValueOperation::Like => Op::Pattern {
                patterns: patterns(like_to_regex)?,
                negated: false,
            },
            PropValueOperation::NotLike => Op::Pattern {
                patterns: patterns(like_to_regex)?,
                negated: true,
            },
            PropValueOperation::Contains => Op::Pattern {
                patterns: patterns(contains_to_regex)?,
                negated: false,
            },
            PropValueOperation::NotContains => Op::Pattern {
                patterns: patterns(contains_to_regex)?,
                negated: true,
            },
            PropValueOperation::Regex => Op::Pattern {
                patterns: patterns(str::to_string)?,
                negated: false,
            },
            PropValueOperation::NotRegex => Op::Pattern {
                patterns: patterns(str::to_string)?,
                negated: true,
            },
        };

        Ok(Self {
            property: filter.property.clone(),
            op,
        })
    }

    fn evaluate(&self, event: &Event) -> bool {
        // missing property never matches, whatever the operation
        let Some(value) = event.property(&self.property) else {
            return false;
        };

        match &self.op {
            Op::Eq(values) => values.iter().any(|v| value.loose_eq(v)),
            Op::Neq(values) => !values.iter().any(|v| value.loose_eq(v)),
            Op::Cmp(cmp, values) => match value.as_f64() {
                None => false,
                Some(l) => values.iter().any(|r| match cmp {
                    Cmp::Gt => l > *r,
                    Cmp::Gte => l >= *r,
                    Cmp::Lt => l < *r,
                    Cmp::Lte => l <= *r,
                }),
            },
            Op::True => value.as_bool() == Some(true),
            Op::False => value.as_bool() == Some(false),
            Op::Exists => !matches!(value, PropValue::Null),
            Op::Empty => value.is_empty(),
            Op::Pattern { patterns, negated } => {
                if matches!(value, PropValue::Null) {
                    return false;
                }
                let s = value.to_string();
                patterns.iter().any(|p| p.is_match(&s)) != *negated
            }
        }
    }
}

// sql LIKE: % is any sequence, _ is any single char
fn like_to_regex(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() + 8);
    out.push_str("(?s)^");
    for c in pattern.chars() {
        match c {
            '%' => out.push_str(".*"),
            '_' => out.push('.'),
            c => out.push_str(&regex::escape(c.encode_utf8(&mut [0; 4]))),
        }
    }
    out.push('$');

    out
}

fn contains_to_regex(pattern: &str) -> String {
    format!("(?i){}", regex::escape(pattern))
}

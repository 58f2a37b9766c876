use std::collections::BTreeMap;
use std::collections::HashMap;
use std::fmt;

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use tracing::warn;

use crate::error::CommonError;
use crate::error::Result;
use crate::ActorId;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(untagged)]
pub enum PropValue {
    Null,
    Boolean(bool),
    Int64(i64),
    Float64(f64),
    String(String),
}

impl PropValue {
    /// Typed value of a text cell: integer, float, boolean, otherwise a string.
    pub fn parse(v: &str) -> PropValue {
        if let Ok(v) = v.parse::<i64>() {
            return PropValue::Int64(v);
        }
        if let Ok(v) = v.parse::<f64>() {
            return PropValue::Float64(v);
        }
        match v {
            "true" => PropValue::Boolean(true),
            "false" => PropValue::Boolean(false),
            _ => PropValue::String(v.to_string()),
        }
    }

    /// Numeric view of the value. Numeric strings are coerced.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            PropValue::Int64(v) => Some(*v as f64),
            PropValue::Float64(v) => Some(*v),
            PropValue::String(v) => v.trim().parse::<f64>().ok(),
            PropValue::Null | PropValue::Boolean(_) => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropValue::Boolean(v) => Some(*v),
            PropValue::String(v) if v.eq_ignore_ascii_case("true") => Some(true),
            PropValue::String(v) if v.eq_ignore_ascii_case("false") => Some(false),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            PropValue::Null => true,
            PropValue::String(v) => v.is_empty(),
            _ => false,
        }
    }

    /// Loose equality: numbers compare numerically, everything else by its string form.
    pub fn loose_eq(&self, other: &PropValue) -> bool {
        if let (Some(l), Some(r)) = (self.as_f64(), other.as_f64()) {
            return l == r;
        }

        self.to_string() == other.to_string()
    }
}

impl fmt::Display for PropValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropValue::Null => Ok(()),
            PropValue::Boolean(v) => write!(f, "{v}"),
            PropValue::Int64(v) => write!(f, "{v}"),
            PropValue::Float64(v) => write!(f, "{v}"),
            PropValue::String(v) => write!(f, "{v}"),
        }
    }
}

impl From<&str> for PropValue {
    fn from(v: &str) -> Self {
        PropValue::String(v.to_string())
    }
}

impl From<String> for PropValue {
    fn from(v: String) -> Self {
        PropValue::String(v)
    }
}

impl From<i64> for PropValue {
    fn from(v: i64) -> Self {
        PropValue::Int64(v)
    }
}

impl From<f64> for PropValue {
    fn from(v: f64) -> Self {
        PropValue::Float64(v)
    }
}

impl From<bool> for PropValue {
    fn from(v: bool) -> Self {
        PropValue::Boolean(v)
    }
}

pub type Properties = HashMap<String, PropValue>;

/// Event as delivered by the population source. Nothing is guaranteed to be present.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct RawEvent {
    #[serde(default)]
    pub actor: Option<ActorId>,
    #[serde(default)]
    pub event: Option<String>,
    #[serde(default)]
    pub ts: Option<DateTime<Utc>>,
    #[serde(default)]
    pub properties: Properties,
}

/// Validated event. Timestamps are UTC.
#[derive(Clone, Debug, PartialEq)]
pub struct Event {
    pub event: String,
    pub ts: DateTime<Utc>,
    pub properties: Properties,
}

impl Event {
    pub fn new(event: impl Into<String>, ts: DateTime<Utc>) -> Self {
        Self {
            event: event.into(),
            ts,
            properties: Properties::default(),
        }
    }

    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<PropValue>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    pub fn property(&self, name: &str) -> Option<&PropValue> {
        self.properties.get(name)
    }

    #[inline]
    pub fn ts_millis(&self) -> i64 {
        self.ts.timestamp_millis()
    }
}

impl TryFrom<RawEvent> for Event {
    type Error = CommonError;

    fn try_from(raw: RawEvent) -> Result<Self> {
        let event = match raw.event {
            Some(event) if !event.is_empty() => event,
            _ => return Err(CommonError::MalformedEvent("missing event name".to_string())),
        };
        let ts = raw.ts.ok_or_else(|| {
            CommonError::MalformedEvent(format!("event {event:?} has no timestamp"))
        })?;

        Ok(Event {
            event,
            ts,
            properties: raw.properties,
        })
    }
}

impl From<Event> for RawEvent {
    fn from(e: Event) -> Self {
        RawEvent {
            actor: None,
            event: Some(e.event),
            ts: Some(e.ts),
            properties: e.properties,
        }
    }
}

/// All events of one actor, in chronological order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ActorEvents {
    pub actor: ActorId,
    pub events: Vec<RawEvent>,
}

impl ActorEvents {
    pub fn new(actor: impl Into<ActorId>, events: Vec<RawEvent>) -> Self {
        Self {
            actor: actor.into(),
            events,
        }
    }

    /// Groups a flat event stream by actor. Events without an actor are dropped and
    /// counted. Actors come out sorted by id, events keep their input order.
    pub fn group(events: impl IntoIterator<Item = RawEvent>) -> (Vec<ActorEvents>, usize) {
        let mut actors: BTreeMap<ActorId, Vec<RawEvent>> = BTreeMap::new();
        let mut skipped = 0;
        for event in events {
            match &event.actor {
                Some(actor) if !actor.is_empty() => {
                    actors.entry(actor.clone()).or_default().push(event);
                }
                _ => {
                    warn!(event = ?event.event, "skipping event without actor");
                    skipped += 1;
                }
            }
        }

        let actors = actors
            .into_iter()
            .map(|(actor, events)| ActorEvents { actor, events })
            .collect();

        (actors, skipped)
    }
}

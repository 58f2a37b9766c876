use chrono::Duration;
use serde::Deserialize;
use serde::Serialize;

use crate::event::PropValue;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Funnel {
    pub steps: Vec<Step>,
    pub time_window: TimeWindow,
    #[serde(default)]
    pub order: OrderType,
    #[serde(default)]
    pub exclude: Option<Vec<Exclude>>,
    #[serde(default)]
    pub breakdown: Option<Breakdown>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Step {
    pub index: usize,
    pub event: EventRef,
    #[serde(default)]
    pub filters: Option<Vec<PropValueFilter>>,
    // overrides the funnel window for this step
    #[serde(default)]
    pub time_window: Option<TimeWindow>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum EventRef {
    Regular(String),
    Any,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum OrderType {
    Strict,
    #[default]
    Sequential,
    Unordered,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimeWindow {
    pub n: i64,
    pub unit: TimeIntervalUnit,
}

impl TimeWindow {
    pub fn new(n: i64, unit: TimeIntervalUnit) -> Self {
        Self { n, unit }
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum TimeIntervalUnit {
    Minute,
    Hour,
    Day,
    Week,
    Month,
}

impl TimeIntervalUnit {
    /// Absolute duration. None for calendar units.
    pub fn duration(&self, n: i64) -> Option<Duration> {
        match self {
            TimeIntervalUnit::Minute => Duration::try_minutes(n),
            TimeIntervalUnit::Hour => Duration::try_hours(n),
            TimeIntervalUnit::Day => Duration::try_days(n),
            TimeIntervalUnit::Week => Duration::try_weeks(n),
            TimeIntervalUnit::Month => None,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            TimeIntervalUnit::Minute => "minute",
            TimeIntervalUnit::Hour => "hour",
            TimeIntervalUnit::Day => "day",
            TimeIntervalUnit::Week => "week",
            TimeIntervalUnit::Month => "month",
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct PropValueFilter {
    pub property: String,
    pub operation: PropValueOperation,
    #[serde(default)]
    pub value: Option<Vec<PropValue>>,
}

impl PropValueFilter {
    pub fn new(
        property: impl Into<String>,
        operation: PropValueOperation,
        value: Option<Vec<PropValue>>,
    ) -> Self {
        Self {
            property: property.into(),
            operation,
            value,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum PropValueOperation {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    True,
    False,
    Exists,
    Empty,
    Like,
    NotLike,
    Contains,
    NotContains,
    Regex,
    NotRegex,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExcludeSteps {
    pub from: usize,
    pub to: usize,
}

impl ExcludeSteps {
    pub fn new(from: usize, to: usize) -> Self {
        Self { from, to }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Exclude {
    pub event: EventRef,
    #[serde(default)]
    pub filters: Option<Vec<PropValueFilter>>,
    // exclusion is checked only between these steps, otherwise between all of them
    #[serde(default)]
    pub steps: Option<ExcludeSteps>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum Touch {
    First,
    Last,
    Step { step: usize },
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Breakdown {
    pub properties: Vec<String>,
    #[serde(default = "default_touch")]
    pub touch: Touch,
}

fn default_touch() -> Touch {
    Touch::First
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum MedianKind {
    // mean of the two middle values for even counts
    #[default]
    Midpoint,
    // value at index ceil(n/2)-1
    Lower,
}

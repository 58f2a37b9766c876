pub type ActorId = String;

pub const METRIC_FUNNEL_ACTORS_PROCESSED_TOTAL: &str = "funnel_actors_processed_total";
pub const METRIC_FUNNEL_EVENTS_SKIPPED_TOTAL: &str = "funnel_events_skipped_total";
pub const METRIC_FUNNEL_EXECUTION_TIME_MS: &str = "funnel_execution_time_ms";

// column names of tabular event inputs (csv, markdown fixtures)
pub const COLUMN_ACTOR: &str = "actor";
pub const COLUMN_EVENT: &str = "event";
pub const COLUMN_TS: &str = "ts";

use anyhow::anyhow;
use anyhow::bail;
use chrono::NaiveDateTime;
use common::event::ActorEvents;
use common::event::PropValue;
use common::event::Properties;
use common::event::RawEvent;
use common::types::COLUMN_ACTOR;
use common::types::COLUMN_EVENT;
use common::types::COLUMN_TS;

pub const TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

fn cells(row: &str) -> Vec<&str> {
    row.trim()
        .trim_matches('|')
        .split('|')
        .map(|v| v.trim())
        .collect()
}

/// Events from a markdown table. `actor`, `ts` and `event` columns are fixed, every
/// other column is a property. Empty cells are absent values.
///
/// | actor | ts                  | event | country |
/// |-------|---------------------|-------|---------|
/// | 1     | 2020-01-01 12:00:00 | e1    | de      |
pub fn parse_markdown_events(data: &str) -> anyhow::Result<Vec<ActorEvents>> {
    let mut lines = data.lines().filter(|l| l.trim().starts_with('|'));
    let header = match lines.next() {
        Some(h) => cells(h),
        None => bail!("no header"),
    };
    let col = |name: &str| {
        header
            .iter()
            .position(|h| *h == name)
            .ok_or_else(|| anyhow!("missing {name} column"))
    };
    let (actor_idx, ts_idx, event_idx) = (col(COLUMN_ACTOR)?, col(COLUMN_TS)?, col(COLUMN_EVENT)?);

    let mut events = vec![];
    for line in lines {
        let row = cells(line);
        // separator
        if row.iter().all(|v| v.chars().all(|c| c == '-' || c == ':')) {
            continue;
        }
        if row.len() != header.len() {
            bail!("row {line:?} has {} cells, expected {}", row.len(), header.len());
        }

        let mut properties = Properties::default();
        for (idx, val) in row.iter().enumerate() {
            if idx == actor_idx || idx == ts_idx || idx == event_idx || val.is_empty() {
                continue;
            }
            properties.insert(header[idx].to_string(), PropValue::parse(val));
        }
        let opt = |idx: usize| Some(row[idx]).filter(|v| !v.is_empty());
        let ts = opt(ts_idx)
            .map(|v| NaiveDateTime::parse_from_str(v, TS_FORMAT).map(|ts| ts.and_utc()))
            .transpose()?;

        events.push(RawEvent {
            actor: opt(actor_idx).map(str::to_string),
            event: opt(event_idx).map(str::to_string),
            ts,
            properties,
        });
    }

    let (actors, _) = ActorEvents::group(events);
    Ok(actors)
}

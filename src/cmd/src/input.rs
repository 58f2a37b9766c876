use std::fs::File;
use std::io::BufRead;
use std::io::BufReader;
use std::io::Read;
use std::path::Path;

use chrono::DateTime;
use chrono::Utc;
use common::event::PropValue;
use common::event::Properties;
use common::event::RawEvent;
use common::funnel::Funnel;
use common::types::COLUMN_ACTOR;
use common::types::COLUMN_EVENT;
use common::types::COLUMN_TS;
use tracing::debug;
use tracing::warn;

use crate::error::Error;
use crate::error::Result;

pub fn read_funnel(path: &Path) -> Result<Funnel> {
    let req = serde_json::from_reader(BufReader::new(File::open(path)?))?;
    debug!("funnel request: {req:?}");

    Ok(req)
}

/// Events from a `.csv` or a JSON lines file, detected by extension.
pub fn read_events(path: &Path) -> Result<Vec<RawEvent>> {
    let file = File::open(path)?;
    match path.extension().and_then(|v| v.to_str()) {
        Some("csv") => read_csv(file),
        Some("jsonl") | Some("json") | Some("ndjson") => read_jsonl(BufReader::new(file)),
        other => Err(Error::BadRequest(format!(
            "unsupported events file extension {other:?}, expected csv or jsonl"
        ))),
    }
}

// timestamps without an offset are UTC
fn parse_ts(v: &str) -> Option<DateTime<Utc>> {
    match dateparser::parse_with_timezone(v, &Utc) {
        Ok(ts) => Some(ts),
        Err(err) => {
            warn!("bad timestamp {v:?}: {err}");
            None
        }
    }
}

/// Header row names the columns. `actor`, `event` and `ts` are required, the rest are properties.
pub fn read_csv<R: Read>(rdr: R) -> Result<Vec<RawEvent>> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(rdr);
    let headers = rdr.headers()?.clone();
    let col = |name: &str| {
        headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| Error::BadRequest(format!("missing {name:?} column")))
    };
    let (actor_idx, event_idx, ts_idx) = (col(COLUMN_ACTOR)?, col(COLUMN_EVENT)?, col(COLUMN_TS)?);

    let mut out = vec![];
    for rec in rdr.records() {
        let rec = rec?;
        let opt = |idx: usize| rec.get(idx).filter(|v| !v.is_empty());

        // unparsable timestamps are left empty, the engine skips such events
        let ts = opt(ts_idx).and_then(parse_ts);

        let mut properties = Properties::default();
        for (idx, (name, val)) in headers.iter().zip(rec.iter()).enumerate() {
            if idx == actor_idx || idx == event_idx || idx == ts_idx || val.is_empty() {
                continue;
            }
            properties.insert(name.to_string(), PropValue::parse(val));
        }

        out.push(RawEvent {
            actor: opt(actor_idx).map(str::to_string),
            event: opt(event_idx).map(str::to_string),
            ts,
            properties,
        });
    }

    Ok(out)
}

pub fn read_jsonl<R: BufRead>(rdr: R) -> Result<Vec<RawEvent>> {
    let mut out = vec![];
    for (idx, line) in rdr.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let event = serde_json::from_str::<RawEvent>(&line)
            .map_err(|err| Error::BadRequest(format!("line {}: {err}", idx + 1)))?;
        out.push(event);
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn test_read_csv() {
        let data = "actor,event,ts,price,country
1,view,2020-01-01T12:00:00Z,,de
1,buy,2020-01-01 12:10:00,9.5,
2,view,yesterday-ish,,
";
        let events = read_csv(data.as_bytes()).unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].actor.as_deref(), Some("1"));
        assert_eq!(
            events[0].ts,
            Some(Utc.with_ymd_and_hms(2020, 1, 1, 12, 0, 0).unwrap())
        );
        assert_eq!(
            events[0].properties.get("country"),
            Some(&PropValue::String("de".to_string()))
        );
        assert!(events[0].properties.get("price").is_none());
        assert_eq!(
            events[1].ts,
            Some(Utc.with_ymd_and_hms(2020, 1, 1, 12, 10, 0).unwrap())
        );
        assert_eq!(events[1].properties.get("price"), Some(&PropValue::Float64(9.5)));
        assert!(events[2].ts.is_none());
    }

    #[test]
    fn test_read_csv_missing_column() {
        let data = "actor,name,ts\n1,view,2020-01-01T12:00:00Z\n";
        assert!(matches!(read_csv(data.as_bytes()), Err(Error::BadRequest(_))));
    }

    #[test]
    fn test_read_jsonl() {
        let data = r#"{"actor":"1","event":"view","ts":"2020-01-01T12:00:00Z","properties":{"price":10}}

{"actor":"2","event":"buy"}
"#;
        let events = read_jsonl(data.as_bytes()).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].properties.get("price"), Some(&PropValue::Int64(10)));
        assert!(events[1].ts.is_none());

        assert!(read_jsonl("{not json}".as_bytes()).is_err());
    }
}

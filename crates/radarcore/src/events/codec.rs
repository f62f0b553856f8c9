//! Line-delimited JSON encoding of the run event stream.

use super::RunEvent;
use crate::EventStreamError;
use std::io::{BufRead, Write};

/// Write each event as one JSON object per line.
pub fn write_jsonl<'a, W, I>(mut writer: W, events: I) -> Result<usize, EventStreamError>
where
    W: Write,
    I: IntoIterator<Item = &'a RunEvent>,
{
    let mut written = 0;
    for (idx, event) in events.into_iter().enumerate() {
        serde_json::to_writer(&mut writer, event).map_err(|source| {
            EventStreamError::Serialization {
                line: idx + 1,
                source,
            }
        })?;
        writer.write_all(b"\n")?;
        written += 1;
    }
    writer.flush()?;
    Ok(written)
}

/// Read a stream written by [`write_jsonl`]. Blank lines are skipped.
pub fn read_jsonl<R: BufRead>(reader: R) -> Result<Vec<RunEvent>, EventStreamError> {
    let mut events = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let event = serde_json::from_str(&line).map_err(|source| {
            EventStreamError::Serialization {
                line: idx + 1,
                source,
            }
        })?;
        events.push(event);
    }
    Ok(events)
}

pub fn to_jsonl_string(events: &[RunEvent]) -> Result<String, EventStreamError> {
    let mut buf = Vec::new();
    write_jsonl(&mut buf, events)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

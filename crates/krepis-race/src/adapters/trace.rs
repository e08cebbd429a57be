//! Trace Replay - JSON-Lines Event Traces
//!
//! A recorded trace holds one [`Event`] per line. Blank lines and lines
//! starting with `#` are skipped.
//!
//! ```text
//! # two unsynchronized writers
//! {"op":"write","tid":0,"loc":1}
//! {"op":"write","tid":1,"loc":1}
//! ```

use crate::domain::{
    Detector, DetectorError, EngineCounters, Event, RaceCount, RaceReport,
};
use serde::Serialize;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;
use thiserror::Error;
use tracing::debug;

/// Trace reading and replay failures
#[derive(Debug, Error)]
pub enum TraceError {
    /// Underlying read failed
    #[error("failed to read trace: {0}")]
    Io(#[from] io::Error),

    /// A line is not a valid event
    #[error("line {line}: malformed event: {source}")]
    Parse {
        /// 1-based line number
        line: usize,
        /// Decoder error
        source: serde_json::Error,
    },

    /// The detector rejected an event
    #[error("line {line}: {source}")]
    Detector {
        /// 1-based line number
        line: usize,
        /// Detector error
        source: DetectorError,
    },
}

/// Event together with its position in the trace
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TracedEvent {
    /// 1-based line number (or position for in-memory traces)
    pub line: usize,
    /// The event
    pub event: Event,
}

/// Streaming JSON-lines event reader
pub struct TraceReader<R> {
    lines: io::Lines<R>,
    line: usize,
}

impl TraceReader<BufReader<File>> {
    /// Open a trace file
    pub fn open(path: impl AsRef<Path>) -> Result<Self, TraceError> {
        Ok(Self::new(BufReader::new(File::open(path)?)))
    }
}

impl<R: BufRead> TraceReader<R> {
    /// Reader over any buffered source
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            line: 0,
        }
    }
}

impl<R: BufRead> Iterator for TraceReader<R> {
    type Item = Result<TracedEvent, TraceError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let text = match self.lines.next()? {
                Ok(text) => text,
                Err(e) => return Some(Err(e.into())),
            };
            self.line += 1;
            let trimmed = text.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let line = self.line;
            return Some(
                serde_json::from_str(trimmed)
                    .map(|event| TracedEvent { line, event })
                    .map_err(|source| TraceError::Parse { line, source }),
            );
        }
    }
}

/// Outcome of replaying a trace
#[derive(Debug, Clone, Serialize)]
pub struct ReplaySummary {
    /// Events fed to the detector
    pub events: u64,
    /// Every race report, in trace order
    pub reports: Vec<RaceReport>,
    /// Cumulative per-relation counts
    pub summary: Vec<RaceCount>,
    /// Engine counters (empty unless counting is enabled)
    pub counters: Vec<EngineCounters>,
}

impl ReplaySummary {
    /// Whether the trace was race-free under every enabled relation
    pub fn is_race_free(&self) -> bool {
        self.reports.is_empty()
    }
}

/// Feed `events` through `detector` in order
///
/// Stops at the first unreadable line or detector error.
pub fn replay<I>(detector: &Detector, events: I) -> Result<ReplaySummary, TraceError>
where
    I: IntoIterator<Item = Result<TracedEvent, TraceError>>,
{
    let mut fed = 0;
    let mut reports = Vec::new();
    for traced in events {
        let TracedEvent { line, event } = traced?;
        let found = detector
            .process(&event)
            .map_err(|source| TraceError::Detector { line, source })?;
        fed += 1;
        if let Some(report) = found {
            debug!(line, %report, "race");
            reports.push(report);
        }
    }
    Ok(ReplaySummary {
        events: fed,
        reports,
        summary: detector.statistics().summary(),
        counters: detector.counters(),
    })
}

/// Replay an in-memory event sequence
pub fn replay_events(
    detector: &Detector,
    events: impl IntoIterator<Item = Event>,
) -> Result<ReplaySummary, TraceError> {
    replay(
        detector,
        events
            .into_iter()
            .enumerate()
            .map(|(i, event)| Ok(TracedEvent { line: i + 1, event })),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CollectingSink, DetectorConfig, LocationId, Relation, ThreadId};
    use std::io::Cursor;
    use std::sync::Arc;

    const TRACE: &str = r#"
# unsynchronized writers
{"op":"write","tid":0,"loc":1,"site":3}

{"op":"write","tid":1,"loc":1,"site":4}
"#;

    fn detector() -> Detector {
        Detector::new(DetectorConfig::default(), Arc::new(CollectingSink::new())).unwrap()
    }

    #[test]
    fn test_reader_skips_comments_and_blanks() {
        let events: Vec<TracedEvent> = TraceReader::new(Cursor::new(TRACE))
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].line, 3);
        assert_eq!(events[1].line, 5);
    }

    #[test]
    fn test_parse_error_carries_line() {
        let text = "{\"op\":\"write\",\"tid\":0,\"loc\":1}\n{\"op\":\"jump\"}\n";
        let err = TraceReader::new(Cursor::new(text))
            .find_map(Result::err)
            .unwrap();
        assert!(matches!(err, TraceError::Parse { line: 2, .. }));
        assert!(err.to_string().starts_with("line 2: malformed event"));
    }

    #[test]
    fn test_replay_collects_reports() {
        let d = detector();
        let summary = replay(&d, TraceReader::new(Cursor::new(TRACE))).unwrap();
        assert_eq!(summary.events, 2);
        assert_eq!(summary.reports.len(), 1);
        assert_eq!(summary.summary[0].relation, Relation::Hb);
        assert_eq!(summary.summary[0].dynamic, 1);
        assert!(!summary.is_race_free());
    }

    #[test]
    fn test_replay_reports_detector_error_line() {
        let d = Detector::new(
            DetectorConfig::default().with_max_threads(2),
            Arc::new(CollectingSink::new()),
        )
        .unwrap();
        let err = replay_events(
            &d,
            [
                Event::Write { tid: ThreadId(0), loc: LocationId(1), site: None, owner: None },
                Event::Write { tid: ThreadId(5), loc: LocationId(1), site: None, owner: None },
            ],
        )
        .unwrap_err();
        assert!(matches!(
            err,
            TraceError::Detector {
                line: 2,
                source: DetectorError::ThreadCapacityExceeded { .. }
            }
        ));
    }
}

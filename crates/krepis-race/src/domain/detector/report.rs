//! Race Reports and Sinks
//!
//! A race is data: the detector hands every report to a [`RaceSink`] and
//! keeps going.

use crate::domain::ids::{LocationId, SiteId, ThreadId};
use crate::domain::relation::{Relation, RelationSet};
use crate::domain::shadow::RaceKind;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One detected race
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RaceReport {
    /// Strongest relation that flagged the access
    pub relation: Relation,
    /// Every relation that flagged the access
    pub flagged_by: RelationSet,
    /// Raced location
    pub location: LocationId,
    /// Source site of the current access
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site: Option<SiteId>,
    /// Conflict kind under `relation`
    pub kind: RaceKind,
    /// Thread of the earlier access
    pub prior_thread: ThreadId,
    /// Thread of the current access
    pub current_thread: ThreadId,
    /// Position of the current access in the event stream
    pub event_index: u64,
}

impl fmt::Display for RaceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} race on {} ({}): {} vs {} at event #{}",
            self.relation,
            self.location,
            self.kind,
            self.prior_thread,
            self.current_thread,
            self.event_index
        )?;
        if let Some(site) = self.site {
            write!(f, " [{site}]")?;
        }
        Ok(())
    }
}

/// Destination for race reports
///
/// Called from whichever thread performed the racing access.
pub trait RaceSink: Send + Sync {
    /// Deliver one report
    fn report(&self, report: &RaceReport);
}

/// Keeps every report in memory
#[derive(Debug, Default)]
pub struct CollectingSink {
    reports: Mutex<Vec<RaceReport>>,
}

impl CollectingSink {
    /// Empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the reports so far, in delivery order
    pub fn reports(&self) -> Vec<RaceReport> {
        self.reports.lock().clone()
    }

    /// Take the reports so far
    pub fn take(&self) -> Vec<RaceReport> {
        std::mem::take(&mut *self.reports.lock())
    }

    /// Number of reports so far
    pub fn len(&self) -> usize {
        self.reports.lock().len()
    }

    /// Whether no race was reported
    pub fn is_empty(&self) -> bool {
        self.reports.lock().is_empty()
    }
}

impl RaceSink for CollectingSink {
    fn report(&self, report: &RaceReport) {
        self.reports.lock().push(report.clone());
    }
}

/// Emits each report as a structured `warn` event
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl RaceSink for TracingSink {
    fn report(&self, report: &RaceReport) {
        tracing::warn!(
            relation = report.relation.name(),
            flagged_by = ?report.flagged_by,
            location = report.location.0,
            site = report.site.map(|s| s.0),
            kind = %report.kind,
            prior = report.prior_thread.0,
            current = report.current_thread.0,
            event = report.event_index,
            "data race"
        );
    }
}

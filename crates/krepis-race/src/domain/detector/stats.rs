//! Race Statistics
//!
//! Races are binned by the strongest relation that flagged them, then
//! counted statically (unique source site, falling back to location) and
//! dynamically (every report).
//!
//! The summary is cumulative: a weaker relation's figure includes every
//! race a stronger relation found.
//!
//! ```text
//! bins:     HB {s1: 2}   WCP {s2: 1}   DC {}   WDC {s1: 1, s3: 4}
//! summary:  HB  1 static, 2 dynamic
//!           WCP 2 static, 3 dynamic
//!           DC  2 static, 3 dynamic
//!           WDC 3 static, 8 dynamic
//! ```

use super::report::RaceReport;
use crate::domain::ids::{LocationId, SiteId};
use crate::domain::relation::Relation;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Static identity of a race
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StaticRaceKey {
    /// Source site of the second access
    Site(SiteId),
    /// Location, when the access carried no site
    Location(LocationId),
}

impl StaticRaceKey {
    /// Key of a report
    pub fn of(report: &RaceReport) -> Self {
        match report.site {
            Some(site) => StaticRaceKey::Site(site),
            None => StaticRaceKey::Location(report.location),
        }
    }
}

/// Cumulative counts for one relation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RaceCount {
    /// Relation the counts are for
    pub relation: Relation,
    /// Statically unique races
    pub unique: usize,
    /// Dynamic races
    pub dynamic: u64,
}

/// Per-relation race bins
#[derive(Debug, Clone, Default)]
pub struct RaceStatistics {
    bins: [HashMap<StaticRaceKey, u64>; 4],
}

impl RaceStatistics {
    /// Empty statistics
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one report under its strongest relation
    pub fn record(&mut self, report: &RaceReport) {
        *self.bins[report.relation as usize]
            .entry(StaticRaceKey::of(report))
            .or_insert(0) += 1;
    }

    /// Dynamic races binned under exactly `relation`
    pub fn dynamic(&self, relation: Relation) -> u64 {
        self.bins[relation as usize].values().sum()
    }

    /// Statically unique races binned under exactly `relation`
    pub fn unique(&self, relation: Relation) -> usize {
        self.bins[relation as usize].len()
    }

    /// Total dynamic races
    pub fn total(&self) -> u64 {
        Relation::ALL.iter().map(|&r| self.dynamic(r)).sum()
    }

    /// Cumulative counts, strongest relation first
    pub fn summary(&self) -> Vec<RaceCount> {
        let mut seen: HashSet<StaticRaceKey> = HashSet::new();
        let mut dynamic = 0;
        Relation::ALL
            .iter()
            .map(|&relation| {
                seen.extend(self.bins[relation as usize].keys().copied());
                dynamic += self.dynamic(relation);
                RaceCount {
                    relation,
                    unique: seen.len(),
                    dynamic,
                }
            })
            .collect()
    }
}

impl fmt::Display for RaceStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for count in self.summary() {
            let relation = count.relation;
            writeln!(f, "{} statically unique {relation}-race(s)", count.unique)?;
            writeln!(f, "{} dynamic {relation}-race(s)", count.dynamic)?;
        }
        Ok(())
    }
}

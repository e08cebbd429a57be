//! Causality Relations and Analysis Modes
//!
//! # Relations
//!
//! From strongest (most conservative) to weakest (most precise):
//!
//! ```text
//! HB  ⊇  WCP  ⊇  DC  ⊇  WDC        (orderings)
//! HB  ⊆  WCP  ⊆  DC  ⊆  WDC        (reported races)
//! ```
//!
//! - **HB**: program order plus release→acquire, fork, join, volatile edges
//! - **WCP**: drops release→acquire, keeps conflicting critical sections
//!   (Rule a), composes with HB on both sides (Rule b)
//! - **DC**: like WCP but composes only with itself
//! - **WDC**: Rule a only
//!
//! # Modes
//!
//! Each relation engine runs one [`AnalysisMode`], picked from configuration
//! by [`AnalysisMode::select`].

use serde::{Deserialize, Serialize};
use std::fmt;

/// A causality relation the detector can track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Relation {
    /// Happens-Before
    Hb,
    /// Weak-Causally-Precedes
    Wcp,
    /// Doesn't-Commute
    Dc,
    /// Weak-Doesn't-Commute
    Wdc,
}

impl Relation {
    /// All relations, strongest first
    pub const ALL: [Relation; 4] = [Relation::Hb, Relation::Wcp, Relation::Dc, Relation::Wdc];

    /// Whether this relation propagates ordering through Rule (a)
    #[inline(always)]
    pub const fn uses_rule_a(self) -> bool {
        !matches!(self, Relation::Hb)
    }

    /// Whether this relation composes critical sections through Rule (b)
    #[inline(always)]
    pub const fn uses_rule_b(self) -> bool {
        matches!(self, Relation::Wcp | Relation::Dc)
    }

    /// Whether threads carry a second, HB-valued clock
    #[inline(always)]
    pub const fn tracks_hb_shadow(self) -> bool {
        matches!(self, Relation::Wcp)
    }

    /// Lowercase name
    pub const fn name(self) -> &'static str {
        match self {
            Relation::Hb => "hb",
            Relation::Wcp => "wcp",
            Relation::Dc => "dc",
            Relation::Wdc => "wdc",
        }
    }

    const fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Relation::Hb => "HB",
            Relation::Wcp => "WCP",
            Relation::Dc => "DC",
            Relation::Wdc => "WDC",
        })
    }
}

impl std::str::FromStr for Relation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "hb" => Ok(Relation::Hb),
            "wcp" => Ok(Relation::Wcp),
            "dc" => Ok(Relation::Dc),
            "wdc" | "capo" => Ok(Relation::Wdc),
            other => Err(format!("unknown relation `{other}`")),
        }
    }
}

/// Small bit set of relations
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "Vec<Relation>", into = "Vec<Relation>")]
pub struct RelationSet(u8);

impl RelationSet {
    /// No relation
    pub const EMPTY: Self = Self(0);

    /// Insert a relation
    #[inline]
    pub fn insert(&mut self, relation: Relation) {
        self.0 |= relation.bit();
    }

    /// Membership test
    #[inline]
    pub const fn contains(self, relation: Relation) -> bool {
        self.0 & relation.bit() != 0
    }

    /// Whether the set is empty
    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Number of relations in the set
    #[inline]
    pub const fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    /// Strongest member
    pub fn strongest(self) -> Option<Relation> {
        self.iter().next()
    }

    /// Members, strongest first
    pub fn iter(self) -> impl Iterator<Item = Relation> {
        Relation::ALL.into_iter().filter(move |r| self.contains(*r))
    }
}

impl FromIterator<Relation> for RelationSet {
    fn from_iter<I: IntoIterator<Item = Relation>>(iter: I) -> Self {
        let mut set = Self::EMPTY;
        for r in iter {
            set.insert(r);
        }
        set
    }
}

impl From<Vec<Relation>> for RelationSet {
    fn from(v: Vec<Relation>) -> Self {
        v.into_iter().collect()
    }
}

impl From<RelationSet> for Vec<Relation> {
    fn from(set: RelationSet) -> Self {
        set.iter().collect()
    }
}

impl fmt::Debug for RelationSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

/// Shadow-state algorithm used by one relation engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnalysisMode {
    /// Epoch state machine; Rule (a) applied before the access
    Plain,
    /// Ownership-aware state machine with write collapse
    Owned,
    /// Owned, with Rule (a) through held-lock snapshot lists
    Snapshot,
}

impl AnalysisMode {
    /// Pick the mode a relation runs under
    ///
    /// HB never uses snapshots. Snapshots imply ownership tracking.
    pub const fn select(relation: Relation, owned_fast_path: bool, held_lock_snapshots: bool) -> Self {
        if held_lock_snapshots && relation.uses_rule_a() {
            AnalysisMode::Snapshot
        } else if owned_fast_path || held_lock_snapshots {
            AnalysisMode::Owned
        } else {
            AnalysisMode::Plain
        }
    }

    /// Whether writes collapse `R` onto `W`
    #[inline(always)]
    pub const fn tracks_ownership(self) -> bool {
        !matches!(self, AnalysisMode::Plain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strength_order() {
        assert!(Relation::Hb < Relation::Wcp);
        assert!(Relation::Dc < Relation::Wdc);
    }

    #[test]
    fn test_relation_set() {
        let set: RelationSet = [Relation::Wdc, Relation::Wcp].into_iter().collect();
        assert_eq!(set.len(), 2);
        assert!(set.contains(Relation::Wcp));
        assert!(!set.contains(Relation::Hb));
        assert_eq!(set.strongest(), Some(Relation::Wcp));
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![Relation::Wcp, Relation::Wdc]);
    }

    #[test]
    fn test_relation_set_serde() {
        let set: RelationSet = serde_json::from_str(r#"["hb","dc"]"#).unwrap();
        assert!(set.contains(Relation::Hb) && set.contains(Relation::Dc));
        assert_eq!(serde_json::to_string(&set).unwrap(), r#"["hb","dc"]"#);
    }

    #[test]
    fn test_parse() {
        assert_eq!("WCP".parse::<Relation>(), Ok(Relation::Wcp));
        assert_eq!("capo".parse::<Relation>(), Ok(Relation::Wdc));
        assert!("xyz".parse::<Relation>().is_err());
    }

    #[test]
    fn test_mode_selection() {
        assert_eq!(AnalysisMode::select(Relation::Hb, true, true), AnalysisMode::Owned);
        assert_eq!(AnalysisMode::select(Relation::Hb, false, false), AnalysisMode::Plain);
        assert_eq!(AnalysisMode::select(Relation::Wcp, false, true), AnalysisMode::Snapshot);
        assert_eq!(AnalysisMode::select(Relation::Dc, true, false), AnalysisMode::Owned);
    }
}

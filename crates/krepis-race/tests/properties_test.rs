//! Property Tests - Clock Laws and Fast-Path Equivalence
//!
//! Generated clocks check the partial-order laws; generated well-formed
//! traces check that the lock-free fast path never changes a verdict.

use krepis_race::domain::*;
use proptest::prelude::*;
use std::sync::Arc;

const THREADS: u32 = 4;
const LOCKS: u64 = 3;
const LOCATIONS: u64 = 4;

fn layout() -> EpochLayout {
    EpochLayout::for_max_threads(8).unwrap()
}

fn clock_from(values: &[u64]) -> VectorClock {
    let layout = layout();
    let mut vc = VectorClock::new(layout);
    for (i, &c) in values.iter().enumerate() {
        let tid = ThreadId(i as u32);
        vc.set(tid, layout.make(tid, c));
    }
    vc
}

fn clock_strategy() -> impl Strategy<Value = Vec<u64>> {
    prop::collection::vec(0u64..6, 0..6)
}

mod clock_laws {
    use super::*;

    proptest! {
        #[test]
        fn test_leq_reflexive(a in clock_strategy()) {
            let a = clock_from(&a);
            prop_assert!(a.leq(&a));
        }

        #[test]
        fn test_leq_antisymmetric(a in clock_strategy(), b in clock_strategy()) {
            let (a, b) = (clock_from(&a), clock_from(&b));
            if a.leq(&b) && b.leq(&a) {
                for i in 0..8 {
                    prop_assert_eq!(a.get(ThreadId(i)), b.get(ThreadId(i)));
                }
            }
        }

        #[test]
        fn test_leq_transitive(a in clock_strategy(), b in clock_strategy(), c in clock_strategy()) {
            let (a, b, c) = (clock_from(&a), clock_from(&b), clock_from(&c));
            if a.leq(&b) && b.leq(&c) {
                prop_assert!(a.leq(&c));
            }
        }

        #[test]
        fn test_max_is_least_upper_bound(a in clock_strategy(), b in clock_strategy()) {
            let (a, b) = (clock_from(&a), clock_from(&b));
            let mut joined = a.clone();
            joined.max(&b);
            prop_assert!(a.leq(&joined));
            prop_assert!(b.leq(&joined));
            for i in 0..8 {
                let tid = ThreadId(i);
                prop_assert_eq!(joined.get(tid), a.get(tid).max(b.get(tid)));
            }
        }

        #[test]
        fn test_epoch_round_trip(max_threads in 1u64..=MAX_SUPPORTED_THREADS, tid in any::<u32>(), clock in any::<u64>()) {
            let layout = EpochLayout::for_max_threads(max_threads).unwrap();
            let tid = ThreadId((u64::from(tid) % max_threads.min(u64::from(u32::MAX))) as u32);
            let clock = clock & layout.max_clock();
            let e = layout.make(tid, clock);
            prop_assert_eq!(layout.tid(e), tid);
            prop_assert_eq!(layout.clock(e), clock);
            prop_assert!(!e.is_read_shared());
        }
    }
}

/// Raw generated step, made well-formed by [`well_formed`]
#[derive(Debug, Clone, Copy)]
enum Step {
    Acquire(u32, u64),
    Release(u32),
    Read(u32, u64),
    Write(u32, u64),
    VolatileRead(u32, u64),
    VolatileWrite(u32, u64),
    Wait(u32),
}

fn step_strategy() -> impl Strategy<Value = Step> {
    let tid = 0..THREADS;
    prop_oneof![
        3 => (tid.clone(), 0..LOCKS).prop_map(|(t, l)| Step::Acquire(t, l)),
        3 => tid.clone().prop_map(Step::Release),
        4 => (tid.clone(), 0..LOCATIONS).prop_map(|(t, x)| Step::Read(t, x)),
        4 => (tid.clone(), 0..LOCATIONS).prop_map(|(t, x)| Step::Write(t, x)),
        1 => (tid.clone(), 0..2u64).prop_map(|(t, v)| Step::VolatileRead(t, v)),
        1 => (tid.clone(), 0..2u64).prop_map(|(t, v)| Step::VolatileWrite(t, v)),
        1 => tid.prop_map(Step::Wait),
    ]
}

/// Drop steps that would break lock discipline
fn well_formed(steps: &[Step]) -> Vec<Event> {
    let mut holder: [Option<u32>; LOCKS as usize] = [None; LOCKS as usize];
    let mut stacks: Vec<Vec<u64>> = vec![Vec::new(); THREADS as usize];
    let mut events: Vec<Event> = (0..THREADS)
        .map(|t| Event::ThreadCreate { tid: ThreadId(t), parent: None })
        .collect();

    for &step in steps {
        match step {
            Step::Acquire(t, l) => {
                if holder[l as usize].map_or(true, |h| h == t) {
                    holder[l as usize] = Some(t);
                    stacks[t as usize].push(l);
                    events.push(Event::Acquire { tid: ThreadId(t), lock: LockId(l) });
                }
            }
            Step::Release(t) => {
                if let Some(l) = stacks[t as usize].pop() {
                    if !stacks[t as usize].contains(&l) {
                        holder[l as usize] = None;
                    }
                    events.push(Event::Release { tid: ThreadId(t), lock: LockId(l) });
                }
            }
            Step::Wait(t) => {
                if let Some(&l) = stacks[t as usize].last() {
                    let (tid, lock) = (ThreadId(t), LockId(l));
                    events.push(Event::Wait { tid, lock });
                    events.push(Event::WaitReturn { tid, lock });
                }
            }
            Step::Read(t, x) => events.push(Event::Read {
                tid: ThreadId(t),
                loc: LocationId(x),
                site: Some(SiteId(x as u32)),
                owner: None,
            }),
            Step::Write(t, x) => events.push(Event::Write {
                tid: ThreadId(t),
                loc: LocationId(x),
                site: Some(SiteId(100 + x as u32)),
                owner: None,
            }),
            Step::VolatileRead(t, v) => events.push(Event::VolatileRead {
                tid: ThreadId(t),
                loc: LocationId(1000 + v),
            }),
            Step::VolatileWrite(t, v) => events.push(Event::VolatileWrite {
                tid: ThreadId(t),
                loc: LocationId(1000 + v),
            }),
        }
    }
    events
}

fn replay(config: DetectorConfig, events: &[Event]) -> Vec<RaceReport> {
    let sink = Arc::new(CollectingSink::new());
    let detector = Detector::new(config, sink.clone()).unwrap();
    for event in events {
        detector.process(event).unwrap();
    }
    sink.take()
}

fn base_configs() -> [DetectorConfig; 3] {
    let base = DetectorConfig::default()
        .with_relations(Relation::ALL)
        .with_max_threads(u64::from(THREADS))
        .with_check_invariants(true);
    [
        base.clone().with_owned_fast_path(false),
        base.clone(),
        base.with_held_lock_snapshots(true),
    ]
}

mod fast_path {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(128))]

        #[test]
        fn test_fast_path_never_changes_verdicts(steps in prop::collection::vec(step_strategy(), 0..80)) {
            let events = well_formed(&steps);
            for config in base_configs() {
                let fast = replay(config.clone().with_epoch_fast_path(true), &events);
                let slow = replay(config.with_epoch_fast_path(false), &events);
                prop_assert_eq!(fast, slow);
            }
        }

        #[test]
        fn test_reports_carry_strongest_flagging_relation(steps in prop::collection::vec(step_strategy(), 0..80)) {
            let events = well_formed(&steps);
            for config in base_configs() {
                for report in replay(config, &events) {
                    prop_assert_eq!(report.flagged_by.strongest(), Some(report.relation));
                    prop_assert!(report.prior_thread != report.current_thread);
                }
            }
        }
    }
}

mod monotonicity {
    use super::*;
    use std::collections::BTreeSet;

    fn racing_events(config: DetectorConfig, events: &[Event]) -> BTreeSet<u64> {
        replay(config, events).into_iter().map(|r| r.event_index).collect()
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(128))]

        #[test]
        fn test_weaker_relations_report_supersets(steps in prop::collection::vec(step_strategy(), 0..80)) {
            let events = well_formed(&steps);
            for config in base_configs() {
                let per_relation: Vec<BTreeSet<u64>> = Relation::ALL
                    .iter()
                    .map(|&r| racing_events(config.clone().with_relations([r]), &events))
                    .collect();
                for pair in per_relation.windows(2) {
                    prop_assert!(pair[0].is_subset(&pair[1]), "{:?} not within {:?}", pair[0], pair[1]);
                }
                prop_assert_eq!(racing_events(config, &events), per_relation[3].clone());
            }
        }

        #[test]
        fn test_flagged_relations_are_upward_closed(steps in prop::collection::vec(step_strategy(), 0..80)) {
            let events = well_formed(&steps);
            for config in base_configs() {
                for report in replay(config, &events) {
                    for &relation in Relation::ALL.iter().skip_while(|&&r| r != report.relation) {
                        prop_assert!(report.flagged_by.contains(relation), "{}", report);
                    }
                }
            }
        }
    }
}

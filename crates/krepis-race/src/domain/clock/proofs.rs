//! Kani Proofs for Epoch Packing
//!
//! The packing is pure bit arithmetic, so Kani can check it exhaustively for
//! every layout rather than sampling like the property tests do.

#[cfg(kani)]
mod kani_proofs {
    use super::super::*;
    use crate::domain::ids::ThreadId;

    /// `tid(make(t, c)) == t` and `clock(make(t, c)) == c`
    #[kani::proof]
    fn proof_epoch_round_trip() {
        let max_threads: u64 = kani::any();
        kani::assume(max_threads >= 1 && max_threads <= MAX_SUPPORTED_THREADS);
        let layout = match EpochLayout::for_max_threads(max_threads) {
            Ok(layout) => layout,
            Err(_) => return,
        };

        let tid: u32 = kani::any();
        let clock: u64 = kani::any();
        kani::assume((tid as u64) < max_threads);
        kani::assume(clock <= layout.max_clock());

        let e = layout.make(ThreadId(tid), clock);
        assert_eq!(layout.tid(e), ThreadId(tid));
        assert_eq!(layout.clock(e), clock);
        assert!(!e.is_read_shared());
    }

    /// Ticking never changes the tid field and fails exactly at MAX_CLOCK
    #[kani::proof]
    fn proof_tick_stays_in_slot() {
        let layout = match EpochLayout::for_max_threads(64) {
            Ok(layout) => layout,
            Err(_) => return,
        };
        let tid: u32 = kani::any();
        let clock: u64 = kani::any();
        kani::assume(tid < 64);
        kani::assume(clock <= layout.max_clock());

        let e = layout.make(ThreadId(tid), clock);
        match layout.tick(e) {
            Ok(next) => {
                assert!(clock < layout.max_clock());
                assert_eq!(layout.tid(next), ThreadId(tid));
                assert_eq!(layout.clock(next), clock + 1);
            }
            Err(_) => assert_eq!(clock, layout.max_clock()),
        }
    }
}

//! Logical Clocks
//!
//! Epochs and vector clocks are the detector's only notion of time. Every
//! other component stores them, compares them, and joins them.
//!
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │ EpochLayout (tid bits | clock bits)              │
//! │   ├─ Epoch            one (tid, clock) in a u64  │
//! │   └─ VectorClock      tid -> Epoch, growable     │
//! └──────────────────────────────────────────────────┘
//! ```

pub mod epoch;
pub mod vector_clock;

mod proofs;

pub use epoch::{Epoch, EpochLayout, MAX_SUPPORTED_THREADS};
pub use vector_clock::{VectorClock, INIT_VECTOR_CLOCK_SIZE};

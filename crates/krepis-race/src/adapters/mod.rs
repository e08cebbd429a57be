//! Adapters Layer - Ports & Adapters Pattern
//!
//! Connects recorded executions to the domain layer.
//!
//! # Hexagonal Architecture
//! - Inbound adapters: JSON-lines trace → [`Event`](crate::domain::Event) → Detector
//! - Outbound adapters: [`RaceSink`](crate::domain::RaceSink) implementations live in the domain

pub mod trace;

pub use trace::{replay, replay_events, ReplaySummary, TraceError, TraceReader, TracedEvent};

//! Infrastructure Layer - Shadow State Storage
//!
//! Concrete storage the domain layer builds on.
//!
//! # Responsibilities
//! - Host id interning (DashMap)
//! - Generational slot storage with explicit reclamation

pub mod arena;

pub use arena::{Arena, Handle, Registry};

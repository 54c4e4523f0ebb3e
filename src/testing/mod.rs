//! Testing utilities
//!
//! An in-memory broker and deterministic id generator for exercising a full
//! client session without a network.

pub mod mocks;

pub use mocks::*;

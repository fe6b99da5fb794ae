//! Extent/record storage over memory mapped files, with a residency estimator and access gate
//! that let callers back off instead of page faulting while holding locks.

#[macro_use]
extern crate tracing;

pub mod config;
pub mod counters;
pub mod gate;
pub mod misc;
pub mod residency;
pub mod store;

//! Job domain module

#[allow(clippy::module_inception)]
mod job;

pub use job::{InvalidJobError, Job, NewJob};

//! Configuration domain module

mod app_config;
mod duration;

pub use app_config::*;
pub use duration::Duration;

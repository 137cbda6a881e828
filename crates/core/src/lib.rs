#![forbid(unsafe_code)]

pub mod aggregate;
pub mod config;
pub mod mastery;
pub mod model;
pub mod time;

pub use config::ProgressConfig;
pub use mastery::{MASTERY_THRESHOLD, MasteryRule};
pub use time::Clock;

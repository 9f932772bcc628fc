pub mod controller;

pub use controller::{PostureMonitor, SessionReport};

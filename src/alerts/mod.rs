pub mod stream;

pub use stream::{Alert, AlertConfig, AlertSeverity, AlertStream, MAX_ALERTS};

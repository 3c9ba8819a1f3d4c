pub mod config;
pub mod sink;

pub use config::SeisConfig;
pub use sink::{read_alerts, Alert, AlertSink, FileSink, LogSink};

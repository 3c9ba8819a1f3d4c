pub mod api;
pub mod args;
pub mod detector;
pub mod error;
pub mod filter;
pub mod synth;
pub mod trace;
pub mod util;

pub use api::{Alert, AlertSink};
pub use detector::{CheckOutcome, ConfirmedEvent, Detector, DetectorSettings};
pub use error::DetectorError;

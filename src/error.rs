use std::ops::Range;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DetectorError {
    #[error("Invalid channel id: {id}. Detector has {count} channels")]
    InvalidChannelId { id: usize, count: usize },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Sample index {index} outside retained history {retained:?}")]
    OutOfRange { index: u64, retained: Range<u64> },

    #[error("Event at sample {0} already confirmed")]
    DuplicateEvent(u64),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, DetectorError>;

use std::fmt;

/// Top-level service failure, carrying the process exit code.
///
/// Exit codes: 0 clean, 1 invalid configuration, 2 broker setup failure,
/// 3 destination setup failure.
#[derive(Debug)]
pub enum SinkError {
    Config(String),
    Broker(String),
    Destination(String),
}

pub type SinkResult<T> = Result<T, SinkError>;

impl SinkError {
    pub fn exit_code(&self) -> i32 {
        match self {
            SinkError::Config(_) => 1,
            SinkError::Broker(_) => 2,
            SinkError::Destination(_) => 3,
        }
    }
}

impl fmt::Display for SinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SinkError::Config(message) => write!(f, "configuration error: {message}"),
            SinkError::Broker(message) => write!(f, "broker error: {message}"),
            SinkError::Destination(message) => write!(f, "destination error: {message}"),
        }
    }
}

impl std::error::Error for SinkError {}

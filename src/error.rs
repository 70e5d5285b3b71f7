use std::path::PathBuf;
use thiserror::Error;

/// Every failure md-sleep can hit. All of them are terminal for the process.
#[derive(Error, Debug)]
pub enum SleepError {
    #[error("cannot resolve members of {array}: {reason}")]
    Discovery { array: String, reason: String },

    #[error("cannot read activity counter {}: {source}", .path.display())]
    MonitorRead {
        path:   PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("power command for {device} failed: {cause}")]
    PowerCommand { device: String, cause: String },

    #[error("config: {0}")]
    Config(String),
}

impl SleepError {
    pub fn discovery(array: &str, reason: impl Into<String>) -> Self {
        SleepError::Discovery { array: array.to_string(), reason: reason.into() }
    }

    pub fn power(device: impl Into<String>, cause: impl ToString) -> Self {
        SleepError::PowerCommand { device: device.into(), cause: cause.to_string() }
    }
}

pub type Result<T> = std::result::Result<T, SleepError>;

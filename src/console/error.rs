use crate::dial::DialError;
use crate::feed::StatisticsError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConsoleError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Upstream contract violation: {0}")]
    Upstream(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Dial error: {0}")]
    Dial(#[from] DialError),

    #[error("Statistics error: {0}")]
    Statistics(#[from] StatisticsError),
}

pub type Result<T> = std::result::Result<T, ConsoleError>;

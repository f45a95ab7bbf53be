//! Metrics error types.

use thiserror::Error;

pub type MetricsResult<T> = Result<T, MetricsError>;

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("prometheus error: {0}")]
    Prometheus(#[from] ::prometheus::Error),

    #[error("exposition is not valid UTF-8: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),
}

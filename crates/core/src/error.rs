use chrono::NaiveDate;
use std::fmt;

/// Failure taxonomy surfaced across the pipeline and the HTTP boundary.
/// Generation-time failures (`DataUnavailable`, `ModelError`,
/// `MalformedResponse`) are fatal to their run only and never retried
/// automatically.
#[derive(Debug, Clone)]
pub enum ReportError {
    NotFound(NaiveDate),
    DataUnavailable(String),
    ModelError(String),
    MalformedResponse(String),
    InvalidConfig(String),
}

impl ReportError {
    /// Wrap `err` in the given taxonomy variant unless it already carries one.
    pub fn classify(err: anyhow::Error, wrap: fn(String) -> ReportError) -> anyhow::Error {
        if err.downcast_ref::<ReportError>().is_some() {
            err
        } else {
            anyhow::Error::new(wrap(format!("{err:#}")))
        }
    }
}

impl fmt::Display for ReportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound(date) => write!(f, "no report stored for {date}"),
            Self::DataUnavailable(detail) => write!(f, "market data unavailable: {detail}"),
            Self::ModelError(detail) => write!(f, "model call failed: {detail}"),
            Self::MalformedResponse(detail) => write!(f, "malformed model response: {detail}"),
            Self::InvalidConfig(detail) => write!(f, "invalid config: {detail}"),
        }
    }
}

impl std::error::Error for ReportError {}

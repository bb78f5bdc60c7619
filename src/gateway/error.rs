use thiserror::Error;

use super::types::IncidentStatus;

#[derive(Debug, Error)]
pub enum GatewayError {
  /// Missing or malformed input, detected before any I/O
  #[error("validation failed: {0}")]
  Validation(String),
  #[error("authentication failed: {0}")]
  Authentication(String),
  /// Transport failure, or a non-2xx status with nothing actionable in the body
  #[error("network error: {0}")]
  Network(String),
  #[error("not found: {0}")]
  NotFound(String),
  /// Non-2xx response carrying a server-provided message
  #[error("api error ({status}): {message}")]
  Api { status: u16, message: String },
  #[error("illegal status transition: {from} -> {to}")]
  IllegalTransition {
    from: IncidentStatus,
    to: IncidentStatus,
  },
  #[error("local storage failure: {0}")]
  Storage(String),
  #[error("failed to decode payload: {0}")]
  Decode(#[from] serde_json::Error),
}

impl From<color_eyre::Report> for GatewayError {
  fn from(report: color_eyre::Report) -> Self {
    GatewayError::Storage(format!("{:#}", report))
  }
}

impl From<reqwest::Error> for GatewayError {
  fn from(err: reqwest::Error) -> Self {
    GatewayError::Network(err.to_string())
  }
}

pub type GatewayResult<T> = Result<T, GatewayError>;

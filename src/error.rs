use crate::transport::TransportError;
use thiserror::Error;

/// Failure of one statistic retrieval. Caught at the orchestrator
/// boundary; never fatal to the refresh cycle as a whole.
#[derive(Error, Debug)]
pub enum RetrieveError {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl RetrieveError {
    /// True for a genuine report *execution* failure, which permanently
    /// disables the reporter path for the session. Distinct from "no
    /// descriptor" and "no data".
    pub fn is_report_execution(&self) -> bool {
        matches!(
            self,
            RetrieveError::Transport(TransportError::ReportExecution(_))
        )
    }
}

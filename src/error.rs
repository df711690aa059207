use reqwest::StatusCode;
use thiserror::Error;

/// Errors surfaced by a scan.
///
/// Any of these aborts the whole scan: there is no retry and no
/// skip-and-continue. Groups already delivered before the failure stay
/// delivered.
#[derive(Debug, Error)]
pub enum ScanError {
    /// The advisory service answered with a non-success status.
    #[error("advisory scan received {status} from server")]
    Status { status: StatusCode },

    #[error("advisory request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// A response line could not be parsed as an advisory record.
    #[error("malformed advisory record: {0}")]
    Parse(#[from] serde_json::Error),

    /// The in-flight cap was reached with no outstanding flight to wait on.
    /// Reachable only when `max_batch_length >= max_sending`.
    #[error("{in_flight} packages in flight at cap {max_sending} with no outstanding flight")]
    FlightAccounting { in_flight: usize, max_sending: usize },
}

use thiserror::Error;

use crate::domain::track::TrackCode;

/// Failure of a single request to the remote catalog
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("network error: {0}")]
    Network(String),

    #[error("track {0} not found")]
    TrackNotFound(TrackCode),

    #[error("catalog responded with status {0}")]
    Status(u16),

    #[error("invalid catalog response: {0}")]
    Parse(String),

    #[error("invalid catalog url: {0}")]
    Url(String),

    #[error("no remote catalog configured")]
    NotConfigured,
}

/// Why a track code could not be resolved to a catalog record.
///
/// Only used for logging; callers of `resolve` just see `Resolution::NotFound`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ResolutionFailure {
    #[error("remote catalog unreachable")]
    RemoteUnreachable,

    #[error("track not found")]
    NotFound,
}

impl From<&RemoteError> for ResolutionFailure {
    fn from(err: &RemoteError) -> Self {
        match err {
            RemoteError::TrackNotFound(_) => ResolutionFailure::NotFound,
            RemoteError::Network(_)
            | RemoteError::Status(_)
            | RemoteError::Parse(_)
            | RemoteError::Url(_)
            | RemoteError::NotConfigured => ResolutionFailure::RemoteUnreachable,
        }
    }
}

use thiserror::Error;

/// Transport-level failures of the to-do facade. Cloneable so that callers
/// sharing one in-flight fetch all receive the same error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("remote rejected the credential")]
    Unauthorized,
    #[error("not allowed to access this to-do")]
    Forbidden,
    #[error("rate limited by the remote to-do service")]
    RateLimited,
    #[error("remote to-do service is unreachable")]
    Unreachable,
    #[error("to-do not found")]
    NotFound,
    #[error("remote to-do service answered with status {0}")]
    Status(u16),
    #[error("could not decode remote response: {0}")]
    Decode(String),
}

impl ApiError {
    /// Label used for the `outcome` metric.
    pub fn outcome(&self) -> &'static str {
        match self {
            ApiError::Unauthorized => "unauthorized",
            ApiError::Forbidden => "forbidden",
            ApiError::RateLimited => "rate_limited",
            ApiError::Unreachable => "unreachable",
            ApiError::NotFound => "not_found",
            ApiError::Status(_) => "status",
            ApiError::Decode(_) => "decode",
        }
    }
}

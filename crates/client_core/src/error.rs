use shared::error::ApiError;
use thiserror::Error;

use crate::reorder::ReorderPlanError;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("a chapter reorder is already in progress")]
    Busy,
    #[error("no course is open")]
    NotLoaded,
    #[error(transparent)]
    InvalidOrder(#[from] ReorderPlanError),
    #[error("{}", .0.message)]
    Validation(ApiError),
    #[error("server rejected request ({:?}): {}", .0.code, .0.message)]
    Api(ApiError),
    #[error("server responded with unexpected status {0}")]
    UnexpectedStatus(u16),
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("invalid server url: {0}")]
    InvalidServerUrl(#[from] url::ParseError),
}

impl ClientError {
    /// The structured server failure, when the server produced one.
    pub fn api_error(&self) -> Option<&ApiError> {
        match self {
            Self::Api(err) | Self::Validation(err) => Some(err),
            _ => None,
        }
    }
}

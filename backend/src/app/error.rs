use services_common::api::response::ApiError;
use uuid::Uuid;

/// Failures of user-facing gallery operations. Messages are shown to the user as is.
#[derive(thiserror::Error, Debug)]
pub enum GalleryError {
    #[error("session {0} not found")]
    SessionNotFound(Uuid),
    #[error("invalid wallet address: {0}")]
    InvalidAddress(String),
    #[error("please switch your wallet to chain {expected} (connected to {actual})")]
    WrongChain { expected: u64, actual: u64 },
    #[error("no wallet connected")]
    NoActiveWallet,
    #[error("token {0} is not in your collection")]
    NotOwned(String),
    #[error("token {0} grants no event access")]
    NoEventAccess(String),
    #[error("invalid email address: {0}")]
    InvalidEmail(String),
    #[error("{0}")]
    Backend(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<GalleryError> for ApiError {
    fn from(err: GalleryError) -> Self {
        match err {
            GalleryError::SessionNotFound(_) => ApiError::NotFound(err.into()),
            GalleryError::InvalidAddress(_)
            | GalleryError::WrongChain { .. }
            | GalleryError::NoActiveWallet
            | GalleryError::NotOwned(_)
            | GalleryError::NoEventAccess(_)
            | GalleryError::InvalidEmail(_) => ApiError::InvalidRequest(err.into()),
            GalleryError::Backend(message) => ApiError::Upstream(message),
            GalleryError::Internal(err) => ApiError::Internal(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, response::IntoResponse};

    #[test]
    fn test_status_mapping() {
        let status = |err: GalleryError| ApiError::from(err).into_response().status();

        assert_eq!(
            status(GalleryError::SessionNotFound(Uuid::nil())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status(GalleryError::WrongChain {
                expected: 80002,
                actual: 1
            }),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status(GalleryError::NoEventAccess("7".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status(GalleryError::Backend("profile service unavailable".into())),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status(GalleryError::Internal(anyhow::anyhow!("boom"))),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}

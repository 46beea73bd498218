use service_core::error::AppError;
use thiserror::Error;

/// Domain errors of the authentication flows.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Missing, expired or mismatched session or token.
    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden")]
    Forbidden,

    #[error("Invalid or expired reset token")]
    InvalidResetToken,

    #[error("User not found")]
    UserNotFound,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error(transparent)]
    App(#[from] AppError),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::InvalidCredentials => {
                AppError::Unauthorized(anyhow::anyhow!("Invalid credentials"))
            }
            ServiceError::Unauthorized => AppError::Unauthorized(anyhow::anyhow!("Unauthorized")),
            ServiceError::Forbidden => AppError::Forbidden(anyhow::anyhow!("Forbidden")),
            ServiceError::InvalidResetToken => {
                AppError::BadRequest(anyhow::anyhow!("Invalid or expired reset token"))
            }
            ServiceError::UserNotFound => AppError::NotFound(anyhow::anyhow!("User not found")),
            ServiceError::ValidationError(e) => AppError::BadRequest(anyhow::anyhow!(e)),
            ServiceError::App(e) => e,
            ServiceError::Internal(e) => AppError::InternalError(e),
        }
    }
}

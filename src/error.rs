use thiserror::Error;

/// Errors surfaced by the user model and account services.
#[derive(Debug, Error)]
pub enum UserError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("email already registered")]
    EmailTaken,
    #[error("user not found")]
    NotFound,
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("reset token is invalid or has expired")]
    InvalidResetToken,
    #[error("password hashing failed: {0}")]
    Hash(String),
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

pub type UserResult<T> = Result<T, UserError>;

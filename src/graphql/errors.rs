use async_graphql::{Error, ErrorExtensions};
use tracing::error;

use crate::error::UserError;

impl ErrorExtensions for UserError {
    fn extend(&self) -> Error {
        let code = match self {
            UserError::Validation(_) | UserError::EmailTaken | UserError::InvalidResetToken => {
                "BAD_USER_INPUT"
            }
            UserError::InvalidCredentials => "UNAUTHENTICATED",
            UserError::NotFound => "NOT_FOUND",
            UserError::Hash(_) | UserError::Storage(_) => "INTERNAL",
        };
        let message = if code == "INTERNAL" {
            error!(error = %self, "internal error in resolver");
            "internal server error".to_string()
        } else {
            self.to_string()
        };
        Error::new(message).extend_with(|_, ext| ext.set("code", code))
    }
}

pub(crate) fn unauthenticated(message: &str) -> Error {
    Error::new(message).extend_with(|_, ext| ext.set("code", "UNAUTHENTICATED"))
}

pub(crate) fn forbidden() -> Error {
    Error::new("forbidden").extend_with(|_, ext| ext.set("code", "FORBIDDEN"))
}

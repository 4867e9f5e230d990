//! Password store error types
//!
//! Domain errors surfaced to the identity platform. Every variant carries a
//! stable string code and a stable numeric code, and keeps the underlying
//! directory error as its source.

use thiserror::Error;

/// Boxed source error carried as context.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Stable numeric codes reported alongside each error.
pub mod codes {
    /// Configuration rejected before any directory call.
    pub const INVALID_CONFIGURATION: u32 = 1463493500;
    /// Bind as the administrative account failed.
    pub const BIND_FAILED: u32 = 1463493600;
    /// Lookup failed while reading password metadata.
    pub const USER_NOT_FOUND_ON_GET_META: u32 = 1463493611;
    /// Lookup failed while setting a password.
    pub const USER_NOT_FOUND_ON_SET_PASSWORD: u32 = 1463493653;
    /// Entry carries the configured disabled marker.
    pub const ACCOUNT_LOCKED: u32 = 1472740480;
    /// The new password could not be staged on the entry.
    pub const PASSWORD_UPDATE_FAILED: u32 = 1464018255;
    /// The entry modification was not accepted by the directory.
    pub const PASSWORD_SAVE_FAILED: u32 = 1464018242;
}

/// Message shown when the directory rejects a password on policy grounds.
pub const PASSWORD_REJECTED_MESSAGE: &str =
    "Unable to change password. If this password has been used before please use something different.";

/// Error that can occur during password store operations.
#[derive(Debug, Error)]
pub enum PasswordStoreError {
    /// The store configuration is incomplete or inconsistent.
    #[error("invalid configuration: {message}")]
    InvalidConfiguration { message: String },

    /// Could not authenticate to the directory.
    #[error("unable to bind to directory: {message}")]
    BindFailure {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// No single entry matches the employee id, or the search itself failed.
    #[error("user not found")]
    UserNotFound {
        code: u32,
        #[source]
        source: Option<BoxError>,
    },

    /// The entry matched but is administratively disabled.
    #[error("account locked")]
    AccountLocked,

    /// Attribute staging or entry save failed for a reason other than policy.
    #[error("{message}")]
    ServerError {
        code: u32,
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// The directory refused the new password (reuse or policy violation).
    #[error("{}", PASSWORD_REJECTED_MESSAGE)]
    PasswordRejected {
        #[source]
        source: Option<BoxError>,
    },
}

impl PasswordStoreError {
    /// Get an error code for classification.
    pub fn error_code(&self) -> &'static str {
        match self {
            PasswordStoreError::InvalidConfiguration { .. } => "INVALID_CONFIG",
            PasswordStoreError::BindFailure { .. } => "BIND_FAILED",
            PasswordStoreError::UserNotFound { .. } => "USER_NOT_FOUND",
            PasswordStoreError::AccountLocked => "ACCOUNT_LOCKED",
            PasswordStoreError::ServerError { .. } => "SERVER_ERROR",
            PasswordStoreError::PasswordRejected { .. } => "PASSWORD_REJECTED",
        }
    }

    /// Get the numeric code reported to the platform.
    pub fn code(&self) -> u32 {
        match self {
            PasswordStoreError::InvalidConfiguration { .. } => codes::INVALID_CONFIGURATION,
            PasswordStoreError::BindFailure { .. } => codes::BIND_FAILED,
            PasswordStoreError::UserNotFound { code, .. } => *code,
            PasswordStoreError::AccountLocked => codes::ACCOUNT_LOCKED,
            PasswordStoreError::ServerError { code, .. } => *code,
            PasswordStoreError::PasswordRejected { .. } => codes::PASSWORD_SAVE_FAILED,
        }
    }

    /// Whether the message is meant to be shown to the end user as-is.
    ///
    /// Everything else should be reported as a generic failure.
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            PasswordStoreError::UserNotFound { .. }
                | PasswordStoreError::AccountLocked
                | PasswordStoreError::PasswordRejected { .. }
        )
    }

    // Convenience constructors

    /// Create an invalid configuration error.
    pub fn invalid_configuration(message: impl Into<String>) -> Self {
        PasswordStoreError::InvalidConfiguration {
            message: message.into(),
        }
    }

    /// Create a bind failure with source.
    pub fn bind_failure_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        PasswordStoreError::BindFailure {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a user-not-found error.
    pub fn user_not_found(code: u32) -> Self {
        PasswordStoreError::UserNotFound { code, source: None }
    }

    /// Create a user-not-found error with source.
    pub fn user_not_found_with_source(
        code: u32,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        PasswordStoreError::UserNotFound {
            code,
            source: Some(Box::new(source)),
        }
    }

    /// Create a server error with source.
    pub fn server_error_with_source(
        code: u32,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        PasswordStoreError::ServerError {
            code,
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a password-rejected error with source.
    pub fn password_rejected_with_source(
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        PasswordStoreError::PasswordRejected {
            source: Some(Box::new(source)),
        }
    }
}

/// Result type for password store operations.
pub type PasswordStoreResult<T> = Result<T, PasswordStoreError>;

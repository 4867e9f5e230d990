//! Password store trait
//!
//! The capability the identity platform calls into. Implementations own their
//! connection handling; every call is independent.

use async_trait::async_trait;

use crate::error::PasswordStoreResult;
use crate::meta::UserPasswordMeta;

/// A backend that can report and change a user's password.
///
/// Users are addressed by their employee id, never by a backend-specific
/// identifier.
#[async_trait]
pub trait PasswordStore: Send + Sync {
    /// Get the display name for this store instance.
    fn display_name(&self) -> &str;

    /// Read password expiry and last-change metadata for a user.
    async fn get_meta(&self, employee_id: &str) -> PasswordStoreResult<UserPasswordMeta>;

    /// Set a new password for a user and return the resulting metadata.
    async fn set_password(
        &self,
        employee_id: &str,
        password: &str,
    ) -> PasswordStoreResult<UserPasswordMeta>;
}

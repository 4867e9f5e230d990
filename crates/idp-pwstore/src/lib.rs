//! # Password Store
//!
//! Contract between the identity platform's password management and the
//! stores that hold user passwords.
//!
//! - [`PasswordStore`] - the trait every store implements
//! - [`UserPasswordMeta`] - expiry and last-change metadata
//! - [`PasswordStoreError`] - error taxonomy with stable codes

pub mod error;
pub mod meta;
pub mod traits;

pub use error::{codes, PasswordStoreError, PasswordStoreResult};
pub use meta::{parse_generalized_time, UserPasswordMeta};
pub use traits::PasswordStore;

// Re-export async_trait for store implementors
pub use async_trait::async_trait;

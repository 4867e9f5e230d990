//! # LDAP Password Store
//!
//! Reads password metadata and changes passwords in an LDAP directory for
//! users identified by an employee id attribute rather than a DN.
//!
//! ## Features
//!
//! - StartTLS or LDAPS transport (StartTLS wins when both are requested)
//! - Lookup by a configurable employee id attribute
//! - Locked-account detection through a marker attribute
//! - Auxiliary attribute removals and forced updates on password change,
//!   committed with the password in a single modify request
//! - Optional attribute/value condition gating the password write
//! - Password policy rejections reported separately from server errors
//!
//! ## Example
//!
//! ```ignore
//! use idp_pwstore::PasswordStore;
//! use idp_pwstore_ldap::{LdapConfig, LdapPasswordStore};
//!
//! let config = LdapConfig::new(
//!     "ldap.example.org",
//!     "ou=people,dc=example,dc=org",
//!     "cn=Manager,dc=example,dc=org",
//!     "secret",
//! )
//! .with_employee_id_attribute("employeeNumber")
//! .with_password_date_attributes("pwdChangedTime", "modifyTimestamp")
//! .with_user_password_attribute("userPassword")
//! .with_remove_attribute("pwdAccountLockedTime");
//!
//! let store = LdapPasswordStore::new(config)?;
//! let meta = store.set_password("10131", "n3w-passw0rd").await?;
//! ```

pub mod changeset;
pub mod client;
pub mod config;
pub mod directory;
pub mod store;

// Re-exports
pub use client::Ldap3Directory;
pub use config::{AttributeCondition, LdapConfig, Transport};
pub use directory::{
    Directory, DirectoryError, DirectoryResult, DirectorySession, Entry, Modification,
};
pub use store::LdapPasswordStore;

//! LDAP password store
//!
//! Implements [`PasswordStore`] against an LDAP directory, addressing users by
//! employee id. Every operation binds its own session; nothing is shared
//! between calls apart from the immutable configuration.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use idp_pwstore::error::{codes, PasswordStoreError, PasswordStoreResult};
use idp_pwstore::meta::UserPasswordMeta;
use idp_pwstore::traits::PasswordStore;

use crate::changeset::ChangeSet;
use crate::client::Ldap3Directory;
use crate::config::LdapConfig;
use crate::directory::{equality_filter, Directory, DirectoryError, DirectorySession, Entry};

const SERVER_ERROR_ON_UPDATE: &str = "Unable to update user's password, server error.";
const SERVER_ERROR_ON_SAVE: &str = "Unable to change password, server error.";

/// Password store backed by an LDAP directory.
pub struct LdapPasswordStore {
    /// Configuration.
    config: LdapConfig,

    /// Display name for this store instance.
    display_name: String,

    /// Opens a fresh session for each operation.
    directory: Arc<dyn Directory>,
}

impl LdapPasswordStore {
    /// Create a store that talks to the configured server.
    pub fn new(config: LdapConfig) -> PasswordStoreResult<Self> {
        Self::with_directory(config, Arc::new(Ldap3Directory::new()))
    }

    /// Create a store on top of a custom directory client.
    pub fn with_directory(
        config: LdapConfig,
        directory: Arc<dyn Directory>,
    ) -> PasswordStoreResult<Self> {
        config.validate()?;

        let display_name = format!("LDAP: {}", config.host);

        Ok(Self {
            config,
            display_name,
            directory,
        })
    }

    /// Get the configuration.
    pub fn config(&self) -> &LdapConfig {
        &self.config
    }

    /// Open a new session bound as the administrative account.
    #[instrument(skip(self), fields(host = %self.config.host))]
    pub async fn connect(&self) -> PasswordStoreResult<Box<dyn DirectorySession>> {
        let session = self.directory.bind(&self.config).await.map_err(|e| {
            warn!(
                error = %e,
                url = %self.config.url(),
                bind_dn = %self.config.admin_username,
                "LDAP bind failed"
            );
            let message = if e.is_invalid_credentials() {
                "invalid credentials"
            } else {
                "directory unavailable"
            };
            PasswordStoreError::bind_failure_with_source(message, e)
        })?;

        debug!("LDAP session established");
        Ok(session)
    }

    /// Find the single entry whose employee id attribute equals `employee_id`.
    ///
    /// Search errors, no match and multiple matches all fail with
    /// `UserNotFound` carrying `not_found_code`.
    async fn find_entry(
        &self,
        session: &mut dyn DirectorySession,
        employee_id: &str,
        attributes: &[String],
        not_found_code: u32,
    ) -> PasswordStoreResult<Entry> {
        let filter = equality_filter(&self.config.employee_id_attribute, employee_id);

        let entries = session
            .search(&self.config.base_dn, &filter, attributes)
            .await
            .map_err(|e| {
                warn!(error = %e, filter = %filter, "LDAP search failed");
                PasswordStoreError::user_not_found_with_source(not_found_code, e)
            })?;

        let mut entries = entries.into_iter();
        match (entries.next(), entries.next()) {
            (Some(entry), None) => Ok(entry),
            (None, _) => {
                debug!(filter = %filter, "No entry matched");
                Err(PasswordStoreError::user_not_found(not_found_code))
            }
            (Some(_), Some(_)) => {
                warn!(filter = %filter, "Employee id matched more than one entry");
                Err(PasswordStoreError::user_not_found_with_source(
                    not_found_code,
                    DirectoryError::Search {
                        message: format!("multiple entries match {filter}"),
                    },
                ))
            }
        }
    }

    /// Attributes fetched for metadata reads.
    fn meta_attributes(&self) -> Vec<String> {
        let mut attributes = vec![
            self.config.password_expire_date_attribute.clone(),
            self.config.password_last_change_date_attribute.clone(),
        ];
        if let Some((attribute, _)) = self.config.account_disabled_marker() {
            attributes.push(attribute.to_string());
        }
        attributes
    }

    /// Attributes fetched before a password change.
    ///
    /// `*` covers user attributes; operational ones such as `pwdPolicySubentry`
    /// are only returned when named, so every configured name is listed too.
    fn set_password_attributes(&self) -> Vec<String> {
        let mut attributes = vec!["*".to_string()];
        attributes.extend(self.config.remove_attributes_on_set_password.iter().cloned());
        attributes.extend(
            self.config
                .update_attributes_on_set_password
                .iter()
                .map(|(name, _)| name.clone()),
        );
        if let Some(condition) = &self.config.update_password_if_attribute_and_value {
            attributes.push(condition.attribute.clone());
        }
        attributes
    }

    fn is_account_disabled(&self, entry: &Entry) -> bool {
        match self.config.account_disabled_marker() {
            Some((attribute, value)) => entry.first_value(attribute) == Some(value),
            None => false,
        }
    }

    fn password_update_allowed(&self, entry: &Entry) -> bool {
        match &self.config.update_password_if_attribute_and_value {
            Some(condition) => {
                entry.first_value(&condition.attribute) == Some(condition.value.as_str())
            }
            None => true,
        }
    }

    /// Stage the password and the auxiliary attribute changes.
    fn build_changes<'a>(
        &self,
        entry: &'a Entry,
        password: &str,
    ) -> PasswordStoreResult<ChangeSet<'a>> {
        if password.is_empty() {
            return Err(PasswordStoreError::server_error_with_source(
                codes::PASSWORD_UPDATE_FAILED,
                SERVER_ERROR_ON_UPDATE,
                DirectoryError::Protocol {
                    message: format!(
                        "refusing to write an empty {}",
                        self.config.user_password_attribute
                    ),
                },
            ));
        }

        let mut changes = ChangeSet::new(entry);
        changes.replace(&self.config.user_password_attribute, password);

        for attribute in &self.config.remove_attributes_on_set_password {
            changes.clear(attribute);
        }

        for (attribute, value) in &self.config.update_attributes_on_set_password {
            changes.upsert(attribute, value);
        }

        Ok(changes)
    }

    async fn read_meta(&self, employee_id: &str) -> PasswordStoreResult<UserPasswordMeta> {
        let mut session = self.connect().await?;
        let result = self.read_meta_in(session.as_mut(), employee_id).await;
        self.close(session).await;
        result
    }

    async fn read_meta_in(
        &self,
        session: &mut dyn DirectorySession,
        employee_id: &str,
    ) -> PasswordStoreResult<UserPasswordMeta> {
        let entry = self
            .find_entry(
                session,
                employee_id,
                &self.meta_attributes(),
                codes::USER_NOT_FOUND_ON_GET_META,
            )
            .await?;

        if self.is_account_disabled(&entry) {
            info!(dn = %entry.dn, "Account is locked");
            return Err(PasswordStoreError::AccountLocked);
        }

        let value_of = |attribute: &str| entry.first_value(attribute).map(str::to_string);

        Ok(UserPasswordMeta::new(
            value_of(&self.config.password_expire_date_attribute),
            value_of(&self.config.password_last_change_date_attribute),
        ))
    }

    async fn write_password(
        &self,
        session: &mut dyn DirectorySession,
        employee_id: &str,
        password: &str,
    ) -> PasswordStoreResult<()> {
        let entry = self
            .find_entry(
                session,
                employee_id,
                &self.set_password_attributes(),
                codes::USER_NOT_FOUND_ON_SET_PASSWORD,
            )
            .await?;

        if !self.password_update_allowed(&entry) {
            info!(
                dn = %entry.dn,
                "Entry does not meet the update condition, leaving password unchanged"
            );
            return Ok(());
        }

        let changes = self.build_changes(&entry, password)?;
        let dn = changes.dn().to_string();
        let modifications = changes.into_modifications();

        debug!(dn = %dn, modification_count = modifications.len(), "Saving password change");

        session
            .modify(&dn, modifications)
            .await
            .map_err(map_save_error)?;

        info!(dn = %dn, "Password changed successfully");
        Ok(())
    }

    async fn close(&self, mut session: Box<dyn DirectorySession>) {
        if let Err(e) = session.unbind().await {
            warn!(error = %e, "Error during LDAP unbind");
        }
    }
}

/// Translate a failed save into a domain error.
///
/// Password policy rejections only surface through the server's message, so
/// the message is inspected for "constraint violation".
fn map_save_error(error: DirectoryError) -> PasswordStoreError {
    if is_constraint_violation(&error.to_string()) {
        warn!(error = %error, "Directory rejected the new password");
        PasswordStoreError::password_rejected_with_source(error)
    } else {
        warn!(error = %error, "Saving the password change failed");
        PasswordStoreError::server_error_with_source(
            codes::PASSWORD_SAVE_FAILED,
            SERVER_ERROR_ON_SAVE,
            error,
        )
    }
}

fn is_constraint_violation(message: &str) -> bool {
    message.to_lowercase().contains("constraint violation")
}

#[async_trait]
impl PasswordStore for LdapPasswordStore {
    fn display_name(&self) -> &str {
        &self.display_name
    }

    #[instrument(skip(self))]
    async fn get_meta(&self, employee_id: &str) -> PasswordStoreResult<UserPasswordMeta> {
        self.read_meta(employee_id).await
    }

    #[instrument(skip(self, password))]
    async fn set_password(
        &self,
        employee_id: &str,
        password: &str,
    ) -> PasswordStoreResult<UserPasswordMeta> {
        let mut session = self.connect().await?;
        let result = self
            .write_password(session.as_mut(), employee_id, password)
            .await;
        self.close(session).await;
        result?;

        self.read_meta(employee_id).await
    }
}

impl std::fmt::Debug for LdapPasswordStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LdapPasswordStore")
            .field("display_name", &self.display_name)
            .field("config", &self.config.redacted())
            .finish()
    }
}

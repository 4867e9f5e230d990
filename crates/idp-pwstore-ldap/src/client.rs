//! `ldap3`-backed directory client

use async_trait::async_trait;
use ldap3::{Ldap, LdapConnAsync, LdapConnSettings, Mod, Scope, SearchEntry};
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::{LdapConfig, Transport};
use crate::directory::{
    Directory, DirectoryError, DirectoryResult, DirectorySession, Entry, Modification,
};

/// Opens real LDAP sessions.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ldap3Directory;

impl Ldap3Directory {
    /// Create a new client.
    pub fn new() -> Self {
        Self
    }

    fn settings(config: &LdapConfig) -> LdapConnSettings {
        let mut settings = LdapConnSettings::new()
            .set_starttls(config.transport() == Transport::StartTls)
            .set_no_tls_verify(!config.verify_certificate);

        if let Some(secs) = config.connection_timeout_secs {
            settings = settings.set_conn_timeout(Duration::from_secs(secs));
        }

        settings
    }
}

#[async_trait]
impl Directory for Ldap3Directory {
    async fn bind(&self, config: &LdapConfig) -> DirectoryResult<Box<dyn DirectorySession>> {
        let url = config.url();

        debug!(url = %url, transport = ?config.transport(), "Connecting to LDAP server");

        let (conn, mut ldap) = LdapConnAsync::with_settings(Self::settings(config), &url)
            .await
            .map_err(|e| DirectoryError::Connect {
                url: url.clone(),
                message: e.to_string(),
            })?;

        // Spawn the connection driver
        tokio::spawn(async move {
            if let Err(e) = conn.drive().await {
                warn!(error = %e, "LDAP connection driver error");
            }
        });

        debug!(bind_dn = %config.admin_username, "Performing LDAP bind");

        let result = ldap
            .simple_bind(&config.admin_username, &config.admin_password)
            .await
            .map_err(|e| DirectoryError::Bind {
                bind_dn: config.admin_username.clone(),
                rc: 0,
                message: e.to_string(),
            })?;

        if result.rc != 0 {
            return Err(DirectoryError::Bind {
                bind_dn: config.admin_username.clone(),
                rc: result.rc,
                message: describe_result(result.rc, &result.text),
            });
        }

        Ok(Box::new(Ldap3Session { ldap }))
    }
}

/// A bound `ldap3` handle.
struct Ldap3Session {
    ldap: Ldap,
}

#[async_trait]
impl DirectorySession for Ldap3Session {
    async fn search(
        &mut self,
        base_dn: &str,
        filter: &str,
        attributes: &[String],
    ) -> DirectoryResult<Vec<Entry>> {
        debug!(filter = %filter, base_dn = %base_dn, "Searching LDAP");

        let result = self
            .ldap
            .search(base_dn, Scope::Subtree, filter, attributes.to_vec())
            .await
            .map_err(|e| DirectoryError::Search {
                message: e.to_string(),
            })?;

        let (entries, _) = result.success().map_err(|e| DirectoryError::Search {
            message: e.to_string(),
        })?;

        Ok(entries
            .into_iter()
            .map(SearchEntry::construct)
            .map(Entry::from)
            .collect())
    }

    async fn modify(&mut self, dn: &str, modifications: Vec<Modification>) -> DirectoryResult<()> {
        let mods: Vec<Mod<String>> = modifications.into_iter().map(to_ldap3_mod).collect();

        debug!(dn = %dn, modification_count = mods.len(), "Modifying LDAP entry");

        let result = self
            .ldap
            .modify(dn, mods)
            .await
            .map_err(|e| DirectoryError::Protocol {
                message: e.to_string(),
            })?;

        if result.rc != 0 {
            return Err(DirectoryError::Modify {
                rc: result.rc,
                message: describe_result(result.rc, &result.text),
            });
        }

        Ok(())
    }

    async fn unbind(&mut self) -> DirectoryResult<()> {
        self.ldap
            .unbind()
            .await
            .map_err(|e| DirectoryError::Protocol {
                message: e.to_string(),
            })
    }
}

fn to_ldap3_mod(modification: Modification) -> Mod<String> {
    match modification {
        Modification::Add(name, values) => Mod::Add(name, values.into_iter().collect()),
        Modification::Replace(name, values) => Mod::Replace(name, values.into_iter().collect()),
        Modification::Delete(name) => Mod::Delete(name, HashSet::new()),
    }
}

/// Human-readable message for an LDAP result, in the wording libldap uses.
///
/// Keeping the descriptive name in the message lets callers classify a failure
/// from its text alone (e.g. "Constraint violation" for password reuse).
pub(crate) fn describe_result(rc: u32, text: &str) -> String {
    let name = match rc {
        1 => "Operations error",
        2 => "Protocol error",
        3 => "Time limit exceeded",
        4 => "Size limit exceeded",
        7 => "Authentication method not supported",
        8 => "Strong(er) authentication required",
        13 => "Confidentiality required",
        16 => "No such attribute",
        17 => "Undefined attribute type",
        18 => "Inappropriate matching",
        19 => "Constraint violation",
        20 => "Type or value exists",
        21 => "Invalid syntax",
        32 => "No such object",
        34 => "Invalid DN syntax",
        48 => "Inappropriate authentication",
        49 => "Invalid credentials",
        50 => "Insufficient access",
        51 => "Server is busy",
        52 => "Server is unavailable",
        53 => "Server is unwilling to perform",
        64 => "Naming violation",
        65 => "Object class violation",
        69 => "Cannot modify object class",
        80 => "Internal (implementation specific) error",
        _ => "Unknown error",
    };

    if text.is_empty() {
        format!("{name} (rc={rc})")
    } else {
        format!("{name} (rc={rc}): {text}")
    }
}

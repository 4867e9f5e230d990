//! LDAP password store configuration
//!
//! Connection settings and the attribute mappings that drive lookup, metadata
//! extraction and the password change.

use serde::{Deserialize, Serialize};

use idp_pwstore::error::{PasswordStoreError, PasswordStoreResult};

/// How the connection to the directory is secured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    /// Plain LDAP.
    Plain,
    /// Plain LDAP upgraded with StartTLS.
    StartTls,
    /// LDAP over SSL (`ldaps://`).
    Ldaps,
}

/// Attribute/value pair an entry must hold before its password is written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeCondition {
    /// Attribute to read from the entry.
    pub attribute: String,

    /// Value the attribute must have.
    pub value: String,
}

/// Configuration for the LDAP password store.
#[derive(Clone, Serialize, Deserialize)]
pub struct LdapConfig {
    /// LDAP server hostname or IP address.
    pub host: String,

    /// LDAP server port.
    #[serde(default = "default_ldap_port")]
    pub port: u16,

    /// Upgrade the connection with StartTLS. Takes priority over `use_ssl`.
    #[serde(default = "default_true")]
    pub use_tls: bool,

    /// Use LDAPS.
    #[serde(default)]
    pub use_ssl: bool,

    /// Base DN searched for users (e.g., "ou=people,dc=example,dc=org").
    pub base_dn: String,

    /// DN of the administrative account used to bind.
    pub admin_username: String,

    /// Password of the administrative account.
    pub admin_password: String,

    /// Attribute holding the employee id.
    pub employee_id_attribute: String,

    /// Attribute holding the time the password was last changed.
    pub password_last_change_date_attribute: String,

    /// Attribute holding the time the password expires.
    pub password_expire_date_attribute: String,

    /// Attribute written with the new password.
    pub user_password_attribute: String,

    /// Attributes deleted when a password is set (e.g., lock flags).
    #[serde(default)]
    pub remove_attributes_on_set_password: Vec<String>,

    /// Attributes forced to a value when a password is set.
    ///
    /// Kept as ordered pairs so modifications go out in configuration order.
    #[serde(default, with = "ordered_map")]
    pub update_attributes_on_set_password: Vec<(String, String)>,

    /// Only write the password when the entry matches this condition.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_password_if_attribute_and_value: Option<AttributeCondition>,

    /// Attribute marking an account as disabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_account_disabled_attribute: Option<String>,

    /// Value of `user_account_disabled_attribute` meaning "disabled".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_account_disabled_value: Option<String>,

    /// Verify the server certificate on TLS connections.
    #[serde(default = "default_true")]
    pub verify_certificate: bool,

    /// Connect timeout handed to the LDAP client. The client default applies when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_timeout_secs: Option<u64>,
}

impl std::fmt::Debug for LdapConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LdapConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("use_tls", &self.use_tls)
            .field("use_ssl", &self.use_ssl)
            .field("base_dn", &self.base_dn)
            .field("admin_username", &self.admin_username)
            .field("admin_password", &REDACTED)
            .field("employee_id_attribute", &self.employee_id_attribute)
            .field(
                "password_last_change_date_attribute",
                &self.password_last_change_date_attribute,
            )
            .field(
                "password_expire_date_attribute",
                &self.password_expire_date_attribute,
            )
            .field("user_password_attribute", &self.user_password_attribute)
            .field(
                "remove_attributes_on_set_password",
                &self.remove_attributes_on_set_password,
            )
            .field(
                "update_attributes_on_set_password",
                &self.update_attributes_on_set_password,
            )
            .field(
                "update_password_if_attribute_and_value",
                &self.update_password_if_attribute_and_value,
            )
            .field(
                "user_account_disabled_attribute",
                &self.user_account_disabled_attribute,
            )
            .field(
                "user_account_disabled_value",
                &self.user_account_disabled_value,
            )
            .field("verify_certificate", &self.verify_certificate)
            .field("connection_timeout_secs", &self.connection_timeout_secs)
            .finish()
    }
}

const REDACTED: &str = "***REDACTED***";

fn default_ldap_port() -> u16 {
    636
}

fn default_true() -> bool {
    true
}

impl LdapConfig {
    /// Create a new config with connection fields and empty attribute mappings.
    pub fn new(
        host: impl Into<String>,
        base_dn: impl Into<String>,
        admin_username: impl Into<String>,
        admin_password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port: default_ldap_port(),
            use_tls: true,
            use_ssl: false,
            base_dn: base_dn.into(),
            admin_username: admin_username.into(),
            admin_password: admin_password.into(),
            employee_id_attribute: String::new(),
            password_last_change_date_attribute: String::new(),
            password_expire_date_attribute: String::new(),
            user_password_attribute: String::new(),
            remove_attributes_on_set_password: Vec::new(),
            update_attributes_on_set_password: Vec::new(),
            update_password_if_attribute_and_value: None,
            user_account_disabled_attribute: None,
            user_account_disabled_value: None,
            verify_certificate: true,
            connection_timeout_secs: None,
        }
    }

    /// Set the port.
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Enable or disable StartTLS.
    #[must_use]
    pub fn with_tls(mut self, use_tls: bool) -> Self {
        self.use_tls = use_tls;
        self
    }

    /// Enable or disable LDAPS.
    #[must_use]
    pub fn with_ssl(mut self, use_ssl: bool) -> Self {
        self.use_ssl = use_ssl;
        self
    }

    /// Set the attribute holding the employee id.
    #[must_use]
    pub fn with_employee_id_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.employee_id_attribute = attribute.into();
        self
    }

    /// Set the last-change and expiry timestamp attributes.
    #[must_use]
    pub fn with_password_date_attributes(
        mut self,
        last_change: impl Into<String>,
        expire: impl Into<String>,
    ) -> Self {
        self.password_last_change_date_attribute = last_change.into();
        self.password_expire_date_attribute = expire.into();
        self
    }

    /// Set the attribute written with the new password.
    #[must_use]
    pub fn with_user_password_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.user_password_attribute = attribute.into();
        self
    }

    /// Add an attribute to delete when a password is set.
    #[must_use]
    pub fn with_remove_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.remove_attributes_on_set_password.push(attribute.into());
        self
    }

    /// Add an attribute to force-set when a password is set.
    #[must_use]
    pub fn with_update_attribute(
        mut self,
        attribute: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        let attribute = attribute.into();
        let value = value.into();
        match self
            .update_attributes_on_set_password
            .iter_mut()
            .find(|(name, _)| name.eq_ignore_ascii_case(&attribute))
        {
            Some(existing) => existing.1 = value,
            None => self
                .update_attributes_on_set_password
                .push((attribute, value)),
        }
        self
    }

    /// Only write the password when `attribute` currently equals `value`.
    #[must_use]
    pub fn with_update_password_condition(
        mut self,
        attribute: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.update_password_if_attribute_and_value = Some(AttributeCondition {
            attribute: attribute.into(),
            value: value.into(),
        });
        self
    }

    /// Treat accounts whose `attribute` equals `value` as locked.
    #[must_use]
    pub fn with_account_disabled_marker(
        mut self,
        attribute: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.user_account_disabled_attribute = Some(attribute.into());
        self.user_account_disabled_value = Some(value.into());
        self
    }

    /// Disable server certificate verification.
    #[must_use]
    pub fn without_certificate_verification(mut self) -> Self {
        self.verify_certificate = false;
        self
    }

    /// Set the connect timeout.
    #[must_use]
    pub fn with_connection_timeout(mut self, secs: u64) -> Self {
        self.connection_timeout_secs = Some(secs);
        self
    }

    /// Resolve the transport. StartTLS wins when both TLS and SSL are requested.
    #[must_use]
    pub fn transport(&self) -> Transport {
        if self.use_tls {
            Transport::StartTls
        } else if self.use_ssl {
            Transport::Ldaps
        } else {
            Transport::Plain
        }
    }

    /// Get the LDAP URL.
    #[must_use]
    pub fn url(&self) -> String {
        let scheme = match self.transport() {
            Transport::Ldaps => "ldaps",
            Transport::Plain | Transport::StartTls => "ldap",
        };
        format!("{}://{}:{}", scheme, self.host, self.port)
    }

    /// The disabled marker, when both halves are configured.
    #[must_use]
    pub fn account_disabled_marker(&self) -> Option<(&str, &str)> {
        match (
            &self.user_account_disabled_attribute,
            &self.user_account_disabled_value,
        ) {
            (Some(attribute), Some(value)) => Some((attribute.as_str(), value.as_str())),
            _ => None,
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> PasswordStoreResult<()> {
        let required = [
            ("host", &self.host),
            ("base_dn", &self.base_dn),
            ("admin_username", &self.admin_username),
            ("employee_id_attribute", &self.employee_id_attribute),
            (
                "password_last_change_date_attribute",
                &self.password_last_change_date_attribute,
            ),
            (
                "password_expire_date_attribute",
                &self.password_expire_date_attribute,
            ),
            ("user_password_attribute", &self.user_password_attribute),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(PasswordStoreError::invalid_configuration(format!(
                    "{name} is required"
                )));
            }
        }

        if self.port == 0 {
            return Err(PasswordStoreError::invalid_configuration(
                "port must be non-zero",
            ));
        }

        if self.user_account_disabled_attribute.is_some()
            != self.user_account_disabled_value.is_some()
        {
            return Err(PasswordStoreError::invalid_configuration(
                "user_account_disabled_attribute and user_account_disabled_value must be set together",
            ));
        }

        if let Some(condition) = &self.update_password_if_attribute_and_value {
            if condition.attribute.trim().is_empty() {
                return Err(PasswordStoreError::invalid_configuration(
                    "update_password_if_attribute_and_value requires an attribute name",
                ));
            }
        }

        if self
            .remove_attributes_on_set_password
            .iter()
            .chain(self.update_attributes_on_set_password.iter().map(|(n, _)| n))
            .any(|name| name.trim().is_empty())
        {
            return Err(PasswordStoreError::invalid_configuration(
                "attribute names on set password must not be empty",
            ));
        }

        Ok(())
    }

    /// Create a redacted copy for logging/display.
    #[must_use]
    pub fn redacted(&self) -> Self {
        let mut config = self.clone();
        config.admin_password = REDACTED.to_string();
        config
    }
}

/// Serialize `Vec<(String, String)>` as a map while keeping insertion order.
mod ordered_map {
    use serde::de::{MapAccess, Visitor};
    use serde::ser::SerializeMap;
    use serde::{Deserializer, Serializer};
    use std::fmt;

    pub fn serialize<S>(pairs: &[(String, String)], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(pairs.len()))?;
        for (key, value) in pairs {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<(String, String)>, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct PairsVisitor;

        impl<'de> Visitor<'de> for PairsVisitor {
            type Value = Vec<(String, String)>;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of attribute names to values")
            }

            fn visit_map<A>(self, mut access: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut pairs = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((key, value)) = access.next_entry::<String, String>()? {
                    pairs.push((key, value));
                }
                Ok(pairs)
            }
        }

        deserializer.deserialize_map(PairsVisitor)
    }
}

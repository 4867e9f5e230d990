//! Directory client seam
//!
//! The minimal set of directory operations the password store needs: bind,
//! search, modify and unbind. [`crate::client::Ldap3Directory`] implements it
//! over the network; tests supply an in-memory directory.

use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;

use crate::config::LdapConfig;

/// Error raised by a directory client.
///
/// These never leave the crate's public operations; the store translates them
/// into [`idp_pwstore::PasswordStoreError`].
#[derive(Debug, Error)]
pub enum DirectoryError {
    /// Could not open a connection to the server.
    #[error("connection to {url} failed: {message}")]
    Connect { url: String, message: String },

    /// The server rejected the bind.
    #[error("bind as {bind_dn} failed (rc={rc}): {message}")]
    Bind {
        bind_dn: String,
        rc: u32,
        message: String,
    },

    /// The search request failed.
    #[error("search failed: {message}")]
    Search { message: String },

    /// The modify request failed.
    #[error("{message}")]
    Modify { rc: u32, message: String },

    /// Any other protocol-level failure.
    #[error("directory protocol error: {message}")]
    Protocol { message: String },
}

impl DirectoryError {
    /// Whether the server reported invalid bind credentials.
    pub fn is_invalid_credentials(&self) -> bool {
        matches!(self, DirectoryError::Bind { rc: 49, .. })
    }
}

/// Result type for directory client operations.
pub type DirectoryResult<T> = Result<T, DirectoryError>;

/// A directory entry as returned by a search.
///
/// Attribute names compare case-insensitively, as they do in LDAP.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Entry {
    /// Distinguished name of the entry.
    pub dn: String,

    attrs: HashMap<String, Vec<String>>,

    /// Attributes present with non-UTF-8 values; only their names are kept.
    binary: Vec<String>,
}

impl Entry {
    /// Create an empty entry.
    pub fn new(dn: impl Into<String>) -> Self {
        Self {
            dn: dn.into(),
            attrs: HashMap::new(),
            binary: Vec::new(),
        }
    }

    /// Builder-style attribute insertion.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, values: Vec<String>) -> Self {
        self.insert(name, values);
        self
    }

    /// Set all values of an attribute. An empty list removes the attribute.
    pub fn insert(&mut self, name: impl Into<String>, values: Vec<String>) {
        let name = name.into();
        self.remove(&name);
        if !values.is_empty() {
            self.attrs.insert(name, values);
        }
    }

    /// Record an attribute whose values are binary.
    ///
    /// It counts as present, but [`Entry::values`] never exposes it.
    pub fn insert_binary(&mut self, name: impl Into<String>) {
        let name = name.into();
        self.remove(&name);
        self.binary.push(name);
    }

    /// Remove an attribute, returning its values if it was present.
    ///
    /// A binary attribute is removed too but yields an empty list.
    pub fn remove(&mut self, name: &str) -> Option<Vec<String>> {
        let before = self.binary.len();
        self.binary.retain(|b| !b.eq_ignore_ascii_case(name));
        let was_binary = self.binary.len() != before;

        match self.key_of(name).map(str::to_string) {
            Some(key) => self.attrs.remove(&key),
            None if was_binary => Some(Vec::new()),
            None => None,
        }
    }

    /// Whether the entry holds at least one value for the attribute.
    pub fn has_attribute(&self, name: &str) -> bool {
        self.key_of(name).is_some() || self.is_binary(name)
    }

    /// Whether the attribute is present with binary values.
    pub fn is_binary(&self, name: &str) -> bool {
        self.binary.iter().any(|b| b.eq_ignore_ascii_case(name))
    }

    /// All values of an attribute.
    pub fn values(&self, name: &str) -> Option<&[String]> {
        self.key_of(name)
            .and_then(|key| self.attrs.get(key))
            .map(Vec::as_slice)
    }

    /// First value of an attribute.
    pub fn first_value(&self, name: &str) -> Option<&str> {
        self.values(name)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    /// Names of the attributes with string values.
    pub fn attribute_names(&self) -> impl Iterator<Item = &str> {
        self.attrs.keys().map(String::as_str)
    }

    fn key_of(&self, name: &str) -> Option<&str> {
        self.attrs
            .keys()
            .find(|key| key.eq_ignore_ascii_case(name))
            .map(String::as_str)
    }
}

impl From<ldap3::SearchEntry> for Entry {
    fn from(entry: ldap3::SearchEntry) -> Self {
        let mut converted = Entry::new(entry.dn);
        for (name, values) in entry.attrs {
            converted.insert(name, values);
        }
        // ldap3 moves attributes with non-UTF-8 values here
        for (name, values) in entry.bin_attrs {
            if !values.is_empty() {
                converted.insert_binary(name);
            }
        }
        converted
    }
}

/// One attribute change inside a modify request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Modification {
    /// Add values to an attribute that is currently absent.
    Add(String, Vec<String>),
    /// Replace every value of an attribute.
    Replace(String, Vec<String>),
    /// Delete the attribute entirely.
    Delete(String),
}

impl Modification {
    /// Attribute the change applies to.
    pub fn attribute(&self) -> &str {
        match self {
            Modification::Add(name, _)
            | Modification::Replace(name, _)
            | Modification::Delete(name) => name,
        }
    }
}

/// Something that can open an authenticated directory session.
#[async_trait]
pub trait Directory: Send + Sync {
    /// Connect and bind with the configured administrative credentials.
    async fn bind(&self, config: &LdapConfig) -> DirectoryResult<Box<dyn DirectorySession>>;
}

/// A bound session against the directory.
#[async_trait]
pub trait DirectorySession: Send {
    /// Subtree search under `base_dn`, returning only `attributes`.
    async fn search(
        &mut self,
        base_dn: &str,
        filter: &str,
        attributes: &[String],
    ) -> DirectoryResult<Vec<Entry>>;

    /// Apply all modifications to the entry in a single request.
    async fn modify(&mut self, dn: &str, modifications: Vec<Modification>) -> DirectoryResult<()>;

    /// Close the session.
    async fn unbind(&mut self) -> DirectoryResult<()>;
}

/// Escape special characters in LDAP filter values (RFC 4515).
pub fn escape_filter_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '\\' => escaped.push_str("\\5c"),
            '*' => escaped.push_str("\\2a"),
            '(' => escaped.push_str("\\28"),
            ')' => escaped.push_str("\\29"),
            '\0' => escaped.push_str("\\00"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

/// Equality filter `(attribute=value)` with the value escaped.
pub fn equality_filter(attribute: &str, value: &str) -> String {
    format!("({}={})", attribute, escape_filter_value(value))
}

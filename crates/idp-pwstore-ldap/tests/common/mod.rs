//! Common test utilities for idp-pwstore-ldap integration tests.
//!
//! Provides an in-memory directory that behaves like an OpenLDAP server with
//! the ppolicy overlay closely enough for the password store: case-insensitive
//! attribute names, operational attributes only returned when requested,
//! all-or-nothing modify requests and a password history.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Duration, NaiveDate, NaiveDateTime};
use std::sync::{Arc, Mutex};

use idp_pwstore_ldap::{
    Directory, DirectoryError, DirectoryResult, DirectorySession, Entry, LdapConfig, Modification,
};

pub const BASE_DN: &str = "ou=gis_affiliated_person,dc=acme,dc=org";
pub const ADMIN_DN: &str = "cn=Manager,dc=acme,dc=org";
pub const ADMIN_PASSWORD: &str = "admin";
pub const EMPLOYEE_ID_ATTRIBUTE: &str = "gisEisPersonId";
pub const DISABLED_VALUE: &str = "000001010000Z";

const OPERATIONAL_ATTRIBUTES: &[&str] = &[
    "pwdChangedTime",
    "pwdPolicySubentry",
    "pwdAccountLockedTime",
    "modifyTimestamp",
];

/// Store configuration matching the seeded directory.
pub fn test_config() -> LdapConfig {
    LdapConfig::new("127.0.0.1", BASE_DN, ADMIN_DN, ADMIN_PASSWORD)
        .with_port(389)
        .with_tls(true)
        .with_ssl(false)
        .with_employee_id_attribute(EMPLOYEE_ID_ATTRIBUTE)
        .with_password_date_attributes("pwdchangedtime", "modifytimestamp")
        .with_user_password_attribute("userPassword")
        .with_remove_attribute("pwdpolicysubentry")
        .with_remove_attribute("pwdaccountlockedtime")
        .with_update_attribute("gisusaeventpwdchange", "Yes")
        .with_account_disabled_marker("pwdaccountlockedtime", DISABLED_VALUE)
}

fn person(uid: &str, employee_id: &str, password: &str) -> Entry {
    Entry::new(format!("uid={uid},{BASE_DN}"))
        .with("objectClass", vec!["inetOrgPerson".to_string()])
        .with("uid", vec![uid.to_string()])
        .with("cn", vec![uid.to_string()])
        .with(EMPLOYEE_ID_ATTRIBUTE, vec![employee_id.to_string()])
        .with("userPassword", vec![password.to_string()])
        .with("pwdChangedTime", vec!["20160101000000Z".to_string()])
        .with("modifyTimestamp", vec!["20160101000000Z".to_string()])
}

/// Directory seeded with the users the tests rely on.
///
/// - `10161`: plain user
/// - `10131`: has a password policy subentry and a lock time (not the disabled value)
/// - `10171`: lacks the change-event flag
/// - `10181`: change-event flag set to `No`
/// - `10121`: locked with the disabled value
pub fn seeded_directory() -> InMemoryDirectory {
    InMemoryDirectory::new(vec![
        person("jdoe", "10161", "initial-10161"),
        person("asmith", "10131", "initial-10131")
            .with(
                "pwdPolicySubentry",
                vec!["cn=locked,ou=policies,dc=acme,dc=org".to_string()],
            )
            .with("pwdAccountLockedTime", vec!["20160301000000Z".to_string()]),
        person("bjones", "10171", "initial-10171"),
        person("cwhite", "10181", "initial-10181")
            .with("gisUsaEventPwdChange", vec!["No".to_string()]),
        person("dlocked", "10121", "initial-10121")
            .with("pwdAccountLockedTime", vec![DISABLED_VALUE.to_string()]),
    ])
}

#[derive(Debug, Default)]
struct State {
    entries: Vec<Entry>,
    history: Vec<(String, Vec<String>)>,
    clock: i64,
    binds: usize,
    unbinds: usize,
    searches: Vec<(String, Vec<String>)>,
    modifications: Vec<(String, Vec<Modification>)>,
    fail_search: Option<String>,
    fail_modify: Option<(u32, String)>,
}

/// In-memory [`Directory`] for tests.
#[derive(Clone, Default)]
pub struct InMemoryDirectory {
    state: Arc<Mutex<State>>,
}

impl InMemoryDirectory {
    pub fn new(entries: Vec<Entry>) -> Self {
        let history = entries
            .iter()
            .filter_map(|e| {
                e.first_value("userPassword")
                    .map(|pw| (e.dn.clone(), vec![pw.to_string()]))
            })
            .collect();

        Self {
            state: Arc::new(Mutex::new(State {
                entries,
                history,
                ..State::default()
            })),
        }
    }

    /// Add another entry.
    pub fn insert(&self, entry: Entry) {
        self.state.lock().unwrap().entries.push(entry);
    }

    /// Snapshot of the entry holding `employee_id`, all attributes included.
    pub fn entry(&self, employee_id: &str) -> Entry {
        self.state
            .lock()
            .unwrap()
            .entries
            .iter()
            .find(|e| e.first_value(EMPLOYEE_ID_ATTRIBUTE) == Some(employee_id))
            .cloned()
            .expect("seeded entry")
    }

    /// Make every search fail with `message`.
    pub fn fail_searches(&self, message: &str) {
        self.state.lock().unwrap().fail_search = Some(message.to_string());
    }

    /// Make the next modify request fail.
    pub fn fail_next_modify(&self, rc: u32, message: &str) {
        self.state.lock().unwrap().fail_modify = Some((rc, message.to_string()));
    }

    pub fn bind_count(&self) -> usize {
        self.state.lock().unwrap().binds
    }

    pub fn unbind_count(&self) -> usize {
        self.state.lock().unwrap().unbinds
    }

    /// Every `(filter, requested attributes)` searched so far.
    pub fn searches(&self) -> Vec<(String, Vec<String>)> {
        self.state.lock().unwrap().searches.clone()
    }

    /// Every modify request received so far.
    pub fn modify_requests(&self) -> Vec<(String, Vec<Modification>)> {
        self.state.lock().unwrap().modifications.clone()
    }
}

#[async_trait]
impl Directory for InMemoryDirectory {
    async fn bind(&self, config: &LdapConfig) -> DirectoryResult<Box<dyn DirectorySession>> {
        let mut state = self.state.lock().unwrap();
        if config.admin_username != ADMIN_DN || config.admin_password != ADMIN_PASSWORD {
            return Err(DirectoryError::Bind {
                bind_dn: config.admin_username.clone(),
                rc: 49,
                message: "Invalid credentials (rc=49)".to_string(),
            });
        }
        state.binds += 1;

        Ok(Box::new(InMemorySession {
            state: Arc::clone(&self.state),
        }))
    }
}

struct InMemorySession {
    state: Arc<Mutex<State>>,
}

#[async_trait]
impl DirectorySession for InMemorySession {
    async fn search(
        &mut self,
        base_dn: &str,
        filter: &str,
        attributes: &[String],
    ) -> DirectoryResult<Vec<Entry>> {
        let mut state = self.state.lock().unwrap();
        state
            .searches
            .push((filter.to_string(), attributes.to_vec()));

        if let Some(message) = &state.fail_search {
            return Err(DirectoryError::Search {
                message: message.clone(),
            });
        }

        let (attribute, value) = parse_equality_filter(filter).ok_or_else(|| {
            DirectoryError::Search {
                message: format!("Bad search filter: {filter}"),
            }
        })?;

        let suffix = format!(",{}", base_dn.to_lowercase());
        Ok(state
            .entries
            .iter()
            .filter(|e| e.dn.to_lowercase().ends_with(&suffix))
            .filter(|e| {
                e.values(&attribute)
                    .map(|values| values.iter().any(|v| v == &value))
                    .unwrap_or(false)
            })
            .map(|e| project(e, attributes))
            .collect())
    }

    async fn modify(&mut self, dn: &str, modifications: Vec<Modification>) -> DirectoryResult<()> {
        let mut state = self.state.lock().unwrap();
        state
            .modifications
            .push((dn.to_string(), modifications.clone()));

        if let Some((rc, message)) = state.fail_modify.take() {
            return Err(DirectoryError::Modify { rc, message });
        }

        let index = state
            .entries
            .iter()
            .position(|e| e.dn.eq_ignore_ascii_case(dn))
            .ok_or_else(|| DirectoryError::Modify {
                rc: 32,
                message: "No such object (rc=32)".to_string(),
            })?;

        // Apply to a copy so a failing modification leaves the entry untouched.
        let mut entry = state.entries[index].clone();
        let mut new_password = None;

        for modification in modifications {
            match modification {
                Modification::Add(name, values) => {
                    if entry.has_attribute(&name) {
                        return Err(DirectoryError::Modify {
                            rc: 20,
                            message: format!("Type or value exists (rc=20): {name}"),
                        });
                    }
                    entry.insert(name, values);
                }
                Modification::Replace(name, values) => {
                    if name.eq_ignore_ascii_case("userPassword") {
                        new_password = values.first().cloned();
                    }
                    entry.insert(name, values);
                }
                Modification::Delete(name) => {
                    if entry.remove(&name).is_none() {
                        return Err(DirectoryError::Modify {
                            rc: 16,
                            message: format!("No such attribute (rc=16): {name}"),
                        });
                    }
                }
            }
        }

        if let Some(password) = &new_password {
            let used = state
                .history
                .iter()
                .any(|(hdn, passwords)| hdn == &entry.dn && passwords.contains(password));
            if used {
                return Err(DirectoryError::Modify {
                    rc: 19,
                    message: "Constraint violation (rc=19): password in history".to_string(),
                });
            }
        }

        state.clock += 1;
        let now = timestamp(state.clock);
        entry.insert("modifyTimestamp", vec![now.clone()]);

        if let Some(password) = new_password {
            entry.insert("pwdChangedTime", vec![now]);
            match state.history.iter().position(|(hdn, _)| hdn == &entry.dn) {
                Some(i) => state.history[i].1.push(password),
                None => state.history.push((entry.dn.clone(), vec![password])),
            }
        }

        state.entries[index] = entry;
        Ok(())
    }

    async fn unbind(&mut self) -> DirectoryResult<()> {
        self.state.lock().unwrap().unbinds += 1;
        Ok(())
    }
}

fn timestamp(tick: i64) -> String {
    let base: NaiveDateTime = NaiveDate::from_ymd_opt(2016, 5, 18)
        .and_then(|d| d.and_hms_opt(12, 0, 0))
        .expect("valid base time");
    (base + Duration::seconds(tick))
        .format("%Y%m%d%H%M%SZ")
        .to_string()
}

fn parse_equality_filter(filter: &str) -> Option<(String, String)> {
    let inner = filter.strip_prefix('(')?.strip_suffix(')')?;
    let (attribute, value) = inner.split_once('=')?;
    if value.contains('*') || value.contains('(') || value.contains(')') {
        return None;
    }
    Some((attribute.to_string(), unescape(value)?))
}

fn unescape(value: &str) -> Option<String> {
    let mut bytes = Vec::with_capacity(value.len());
    let mut rest = value.as_bytes();
    while let Some((&b, tail)) = rest.split_first() {
        if b == b'\\' {
            let hex = std::str::from_utf8(tail.get(..2)?).ok()?;
            bytes.push(u8::from_str_radix(hex, 16).ok()?);
            rest = &tail[2..];
        } else {
            bytes.push(b);
            rest = tail;
        }
    }
    String::from_utf8(bytes).ok()
}

fn project(entry: &Entry, attributes: &[String]) -> Entry {
    let all_user = attributes.iter().any(|a| a == "*");
    let mut projected = Entry::new(entry.dn.clone());

    for name in entry.attribute_names() {
        let operational = OPERATIONAL_ATTRIBUTES
            .iter()
            .any(|op| op.eq_ignore_ascii_case(name));
        let named = attributes.iter().any(|a| a.eq_ignore_ascii_case(name));

        if named || (all_user && !operational) {
            let values = entry.values(name).map(<[String]>::to_vec).unwrap_or_default();
            projected.insert(name, values);
        }
    }

    projected
}

//! Buffered entry changes
//!
//! A [`ChangeSet`] collects every attribute change for one entry so they reach
//! the directory as a single modify request.

use crate::directory::{Entry, Modification};

/// Staged modifications against one directory entry.
#[derive(Debug)]
pub struct ChangeSet<'a> {
    entry: &'a Entry,
    modifications: Vec<Modification>,
}

impl<'a> ChangeSet<'a> {
    /// Start an empty change set for `entry`.
    pub fn new(entry: &'a Entry) -> Self {
        Self {
            entry,
            modifications: Vec::new(),
        }
    }

    /// DN of the target entry.
    pub fn dn(&self) -> &str {
        &self.entry.dn
    }

    /// Set the attribute to exactly one value.
    pub fn replace(&mut self, name: &str, value: &str) -> &mut Self {
        self.stage(Modification::Replace(
            name.to_string(),
            vec![value.to_string()],
        ))
    }

    /// Delete the attribute if the entry currently has it.
    pub fn clear(&mut self, name: &str) -> &mut Self {
        if self.entry.has_attribute(name) {
            self.stage(Modification::Delete(name.to_string()));
        }
        self
    }

    /// Set the attribute, adding it when absent and replacing it when present.
    pub fn upsert(&mut self, name: &str, value: &str) -> &mut Self {
        let modification = if self.entry.has_attribute(name) {
            Modification::Replace(name.to_string(), vec![value.to_string()])
        } else {
            Modification::Add(name.to_string(), vec![value.to_string()])
        };
        self.stage(modification)
    }

    /// Whether nothing has been staged.
    pub fn is_empty(&self) -> bool {
        self.modifications.is_empty()
    }

    /// Number of staged modifications.
    pub fn len(&self) -> usize {
        self.modifications.len()
    }

    /// Consume the change set into the modifications to send.
    pub fn into_modifications(self) -> Vec<Modification> {
        self.modifications
    }

    // A later change to the same attribute supersedes the earlier one, so the
    // request never carries conflicting operations on one attribute.
    fn stage(&mut self, modification: Modification) -> &mut Self {
        self.modifications
            .retain(|m| !m.attribute().eq_ignore_ascii_case(modification.attribute()));
        self.modifications.push(modification);
        self
    }
}

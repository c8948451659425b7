//! Static password table
//!
//! A fallback and testing path only; keys and certificates are the
//! primary trust mechanism.

use std::collections::HashMap;

use jsshd_core::error::AuthError;

/// Exact-match username/password table
#[derive(Debug, Clone)]
pub struct PasswordTable {
    entries: HashMap<String, String>,
}

impl PasswordTable {
    /// Create an empty table
    pub fn empty() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Add or replace an entry
    pub fn insert(&mut self, user: impl Into<String>, password: impl Into<String>) {
        self.entries.insert(user.into(), password.into());
    }

    /// Accept only when the user exists and the password matches exactly
    pub fn verify(&self, user: &str, password: &str) -> Result<(), AuthError> {
        match self.entries.get(user) {
            Some(expected) if expected == password => Ok(()),
            _ => Err(AuthError::BadPassword(user.to_string())),
        }
    }
}

impl Default for PasswordTable {
    fn default() -> Self {
        let mut table = Self::empty();
        table.insert("johnj", "johnj");
        table
    }
}

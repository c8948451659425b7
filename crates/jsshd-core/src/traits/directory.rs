//! Identity directory trait

use crate::error::DirectoryError;
use crate::types::Identity;

/// Lookup of OS accounts by login name
pub trait IdentityDirectory: Send + Sync {
    /// Resolve a username; unknown names are an error
    fn lookup(&self, username: &str) -> Result<Identity, DirectoryError>;
}

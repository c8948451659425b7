//! System account directory

use jsshd_core::error::DirectoryError;
use jsshd_core::traits::IdentityDirectory;
use jsshd_core::Identity;

/// Resolves identities from the host's user database
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemDirectory;

impl SystemDirectory {
    /// Create a new system directory
    pub fn new() -> Self {
        Self
    }
}

#[cfg(unix)]
impl IdentityDirectory for SystemDirectory {
    fn lookup(&self, username: &str) -> Result<Identity, DirectoryError> {
        let user = nix::unistd::User::from_name(username)
            .map_err(|e| DirectoryError::Lookup {
                user: username.to_string(),
                reason: e.to_string(),
            })?
            .ok_or_else(|| DirectoryError::UnknownUser(username.to_string()))?;

        Ok(Identity {
            username: user.name,
            uid: user.uid.as_raw(),
            gid: user.gid.as_raw(),
            home_dir: user.dir,
            shell: user.shell,
        })
    }
}

#[cfg(not(unix))]
impl IdentityDirectory for SystemDirectory {
    fn lookup(&self, username: &str) -> Result<Identity, DirectoryError> {
        Err(DirectoryError::Lookup {
            user: username.to_string(),
            reason: "no system user database on this platform".to_string(),
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_root() {
        let identity = SystemDirectory::new().lookup("root").unwrap();
        assert_eq!(identity.uid, 0);
        assert_eq!(identity.username, "root");
    }

    #[test]
    fn test_lookup_unknown_user() {
        let result = SystemDirectory::new().lookup("no-such-user-jsshd-test");
        assert!(matches!(result, Err(DirectoryError::UnknownUser(_))));
    }
}

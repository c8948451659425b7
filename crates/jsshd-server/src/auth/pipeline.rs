//! Authentication decision pipeline

use std::path::PathBuf;
use std::sync::Arc;

use jsshd_core::error::AuthError;
use jsshd_core::time::current_time_secs;
use jsshd_core::traits::IdentityDirectory;
use jsshd_core::Identity;

use super::certificate::{check_certificate, TrustMaterial};
use super::keys::{AuthorizedKeysFile, PresentedKey};
use super::password::PasswordTable;

/// Evaluates presented credentials against the configured trust material.
///
/// Every attempt is evaluated independently; nothing is cached between
/// attempts.
pub struct AuthPipeline {
    directory: Arc<dyn IdentityDirectory>,
    trust: TrustMaterial,
    passwords: Option<PasswordTable>,
    authorized_keys_file: PathBuf,
}

impl AuthPipeline {
    /// Create a pipeline with the built-in password table enabled
    pub fn new(
        directory: Arc<dyn IdentityDirectory>,
        trust: TrustMaterial,
        authorized_keys_file: impl Into<PathBuf>,
    ) -> Self {
        Self {
            directory,
            trust,
            passwords: Some(PasswordTable::default()),
            authorized_keys_file: authorized_keys_file.into(),
        }
    }

    /// Replace the password table, or disable password authentication with `None`
    pub fn with_passwords(mut self, passwords: Option<PasswordTable>) -> Self {
        self.passwords = passwords;
        self
    }

    /// Password method. Binds no identity.
    pub fn check_password(&self, user: &str, password: &str) -> Result<(), AuthError> {
        self.passwords
            .as_ref()
            .ok_or(AuthError::PasswordDisabled)?
            .verify(user, password)
    }

    /// Key-based method. On success returns the identity to bind to the
    /// connection.
    pub async fn check_key(&self, user: &str, key: &PresentedKey) -> Result<Identity, AuthError> {
        let identity = self.directory.lookup(user).map_err(|e| {
            tracing::debug!("Invalid user {}: {}", user, e);
            AuthError::UnknownUser(user.to_string())
        })?;

        match key {
            PresentedKey::Certificate(cert) => {
                check_certificate(&self.trust, user, cert, current_time_secs())?;
            }
            PresentedKey::Plain(public_key) => {
                AuthorizedKeysFile::in_home(&identity.home_dir, &self.authorized_keys_file)
                    .check(public_key)
                    .await?;
            }
        }

        Ok(identity)
    }
}

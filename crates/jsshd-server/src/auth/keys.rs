//! Authorized keys matching

use std::path::{Path, PathBuf};

use russh::keys::ssh_key::{AuthorizedKeys, Certificate, PublicKey};

use jsshd_core::error::AuthError;

/// Algorithm suffix shared by every OpenSSH certificate type
const CERT_ALGORITHM_SUFFIX: &str = "-cert-v01@openssh.com";

/// A credential offered for key-based authentication
#[derive(Debug, Clone)]
pub enum PresentedKey {
    /// A bare public key, checked against the user's authorized keys
    Plain(PublicKey),
    /// A certificate, checked against the configured CA
    Certificate(Box<Certificate>),
}

impl PresentedKey {
    /// Parse an OpenSSH `algorithm base64 [comment]` line
    pub fn from_openssh(line: &str) -> Result<Self, AuthError> {
        let line = line.trim();
        let algorithm = line.split_whitespace().next().unwrap_or_default();

        if algorithm.ends_with(CERT_ALGORITHM_SUFFIX) {
            let cert = Certificate::from_openssh(line)
                .map_err(|e| AuthError::UnsupportedKey(e.to_string()))?;
            Ok(PresentedKey::Certificate(Box::new(cert)))
        } else {
            let key = PublicKey::from_openssh(line)
                .map_err(|e| AuthError::UnsupportedKey(e.to_string()))?;
            Ok(PresentedKey::Plain(key))
        }
    }

    /// Whether this is a certificate
    pub fn is_certificate(&self) -> bool {
        matches!(self, PresentedKey::Certificate(_))
    }
}

/// A user's authorized keys file
#[derive(Debug, Clone)]
pub struct AuthorizedKeysFile {
    path: PathBuf,
}

impl AuthorizedKeysFile {
    /// Authorized keys at `relative` under `home`
    pub fn in_home(home: &Path, relative: &Path) -> Self {
        Self {
            path: home.join(relative),
        }
    }

    /// Path of the file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Accept if any entry in the file equals `key`.
    ///
    /// Entries are parsed in order. A malformed entry met before a
    /// matching one rejects the whole file.
    pub async fn check(&self, key: &PublicKey) -> Result<(), AuthError> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(AuthError::AuthorizedKeysMissing(self.path.clone()));
            }
            Err(source) => {
                tracing::error!("Failed to load authorized_keys {:?}: {}", self.path, source);
                return Err(AuthError::AuthorizedKeysUnreadable {
                    path: self.path.clone(),
                    source,
                });
            }
        };

        if contains_key(&contents, key).map_err(|line| {
            tracing::error!("Invalid key(s) found in {:?} near entry {}", self.path, line);
            AuthError::MalformedAuthorizedKeys(self.path.clone())
        })? {
            Ok(())
        } else {
            Err(AuthError::NoMatchingKey(self.path.clone()))
        }
    }
}

/// Scan authorized keys text for `key`.
///
/// Returns `Err(n)` with the 1-based entry number of the first malformed
/// entry if one is met before a match.
fn contains_key(contents: &str, key: &PublicKey) -> Result<bool, usize> {
    for (index, entry) in AuthorizedKeys::new(contents).enumerate() {
        let entry = entry.map_err(|_| index + 1)?;
        if entry.public_key().key_data() == key.key_data() {
            return Ok(true);
        }
    }
    Ok(false)
}

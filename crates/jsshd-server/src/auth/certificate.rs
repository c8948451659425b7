//! Certificate authority trust
//!
//! Short-lived user certificates are accepted when they are signed by the
//! configured CA key, name the connecting user as a principal, are inside
//! their validity window and carry no critical options.

use std::path::Path;

use russh::keys::ssh_key::certificate::CertType;
use russh::keys::ssh_key::{AuthorizedKeys, Certificate, HashAlg, PublicKey};

use jsshd_core::error::{AuthError, ConfigError};

/// The configured certificate authority, if any
#[derive(Debug, Clone, Default)]
pub struct TrustMaterial {
    ca_key: Option<PublicKey>,
}

impl TrustMaterial {
    /// No CA configured; certificate authentication always rejects
    pub fn none() -> Self {
        Self::default()
    }

    /// Trust certificates signed by `key`
    pub fn with_ca_key(key: PublicKey) -> Self {
        Self { ca_key: Some(key) }
    }

    /// Load the CA key from an authorized-key-format file.
    ///
    /// The first entry of the file is used.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let error = |reason: String| ConfigError::CertificateAuthority {
            path: path.to_path_buf(),
            reason,
        };

        let contents = std::fs::read_to_string(path).map_err(|e| error(e.to_string()))?;
        let entry = AuthorizedKeys::new(&contents)
            .next()
            .ok_or_else(|| error("no key found".to_string()))?
            .map_err(|e| format!("Failed to parse CA Certificate: {}", e))
            .map_err(error)?;

        tracing::info!(
            "Loaded CA key {} from {:?}",
            entry.public_key().fingerprint(HashAlg::Sha256),
            path
        );
        Ok(Self::with_ca_key(entry.public_key().clone()))
    }

    /// Load the CA key, disabling certificate authentication when it is
    /// missing or unreadable
    pub fn load_or_disabled(path: &Path) -> Self {
        match Self::load(path) {
            Ok(trust) => trust,
            Err(e) => {
                tracing::info!("{}", e);
                Self::none()
            }
        }
    }

    /// The CA key
    pub fn ca_key(&self) -> Option<&PublicKey> {
        self.ca_key.as_ref()
    }

    /// Whether certificate authentication is possible
    pub fn is_enabled(&self) -> bool {
        self.ca_key.is_some()
    }
}

/// Decide whether `cert` admits `user` at `now` (Unix seconds)
pub fn check_certificate(
    trust: &TrustMaterial,
    user: &str,
    cert: &Certificate,
    now: u64,
) -> Result<(), AuthError> {
    let ca = trust.ca_key().ok_or(AuthError::NoCertificateAuthority)?;

    if cert.signature_key() != ca.key_data() {
        return Err(AuthError::SignerMismatch);
    }

    if let Some(option) = cert.critical_options().keys().next() {
        return Err(AuthError::UnsupportedCriticalOption(option.clone()));
    }

    if cert.cert_type() != CertType::User {
        return Err(AuthError::InvalidCertificate(
            "not a user certificate".to_string(),
        ));
    }

    let principals = cert.valid_principals();
    if !principals.is_empty() && !principals.iter().any(|p| p == user) {
        return Err(AuthError::PrincipalMismatch(user.to_string()));
    }

    // Checks the validity window and the signature itself
    let ca_fingerprint = ca.fingerprint(HashAlg::Sha256);
    cert.validate_at(now, [&ca_fingerprint])
        .map_err(|e| AuthError::InvalidCertificate(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::testing::{certificate_with, ed25519_key, openssh_line, user_certificate};
    use jsshd_core::time::current_time_secs;
    use russh::keys::ssh_key::PrivateKey;
    use tempfile::TempDir;

    fn trust_for(ca: &PrivateKey) -> TrustMaterial {
        TrustMaterial::with_ca_key(ca.public_key().clone())
    }

    #[test]
    fn test_valid_certificate_accepted() {
        let ca = ed25519_key();
        let user_key = ed25519_key();
        let cert = user_certificate(&ca, &user_key, "alice", -60, 3600);

        assert!(check_certificate(&trust_for(&ca), "alice", &cert, current_time_secs()).is_ok());
    }

    #[test]
    fn test_other_signer_rejected() {
        let ca = ed25519_key();
        let rogue = ed25519_key();
        let user_key = ed25519_key();
        let cert = user_certificate(&rogue, &user_key, "alice", -60, 3600);

        let result = check_certificate(&trust_for(&ca), "alice", &cert, current_time_secs());
        assert!(matches!(result, Err(AuthError::SignerMismatch)));
    }

    #[test]
    fn test_wrong_principal_rejected() {
        let ca = ed25519_key();
        let user_key = ed25519_key();
        let cert = user_certificate(&ca, &user_key, "bob", -60, 3600);

        let result = check_certificate(&trust_for(&ca), "alice", &cert, current_time_secs());
        assert!(matches!(result, Err(AuthError::PrincipalMismatch(_))));
    }

    #[test]
    fn test_expired_certificate_rejected() {
        let ca = ed25519_key();
        let user_key = ed25519_key();
        let cert = user_certificate(&ca, &user_key, "alice", -7200, -3600);

        let result = check_certificate(&trust_for(&ca), "alice", &cert, current_time_secs());
        assert!(matches!(result, Err(AuthError::InvalidCertificate(_))));
    }

    #[test]
    fn test_not_yet_valid_certificate_rejected() {
        let ca = ed25519_key();
        let user_key = ed25519_key();
        let cert = user_certificate(&ca, &user_key, "alice", 3600, 7200);

        let result = check_certificate(&trust_for(&ca), "alice", &cert, current_time_secs());
        assert!(matches!(result, Err(AuthError::InvalidCertificate(_))));
    }

    #[test]
    fn test_critical_option_rejected() {
        let ca = ed25519_key();
        let user_key = ed25519_key();
        let cert = certificate_with(&ca, &user_key, -60, 3600, |builder| {
            builder.valid_principal("alice").unwrap();
            builder.critical_option("force-command", "/bin/true").unwrap();
        });

        let result = check_certificate(&trust_for(&ca), "alice", &cert, current_time_secs());
        assert!(matches!(
            result,
            Err(AuthError::UnsupportedCriticalOption(ref name)) if name == "force-command"
        ));
    }

    #[test]
    fn test_no_ca_configured_rejects() {
        let ca = ed25519_key();
        let user_key = ed25519_key();
        let cert = user_certificate(&ca, &user_key, "alice", -60, 3600);

        let result = check_certificate(&TrustMaterial::none(), "alice", &cert, current_time_secs());
        assert!(matches!(result, Err(AuthError::NoCertificateAuthority)));
    }

    #[test]
    fn test_load_ca_key() {
        let dir = TempDir::new().unwrap();
        let ca = ed25519_key();
        let path = dir.path().join("ca.pub");
        std::fs::write(&path, format!("{} ca@example\n", openssh_line(&ca))).unwrap();

        let trust = TrustMaterial::load(&path).unwrap();
        assert_eq!(trust.ca_key().unwrap().key_data(), ca.public_key().key_data());
    }

    #[test]
    fn test_missing_ca_key_disables_certificates() {
        let dir = TempDir::new().unwrap();
        let trust = TrustMaterial::load_or_disabled(&dir.path().join("ca.pub"));
        assert!(!trust.is_enabled());
    }

    #[test]
    fn test_garbage_ca_key_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ca.pub");
        std::fs::write(&path, "not a key\n").unwrap();

        assert!(matches!(
            TrustMaterial::load(&path),
            Err(ConfigError::CertificateAuthority { .. })
        ));
    }
}

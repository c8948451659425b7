//! Core error types for jsshd

use std::path::PathBuf;
use thiserror::Error;

/// Reasons an authentication attempt is rejected.
///
/// These are only ever logged; the client sees a generic denial.
#[derive(Error, Debug)]
pub enum AuthError {
    /// The username has no entry in the identity directory
    #[error("Invalid user: {0}")]
    UnknownUser(String),

    /// Password did not match the credential table
    #[error("Password rejected for {0}")]
    BadPassword(String),

    /// Password authentication is switched off
    #[error("Password authentication is disabled")]
    PasswordDisabled,

    /// A certificate was presented but no CA key is configured
    #[error("No certificate authority configured")]
    NoCertificateAuthority,

    /// The certificate was signed by a key other than the configured CA
    #[error("CA certificate does not match user certificate signer")]
    SignerMismatch,

    /// The user is not among the certificate's principals
    #[error("Certificate principals do not include {0}")]
    PrincipalMismatch(String),

    /// The certificate carries a critical option this server does not support
    #[error("Unsupported critical option: {0}")]
    UnsupportedCriticalOption(String),

    /// Signature or validity window check failed
    #[error("Certificate rejected: {0}")]
    InvalidCertificate(String),

    /// The user's authorized keys file does not exist
    #[error("Authorized keys file {0:?} not found")]
    AuthorizedKeysMissing(PathBuf),

    /// The user's authorized keys file exists but could not be read
    #[error("Failed to load authorized keys {path:?}: {source}")]
    AuthorizedKeysUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A malformed entry was met before any matching key
    #[error("Invalid key(s) found in {0:?}")]
    MalformedAuthorizedKeys(PathBuf),

    /// No entry in the authorized keys file matched the presented key
    #[error("Matching public key not found in {0:?}")]
    NoMatchingKey(PathBuf),

    /// The presented key could not be decoded
    #[error("Unsupported public key: {0}")]
    UnsupportedKey(String),
}

/// Identity directory lookup errors
#[derive(Error, Debug)]
pub enum DirectoryError {
    /// No such user
    #[error("Unknown user: {0}")]
    UnknownUser(String),

    /// The lookup itself failed
    #[error("Lookup failed for {user}: {reason}")]
    Lookup { user: String, reason: String },
}

/// Session setup errors. Any of these terminates the connection that hit it.
#[derive(Error, Debug)]
pub enum SessionError {
    /// No identity was bound during authentication
    #[error("Error retrieving credentials from session")]
    MissingIdentity,

    /// The structured event sink could not be created
    #[error("Failed to create event log: {0}")]
    EventLog(#[source] std::io::Error),

    /// The raw transcript sink could not be created
    #[error("Failed to create session log: {0}")]
    SessionLog(#[source] std::io::Error),

    /// PTY allocation failed
    #[error("PTY allocation failed: {0}")]
    PtyAllocation(String),

    /// The child process could not be started
    #[error("Failed to spawn {program}: {reason}")]
    Spawn { program: String, reason: String },

    /// Applying a window size to the terminal failed
    #[error("Failed to set pty window size: {0}")]
    Resize(String),
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialize error
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// Trust material could not be loaded
    #[error("Failed to load CA certificate {path:?}: {reason}")]
    CertificateAuthority { path: PathBuf, reason: String },
}

//! Authentication module for the daemon
//!
//! Three methods are supported: a small static password table, a
//! per-user authorized keys file, and short-lived certificates signed by
//! a configured certificate authority.

mod certificate;
mod keys;
mod password;
mod pipeline;

#[cfg(test)]
pub(crate) mod testing;

pub use certificate::{check_certificate, TrustMaterial};
pub use keys::{AuthorizedKeysFile, PresentedKey};
pub use password::PasswordTable;
pub use pipeline::AuthPipeline;

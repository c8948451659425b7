//! Key, certificate and directory fixtures for authentication tests

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use russh::keys::ssh_key::certificate::{Builder, CertType};
use russh::keys::ssh_key::rand_core::OsRng;
use russh::keys::ssh_key::{Algorithm, Certificate, PrivateKey};

use jsshd_core::error::DirectoryError;
use jsshd_core::time::current_time_secs;
use jsshd_core::traits::IdentityDirectory;
use jsshd_core::Identity;

/// Directory serving fixed identities
pub(crate) struct StaticDirectory(HashMap<String, Identity>);

impl StaticDirectory {
    pub(crate) fn single(identity: Identity) -> Self {
        Self(HashMap::from([(identity.username.clone(), identity)]))
    }
}

impl IdentityDirectory for StaticDirectory {
    fn lookup(&self, username: &str) -> Result<Identity, DirectoryError> {
        self.0
            .get(username)
            .cloned()
            .ok_or_else(|| DirectoryError::UnknownUser(username.to_string()))
    }
}

pub(crate) fn user_identity(name: &str, home: &Path) -> Identity {
    Identity {
        username: name.to_string(),
        uid: 1000,
        gid: 1000,
        home_dir: home.to_path_buf(),
        shell: PathBuf::from("/bin/sh"),
    }
}

pub(crate) fn ed25519_key() -> PrivateKey {
    PrivateKey::random(&mut OsRng, Algorithm::Ed25519).unwrap()
}

pub(crate) fn openssh_line(key: &PrivateKey) -> String {
    key.public_key().to_openssh().unwrap()
}

/// User certificate for `principal`, valid from `now + after` to `now + before` seconds
pub(crate) fn user_certificate(
    ca: &PrivateKey,
    subject: &PrivateKey,
    principal: &str,
    after: i64,
    before: i64,
) -> Certificate {
    certificate_with(ca, subject, after, before, |builder| {
        builder.valid_principal(principal).unwrap();
    })
}

pub(crate) fn certificate_with(
    ca: &PrivateKey,
    subject: &PrivateKey,
    after: i64,
    before: i64,
    configure: impl FnOnce(&mut Builder),
) -> Certificate {
    let now = current_time_secs() as i64;
    let mut builder = Builder::new_with_random_nonce(
        &mut OsRng,
        subject.public_key().key_data().clone(),
        (now + after) as u64,
        (now + before) as u64,
    )
    .unwrap();
    builder.serial(1).unwrap();
    builder.key_id("jsshd-test").unwrap();
    builder.cert_type(CertType::User).unwrap();
    configure(&mut builder);
    builder.sign(ca).unwrap()
}

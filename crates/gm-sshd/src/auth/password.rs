//! Password authentication
//!
//! gmash prints a random password at startup; any user name is accepted
//! with it.

use std::fmt;

use rand::distributions::Alphanumeric;
use rand::Rng;
use sha2::{Digest, Sha256};

/// Checks password login attempts
pub trait PasswordVerifier: Send + Sync {
    /// Whether `user` may log in with `password`
    fn verify(&self, user: &str, password: &str) -> bool;
}

/// Generate a random alphanumeric password
pub fn generate_password(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// A single password shared by every user name
///
/// Attempts are compared by SHA-256 digest, in constant time.
#[derive(Clone)]
pub struct MasterPassword {
    password: String,
    digest: [u8; 32],
}

impl MasterPassword {
    /// Use a fixed password
    pub fn new(password: impl Into<String>) -> Self {
        let password = password.into();
        let digest = digest(&password);
        Self { password, digest }
    }

    /// Generate a random password of `len` characters
    pub fn generate(len: usize) -> Self {
        Self::new(generate_password(len))
    }

    /// The password in clear text, for display to the operator
    pub fn as_str(&self) -> &str {
        &self.password
    }
}

impl PasswordVerifier for MasterPassword {
    fn verify(&self, user: &str, password: &str) -> bool {
        let attempt = digest(password);
        let matches = attempt
            .iter()
            .zip(self.digest.iter())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0;

        if !matches {
            tracing::debug!("Rejected password for user {}", user);
        }
        matches
    }
}

impl fmt::Debug for MasterPassword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MasterPassword").finish_non_exhaustive()
    }
}

fn digest(password: &str) -> [u8; 32] {
    Sha256::digest(password.as_bytes()).into()
}

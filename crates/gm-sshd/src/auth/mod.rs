//! Authentication: the session password and the server's host key

mod keys;
mod password;

pub use keys::{fingerprint, load_or_generate_host_key};
pub use password::{generate_password, MasterPassword, PasswordVerifier};

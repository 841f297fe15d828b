//! Host key management
//!
//! The server's Ed25519 host key is kept in OpenSSH format so clients see
//! the same fingerprint across restarts.

use std::path::Path;

use anyhow::{Context, Result};
use russh_keys::key::KeyPair;
use ssh_key::{Algorithm, LineEnding, PrivateKey};

/// Load the host key at `path`, generating and saving one if it is missing
/// or unreadable
pub async fn load_or_generate_host_key(path: &Path) -> Result<KeyPair> {
    if path.exists() {
        tracing::info!("Loading host key from {:?}", path);
        match russh_keys::load_secret_key(path, None) {
            Ok(key) => return Ok(key),
            Err(e) => {
                tracing::warn!("Host key at {:?} is unusable ({}), replacing it", path, e);
            }
        }
    }

    tracing::info!("Generating new host key at {:?}", path);

    let key = PrivateKey::random(&mut rand::rngs::OsRng, Algorithm::Ed25519)
        .context("Failed to generate Ed25519 key")?;
    let encoded = key
        .to_openssh(LineEnding::LF)
        .context("Failed to encode host key")?;

    save_host_key(encoded.as_bytes(), path).await?;

    // Decode what was written so the running key is the persisted one.
    russh_keys::decode_secret_key(&encoded, None).context("Failed to decode new host key")
}

async fn save_host_key(encoded: &[u8], path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        let mut builder = tokio::fs::DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        builder.mode(0o700);
        builder
            .create(parent)
            .await
            .with_context(|| format!("Failed to create directory {:?}", parent))?;
    }

    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(0o600);

    let mut file = options
        .open(path)
        .await
        .with_context(|| format!("Failed to create {:?}", path))?;
    tokio::io::AsyncWriteExt::write_all(&mut file, encoded)
        .await
        .with_context(|| format!("Failed to write host key to {:?}", path))?;

    Ok(())
}

/// SHA-256 fingerprint of the key's public half
pub fn fingerprint(key: &KeyPair) -> Result<String> {
    let public = key
        .clone_public_key()
        .context("Failed to derive public host key")?;
    Ok(public.fingerprint())
}

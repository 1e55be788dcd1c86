//! Repository account credentials
//!
//! Credentials reach the transfer tool either on the command line or, for
//! privilege-separated runs, through a short-lived password file so the
//! secret never shows up in process listings.
//!
//! Passwords may also travel encrypted: base64 of an RSA PKCS#1 v1.5
//! ciphertext, opened with a PKCS#8 PEM private key held by the worker.

use std::fmt;
use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use base64::Engine;
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::{Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey};

/// Username/password pair for the remote catalog
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    user: String,
    password: String,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl Credential {
    #[must_use]
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            password: password.into(),
        }
    }

    /// Build a credential whose password is the first line of `path`
    ///
    /// # Errors
    /// Fails when the file cannot be read or holds no password.
    pub fn from_file(user: impl Into<String>, path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read password file {}", path.display()))?;
        let password = content.lines().next().unwrap_or("").trim_end_matches('\r');
        if password.is_empty() {
            bail!("Password file {} is empty", path.display());
        }
        Ok(Self::new(user, password))
    }

    #[must_use]
    pub fn user(&self) -> &str {
        &self.user
    }

    #[must_use]
    pub fn password(&self) -> &str {
        &self.password
    }
}

/// Decrypt a base64 RSA ciphertext with the PKCS#8 PEM private key at `key_path`
///
/// # Errors
/// Fails when the key cannot be read or parsed, the input is not base64,
/// or the ciphertext does not belong to the key.
pub fn decrypt_secret(encrypted: &str, key_path: &Path) -> Result<String> {
    let pem = std::fs::read_to_string(key_path)
        .with_context(|| format!("Failed to read key {}", key_path.display()))?;
    let key = RsaPrivateKey::from_pkcs8_pem(&pem)
        .map_err(|e| anyhow!("Invalid private key {}: {e}", key_path.display()))?;

    let ciphertext = base64::engine::general_purpose::STANDARD
        .decode(encrypted.trim())
        .context("Encrypted secret is not base64")?;
    let plain = key
        .decrypt(Pkcs1v15Encrypt, &ciphertext)
        .map_err(|e| anyhow!("Decryption failed: {e}"))?;
    String::from_utf8(plain).context("Decrypted secret is not UTF-8")
}

/// Encrypt `plain` with the PEM public key at `key_path`
///
/// The inverse of [`decrypt_secret`], used by whoever submits jobs.
///
/// # Errors
/// Fails when the key cannot be read or parsed, or the secret is too long
/// for the key size.
pub fn encrypt_secret(plain: &str, key_path: &Path) -> Result<String> {
    let pem = std::fs::read_to_string(key_path)
        .with_context(|| format!("Failed to read key {}", key_path.display()))?;
    let key = RsaPublicKey::from_public_key_pem(&pem)
        .map_err(|e| anyhow!("Invalid public key {}: {e}", key_path.display()))?;

    let ciphertext = key
        .encrypt(&mut rsa::rand_core::OsRng, Pkcs1v15Encrypt, plain.as_bytes())
        .map_err(|e| anyhow!("Encryption failed: {e}"))?;
    Ok(base64::engine::general_purpose::STANDARD.encode(ciphertext))
}

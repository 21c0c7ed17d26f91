//! Opaque tokens for locally served media
//!
//! Local files are exposed to Twilio through `GET /tmp?path=<token>`. The
//! token is the AES-256-GCM sealed path, so the endpoint only serves paths
//! this process handed out and never reveals them in the URL.

use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{AeadCore, Aes256Gcm, Nonce};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};

use crate::error::{ProviderError, Result};

const NONCE_LEN: usize = 12;

/// Seals and opens media path tokens
#[derive(Clone)]
pub struct PathCipher {
    cipher: Aes256Gcm,
}

impl PathCipher {
    /// Create a cipher with a fresh random key.
    ///
    /// Tokens only stay valid for the lifetime of this process.
    pub fn new() -> Self {
        let key = Aes256Gcm::generate_key(&mut OsRng);
        Self {
            cipher: Aes256Gcm::new(&key),
        }
    }

    /// Seal a path into a URL-safe token
    pub fn seal(&self, path: &str) -> Result<String> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, path.as_bytes())
            .map_err(|e| ProviderError::Crypto(format!("Encryption failed: {}", e)))?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);

        Ok(URL_SAFE_NO_PAD.encode(sealed))
    }

    /// Open a token produced by [`PathCipher::seal`]
    pub fn open(&self, token: &str) -> Result<String> {
        let sealed = URL_SAFE_NO_PAD
            .decode(token.trim())
            .map_err(|_| ProviderError::InvalidToken)?;

        if sealed.len() <= NONCE_LEN {
            return Err(ProviderError::InvalidToken);
        }

        let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| ProviderError::InvalidToken)?;

        String::from_utf8(plaintext).map_err(|_| ProviderError::InvalidToken)
    }
}

impl Default for PathCipher {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PathCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PathCipher").finish_non_exhaustive()
    }
}

use hkdf::Hkdf;
use rand::Rng;
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::aead::{self, KEY_SIZE};
use crate::error::{CryptoError, CryptoResult};

/// Key sealing the persisted security state at rest.
///
/// Derived per device from a random device secret via HKDF-SHA256.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SealingKey {
    bytes: [u8; KEY_SIZE],
}

impl SealingKey {
    /// Generate a fresh random device secret.
    pub fn generate_secret() -> [u8; KEY_SIZE] {
        let mut bytes = [0u8; KEY_SIZE];
        rand::rng().fill_bytes(&mut bytes);
        bytes
    }

    /// Derive the sealing key for `device_id` from a device secret.
    pub fn derive(device_secret: &[u8], device_id: &str) -> CryptoResult<Self> {
        if device_secret.len() != KEY_SIZE {
            return Err(CryptoError::InvalidKeyLength {
                expected: KEY_SIZE,
                got: device_secret.len(),
            });
        }
        let hk = Hkdf::<Sha256>::new(None, device_secret);
        let mut bytes = [0u8; KEY_SIZE];
        let info = format!("guardiant-state-key:{device_id}");
        hk.expand(info.as_bytes(), &mut bytes)
            .map_err(|e| CryptoError::DerivationFailed(e.to_string()))?;
        Ok(Self { bytes })
    }

    pub fn seal(&self, plaintext: &[u8]) -> CryptoResult<Vec<u8>> {
        aead::seal(plaintext, &self.bytes)
    }

    pub fn open(&self, blob: &[u8]) -> CryptoResult<Vec<u8>> {
        aead::open(blob, &self.bytes)
    }
}

impl std::fmt::Debug for SealingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SealingKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

//! Authentication of backend-pushed commands.
//!
//! Each command travels with an HMAC-SHA256 tag over its canonical JSON and
//! issue time, keyed by a per-device command key set up at provisioning.

use base64::Engine;
use chrono::{DateTime, Utc};
use guardiant_core::security::RemoteCommand;
use hmac::{Hmac, Mac};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{CryptoError, CryptoResult};

type HmacSha256 = Hmac<Sha256>;

pub const COMMAND_KEY_SIZE: usize = 32;

#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct CommandKey {
    bytes: [u8; COMMAND_KEY_SIZE],
}

impl CommandKey {
    pub fn generate() -> Self {
        let mut bytes = [0u8; COMMAND_KEY_SIZE];
        rand::rng().fill_bytes(&mut bytes);
        Self { bytes }
    }

    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(self.bytes)
    }

    pub fn from_base64(encoded: &str) -> CryptoResult<Self> {
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| CryptoError::Base64(e.to_string()))?;
        if decoded.len() != COMMAND_KEY_SIZE {
            return Err(CryptoError::InvalidKeyLength {
                expected: COMMAND_KEY_SIZE,
                got: decoded.len(),
            });
        }
        let mut bytes = [0u8; COMMAND_KEY_SIZE];
        bytes.copy_from_slice(&decoded);
        Ok(Self { bytes })
    }

    fn mac(&self) -> CryptoResult<HmacSha256> {
        <HmacSha256 as Mac>::new_from_slice(&self.bytes).map_err(|_| CryptoError::InvalidKeyLength {
            expected: COMMAND_KEY_SIZE,
            got: self.bytes.len(),
        })
    }
}

impl std::fmt::Debug for CommandKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// A remote command as it arrives from the push transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedCommand {
    pub command: RemoteCommand,
    pub issued_at: DateTime<Utc>,
    /// Base64 HMAC-SHA256 tag.
    pub tag: String,
}

fn canonical_bytes(command: &RemoteCommand, issued_at: &DateTime<Utc>) -> CryptoResult<Vec<u8>> {
    let mut bytes =
        serde_json::to_vec(command).map_err(|e| CryptoError::Serialization(e.to_string()))?;
    bytes.push(b'|');
    bytes.extend_from_slice(issued_at.to_rfc3339().as_bytes());
    Ok(bytes)
}

impl SignedCommand {
    /// Tag a command. Used by the backend side and by tests.
    pub fn sign(command: RemoteCommand, issued_at: DateTime<Utc>, key: &CommandKey) -> CryptoResult<Self> {
        let mut mac = key.mac()?;
        mac.update(&canonical_bytes(&command, &issued_at)?);
        let tag = base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes());
        Ok(Self {
            command,
            issued_at,
            tag,
        })
    }

    /// Check the tag in constant time and release the command.
    pub fn verify(self, key: &CommandKey) -> CryptoResult<RemoteCommand> {
        let tag = base64::engine::general_purpose::STANDARD
            .decode(&self.tag)
            .map_err(|_| CryptoError::CommandRejected)?;
        let mut mac = key.mac()?;
        mac.update(&canonical_bytes(&self.command, &self.issued_at)?);
        mac.verify_slice(&tag)
            .map_err(|_| CryptoError::CommandRejected)?;
        Ok(self.command)
    }
}

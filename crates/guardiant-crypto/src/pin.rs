use guardiant_core::auth::PinKind;
use hkdf::Hkdf;
use rand::{Rng, RngExt};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::{Choice, ConstantTimeEq};
use zeroize::Zeroizing;

use crate::error::{CryptoError, CryptoResult};

pub const PIN_MIN_LEN: usize = 4;
pub const PIN_MAX_LEN: usize = 6;
pub const SALT_SIZE: usize = 16;
pub const HASH_SIZE: usize = 32;

const PIN_HASH_INFO: &[u8] = b"guardiant-pin-hash-v1";

/// Check PIN shape: 4 to 6 ASCII digits.
pub fn validate_pin(pin: &str) -> CryptoResult<()> {
    if pin.len() < PIN_MIN_LEN || pin.len() > PIN_MAX_LEN {
        return Err(CryptoError::InvalidPin(format!(
            "must be {PIN_MIN_LEN} to {PIN_MAX_LEN} digits"
        )));
    }
    if !pin.bytes().all(|b| b.is_ascii_digit()) {
        return Err(CryptoError::InvalidPin("digits only".into()));
    }
    Ok(())
}

fn derive_hash(pin: &[u8], salt: &[u8; SALT_SIZE]) -> CryptoResult<Zeroizing<[u8; HASH_SIZE]>> {
    #[cfg(test)]
    tests::count_derivation();

    let hk = Hkdf::<Sha256>::new(Some(salt), pin);
    let mut out = Zeroizing::new([0u8; HASH_SIZE]);
    hk.expand(PIN_HASH_INFO, &mut out[..])
        .map_err(|e| CryptoError::DerivationFailed(e.to_string()))?;
    Ok(out)
}

/// A salted PIN hash. Never holds the plaintext.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinCredential {
    pub kind: PinKind,
    pub secret_hash: [u8; HASH_SIZE],
    pub salt: [u8; SALT_SIZE],
}

impl PinCredential {
    pub fn create(kind: PinKind, pin: &str) -> CryptoResult<Self> {
        validate_pin(pin)?;
        let mut salt = [0u8; SALT_SIZE];
        rand::rng().fill_bytes(&mut salt);
        let hash = derive_hash(pin.as_bytes(), &salt)?;
        Ok(Self {
            kind,
            secret_hash: *hash,
            salt,
        })
    }

    /// Constant-time match. A derivation failure compares an all-zero hash
    /// so the work done is the same either way.
    fn matches(&self, candidate: &[u8]) -> Choice {
        let hash = derive_hash(candidate, &self.salt)
            .unwrap_or_else(|_| Zeroizing::new([0u8; HASH_SIZE]));
        hash[..].ct_eq(&self.secret_hash[..])
    }
}

impl std::fmt::Debug for PinCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PinCredential")
            .field("secret_hash", &"[REDACTED]")
            .finish()
    }
}

/// The two coexisting credentials of a device, stored in random order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinCredentials {
    entries: [PinCredential; 2],
}

impl PinCredentials {
    /// Provision normal + duress credentials. Both PINs must be valid and
    /// must differ.
    pub fn provision(normal_pin: &str, duress_pin: &str) -> CryptoResult<Self> {
        if bool::from(normal_pin.as_bytes().ct_eq(duress_pin.as_bytes())) {
            return Err(CryptoError::InvalidPin(
                "normal and security PINs must differ".into(),
            ));
        }
        let normal = PinCredential::create(PinKind::Normal, normal_pin)?;
        let duress = PinCredential::create(PinKind::Duress, duress_pin)?;

        let mut entries = [normal, duress];
        if rand::rng().random_bool(0.5) {
            entries.swap(0, 1);
        }
        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[PinCredential; 2] {
        &self.entries
    }
}

/// Result of checking a candidate PIN.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyOutcome {
    Accepted(PinKind),
    /// Generic mismatch. Carries nothing else.
    Rejected,
}

/// Validates candidate PINs against stored credentials.
///
/// Every call derives and compares against both credentials regardless of
/// input, so the cost of `verify` does not depend on which one matched.
pub struct PinVerifier {
    credentials: PinCredentials,
}

impl PinVerifier {
    pub fn new(credentials: PinCredentials) -> Self {
        Self { credentials }
    }

    pub fn verify(&self, candidate: &str) -> VerifyOutcome {
        let candidate = Zeroizing::new(candidate.as_bytes().to_vec());
        let mut normal = Choice::from(0);
        let mut duress = Choice::from(0);

        for entry in &self.credentials.entries {
            let matched = entry.matches(&candidate);
            let is_duress = Choice::from((entry.kind == PinKind::Duress) as u8);
            duress |= matched & is_duress;
            normal |= matched & !is_duress;
        }

        if bool::from(normal) {
            VerifyOutcome::Accepted(PinKind::Normal)
        } else if bool::from(duress) {
            VerifyOutcome::Accepted(PinKind::Duress)
        } else {
            VerifyOutcome::Rejected
        }
    }
}

pub mod aead;
pub mod command;
pub mod error;
pub mod pin;
pub mod sealing_key;

pub use error::{CryptoError, CryptoResult};
pub use pin::{PinCredential, PinCredentials, PinVerifier, VerifyOutcome};

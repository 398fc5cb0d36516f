use thiserror::Error;

use super::bech32::Bech32Error;

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("invalid signature format")]
    InvalidSignature,
    #[error("invalid recovery id {0}")]
    InvalidRecoveryId(u8),
    #[error("signature recovery failed")]
    RecoveryFailed,
    #[error("invalid secret key")]
    InvalidSecretKey,
    #[error("invalid address length {0}")]
    InvalidAddressLength(usize),
    #[error("invalid address prefix {0}")]
    InvalidAddressPrefix(String),
    #[error("bech32: {0}")]
    Bech32(#[from] Bech32Error),
}

use serde::de::Error as SerdeError;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt::{Debug, Display, Error, Formatter};

use super::{Address, CryptoError, Hash};
use crate::serializer::{Reader, ReaderError, Serializer, Writer};

pub const SIGNATURE_SIZE: usize = 65;

/// Recoverable ECDSA signature over secp256k1: `r ‖ s ‖ v`, 65 bytes.
/// `v` is accepted as 0/1 or the legacy 27/28 form.
#[derive(Clone, PartialEq, Eq)]
pub struct Signature([u8; SIGNATURE_SIZE]);

impl Signature {
    pub fn new(bytes: [u8; SIGNATURE_SIZE]) -> Self {
        Signature(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        let bytes: [u8; SIGNATURE_SIZE] =
            bytes.try_into().map_err(|_| CryptoError::InvalidSignature)?;
        Ok(Signature(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; SIGNATURE_SIZE] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    fn recovery_id(&self) -> Result<libsecp256k1::RecoveryId, CryptoError> {
        let v = self.0[64];
        let v = if v >= 27 { v - 27 } else { v };
        libsecp256k1::RecoveryId::parse(v).map_err(|_| CryptoError::InvalidRecoveryId(self.0[64]))
    }

    /// Recover the signer address from the digest this signature covers
    pub fn recover(&self, digest: &Hash) -> Result<Address, CryptoError> {
        let message = libsecp256k1::Message::parse(digest.as_bytes());
        let signature: [u8; 64] = self.0[..64].try_into().unwrap();
        let signature = libsecp256k1::Signature::parse_standard(&signature)
            .map_err(|_| CryptoError::InvalidSignature)?;
        let recovery_id = self.recovery_id()?;
        let public = libsecp256k1::recover(&message, &signature, &recovery_id)
            .map_err(|_| CryptoError::RecoveryFailed)?;
        Ok(Address::from_public_key(&public))
    }
}

impl Debug for Signature {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        write!(f, "Signature({})", self.to_hex())
    }
}

impl Display for Signature {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        write!(f, "{}", self.to_hex())
    }
}

impl Serializer for Signature {
    fn write(&self, writer: &mut Writer) {
        writer.write_bytes(&self.0);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        Ok(Signature(reader.read_bytes_65()?))
    }

    fn size(&self) -> usize {
        SIGNATURE_SIZE
    }
}

impl Serialize for Signature {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Signature {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let hex = String::deserialize(deserializer)?;
        let bytes = hex::decode(hex.trim_start_matches("0x")).map_err(SerdeError::custom)?;
        Signature::from_slice(&bytes).map_err(SerdeError::custom)
    }
}

/// Signing key with its derived address. Key generation is deterministic
/// from secret bytes; randomness stays at the caller.
pub struct KeyPair {
    secret: libsecp256k1::SecretKey,
    public: libsecp256k1::PublicKey,
}

impl KeyPair {
    pub fn from_secret(bytes: &[u8; 32]) -> Result<Self, CryptoError> {
        let secret =
            libsecp256k1::SecretKey::parse(bytes).map_err(|_| CryptoError::InvalidSecretKey)?;
        let public = libsecp256k1::PublicKey::from_secret_key(&secret);
        Ok(KeyPair { secret, public })
    }

    pub fn public_key(&self) -> &libsecp256k1::PublicKey {
        &self.public
    }

    pub fn address(&self) -> Address {
        Address::from_public_key(&self.public)
    }

    /// Sign a 32-byte digest, producing the recoverable wire form
    pub fn sign(&self, digest: &Hash) -> Signature {
        let message = libsecp256k1::Message::parse(digest.as_bytes());
        let (signature, recovery_id) = libsecp256k1::sign(&message, &self.secret);
        let mut bytes = [0u8; SIGNATURE_SIZE];
        bytes[..64].copy_from_slice(&signature.serialize());
        bytes[64] = recovery_id.serialize();
        Signature(bytes)
    }
}

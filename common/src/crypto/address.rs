use serde::de::Error as SerdeError;
use serde::{Deserialize, Deserializer, Serialize};
use std::{
    fmt::{Display, Error, Formatter},
    str::FromStr,
};

use super::{bech32, keccak256, CryptoError};
use crate::serializer::{Reader, ReaderError, Serializer, Writer};

pub const ADDRESS_SIZE: usize = 20;

/// Account address: last 20 bytes of the keccak-256 of the uncompressed
/// secp256k1 public key.
#[derive(Eq, PartialEq, PartialOrd, Ord, Clone, Copy, Debug, Hash)]
pub struct Address([u8; ADDRESS_SIZE]);

impl Address {
    pub const fn new(bytes: [u8; ADDRESS_SIZE]) -> Self {
        Address(bytes)
    }

    pub const fn zero() -> Self {
        Address([0; ADDRESS_SIZE])
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0; ADDRESS_SIZE]
    }

    pub fn from_public_key(key: &libsecp256k1::PublicKey) -> Self {
        // drop the 0x04 tag, keep the low 20 bytes of the keccak
        let serialized = key.serialize();
        let digest = keccak256(&serialized[1..]);
        let mut bytes = [0u8; ADDRESS_SIZE];
        bytes.copy_from_slice(&digest.as_bytes()[12..]);
        Address(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        let bytes: [u8; ADDRESS_SIZE] = bytes
            .try_into()
            .map_err(|_| CryptoError::InvalidAddressLength(bytes.len()))?;
        Ok(Address(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; ADDRESS_SIZE] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    pub fn to_bech32(&self, hrp: &str) -> Result<String, CryptoError> {
        Ok(bech32::encode(hrp, &self.0)?)
    }

    pub fn from_bech32(encoded: &str, expected_hrp: &str) -> Result<Self, CryptoError> {
        let (hrp, payload) = bech32::decode(encoded)?;
        if hrp != expected_hrp {
            return Err(CryptoError::InvalidAddressPrefix(hrp));
        }
        Address::from_slice(&payload)
    }
}

impl FromStr for Address {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s.trim_start_matches("0x"))
            .map_err(|_| CryptoError::InvalidAddressLength(0))?;
        Address::from_slice(&bytes)
    }
}

impl Display for Address {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        write!(f, "{}", self.to_hex())
    }
}

impl AsRef<[u8]> for Address {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Serializer for Address {
    fn write(&self, writer: &mut Writer) {
        writer.write_bytes(&self.0);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        Ok(Address(reader.read_bytes_20()?))
    }

    fn size(&self) -> usize {
        ADDRESS_SIZE
    }
}

impl Serialize for Address {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let hex = String::deserialize(deserializer)?;
        Address::from_str(&hex).map_err(SerdeError::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyPair;

    #[test]
    fn address_from_key_is_stable() -> Result<(), Box<dyn std::error::Error>> {
        let keypair = KeyPair::from_secret(&[7u8; 32])?;
        let a = keypair.address();
        let b = keypair.address();
        assert_eq!(a, b);
        assert!(!a.is_zero());
        Ok(())
    }

    #[test]
    fn hex_roundtrip() -> Result<(), Box<dyn std::error::Error>> {
        let address = Address::new([0x42; 20]);
        let parsed: Address = address.to_hex().parse()?;
        assert_eq!(address, parsed);
        Ok(())
    }

    #[test]
    fn bech32_roundtrip() -> Result<(), Box<dyn std::error::Error>> {
        let address = Address::new([0x17; 20]);
        let encoded = address.to_bech32("nhb")?;
        let decoded = Address::from_bech32(&encoded, "nhb")?;
        assert_eq!(address, decoded);
        assert!(Address::from_bech32(&encoded, "tnhb").is_err());
        Ok(())
    }
}

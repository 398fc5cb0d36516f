mod address;
mod hash;
mod signature;

pub mod bech32;
pub mod error;

pub use address::{Address, ADDRESS_SIZE};
pub use error::CryptoError;
pub use hash::*;
pub use signature::{KeyPair, Signature, SIGNATURE_SIZE};

mod payload;

pub use payload::*;

use primitive_types::U256;
use serde::{Deserialize, Serialize};

use crate::{
    account::Nonce,
    config::TX_SIGNING_DOMAIN,
    crypto::{keccak256_concat, Address, CryptoError, Hash, KeyPair, Signature},
    serializer::{Reader, ReaderError, Serializer, Writer},
};

/// Signed transaction envelope. The binary encoding produced by
/// [`Serializer`] is the chain's stable external contract; the signature
/// covers the domain-separated keccak-256 of everything before it.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub chain_id: u64,
    pub nonce: Nonce,
    pub gas_limit: u64,
    pub gas_price: U256,
    pub payload: TransactionPayload,
    /// Opaque at-most-once tag; replay-protected within its TTL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intent_ref: Option<Hash>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intent_expiry: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merchant: Option<Address>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refund_of: Option<Hash>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paymaster: Option<Address>,
    pub signature: Signature,
}

/// Envelope before signing; produced by builders, consumed by
/// [`UnsignedTransaction::sign`].
#[derive(Clone, Debug)]
pub struct UnsignedTransaction {
    pub chain_id: u64,
    pub nonce: Nonce,
    pub gas_limit: u64,
    pub gas_price: U256,
    pub payload: TransactionPayload,
    pub intent_ref: Option<Hash>,
    pub intent_expiry: Option<u64>,
    pub merchant: Option<Address>,
    pub device_id: Option<String>,
    pub refund_of: Option<Hash>,
    pub paymaster: Option<Address>,
}

fn write_unsigned(
    writer: &mut Writer,
    chain_id: u64,
    nonce: Nonce,
    gas_limit: u64,
    gas_price: &U256,
    payload: &TransactionPayload,
    intent_ref: &Option<Hash>,
    intent_expiry: &Option<u64>,
    merchant: &Option<Address>,
    device_id: &Option<String>,
    refund_of: &Option<Hash>,
    paymaster: &Option<Address>,
) {
    writer.write_u64(&chain_id);
    writer.write_u64(&nonce);
    writer.write_u64(&gas_limit);
    gas_price.write(writer);
    payload.write(writer);
    intent_ref.write(writer);
    intent_expiry.write(writer);
    merchant.write(writer);
    device_id.write(writer);
    refund_of.write(writer);
    paymaster.write(writer);
}

impl UnsignedTransaction {
    fn unsigned_bytes(&self) -> Vec<u8> {
        let mut writer = Writer::new();
        write_unsigned(
            &mut writer,
            self.chain_id,
            self.nonce,
            self.gas_limit,
            &self.gas_price,
            &self.payload,
            &self.intent_ref,
            &self.intent_expiry,
            &self.merchant,
            &self.device_id,
            &self.refund_of,
            &self.paymaster,
        );
        writer.finish()
    }

    pub fn signing_digest(&self) -> Hash {
        keccak256_concat(&[TX_SIGNING_DOMAIN, &self.unsigned_bytes()])
    }

    pub fn sign(self, keypair: &KeyPair) -> Transaction {
        let signature = keypair.sign(&self.signing_digest());
        Transaction {
            chain_id: self.chain_id,
            nonce: self.nonce,
            gas_limit: self.gas_limit,
            gas_price: self.gas_price,
            payload: self.payload,
            intent_ref: self.intent_ref,
            intent_expiry: self.intent_expiry,
            merchant: self.merchant,
            device_id: self.device_id,
            refund_of: self.refund_of,
            paymaster: self.paymaster,
            signature,
        }
    }
}

impl Transaction {
    fn unsigned_bytes(&self) -> Vec<u8> {
        let mut writer = Writer::new();
        write_unsigned(
            &mut writer,
            self.chain_id,
            self.nonce,
            self.gas_limit,
            &self.gas_price,
            &self.payload,
            &self.intent_ref,
            &self.intent_expiry,
            &self.merchant,
            &self.device_id,
            &self.refund_of,
            &self.paymaster,
        );
        writer.finish()
    }

    pub fn signing_digest(&self) -> Hash {
        keccak256_concat(&[TX_SIGNING_DOMAIN, &self.unsigned_bytes()])
    }

    /// Recover the sender address from the envelope signature
    pub fn recover_sender(&self) -> Result<Address, CryptoError> {
        self.signature.recover(&self.signing_digest())
    }

    /// Transaction hash over the full signed encoding
    pub fn hash(&self) -> Hash {
        crate::crypto::keccak256(&self.to_bytes())
    }
}

impl Serializer for Transaction {
    fn write(&self, writer: &mut Writer) {
        write_unsigned(
            writer,
            self.chain_id,
            self.nonce,
            self.gas_limit,
            &self.gas_price,
            &self.payload,
            &self.intent_ref,
            &self.intent_expiry,
            &self.merchant,
            &self.device_id,
            &self.refund_of,
            &self.paymaster,
        );
        self.signature.write(writer);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        Ok(Transaction {
            chain_id: reader.read_u64()?,
            nonce: reader.read_u64()?,
            gas_limit: reader.read_u64()?,
            gas_price: U256::read(reader)?,
            payload: TransactionPayload::read(reader)?,
            intent_ref: Option::read(reader)?,
            intent_expiry: Option::read(reader)?,
            merchant: Option::read(reader)?,
            device_id: Option::read(reader)?,
            refund_of: Option::read(reader)?,
            paymaster: Option::read(reader)?,
            signature: Signature::read(reader)?,
        })
    }

    fn size(&self) -> usize {
        8 + 8
            + 8
            + 32
            + self.payload.size()
            + self.intent_ref.size()
            + self.intent_expiry.size()
            + self.merchant.size()
            + self.device_id.size()
            + self.refund_of.size()
            + self.paymaster.size()
            + self.signature.size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::NHB_CHAIN_ID, crypto::keccak256, escrow::Token};

    fn unsigned(keypair_nonce: Nonce) -> UnsignedTransaction {
        UnsignedTransaction {
            chain_id: NHB_CHAIN_ID,
            nonce: keypair_nonce,
            gas_limit: 21_000,
            gas_price: U256::from(1u64),
            payload: TransactionPayload::Transfer(TransferPayload {
                to: Address::new([9u8; 20]),
                value: U256::from(5u64),
                data: Vec::new(),
            }),
            intent_ref: Some(keccak256(b"intent")),
            intent_expiry: Some(1_000_000),
            merchant: None,
            device_id: Some("pos-7".into()),
            refund_of: None,
            paymaster: None,
        }
    }

    #[test]
    fn sender_recovery_roundtrip() -> Result<(), Box<dyn std::error::Error>> {
        let keypair = KeyPair::from_secret(&[11u8; 32])?;
        let tx = unsigned(0).sign(&keypair);
        assert_eq!(tx.recover_sender()?, keypair.address());
        Ok(())
    }

    #[test]
    fn wire_roundtrip() -> Result<(), Box<dyn std::error::Error>> {
        let keypair = KeyPair::from_secret(&[12u8; 32])?;
        let tx = unsigned(3).sign(&keypair);
        let decoded = Transaction::from_bytes(&tx.to_bytes())?;
        assert_eq!(decoded.nonce, 3);
        assert_eq!(decoded.hash(), tx.hash());
        assert_eq!(decoded.recover_sender()?, keypair.address());
        assert_eq!(tx.size(), tx.to_bytes().len());
        Ok(())
    }

    #[test]
    fn tampered_envelope_changes_sender() -> Result<(), Box<dyn std::error::Error>> {
        let keypair = KeyPair::from_secret(&[13u8; 32])?;
        let mut tx = unsigned(1).sign(&keypair);
        tx.nonce = 2;
        assert_ne!(tx.recover_sender()?, keypair.address());
        Ok(())
    }

    #[test]
    fn payload_module_names() {
        let payload = TransactionPayload::Escrow(EscrowPayload::Dispute {
            id: keccak256(b"escrow"),
        });
        assert_eq!(payload.module(), "escrow");
        let payload = TransactionPayload::Mint(MintPayload {
            voucher_id: keccak256(b"v"),
            to: Address::new([1u8; 20]),
            token: Token::Nhb,
            amount: U256::from(1u64),
        });
        assert_eq!(payload.module(), "mint");
    }
}

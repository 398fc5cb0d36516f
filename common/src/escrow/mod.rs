mod decision;
mod realm;
mod trade;

pub use decision::{DecisionOutcome, DecisionPayload};
pub use realm::{
    ArbitrationScheme, ArbitratorSet, FrozenPolicy, Realm, RealmConfigError, RealmFeeSchedule,
    RealmMetadata,
};
pub use trade::{trade_id, Trade, TradeOutcome, TradeStatus};

use primitive_types::U256;
use serde::{Deserialize, Serialize};

use crate::{
    crypto::{keccak256_concat, Address, Hash},
    serializer::{Reader, ReaderError, Serializer, Writer},
};

/// Tokens an escrow may custody
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum Token {
    Nhb,
    Znhb,
}

impl Token {
    pub fn as_str(&self) -> &'static str {
        match self {
            Token::Nhb => "NHB",
            Token::Znhb => "ZNHB",
        }
    }
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Serializer for Token {
    fn write(&self, writer: &mut Writer) {
        let tag = match self {
            Token::Nhb => 0u8,
            Token::Znhb => 1u8,
        };
        writer.write_u8(tag);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        match reader.read_u8()? {
            0 => Ok(Token::Nhb),
            1 => Ok(Token::Znhb),
            _ => Err(ReaderError::InvalidValue),
        }
    }

    fn size(&self) -> usize {
        1
    }
}

/// Escrow lifecycle state. `Released`, `Refunded` and `Expired` are
/// terminal; records persist for audit after termination.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum EscrowStatus {
    Init,
    Funded,
    Released,
    Refunded,
    Expired,
    Disputed,
}

impl EscrowStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            EscrowStatus::Released | EscrowStatus::Refunded | EscrowStatus::Expired
        )
    }
}

impl Serializer for EscrowStatus {
    fn write(&self, writer: &mut Writer) {
        let tag = match self {
            EscrowStatus::Init => 0u8,
            EscrowStatus::Funded => 1,
            EscrowStatus::Released => 2,
            EscrowStatus::Refunded => 3,
            EscrowStatus::Expired => 4,
            EscrowStatus::Disputed => 5,
        };
        writer.write_u8(tag);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        Ok(match reader.read_u8()? {
            0 => EscrowStatus::Init,
            1 => EscrowStatus::Funded,
            2 => EscrowStatus::Released,
            3 => EscrowStatus::Refunded,
            4 => EscrowStatus::Expired,
            5 => EscrowStatus::Disputed,
            _ => return Err(ReaderError::InvalidValue),
        })
    }

    fn size(&self) -> usize {
        1
    }
}

/// Escrow identifier: `keccak256(payer ‖ payee ‖ meta_hash ‖ nonce_be64)`.
/// Injective over the tuple, so a payer cannot mint two escrows with the
/// same nonce and metadata against the same payee.
pub fn escrow_id(payer: &Address, payee: &Address, meta_hash: &Hash, nonce: u64) -> Hash {
    keccak256_concat(&[
        payer.as_bytes(),
        payee.as_bytes(),
        meta_hash.as_bytes(),
        &nonce.to_be_bytes(),
    ])
}

/// On-chain escrow record
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Escrow {
    pub id: Hash,
    pub payer: Address,
    pub payee: Address,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mediator: Option<Address>,
    pub token: Token,
    pub amount: U256,
    pub fee_bps: u32,
    pub deadline: i64,
    pub created_at: i64,
    pub updated_at: i64,
    pub nonce: u64,
    pub meta_hash: Hash,
    pub status: EscrowStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub realm_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frozen_arb: Option<FrozenPolicy>,
    /// keccak digest of the accepted decision payload; zero until resolved
    pub resolution_hash: Hash,
}

impl Escrow {
    pub fn is_resolved(&self) -> bool {
        !self.resolution_hash.is_zero()
    }
}

impl Serializer for Escrow {
    fn write(&self, writer: &mut Writer) {
        self.id.write(writer);
        self.payer.write(writer);
        self.payee.write(writer);
        self.mediator.write(writer);
        self.token.write(writer);
        self.amount.write(writer);
        writer.write_u32(&self.fee_bps);
        self.deadline.write(writer);
        self.created_at.write(writer);
        self.updated_at.write(writer);
        writer.write_u64(&self.nonce);
        self.meta_hash.write(writer);
        self.status.write(writer);
        self.realm_id.write(writer);
        self.frozen_arb.write(writer);
        self.resolution_hash.write(writer);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        Ok(Escrow {
            id: Hash::read(reader)?,
            payer: Address::read(reader)?,
            payee: Address::read(reader)?,
            mediator: Option::read(reader)?,
            token: Token::read(reader)?,
            amount: U256::read(reader)?,
            fee_bps: reader.read_u32()?,
            deadline: i64::read(reader)?,
            created_at: i64::read(reader)?,
            updated_at: i64::read(reader)?,
            nonce: reader.read_u64()?,
            meta_hash: Hash::read(reader)?,
            status: EscrowStatus::read(reader)?,
            realm_id: Option::read(reader)?,
            frozen_arb: Option::read(reader)?,
            resolution_hash: Hash::read(reader)?,
        })
    }

    fn size(&self) -> usize {
        self.id.size()
            + self.payer.size()
            + self.payee.size()
            + self.mediator.size()
            + self.token.size()
            + 32
            + 4
            + 8 * 3
            + 8
            + self.meta_hash.size()
            + self.status.size()
            + self.realm_id.size()
            + self.frozen_arb.size()
            + self.resolution_hash.size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escrow_id_is_injective_over_nonce() {
        let payer = Address::new([1u8; 20]);
        let payee = Address::new([2u8; 20]);
        let meta = Hash::zero();
        let a = escrow_id(&payer, &payee, &meta, 1);
        let b = escrow_id(&payer, &payee, &meta, 2);
        assert_ne!(a, b);
        assert_eq!(a, escrow_id(&payer, &payee, &meta, 1));
    }

    #[test]
    fn status_tags_roundtrip() -> Result<(), ReaderError> {
        for status in [
            EscrowStatus::Init,
            EscrowStatus::Funded,
            EscrowStatus::Released,
            EscrowStatus::Refunded,
            EscrowStatus::Expired,
            EscrowStatus::Disputed,
        ] {
            assert_eq!(EscrowStatus::from_bytes(&status.to_bytes())?, status);
        }
        assert!(EscrowStatus::Released.is_terminal());
        assert!(!EscrowStatus::Disputed.is_terminal());
        Ok(())
    }

    #[test]
    fn escrow_record_roundtrip() -> Result<(), ReaderError> {
        let payer = Address::new([1u8; 20]);
        let payee = Address::new([2u8; 20]);
        let escrow = Escrow {
            id: escrow_id(&payer, &payee, &Hash::zero(), 1),
            payer,
            payee,
            mediator: Some(Address::new([3u8; 20])),
            token: Token::Nhb,
            amount: U256::from(1000u64),
            fee_bps: 250,
            deadline: 3600,
            created_at: 0,
            updated_at: 0,
            nonce: 1,
            meta_hash: Hash::zero(),
            status: EscrowStatus::Init,
            realm_id: None,
            frozen_arb: None,
            resolution_hash: Hash::zero(),
        };
        let decoded = Escrow::from_bytes(&escrow.to_bytes())?;
        assert_eq!(decoded, escrow);
        assert_eq!(escrow.size(), escrow.to_bytes().len());
        Ok(())
    }
}

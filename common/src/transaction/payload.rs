use primitive_types::U256;
use serde::{Deserialize, Serialize};

use crate::{
    crypto::{Address, Hash, Signature},
    escrow::{Token, TradeOutcome},
    serializer::{Reader, ReaderError, Serializer, Writer},
};

/// Typed operation carried by a transaction. The tag byte in the binary
/// form is stable; new operations append, never renumber.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "snake_case")]
pub enum TransactionPayload {
    Mint(MintPayload),
    Transfer(TransferPayload),
    RegisterIdentity(RegisterIdentityPayload),
    Escrow(EscrowPayload),
    Trade(TradePayload),
    Stake(StakePayload),
    Unstake(UnstakePayload),
    ClaimUnbond(ClaimUnbondPayload),
    Heartbeat(HeartbeatPayload),
    SwapPayout(SwapPayoutPayload),
}

impl TransactionPayload {
    /// Module name used for quota accounting and metrics labels
    pub fn module(&self) -> &'static str {
        match self {
            TransactionPayload::Mint(_) => "mint",
            TransactionPayload::Transfer(_) => "transfer",
            TransactionPayload::RegisterIdentity(_) => "identity",
            TransactionPayload::Escrow(_) => "escrow",
            TransactionPayload::Trade(_) => "trade",
            TransactionPayload::Stake(_)
            | TransactionPayload::Unstake(_)
            | TransactionPayload::ClaimUnbond(_) => "staking",
            TransactionPayload::Heartbeat(_) => "engagement",
            TransactionPayload::SwapPayout(_) => "swap",
        }
    }
}

impl Serializer for TransactionPayload {
    fn write(&self, writer: &mut Writer) {
        match self {
            TransactionPayload::Mint(payload) => {
                writer.write_u8(0);
                payload.write(writer);
            }
            TransactionPayload::Transfer(payload) => {
                writer.write_u8(1);
                payload.write(writer);
            }
            TransactionPayload::RegisterIdentity(payload) => {
                writer.write_u8(2);
                payload.write(writer);
            }
            TransactionPayload::Escrow(payload) => {
                writer.write_u8(3);
                payload.write(writer);
            }
            TransactionPayload::Trade(payload) => {
                writer.write_u8(4);
                payload.write(writer);
            }
            TransactionPayload::Stake(payload) => {
                writer.write_u8(5);
                payload.write(writer);
            }
            TransactionPayload::Unstake(payload) => {
                writer.write_u8(6);
                payload.write(writer);
            }
            TransactionPayload::ClaimUnbond(payload) => {
                writer.write_u8(7);
                payload.write(writer);
            }
            TransactionPayload::Heartbeat(payload) => {
                writer.write_u8(8);
                payload.write(writer);
            }
            TransactionPayload::SwapPayout(payload) => {
                writer.write_u8(9);
                payload.write(writer);
            }
        }
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        Ok(match reader.read_u8()? {
            0 => TransactionPayload::Mint(MintPayload::read(reader)?),
            1 => TransactionPayload::Transfer(TransferPayload::read(reader)?),
            2 => TransactionPayload::RegisterIdentity(RegisterIdentityPayload::read(reader)?),
            3 => TransactionPayload::Escrow(EscrowPayload::read(reader)?),
            4 => TransactionPayload::Trade(TradePayload::read(reader)?),
            5 => TransactionPayload::Stake(StakePayload::read(reader)?),
            6 => TransactionPayload::Unstake(UnstakePayload::read(reader)?),
            7 => TransactionPayload::ClaimUnbond(ClaimUnbondPayload::read(reader)?),
            8 => TransactionPayload::Heartbeat(HeartbeatPayload::read(reader)?),
            9 => TransactionPayload::SwapPayout(SwapPayoutPayload::read(reader)?),
            _ => return Err(ReaderError::InvalidValue),
        })
    }

    fn size(&self) -> usize {
        1 + match self {
            TransactionPayload::Mint(payload) => payload.size(),
            TransactionPayload::Transfer(payload) => payload.size(),
            TransactionPayload::RegisterIdentity(payload) => payload.size(),
            TransactionPayload::Escrow(payload) => payload.size(),
            TransactionPayload::Trade(payload) => payload.size(),
            TransactionPayload::Stake(payload) => payload.size(),
            TransactionPayload::Unstake(payload) => payload.size(),
            TransactionPayload::ClaimUnbond(payload) => payload.size(),
            TransactionPayload::Heartbeat(payload) => payload.size(),
            TransactionPayload::SwapPayout(payload) => payload.size(),
        }
    }
}

/// Voucher-backed mint of native or secondary balance
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct MintPayload {
    pub voucher_id: Hash,
    pub to: Address,
    pub token: Token,
    pub amount: U256,
}

impl Serializer for MintPayload {
    fn write(&self, writer: &mut Writer) {
        self.voucher_id.write(writer);
        self.to.write(writer);
        self.token.write(writer);
        self.amount.write(writer);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        Ok(MintPayload {
            voucher_id: Hash::read(reader)?,
            to: Address::read(reader)?,
            token: Token::read(reader)?,
            amount: U256::read(reader)?,
        })
    }

    fn size(&self) -> usize {
        self.voucher_id.size() + self.to.size() + self.token.size() + 32
    }
}

/// Native value transfer, executed through the EVM adapter
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct TransferPayload {
    pub to: Address,
    pub value: U256,
    pub data: Vec<u8>,
}

impl Serializer for TransferPayload {
    fn write(&self, writer: &mut Writer) {
        self.to.write(writer);
        self.value.write(writer);
        self.data.write(writer);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        Ok(TransferPayload {
            to: Address::read(reader)?,
            value: U256::read(reader)?,
            data: Vec::read(reader)?,
        })
    }

    fn size(&self) -> usize {
        self.to.size() + 32 + self.data.size()
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct RegisterIdentityPayload {
    pub username: String,
}

impl Serializer for RegisterIdentityPayload {
    fn write(&self, writer: &mut Writer) {
        self.username.write(writer);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        Ok(RegisterIdentityPayload {
            username: String::read(reader)?,
        })
    }

    fn size(&self) -> usize {
        self.username.size()
    }
}

/// Escrow operations. Creation derives the escrow id from the sender, the
/// payee, the metadata hash and the caller-chosen nonce.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "snake_case")]
pub enum EscrowPayload {
    Create(EscrowCreatePayload),
    Lock { id: Hash },
    Release { id: Hash },
    Refund { id: Hash },
    Dispute { id: Hash },
    Arbitrate(ArbitratePayload),
    Expire { id: Hash },
}

impl Serializer for EscrowPayload {
    fn write(&self, writer: &mut Writer) {
        match self {
            EscrowPayload::Create(payload) => {
                writer.write_u8(0);
                payload.write(writer);
            }
            EscrowPayload::Lock { id } => {
                writer.write_u8(1);
                id.write(writer);
            }
            EscrowPayload::Release { id } => {
                writer.write_u8(2);
                id.write(writer);
            }
            EscrowPayload::Refund { id } => {
                writer.write_u8(3);
                id.write(writer);
            }
            EscrowPayload::Dispute { id } => {
                writer.write_u8(4);
                id.write(writer);
            }
            EscrowPayload::Arbitrate(payload) => {
                writer.write_u8(5);
                payload.write(writer);
            }
            EscrowPayload::Expire { id } => {
                writer.write_u8(6);
                id.write(writer);
            }
        }
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        Ok(match reader.read_u8()? {
            0 => EscrowPayload::Create(EscrowCreatePayload::read(reader)?),
            1 => EscrowPayload::Lock {
                id: Hash::read(reader)?,
            },
            2 => EscrowPayload::Release {
                id: Hash::read(reader)?,
            },
            3 => EscrowPayload::Refund {
                id: Hash::read(reader)?,
            },
            4 => EscrowPayload::Dispute {
                id: Hash::read(reader)?,
            },
            5 => EscrowPayload::Arbitrate(ArbitratePayload::read(reader)?),
            6 => EscrowPayload::Expire {
                id: Hash::read(reader)?,
            },
            _ => return Err(ReaderError::InvalidValue),
        })
    }

    fn size(&self) -> usize {
        1 + match self {
            EscrowPayload::Create(payload) => payload.size(),
            EscrowPayload::Arbitrate(payload) => payload.size(),
            EscrowPayload::Lock { id }
            | EscrowPayload::Release { id }
            | EscrowPayload::Refund { id }
            | EscrowPayload::Dispute { id }
            | EscrowPayload::Expire { id } => id.size(),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct EscrowCreatePayload {
    pub payee: Address,
    pub token: Token,
    pub amount: U256,
    pub fee_bps: u32,
    pub deadline: i64,
    pub nonce: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mediator: Option<Address>,
    pub meta_hash: Hash,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub realm_id: Option<String>,
}

impl Serializer for EscrowCreatePayload {
    fn write(&self, writer: &mut Writer) {
        self.payee.write(writer);
        self.token.write(writer);
        self.amount.write(writer);
        writer.write_u32(&self.fee_bps);
        self.deadline.write(writer);
        writer.write_u64(&self.nonce);
        self.mediator.write(writer);
        self.meta_hash.write(writer);
        self.realm_id.write(writer);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        Ok(EscrowCreatePayload {
            payee: Address::read(reader)?,
            token: Token::read(reader)?,
            amount: U256::read(reader)?,
            fee_bps: reader.read_u32()?,
            deadline: i64::read(reader)?,
            nonce: reader.read_u64()?,
            mediator: Option::read(reader)?,
            meta_hash: Hash::read(reader)?,
            realm_id: Option::read(reader)?,
        })
    }

    fn size(&self) -> usize {
        self.payee.size()
            + self.token.size()
            + 32
            + 4
            + 8
            + 8
            + self.mediator.size()
            + self.meta_hash.size()
            + self.realm_id.size()
    }
}

/// Threshold-signed resolution of a disputed escrow. `decision` carries
/// the canonical JSON payload bytes the arbitrators signed.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ArbitratePayload {
    #[serde(with = "hex::serde")]
    pub decision: Vec<u8>,
    pub signatures: Vec<Signature>,
}

impl Serializer for ArbitratePayload {
    fn write(&self, writer: &mut Writer) {
        self.decision.write(writer);
        self.signatures.write(writer);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        Ok(ArbitratePayload {
            decision: Vec::read(reader)?,
            signatures: Vec::read(reader)?,
        })
    }

    fn size(&self) -> usize {
        self.decision.size() + self.signatures.size()
    }
}

/// Trade operations over paired escrows
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "snake_case")]
pub enum TradePayload {
    Create(TradeCreatePayload),
    Settle { id: Hash },
    Dispute { id: Hash },
    Resolve { id: Hash, outcome: TradeOutcome },
    Expire { id: Hash },
}

impl Serializer for TradePayload {
    fn write(&self, writer: &mut Writer) {
        match self {
            TradePayload::Create(payload) => {
                writer.write_u8(0);
                payload.write(writer);
            }
            TradePayload::Settle { id } => {
                writer.write_u8(1);
                id.write(writer);
            }
            TradePayload::Dispute { id } => {
                writer.write_u8(2);
                id.write(writer);
            }
            TradePayload::Resolve { id, outcome } => {
                writer.write_u8(3);
                id.write(writer);
                outcome.write(writer);
            }
            TradePayload::Expire { id } => {
                writer.write_u8(4);
                id.write(writer);
            }
        }
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        Ok(match reader.read_u8()? {
            0 => TradePayload::Create(TradeCreatePayload::read(reader)?),
            1 => TradePayload::Settle {
                id: Hash::read(reader)?,
            },
            2 => TradePayload::Dispute {
                id: Hash::read(reader)?,
            },
            3 => TradePayload::Resolve {
                id: Hash::read(reader)?,
                outcome: TradeOutcome::read(reader)?,
            },
            4 => TradePayload::Expire {
                id: Hash::read(reader)?,
            },
            _ => return Err(ReaderError::InvalidValue),
        })
    }

    fn size(&self) -> usize {
        1 + match self {
            TradePayload::Create(payload) => payload.size(),
            TradePayload::Settle { id }
            | TradePayload::Dispute { id }
            | TradePayload::Expire { id } => id.size(),
            TradePayload::Resolve { id, outcome } => id.size() + outcome.size(),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct TradeCreatePayload {
    pub offer_id: Hash,
    pub seller: Address,
    pub base_token: Token,
    pub base_amount: U256,
    pub quote_token: Token,
    pub quote_amount: U256,
    pub deadline: i64,
    pub slippage_bps: u32,
    /// Caller-chosen 32-byte nonce feeding the trade id derivation
    pub trade_nonce: Hash,
}

impl Serializer for TradeCreatePayload {
    fn write(&self, writer: &mut Writer) {
        self.offer_id.write(writer);
        self.seller.write(writer);
        self.base_token.write(writer);
        self.base_amount.write(writer);
        self.quote_token.write(writer);
        self.quote_amount.write(writer);
        self.deadline.write(writer);
        writer.write_u32(&self.slippage_bps);
        self.trade_nonce.write(writer);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        Ok(TradeCreatePayload {
            offer_id: Hash::read(reader)?,
            seller: Address::read(reader)?,
            base_token: Token::read(reader)?,
            base_amount: U256::read(reader)?,
            quote_token: Token::read(reader)?,
            quote_amount: U256::read(reader)?,
            deadline: i64::read(reader)?,
            slippage_bps: reader.read_u32()?,
            trade_nonce: Hash::read(reader)?,
        })
    }

    fn size(&self) -> usize {
        self.offer_id.size()
            + self.seller.size()
            + 2
            + 32 * 2
            + 8
            + 4
            + self.trade_nonce.size()
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct StakePayload {
    pub validator: Address,
    pub amount: U256,
}

impl Serializer for StakePayload {
    fn write(&self, writer: &mut Writer) {
        self.validator.write(writer);
        self.amount.write(writer);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        Ok(StakePayload {
            validator: Address::read(reader)?,
            amount: U256::read(reader)?,
        })
    }

    fn size(&self) -> usize {
        self.validator.size() + 32
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct UnstakePayload {
    pub validator: Address,
    pub amount: U256,
}

impl Serializer for UnstakePayload {
    fn write(&self, writer: &mut Writer) {
        self.validator.write(writer);
        self.amount.write(writer);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        Ok(UnstakePayload {
            validator: Address::read(reader)?,
            amount: U256::read(reader)?,
        })
    }

    fn size(&self) -> usize {
        self.validator.size() + 32
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ClaimUnbondPayload {
    pub unbond_id: u64,
}

impl Serializer for ClaimUnbondPayload {
    fn write(&self, writer: &mut Writer) {
        writer.write_u64(&self.unbond_id);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        Ok(ClaimUnbondPayload {
            unbond_id: reader.read_u64()?,
        })
    }

    fn size(&self) -> usize {
        8
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatPayload {
    pub timestamp: u64,
}

impl Serializer for HeartbeatPayload {
    fn write(&self, writer: &mut Writer) {
        writer.write_u64(&self.timestamp);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        Ok(HeartbeatPayload {
            timestamp: reader.read_u64()?,
        })
    }

    fn size(&self) -> usize {
        8
    }
}

/// Receipt acknowledging an off-chain swap payout
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct SwapPayoutPayload {
    pub receipt_id: Hash,
    pub recipient: Address,
    pub token: Token,
    pub amount: U256,
}

impl Serializer for SwapPayoutPayload {
    fn write(&self, writer: &mut Writer) {
        self.receipt_id.write(writer);
        self.recipient.write(writer);
        self.token.write(writer);
        self.amount.write(writer);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        Ok(SwapPayoutPayload {
            receipt_id: Hash::read(reader)?,
            recipient: Address::read(reader)?,
            token: Token::read(reader)?,
            amount: U256::read(reader)?,
        })
    }

    fn size(&self) -> usize {
        self.receipt_id.size() + self.recipient.size() + self.token.size() + 32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keccak256;

    #[test]
    fn payload_tags_roundtrip() -> Result<(), ReaderError> {
        let payloads = vec![
            TransactionPayload::RegisterIdentity(RegisterIdentityPayload {
                username: "carol".into(),
            }),
            TransactionPayload::Escrow(EscrowPayload::Create(EscrowCreatePayload {
                payee: Address::new([2u8; 20]),
                token: Token::Nhb,
                amount: U256::from(1000u64),
                fee_bps: 250,
                deadline: 3600,
                nonce: 1,
                mediator: None,
                meta_hash: Hash::zero(),
                realm_id: Some("marketplace".into()),
            })),
            TransactionPayload::Trade(TradePayload::Resolve {
                id: keccak256(b"trade"),
                outcome: TradeOutcome::ReleaseBaseRefundQuote,
            }),
            TransactionPayload::Heartbeat(HeartbeatPayload { timestamp: 42 }),
        ];
        for payload in payloads {
            let bytes = payload.to_bytes();
            let decoded = TransactionPayload::from_bytes(&bytes)?;
            assert_eq!(decoded.to_bytes(), bytes);
            assert_eq!(payload.size(), bytes.len());
        }
        Ok(())
    }
}

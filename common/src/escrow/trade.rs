use primitive_types::U256;
use serde::{Deserialize, Serialize};

use super::Token;
use crate::{
    crypto::{keccak256_concat, Address, Hash},
    serializer::{Reader, ReaderError, Serializer, Writer},
};

/// Trade lifecycle state, derived from the two escrow legs while the
/// trade is live. `Settled`, `Cancelled` and `Expired` are terminal.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum TradeStatus {
    Init,
    PartialFunded,
    Funded,
    Disputed,
    Settled,
    Cancelled,
    Expired,
}

impl TradeStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TradeStatus::Settled | TradeStatus::Cancelled | TradeStatus::Expired
        )
    }
}

impl Serializer for TradeStatus {
    fn write(&self, writer: &mut Writer) {
        writer.write_u8(match self {
            TradeStatus::Init => 0,
            TradeStatus::PartialFunded => 1,
            TradeStatus::Funded => 2,
            TradeStatus::Disputed => 3,
            TradeStatus::Settled => 4,
            TradeStatus::Cancelled => 5,
            TradeStatus::Expired => 6,
        });
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        Ok(match reader.read_u8()? {
            0 => TradeStatus::Init,
            1 => TradeStatus::PartialFunded,
            2 => TradeStatus::Funded,
            3 => TradeStatus::Disputed,
            4 => TradeStatus::Settled,
            5 => TradeStatus::Cancelled,
            6 => TradeStatus::Expired,
            _ => return Err(ReaderError::InvalidValue),
        })
    }

    fn size(&self) -> usize {
        1
    }
}

/// Arbitrated outcome over the escrow pair
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TradeOutcome {
    ReleaseBoth,
    RefundBoth,
    ReleaseBaseRefundQuote,
    ReleaseQuoteRefundBase,
}

impl Serializer for TradeOutcome {
    fn write(&self, writer: &mut Writer) {
        writer.write_u8(match self {
            TradeOutcome::ReleaseBoth => 0,
            TradeOutcome::RefundBoth => 1,
            TradeOutcome::ReleaseBaseRefundQuote => 2,
            TradeOutcome::ReleaseQuoteRefundBase => 3,
        });
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        Ok(match reader.read_u8()? {
            0 => TradeOutcome::ReleaseBoth,
            1 => TradeOutcome::RefundBoth,
            2 => TradeOutcome::ReleaseBaseRefundQuote,
            3 => TradeOutcome::ReleaseQuoteRefundBase,
            _ => return Err(ReaderError::InvalidValue),
        })
    }

    fn size(&self) -> usize {
        1
    }
}

/// Trade identifier: `keccak256(offer_id ‖ buyer ‖ seller ‖ nonce32)`
pub fn trade_id(offer_id: &Hash, buyer: &Address, seller: &Address, nonce: &[u8; 32]) -> Hash {
    keccak256_concat(&[
        offer_id.as_bytes(),
        buyer.as_bytes(),
        seller.as_bytes(),
        nonce,
    ])
}

/// Two-leg trade coordinating a pair of escrows that share a deadline.
///
/// The quote leg is paid by the buyer to the seller and the base leg by
/// the seller to the buyer, so `buyer = quote.payer = base.payee` and
/// `seller = quote.payee = base.payer`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Trade {
    pub id: Hash,
    pub offer_id: Hash,
    pub buyer: Address,
    pub seller: Address,
    pub quote_token: Token,
    pub base_token: Token,
    pub quote_amount: U256,
    pub base_amount: U256,
    pub escrow_quote: Hash,
    pub escrow_base: Hash,
    pub deadline: i64,
    pub created_at: i64,
    pub slippage_bps: u32,
    pub status: TradeStatus,
}

impl Serializer for Trade {
    fn write(&self, writer: &mut Writer) {
        self.id.write(writer);
        self.offer_id.write(writer);
        self.buyer.write(writer);
        self.seller.write(writer);
        self.quote_token.write(writer);
        self.base_token.write(writer);
        self.quote_amount.write(writer);
        self.base_amount.write(writer);
        self.escrow_quote.write(writer);
        self.escrow_base.write(writer);
        self.deadline.write(writer);
        self.created_at.write(writer);
        writer.write_u32(&self.slippage_bps);
        self.status.write(writer);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        Ok(Trade {
            id: Hash::read(reader)?,
            offer_id: Hash::read(reader)?,
            buyer: Address::read(reader)?,
            seller: Address::read(reader)?,
            quote_token: Token::read(reader)?,
            base_token: Token::read(reader)?,
            quote_amount: U256::read(reader)?,
            base_amount: U256::read(reader)?,
            escrow_quote: Hash::read(reader)?,
            escrow_base: Hash::read(reader)?,
            deadline: i64::read(reader)?,
            created_at: i64::read(reader)?,
            slippage_bps: reader.read_u32()?,
            status: TradeStatus::read(reader)?,
        })
    }

    fn size(&self) -> usize {
        self.id.size()
            + self.offer_id.size()
            + self.buyer.size()
            + self.seller.size()
            + 2
            + 32 * 2
            + self.escrow_quote.size()
            + self.escrow_base.size()
            + 8 * 2
            + 4
            + self.status.size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keccak256;

    #[test]
    fn trade_id_depends_on_all_inputs() {
        let offer = keccak256(b"offer");
        let buyer = Address::new([1u8; 20]);
        let seller = Address::new([2u8; 20]);
        let a = trade_id(&offer, &buyer, &seller, &[0u8; 32]);
        let b = trade_id(&offer, &buyer, &seller, &[1u8; 32]);
        let c = trade_id(&offer, &seller, &buyer, &[0u8; 32]);
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn trade_roundtrip() -> Result<(), ReaderError> {
        let trade = Trade {
            id: keccak256(b"id"),
            offer_id: keccak256(b"offer"),
            buyer: Address::new([1u8; 20]),
            seller: Address::new([2u8; 20]),
            quote_token: Token::Znhb,
            base_token: Token::Nhb,
            quote_amount: U256::from(100u64),
            base_amount: U256::from(150u64),
            escrow_quote: keccak256(b"q"),
            escrow_base: keccak256(b"b"),
            deadline: 7200,
            created_at: 0,
            slippage_bps: 50,
            status: TradeStatus::Init,
        };
        let decoded = Trade::from_bytes(&trade.to_bytes())?;
        assert_eq!(decoded, trade);
        Ok(())
    }
}

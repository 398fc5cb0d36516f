use primitive_types::U256;
use serde::{Deserialize, Serialize};

use crate::{
    crypto::{Address, Hash},
    escrow::{DecisionOutcome, Token, TradeOutcome},
};

/// Events buffered during block application. Appended in deterministic
/// insertion order; failed transactions leave the buffer untouched. These
/// are the user-visible side channel of every successful transaction.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    Transfer {
        from: Address,
        to: Address,
        token: Token,
        amount: U256,
    },
    VoucherMinted {
        voucher_id: Hash,
        to: Address,
        token: Token,
        amount: U256,
    },
    IdentityRegistered {
        address: Address,
        username: String,
    },
    Heartbeat {
        address: Address,
        timestamp: u64,
    },
    EscrowCreated {
        id: Hash,
        payer: Address,
        payee: Address,
        token: Token,
        amount: U256,
        realm_id: Option<String>,
    },
    EscrowFunded {
        id: Hash,
    },
    EscrowReleased {
        id: Hash,
        payee_amount: U256,
        fee_amount: U256,
        realm_fee_amount: U256,
    },
    EscrowRefunded {
        id: Hash,
        payer_amount: U256,
        fee_amount: U256,
        realm_fee_amount: U256,
    },
    EscrowExpired {
        id: Hash,
    },
    EscrowDisputed {
        id: Hash,
        raised_by: Address,
    },
    EscrowResolved {
        id: Hash,
        outcome: DecisionOutcome,
        digest: Hash,
    },
    TradeCreated {
        id: Hash,
        buyer: Address,
        seller: Address,
    },
    TradePartialFunded {
        id: Hash,
        funded_leg: Hash,
    },
    TradeFunded {
        id: Hash,
    },
    TradeSettled {
        id: Hash,
    },
    TradeDisputed {
        id: Hash,
        raised_by: Address,
    },
    TradeResolved {
        id: Hash,
        outcome: TradeOutcome,
    },
    TradeExpired {
        id: Hash,
        refunded_leg: Option<Hash>,
    },
    TradeCancelled {
        id: Hash,
    },
    Delegated {
        delegator: Address,
        validator: Address,
        amount: U256,
    },
    Undelegated {
        delegator: Address,
        validator: Address,
        amount: U256,
        unbond_id: u64,
        release_time: u64,
    },
    UnbondClaimed {
        delegator: Address,
        unbond_id: u64,
        amount: U256,
    },
    SwapPayoutReceipt {
        receipt_id: Hash,
        recipient: Address,
        token: Token,
        amount: U256,
    },
    FeeApplied {
        domain: String,
        merchant: Address,
        gross: U256,
        fee: U256,
        net: U256,
        effective_bps: u32,
        usage_count: u64,
        window_start: u64,
        policy_version: u64,
    },
    QuotaExceeded {
        module: String,
        epoch: u64,
        requests: u64,
        value: U256,
    },
}

impl Event {
    /// Stable tag used for logging and metrics labels
    pub fn kind(&self) -> &'static str {
        match self {
            Event::Transfer { .. } => "transfer",
            Event::VoucherMinted { .. } => "voucher_minted",
            Event::IdentityRegistered { .. } => "identity_registered",
            Event::Heartbeat { .. } => "heartbeat",
            Event::EscrowCreated { .. } => "escrow_created",
            Event::EscrowFunded { .. } => "escrow_funded",
            Event::EscrowReleased { .. } => "escrow_released",
            Event::EscrowRefunded { .. } => "escrow_refunded",
            Event::EscrowExpired { .. } => "escrow_expired",
            Event::EscrowDisputed { .. } => "escrow_disputed",
            Event::EscrowResolved { .. } => "escrow_resolved",
            Event::TradeCreated { .. } => "trade_created",
            Event::TradePartialFunded { .. } => "trade_partial_funded",
            Event::TradeFunded { .. } => "trade_funded",
            Event::TradeSettled { .. } => "trade_settled",
            Event::TradeDisputed { .. } => "trade_disputed",
            Event::TradeResolved { .. } => "trade_resolved",
            Event::TradeExpired { .. } => "trade_expired",
            Event::TradeCancelled { .. } => "trade_cancelled",
            Event::Delegated { .. } => "delegated",
            Event::Undelegated { .. } => "undelegated",
            Event::UnbondClaimed { .. } => "unbond_claimed",
            Event::SwapPayoutReceipt { .. } => "swap_payout_receipt",
            Event::FeeApplied { .. } => "fee_applied",
            Event::QuotaExceeded { .. } => "quota_exceeded",
        }
    }
}

/// One-way event sink supplied by the state processor to the engines
pub trait Emitter {
    fn emit(&mut self, event: Event);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_json_shape() -> Result<(), Box<dyn std::error::Error>> {
        let event = Event::EscrowFunded {
            id: Hash::zero(),
        };
        let json = serde_json::to_value(&event)?;
        assert_eq!(json["type"], "escrow_funded");
        let decoded: Event = serde_json::from_value(json)?;
        assert_eq!(decoded, event);
        Ok(())
    }
}

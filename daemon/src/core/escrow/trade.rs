use log::{debug, info};
use metrics::counter;

use nhb_common::{
    config::MAX_FEE_BPS,
    crypto::{keccak256_concat, Address, Hash},
    escrow::{trade_id, EscrowStatus, Trade, TradeOutcome, TradeStatus},
    events::Event,
    transaction::{EscrowCreatePayload, TradeCreatePayload},
};

use super::EscrowEngine;
use crate::core::{error::ChainError, state::TradeState};

/// Two-leg trade orchestrator. The base leg moves seller → buyer, the
/// quote leg buyer → seller; both legs share the trade deadline and are
/// plain escrows custodied by the token vaults.
#[derive(Clone, Debug, Default)]
pub struct TradeEngine {
    /// Authority allowed to resolve disputed trades
    pub arbitrator: Option<Address>,
}

impl TradeEngine {
    pub fn new(arbitrator: Option<Address>) -> Self {
        TradeEngine { arbitrator }
    }

    fn require<S: TradeState>(state: &mut S, id: &Hash) -> Result<Trade, ChainError> {
        state
            .get_trade(id)?
            .ok_or_else(|| ChainError::TradeNotFound(id.clone()))
    }

    fn leg_holds_funds(status: EscrowStatus) -> bool {
        matches!(status, EscrowStatus::Funded | EscrowStatus::Disputed)
    }

    fn leg_funded<S: TradeState>(state: &mut S, id: &Hash) -> Result<bool, ChainError> {
        let escrow = state
            .get_escrow(id)?
            .ok_or_else(|| ChainError::EscrowNotFound(id.clone()))?;
        Ok(Self::leg_holds_funds(escrow.status))
    }

    pub fn create<S: TradeState>(
        &self,
        escrow_engine: &EscrowEngine,
        state: &mut S,
        buyer: Address,
        payload: &TradeCreatePayload,
    ) -> Result<Trade, ChainError> {
        if payload.base_amount.is_zero() || payload.quote_amount.is_zero() {
            return Err(ChainError::AmountNonPositive);
        }
        if payload.slippage_bps > MAX_FEE_BPS {
            return Err(ChainError::FeeBpsOutOfRange(payload.slippage_bps));
        }
        let now = state.now();
        if payload.deadline < now {
            return Err(ChainError::DeadlineBeforeNow {
                deadline: payload.deadline,
                now,
            });
        }
        if payload.seller.is_zero() || payload.seller == buyer {
            return Err(ChainError::InvalidPayload(
                "seller must be a distinct non-zero address".into(),
            ));
        }

        let id = trade_id(
            &payload.offer_id,
            &buyer,
            &payload.seller,
            payload.trade_nonce.as_bytes(),
        );
        if let Some(existing) = state.get_trade(&id)? {
            if existing.status == TradeStatus::Init
                && existing.base_amount == payload.base_amount
                && existing.quote_amount == payload.quote_amount
                && existing.deadline == payload.deadline
            {
                return Ok(existing);
            }
            return Err(ChainError::TradeExists(id));
        }

        // base leg: seller pays the buyer
        let base = escrow_engine.create(
            state,
            payload.seller,
            &EscrowCreatePayload {
                payee: buyer,
                token: payload.base_token,
                amount: payload.base_amount,
                fee_bps: 0,
                deadline: payload.deadline,
                nonce: 1,
                mediator: None,
                meta_hash: keccak256_concat(&[b"trade-base:", id.as_bytes()]),
                realm_id: None,
            },
        )?;
        // quote leg: buyer pays the seller
        let quote = escrow_engine.create(
            state,
            buyer,
            &EscrowCreatePayload {
                payee: payload.seller,
                token: payload.quote_token,
                amount: payload.quote_amount,
                fee_bps: 0,
                deadline: payload.deadline,
                nonce: 1,
                mediator: None,
                meta_hash: keccak256_concat(&[b"trade-quote:", id.as_bytes()]),
                realm_id: None,
            },
        )?;

        let trade = Trade {
            id: id.clone(),
            offer_id: payload.offer_id.clone(),
            buyer,
            seller: payload.seller,
            quote_token: payload.quote_token,
            base_token: payload.base_token,
            quote_amount: payload.quote_amount,
            base_amount: payload.base_amount,
            escrow_quote: quote.id.clone(),
            escrow_base: base.id.clone(),
            deadline: payload.deadline,
            created_at: now,
            slippage_bps: payload.slippage_bps,
            status: TradeStatus::Init,
        };
        state.link_escrow(&base.id, &id)?;
        state.link_escrow(&quote.id, &id)?;
        state.set_trade(&trade)?;
        counter!("nhb_trade_created_total").increment(1);
        state.emit(Event::TradeCreated {
            id,
            buyer,
            seller: payload.seller,
        });
        Ok(trade)
    }

    /// Called after an escrow funding lands; derives the trade status
    /// from its legs when the escrow is one.
    pub fn on_escrow_funded<S: TradeState>(
        &self,
        state: &mut S,
        escrow_id: &Hash,
    ) -> Result<Option<Trade>, ChainError> {
        let Some(trade_ref) = state.trade_for_escrow(escrow_id)? else {
            return Ok(None);
        };
        let mut trade = Self::require(state, &trade_ref)?;
        if trade.status.is_terminal() || trade.status == TradeStatus::Disputed {
            return Ok(Some(trade));
        }

        let base_funded = Self::leg_funded(state, &trade.escrow_base)?;
        let quote_funded = Self::leg_funded(state, &trade.escrow_quote)?;
        let derived = match (base_funded, quote_funded) {
            (true, true) => TradeStatus::Funded,
            (false, false) => TradeStatus::Init,
            _ => TradeStatus::PartialFunded,
        };
        if derived != trade.status {
            trade.status = derived;
            state.set_trade(&trade)?;
            match derived {
                TradeStatus::Funded => state.emit(Event::TradeFunded {
                    id: trade.id.clone(),
                }),
                TradeStatus::PartialFunded => state.emit(Event::TradePartialFunded {
                    id: trade.id.clone(),
                    funded_leg: escrow_id.clone(),
                }),
                _ => {}
            }
        }
        Ok(Some(trade))
    }

    pub fn dispute<S: TradeState>(
        &self,
        escrow_engine: &EscrowEngine,
        state: &mut S,
        caller: &Address,
        id: &Hash,
    ) -> Result<Trade, ChainError> {
        let mut trade = Self::require(state, id)?;
        match trade.status {
            TradeStatus::Disputed => return Ok(trade),
            TradeStatus::Funded | TradeStatus::PartialFunded => {}
            status => {
                return Err(ChainError::InvalidTradeTransition {
                    status,
                    event: "dispute",
                })
            }
        }
        if *caller != trade.buyer && *caller != trade.seller {
            return Err(ChainError::Unauthorized);
        }

        escrow_engine.mark_leg_disputed(state, &trade.escrow_base, *caller)?;
        escrow_engine.mark_leg_disputed(state, &trade.escrow_quote, *caller)?;

        trade.status = TradeStatus::Disputed;
        state.set_trade(&trade)?;
        counter!("nhb_trade_disputed_total").increment(1);
        state.emit(Event::TradeDisputed {
            id: id.clone(),
            raised_by: *caller,
        });
        Ok(trade)
    }

    /// Arbitrated outcome over the pair; settlement is all-or-nothing,
    /// any leg failure aborts the whole transition.
    pub fn resolve<S: TradeState>(
        &self,
        escrow_engine: &EscrowEngine,
        state: &mut S,
        caller: &Address,
        id: &Hash,
        outcome: TradeOutcome,
    ) -> Result<Trade, ChainError> {
        let mut trade = Self::require(state, id)?;
        if trade.status == TradeStatus::Settled {
            return Ok(trade);
        }
        if trade.status != TradeStatus::Disputed {
            return Err(ChainError::InvalidTradeTransition {
                status: trade.status,
                event: "resolve",
            });
        }
        let arbitrator = self.arbitrator.ok_or(ChainError::MediatorMissing)?;
        if *caller != arbitrator {
            return Err(ChainError::Unauthorized);
        }

        let (release_base, release_quote) = match outcome {
            TradeOutcome::ReleaseBoth => (true, true),
            TradeOutcome::RefundBoth => (false, false),
            TradeOutcome::ReleaseBaseRefundQuote => (true, false),
            TradeOutcome::ReleaseQuoteRefundBase => (false, true),
        };
        self.close_leg(escrow_engine, state, &trade.escrow_base, release_base)?;
        self.close_leg(escrow_engine, state, &trade.escrow_quote, release_quote)?;

        trade.status = TradeStatus::Settled;
        state.set_trade(&trade)?;
        counter!("nhb_trade_resolved_total").increment(1);
        info!("trade {} resolved as {:?}", trade.id, outcome);
        state.emit(Event::TradeResolved {
            id: id.clone(),
            outcome,
        });
        state.emit(Event::TradeSettled { id: id.clone() });
        Ok(trade)
    }

    // settle one leg of an arbitrated outcome; unfunded legs have
    // nothing to move
    fn close_leg<S: TradeState>(
        &self,
        escrow_engine: &EscrowEngine,
        state: &mut S,
        leg: &Hash,
        release: bool,
    ) -> Result<(), ChainError> {
        let escrow = state
            .get_escrow(leg)?
            .ok_or_else(|| ChainError::EscrowNotFound(leg.clone()))?;
        if !Self::leg_holds_funds(escrow.status) {
            debug!("trade leg {} holds no funds, skipping", leg);
            return Ok(());
        }
        if release {
            escrow_engine.release_leg(state, leg)?;
        } else {
            escrow_engine.refund_leg(state, leg)?;
        }
        Ok(())
    }

    /// Settle a fully funded trade: base leg first, then quote
    pub fn settle_atomic<S: TradeState>(
        &self,
        escrow_engine: &EscrowEngine,
        state: &mut S,
        caller: &Address,
        id: &Hash,
    ) -> Result<Trade, ChainError> {
        let mut trade = Self::require(state, id)?;
        if trade.status == TradeStatus::Settled {
            return Ok(trade);
        }
        if trade.status != TradeStatus::Funded {
            return Err(ChainError::InvalidTradeTransition {
                status: trade.status,
                event: "settle",
            });
        }
        if *caller != trade.buyer && *caller != trade.seller {
            return Err(ChainError::Unauthorized);
        }

        escrow_engine.release_leg(state, &trade.escrow_base)?;
        escrow_engine.release_leg(state, &trade.escrow_quote)?;

        trade.status = TradeStatus::Settled;
        state.set_trade(&trade)?;
        counter!("nhb_trade_settled_total").increment(1);
        state.emit(Event::TradeSettled { id: id.clone() });
        Ok(trade)
    }

    /// Deadline handling: a fully funded trade must be resolved, a
    /// half-funded trade refunds its funded leg and expires, an unfunded
    /// trade is cancelled.
    pub fn try_expire<S: TradeState>(
        &self,
        escrow_engine: &EscrowEngine,
        state: &mut S,
        id: &Hash,
    ) -> Result<Trade, ChainError> {
        let mut trade = Self::require(state, id)?;
        if trade.status.is_terminal() {
            return Ok(trade);
        }
        if state.now() < trade.deadline {
            return Err(ChainError::DeadlineNotReached);
        }

        let base_funded = Self::leg_funded(state, &trade.escrow_base)?;
        let quote_funded = Self::leg_funded(state, &trade.escrow_quote)?;
        match (base_funded, quote_funded) {
            (true, true) => Err(ChainError::TradeRequiresResolution(id.clone())),
            (false, false) => {
                trade.status = TradeStatus::Cancelled;
                state.set_trade(&trade)?;
                counter!("nhb_trade_cancelled_total").increment(1);
                state.emit(Event::TradeCancelled { id: id.clone() });
                Ok(trade)
            }
            (base, _) => {
                let funded_leg = if base {
                    trade.escrow_base.clone()
                } else {
                    trade.escrow_quote.clone()
                };
                escrow_engine.refund_leg(state, &funded_leg)?;
                trade.status = TradeStatus::Expired;
                state.set_trade(&trade)?;
                counter!("nhb_trade_expired_total").increment(1);
                state.emit(Event::TradeExpired {
                    id: id.clone(),
                    refunded_leg: Some(funded_leg),
                });
                Ok(trade)
            }
        }
    }
}

use std::sync::Arc;

use log::{debug, warn};
use metrics::counter;
use primitive_types::U256;

use nhb_common::{
    config::{DEFAULT_INTENT_TTL_SECS, NHB_CHAIN_ID},
    crypto::{keccak256_concat, Address, Hash},
    escrow::Token,
    events::{Emitter, Event},
    transaction::{
        EscrowPayload, HeartbeatPayload, MintPayload, RegisterIdentityPayload, StakePayload,
        SwapPayoutPayload, TradePayload, Transaction, TransactionPayload, TransferPayload,
        UnstakePayload,
    },
};

use super::{
    fees, intents, quotas, AccountState, BlockEnv, EscrowProvider, EpochEvent, FeeConfig,
    QuotaConfig, RealmProvider, RewardEvent, StateManager, TradeProvider,
};
use crate::{
    config::{DEFAULT_UNBONDING_PERIOD_SECS, NATIVE_GAS_PER_TX},
    core::{
        error::ChainError,
        escrow::{EscrowEngine, TradeEngine},
        evm::{BlockContext, EvmAdapter, EvmMessage},
    },
};

/// Heartbeats may drift from the block timestamp by at most this much
const HEARTBEAT_MAX_DRIFT_SECS: u64 = 300;

/// Everything injected into the state processor at construction. No
/// process-wide singletons: fee policies, quotas and engine wiring all
/// arrive through this struct.
#[derive(Clone, Debug)]
pub struct ProcessorConfig {
    pub allowed_chain_ids: Vec<u64>,
    pub intent_ttl: u64,
    pub epoch_rotation: bool,
    pub unbonding_period: u64,
    pub treasury: Option<Address>,
    pub trade_arbitrator: Option<Address>,
    /// Authority allowed to mint vouchers
    pub minter: Option<Address>,
    /// Authority allowed to post swap payout receipts
    pub swap_authority: Option<Address>,
    pub fees: FeeConfig,
    pub quotas: QuotaConfig,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        ProcessorConfig {
            allowed_chain_ids: vec![NHB_CHAIN_ID],
            intent_ttl: DEFAULT_INTENT_TTL_SECS,
            epoch_rotation: false,
            unbonding_period: DEFAULT_UNBONDING_PERIOD_SECS,
            treasury: None,
            trade_arbitrator: None,
            minter: None,
            swap_authority: None,
            fees: FeeConfig::default(),
            quotas: QuotaConfig::default(),
        }
    }
}

/// Receipt of a successfully executed transaction
#[derive(Clone, Debug)]
pub struct ExecutionOutcome {
    pub events: Vec<Event>,
    pub gas_used: u64,
    pub gas_cost: U256,
}

#[derive(Clone, Copy, Debug)]
struct BlockInfo {
    height: u64,
    timestamp: u64,
}

// Engine-facing view over the processor's state, event buffer and block
// environment. Engines stay decoupled from the processor through the
// provider traits.
struct ExecutionContext<'a> {
    state: &'a mut StateManager,
    events: &'a mut Vec<Event>,
    block: BlockInfo,
}

impl AccountState for ExecutionContext<'_> {
    fn get_account(
        &mut self,
        address: &Address,
    ) -> Result<nhb_common::account::Account, ChainError> {
        self.state.get_account(address)
    }

    fn set_account(
        &mut self,
        address: &Address,
        account: &nhb_common::account::Account,
    ) -> Result<(), ChainError> {
        self.state.set_account(address, account)
    }

    fn get_meta(
        &mut self,
        address: &Address,
    ) -> Result<nhb_common::account::AccountMeta, ChainError> {
        self.state.get_meta(address)
    }

    fn set_meta(
        &mut self,
        address: &Address,
        meta: &nhb_common::account::AccountMeta,
    ) -> Result<(), ChainError> {
        self.state.set_meta(address, meta)
    }
}

impl EscrowProvider for ExecutionContext<'_> {
    fn get_escrow(&mut self, id: &Hash) -> Result<Option<nhb_common::escrow::Escrow>, ChainError> {
        self.state.get_escrow(id)
    }

    fn set_escrow(&mut self, escrow: &nhb_common::escrow::Escrow) -> Result<(), ChainError> {
        self.state.set_escrow(escrow)
    }
}

impl RealmProvider for ExecutionContext<'_> {
    fn get_realm(&mut self, id: &str) -> Result<Option<nhb_common::escrow::Realm>, ChainError> {
        self.state.get_realm(id)
    }

    fn set_realm(&mut self, realm: &nhb_common::escrow::Realm) -> Result<(), ChainError> {
        self.state.set_realm(realm)
    }
}

impl TradeProvider for ExecutionContext<'_> {
    fn get_trade(&mut self, id: &Hash) -> Result<Option<nhb_common::escrow::Trade>, ChainError> {
        self.state.get_trade(id)
    }

    fn set_trade(&mut self, trade: &nhb_common::escrow::Trade) -> Result<(), ChainError> {
        self.state.set_trade(trade)
    }

    fn trade_for_escrow(&mut self, escrow_id: &Hash) -> Result<Option<Hash>, ChainError> {
        self.state.trade_for_escrow(escrow_id)
    }

    fn link_escrow(&mut self, escrow_id: &Hash, trade_id: &Hash) -> Result<(), ChainError> {
        self.state.link_escrow(escrow_id, trade_id)
    }
}

impl BlockEnv for ExecutionContext<'_> {
    fn height(&self) -> u64 {
        self.block.height
    }

    fn now(&self) -> i64 {
        self.block.timestamp as i64
    }
}

impl Emitter for ExecutionContext<'_> {
    fn emit(&mut self, event: Event) {
        self.events.push(event);
    }
}

/// Deterministic transaction applier. Single-threaded per block:
/// `begin_block → execute* → end_block → commit(height)`. Handlers never
/// block on external I/O; the EVM adapter is the only dispatched
/// execution engine.
pub struct StateProcessor {
    state: StateManager,
    config: ProcessorConfig,
    evm: Arc<dyn EvmAdapter>,
    escrow_engine: EscrowEngine,
    trade_engine: TradeEngine,
    events: Vec<Event>,
    block: Option<BlockInfo>,
    // breach event staged while the failing transaction unwinds
    pending_quota_event: Option<Event>,
}

impl StateProcessor {
    pub fn new(state: StateManager, config: ProcessorConfig, evm: Arc<dyn EvmAdapter>) -> Self {
        let escrow_engine = EscrowEngine::new(config.treasury);
        let trade_engine = TradeEngine::new(config.trade_arbitrator);
        StateProcessor {
            state,
            config,
            evm,
            escrow_engine,
            trade_engine,
            events: Vec::new(),
            block: None,
            pending_quota_event: None,
        }
    }

    pub fn state(&self) -> &StateManager {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut StateManager {
        &mut self.state
    }

    pub fn begin_block(&mut self, height: u64, timestamp: u64) {
        self.block = Some(BlockInfo { height, timestamp });
        self.events.clear();
    }

    /// Drain the block's event log; the caller persists it alongside the
    /// block
    pub fn end_block(&mut self) -> Vec<Event> {
        self.block = None;
        std::mem::take(&mut self.events)
    }

    pub fn commit(&mut self, height: u64) -> Result<Hash, ChainError> {
        self.state.commit(height)
    }

    /// Apply one transaction. On failure the event buffer is truncated
    /// to its pre-execution length and no state write survives; the
    /// intent reservation (if any) is not consumed.
    pub fn execute(&mut self, tx: &Transaction) -> Result<ExecutionOutcome, ChainError> {
        let block = self
            .block
            .ok_or_else(|| ChainError::InvalidPayload("no open block".into()))?;

        // 1. chain id
        if !self.config.allowed_chain_ids.contains(&tx.chain_id) {
            return Err(ChainError::InvalidChainId(tx.chain_id));
        }

        // 2. intent reservation (consumed only on success)
        let reservation = match &tx.intent_ref {
            Some(reference) => Some(intents::reserve(
                &mut self.state,
                reference,
                tx.intent_expiry,
                self.config.intent_ttl,
                block.timestamp,
            )?),
            None => None,
        };

        // 3. sender recovery and strict nonce
        let sender = tx.recover_sender()?;
        let account = self.state.get_account(&sender)?;
        if tx.nonce != account.nonce {
            return Err(ChainError::NonceMismatch {
                expected: account.nonce,
                got: tx.nonce,
            });
        }

        // 4. dispatch inside a journalled scope
        let events_before = self.events.len();
        self.state.begin_tx();
        let executed = self
            .dispatch(&sender, tx, block)
            .and_then(|gas_used| {
                let mut account = self.state.get_account(&sender)?;
                account.nonce += 1;
                self.state.set_account(&sender, &account)?;
                Ok(gas_used)
            })
            .and_then(|gas_used| {
                self.apply_quota(tx, block)?;
                Ok(gas_used)
            })
            .and_then(|gas_used| {
                self.apply_merchant_fee(&sender, tx, block)?;
                Ok(gas_used)
            });

        let gas_used = match executed {
            Ok(gas_used) => gas_used,
            Err(err) => {
                self.events.truncate(events_before);
                if let Err(rollback_err) = self.state.rollback_tx() {
                    // staged state is suspect, fall back to the committed root
                    warn!("rollback failed ({}), resetting to committed root", rollback_err);
                    self.state.reset_to_committed()?;
                }
                if let ChainError::QuotaExceeded { .. } = &err {
                    // the breach itself is recorded in the block event log
                    if let Some(event) = self.pending_quota_event.take() {
                        self.events.push(event);
                    }
                }
                counter!("nhb_tx_failed_total").increment(1);
                return Err(err);
            }
        };

        // 6. consume intent, seal the journal
        if let Some(reservation) = &reservation {
            intents::consume(&mut self.state, reservation, block.height)?;
        }
        self.state.commit_tx();

        counter!("nhb_tx_applied_total").increment(1);
        let events = self.events[events_before..].to_vec();
        let gas_cost = tx
            .gas_price
            .checked_mul(U256::from(gas_used))
            .ok_or(ChainError::BalanceOverflow)?;
        Ok(ExecutionOutcome {
            events,
            gas_used,
            gas_cost,
        })
    }

    fn context<'a>(
        state: &'a mut StateManager,
        events: &'a mut Vec<Event>,
        block: BlockInfo,
    ) -> ExecutionContext<'a> {
        ExecutionContext {
            state,
            events,
            block,
        }
    }

    fn dispatch(
        &mut self,
        sender: &Address,
        tx: &Transaction,
        block: BlockInfo,
    ) -> Result<u64, ChainError> {
        match &tx.payload {
            TransactionPayload::Mint(payload) => self.handle_mint(sender, payload, block),
            TransactionPayload::Transfer(payload) => {
                self.handle_transfer(sender, tx, payload, block)
            }
            TransactionPayload::RegisterIdentity(payload) => {
                self.handle_register_identity(sender, payload)
            }
            TransactionPayload::Escrow(payload) => self.handle_escrow(sender, payload, block),
            TransactionPayload::Trade(payload) => self.handle_trade(sender, payload, block),
            TransactionPayload::Stake(payload) => self.handle_stake(sender, payload, block),
            TransactionPayload::Unstake(payload) => self.handle_unstake(sender, payload, block),
            TransactionPayload::ClaimUnbond(payload) => {
                self.handle_claim_unbond(sender, payload.unbond_id, block)
            }
            TransactionPayload::Heartbeat(payload) => self.handle_heartbeat(sender, payload, block),
            TransactionPayload::SwapPayout(payload) => self.handle_swap_payout(sender, payload, block),
        }
    }

    fn handle_mint(
        &mut self,
        sender: &Address,
        payload: &MintPayload,
        block: BlockInfo,
    ) -> Result<u64, ChainError> {
        if self.config.minter != Some(*sender) {
            return Err(ChainError::Unauthorized);
        }
        if payload.amount.is_zero() {
            return Err(ChainError::AmountNonPositive);
        }
        let voucher_key = keccak256_concat(&[b"voucher:", payload.voucher_id.as_bytes()]);
        if self.state.raw_get(&voucher_key)?.is_some() {
            return Err(ChainError::InvalidPayload("voucher already minted".into()));
        }
        self.state.raw_put(&voucher_key, block.height.to_be_bytes().to_vec())?;

        self.state.credit(&payload.to, payload.token, payload.amount)?;
        if payload.token == Token::Znhb {
            self.state.append_reward_event(RewardEvent {
                height: block.height,
                address: payload.to,
                token: payload.token,
                amount: payload.amount,
            })?;
        }
        self.events.push(Event::VoucherMinted {
            voucher_id: payload.voucher_id.clone(),
            to: payload.to,
            token: payload.token,
            amount: payload.amount,
        });
        Ok(NATIVE_GAS_PER_TX)
    }

    fn handle_transfer(
        &mut self,
        sender: &Address,
        tx: &Transaction,
        payload: &TransferPayload,
        block: BlockInfo,
    ) -> Result<u64, ChainError> {
        let ctx = BlockContext {
            height: block.height,
            timestamp: block.timestamp,
            state_root: self.state.root(),
        };
        let msg = EvmMessage {
            from: *sender,
            to: payload.to,
            value: payload.value,
            data: payload.data.clone(),
            gas_limit: tx.gas_limit,
            gas_price: tx.gas_price,
        };
        let outcome = self.evm.apply(&ctx, &msg, &mut self.state)?;
        if let Some(reason) = outcome.error {
            return Err(ChainError::EvmReverted(reason));
        }
        self.events.push(Event::Transfer {
            from: *sender,
            to: payload.to,
            token: Token::Nhb,
            amount: payload.value,
        });
        Ok(outcome.used_gas)
    }

    fn handle_register_identity(
        &mut self,
        sender: &Address,
        payload: &RegisterIdentityPayload,
    ) -> Result<u64, ChainError> {
        let username = payload.username.as_str();
        let valid_len = (3..=32).contains(&username.len());
        let valid_chars = username
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_');
        if !valid_len || !valid_chars {
            return Err(ChainError::InvalidPayload(format!(
                "invalid username {:?}",
                username
            )));
        }
        self.state.set_username(sender, Some(username))?;
        self.events.push(Event::IdentityRegistered {
            address: *sender,
            username: username.to_string(),
        });
        Ok(NATIVE_GAS_PER_TX)
    }

    fn handle_escrow(
        &mut self,
        sender: &Address,
        payload: &EscrowPayload,
        block: BlockInfo,
    ) -> Result<u64, ChainError> {
        let escrow_engine = self.escrow_engine.clone();
        let trade_engine = self.trade_engine.clone();
        let mut ctx = Self::context(&mut self.state, &mut self.events, block);
        match payload {
            EscrowPayload::Create(create) => {
                escrow_engine.create(&mut ctx, *sender, create)?;
            }
            EscrowPayload::Lock { id } => {
                escrow_engine.fund(&mut ctx, sender, id)?;
                // the leg may belong to a trade
                trade_engine.on_escrow_funded(&mut ctx, id)?;
            }
            EscrowPayload::Release { id } => {
                escrow_engine.release(&mut ctx, sender, id)?;
            }
            EscrowPayload::Refund { id } => {
                escrow_engine.refund(&mut ctx, sender, id)?;
            }
            EscrowPayload::Dispute { id } => {
                escrow_engine.dispute(&mut ctx, sender, id)?;
            }
            EscrowPayload::Arbitrate(arbitrate) => {
                escrow_engine.resolve_with_signatures(
                    &mut ctx,
                    &arbitrate.decision,
                    &arbitrate.signatures,
                )?;
            }
            EscrowPayload::Expire { id } => {
                escrow_engine.expire(&mut ctx, id)?;
            }
        }
        Ok(NATIVE_GAS_PER_TX)
    }

    fn handle_trade(
        &mut self,
        sender: &Address,
        payload: &TradePayload,
        block: BlockInfo,
    ) -> Result<u64, ChainError> {
        let escrow_engine = self.escrow_engine.clone();
        let trade_engine = self.trade_engine.clone();
        let mut ctx = Self::context(&mut self.state, &mut self.events, block);
        match payload {
            TradePayload::Create(create) => {
                trade_engine.create(&escrow_engine, &mut ctx, *sender, create)?;
            }
            TradePayload::Settle { id } => {
                trade_engine.settle_atomic(&escrow_engine, &mut ctx, sender, id)?;
            }
            TradePayload::Dispute { id } => {
                trade_engine.dispute(&escrow_engine, &mut ctx, sender, id)?;
            }
            TradePayload::Resolve { id, outcome } => {
                trade_engine.resolve(&escrow_engine, &mut ctx, sender, id, *outcome)?;
            }
            TradePayload::Expire { id } => {
                trade_engine.try_expire(&escrow_engine, &mut ctx, id)?;
            }
        }
        Ok(NATIVE_GAS_PER_TX)
    }

    fn handle_stake(
        &mut self,
        sender: &Address,
        payload: &StakePayload,
        block: BlockInfo,
    ) -> Result<u64, ChainError> {
        if payload.amount.is_zero() {
            return Err(ChainError::AmountNonPositive);
        }
        let power = stake_power(payload.amount)?;

        let meta = self.state.get_meta(sender)?;
        if let Some(existing) = meta.delegated_validator {
            if existing != payload.validator && !meta.stake.is_zero() {
                return Err(ChainError::InvalidPayload(
                    "stake is already delegated to another validator".into(),
                ));
            }
        }
        // stake moves out of the spendable secondary balance
        self.state.debit(sender, Token::Znhb, payload.amount)?;
        let mut meta = self.state.get_meta(sender)?;
        meta.stake = meta
            .stake
            .checked_add(payload.amount)
            .ok_or(ChainError::BalanceOverflow)?;
        meta.delegated_validator = Some(payload.validator);
        self.state.set_meta(sender, &meta)?;

        let active_changed = self.state.apply_validator_stake_delta(
            &payload.validator,
            power as i128,
            self.config.epoch_rotation,
        )?;
        if active_changed {
            self.record_epoch_event(block)?;
        }
        self.events.push(Event::Delegated {
            delegator: *sender,
            validator: payload.validator,
            amount: payload.amount,
        });
        Ok(NATIVE_GAS_PER_TX)
    }

    fn handle_unstake(
        &mut self,
        sender: &Address,
        payload: &UnstakePayload,
        block: BlockInfo,
    ) -> Result<u64, ChainError> {
        if payload.amount.is_zero() {
            return Err(ChainError::AmountNonPositive);
        }
        let power = stake_power(payload.amount)?;

        let mut meta = self.state.get_meta(sender)?;
        if meta.delegated_validator != Some(payload.validator) {
            return Err(ChainError::InvalidPayload(
                "no delegation to this validator".into(),
            ));
        }
        if meta.stake < payload.amount {
            return Err(ChainError::InsufficientBalance {
                needed: payload.amount.to_string(),
                available: meta.stake.to_string(),
            });
        }
        meta.stake -= payload.amount;
        if meta.stake.is_zero() {
            meta.delegated_validator = None;
        }
        let release_time = block.timestamp + self.config.unbonding_period;
        let unbond_id = meta.add_unbond(payload.validator, payload.amount, release_time);
        self.state.set_meta(sender, &meta)?;

        let active_changed = self.state.apply_validator_stake_delta(
            &payload.validator,
            -(power as i128),
            self.config.epoch_rotation,
        )?;
        if active_changed {
            self.record_epoch_event(block)?;
        }
        self.events.push(Event::Undelegated {
            delegator: *sender,
            validator: payload.validator,
            amount: payload.amount,
            unbond_id,
            release_time,
        });
        Ok(NATIVE_GAS_PER_TX)
    }

    fn handle_claim_unbond(
        &mut self,
        sender: &Address,
        unbond_id: u64,
        block: BlockInfo,
    ) -> Result<u64, ChainError> {
        let mut meta = self.state.get_meta(sender)?;
        let amount = meta.claim_unbond(unbond_id, block.timestamp)?;
        self.state.set_meta(sender, &meta)?;
        self.events.push(Event::UnbondClaimed {
            delegator: *sender,
            unbond_id,
            amount,
        });
        Ok(NATIVE_GAS_PER_TX)
    }

    fn handle_heartbeat(
        &mut self,
        sender: &Address,
        payload: &HeartbeatPayload,
        block: BlockInfo,
    ) -> Result<u64, ChainError> {
        let drift = block.timestamp.abs_diff(payload.timestamp);
        if drift > HEARTBEAT_MAX_DRIFT_SECS {
            return Err(ChainError::InvalidPayload(format!(
                "heartbeat timestamp drifts {}s from block time",
                drift
            )));
        }
        let mut meta = self.state.get_meta(sender)?;
        meta.engagement.record_heartbeat(payload.timestamp);
        self.state.set_meta(sender, &meta)?;
        self.events.push(Event::Heartbeat {
            address: *sender,
            timestamp: payload.timestamp,
        });
        Ok(NATIVE_GAS_PER_TX)
    }

    fn handle_swap_payout(
        &mut self,
        sender: &Address,
        payload: &SwapPayoutPayload,
        block: BlockInfo,
    ) -> Result<u64, ChainError> {
        if self.config.swap_authority != Some(*sender) {
            return Err(ChainError::Unauthorized);
        }
        if payload.amount.is_zero() {
            return Err(ChainError::AmountNonPositive);
        }
        let receipt_key = keccak256_concat(&[b"swap-receipt:", payload.receipt_id.as_bytes()]);
        if self.state.raw_get(&receipt_key)?.is_some() {
            return Err(ChainError::InvalidPayload("receipt already processed".into()));
        }
        self.state
            .raw_put(&receipt_key, block.height.to_be_bytes().to_vec())?;
        self.state
            .credit(&payload.recipient, payload.token, payload.amount)?;
        self.events.push(Event::SwapPayoutReceipt {
            receipt_id: payload.receipt_id.clone(),
            recipient: payload.recipient,
            token: payload.token,
            amount: payload.amount,
        });
        Ok(NATIVE_GAS_PER_TX)
    }

    fn record_epoch_event(&mut self, block: BlockInfo) -> Result<(), ChainError> {
        let validators = self.state.validator_set()?.keys().copied().collect();
        self.state.append_epoch_event(EpochEvent {
            height: block.height,
            timestamp: block.timestamp,
            validators,
        })
    }

    fn apply_quota(&mut self, tx: &Transaction, block: BlockInfo) -> Result<(), ChainError> {
        let module = tx.payload.module();
        let value = quota_value(&tx.payload);
        match quotas::charge(
            &mut self.state,
            &self.config.quotas,
            module,
            value,
            block.timestamp,
        )? {
            Ok(()) => Ok(()),
            Err(breach) => {
                debug!("quota breach in module {}", breach.module);
                self.pending_quota_event = Some(Event::QuotaExceeded {
                    module: breach.module.clone(),
                    epoch: breach.epoch,
                    requests: breach.requests,
                    value: breach.value,
                });
                Err(ChainError::QuotaExceeded {
                    module: breach.module,
                })
            }
        }
    }

    fn apply_merchant_fee(
        &mut self,
        sender: &Address,
        tx: &Transaction,
        block: BlockInfo,
    ) -> Result<(), ChainError> {
        let (Some(merchant), TransactionPayload::Transfer(payload)) =
            (&tx.merchant, &tx.payload)
        else {
            return Ok(());
        };
        let Some(assessment) = fees::assess(
            &mut self.state,
            merchant,
            &self.config.fees,
            payload.value,
            block.timestamp,
        )?
        else {
            return Ok(());
        };

        if !assessment.fee.is_zero() {
            let policy = self
                .config
                .fees
                .domains
                .get(&assessment.domain)
                .ok_or_else(|| {
                    ChainError::InvalidPayload(format!(
                        "fee domain {} is not configured",
                        assessment.domain
                    ))
                })?;
            // the fee comes out of the payee when possible, else the payer
            let payee_balance = self.state.balance(&payload.to, Token::Nhb)?;
            let fee_source = if payee_balance >= assessment.fee {
                payload.to
            } else {
                *sender
            };
            self.state.debit(&fee_source, Token::Nhb, assessment.fee)?;
            self.state
                .credit(&policy.owner_wallet, Token::Nhb, assessment.fee)?;
        }

        self.events.push(Event::FeeApplied {
            domain: assessment.domain,
            merchant: *merchant,
            gross: payload.value,
            fee: assessment.fee,
            net: assessment.net,
            effective_bps: assessment.effective_bps,
            usage_count: assessment.usage_count,
            window_start: assessment.window_start,
            policy_version: assessment.policy_version,
        });
        Ok(())
    }
}

// Value a payload moves, for quota accounting
fn quota_value(payload: &TransactionPayload) -> U256 {
    match payload {
        TransactionPayload::Mint(p) => p.amount,
        TransactionPayload::Transfer(p) => p.value,
        TransactionPayload::Escrow(EscrowPayload::Create(p)) => p.amount,
        TransactionPayload::Trade(TradePayload::Create(p)) => {
            p.base_amount.saturating_add(p.quote_amount)
        }
        TransactionPayload::Stake(p) => p.amount,
        TransactionPayload::Unstake(p) => p.amount,
        TransactionPayload::SwapPayout(p) => p.amount,
        _ => U256::zero(),
    }
}

// Validator power is tracked in whole units of stake
fn stake_power(amount: U256) -> Result<u64, ChainError> {
    if amount > U256::from(u64::MAX) {
        return Err(ChainError::InvalidPayload(
            "stake amount exceeds the representable power range".into(),
        ));
    }
    Ok(amount.as_u64())
}

use std::collections::HashSet;

use log::{debug, info};
use metrics::counter;
use primitive_types::U256;

use nhb_common::{
    config::MAX_FEE_BPS,
    crypto::{Address, Hash, Signature},
    escrow::{escrow_id, DecisionOutcome, DecisionPayload, Escrow, EscrowStatus, FrozenPolicy},
    events::Event,
    transaction::EscrowCreatePayload,
};

use crate::core::{
    error::ChainError,
    state::{fees::fee_for, vault_address, EscrowState},
    validator::QuorumError,
};

/// Single-escrow lifecycle state machine. Holds funded value in the
/// per-token vault account; every transition is idempotent once the
/// record already matches the intent.
#[derive(Clone, Debug, Default)]
pub struct EscrowEngine {
    pub treasury: Option<Address>,
}

impl EscrowEngine {
    pub fn new(treasury: Option<Address>) -> Self {
        EscrowEngine { treasury }
    }

    fn require<S: EscrowState>(state: &mut S, id: &Hash) -> Result<Escrow, ChainError> {
        state
            .get_escrow(id)?
            .ok_or_else(|| ChainError::EscrowNotFound(id.clone()))
    }

    pub fn create<S: EscrowState>(
        &self,
        state: &mut S,
        payer: Address,
        payload: &EscrowCreatePayload,
    ) -> Result<Escrow, ChainError> {
        if payload.amount.is_zero() {
            return Err(ChainError::AmountNonPositive);
        }
        if payload.fee_bps > MAX_FEE_BPS {
            return Err(ChainError::FeeBpsOutOfRange(payload.fee_bps));
        }
        let now = state.now();
        if payload.deadline < now {
            return Err(ChainError::DeadlineBeforeNow {
                deadline: payload.deadline,
                now,
            });
        }
        if payload.nonce == 0 {
            return Err(ChainError::InvalidPayload("escrow nonce must be positive".into()));
        }
        if payload.payee.is_zero() {
            return Err(ChainError::InvalidPayload("payee is the zero address".into()));
        }

        let id = escrow_id(&payer, &payload.payee, &payload.meta_hash, payload.nonce);
        if let Some(existing) = state.get_escrow(&id)? {
            // replaying the exact create is a no-op
            if existing.status == EscrowStatus::Init
                && existing.token == payload.token
                && existing.amount == payload.amount
                && existing.fee_bps == payload.fee_bps
                && existing.deadline == payload.deadline
                && existing.mediator == payload.mediator
                && existing.realm_id == payload.realm_id
            {
                return Ok(existing);
            }
            return Err(ChainError::EscrowExists(id));
        }

        let frozen = match &payload.realm_id {
            Some(realm_id) => {
                let mut realm = state
                    .get_realm(realm_id)?
                    .ok_or_else(|| ChainError::RealmNotFound(realm_id.clone()))?;
                realm.validate()?;
                let policy = realm.freeze();
                realm.updated_at = now;
                state.set_realm(&realm)?;
                Some(policy)
            }
            None => None,
        };

        let escrow = Escrow {
            id: id.clone(),
            payer,
            payee: payload.payee,
            mediator: payload.mediator,
            token: payload.token,
            amount: payload.amount,
            fee_bps: payload.fee_bps,
            deadline: payload.deadline,
            created_at: now,
            updated_at: now,
            nonce: payload.nonce,
            meta_hash: payload.meta_hash.clone(),
            status: EscrowStatus::Init,
            realm_id: payload.realm_id.clone(),
            frozen_arb: frozen,
            resolution_hash: Hash::zero(),
        };
        state.set_escrow(&escrow)?;
        counter!("nhb_escrow_created_total").increment(1);
        state.emit(Event::EscrowCreated {
            id,
            payer: escrow.payer,
            payee: escrow.payee,
            token: escrow.token,
            amount: escrow.amount,
            realm_id: escrow.realm_id.clone(),
        });
        Ok(escrow)
    }

    pub fn fund<S: EscrowState>(
        &self,
        state: &mut S,
        caller: &Address,
        id: &Hash,
    ) -> Result<Escrow, ChainError> {
        let mut escrow = Self::require(state, id)?;
        match escrow.status {
            EscrowStatus::Funded => return Ok(escrow),
            EscrowStatus::Init => {}
            status => {
                return Err(ChainError::InvalidTransition {
                    status,
                    event: "fund",
                })
            }
        }
        if caller != &escrow.payer {
            return Err(ChainError::Unauthorized);
        }

        state.debit(&escrow.payer, escrow.token, escrow.amount)?;
        state.credit(&vault_address(escrow.token), escrow.token, escrow.amount)?;

        escrow.status = EscrowStatus::Funded;
        escrow.updated_at = state.now();
        state.set_escrow(&escrow)?;
        counter!("nhb_escrow_funded_total").increment(1);
        state.emit(Event::EscrowFunded { id: id.clone() });
        Ok(escrow)
    }

    pub fn release<S: EscrowState>(
        &self,
        state: &mut S,
        caller: &Address,
        id: &Hash,
    ) -> Result<Escrow, ChainError> {
        let mut escrow = Self::require(state, id)?;
        let apply_realm_fee = match escrow.status {
            EscrowStatus::Released => return Ok(escrow),
            EscrowStatus::Funded => {
                let authorized = *caller == escrow.payee || escrow.mediator == Some(*caller);
                if !authorized {
                    return Err(ChainError::Unauthorized);
                }
                false
            }
            EscrowStatus::Disputed => {
                let mediator = escrow.mediator.ok_or(ChainError::MediatorMissing)?;
                if *caller != mediator {
                    return Err(ChainError::Unauthorized);
                }
                true
            }
            status => {
                return Err(ChainError::InvalidTransition {
                    status,
                    event: "release",
                })
            }
        };
        self.payout_release(state, &mut escrow, apply_realm_fee)?;
        Ok(escrow)
    }

    pub fn refund<S: EscrowState>(
        &self,
        state: &mut S,
        caller: &Address,
        id: &Hash,
    ) -> Result<Escrow, ChainError> {
        let mut escrow = Self::require(state, id)?;
        match escrow.status {
            EscrowStatus::Refunded => return Ok(escrow),
            EscrowStatus::Funded => {}
            status => {
                return Err(ChainError::InvalidTransition {
                    status,
                    event: "refund",
                })
            }
        }
        if caller != &escrow.payer {
            return Err(ChainError::Unauthorized);
        }
        if state.now() >= escrow.deadline {
            return Err(ChainError::DeadlinePassed);
        }
        self.payout_full_refund(state, &mut escrow, EscrowStatus::Refunded)?;
        Ok(escrow)
    }

    /// Deadline expiry; callable by anyone once the deadline passed
    pub fn expire<S: EscrowState>(&self, state: &mut S, id: &Hash) -> Result<Escrow, ChainError> {
        let mut escrow = Self::require(state, id)?;
        match escrow.status {
            EscrowStatus::Expired => return Ok(escrow),
            EscrowStatus::Funded => {}
            status => {
                return Err(ChainError::InvalidTransition {
                    status,
                    event: "expire",
                })
            }
        }
        if state.now() < escrow.deadline {
            return Err(ChainError::DeadlineNotReached);
        }
        self.payout_full_refund(state, &mut escrow, EscrowStatus::Expired)?;
        state.emit(Event::EscrowExpired { id: id.clone() });
        Ok(escrow)
    }

    pub fn dispute<S: EscrowState>(
        &self,
        state: &mut S,
        caller: &Address,
        id: &Hash,
    ) -> Result<Escrow, ChainError> {
        let mut escrow = Self::require(state, id)?;
        match escrow.status {
            EscrowStatus::Disputed => return Ok(escrow),
            EscrowStatus::Funded => {}
            status => {
                return Err(ChainError::InvalidTransition {
                    status,
                    event: "dispute",
                })
            }
        }
        if *caller != escrow.payer && *caller != escrow.payee {
            return Err(ChainError::Unauthorized);
        }
        escrow.status = EscrowStatus::Disputed;
        escrow.updated_at = state.now();
        state.set_escrow(&escrow)?;
        counter!("nhb_escrow_disputed_total").increment(1);
        state.emit(Event::EscrowDisputed {
            id: id.clone(),
            raised_by: *caller,
        });
        Ok(escrow)
    }

    /// Resolve a disputed escrow with a threshold of arbitrator
    /// signatures over the decision payload bytes.
    ///
    /// Replaying the accepted payload is a no-op; a different payload
    /// against an already-resolved escrow is a conflict.
    pub fn resolve_with_signatures<S: EscrowState>(
        &self,
        state: &mut S,
        decision: &[u8],
        signatures: &[Signature],
    ) -> Result<Escrow, ChainError> {
        let payload = DecisionPayload::from_json(decision)
            .map_err(|err| ChainError::InvalidPayload(format!("decision payload: {}", err)))?;
        let digest = DecisionPayload::digest(decision);

        let mut escrow = Self::require(state, &payload.escrow_id)?;
        if escrow.resolution_hash == digest {
            debug!("decision replay for escrow {}, no-op", escrow.id);
            return Ok(escrow);
        }
        match escrow.status {
            EscrowStatus::Disputed => {}
            EscrowStatus::Released | EscrowStatus::Refunded if escrow.is_resolved() => {
                return Err(ChainError::ConflictingDecision(escrow.id))
            }
            status => {
                return Err(ChainError::InvalidTransition {
                    status,
                    event: "resolve",
                })
            }
        }

        let frozen = escrow
            .frozen_arb
            .clone()
            .ok_or_else(|| ChainError::RealmNotFound(escrow.realm_id.clone().unwrap_or_default()))?;
        if payload.policy_nonce != frozen.policy_nonce {
            return Err(ChainError::InvalidPayload(format!(
                "policy nonce {} does not match frozen policy {}",
                payload.policy_nonce, frozen.policy_nonce
            )));
        }

        Self::verify_decision_quorum(&frozen, &digest, signatures)?;

        match payload.outcome {
            DecisionOutcome::Release => self.payout_release(state, &mut escrow, true)?,
            DecisionOutcome::Refund => self.payout_refund_with_fees(state, &mut escrow)?,
        }
        escrow.resolution_hash = digest.clone();
        state.set_escrow(&escrow)?;
        counter!("nhb_escrow_resolved_total").increment(1);
        info!("escrow {} resolved as {:?}", escrow.id, payload.outcome);
        state.emit(Event::EscrowResolved {
            id: escrow.id.clone(),
            outcome: payload.outcome,
            digest,
        });
        Ok(escrow)
    }

    // Distinct recovered signers from the frozen member set must reach
    // the frozen threshold.
    fn verify_decision_quorum(
        frozen: &FrozenPolicy,
        digest: &Hash,
        signatures: &[Signature],
    ) -> Result<(), ChainError> {
        let mut seen: HashSet<Address> = HashSet::new();
        for (index, signature) in signatures.iter().enumerate() {
            let signer = signature
                .recover(digest)
                .map_err(|_| QuorumError::SignatureFormat(index))?;
            if !frozen.arbitrators.contains(&signer) {
                return Err(QuorumError::UnknownSigner(signer).into());
            }
            seen.insert(signer);
        }
        if (seen.len() as u32) < frozen.arbitrators.threshold {
            return Err(QuorumError::QuorumInsufficient {
                signed: seen.len() as u64,
                total: frozen.arbitrators.threshold as u64,
            }
            .into());
        }
        Ok(())
    }

    // fee split for a release-style payout; realm fees only route on
    // arbitrated paths
    fn split(
        &self,
        escrow: &Escrow,
        apply_realm_fee: bool,
    ) -> Result<(U256, U256, U256, Option<Address>), ChainError> {
        let fee = fee_for(escrow.amount, escrow.fee_bps)?;
        if !fee.is_zero() && self.treasury.is_none() {
            return Err(ChainError::TreasuryNotConfigured);
        }

        let (realm_fee, realm_recipient) = if apply_realm_fee {
            match escrow.frozen_arb.as_ref().and_then(|policy| policy.fee.as_ref()) {
                Some(schedule) => {
                    let realm_fee = fee_for(escrow.amount, schedule.fee_bps)?;
                    if !realm_fee.is_zero() && schedule.recipient.is_zero() {
                        return Err(ChainError::RealmFeeRecipientMissing);
                    }
                    (realm_fee, Some(schedule.recipient))
                }
                None => (U256::zero(), None),
            }
        } else {
            (U256::zero(), None)
        };

        let payout = escrow
            .amount
            .checked_sub(fee)
            .and_then(|rest| rest.checked_sub(realm_fee))
            .ok_or(ChainError::FeesExceedAmount)?;
        Ok((payout, fee, realm_fee, realm_recipient))
    }

    fn vault_debit<S: EscrowState>(
        &self,
        state: &mut S,
        escrow: &Escrow,
    ) -> Result<(), ChainError> {
        let vault = vault_address(escrow.token);
        if state.balance(&vault, escrow.token)? < escrow.amount {
            return Err(ChainError::VaultUnderflow(escrow.token.as_str()));
        }
        state.debit(&vault, escrow.token, escrow.amount)
    }

    fn route_fees<S: EscrowState>(
        &self,
        state: &mut S,
        escrow: &Escrow,
        fee: U256,
        realm_fee: U256,
        realm_recipient: Option<Address>,
    ) -> Result<(), ChainError> {
        if !fee.is_zero() {
            // split() already guaranteed the treasury exists
            let treasury = self.treasury.ok_or(ChainError::TreasuryNotConfigured)?;
            state.credit(&treasury, escrow.token, fee)?;
        }
        if !realm_fee.is_zero() {
            let recipient = realm_recipient.ok_or(ChainError::RealmFeeRecipientMissing)?;
            state.credit(&recipient, escrow.token, realm_fee)?;
        }
        Ok(())
    }

    fn payout_release<S: EscrowState>(
        &self,
        state: &mut S,
        escrow: &mut Escrow,
        apply_realm_fee: bool,
    ) -> Result<(), ChainError> {
        let (payout, fee, realm_fee, realm_recipient) = self.split(escrow, apply_realm_fee)?;
        self.vault_debit(state, escrow)?;
        state.credit(&escrow.payee, escrow.token, payout)?;
        self.route_fees(state, escrow, fee, realm_fee, realm_recipient)?;

        escrow.status = EscrowStatus::Released;
        escrow.updated_at = state.now();
        state.set_escrow(escrow)?;
        counter!("nhb_escrow_released_total").increment(1);
        state.emit(Event::EscrowReleased {
            id: escrow.id.clone(),
            payee_amount: payout,
            fee_amount: fee,
            realm_fee_amount: realm_fee,
        });
        Ok(())
    }

    // dispute-path refund: fees still route, the payer receives the rest
    fn payout_refund_with_fees<S: EscrowState>(
        &self,
        state: &mut S,
        escrow: &mut Escrow,
    ) -> Result<(), ChainError> {
        let (payout, fee, realm_fee, realm_recipient) = self.split(escrow, true)?;
        self.vault_debit(state, escrow)?;
        state.credit(&escrow.payer, escrow.token, payout)?;
        self.route_fees(state, escrow, fee, realm_fee, realm_recipient)?;

        escrow.status = EscrowStatus::Refunded;
        escrow.updated_at = state.now();
        state.set_escrow(escrow)?;
        counter!("nhb_escrow_refunded_total").increment(1);
        state.emit(Event::EscrowRefunded {
            id: escrow.id.clone(),
            payer_amount: payout,
            fee_amount: fee,
            realm_fee_amount: realm_fee,
        });
        Ok(())
    }

    // pre-deadline refund and expiry return the full amount
    fn payout_full_refund<S: EscrowState>(
        &self,
        state: &mut S,
        escrow: &mut Escrow,
        terminal: EscrowStatus,
    ) -> Result<(), ChainError> {
        self.vault_debit(state, escrow)?;
        state.credit(&escrow.payer, escrow.token, escrow.amount)?;

        escrow.status = terminal;
        escrow.updated_at = state.now();
        state.set_escrow(escrow)?;
        counter!("nhb_escrow_refunded_total").increment(1);
        state.emit(Event::EscrowRefunded {
            id: escrow.id.clone(),
            payer_amount: escrow.amount,
            fee_amount: U256::zero(),
            realm_fee_amount: U256::zero(),
        });
        Ok(())
    }

    // ===== Trade-leg transitions =====
    //
    // Legs are plain escrows owned by the trade engine; authority checks
    // happened at the trade layer, the vault movements are identical.

    pub(crate) fn release_leg<S: EscrowState>(
        &self,
        state: &mut S,
        id: &Hash,
    ) -> Result<Escrow, ChainError> {
        let mut escrow = Self::require(state, id)?;
        match escrow.status {
            EscrowStatus::Released => return Ok(escrow),
            EscrowStatus::Funded | EscrowStatus::Disputed => {}
            status => {
                return Err(ChainError::InvalidTransition {
                    status,
                    event: "release",
                })
            }
        }
        self.payout_release(state, &mut escrow, false)?;
        Ok(escrow)
    }

    pub(crate) fn refund_leg<S: EscrowState>(
        &self,
        state: &mut S,
        id: &Hash,
    ) -> Result<Escrow, ChainError> {
        let mut escrow = Self::require(state, id)?;
        match escrow.status {
            EscrowStatus::Refunded => return Ok(escrow),
            EscrowStatus::Funded | EscrowStatus::Disputed => {}
            status => {
                return Err(ChainError::InvalidTransition {
                    status,
                    event: "refund",
                })
            }
        }
        self.payout_full_refund(state, &mut escrow, EscrowStatus::Refunded)?;
        Ok(escrow)
    }

    pub(crate) fn mark_leg_disputed<S: EscrowState>(
        &self,
        state: &mut S,
        id: &Hash,
        raised_by: Address,
    ) -> Result<(), ChainError> {
        let mut escrow = Self::require(state, id)?;
        if escrow.status != EscrowStatus::Funded {
            return Ok(());
        }
        escrow.status = EscrowStatus::Disputed;
        escrow.updated_at = state.now();
        state.set_escrow(&escrow)?;
        state.emit(Event::EscrowDisputed {
            id: id.clone(),
            raised_by,
        });
        Ok(())
    }
}

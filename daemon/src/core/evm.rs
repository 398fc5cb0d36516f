use primitive_types::U256;

use nhb_common::{
    crypto::{Address, Hash},
    escrow::Token,
};

use crate::core::{error::ChainError, state::AccountState};

/// Execution environment handed to the adapter for one block
#[derive(Clone, Debug)]
pub struct BlockContext {
    pub height: u64,
    pub timestamp: u64,
    pub state_root: Hash,
}

/// Message-call request routed to the EVM
#[derive(Clone, Debug)]
pub struct EvmMessage {
    pub from: Address,
    pub to: Address,
    pub value: U256,
    pub data: Vec<u8>,
    pub gas_limit: u64,
    pub gas_price: U256,
}

/// Adapter result; `error` carries the revert reason when execution
/// failed deterministically
#[derive(Clone, Debug, Default)]
pub struct EvmOutcome {
    pub used_gas: u64,
    pub return_data: Vec<u8>,
    pub error: Option<String>,
}

/// Deterministic EVM execution boundary. The production adapter lives
/// outside this crate; it receives the pre-state through `state` and
/// stages its writes back through the same handle.
pub trait EvmAdapter: Send + Sync {
    fn apply(
        &self,
        ctx: &BlockContext,
        msg: &EvmMessage,
        state: &mut dyn AccountState,
    ) -> Result<EvmOutcome, ChainError>;
}

/// Minimal adapter for plain value transfers; stands in when no EVM is
/// wired up and in tests.
#[derive(Default)]
pub struct NativeTransferAdapter;

impl EvmAdapter for NativeTransferAdapter {
    fn apply(
        &self,
        _ctx: &BlockContext,
        msg: &EvmMessage,
        state: &mut dyn AccountState,
    ) -> Result<EvmOutcome, ChainError> {
        state.debit(&msg.from, Token::Nhb, msg.value)?;
        state.credit(&msg.to, Token::Nhb, msg.value)?;
        Ok(EvmOutcome {
            used_gas: 21_000,
            return_data: Vec::new(),
            error: None,
        })
    }
}

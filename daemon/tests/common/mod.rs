#![allow(dead_code)]

use std::sync::Arc;

use primitive_types::U256;

use nhb_common::{
    config::NHB_CHAIN_ID,
    crypto::{Address, Hash, KeyPair},
    escrow::Token,
    transaction::{Transaction, TransactionPayload, UnsignedTransaction},
};
use nhb_daemon::core::{
    error::ChainError,
    evm::NativeTransferAdapter,
    state::{AccountState, ProcessorConfig, StateManager, StateProcessor},
    storage::MemoryDatabase,
    trie::Trie,
};

pub fn keypair(seed: u8) -> KeyPair {
    KeyPair::from_secret(&[seed; 32]).expect("non-zero secret")
}

pub fn processor(config: ProcessorConfig) -> StateProcessor {
    let trie = Trie::open(Arc::new(MemoryDatabase::new())).expect("fresh database");
    StateProcessor::new(
        StateManager::new(trie),
        config,
        Arc::new(NativeTransferAdapter),
    )
}

pub fn fund(
    processor: &mut StateProcessor,
    address: &Address,
    token: Token,
    amount: u64,
) -> Result<(), ChainError> {
    processor
        .state_mut()
        .credit(address, token, U256::from(amount))
}

pub fn balance(
    processor: &mut StateProcessor,
    address: &Address,
    token: Token,
) -> Result<U256, ChainError> {
    processor.state_mut().balance(address, token)
}

pub fn signed_tx(keypair: &KeyPair, nonce: u64, payload: TransactionPayload) -> Transaction {
    UnsignedTransaction {
        chain_id: NHB_CHAIN_ID,
        nonce,
        gas_limit: 100_000,
        gas_price: U256::one(),
        payload,
        intent_ref: None,
        intent_expiry: None,
        merchant: None,
        device_id: None,
        refund_of: None,
        paymaster: None,
    }
    .sign(keypair)
}

pub fn signed_tx_with_merchant(
    keypair: &KeyPair,
    nonce: u64,
    payload: TransactionPayload,
    merchant: Address,
) -> Transaction {
    UnsignedTransaction {
        chain_id: NHB_CHAIN_ID,
        nonce,
        gas_limit: 100_000,
        gas_price: U256::one(),
        payload,
        intent_ref: None,
        intent_expiry: None,
        merchant: Some(merchant),
        device_id: None,
        refund_of: None,
        paymaster: None,
    }
    .sign(keypair)
}

pub fn signed_tx_with_intent(
    keypair: &KeyPair,
    nonce: u64,
    payload: TransactionPayload,
    intent_ref: Hash,
    intent_expiry: Option<u64>,
) -> Transaction {
    UnsignedTransaction {
        chain_id: NHB_CHAIN_ID,
        nonce,
        gas_limit: 100_000,
        gas_price: U256::one(),
        payload,
        intent_ref: Some(intent_ref),
        intent_expiry,
        merchant: None,
        device_id: None,
        refund_of: None,
        paymaster: None,
    }
    .sign(keypair)
}

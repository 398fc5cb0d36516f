use thiserror::Error;

use nhb_common::{
    account::AccountError,
    crypto::{CryptoError, Hash},
    escrow::{EscrowStatus, RealmConfigError, TradeStatus},
    serializer::ReaderError,
};

use crate::core::{storage::StorageError, validator::QuorumError};

/// Errors surfaced by the state machine and the engines. Validation,
/// authorization, state, quorum, resource and intent errors roll the
/// transaction back; storage errors are fatal to the current operation.
#[derive(Error, Debug)]
pub enum ChainError {
    // ===== Validation =====
    #[error("invalid chain id {0}")]
    InvalidChainId(u64),
    #[error("nonce mismatch: expected {expected}, got {got}")]
    NonceMismatch { expected: u64, got: u64 },
    #[error("invalid payload: {0}")]
    InvalidPayload(String),
    #[error("amount must be positive")]
    AmountNonPositive,
    #[error("fee bps {0} out of range")]
    FeeBpsOutOfRange(u32),
    #[error("deadline {deadline} is before current time {now}")]
    DeadlineBeforeNow { deadline: i64, now: i64 },
    #[error("unsupported token")]
    UnsupportedToken,
    #[error("invalid address length")]
    AddressLength,
    #[error("unknown realm {0}")]
    RealmNotFound(String),
    #[error("realm configuration: {0}")]
    RealmConfig(#[from] RealmConfigError),
    #[error("treasury is not configured but a fee is due")]
    TreasuryNotConfigured,
    #[error("realm fee recipient is not configured")]
    RealmFeeRecipientMissing,
    #[error("combined fees exceed the escrow amount")]
    FeesExceedAmount,
    #[error("evm execution reverted: {0}")]
    EvmReverted(String),
    #[error("username {0} is already taken")]
    UsernameTaken(String),

    // ===== Authorization =====
    #[error("caller is not authorized for this transition")]
    Unauthorized,
    #[error("escrow has no mediator")]
    MediatorMissing,

    // ===== State =====
    #[error("invalid escrow transition from {status:?} on {event}")]
    InvalidTransition {
        status: EscrowStatus,
        event: &'static str,
    },
    #[error("invalid trade transition from {status:?} on {event}")]
    InvalidTradeTransition {
        status: TradeStatus,
        event: &'static str,
    },
    #[error("unknown escrow {0}")]
    EscrowNotFound(Hash),
    #[error("escrow {0} already exists with different parameters")]
    EscrowExists(Hash),
    #[error("unknown trade {0}")]
    TradeNotFound(Hash),
    #[error("trade {0} already exists with different parameters")]
    TradeExists(Hash),
    #[error("conflicting decision for escrow {0}")]
    ConflictingDecision(Hash),
    #[error("deadline not reached")]
    DeadlineNotReached,
    #[error("deadline passed")]
    DeadlinePassed,
    #[error("trade {0} is fully funded and requires resolution")]
    TradeRequiresResolution(Hash),

    // ===== Quorum =====
    #[error(transparent)]
    Quorum(#[from] QuorumError),

    // ===== Resource =====
    #[error("insufficient balance: need {needed}, have {available}")]
    InsufficientBalance { needed: String, available: String },
    #[error("vault underflow for token {0}")]
    VaultUnderflow(&'static str),
    #[error("balance overflow")]
    BalanceOverflow,
    #[error("quota exceeded for module {module}")]
    QuotaExceeded { module: String },

    // ===== Intent =====
    #[error("intent reference expired")]
    IntentExpired,
    #[error("intent reference already consumed")]
    IntentAlreadyConsumed,

    // ===== Fatal =====
    #[error("storage: {0}")]
    Storage(#[from] StorageError),
    #[error("serialization: {0}")]
    Serialization(#[from] ReaderError),
    #[error("crypto: {0}")]
    Crypto(#[from] CryptoError),
    #[error("account: {0}")]
    Account(#[from] AccountError),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("operation cancelled")]
    Cancelled,
}

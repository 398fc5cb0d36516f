use crate::crypto::Hash;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// Chain identifier expected by the state machine.
// Transactions carrying any other chain id are rejected before dispatch.
pub const NHB_CHAIN_ID: u64 = 187001;

// Amounts are 256-bit with 18 decimals
pub const COIN_DECIMALS: u8 = 18;

// Basis-point denominator used by every fee computation.
// fee = amount * bps / BPS_DENOMINATOR, truncating toward zero
pub const BPS_DENOMINATOR: u64 = 10_000;
// Upper bound accepted for any fee expressed in basis points
pub const MAX_FEE_BPS: u32 = 10_000;

// Intent references expire after this many seconds by default (24 hours)
pub const DEFAULT_INTENT_TTL_SECS: u64 = 24 * 3600;

// Minimum stake for validator eligibility when governance has not
// overridden the parameter
pub const DEFAULT_MIN_VALIDATOR_STAKE: u64 = 1_000;

// Addresses format
// mainnet prefix address
pub const PREFIX_ADDRESS: &str = "nhb";
// testnet prefix address
pub const TESTNET_PREFIX_ADDRESS: &str = "tnhb";

// keccak256 of empty input; storage root of accounts without contract
// storage and code hash of accounts without code
pub const EMPTY_ROOT: Hash = Hash::new([
    0xc5, 0xd2, 0x46, 0x01, 0x86, 0xf7, 0x23, 0x3c, 0x92, 0x7e, 0x7d, 0xb2, 0xdc, 0xc7, 0x03,
    0xc0, 0xe5, 0x00, 0xb6, 0x53, 0xca, 0x82, 0x27, 0x3b, 0x7b, 0xfa, 0xd8, 0x04, 0x5d, 0x85,
    0xa4, 0x70,
]);
pub const EMPTY_CODE_HASH: Hash = EMPTY_ROOT;

// Top-level trie key families. Account records live under keccak256(addr),
// metadata under keccak256(ACCOUNT_META_PREFIX || addr). The named keys
// below are hashed once and are part of the persisted state contract.
pub const ACCOUNT_META_PREFIX: &[u8] = b"account-meta:";
pub const ESCROW_PREFIX: &[u8] = b"escrow:";
pub const ESCROW_REALM_PREFIX: &[u8] = b"escrow-realm:";
pub const ESCROW_VAULT_PREFIX: &[u8] = b"escrow-vault:";
pub const TRADE_PREFIX: &[u8] = b"trade:";
pub const INTENT_PREFIX: &[u8] = b"intent:";
pub const QUOTA_PREFIX: &[u8] = b"quota:";
pub const FEES_PREFIX: &[u8] = b"fees:";

pub const USERNAME_INDEX_KEY: &[u8] = b"username-index";
pub const VALIDATOR_SET_KEY: &[u8] = b"validator-set";
pub const VALIDATOR_ELIGIBLE_SET_KEY: &[u8] = b"validator-eligible-set";
pub const EPOCH_HISTORY_KEY: &[u8] = b"epoch-history";
pub const REWARD_HISTORY_KEY: &[u8] = b"reward-history";

// Domain tag prepended to the binary envelope before hashing for signature
pub const TX_SIGNING_DOMAIN: &[u8] = b"NHB_TX_V1";

use std::time::Duration;

// Snapshot chunks are capped at this many bytes unless the exporter is
// configured otherwise
pub const DEFAULT_CHUNK_SIZE: u64 = 4 * 1024 * 1024;

// Chunk downloads give up after this long
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

// Undelegated stake stays locked for this long before it can be claimed
pub const DEFAULT_UNBONDING_PERIOD_SECS: u64 = 7 * 24 * 3600;

// Per-module quota window when a module config does not override it
pub const DEFAULT_QUOTA_EPOCH_SECS: u64 = 3600;

// Flat gas charged to native (non-EVM) operations
pub const NATIVE_GAS_PER_TX: u64 = 25_000;

// Suffix appended to the previous database directory during snapshot install
pub const INSTALL_BACKUP_SUFFIX: &str = ".bak";
// Suffix of the scratch directory a snapshot is loaded into before the swap
pub const INSTALL_TMP_SUFFIX: &str = ".tmp-install";

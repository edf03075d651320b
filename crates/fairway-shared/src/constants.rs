/// Protocol version string for libp2p identify
pub const PROTOCOL_VERSION: &str = "/fairway/1.0.0";

/// Request-response protocol carrying profile snapshots
pub const SYNC_PROTOCOL: &str = "/fairway/sync/1.0.0";

/// Prefix of every generated golfer identifier
pub const GOLFER_ID_PREFIX: &str = "GF-";

/// Number of random characters after the prefix
pub const GOLFER_ID_SUFFIX_LEN: usize = 8;

/// Longest identifier accepted from the outside world
pub const MAX_GOLFER_ID_LEN: usize = 64;

/// Rounds included in a snapshot unless configured otherwise
pub const DEFAULT_SNAPSHOT_ROUNDS: usize = 20;

/// Hard upper bound for the configurable snapshot cap
pub const MAX_SNAPSHOT_ROUNDS: usize = 50;

/// Shortest run of base64 characters treated as an embedded share code
pub const MIN_EMBEDDED_CODE_LEN: usize = 30;

/// Query parameter carrying a share code in deep links
pub const SHARE_CODE_PARAM: &str = "code";

/// Retry sweep interval in seconds
pub const DEFAULT_RETRY_INTERVAL_SECS: u64 = 60;

/// Idle connection timeout in seconds
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 300;

/// Default QUIC listen port
pub const DEFAULT_QUIC_PORT: u16 = 4001;

/// Key derivation context for the libp2p keypair (BLAKE3)
pub const KDF_CONTEXT_PEER_KEY: &str = "fairway-libp2p-keypair-v1";

/// Storage key of the current state blob
pub const STORAGE_KEY: &str = "golf_master_pro_v3";

/// Older storage keys, newest first, merged forward on load
pub const LEGACY_STORAGE_KEYS: &[&str] = &["golf_master_pro_v2", "golf_master_pro_v1"];

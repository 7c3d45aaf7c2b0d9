use alloy_primitives::{Address, U256};
use std::time::Duration;

/// 1 hour
pub const SIGNATURE_EXPIRY: U256 = U256::from_limbs([3600, 0, 0, 0]);

/// No delegation approver: stakers may delegate without a signature.
pub const DELEGATION_APPROVER: Address = Address::ZERO;
pub const STAKER_OPT_OUT_WINDOW_BLOCKS: u32 = 0;
pub const OPERATOR_METADATA_URL: &str = "";

pub const TASK_MESSAGE_PREFIX: &str = "Hello, ";

pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

pub const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_RECEIPT_POLL_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(120);

pub const DEFAULT_MAX_ATTEMPTS: u32 = 1;
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_secs(2);

//! Core type definitions for the CLTV channel library
//!
//! This module defines fundamental types and protocol constants used across
//! multiple modules, providing a common location for shared definitions.

use bitcoin::ScriptHash;

// ============================================================================
// Channel Domain
// ============================================================================

/// Type alias for channel identifiers
///
/// A channel is identified by the HASH160 of its redeem script, which is also
/// the payload of its P2SH address.
pub type ChannelId = ScriptHash;

/// Minimum distance between "now" and a time-based channel lock time (6 hours)
pub const MIN_EXPIRY_SECS: u32 = 6 * 60 * 60;

// ============================================================================
// Bitcoin Transaction Domain
// ============================================================================

/// Sequence value that disables nLockTime for an input
pub const FINALIZED_SEQUENCE: u32 = 0xFFFF_FFFF;

/// Sequence value used by refund inputs so that nLockTime is enforced
pub const REFUND_SEQUENCE: u32 = 0xFFFF_FFFE;

/// Lock time values below this threshold are block heights, above are UNIX seconds
pub const LOCKTIME_THRESHOLD: u32 = 500_000_000;

/// Maximum serialized size of a standard transaction
pub const MAX_STANDARD_TX_SIZE: usize = 100_000;

/// Maximum number of bytes in a lock time script number pushed for CLTV
pub const MAX_LOCKTIME_SCRIPTNUM_LEN: usize = 5;

/// Transaction version used by every builder in this crate
pub const TX_VERSION: bitcoin::transaction::Version = bitcoin::transaction::Version::TWO;

//! Bitcoin time lock utilities
//!
//! This module provides utilities for working with absolute time locks,
//! specifically CheckLockTimeVerify (CLTV) as used by the channel refund path.

use bitcoin::absolute::LockTime;
use bitcoin::Sequence;
use chrono::Utc;

use crate::errors::{Result, ScriptError};
use crate::types::{FINALIZED_SEQUENCE, LOCKTIME_THRESHOLD};

/// Current wall-clock time as UNIX seconds
///
/// Saturates at `u32::MAX`, the largest value a time-based lock time can hold.
pub fn unix_now() -> u32 { u32::try_from(Utc::now().timestamp().max(0)).unwrap_or(u32::MAX) }

/// Returns true when the sequence disables nLockTime for its input
pub fn is_finalized(sequence: Sequence) -> bool { sequence.to_consensus_u32() == FINALIZED_SEQUENCE }

/// Returns true when the consensus lock time value is a UNIX timestamp
pub fn is_time_based(lock_time: u32) -> bool { lock_time >= LOCKTIME_THRESHOLD }

/// Validates a channel lock time against the expiry policy
///
/// Time-based lock times must be at least `min_expiry_secs` after `now`.
/// Height-based lock times are only required to be non-zero since the
/// library has no notion of the current chain height.
///
/// # Arguments
/// * `lock_time` - The lock time to embed in the redeem script
/// * `now` - Current time as UNIX seconds
/// * `min_expiry_secs` - Minimum distance between `now` and `lock_time`
///
/// # Errors
/// * `ScriptError::InvalidLockTime` - If the lock time is zero or too soon
///
/// # Examples
///
/// ```rust
/// use bitcoin::absolute::LockTime;
/// use cltv_channel::btx::timelock::validate_channel_lock_time;
///
/// let now = 1_700_000_000;
/// let soon = LockTime::from_consensus(now + 60);
/// assert!(validate_channel_lock_time(soon, now, 6 * 3600).is_err());
///
/// let later = LockTime::from_consensus(now + 7 * 3600);
/// assert!(validate_channel_lock_time(later, now, 6 * 3600).is_ok());
/// ```
pub fn validate_channel_lock_time(lock_time: LockTime, now: u32, min_expiry_secs: u32) -> Result<()> {
    let value = lock_time.to_consensus_u32();
    if value == 0 {
        return Err(ScriptError::InvalidLockTime {
            lock_time: value,
            reason: "lock time must be non-zero".to_string(),
        }
        .into());
    }

    if is_time_based(value) {
        let earliest = now.saturating_add(min_expiry_secs);
        if value < earliest {
            return Err(ScriptError::InvalidLockTime {
                lock_time: value,
                reason: format!("must be at least {} seconds after {}", min_expiry_secs, now),
            }
            .into());
        }
    }

    Ok(())
}

/// Computes a time-based lock time `duration_secs` after `now`
///
/// # Errors
/// * `ScriptError::InvalidLockTime` - If the result does not fit a time-based lock time
pub fn lock_time_after(now: u32, duration_secs: u32) -> Result<LockTime> {
    let value = now.checked_add(duration_secs).ok_or_else(|| ScriptError::InvalidLockTime {
        lock_time: u32::MAX,
        reason: format!("{} + {} overflows", now, duration_secs),
    })?;

    if !is_time_based(value) {
        return Err(ScriptError::InvalidLockTime {
            lock_time: value,
            reason: "expected a UNIX timestamp".to_string(),
        }
        .into());
    }

    Ok(LockTime::from_consensus(value))
}

/// Returns true when a transaction with `tx_lock_time` satisfies CLTV for `required`
///
/// Mirrors the consensus comparison: both values must be of the same kind
/// (heights or timestamps) and the transaction lock time must be at least
/// the required one.
pub fn satisfies_cltv(tx_lock_time: LockTime, required: LockTime) -> bool {
    required.is_implied_by(tx_lock_time)
}

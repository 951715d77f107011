//! Constants for slotgrid
//!
//! All limits are explicit, use big-endian naming (most significant first),
//! and include units in the name.

// =============================================================================
// Identifier Limits
// =============================================================================

/// Maximum length of a node ID in bytes
pub const NODE_ID_LENGTH_BYTES_MAX: usize = 128;

/// Maximum length of a session ID in bytes
pub const SESSION_ID_LENGTH_BYTES_MAX: usize = 256;

/// Maximum number of slots a single node may advertise
pub const NODE_SLOTS_COUNT_MAX: usize = 1024;

// =============================================================================
// Liveness
// =============================================================================

/// Default heartbeat period advertised by nodes in milliseconds (1 min)
pub const HEARTBEAT_PERIOD_MS_DEFAULT: u64 = 60 * 1000;

/// Default session timeout enforced by nodes in milliseconds (5 min)
pub const SESSION_TIMEOUT_MS_DEFAULT: u64 = 5 * 60 * 1000;

/// Consecutive failed health checks tolerated before a node is purged
pub const NODE_UNHEALTHY_COUNT_THRESHOLD: u32 = 4;

/// Heartbeat periods of silence before a `DOWN` node is purged.
///
/// An `UP` node is demoted after half of this many periods.
pub const NODE_PURGE_TIMEOUT_MULTIPLIER: u32 = 4;

/// Default interval between reaper sweeps in milliseconds (30 sec)
pub const REAPER_INTERVAL_MS_DEFAULT: u64 = 30 * 1000;

/// Minimum interval between reaper sweeps in milliseconds
pub const REAPER_INTERVAL_MS_MIN: u64 = 10;

/// Maximum interval between reaper sweeps in milliseconds (1 hour)
pub const REAPER_INTERVAL_MS_MAX: u64 = 60 * 60 * 1000;

// =============================================================================
// Event Bus
// =============================================================================

/// Default number of buffered events per subscriber
pub const EVENT_BUS_CAPACITY_COUNT_DEFAULT: usize = 1024;

/// Maximum number of buffered events per subscriber
pub const EVENT_BUS_CAPACITY_COUNT_MAX: usize = 64 * 1024;

// Compile-time assertions for constant validity
const _: () = {
    assert!(NODE_ID_LENGTH_BYTES_MAX >= 36); // room for a UUID
    assert!(NODE_PURGE_TIMEOUT_MULTIPLIER >= 2);
    assert!(NODE_PURGE_TIMEOUT_MULTIPLIER % 2 == 0);
    assert!(REAPER_INTERVAL_MS_MIN < REAPER_INTERVAL_MS_DEFAULT);
    assert!(REAPER_INTERVAL_MS_DEFAULT <= REAPER_INTERVAL_MS_MAX);
    assert!(EVENT_BUS_CAPACITY_COUNT_DEFAULT <= EVENT_BUS_CAPACITY_COUNT_MAX);
};

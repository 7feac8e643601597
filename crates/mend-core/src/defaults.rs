//! Centralized default constants for mend.
//!
//! **This module is the single source of truth** for shared default values.
//! Crates and the backfill binary reference these constants instead of
//! defining their own magic numbers.

// =============================================================================
// COLLECTION SCHEMA
// =============================================================================

/// Collection repaired by the backfill when none is configured.
pub const COLLECTION: &str = "matches";

/// Whether the match is still live. Never written as `false` by the backfill.
pub const FIELD_IS_ACTIVE: &str = "isActive";

/// Current most-recent-activity marker.
pub const FIELD_LAST_MESSAGE: &str = "lastMessage";

/// Legacy activity marker superseded by [`FIELD_LAST_MESSAGE`].
pub const FIELD_LAST_MESSAGE_AT: &str = "lastMessageAt";

/// Creation time, the fallback source for a missing activity marker.
pub const FIELD_CREATED_AT: &str = "createdAt";

// =============================================================================
// BATCHING
// =============================================================================

/// Maximum number of writes per atomic batch commit.
///
/// Matches the per-batch write limit common to hosted document stores.
pub const MAX_BATCH_SIZE: usize = 500;

// =============================================================================
// EVENTS
// =============================================================================

/// Capacity of the broadcast channel carrying run events.
pub const EVENT_BUS_CAPACITY: usize = 256;

// =============================================================================
// DATABASE
// =============================================================================

/// Database URL used when `DATABASE_URL` is not set.
pub const DATABASE_URL: &str = "postgres://localhost/mend";

/// Connections in the pool. The backfill is a single sequential flow.
pub const DB_MAX_CONNECTIONS: u32 = 5;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_size_is_store_limit() {
        assert_eq!(MAX_BATCH_SIZE, 500);
    }

    #[test]
    fn field_names_are_distinct() {
        let fields = [
            FIELD_IS_ACTIVE,
            FIELD_LAST_MESSAGE,
            FIELD_LAST_MESSAGE_AT,
            FIELD_CREATED_AT,
        ];
        for (i, a) in fields.iter().enumerate() {
            for b in &fields[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }
}

//! Migration predicate: does a match document predate the current schema?

use crate::defaults::{FIELD_IS_ACTIVE, FIELD_LAST_MESSAGE, FIELD_LAST_MESSAGE_AT};
use crate::models::Document;

/// Whether the document is missing fields the current schema requires.
///
/// True when `isActive` is absent (an explicit `false` does not count), or
/// when neither `lastMessage` nor `lastMessageAt` is present. Only presence
/// is inspected; field shapes are checked later by [`crate::compute_patch`].
pub fn needs_migration(doc: &Document) -> bool {
    !doc.has(FIELD_IS_ACTIVE)
        || (!doc.has(FIELD_LAST_MESSAGE) && !doc.has(FIELD_LAST_MESSAGE_AT))
}

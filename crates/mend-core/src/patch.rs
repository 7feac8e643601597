//! Patch computation: the minimal field assignments that bring a match
//! document up to the current schema.

use serde_json::Value;

use crate::defaults::{FIELD_CREATED_AT, FIELD_IS_ACTIVE, FIELD_LAST_MESSAGE, FIELD_LAST_MESSAGE_AT};
use crate::error::Result;
use crate::models::{Document, MatchFields, Patch, Timestamp};
use crate::traits::Clock;

/// Which activity-marker rule applied to a document.
///
/// The guards are mutually exclusive, so exactly one variant describes any
/// document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerRepair {
    /// `lastMessage` is already set; neither marker is touched.
    Untouched,
    /// `lastMessage` copied from the legacy `lastMessageAt`.
    PromotedLegacy,
    /// No marker at all; `lastMessage` taken from `createdAt`.
    FromCreatedAt,
    /// No marker and no `createdAt`; `lastMessage` set to the clock's now.
    FromClock,
}

impl MarkerRepair {
    /// Select the rule from field presence.
    pub fn select(fields: &MatchFields<'_>) -> Self {
        match (fields.last_message, fields.last_message_at, fields.created_at) {
            (Some(_), _, _) => MarkerRepair::Untouched,
            (None, Some(_), _) => MarkerRepair::PromotedLegacy,
            (None, None, Some(_)) => MarkerRepair::FromCreatedAt,
            (None, None, None) => MarkerRepair::FromClock,
        }
    }
}

/// Compute the patch repairing `doc`.
///
/// Safe to call on any document: a compliant one yields an empty patch.
/// `lastMessageAt` is never removed and `isActive` is never set to `false`.
/// Only a value the selected rule copies is decoded, so a wrongly shaped
/// field the repair never reads cannot fail it.
pub fn compute_patch(doc: &Document, clock: &dyn Clock) -> Result<Patch> {
    let fields = MatchFields::of(doc);
    let mut patch = Patch::new();

    if fields.is_active.is_none() {
        patch.set(FIELD_IS_ACTIVE, Value::Bool(true));
    }

    let marker = match MarkerRepair::select(&fields) {
        MarkerRepair::Untouched => None,
        MarkerRepair::PromotedLegacy => doc.timestamp(FIELD_LAST_MESSAGE_AT)?,
        MarkerRepair::FromCreatedAt => doc.timestamp(FIELD_CREATED_AT)?,
        MarkerRepair::FromClock => Some(Timestamp::from_datetime(clock.now())),
    };
    if let Some(ts) = marker {
        patch.set(FIELD_LAST_MESSAGE, ts.into_value());
    }

    Ok(patch)
}

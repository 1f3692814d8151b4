//! Push event type names.
//!
//! Single source of truth for the `type` strings the dashboard server pushes
//! and for which of them invalidate which list views.

// ---------------------------------------------------------------------------
// Event types
// ---------------------------------------------------------------------------

pub const EVENT_NEW_DONATION: &str = "new_donation";
pub const EVENT_DONATION_UPDATED: &str = "donation_updated";
pub const EVENT_CAMPAIGN_UPDATED: &str = "campaign_updated";

// ---------------------------------------------------------------------------
// Invalidation sets
// ---------------------------------------------------------------------------

/// Events after which donation lists and donation stats are stale.
pub const DONATION_INVALIDATORS: &[&str] = &[EVENT_NEW_DONATION, EVENT_DONATION_UPDATED];

//! # Campaign Fire Scheduler
//!
//! Fires are derived state: a contact has an unfired fire for a campaign event only
//! while it belongs to the campaign's group and the event's schedule, computed from
//! one of the contact's date fields, is still in the future.
//!
//! When a batch changes group membership or field values, the scheduler doesn't
//! patch fires in place. It works out the net change per contact
//! ([`CampaignDelta`]), deletes every fire the change may have made stale, then
//! inserts freshly computed ones ([`plan_fires`]). Deletes run before inserts in the
//! same transaction, so an event that is both invalidated and re-triggered by one
//! batch ends up with exactly one fire.

pub mod delta;
pub mod schedule;
pub mod scheduler;

pub use delta::{net_group_changes, CampaignDelta, ContactDelta};
pub use schedule::schedule_for_contact;
pub use scheduler::{plan_fires, FirePlan};

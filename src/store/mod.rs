//! Document persistence for events and linked events.
//!
//! Events are stored as whole documents with their runners embedded. The
//! trait only offers narrow writes on top of that: a runner is pushed or
//! replaced on its own, reference sets are changed with add/pull, and a
//! detail replace never touches the runners or the reference set. That keeps
//! concurrent requests against the same event from overwriting each other.

use std::collections::BTreeSet;

use crate::error::StoreResult;
use crate::links::RefSets;
use crate::models::{
    ClubId, Event, EventId, EventLocation, LinkedEvent, LinkedEventId, Runner, UserId,
};
use crate::validate::IdKind;
use crate::visibility::Memberships;

pub mod memory;
pub mod pg;

pub use memory::MemoryStore;
pub use pg::PgStore;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventFilter {
    pub include_inactive: bool,
    /// Inclusive, compared as `YYYY-MM-DD` strings.
    pub date_from: Option<String>,
    pub date_to: Option<String>,
    pub organised_by: Option<ClubId>,
    /// Case-insensitive substring of the event name.
    pub name_contains: Option<String>,
}

impl EventFilter {
    pub fn matches(&self, event: &Event) -> bool {
        if !self.include_inactive && !event.active {
            return false;
        }
        if let Some(from) = &self.date_from {
            if event.date.as_str() < from.as_str() {
                return false;
            }
        }
        if let Some(to) = &self.date_to {
            if event.date.as_str() > to.as_str() {
                return false;
            }
        }
        if let Some(club) = self.organised_by {
            if !event.organised_by.contains(&club) {
                return false;
            }
        }
        if let Some(part) = &self.name_contains {
            if !event.name.to_lowercase().contains(&part.to_lowercase()) {
                return false;
            }
        }
        true
    }
}

pub trait Store: RefSets {
    /// The subset of `ids` that exist for `kind`. Inactive events do not count.
    fn existing_ids(&self, kind: IdKind, ids: &[i64]) -> StoreResult<BTreeSet<i64>>;

    fn memberships(&self, users: &[UserId]) -> StoreResult<Memberships>;

    fn find_event(&self, id: EventId) -> StoreResult<Option<Event>>;

    fn find_active_event(&self, date: &str, name: &str) -> StoreResult<Option<Event>>;

    /// Newest first, ties broken by id.
    fn find_events(&self, filter: &EventFilter) -> StoreResult<Vec<Event>>;

    /// Fails with `StoreError::Duplicate` when an active event already has
    /// the same date and name.
    fn insert_event(&self, event: &Event) -> StoreResult<EventId>;

    /// Overwrites an active event's document except for `runners` and
    /// `linkedTo`. Geographic fields left empty in `event` keep their stored
    /// values. Returns false when there is no active event with that id.
    fn replace_event_details(&self, event: &Event) -> StoreResult<bool>;

    /// Marks an active event inactive and appends `suffix` to its name and
    /// federation id, provided every runner left on it is `requester`.
    /// Returns the deleted event, or `None` when nothing was changed.
    fn soft_delete_event(
        &self,
        id: EventId,
        requester: UserId,
        suffix: &str,
    ) -> StoreResult<Option<Event>>;

    /// Sets the geographic fields of the event that are still empty.
    fn fill_event_location(&self, id: EventId, location: &EventLocation) -> StoreResult<()>;

    /// Appends a runner to an active event unless it already has one for the
    /// same user. Returns false when nothing was appended.
    fn push_runner(&self, id: EventId, runner: &Runner) -> StoreResult<bool>;

    /// Replaces the runner entry of `runner.user` on an active event. Returns
    /// false when there is no such entry.
    fn replace_runner(&self, id: EventId, runner: &Runner) -> StoreResult<bool>;

    fn find_linked_event(&self, id: LinkedEventId) -> StoreResult<Option<LinkedEvent>>;

    /// Ordered by display name.
    fn find_linked_events(&self) -> StoreResult<Vec<LinkedEvent>>;

    /// Fails with `StoreError::Duplicate` on a display name already in use.
    fn insert_linked_event(&self, linked: &LinkedEvent) -> StoreResult<LinkedEventId>;

    fn rename_linked_event(&self, id: LinkedEventId, display_name: &str) -> StoreResult<bool>;

    fn delete_linked_event(&self, id: LinkedEventId) -> StoreResult<bool>;
}

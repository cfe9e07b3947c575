//! In-memory store for tests and local development.
//!
//! Each trait method holds the lock for its whole body, which gives the same
//! per-statement atomicity the PostgreSQL store gets from single `UPDATE`s.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::{StoreError, StoreResult};
use crate::links::{RefField, RefSets};
use crate::models::{
    Club, ClubId, Event, EventId, EventLocation, LinkedEvent, LinkedEventId, Runner, User, UserId,
};
use crate::store::{EventFilter, Store};
use crate::validate::IdKind;
use crate::visibility::Memberships;

#[derive(Clone, Default)]
pub struct MemoryStore {
    data: Arc<RwLock<MemoryData>>,
}

#[derive(Default)]
struct MemoryData {
    events: BTreeMap<EventId, Event>,
    linked_events: BTreeMap<LinkedEventId, LinkedEvent>,
    users: BTreeMap<UserId, User>,
    clubs: BTreeMap<ClubId, Club>,
    next_id: i64,
    failing_field: Option<RefField>,
}

impl MemoryData {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, MemoryData>> {
        self.data
            .read()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".into()))
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, MemoryData>> {
        self.data
            .write()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".into()))
    }

    pub fn add_club(&self, short_name: &str) -> StoreResult<ClubId> {
        let mut data = self.write()?;
        let id = data.next_id();
        data.clubs.insert(
            id,
            Club {
                id,
                short_name: short_name.to_string(),
            },
        );
        Ok(id)
    }

    pub fn add_user(&self, name: &str, member_of: &[ClubId]) -> StoreResult<UserId> {
        let mut data = self.write()?;
        let id = data.next_id();
        data.users.insert(
            id,
            User {
                id,
                name: name.to_string(),
                member_of: member_of.iter().copied().collect(),
            },
        );
        Ok(id)
    }

    /// Makes every set write on `field` fail, to simulate a request dying
    /// between the primary write and the mirror step.
    pub fn fail_set_writes(&self, field: Option<RefField>) -> StoreResult<()> {
        self.write()?.failing_field = field;
        Ok(())
    }

    fn check_field(data: &MemoryData, field: RefField) -> StoreResult<()> {
        if data.failing_field == Some(field) {
            return Err(StoreError::Unavailable(format!("{:?} writes disabled", field)));
        }
        Ok(())
    }
}

fn duplicate_active(data: &MemoryData, event: &Event) -> bool {
    event.active
        && data.events.values().any(|other| {
            other.id != event.id
                && other.active
                && other.date == event.date
                && other.name == event.name
        })
}

impl RefSets for MemoryStore {
    fn add_to_set(&self, field: RefField, target: i64, value: i64) -> StoreResult<()> {
        let mut data = self.write()?;
        Self::check_field(&data, field)?;
        match field {
            RefField::EventLinkedTo => {
                if let Some(event) = data.events.get_mut(&target) {
                    event.linked_to.insert(value);
                }
            }
            RefField::LinkedEventIncludes => {
                if let Some(linked) = data.linked_events.get_mut(&target) {
                    linked.includes.insert(value);
                }
            }
        }
        Ok(())
    }

    fn pull_from_set(&self, field: RefField, target: i64, value: i64) -> StoreResult<()> {
        let mut data = self.write()?;
        Self::check_field(&data, field)?;
        match field {
            RefField::EventLinkedTo => {
                if let Some(event) = data.events.get_mut(&target) {
                    event.linked_to.remove(&value);
                }
            }
            RefField::LinkedEventIncludes => {
                if let Some(linked) = data.linked_events.get_mut(&target) {
                    linked.includes.remove(&value);
                }
            }
        }
        Ok(())
    }
}

impl Store for MemoryStore {
    fn existing_ids(&self, kind: IdKind, ids: &[i64]) -> StoreResult<BTreeSet<i64>> {
        let data = self.read()?;
        let exists = |id: &i64| match kind {
            IdKind::Event => data.events.get(id).map_or(false, |e| e.active),
            IdKind::LinkedEvent => data.linked_events.contains_key(id),
            IdKind::User => data.users.contains_key(id),
            IdKind::Club => data.clubs.contains_key(id),
        };
        Ok(ids.iter().copied().filter(|id| exists(id)).collect())
    }

    fn memberships(&self, users: &[UserId]) -> StoreResult<Memberships> {
        let data = self.read()?;
        Ok(users
            .iter()
            .filter_map(|id| data.users.get(id))
            .map(|user| (user.id, user.member_of.clone()))
            .collect())
    }

    fn find_event(&self, id: EventId) -> StoreResult<Option<Event>> {
        Ok(self.read()?.events.get(&id).cloned())
    }

    fn find_active_event(&self, date: &str, name: &str) -> StoreResult<Option<Event>> {
        Ok(self
            .read()?
            .events
            .values()
            .find(|e| e.active && e.date == date && e.name == name)
            .cloned())
    }

    fn find_events(&self, filter: &EventFilter) -> StoreResult<Vec<Event>> {
        let data = self.read()?;
        let mut events: Vec<Event> = data
            .events
            .values()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect();
        events.sort_by(|a, b| b.date.cmp(&a.date).then(a.id.cmp(&b.id)));
        Ok(events)
    }

    fn insert_event(&self, event: &Event) -> StoreResult<EventId> {
        let mut data = self.write()?;
        let mut event = event.clone();
        event.id = 0;
        if duplicate_active(&data, &event) {
            return Err(StoreError::Duplicate(format!(
                "event {} on {}",
                event.name, event.date
            )));
        }
        let id = data.next_id();
        event.id = id;
        data.events.insert(id, event);
        Ok(id)
    }

    fn replace_event_details(&self, event: &Event) -> StoreResult<bool> {
        let mut data = self.write()?;
        if duplicate_active(&data, event) {
            return Err(StoreError::Duplicate(format!(
                "event {} on {}",
                event.name, event.date
            )));
        }
        match data.events.get_mut(&event.id) {
            Some(stored) if stored.active => {
                let runners = std::mem::take(&mut stored.runners);
                let linked_to = std::mem::take(&mut stored.linked_to);
                let mut location = event.location;
                location.fill_from(&stored.location);
                *stored = Event {
                    runners,
                    linked_to,
                    location,
                    ..event.clone()
                };
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn soft_delete_event(
        &self,
        id: EventId,
        requester: UserId,
        suffix: &str,
    ) -> StoreResult<Option<Event>> {
        let mut data = self.write()?;
        match data.events.get_mut(&id) {
            Some(event) if event.active && event.runners.iter().all(|r| r.user == requester) => {
                event.name.push_str(suffix);
                if let Some(oris_id) = event.oris_id.as_mut() {
                    oris_id.push_str(suffix);
                }
                event.active = false;
                Ok(Some(event.clone()))
            }
            _ => Ok(None),
        }
    }

    fn fill_event_location(&self, id: EventId, location: &EventLocation) -> StoreResult<()> {
        if let Some(event) = self.write()?.events.get_mut(&id) {
            event.location.fill_from(location);
        }
        Ok(())
    }

    fn push_runner(&self, id: EventId, runner: &Runner) -> StoreResult<bool> {
        let mut data = self.write()?;
        match data.events.get_mut(&id) {
            Some(event) if event.active && !event.has_runner(runner.user) => {
                event.runners.push(runner.clone());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn replace_runner(&self, id: EventId, runner: &Runner) -> StoreResult<bool> {
        let mut data = self.write()?;
        let slot = data
            .events
            .get_mut(&id)
            .filter(|e| e.active)
            .and_then(|e| e.runners.iter_mut().find(|r| r.user == runner.user));
        match slot {
            Some(slot) => {
                *slot = runner.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn find_linked_event(&self, id: LinkedEventId) -> StoreResult<Option<LinkedEvent>> {
        Ok(self.read()?.linked_events.get(&id).cloned())
    }

    fn find_linked_events(&self) -> StoreResult<Vec<LinkedEvent>> {
        let mut linked: Vec<LinkedEvent> = self.read()?.linked_events.values().cloned().collect();
        linked.sort_by(|a, b| a.display_name.cmp(&b.display_name));
        Ok(linked)
    }

    fn insert_linked_event(&self, linked: &LinkedEvent) -> StoreResult<LinkedEventId> {
        let mut data = self.write()?;
        if data
            .linked_events
            .values()
            .any(|l| l.display_name == linked.display_name)
        {
            return Err(StoreError::Duplicate(format!(
                "linked event {}",
                linked.display_name
            )));
        }
        let id = data.next_id();
        let mut linked = linked.clone();
        linked.id = id;
        data.linked_events.insert(id, linked);
        Ok(id)
    }

    fn rename_linked_event(&self, id: LinkedEventId, display_name: &str) -> StoreResult<bool> {
        let mut data = self.write()?;
        if data
            .linked_events
            .values()
            .any(|l| l.id != id && l.display_name == display_name)
        {
            return Err(StoreError::Duplicate(format!("linked event {}", display_name)));
        }
        match data.linked_events.get_mut(&id) {
            Some(linked) => {
                linked.display_name = display_name.to_string();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn delete_linked_event(&self, id: LinkedEventId) -> StoreResult<bool> {
        Ok(self.write()?.linked_events.remove(&id).is_some())
    }
}

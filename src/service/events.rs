use std::collections::BTreeSet;

use chrono::Utc;
use log::{debug, info};
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::links::{self, compute_delta, LinkDelta, RefField};
use crate::models::{
    Event, EventDetails, EventId, EventLocation, EventSummary, LinkedEventId, UserId, Viewer,
};
use crate::service::{check_date, check_location, require_writer, required_text, Service};
use crate::store::{EventFilter, Store};
use crate::validate::{valid_ids, IdKind};
use crate::visibility::{project_runners, project_summaries};

/// Fields accepted when creating an event. Anything else in the request is
/// ignored.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewEvent {
    pub date: Option<String>,
    pub name: Option<String>,
    pub oris_id: Option<String>,
    #[serde(default)]
    pub organised_by: Vec<String>,
    #[serde(default)]
    pub linked_to: Vec<String>,
    #[serde(flatten)]
    pub details: EventDetails,
    #[serde(flatten)]
    pub location: EventLocation,
}

/// A partial update. `None` leaves a field as it is.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventUpdate {
    pub date: Option<String>,
    pub name: Option<String>,
    pub oris_id: Option<String>,
    pub organised_by: Option<Vec<String>>,
    pub linked_to: Option<Vec<String>>,
    pub map_name: Option<String>,
    pub loc_name: Option<String>,
    pub website: Option<String>,
    pub results: Option<String>,
    pub types: Option<Vec<String>>,
    pub tags: Option<Vec<String>>,
    #[serde(flatten)]
    pub location: EventLocation,
}

impl<S: Store> Service<S> {
    pub fn create_event(&self, viewer: &Viewer, input: NewEvent) -> Result<Event> {
        let owner = require_writer(viewer)?;
        let mut input = input;
        self.prefill_from_federation(&mut input)?;

        let date = required_text("date", input.date)?;
        check_date(&date)?;
        let name = required_text("name", input.name)?;
        check_location(&input.location)?;

        if self.store.find_active_event(&date, &name)?.is_some() {
            return Err(Error::Conflict(format!("event {} on {} already exists", name, date)));
        }

        let organised_by = valid_ids(&self.store, IdKind::Club, &input.organised_by)?;
        let linked_to = valid_ids(&self.store, IdKind::LinkedEvent, &input.linked_to)?;

        let mut event = Event {
            id: 0,
            date,
            name,
            owner,
            oris_id: input.oris_id,
            organised_by,
            linked_to: linked_to.clone(),
            details: input.details,
            location: input.location,
            runners: Vec::new(),
            active: true,
        };
        event.id = self.store.insert_event(&event)?;
        info!("event {} created: {} on {}", event.id, event.name, event.date);

        let delta = compute_delta(&BTreeSet::new(), Some(&linked_to));
        links::apply_mirror(&self.store, RefField::LinkedEventIncludes, event.id, &delta)?;
        Ok(event)
    }

    fn prefill_from_federation(&self, input: &mut NewEvent) -> Result<()> {
        let (oris_id, federation) = match (&input.oris_id, &self.federation) {
            (Some(oris_id), Some(federation)) => (oris_id, federation),
            _ => return Ok(()),
        };
        let found = federation
            .event(oris_id)?
            .ok_or_else(|| Error::NotFound(format!("federation event {}", oris_id)))?;
        debug!("prefilling event from federation event {}", found.oris_id);

        if input.date.is_none() {
            input.date = Some(found.date);
        }
        if input.name.is_none() {
            input.name = Some(found.name);
        }
        let details = &mut input.details;
        if details.map_name.is_none() {
            details.map_name = found.details.map_name;
        }
        if details.loc_name.is_none() {
            details.loc_name = found.details.loc_name;
        }
        if details.website.is_none() {
            details.website = found.details.website;
        }
        if details.results.is_none() {
            details.results = found.details.results;
        }
        if details.types.is_empty() {
            details.types = found.details.types;
        }
        Ok(())
    }

    /// The event with only the runners `viewer` may see.
    pub fn get_event(&self, viewer: &Viewer, id: EventId) -> Result<Event> {
        let mut event = self.load_event(id)?;
        if !event.active && !viewer.is_admin() {
            return Err(Error::NotFound(format!("event {}", id)));
        }
        let memberships = self.club_memberships(&event.runners)?;
        event.runners = project_runners(&event.runners, viewer, &memberships);
        Ok(event)
    }

    pub fn list_events(&self, viewer: &Viewer, filter: &EventFilter) -> Result<Vec<EventSummary>> {
        let mut filter = filter.clone();
        filter.include_inactive &= viewer.is_admin();

        let events = self.store.find_events(&filter)?;
        let memberships = self.club_memberships(events.iter().flat_map(|e| &e.runners))?;
        Ok(events
            .into_iter()
            .map(|event| EventSummary {
                runners: project_summaries(&event.runners, viewer, &memberships),
                id: event.id,
                date: event.date,
                name: event.name,
                organised_by: event.organised_by,
                linked_to: event.linked_to,
                loc_lat_long: event.location.loc_lat_long,
            })
            .collect())
    }

    /// Allowed for admins, the owner and anyone running in the event.
    pub fn update_event(&self, viewer: &Viewer, id: EventId, update: EventUpdate) -> Result<Event> {
        let user = require_writer(viewer)?;
        let mut event = self.load_active_event(id)?;
        if !(viewer.is_admin() || event.owner == user || event.has_runner(user)) {
            return Err(Error::Authorization(format!("cannot edit event {}", id)));
        }

        if let Some(date) = update.date {
            let date = required_text("date", Some(date))?;
            check_date(&date)?;
            event.date = date;
        }
        if let Some(name) = update.name {
            event.name = required_text("name", Some(name))?;
        }
        if let Some(other) = self.store.find_active_event(&event.date, &event.name)? {
            if other.id != id {
                return Err(Error::Conflict(format!(
                    "event {} on {} already exists",
                    event.name, event.date
                )));
            }
        }

        if update.oris_id.is_some() {
            event.oris_id = update.oris_id;
        }
        if let Some(clubs) = update.organised_by {
            event.organised_by = valid_ids(&self.store, IdKind::Club, &clubs)?;
        }
        let details = &mut event.details;
        if update.map_name.is_some() {
            details.map_name = update.map_name;
        }
        if update.loc_name.is_some() {
            details.loc_name = update.loc_name;
        }
        if update.website.is_some() {
            details.website = update.website;
        }
        if update.results.is_some() {
            details.results = update.results;
        }
        if let Some(types) = update.types {
            details.types = types;
        }
        if let Some(tags) = update.tags {
            details.tags = tags;
        }
        check_location(&update.location)?;
        overwrite_location(&mut event.location, &update.location);

        let new_links: Option<BTreeSet<LinkedEventId>> = match update.linked_to {
            Some(list) => Some(valid_ids(&self.store, IdKind::LinkedEvent, &list)?),
            None => None,
        };
        let delta = compute_delta(&event.linked_to, new_links.as_ref());

        if !self.store.replace_event_details(&event)? {
            return Err(Error::NotFound(format!("event {}", id)));
        }
        links::apply(&self.store, RefField::EventLinkedTo, id, &delta)?;
        info!("event {} updated by {}", id, user);

        self.get_event(viewer, id)
    }

    /// Soft delete. The name and federation id are tagged so the original
    /// date and name can be used again.
    pub fn delete_event(&self, viewer: &Viewer, id: EventId) -> Result<()> {
        let user = require_writer(viewer)?;
        let event = self.load_active_event(id)?;
        if !(viewer.is_admin() || event.owner == user) {
            return Err(Error::Authorization(format!("cannot delete event {}", id)));
        }
        check_sole_runner(&event, user)?;

        let tag = format!("-deleted-{}", Utc::now().timestamp_millis());
        let event = match self.store.soft_delete_event(id, user, &tag)? {
            Some(event) => event,
            // Someone joined or deleted it since it was loaded.
            None => {
                check_sole_runner(&self.load_active_event(id)?, user)?;
                return Err(Error::NotFound(format!("event {}", id)));
            }
        };
        let delta = LinkDelta::removing_all(&event.linked_to);
        links::apply(&self.store, RefField::EventLinkedTo, id, &delta)?;
        info!("event {} deleted by {}", id, user);
        Ok(())
    }
}

fn check_sole_runner(event: &Event, user: UserId) -> Result<()> {
    if event.runners.iter().any(|r| r.user != user) {
        return Err(Error::validation(
            "runners",
            "remove the other runners before deleting the event",
        ));
    }
    Ok(())
}

fn overwrite_location(location: &mut EventLocation, update: &EventLocation) {
    let pairs = [
        (&mut location.loc_lat_long, update.loc_lat_long),
        (&mut location.loc_corner_sw, update.loc_corner_sw),
        (&mut location.loc_corner_nw, update.loc_corner_nw),
        (&mut location.loc_corner_ne, update.loc_corner_ne),
        (&mut location.loc_corner_se, update.loc_corner_se),
    ];
    for (field, value) in pairs {
        if value.is_some() {
            *field = value;
        }
    }
}

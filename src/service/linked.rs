use std::collections::BTreeSet;

use log::info;
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::links::{self, compute_delta, LinkDelta, RefField};
use crate::models::{EventId, LinkedEvent, LinkedEventId, Viewer};
use crate::service::{require_writer, required_text, Service};
use crate::store::Store;
use crate::validate::{valid_ids, IdKind};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewLinkedEvent {
    pub display_name: Option<String>,
    #[serde(default)]
    pub includes: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkedEventUpdate {
    pub display_name: Option<String>,
    pub includes: Option<Vec<String>>,
}

impl<S: Store> Service<S> {
    pub fn create_linked_event(&self, viewer: &Viewer, input: NewLinkedEvent) -> Result<LinkedEvent> {
        require_writer(viewer)?;
        let display_name = required_text("displayName", input.display_name)?;
        let includes = valid_ids(&self.store, IdKind::Event, &input.includes)?;

        let mut linked = LinkedEvent {
            id: 0,
            display_name,
            includes: includes.clone(),
        };
        linked.id = self.store.insert_linked_event(&linked)?;
        info!("linked event {} created: {}", linked.id, linked.display_name);

        let delta = compute_delta(&BTreeSet::new(), Some(&includes));
        links::apply_mirror(&self.store, RefField::EventLinkedTo, linked.id, &delta)?;
        Ok(linked)
    }

    pub fn get_linked_event(&self, id: LinkedEventId) -> Result<LinkedEvent> {
        self.load_linked_event(id)
    }

    pub fn list_linked_events(&self) -> Result<Vec<LinkedEvent>> {
        Ok(self.store.find_linked_events()?)
    }

    pub fn update_linked_event(
        &self,
        viewer: &Viewer,
        id: LinkedEventId,
        update: LinkedEventUpdate,
    ) -> Result<LinkedEvent> {
        require_writer(viewer)?;
        let linked = self.load_linked_event(id)?;

        if let Some(name) = update.display_name {
            let name = required_text("displayName", Some(name))?;
            if name != linked.display_name && !self.store.rename_linked_event(id, &name)? {
                return Err(Error::NotFound(format!("linked event {}", id)));
            }
        }

        let new_includes: Option<BTreeSet<EventId>> = match update.includes {
            Some(list) => Some(valid_ids(&self.store, IdKind::Event, &list)?),
            None => None,
        };
        let delta = compute_delta(&linked.includes, new_includes.as_ref());
        links::apply(&self.store, RefField::LinkedEventIncludes, id, &delta)?;

        self.load_linked_event(id)
    }

    /// Admin only. Removes the linked event and its id from every event it
    /// included.
    pub fn delete_linked_event(&self, viewer: &Viewer, id: LinkedEventId) -> Result<()> {
        if !viewer.is_admin() {
            return Err(Error::Authorization("only admins can delete linked events".into()));
        }
        let linked = self.load_linked_event(id)?;
        if !self.store.delete_linked_event(id)? {
            return Err(Error::NotFound(format!("linked event {}", id)));
        }
        let delta = LinkDelta::removing_all(&linked.includes);
        links::apply_mirror(&self.store, RefField::EventLinkedTo, id, &delta)?;
        info!("linked event {} deleted", id);
        Ok(())
    }
}

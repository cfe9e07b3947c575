use std::collections::{BTreeMap, BTreeSet};

use log::{info, warn};

use crate::error::{Error, Result};
use crate::links::RefField;
use crate::models::{EventId, LinkedEventId};
use crate::service::Service;
use crate::store::{EventFilter, Store};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RepairReport {
    /// Missing reference entries written.
    pub added: usize,
    /// Stale reference entries pulled.
    pub pulled: usize,
}

impl RepairReport {
    pub fn is_clean(&self) -> bool {
        self.added == 0 && self.pulled == 0
    }
}

impl<S: Store> Service<S> {
    /// Brings `Event.linkedTo` and `LinkedEvent.includes` back in step.
    ///
    /// A reference recorded on either side counts as intended, as long as the
    /// event is active and the linked event exists. The missing half is
    /// written and references to deleted documents are pulled.
    pub fn repair_links(&self) -> Result<RepairReport> {
        let everything = EventFilter {
            include_inactive: true,
            ..Default::default()
        };
        let events = self.store.find_events(&everything)?;
        let linked_events = self.store.find_linked_events()?;

        let active: BTreeMap<EventId, &BTreeSet<LinkedEventId>> = events
            .iter()
            .filter(|e| e.active)
            .map(|e| (e.id, &e.linked_to))
            .collect();
        let includes: BTreeMap<LinkedEventId, &BTreeSet<EventId>> = linked_events
            .iter()
            .map(|l| (l.id, &l.includes))
            .collect();

        let mut report = RepairReport::default();

        for event in events.iter().filter(|e| !e.active) {
            for &linked in &event.linked_to {
                self.drop_ref(&mut report, RefField::EventLinkedTo, event.id, linked)?;
            }
        }

        for (&event, linked_to) in &active {
            for &linked in linked_to.iter() {
                match includes.get(&linked) {
                    None => self.drop_ref(&mut report, RefField::EventLinkedTo, event, linked)?,
                    Some(set) if !set.contains(&event) => {
                        self.restore_ref(&mut report, RefField::LinkedEventIncludes, linked, event)?
                    }
                    Some(_) => {}
                }
            }
        }

        for (&linked, included) in &includes {
            for &event in included.iter() {
                match active.get(&event) {
                    None => self.drop_ref(&mut report, RefField::LinkedEventIncludes, linked, event)?,
                    Some(set) if !set.contains(&linked) => {
                        self.restore_ref(&mut report, RefField::EventLinkedTo, event, linked)?
                    }
                    Some(_) => {}
                }
            }
        }

        info!(
            "link repair finished: {} added, {} pulled",
            report.added, report.pulled
        );
        Ok(report)
    }

    fn restore_ref(&self, report: &mut RepairReport, field: RefField, target: i64, value: i64) -> Result<()> {
        let problem = Error::InvariantRepairable(format!("{:?} of {} lacks {}", field, target, value));
        warn!("{}", problem);
        self.store.add_to_set(field, target, value)?;
        report.added += 1;
        Ok(())
    }

    fn drop_ref(&self, report: &mut RepairReport, field: RefField, target: i64, value: i64) -> Result<()> {
        let problem = Error::InvariantRepairable(format!(
            "{:?} of {} holds stale {}",
            field, target, value
        ));
        warn!("{}", problem);
        self.store.pull_from_set(field, target, value)?;
        report.pulled += 1;
        Ok(())
    }
}

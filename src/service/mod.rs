//! Request workflows for events, runners, maps and linked events.
//!
//! Every operation takes the [`Viewer`] explicitly. Mutations write the
//! primary document first and mirror reference changes afterwards; see
//! [`crate::links`] and [`Service::repair_links`].

use std::collections::BTreeSet;

use crate::error::{Error, Result};
use crate::federation::FederationSource;
use crate::models::{Event, EventId, EventLocation, LinkedEvent, LinkedEventId, Runner, UserId, Viewer, Visibility};
use crate::store::Store;
use crate::visibility::Memberships;

mod events;
mod linked;
mod repair;
mod runners;

pub use events::{EventUpdate, NewEvent};
pub use linked::{LinkedEventUpdate, NewLinkedEvent};
pub use repair::RepairReport;
pub use runners::{MapUpload, NewRunner, RunnerUpdate};

pub struct Service<S> {
    store: S,
    federation: Option<Box<dyn FederationSource + Send + Sync>>,
}

impl<S: Store> Service<S> {
    pub fn new(store: S) -> Self {
        Service {
            store,
            federation: None,
        }
    }

    pub fn with_federation<F>(mut self, federation: F) -> Self
    where
        F: FederationSource + Send + Sync + 'static,
    {
        self.federation = Some(Box::new(federation));
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn load_event(&self, id: EventId) -> Result<Event> {
        self.store
            .find_event(id)?
            .ok_or_else(|| Error::NotFound(format!("event {}", id)))
    }

    /// Soft-deleted events are gone as far as mutations are concerned.
    fn load_active_event(&self, id: EventId) -> Result<Event> {
        match self.load_event(id)? {
            event if event.active => Ok(event),
            _ => Err(Error::NotFound(format!("event {}", id))),
        }
    }

    fn load_linked_event(&self, id: LinkedEventId) -> Result<LinkedEvent> {
        self.store
            .find_linked_event(id)?
            .ok_or_else(|| Error::NotFound(format!("linked event {}", id)))
    }

    /// Memberships of the runners whose visibility depends on their clubs.
    fn club_memberships<'a, I>(&self, runners: I) -> Result<Memberships>
    where
        I: IntoIterator<Item = &'a Runner>,
    {
        let users: BTreeSet<UserId> = runners
            .into_iter()
            .filter(|r| r.visibility == Visibility::Club)
            .map(|r| r.user)
            .collect();
        if users.is_empty() {
            return Ok(Memberships::new());
        }
        let users: Vec<UserId> = users.into_iter().collect();
        Ok(self.store.memberships(&users)?)
    }
}

/// The id of a viewer allowed to write, or an authorisation error.
fn require_writer(viewer: &Viewer) -> Result<UserId> {
    match viewer.id {
        Some(id) if viewer.can_write() => Ok(id),
        _ => Err(Error::Authorization("sign in to make changes".into())),
    }
}

fn required_text(field: &'static str, value: Option<String>) -> Result<String> {
    match value.as_deref().map(str::trim) {
        Some(text) if !text.is_empty() => Ok(text.to_string()),
        _ => Err(Error::validation(field, "is required")),
    }
}

/// `YYYY-MM-DD` with a month of 01-12 and a day of 01-31. The day is not
/// checked against the month.
fn check_date(date: &str) -> Result<()> {
    let bytes = date.as_bytes();
    let shape_ok = bytes.len() == 10
        && bytes[4] == b'-'
        && bytes[7] == b'-'
        && bytes
            .iter()
            .enumerate()
            .all(|(i, b)| i == 4 || i == 7 || b.is_ascii_digit());
    if !shape_ok {
        return Err(Error::validation("date", format!("{:?} is not YYYY-MM-DD", date)));
    }

    let month: u32 = date[5..7].parse().unwrap_or(0);
    let day: u32 = date[8..10].parse().unwrap_or(0);
    if !(1..=12).contains(&month) || !(1..=31).contains(&day) {
        return Err(Error::validation("date", format!("{:?} is not a calendar date", date)));
    }
    Ok(())
}

fn check_location(location: &EventLocation) -> Result<()> {
    let fields = [
        location.loc_lat_long,
        location.loc_corner_sw,
        location.loc_corner_nw,
        location.loc_corner_ne,
        location.loc_corner_se,
    ];
    if fields.iter().flatten().all(|p| p.is_valid()) {
        Ok(())
    } else {
        Err(Error::validation("location", "coordinates out of range"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{LatLong, Role};

    #[test]
    fn dates_are_checked_for_shape_only() {
        assert!(check_date("2024-05-01").is_ok());
        assert!(check_date("2023-02-30").is_ok());
        assert!(check_date("2024-13-01").is_err());
        assert!(check_date("2024-00-10").is_err());
        assert!(check_date("2024-01-32").is_err());
        assert!(check_date("24-05-01").is_err());
        assert!(check_date("2024/05/01").is_err());
        assert!(check_date("2024-5-1").is_err());
    }

    #[test]
    fn writers_need_a_full_account() {
        assert!(require_writer(&Viewer::anonymous()).is_err());
        assert!(require_writer(&Viewer::user(4, Role::Guest, None)).is_err());
        assert_eq!(require_writer(&Viewer::user(4, Role::Standard, None)).unwrap(), 4);
    }

    #[test]
    fn text_is_trimmed_and_required() {
        assert_eq!(required_text("name", Some("  Night ".into())).unwrap(), "Night");
        assert!(required_text("name", Some("   ".into())).is_err());
        assert!(required_text("name", None).is_err());
    }

    #[test]
    fn location_rejects_bad_coordinates() {
        let mut location = EventLocation {
            loc_lat_long: Some(LatLong::new(59.0, 18.0)),
            ..Default::default()
        };
        assert!(check_location(&location).is_ok());
        location.loc_corner_ne = Some(LatLong::new(59.0, 200.0));
        assert!(check_location(&location).is_err());
    }
}

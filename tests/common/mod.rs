#![allow(dead_code)]

use kartbok::models::{ClubId, Event, Role, Viewer};
use kartbok::service::{NewEvent, NewLinkedEvent};
use kartbok::{MemoryStore, Service};

pub fn service() -> Service<MemoryStore> {
    Service::new(MemoryStore::new())
}

/// Registers a user and returns a standard viewer for them.
pub fn member(service: &Service<MemoryStore>, name: &str, clubs: &[ClubId]) -> Viewer {
    let id = service.store().add_user(name, clubs).unwrap();
    Viewer::user(id, Role::Standard, clubs.iter().copied())
}

pub fn new_event(date: &str, name: &str) -> NewEvent {
    NewEvent {
        date: Some(date.to_string()),
        name: Some(name.to_string()),
        ..Default::default()
    }
}

pub fn create_event(service: &Service<MemoryStore>, viewer: &Viewer, date: &str, name: &str) -> Event {
    service.create_event(viewer, new_event(date, name)).unwrap()
}

pub fn new_linked(name: &str, includes: &[i64]) -> NewLinkedEvent {
    NewLinkedEvent {
        display_name: Some(name.to_string()),
        includes: includes.iter().map(|id| id.to_string()).collect(),
    }
}

mod common;

use kartbok::federation::{FederationError, FederationEvent, FederationSource};
use kartbok::models::{CourseResult, EventDetails, Role, Runner, UserId, Viewer, Visibility};
use kartbok::service::{EventUpdate, NewRunner};
use kartbok::{Error, EventFilter, MemoryStore, Service, Store};

use common::{create_event, member, new_event, service};

#[test]
fn same_date_and_name_is_a_conflict() {
    let service = service();
    let ann = member(&service, "Ann", &[]);
    create_event(&service, &ann, "2024-05-01", "Sprint");

    let again = service.create_event(&ann, new_event("2024-05-01", "Sprint"));
    assert!(matches!(again, Err(Error::Conflict(_))));

    let other_day = service.create_event(&ann, new_event("2024-05-02", "Sprint"));
    assert!(other_day.is_ok());
}

#[test]
fn create_requires_date_and_name() {
    let service = service();
    let ann = member(&service, "Ann", &[]);

    let mut input = new_event("2024-05-01", "Sprint");
    input.name = Some("  ".into());
    assert!(matches!(
        service.create_event(&ann, input),
        Err(Error::Validation { field: "name", .. })
    ));

    let input = new_event("1 May", "Sprint");
    assert!(matches!(
        service.create_event(&ann, input),
        Err(Error::Validation { field: "date", .. })
    ));
}

#[test]
fn anonymous_and_guest_cannot_create() {
    let service = service();
    let input = new_event("2024-05-01", "Sprint");
    assert!(matches!(
        service.create_event(&Viewer::anonymous(), input.clone()),
        Err(Error::Authorization(_))
    ));
    assert!(matches!(
        service.create_event(&Viewer::user(3, Role::Guest, None), input),
        Err(Error::Authorization(_))
    ));
}

#[test]
fn unknown_clubs_and_links_are_dropped() {
    let service = service();
    let club = service.store().add_club("OK Linne").unwrap();
    let ann = member(&service, "Ann", &[club]);

    let mut input = new_event("2024-05-01", "Sprint");
    input.organised_by = vec![club.to_string(), "999".into(), "abc".into()];
    input.linked_to = vec!["12345".into()];
    let event = service.create_event(&ann, input).unwrap();

    assert_eq!(event.organised_by.into_iter().collect::<Vec<_>>(), vec![club]);
    assert!(event.linked_to.is_empty());
}

#[test]
fn delete_refused_while_others_run() {
    let service = service();
    let ann = member(&service, "Ann", &[]);
    let bo = member(&service, "Bo", &[]);
    let event = create_event(&service, &ann, "2024-05-01", "Sprint");
    service.add_runner(&ann, event.id, NewRunner::default()).unwrap();
    service.add_runner(&bo, event.id, NewRunner::default()).unwrap();

    assert!(matches!(
        service.delete_event(&ann, event.id),
        Err(Error::Validation { field: "runners", .. })
    ));
    assert!(service.get_event(&ann, event.id).unwrap().active);
}

#[test]
fn delete_frees_the_date_and_name() {
    let service = service();
    let ann = member(&service, "Ann", &[]);
    let mut input = new_event("2024-05-01", "Sprint");
    input.oris_id = Some("4711".into());
    let event = service.create_event(&ann, input).unwrap();
    service.add_runner(&ann, event.id, NewRunner::default()).unwrap();

    service.delete_event(&ann, event.id).unwrap();

    assert!(matches!(service.get_event(&ann, event.id), Err(Error::NotFound(_))));
    let stored = service.get_event(&Viewer::admin(1), event.id).unwrap();
    assert!(!stored.active);
    assert!(stored.name.starts_with("Sprint-deleted-"));
    assert!(stored.oris_id.unwrap().starts_with("4711-deleted-"));

    create_event(&service, &ann, "2024-05-01", "Sprint");
}

#[test]
fn deleted_event_stays_deleted_under_late_writes() {
    let service = service();
    let ann = member(&service, "Ann", &[]);
    let bo = member(&service, "Bo", &[]);
    let event = create_event(&service, &ann, "2024-05-01", "Sprint");
    let snapshot = service.store().find_event(event.id).unwrap().unwrap();

    service.delete_event(&ann, event.id).unwrap();

    // A detail update and a runner join that loaded the event before it went.
    assert!(!service.store().replace_event_details(&snapshot).unwrap());
    let late = Runner::new(bo.id.unwrap(), Visibility::All);
    assert!(!service.store().push_runner(event.id, &late).unwrap());

    let stored = service.get_event(&Viewer::admin(1), event.id).unwrap();
    assert!(!stored.active);
    assert!(stored.name.starts_with("Sprint-deleted-"));
    assert!(stored.runners.is_empty());
    assert!(matches!(
        service.add_runner(&bo, event.id, NewRunner::default()),
        Err(Error::NotFound(_))
    ));
}

#[test]
fn only_owner_or_admin_deletes() {
    let service = service();
    let ann = member(&service, "Ann", &[]);
    let bo = member(&service, "Bo", &[]);
    let event = create_event(&service, &ann, "2024-05-01", "Sprint");

    assert!(matches!(
        service.delete_event(&bo, event.id),
        Err(Error::Authorization(_))
    ));
    service.delete_event(&Viewer::admin(99), event.id).unwrap();
}

#[test]
fn runners_may_update_details() {
    let service = service();
    let ann = member(&service, "Ann", &[]);
    let bo = member(&service, "Bo", &[]);
    let cy = member(&service, "Cy", &[]);
    let event = create_event(&service, &ann, "2024-05-01", "Sprint");
    service.add_runner(&bo, event.id, NewRunner::default()).unwrap();

    let update = EventUpdate {
        map_name: Some("Old Town".into()),
        ..Default::default()
    };
    assert!(matches!(
        service.update_event(&cy, event.id, update.clone()),
        Err(Error::Authorization(_))
    ));

    let updated = service.update_event(&bo, event.id, update).unwrap();
    assert_eq!(updated.details.map_name.as_deref(), Some("Old Town"));
    assert_eq!(updated.runners.len(), 1);
}

#[test]
fn rename_onto_existing_event_conflicts() {
    let service = service();
    let ann = member(&service, "Ann", &[]);
    create_event(&service, &ann, "2024-05-01", "Sprint");
    let middle = create_event(&service, &ann, "2024-05-01", "Middle");

    let update = EventUpdate {
        name: Some("Sprint".into()),
        ..Default::default()
    };
    assert!(matches!(
        service.update_event(&ann, middle.id, update),
        Err(Error::Conflict(_))
    ));
}

#[test]
fn add_runner_twice_conflicts() {
    let service = service();
    let ann = member(&service, "Ann", &[]);
    let event = create_event(&service, &ann, "2024-05-01", "Sprint");
    service.add_runner(&ann, event.id, NewRunner::default()).unwrap();

    assert!(matches!(
        service.add_runner(&ann, event.id, NewRunner::default()),
        Err(Error::Conflict(_))
    ));
}

#[test]
fn comments_need_a_visible_runner() {
    let service = service();
    let ann = member(&service, "Ann", &[]);
    let bo = member(&service, "Bo", &[]);
    let event = create_event(&service, &ann, "2024-05-01", "Sprint");
    let ann_id = ann.id.unwrap();

    let hidden = NewRunner {
        visibility: Some(Visibility::Private),
        ..Default::default()
    };
    service.add_runner(&ann, event.id, hidden).unwrap();
    assert!(matches!(
        service.add_comment(&bo, event.id, ann_id, "nice run"),
        Err(Error::NotFound(_))
    ));

    let comment = service.add_comment(&ann, event.id, ann_id, " lost at 7 ").unwrap();
    assert_eq!(comment.text, "lost at 7");
    assert_eq!(comment.author, ann_id);
    let stored = service.get_event(&ann, event.id).unwrap();
    assert_eq!(stored.runners[0].comments.len(), 1);
}

#[test]
fn list_is_newest_first_and_hides_deleted() {
    let service = service();
    let ann = member(&service, "Ann", &[]);
    let first = create_event(&service, &ann, "2024-04-01", "Long");
    let second = create_event(&service, &ann, "2024-05-01", "Sprint");
    let gone = create_event(&service, &ann, "2024-06-01", "Night");
    service.delete_event(&ann, gone.id).unwrap();

    let ids: Vec<_> = service
        .list_events(&ann, &EventFilter::default())
        .unwrap()
        .iter()
        .map(|e| e.id)
        .collect();
    assert_eq!(ids, vec![second.id, first.id]);

    let everything = EventFilter {
        include_inactive: true,
        ..Default::default()
    };
    assert_eq!(service.list_events(&ann, &everything).unwrap().len(), 2);
    assert_eq!(service.list_events(&Viewer::admin(1), &everything).unwrap().len(), 3);
}

struct FakeFederation {
    fail: bool,
}

impl FederationSource for FakeFederation {
    fn event(&self, oris_id: &str) -> Result<Option<FederationEvent>, FederationError> {
        if self.fail {
            return Err(FederationError::Request("connection refused".into()));
        }
        if oris_id != "7000" {
            return Ok(None);
        }
        Ok(Some(FederationEvent {
            oris_id: oris_id.to_string(),
            date: "2024-08-10".into(),
            name: "Czech Cup".into(),
            details: EventDetails {
                map_name: Some("Kokořínsko".into()),
                types: vec!["middle".into()],
                ..Default::default()
            },
        }))
    }

    fn result(&self, _oris_event_id: &str, _user: UserId) -> Result<Option<CourseResult>, FederationError> {
        Ok(Some(CourseResult {
            course_title: Some("H21A".into()),
            place: Some("12".into()),
            ..Default::default()
        }))
    }
}

fn federated(fail: bool) -> Service<MemoryStore> {
    Service::new(MemoryStore::new()).with_federation(FakeFederation { fail })
}

#[test]
fn federation_prefills_missing_fields() {
    let service = federated(false);
    let ann = member(&service, "Ann", &[]);
    let input = kartbok::service::NewEvent {
        oris_id: Some("7000".into()),
        name: Some("Local name".into()),
        ..Default::default()
    };
    let event = service.create_event(&ann, input).unwrap();
    assert_eq!(event.date, "2024-08-10");
    assert_eq!(event.name, "Local name");
    assert_eq!(event.details.map_name.as_deref(), Some("Kokořínsko"));

    let own = NewRunner {
        course: CourseResult {
            place: Some("3".into()),
            ..Default::default()
        },
        ..Default::default()
    };
    let runner = service.add_runner(&ann, event.id, own).unwrap();
    assert_eq!(runner.course.course_title.as_deref(), Some("H21A"));
    assert_eq!(runner.course.place.as_deref(), Some("3"));
}

#[test]
fn federation_failure_is_upstream() {
    let service = federated(true);
    let ann = member(&service, "Ann", &[]);
    let input = kartbok::service::NewEvent {
        oris_id: Some("7000".into()),
        ..Default::default()
    };
    assert!(matches!(service.create_event(&ann, input), Err(Error::Upstream(_))));
}

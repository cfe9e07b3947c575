use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type EventId = i64;
pub type LinkedEventId = i64;
pub type UserId = i64;
pub type ClubId = i64;

pub const DEFAULT_MAP_TITLE: &str = "map";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLong {
    pub lat: f64,
    pub long: f64,
}

impl LatLong {
    pub fn new(lat: f64, long: f64) -> LatLong {
        LatLong { lat, long }
    }

    pub fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.lat) && (-180.0..=180.0).contains(&self.long)
    }
}

/// Four corner values in south-west, north-west, north-east, south-east order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Corners<T> {
    pub sw: T,
    pub nw: T,
    pub ne: T,
    pub se: T,
}

impl<T: Copy> Corners<T> {
    pub fn to_array(&self) -> [T; 4] {
        [self.sw, self.nw, self.ne, self.se]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelPoint {
    pub x: u32,
    pub y: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeoInfo {
    pub track: Vec<LatLong>,
    pub distance_run: f64,
    pub map_centre: LatLong,
    pub map_corners: Corners<LatLong>,
    pub image_corners: Corners<PixelPoint>,
    pub location_size_pixels: PixelRect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MapKind {
    Course,
    Route,
    Overlay,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapRecord {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub course: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overlay: Option<String>,
    #[serde(default)]
    pub is_geocoded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geo: Option<GeoInfo>,
}

impl MapRecord {
    pub fn new(title: &str) -> MapRecord {
        MapRecord {
            title: title.to_string(),
            course: None,
            route: None,
            overlay: None,
            is_geocoded: false,
            geo: None,
        }
    }

    pub fn set_file(&mut self, kind: MapKind, file: String) {
        match kind {
            MapKind::Course => self.course = Some(file),
            MapKind::Route => self.route = Some(file),
            MapKind::Overlay => self.overlay = Some(file),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub author: UserId,
    pub text: String,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    All,
    Club,
    Private,
}

impl Default for Visibility {
    fn default() -> Self {
        Visibility::All
    }
}

/// One user's participation in an event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Runner {
    pub user: UserId,
    #[serde(default)]
    pub visibility: Visibility,
    #[serde(flatten)]
    pub course: CourseResult,
    #[serde(default)]
    pub maps: Vec<MapRecord>,
    #[serde(default)]
    pub comments: Vec<Comment>,
}

impl Runner {
    pub fn new(user: UserId, visibility: Visibility) -> Runner {
        Runner {
            user,
            visibility,
            course: CourseResult::default(),
            maps: Vec::new(),
            comments: Vec::new(),
        }
    }

    pub fn map(&self, title: &str) -> Option<&MapRecord> {
        self.maps.iter().find(|m| m.title == title)
    }

    pub fn map_mut(&mut self, title: &str) -> Option<&mut MapRecord> {
        self.maps.iter_mut().find(|m| m.title == title)
    }
}

/// Course and result metadata a runner may record. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub course_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub course_length: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub course_climb: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub course_controls: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_results: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub place: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_behind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_size: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance_run: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

impl CourseResult {
    /// Overwrites the fields set in `other`, leaving the rest alone.
    pub fn merge(&mut self, other: CourseResult) {
        fn take<T>(dst: &mut Option<T>, src: Option<T>) {
            if src.is_some() {
                *dst = src;
            }
        }
        take(&mut self.course_title, other.course_title);
        take(&mut self.course_length, other.course_length);
        take(&mut self.course_climb, other.course_climb);
        take(&mut self.course_controls, other.course_controls);
        take(&mut self.full_results, other.full_results);
        take(&mut self.time, other.time);
        take(&mut self.place, other.place);
        take(&mut self.time_behind, other.time_behind);
        take(&mut self.field_size, other.field_size);
        take(&mut self.distance_run, other.distance_run);
        take(&mut self.tags, other.tags);
    }

    /// Fills only the fields that are still empty.
    pub fn fill_missing(&mut self, other: CourseResult) {
        let mut filled = other;
        filled.merge(self.clone());
        *self = filled;
    }
}

/// Geographic fields of an event. Absent fields are not serialized, so a
/// stored document can be completed without touching fields already set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventLocation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loc_lat_long: Option<LatLong>,
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "locCornerSW")]
    pub loc_corner_sw: Option<LatLong>,
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "locCornerNW")]
    pub loc_corner_nw: Option<LatLong>,
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "locCornerNE")]
    pub loc_corner_ne: Option<LatLong>,
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "locCornerSE")]
    pub loc_corner_se: Option<LatLong>,
}

impl EventLocation {
    pub fn from_geo(geo: &GeoInfo) -> EventLocation {
        EventLocation {
            loc_lat_long: Some(geo.map_centre),
            loc_corner_sw: Some(geo.map_corners.sw),
            loc_corner_nw: Some(geo.map_corners.nw),
            loc_corner_ne: Some(geo.map_corners.ne),
            loc_corner_se: Some(geo.map_corners.se),
        }
    }

    /// Sets every field of `self` that is still empty from `other`.
    /// Returns true when anything changed.
    pub fn fill_from(&mut self, other: &EventLocation) -> bool {
        fn fill(dst: &mut Option<LatLong>, src: Option<LatLong>) -> bool {
            match (dst.is_none(), src) {
                (true, Some(val)) => {
                    *dst = Some(val);
                    true
                }
                _ => false,
            }
        }
        let mut changed = fill(&mut self.loc_lat_long, other.loc_lat_long);
        changed |= fill(&mut self.loc_corner_sw, other.loc_corner_sw);
        changed |= fill(&mut self.loc_corner_nw, other.loc_corner_nw);
        changed |= fill(&mut self.loc_corner_ne, other.loc_corner_ne);
        changed |= fill(&mut self.loc_corner_se, other.loc_corner_se);
        changed
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub map_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loc_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub types: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    #[serde(default)]
    pub id: EventId,
    pub date: String,
    pub name: String,
    pub owner: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oris_id: Option<String>,
    #[serde(default)]
    pub organised_by: BTreeSet<ClubId>,
    #[serde(default)]
    pub linked_to: BTreeSet<LinkedEventId>,
    #[serde(flatten)]
    pub details: EventDetails,
    #[serde(flatten)]
    pub location: EventLocation,
    #[serde(default)]
    pub runners: Vec<Runner>,
    pub active: bool,
}

impl Event {
    pub fn runner(&self, user: UserId) -> Option<&Runner> {
        self.runners.iter().find(|r| r.user == user)
    }

    pub fn has_runner(&self, user: UserId) -> bool {
        self.runner(user).is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkedEvent {
    #[serde(default)]
    pub id: LinkedEventId,
    pub display_name: String,
    #[serde(default)]
    pub includes: BTreeSet<EventId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub name: String,
    #[serde(default)]
    pub member_of: BTreeSet<ClubId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Club {
    pub id: ClubId,
    pub short_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Anonymous,
    Guest,
    Standard,
    Admin,
}

/// Who is asking. Passed explicitly into every read and mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct Viewer {
    pub role: Role,
    pub id: Option<UserId>,
    pub clubs: BTreeSet<ClubId>,
}

impl Viewer {
    pub fn anonymous() -> Viewer {
        Viewer {
            role: Role::Anonymous,
            id: None,
            clubs: BTreeSet::new(),
        }
    }

    pub fn user(id: UserId, role: Role, clubs: impl IntoIterator<Item = ClubId>) -> Viewer {
        Viewer {
            role,
            id: Some(id),
            clubs: clubs.into_iter().collect(),
        }
    }

    pub fn admin(id: UserId) -> Viewer {
        Viewer::user(id, Role::Admin, None)
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn is_authenticated(&self) -> bool {
        self.role != Role::Anonymous && self.id.is_some()
    }

    /// Guests may read but never write.
    pub fn can_write(&self) -> bool {
        matches!(self.role, Role::Standard | Role::Admin) && self.id.is_some()
    }

    pub fn is(&self, user: UserId) -> bool {
        self.is_authenticated() && self.id == Some(user)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunnerSummary {
    pub user: UserId,
    pub visibility: Visibility,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub course_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub place: Option<String>,
    pub map_count: usize,
    pub geocoded: bool,
}

impl RunnerSummary {
    pub fn of(runner: &Runner) -> RunnerSummary {
        RunnerSummary {
            user: runner.user,
            visibility: runner.visibility,
            course_title: runner.course.course_title.clone(),
            time: runner.course.time.clone(),
            place: runner.course.place.clone(),
            map_count: runner.maps.len(),
            geocoded: runner.maps.iter().any(|m| m.is_geocoded),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventSummary {
    pub id: EventId,
    pub date: String,
    pub name: String,
    pub organised_by: BTreeSet<ClubId>,
    pub linked_to: BTreeSet<LinkedEventId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loc_lat_long: Option<LatLong>,
    pub runners: Vec<RunnerSummary>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runner_ignores_unknown_fields() {
        let runner: Runner = serde_json::from_str(
            r#"{"user": 7, "visibility": "club", "courseTitle": "Brown", "password": "x"}"#,
        )
        .unwrap();
        assert_eq!(runner.user, 7);
        assert_eq!(runner.visibility, Visibility::Club);
        assert_eq!(runner.course.course_title.as_deref(), Some("Brown"));
        assert!(runner.maps.is_empty());
    }

    #[test]
    fn location_fill_keeps_existing_values() {
        let mut loc = EventLocation {
            loc_lat_long: Some(LatLong::new(1.0, 2.0)),
            ..Default::default()
        };
        let other = EventLocation {
            loc_lat_long: Some(LatLong::new(5.0, 5.0)),
            loc_corner_sw: Some(LatLong::new(0.5, 1.5)),
            ..Default::default()
        };
        assert!(loc.fill_from(&other));
        assert_eq!(loc.loc_lat_long, Some(LatLong::new(1.0, 2.0)));
        assert_eq!(loc.loc_corner_sw, Some(LatLong::new(0.5, 1.5)));
        assert!(!loc.fill_from(&other));
    }

    #[test]
    fn event_location_serializes_corner_names() {
        let loc = EventLocation {
            loc_corner_ne: Some(LatLong::new(1.0, 2.0)),
            ..Default::default()
        };
        let json = serde_json::to_value(loc).unwrap();
        assert_eq!(json, serde_json::json!({"locCornerNE": {"lat": 1.0, "long": 2.0}}));
    }

    #[test]
    fn course_fill_missing_prefers_existing() {
        let mut course = CourseResult {
            time: Some("45:10".into()),
            ..Default::default()
        };
        course.fill_missing(CourseResult {
            time: Some("50:00".into()),
            place: Some("3".into()),
            ..Default::default()
        });
        assert_eq!(course.time.as_deref(), Some("45:10"));
        assert_eq!(course.place.as_deref(), Some("3"));
    }

    #[test]
    fn guest_is_authenticated_but_cannot_write() {
        let guest = Viewer::user(3, Role::Guest, None);
        assert!(guest.is_authenticated());
        assert!(!guest.can_write());
        assert!(!Viewer::anonymous().is_authenticated());
        assert!(!Viewer::anonymous().is(0));
    }
}

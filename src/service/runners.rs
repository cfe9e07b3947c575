use chrono::Utc;
use log::{info, warn};
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::gpx::parse_gpx;
use crate::models::{
    Comment, CourseResult, EventId, EventLocation, MapKind, MapRecord, Runner, UserId,
    Viewer, Visibility, DEFAULT_MAP_TITLE,
};
use crate::quickroute;
use crate::service::{require_writer, Service};
use crate::store::Store;
use crate::track::{geo_info, track_distance_km};
use crate::validate::IdKind;
use crate::visibility::can_view;

/// Fields a runner may set about themselves. Anything else is dropped.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRunner {
    pub visibility: Option<Visibility>,
    #[serde(flatten)]
    pub course: CourseResult,
}

/// Set fields overwrite, absent ones are kept.
pub type RunnerUpdate = NewRunner;

#[derive(Debug, Clone)]
pub struct MapUpload {
    /// Defaults to `"map"`.
    pub title: Option<String>,
    pub kind: MapKind,
    /// Reference to the stored image file.
    pub file: String,
    pub image: Vec<u8>,
}

impl<S: Store> Service<S> {
    pub fn add_runner(&self, viewer: &Viewer, event_id: EventId, input: NewRunner) -> Result<Runner> {
        let user = require_writer(viewer)?;
        if self.store.existing_ids(IdKind::User, &[user])?.is_empty() {
            return Err(Error::validation("user", format!("unknown user {}", user)));
        }

        let event = self.load_active_event(event_id)?;
        if event.has_runner(user) {
            return Err(Error::Conflict(format!(
                "user {} already runs in event {}",
                user, event_id
            )));
        }

        let mut runner = Runner::new(user, input.visibility.unwrap_or_default());
        runner.course = input.course;
        if let (Some(oris_id), Some(federation)) = (&event.oris_id, &self.federation) {
            if let Some(result) = federation.result(oris_id, user)? {
                runner.course.fill_missing(result);
            }
        }

        if !self.store.push_runner(event_id, &runner)? {
            // Deleted meanwhile, or the same user was added concurrently.
            self.load_active_event(event_id)?;
            return Err(Error::Conflict(format!(
                "user {} already runs in event {}",
                user, event_id
            )));
        }
        info!("user {} added to event {}", user, event_id);
        Ok(runner)
    }

    /// Only the runner themselves or an admin; co-runners may not.
    pub fn update_runner(
        &self,
        viewer: &Viewer,
        event_id: EventId,
        user: UserId,
        update: RunnerUpdate,
    ) -> Result<Runner> {
        let mut runner = self.editable_runner(viewer, event_id, user)?;
        if let Some(visibility) = update.visibility {
            runner.visibility = visibility;
        }
        runner.course.merge(update.course);
        self.save_runner(event_id, &runner)?;
        Ok(runner)
    }

    /// Stores an uploaded image on the runner's map record of the same title.
    /// Only the file of `upload.kind` is replaced. A georeferenced image also
    /// sets the record's geo block and fills the event's missing location.
    pub fn attach_map(
        &self,
        viewer: &Viewer,
        event_id: EventId,
        user: UserId,
        upload: MapUpload,
    ) -> Result<MapRecord> {
        let mut runner = self.editable_runner(viewer, event_id, user)?;

        let geo = match quickroute::extract(&upload.image) {
            Ok(payload) => payload.map(geo_info),
            Err(err) => {
                warn!("ignoring georeferencing of {}: {}", upload.file, err);
                None
            }
        };

        let title = match upload.title.as_deref().map(str::trim) {
            Some(title) if !title.is_empty() => title.to_string(),
            _ => DEFAULT_MAP_TITLE.to_string(),
        };
        if runner.map(&title).is_none() {
            runner.maps.push(MapRecord::new(&title));
        }
        let record = runner
            .map_mut(&title)
            .ok_or_else(|| Error::NotFound(format!("map {}", title)))?;
        record.set_file(upload.kind, upload.file);
        if let Some(geo) = &geo {
            record.is_geocoded = true;
            record.geo = Some(geo.clone());
        }
        let record = record.clone();

        self.save_runner(event_id, &runner)?;
        if let Some(geo) = &geo {
            self.store
                .fill_event_location(event_id, &EventLocation::from_geo(geo))?;
        }
        Ok(record)
    }

    /// Replaces the track of a geocoded map with one read from a GPX file.
    pub fn attach_gpx_track(
        &self,
        viewer: &Viewer,
        event_id: EventId,
        user: UserId,
        title: &str,
        gpx: &[u8],
    ) -> Result<MapRecord> {
        let mut runner = self.editable_runner(viewer, event_id, user)?;
        let track = parse_gpx(gpx).map_err(|err| Error::validation("gpx", err.to_string()))?;

        let record = runner
            .map_mut(title)
            .ok_or_else(|| Error::NotFound(format!("map {}", title)))?;
        let geo = record
            .geo
            .as_mut()
            .ok_or_else(|| Error::validation("map", format!("map {} is not geocoded", title)))?;
        geo.distance_run = track_distance_km(&track);
        geo.track = track;
        let record = record.clone();

        self.save_runner(event_id, &runner)?;
        Ok(record)
    }

    /// Comments can be left by any full account that can see the runner.
    pub fn add_comment(
        &self,
        viewer: &Viewer,
        event_id: EventId,
        user: UserId,
        text: &str,
    ) -> Result<Comment> {
        let author = require_writer(viewer)?;
        let text = text.trim();
        if text.is_empty() {
            return Err(Error::validation("text", "is required"));
        }

        let event = self.load_active_event(event_id)?;
        let runner = event
            .runner(user)
            .ok_or_else(|| Error::NotFound(format!("runner {}", user)))?;
        let memberships = self.club_memberships(Some(runner))?;
        if !can_view(viewer, runner, memberships.get(&runner.user)) {
            return Err(Error::NotFound(format!("runner {}", user)));
        }

        let now = Utc::now();
        let comment = Comment {
            author,
            text: text.to_string(),
            created: now,
            updated: now,
        };
        let mut runner = runner.clone();
        runner.comments.push(comment.clone());
        self.save_runner(event_id, &runner)?;
        Ok(comment)
    }

    fn editable_runner(&self, viewer: &Viewer, event_id: EventId, user: UserId) -> Result<Runner> {
        require_writer(viewer)?;
        if !(viewer.is_admin() || viewer.is(user)) {
            return Err(Error::Authorization(format!("cannot edit runner {}", user)));
        }
        self.load_active_event(event_id)?
            .runner(user)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("runner {} in event {}", user, event_id)))
    }

    fn save_runner(&self, event_id: EventId, runner: &Runner) -> Result<()> {
        if !self.store.replace_runner(event_id, runner)? {
            return Err(Error::NotFound(format!(
                "runner {} in event {}",
                runner.user, event_id
            )));
        }
        Ok(())
    }
}

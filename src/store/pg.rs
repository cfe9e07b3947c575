//! PostgreSQL store. Events and linked events live in JSONB documents; every
//! narrow write in [`Store`] is a single `UPDATE` so concurrent requests are
//! serialised by the row lock rather than by read-modify-write in Rust.

use std::collections::BTreeSet;

use log::info;
use postgres::error::SqlState;
use postgres::types::Json;
use postgres::{NoTls, Row};
use r2d2::Pool;
use r2d2_postgres::PostgresConnectionManager;

use crate::config::Config;
use crate::error::{StoreError, StoreResult};
use crate::links::{RefField, RefSets};
use crate::models::{Event, EventId, EventLocation, LinkedEvent, LinkedEventId, Runner, UserId};
use crate::store::{EventFilter, Store};
use crate::validate::IdKind;
use crate::visibility::Memberships;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS clubs (
        id         BIGSERIAL PRIMARY KEY,
        short_name TEXT NOT NULL UNIQUE
    );

    CREATE TABLE IF NOT EXISTS users (
        id        BIGSERIAL PRIMARY KEY,
        name      TEXT NOT NULL,
        member_of BIGINT[] NOT NULL DEFAULT '{}'
    );

    CREATE TABLE IF NOT EXISTS events (
        id  BIGSERIAL PRIMARY KEY,
        doc JSONB NOT NULL
    );

    CREATE UNIQUE INDEX IF NOT EXISTS events_active_date_name
    ON events ((doc->>'date'), (doc->>'name'))
    WHERE (doc->>'active')::boolean;

    CREATE TABLE IF NOT EXISTS linked_events (
        id  BIGSERIAL PRIMARY KEY,
        doc JSONB NOT NULL
    );

    CREATE UNIQUE INDEX IF NOT EXISTS linked_events_display_name
    ON linked_events ((doc->>'displayName'));
";

type PgPool = Pool<PostgresConnectionManager<NoTls>>;

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn connect(config: &Config) -> StoreResult<PgStore> {
        let pg_config = config
            .database_url
            .parse::<postgres::Config>()
            .map_err(|err| StoreError::Connection(err.to_string()))?;
        let manager = PostgresConnectionManager::new(pg_config, NoTls);
        let pool = Pool::builder().max_size(config.pool_size).build(manager)?;
        Ok(PgStore { pool })
    }

    pub fn create_db(&self) -> StoreResult<()> {
        let mut db = self.pool.get()?;
        db.batch_execute(SCHEMA)?;
        info!("database schema ready");
        Ok(())
    }

    pub fn empty_db(&self) -> StoreResult<()> {
        let mut db = self.pool.get()?;
        db.batch_execute("DROP TABLE IF EXISTS linked_events, events, users, clubs")?;
        info!("database emptied");
        Ok(())
    }
}

fn ref_location(field: RefField) -> (&'static str, &'static str) {
    match field {
        RefField::EventLinkedTo => ("events", "linkedTo"),
        RefField::LinkedEventIncludes => ("linked_events", "includes"),
    }
}

fn id_table(kind: IdKind) -> &'static str {
    match kind {
        IdKind::Event => "events",
        IdKind::LinkedEvent => "linked_events",
        IdKind::User => "users",
        IdKind::Club => "clubs",
    }
}

fn duplicate_or(err: postgres::Error, what: String) -> StoreError {
    if err.code() == Some(&SqlState::UNIQUE_VIOLATION) {
        StoreError::Duplicate(what)
    } else {
        StoreError::Query(err)
    }
}

fn event_from_row(row: &Row) -> StoreResult<Event> {
    let id: i64 = row.try_get("id")?;
    let Json(mut event): Json<Event> = row.try_get("doc")?;
    event.id = id;
    Ok(event)
}

fn linked_event_from_row(row: &Row) -> StoreResult<LinkedEvent> {
    let id: i64 = row.try_get("id")?;
    let Json(mut linked): Json<LinkedEvent> = row.try_get("doc")?;
    linked.id = id;
    Ok(linked)
}

impl RefSets for PgStore {
    fn add_to_set(&self, field: RefField, target: i64, value: i64) -> StoreResult<()> {
        let (table, key) = ref_location(field);
        let sql = format!(
            "UPDATE {table}
             SET doc = jsonb_set(doc, ARRAY['{key}'],
                 COALESCE(doc->'{key}', '[]'::jsonb) || jsonb_build_array($2::bigint))
             WHERE id = $1
               AND NOT (COALESCE(doc->'{key}', '[]'::jsonb) @> jsonb_build_array($2::bigint))"
        );
        let mut db = self.pool.get()?;
        db.execute(sql.as_str(), &[&target, &value])?;
        Ok(())
    }

    fn pull_from_set(&self, field: RefField, target: i64, value: i64) -> StoreResult<()> {
        let (table, key) = ref_location(field);
        let sql = format!(
            "UPDATE {table}
             SET doc = jsonb_set(doc, ARRAY['{key}'], COALESCE(
                 (SELECT jsonb_agg(x) FROM jsonb_array_elements(doc->'{key}') AS x
                  WHERE x <> to_jsonb($2::bigint)),
                 '[]'::jsonb))
             WHERE id = $1
               AND doc->'{key}' @> jsonb_build_array($2::bigint)"
        );
        let mut db = self.pool.get()?;
        db.execute(sql.as_str(), &[&target, &value])?;
        Ok(())
    }
}

impl Store for PgStore {
    fn existing_ids(&self, kind: IdKind, ids: &[i64]) -> StoreResult<BTreeSet<i64>> {
        // Only active events can be referenced.
        let sql = match kind {
            IdKind::Event => {
                "SELECT id FROM events WHERE id = ANY($1) AND (doc->>'active')::boolean".to_string()
            }
            _ => format!("SELECT id FROM {} WHERE id = ANY($1)", id_table(kind)),
        };
        let mut db = self.pool.get()?;
        let rows = db.query(sql.as_str(), &[&ids])?;
        rows.iter()
            .map(|row| row.try_get::<_, i64>(0).map_err(StoreError::from))
            .collect()
    }

    fn memberships(&self, users: &[UserId]) -> StoreResult<Memberships> {
        let mut db = self.pool.get()?;
        let rows = db.query(
            "SELECT id, member_of FROM users WHERE id = ANY($1)",
            &[&users],
        )?;
        let mut memberships = Memberships::new();
        for row in &rows {
            let id: i64 = row.try_get("id")?;
            let clubs: Vec<i64> = row.try_get("member_of")?;
            memberships.insert(id, clubs.into_iter().collect());
        }
        Ok(memberships)
    }

    fn find_event(&self, id: EventId) -> StoreResult<Option<Event>> {
        let mut db = self.pool.get()?;
        let rows = db.query("SELECT id, doc FROM events WHERE id = $1", &[&id])?;
        rows.first().map(event_from_row).transpose()
    }

    fn find_active_event(&self, date: &str, name: &str) -> StoreResult<Option<Event>> {
        let mut db = self.pool.get()?;
        let rows = db.query(
            "SELECT id, doc FROM events
             WHERE (doc->>'active')::boolean AND doc->>'date' = $1 AND doc->>'name' = $2",
            &[&date, &name],
        )?;
        rows.first().map(event_from_row).transpose()
    }

    fn find_events(&self, filter: &EventFilter) -> StoreResult<Vec<Event>> {
        let mut db = self.pool.get()?;
        let rows = db.query(
            "SELECT id, doc FROM events
             WHERE ($1::boolean OR (doc->>'active')::boolean)
               AND ($2::text IS NULL OR doc->>'date' >= $2)
               AND ($3::text IS NULL OR doc->>'date' <= $3)
               AND ($4::bigint IS NULL OR doc->'organisedBy' @> jsonb_build_array($4::bigint))
               AND ($5::text IS NULL OR strpos(lower(doc->>'name'), lower($5)) > 0)
             ORDER BY doc->>'date' DESC, id",
            &[
                &filter.include_inactive,
                &filter.date_from,
                &filter.date_to,
                &filter.organised_by,
                &filter.name_contains,
            ],
        )?;
        rows.iter().map(event_from_row).collect()
    }

    fn insert_event(&self, event: &Event) -> StoreResult<EventId> {
        let mut db = self.pool.get()?;
        let row = db
            .query_one(
                "INSERT INTO events (doc) VALUES ($1::jsonb) RETURNING id",
                &[&Json(event)],
            )
            .map_err(|err| duplicate_or(err, format!("event {} on {}", event.name, event.date)))?;
        Ok(row.try_get(0)?)
    }

    fn replace_event_details(&self, event: &Event) -> StoreResult<bool> {
        let mut db = self.pool.get()?;
        let updated = db
            .execute(
                "UPDATE events
                 SET doc = jsonb_strip_nulls(jsonb_build_object(
                         'locLatLong', doc->'locLatLong',
                         'locCornerSW', doc->'locCornerSW',
                         'locCornerNW', doc->'locCornerNW',
                         'locCornerNE', doc->'locCornerNE',
                         'locCornerSE', doc->'locCornerSE'))
                     || $2::jsonb
                     || jsonb_build_object(
                         'runners', COALESCE(doc->'runners', '[]'::jsonb),
                         'linkedTo', COALESCE(doc->'linkedTo', '[]'::jsonb))
                 WHERE id = $1 AND (doc->>'active')::boolean",
                &[&event.id, &Json(event)],
            )
            .map_err(|err| duplicate_or(err, format!("event {} on {}", event.name, event.date)))?;
        Ok(updated > 0)
    }

    fn soft_delete_event(
        &self,
        id: EventId,
        requester: UserId,
        suffix: &str,
    ) -> StoreResult<Option<Event>> {
        let mut db = self.pool.get()?;
        let rows = db.query(
            "UPDATE events
             SET doc = doc
                 || jsonb_build_object('name', (doc->>'name') || $3::text, 'active', false)
                 || CASE WHEN doc->>'orisId' IS NOT NULL
                         THEN jsonb_build_object('orisId', (doc->>'orisId') || $3::text)
                         ELSE '{}'::jsonb END
             WHERE id = $1
               AND (doc->>'active')::boolean
               AND NOT EXISTS (
                   SELECT 1 FROM jsonb_array_elements(COALESCE(doc->'runners', '[]'::jsonb)) AS r
                   WHERE (r->>'user')::bigint <> $2::bigint)
             RETURNING id, doc",
            &[&id, &requester, &suffix],
        )?;
        rows.first().map(event_from_row).transpose()
    }

    fn fill_event_location(&self, id: EventId, location: &EventLocation) -> StoreResult<()> {
        let mut db = self.pool.get()?;
        // Keys already in the document win over the right-hand side.
        db.execute(
            "UPDATE events SET doc = $2::jsonb || doc WHERE id = $1",
            &[&id, &Json(location)],
        )?;
        Ok(())
    }

    fn push_runner(&self, id: EventId, runner: &Runner) -> StoreResult<bool> {
        let mut db = self.pool.get()?;
        let updated = db.execute(
            "UPDATE events
             SET doc = jsonb_set(doc, ARRAY['runners'],
                 COALESCE(doc->'runners', '[]'::jsonb) || jsonb_build_array($2::jsonb))
             WHERE id = $1
               AND (doc->>'active')::boolean
               AND NOT (COALESCE(doc->'runners', '[]'::jsonb)
                        @> jsonb_build_array(jsonb_build_object('user', $3::bigint)))",
            &[&id, &Json(runner), &runner.user],
        )?;
        Ok(updated > 0)
    }

    fn replace_runner(&self, id: EventId, runner: &Runner) -> StoreResult<bool> {
        let mut db = self.pool.get()?;
        let updated = db.execute(
            "UPDATE events
             SET doc = jsonb_set(doc, ARRAY['runners'], (
                 SELECT jsonb_agg(CASE WHEN (r->>'user')::bigint = $2::bigint THEN $3::jsonb ELSE r END
                                  ORDER BY ord)
                 FROM jsonb_array_elements(doc->'runners') WITH ORDINALITY AS t(r, ord)))
             WHERE id = $1
               AND (doc->>'active')::boolean
               AND doc->'runners' @> jsonb_build_array(jsonb_build_object('user', $2::bigint))",
            &[&id, &runner.user, &Json(runner)],
        )?;
        Ok(updated > 0)
    }

    fn find_linked_event(&self, id: LinkedEventId) -> StoreResult<Option<LinkedEvent>> {
        let mut db = self.pool.get()?;
        let rows = db.query("SELECT id, doc FROM linked_events WHERE id = $1", &[&id])?;
        rows.first().map(linked_event_from_row).transpose()
    }

    fn find_linked_events(&self) -> StoreResult<Vec<LinkedEvent>> {
        let mut db = self.pool.get()?;
        let rows = db.query(
            "SELECT id, doc FROM linked_events ORDER BY doc->>'displayName', id",
            &[],
        )?;
        rows.iter().map(linked_event_from_row).collect()
    }

    fn insert_linked_event(&self, linked: &LinkedEvent) -> StoreResult<LinkedEventId> {
        let mut db = self.pool.get()?;
        let row = db
            .query_one(
                "INSERT INTO linked_events (doc) VALUES ($1::jsonb) RETURNING id",
                &[&Json(linked)],
            )
            .map_err(|err| duplicate_or(err, format!("linked event {}", linked.display_name)))?;
        Ok(row.try_get(0)?)
    }

    fn rename_linked_event(&self, id: LinkedEventId, display_name: &str) -> StoreResult<bool> {
        let mut db = self.pool.get()?;
        let updated = db
            .execute(
                "UPDATE linked_events
                 SET doc = jsonb_set(doc, ARRAY['displayName'], to_jsonb($2::text))
                 WHERE id = $1",
                &[&id, &display_name],
            )
            .map_err(|err| duplicate_or(err, format!("linked event {}", display_name)))?;
        Ok(updated > 0)
    }

    fn delete_linked_event(&self, id: LinkedEventId) -> StoreResult<bool> {
        let mut db = self.pool.get()?;
        let deleted = db.execute("DELETE FROM linked_events WHERE id = $1", &[&id])?;
        Ok(deleted > 0)
    }
}

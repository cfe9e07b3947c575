//! Backend for a club orienteering diary: events, the runners who took part,
//! their scanned maps and the linked events that group several races.

pub mod config;
pub mod error;
pub mod federation;
pub mod gpx;
pub mod links;
pub mod models;
pub mod quickroute;
pub mod service;
pub mod store;
pub mod track;
pub mod validate;
pub mod visibility;

pub use crate::config::Config;
pub use crate::error::{Error, Result, StoreError};
pub use crate::service::Service;
pub use crate::store::{EventFilter, MemoryStore, PgStore, Store};

/// Connects to the database named by `DATABASE_URL`.
pub fn establish_connection() -> Result<PgStore> {
    let config = Config::from_env()?;
    Ok(PgStore::connect(&config)?)
}

//! Read-only access to the national federation's event and result records.
//!
//! Only the fields used to pre-fill new events and runners are modelled here.

use crate::models::{CourseResult, EventDetails, UserId};

#[derive(Debug, thiserror::Error)]
pub enum FederationError {
    #[error("federation request failed: {0}")]
    Request(String),

    #[error("unexpected federation response: {0}")]
    Response(String),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FederationEvent {
    pub oris_id: String,
    pub date: String,
    pub name: String,
    pub details: EventDetails,
}

pub trait FederationSource {
    fn event(&self, oris_id: &str) -> Result<Option<FederationEvent>, FederationError>;

    /// The result a user recorded at a federation event, if any.
    fn result(&self, oris_event_id: &str, user: UserId)
        -> Result<Option<CourseResult>, FederationError>;
}

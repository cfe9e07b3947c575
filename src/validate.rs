//! Existence checks for ids supplied by callers.

use std::collections::BTreeSet;

use log::debug;

use crate::error::StoreResult;
use crate::store::Store;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdKind {
    Event,
    LinkedEvent,
    User,
    Club,
}

/// Keeps the ids that parse and exist. Everything else is dropped without
/// an error.
pub fn valid_ids<S, I, T>(store: &S, kind: IdKind, candidates: I) -> StoreResult<BTreeSet<i64>>
where
    S: Store + ?Sized,
    I: IntoIterator<Item = T>,
    T: AsRef<str>,
{
    let mut parsed = Vec::new();
    for candidate in candidates {
        let raw = candidate.as_ref().trim();
        match raw.parse::<i64>() {
            Ok(id) if id > 0 => parsed.push(id),
            _ => debug!("dropping unparseable {:?} id {:?}", kind, raw),
        }
    }
    if parsed.is_empty() {
        return Ok(BTreeSet::new());
    }

    let existing = store.existing_ids(kind, &parsed)?;
    for id in parsed.iter().filter(|id| !existing.contains(id)) {
        debug!("dropping unknown {:?} id {}", kind, id);
    }
    Ok(existing)
}

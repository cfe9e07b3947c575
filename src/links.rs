//! Keeps the two halves of an event <-> linked event reference in step.
//!
//! An event lists the linked events it belongs to (`linkedTo`) and a linked
//! event lists the events it groups (`includes`). A mutation writes one side
//! directly; the other side is brought in line by computing a [`LinkDelta`]
//! and applying it with [`apply_mirror`]. Applying a delta is idempotent, so a
//! mirror step that is retried or replayed by the repair pass converges on the
//! same state.

use std::collections::BTreeSet;

use log::debug;

use crate::error::StoreResult;

/// The reference set on the mirror side of a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefField {
    /// `Event.linkedTo`, holding linked event ids.
    EventLinkedTo,
    /// `LinkedEvent.includes`, holding event ids.
    LinkedEventIncludes,
}

impl RefField {
    /// The field on the opposite side of the link.
    pub fn opposite(self) -> RefField {
        match self {
            RefField::EventLinkedTo => RefField::LinkedEventIncludes,
            RefField::LinkedEventIncludes => RefField::EventLinkedTo,
        }
    }
}

/// Atomic set operations on reference fields.
///
/// Adding a value already present and pulling a value that is absent are
/// both no-ops. A target document that does not exist is ignored.
pub trait RefSets {
    fn add_to_set(&self, field: RefField, target: i64, value: i64) -> StoreResult<()>;
    fn pull_from_set(&self, field: RefField, target: i64, value: i64) -> StoreResult<()>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkDelta {
    pub added: BTreeSet<i64>,
    pub removed: BTreeSet<i64>,
}

impl LinkDelta {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }

    /// A delta that drops every reference in `previous`.
    pub fn removing_all(previous: &BTreeSet<i64>) -> LinkDelta {
        LinkDelta {
            added: BTreeSet::new(),
            removed: previous.clone(),
        }
    }
}

/// `None` means the caller did not ask to change the reference list, which is
/// different from `Some` of an empty set.
pub fn compute_delta(previous: &BTreeSet<i64>, new: Option<&BTreeSet<i64>>) -> LinkDelta {
    match new {
        None => LinkDelta::default(),
        Some(new) => LinkDelta {
            added: new.difference(previous).copied().collect(),
            removed: previous.difference(new).copied().collect(),
        },
    }
}

/// Inserts `owner` into `field` of every added target and pulls it from every
/// removed target.
pub fn apply_mirror<S>(store: &S, field: RefField, owner: i64, delta: &LinkDelta) -> StoreResult<()>
where
    S: RefSets + ?Sized,
{
    for &target in &delta.added {
        debug!("mirror {:?}: add {} to {}", field, owner, target);
        store.add_to_set(field, target, owner)?;
    }
    for &target in &delta.removed {
        debug!("mirror {:?}: pull {} from {}", field, owner, target);
        store.pull_from_set(field, target, owner)?;
    }
    Ok(())
}

/// Writes `delta` onto the owner's own `field`, then mirrors it.
pub fn apply<S>(store: &S, field: RefField, owner: i64, delta: &LinkDelta) -> StoreResult<()>
where
    S: RefSets + ?Sized,
{
    for &id in &delta.added {
        store.add_to_set(field, owner, id)?;
    }
    for &id in &delta.removed {
        store.pull_from_set(field, owner, id)?;
    }
    apply_mirror(store, field.opposite(), owner, delta)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::BTreeMap;

    #[derive(Default)]
    struct Sets(RefCell<BTreeMap<i64, BTreeSet<i64>>>);

    impl RefSets for Sets {
        fn add_to_set(&self, _field: RefField, target: i64, value: i64) -> StoreResult<()> {
            if let Some(set) = self.0.borrow_mut().get_mut(&target) {
                set.insert(value);
            }
            Ok(())
        }

        fn pull_from_set(&self, _field: RefField, target: i64, value: i64) -> StoreResult<()> {
            if let Some(set) = self.0.borrow_mut().get_mut(&target) {
                set.remove(&value);
            }
            Ok(())
        }
    }

    fn set(ids: &[i64]) -> BTreeSet<i64> {
        ids.iter().copied().collect()
    }

    #[test]
    fn delta_is_set_difference() {
        let delta = compute_delta(&set(&[1, 2, 3]), Some(&set(&[2, 3, 4, 5])));
        assert_eq!(delta.added, set(&[4, 5]));
        assert_eq!(delta.removed, set(&[1]));
    }

    #[test]
    fn missing_new_list_changes_nothing() {
        let delta = compute_delta(&set(&[1, 2]), None);
        assert!(delta.is_empty());
    }

    #[test]
    fn empty_new_list_removes_everything() {
        let delta = compute_delta(&set(&[1, 2]), Some(&BTreeSet::new()));
        assert!(delta.added.is_empty());
        assert_eq!(delta.removed, set(&[1, 2]));
        assert_eq!(delta, LinkDelta::removing_all(&set(&[1, 2])));
    }

    #[test]
    fn applying_twice_matches_applying_once() {
        let sets = Sets::default();
        sets.0.borrow_mut().insert(10, set(&[1]));
        sets.0.borrow_mut().insert(11, set(&[1, 2]));
        sets.0.borrow_mut().insert(12, set(&[]));

        let delta = LinkDelta {
            added: set(&[10, 12]),
            removed: set(&[11]),
        };
        apply_mirror(&sets, RefField::EventLinkedTo, 2, &delta).unwrap();
        let once = sets.0.borrow().clone();
        apply_mirror(&sets, RefField::EventLinkedTo, 2, &delta).unwrap();
        assert_eq!(*sets.0.borrow(), once);

        assert_eq!(once[&10], set(&[1, 2]));
        assert_eq!(once[&11], set(&[1]));
        assert_eq!(once[&12], set(&[2]));
    }

    #[test]
    fn unknown_targets_are_ignored() {
        let sets = Sets::default();
        let delta = LinkDelta {
            added: set(&[99]),
            removed: set(&[98]),
        };
        apply_mirror(&sets, RefField::LinkedEventIncludes, 1, &delta).unwrap();
        assert!(sets.0.borrow().is_empty());
    }
}

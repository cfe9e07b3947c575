//! Per-viewer filtering of an event's runners.
//!
//! Hidden runners are removed from the output entirely, never redacted in
//! place, so a viewer cannot learn how many runners were filtered out. The
//! same membership test backs both the detail and the listing view.

use std::collections::{BTreeSet, HashMap};

use crate::models::{ClubId, Runner, RunnerSummary, UserId, Viewer, Visibility};

/// Club memberships of the users behind a set of runners.
pub type Memberships = HashMap<UserId, BTreeSet<ClubId>>;

/// Any one of the clauses below is enough to see a runner.
pub fn can_view(viewer: &Viewer, runner: &Runner, runner_clubs: Option<&BTreeSet<ClubId>>) -> bool {
    let authenticated = viewer.is_authenticated();

    viewer.is_admin()
        || runner.visibility == Visibility::Public
        || (authenticated && runner.visibility == Visibility::All)
        || viewer.is(runner.user)
        || (authenticated
            && runner.visibility == Visibility::Club
            && runner_clubs.map_or(false, |clubs| !clubs.is_disjoint(&viewer.clubs)))
}

pub fn project_runners(runners: &[Runner], viewer: &Viewer, memberships: &Memberships) -> Vec<Runner> {
    visible(runners, viewer, memberships).cloned().collect()
}

pub fn project_summaries(
    runners: &[Runner],
    viewer: &Viewer,
    memberships: &Memberships,
) -> Vec<RunnerSummary> {
    visible(runners, viewer, memberships)
        .map(RunnerSummary::of)
        .collect()
}

fn visible<'a>(
    runners: &'a [Runner],
    viewer: &'a Viewer,
    memberships: &'a Memberships,
) -> impl Iterator<Item = &'a Runner> + 'a {
    runners
        .iter()
        .filter(move |runner| can_view(viewer, runner, memberships.get(&runner.user)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;
    use proptest::prelude::*;

    const RUNNER: UserId = 20;
    const OTHER: UserId = 30;
    const SHARED_CLUB: ClubId = 5;

    fn viewer_for(role: Role, is_self: bool, shared_club: bool) -> Viewer {
        let clubs: Vec<ClubId> = if shared_club { vec![SHARED_CLUB, 9] } else { vec![9] };
        match role {
            Role::Anonymous => Viewer::anonymous(),
            _ => Viewer::user(if is_self { RUNNER } else { OTHER }, role, clubs),
        }
    }

    fn runner_clubs() -> BTreeSet<ClubId> {
        [SHARED_CLUB, 6].into_iter().collect()
    }

    fn expected(role: Role, visibility: Visibility, is_self: bool, shared_club: bool) -> bool {
        match (role, visibility) {
            (Role::Admin, _) => true,
            (_, Visibility::Public) => true,
            (Role::Anonymous, _) => false,
            _ if is_self => true,
            (_, Visibility::All) => true,
            (_, Visibility::Club) => shared_club,
            (_, Visibility::Private) => false,
        }
    }

    fn any_role() -> impl Strategy<Value = Role> {
        prop_oneof![
            Just(Role::Anonymous),
            Just(Role::Guest),
            Just(Role::Standard),
            Just(Role::Admin),
        ]
    }

    fn any_visibility() -> impl Strategy<Value = Visibility> {
        prop_oneof![
            Just(Visibility::Public),
            Just(Visibility::All),
            Just(Visibility::Club),
            Just(Visibility::Private),
        ]
    }

    proptest! {
        #[test]
        fn matches_rule_table(
            role in any_role(),
            vis in any_visibility(),
            is_self in any::<bool>(),
            shared in any::<bool>()
        ) {
            let viewer = viewer_for(role, is_self, shared);
            let runner = Runner::new(RUNNER, vis);
            let clubs = runner_clubs();
            prop_assert_eq!(
                can_view(&viewer, &runner, Some(&clubs)),
                expected(role, vis, is_self, shared)
            );
        }
    }

    #[test]
    fn full_cross_product() {
        let roles = [Role::Anonymous, Role::Guest, Role::Standard, Role::Admin];
        let levels = [
            Visibility::Public,
            Visibility::All,
            Visibility::Club,
            Visibility::Private,
        ];
        let clubs = runner_clubs();
        for &role in &roles {
            for &vis in &levels {
                for &is_self in &[false, true] {
                    for &shared in &[false, true] {
                        let viewer = viewer_for(role, is_self, shared);
                        let runner = Runner::new(RUNNER, vis);
                        assert_eq!(
                            can_view(&viewer, &runner, Some(&clubs)),
                            expected(role, vis, is_self, shared),
                            "{:?} {:?} self={} shared={}",
                            role,
                            vis,
                            is_self,
                            shared
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn hidden_runners_are_dropped_in_order() {
        let runners = vec![
            Runner::new(1, Visibility::Public),
            Runner::new(2, Visibility::Private),
            Runner::new(3, Visibility::All),
            Runner::new(4, Visibility::Club),
            Runner::new(5, Visibility::Public),
        ];
        let mut memberships = Memberships::new();
        memberships.insert(4, [SHARED_CLUB].into_iter().collect());

        let anonymous = project_runners(&runners, &Viewer::anonymous(), &memberships);
        let users: Vec<UserId> = anonymous.iter().map(|r| r.user).collect();
        assert_eq!(users, vec![1, 5]);

        let clubmate = Viewer::user(99, Role::Standard, vec![SHARED_CLUB]);
        let users: Vec<UserId> = project_runners(&runners, &clubmate, &memberships)
            .iter()
            .map(|r| r.user)
            .collect();
        assert_eq!(users, vec![1, 3, 4, 5]);

        let owner = Viewer::user(2, Role::Standard, None);
        let users: Vec<UserId> = project_summaries(&runners, &owner, &memberships)
            .iter()
            .map(|r| r.user)
            .collect();
        assert_eq!(users, vec![1, 2, 3, 5]);
    }

    #[test]
    fn club_runner_without_known_clubs_is_hidden() {
        let viewer = Viewer::user(99, Role::Standard, vec![SHARED_CLUB]);
        let runner = Runner::new(4, Visibility::Club);
        assert!(!can_view(&viewer, &runner, None));
    }
}

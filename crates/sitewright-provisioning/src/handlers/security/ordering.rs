//! Creation order of site groups.
//!
//! A group owned by another declared group has to be created after its
//! owner. Groups are emitted in dependency order, ties broken by declaration
//! order.

use crate::model::SiteGroup;

/// Owner value that means "the platform's default owner".
pub const SYSTEM_ACCOUNT: &str = "SHAREPOINT\\system";

fn is_associated_group_token(owner: &str) -> bool {
    let owner = owner.to_lowercase();
    owner.starts_with("{associated") && owner.ends_with("group}")
}

/// Check if a group's owner names no other declared group.
#[must_use]
pub fn is_root(group: &SiteGroup) -> bool {
    let owner = group.owner.trim();
    owner.is_empty()
        || owner.eq_ignore_ascii_case(SYSTEM_ACCOUNT)
        || owner.eq_ignore_ascii_case(group.title.trim())
        || is_associated_group_token(owner)
}

/// Index of the declared group the group at `index` depends on.
fn dependency(groups: &[SiteGroup], index: usize) -> Option<usize> {
    let group = &groups[index];
    if is_root(group) {
        return None;
    }
    let owner = group.owner.trim();
    groups
        .iter()
        .position(|candidate| candidate.title.trim().eq_ignore_ascii_case(owner))
        .filter(|position| *position != index)
}

/// Order groups so that every group follows the group that owns it.
///
/// An owner that names no declared group (a user, or a group that already
/// exists on the target) imposes no ordering. Groups caught in an ownership
/// cycle are appended in declaration order after every other group.
#[must_use]
pub fn order_groups(groups: &[SiteGroup]) -> Vec<&SiteGroup> {
    let dependencies: Vec<Option<usize>> = (0..groups.len())
        .map(|index| dependency(groups, index))
        .collect();

    let mut emitted = vec![false; groups.len()];
    let mut order = Vec::with_capacity(groups.len());

    loop {
        let ready = (0..groups.len()).find(|index| {
            !emitted[*index] && dependencies[*index].map_or(true, |owner| emitted[owner])
        });
        let Some(index) = ready else {
            break;
        };
        emitted[index] = true;
        order.push(&groups[index]);
    }

    if order.len() < groups.len() {
        let cyclic: Vec<&str> = groups
            .iter()
            .zip(&emitted)
            .filter(|(_, done)| !**done)
            .map(|(group, _)| group.title.as_str())
            .collect();
        tracing::warn!(
            groups = ?cyclic,
            "Site group owners form a cycle, creating in declaration order"
        );
        order.extend(
            groups
                .iter()
                .zip(&emitted)
                .filter(|(_, done)| !**done)
                .map(|(group, _)| group),
        );
    }

    order
}

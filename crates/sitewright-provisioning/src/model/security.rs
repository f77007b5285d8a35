//! Site security section of a provisioning template.

use serde::{Deserialize, Serialize};
use sitewright_gateway::types::PermissionKind;
use std::collections::BTreeSet;

/// A principal reference by login name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct User {
    pub name: String,
}

impl User {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Desired security state of a site.
///
/// The associated-group fields are tri-state: `None` leaves the association
/// alone, `Some("")` removes it and any other value names the group to
/// ensure and associate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SiteSecurity {
    pub associated_owner_group: Option<String>,
    pub associated_member_group: Option<String>,
    pub associated_visitor_group: Option<String>,
    pub additional_administrators: Vec<User>,
    pub additional_owners: Vec<User>,
    pub additional_members: Vec<User>,
    pub additional_visitors: Vec<User>,
    pub clear_existing_owners: bool,
    pub clear_existing_members: bool,
    pub clear_existing_visitors: bool,
    pub clear_existing_administrators: bool,
    pub break_role_inheritance: bool,
    pub copy_role_assignments: bool,
    pub clear_subscopes: bool,
    pub site_groups: Vec<SiteGroup>,
    pub permissions: SiteSecurityPermissions,
}

impl SiteSecurity {
    /// Check if applying this block could change anything on a site.
    #[must_use]
    pub fn declares_changes(&self) -> bool {
        !self.additional_administrators.is_empty()
            || self.break_role_inheritance
            || !self.additional_members.is_empty()
            || !self.additional_owners.is_empty()
            || !self.additional_visitors.is_empty()
            || !self.site_groups.is_empty()
            || !self.permissions.role_assignments.is_empty()
            || !self.permissions.role_definitions.is_empty()
    }

    /// Remove every entity that also appears, unchanged, in `base`.
    ///
    /// Users are matched by name; groups, role definitions and role
    /// assignments must be equal to the baseline entity with the same key.
    pub fn prune_against(&mut self, base: &SiteSecurity) {
        remove_users(
            &mut self.additional_administrators,
            &base.additional_administrators,
        );
        remove_users(&mut self.additional_members, &base.additional_members);
        remove_users(&mut self.additional_owners, &base.additional_owners);
        remove_users(&mut self.additional_visitors, &base.additional_visitors);

        self.site_groups.retain(|group| {
            !base
                .site_groups
                .iter()
                .any(|b| b.title == group.title && b == group)
        });
        self.permissions.role_definitions.retain(|definition| {
            !base
                .permissions
                .role_definitions
                .iter()
                .any(|b| b.name == definition.name && b == definition)
        });
        self.permissions
            .role_assignments
            .retain(|assignment| !base.permissions.role_assignments.contains(assignment));
    }
}

fn remove_users(users: &mut Vec<User>, base: &[User]) {
    for user in base {
        if let Some(index) = users.iter().position(|u| u.name == user.name) {
            users.remove(index);
        }
    }
}

/// A site group and its membership policy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SiteGroup {
    pub title: String,
    /// Title of the owning group, a user login, the group's own title, an
    /// associated-group token, or empty for the default owner.
    pub owner: String,
    pub description: Option<String>,
    pub allow_members_edit_membership: bool,
    pub allow_request_to_join_leave: bool,
    pub auto_accept_request_to_join_leave: bool,
    pub only_allow_members_view_membership: bool,
    pub request_to_join_leave_email_setting: Option<String>,
    pub members: Vec<User>,
}

impl SiteGroup {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = owner.into();
        self
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn with_member(mut self, name: impl Into<String>) -> Self {
        self.members.push(User::new(name));
        self
    }
}

/// Role definitions and web role assignments.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SiteSecurityPermissions {
    pub role_definitions: Vec<RoleDefinition>,
    pub role_assignments: Vec<RoleAssignment>,
}

/// A named set of rights.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RoleDefinition {
    pub name: String,
    pub description: String,
    pub permissions: BTreeSet<PermissionKind>,
}

impl RoleDefinition {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        permissions: impl IntoIterator<Item = PermissionKind>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            permissions: permissions.into_iter().collect(),
        }
    }
}

/// A grant (or revocation) of a role definition to a principal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RoleAssignment {
    pub principal: String,
    pub role_definition: String,
    pub remove: bool,
}

impl RoleAssignment {
    pub fn grant(principal: impl Into<String>, role_definition: impl Into<String>) -> Self {
        Self {
            principal: principal.into(),
            role_definition: role_definition.into(),
            remove: false,
        }
    }

    pub fn revoke(principal: impl Into<String>, role_definition: impl Into<String>) -> Self {
        Self {
            remove: true,
            ..Self::grant(principal, role_definition)
        }
    }
}

/// Unique permissions declared for a single object such as a list item.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ObjectSecurity {
    pub copy_role_assignments: bool,
    pub clear_subscopes: bool,
    pub role_assignments: Vec<RoleAssignment>,
}

impl ObjectSecurity {
    /// Check if applying this block would break inheritance.
    #[must_use]
    pub fn is_declared(&self) -> bool {
        self.copy_role_assignments || self.clear_subscopes || !self.role_assignments.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_declares_changes() {
        assert!(!SiteSecurity::default().declares_changes());

        let security = SiteSecurity {
            site_groups: vec![SiteGroup::new("Approvers")],
            ..Default::default()
        };
        assert!(security.declares_changes());

        let security = SiteSecurity {
            break_role_inheritance: true,
            ..Default::default()
        };
        assert!(security.declares_changes());
    }

    #[test]
    fn test_associated_groups_do_not_gate() {
        let security = SiteSecurity {
            associated_owner_group: Some("Owners".to_string()),
            ..Default::default()
        };
        assert!(!security.declares_changes());
    }

    #[test]
    fn test_prune_against_baseline() {
        let mut extracted = SiteSecurity {
            additional_administrators: vec![User::new("admin"), User::new("carol")],
            site_groups: vec![
                SiteGroup::new("Visitors"),
                SiteGroup::new("Approvers").with_owner("Reviewers"),
            ],
            permissions: SiteSecurityPermissions {
                role_assignments: vec![
                    RoleAssignment::grant("Visitors", "{roledefinition:Reader}"),
                    RoleAssignment::grant("Approvers", "Approve"),
                ],
                ..Default::default()
            },
            ..Default::default()
        };
        let base = SiteSecurity {
            additional_administrators: vec![User::new("admin")],
            site_groups: vec![
                SiteGroup::new("Visitors"),
                SiteGroup::new("Approvers"),
            ],
            permissions: SiteSecurityPermissions {
                role_assignments: vec![RoleAssignment::grant(
                    "Visitors",
                    "{roledefinition:Reader}",
                )],
                ..Default::default()
            },
            ..Default::default()
        };

        extracted.prune_against(&base);

        assert_eq!(extracted.additional_administrators, vec![User::new("carol")]);
        // Approvers differs from the baseline by owner and is kept.
        assert_eq!(extracted.site_groups.len(), 1);
        assert_eq!(extracted.site_groups[0].title, "Approvers");
        assert_eq!(
            extracted.permissions.role_assignments,
            vec![RoleAssignment::grant("Approvers", "Approve")]
        );
    }

    #[test]
    fn test_template_json_shape() {
        let json = r#"{
            "associatedOwnerGroup": "",
            "siteGroups": [{"title": "Approvers", "owner": "Reviewers", "members": [{"name": "alice"}]}],
            "permissions": {
                "roleDefinitions": [{"name": "Approve", "description": "", "permissions": ["ApproveItems"]}],
                "roleAssignments": [{"principal": "Approvers", "roleDefinition": "Approve", "remove": false}]
            }
        }"#;
        let security: SiteSecurity = serde_json::from_str(json).unwrap();
        assert_eq!(security.associated_owner_group.as_deref(), Some(""));
        assert_eq!(security.associated_member_group, None);
        assert_eq!(security.site_groups[0].members, vec![User::new("alice")]);
        assert!(security.permissions.role_definitions[0]
            .permissions
            .contains(&PermissionKind::ApproveItems));
    }
}

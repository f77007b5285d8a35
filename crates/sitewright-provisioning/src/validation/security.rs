//! Equivalence of site security blocks.
//!
//! Used to check that a template's security block was applied: the block is
//! compared with the security block extracted from the target afterwards.

use sitewright_gateway::operation::ItemPermissions;
use std::fmt;

use super::collection::{Cardinality, CollectionValidator, FieldAccessor, KeyMatch};
use crate::model::{ObjectSecurity, RoleAssignment, RoleDefinition, SiteGroup, SiteSecurity, User};
use crate::text::{html_to_plain_text, MAX_DESCRIPTION_LENGTH};
use crate::token::TokenParser;

/// Part of a security block that failed to validate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecuritySection {
    SiteGroups,
    Administrators,
    Owners,
    Members,
    Visitors,
    RoleDefinitions,
    RoleAssignments,
}

impl SecuritySection {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            SecuritySection::SiteGroups => "site_groups",
            SecuritySection::Administrators => "administrators",
            SecuritySection::Owners => "owners",
            SecuritySection::Members => "members",
            SecuritySection::Visitors => "visitors",
            SecuritySection::RoleDefinitions => "role_definitions",
            SecuritySection::RoleAssignments => "role_assignments",
        }
    }
}

impl fmt::Display for SecuritySection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

fn flag(value: bool) -> String {
    value.to_string()
}

fn sorted_names(users: &[User]) -> String {
    let mut names: Vec<String> = users.iter().map(|u| u.name.to_lowercase()).collect();
    names.sort();
    names.join(";")
}

/// Optional template values that the target always reports. An undeclared
/// value on the source side matches anything.
fn undeclared_matches(field: &str, source: &SiteGroup, target: &SiteGroup) -> bool {
    match field {
        "owner" => source.owner.trim().is_empty(),
        "request_to_join_leave_email_setting" => source.request_to_join_leave_email_setting.is_none(),
        "description" => match &source.description {
            None => true,
            Some(description) => {
                html_to_plain_text(description, MAX_DESCRIPTION_LENGTH)
                    == target.description.as_deref().unwrap_or_default()
            }
        },
        _ => false,
    }
}

/// Compares a declared security block with an extracted one.
///
/// Every collection must correspond one to one, so the extracted block has
/// to be pruned against the pre-apply baseline first. Tokens are resolved on
/// both sides because extraction writes tokens such as
/// `{roledefinition:Reader}` back into the result. Associated group names
/// are not compared.
pub struct SecurityValidator {
    groups: CollectionValidator<SiteGroup>,
    users: CollectionValidator<User>,
    role_definitions: CollectionValidator<RoleDefinition>,
    role_assignments: CollectionValidator<RoleAssignment>,
}

impl Default for SecurityValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl SecurityValidator {
    #[must_use]
    pub fn new() -> Self {
        let groups = CollectionValidator::new(
            FieldAccessor::new("title", |g: &SiteGroup| g.title.clone()),
            vec![
                FieldAccessor::new("owner", |g: &SiteGroup| g.owner.clone()),
                FieldAccessor::new("description", |g: &SiteGroup| {
                    g.description.clone().unwrap_or_default()
                }),
                FieldAccessor::new("allow_members_edit_membership", |g: &SiteGroup| {
                    flag(g.allow_members_edit_membership)
                }),
                FieldAccessor::new("allow_request_to_join_leave", |g: &SiteGroup| {
                    flag(g.allow_request_to_join_leave)
                }),
                FieldAccessor::new("auto_accept_request_to_join_leave", |g: &SiteGroup| {
                    flag(g.auto_accept_request_to_join_leave)
                }),
                FieldAccessor::new("only_allow_members_view_membership", |g: &SiteGroup| {
                    flag(g.only_allow_members_view_membership)
                }),
                FieldAccessor::new("request_to_join_leave_email_setting", |g: &SiteGroup| {
                    g.request_to_join_leave_email_setting.clone().unwrap_or_default()
                }),
                FieldAccessor::new("members", |g: &SiteGroup| sorted_names(&g.members)),
            ],
        )
        .key_match(KeyMatch::IgnoreCase)
        .cardinality(Cardinality::Exact)
        .resolve_target_tokens(true)
        .with_override(undeclared_matches);

        let users = CollectionValidator::new(
            FieldAccessor::new("name", |u: &User| u.name.clone()),
            Vec::new(),
        )
        .key_match(KeyMatch::IgnoreCase)
        .cardinality(Cardinality::Exact);

        let role_definitions = CollectionValidator::new(
            FieldAccessor::new("name", |d: &RoleDefinition| d.name.clone()),
            vec![
                FieldAccessor::new("description", |d: &RoleDefinition| d.description.clone()),
                FieldAccessor::new("permissions", |d: &RoleDefinition| {
                    d.permissions
                        .iter()
                        .map(ToString::to_string)
                        .collect::<Vec<_>>()
                        .join(",")
                }),
            ],
        )
        .cardinality(Cardinality::Exact)
        .resolve_target_tokens(true);

        let role_assignments = CollectionValidator::new(
            FieldAccessor::new("assignment", |a: &RoleAssignment| {
                format!("{}|{}", a.principal, a.role_definition)
            }),
            Vec::new(),
        )
        .key_match(KeyMatch::IgnoreCase)
        .cardinality(Cardinality::Exact)
        .resolve_target_tokens(true);

        Self {
            groups,
            users,
            role_definitions,
            role_assignments,
        }
    }

    /// Check if `target` is equivalent to `source`.
    pub fn validate(
        &self,
        source: &SiteSecurity,
        target: &SiteSecurity,
        tokens: Option<&TokenParser>,
    ) -> bool {
        self.failing_sections(source, target, tokens).is_empty()
    }

    /// Sections of `target` that differ from `source`.
    pub fn failing_sections(
        &self,
        source: &SiteSecurity,
        target: &SiteSecurity,
        tokens: Option<&TokenParser>,
    ) -> Vec<SecuritySection> {
        // Revocations leave nothing behind to extract.
        let granted: Vec<RoleAssignment> = source
            .permissions
            .role_assignments
            .iter()
            .filter(|a| !a.remove)
            .cloned()
            .collect();

        let checks = [
            (
                SecuritySection::SiteGroups,
                self.groups.validate(&source.site_groups, &target.site_groups, tokens),
            ),
            (
                SecuritySection::Administrators,
                self.users.validate(
                    &source.additional_administrators,
                    &target.additional_administrators,
                    tokens,
                ),
            ),
            (
                SecuritySection::Owners,
                self.users
                    .validate(&source.additional_owners, &target.additional_owners, tokens),
            ),
            (
                SecuritySection::Members,
                self.users
                    .validate(&source.additional_members, &target.additional_members, tokens),
            ),
            (
                SecuritySection::Visitors,
                self.users
                    .validate(&source.additional_visitors, &target.additional_visitors, tokens),
            ),
            (
                SecuritySection::RoleDefinitions,
                self.role_definitions.validate(
                    &source.permissions.role_definitions,
                    &target.permissions.role_definitions,
                    tokens,
                ),
            ),
            (
                SecuritySection::RoleAssignments,
                self.role_assignments.validate(
                    &granted,
                    &target.permissions.role_assignments,
                    tokens,
                ),
            ),
        ];

        let failing: Vec<SecuritySection> = checks
            .into_iter()
            .filter(|(_, ok)| !ok)
            .map(|(section, _)| section)
            .collect();
        for section in &failing {
            tracing::debug!(section = %section, "Security section differs");
        }
        failing
    }
}

impl fmt::Debug for SecurityValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecurityValidator").finish_non_exhaustive()
    }
}

/// Check the unique permissions of a single object against what was declared.
///
/// A declared assignment is satisfied by each live assignment whose principal
/// contains the declared principal and whose role definition matches. The
/// number of satisfied pairs must equal the number of declared assignments.
pub fn validate_object_security(
    security: &ObjectSecurity,
    live: &ItemPermissions,
    tokens: Option<&TokenParser>,
) -> bool {
    let resolve = |value: &str| match tokens {
        Some(parser) => parser.parse(value),
        None => value.to_string(),
    };

    let declared = security.role_assignments.len();
    let satisfied: usize = security
        .role_assignments
        .iter()
        .map(|assignment| {
            let principal = resolve(&assignment.principal);
            let role_definition = resolve(&assignment.role_definition);
            live.role_assignments
                .iter()
                .filter(|l| l.principal.contains(&principal) && l.role_definition == role_definition)
                .count()
        })
        .sum();
    declared == satisfied
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SiteSecurityPermissions;
    use crate::token::Token;
    use sitewright_gateway::operation::ItemRoleAssignment;
    use sitewright_gateway::types::PermissionKind;

    fn declared() -> SiteSecurity {
        SiteSecurity {
            additional_administrators: vec![User::new("alice")],
            site_groups: vec![SiteGroup::new("{sitetitle} Approvers")
                .with_owner("Reviewers")
                .with_member("bob")],
            permissions: SiteSecurityPermissions {
                role_definitions: vec![RoleDefinition::new(
                    "Approve",
                    "Approves items",
                    [PermissionKind::ApproveItems, PermissionKind::ViewListItems],
                )],
                role_assignments: vec![
                    RoleAssignment::grant("Reviewers", "{roledefinition:Reader}"),
                    RoleAssignment::revoke("Reviewers", "Edit"),
                ],
            },
            ..Default::default()
        }
    }

    fn extracted() -> SiteSecurity {
        let mut security = declared();
        security.site_groups[0].owner = "Reviewers".to_string();
        security.site_groups[0].description = Some(String::new());
        security.site_groups[0].request_to_join_leave_email_setting = Some(String::new());
        security.permissions.role_assignments = vec![RoleAssignment::grant("Reviewers", "Read")];
        security
    }

    fn tokens() -> TokenParser {
        let mut parser = TokenParser::new();
        parser.register(Token::fixed(["{sitetitle}", "{sitename}"], "HR"));
        parser.register(Token::fixed(["{roledefinition:Reader}"], "Read"));
        parser
    }

    #[test]
    fn test_round_trip_equivalent() {
        let validator = SecurityValidator::new();
        let mut target = extracted();
        target.site_groups[0].title = "HR Approvers".to_string();
        assert!(validator.validate(&declared(), &target, Some(&tokens())));
    }

    #[test]
    fn test_extra_administrator_fails() {
        let validator = SecurityValidator::new();
        let mut target = extracted();
        target.additional_administrators.push(User::new("mallory"));
        assert_eq!(
            validator.failing_sections(&declared(), &target, Some(&tokens())),
            vec![SecuritySection::Administrators]
        );
    }

    #[test]
    fn test_group_flag_change_fails() {
        let validator = SecurityValidator::new();
        let mut target = extracted();
        target.site_groups[0].allow_members_edit_membership = true;
        assert_eq!(
            validator.failing_sections(&declared(), &target, Some(&tokens())),
            vec![SecuritySection::SiteGroups]
        );
    }

    #[test]
    fn test_undeclared_owner_is_not_compared() {
        let validator = SecurityValidator::new();
        let mut source = declared();
        source.site_groups[0].owner = String::new();
        let mut target = extracted();
        target.site_groups[0].owner = "SHAREPOINT\\system".to_string();
        assert!(validator.validate(&source, &target, Some(&tokens())));
    }

    #[test]
    fn test_missing_role_assignment_fails() {
        let validator = SecurityValidator::new();
        let mut target = extracted();
        target.permissions.role_assignments.clear();
        assert_eq!(
            validator.failing_sections(&declared(), &target, Some(&tokens())),
            vec![SecuritySection::RoleAssignments]
        );
    }

    #[test]
    fn test_validate_object_security() {
        let security = ObjectSecurity {
            role_assignments: vec![RoleAssignment::grant("alice", "Read")],
            ..Default::default()
        };
        let live = ItemPermissions {
            role_assignments: vec![ItemRoleAssignment {
                principal: "i:0#.f|membership|alice".to_string(),
                role_definition: "Read".to_string(),
            }],
            ..Default::default()
        };
        assert!(validate_object_security(&security, &live, None));
        assert!(!validate_object_security(
            &security,
            &ItemPermissions::default(),
            None
        ));
    }
}

//! Site security handler.
//!
//! Reconciles associated groups, additional owners/members/visitors, site
//! groups, site administrators, role definitions and role assignments, in
//! that order.

mod extract;
mod groups;
pub mod ordering;
mod roles;

use async_trait::async_trait;
use sitewright_gateway::operation::WebInfo;
use tracing::instrument;

use super::{ApplyContext, ExtractContext, HandlerKind, ObjectHandler};
use crate::config::ExtractOptions;
use crate::error::ProvisioningResult;
use crate::model::ProvisioningTemplate;
use crate::token::TokenParser;

pub use ordering::{order_groups, SYSTEM_ACCOUNT};

/// Handler for the template's security block.
#[derive(Debug, Clone, Copy, Default)]
pub struct SiteSecurityHandler;

#[async_trait]
impl ObjectHandler for SiteSecurityHandler {
    fn kind(&self) -> HandlerKind {
        HandlerKind::SiteSecurity
    }

    fn will_provision(&self, web: &WebInfo, template: &ProvisioningTemplate) -> bool {
        let security = &template.security;
        if !security.declares_changes() {
            return false;
        }
        // An inheriting sub-site only takes security once it breaks inheritance.
        !(web.is_sub_site && !security.break_role_inheritance && !web.has_unique_role_assignments)
    }

    #[instrument(skip_all, fields(web = %ctx.web.url))]
    async fn provision(
        &self,
        ctx: &ApplyContext<'_>,
        template: &ProvisioningTemplate,
        mut parser: TokenParser,
    ) -> ProvisioningResult<TokenParser> {
        let security = &template.security;

        let mut web = ctx.web.clone();
        if web.is_sub_site && security.break_role_inheritance && !web.has_unique_role_assignments {
            ctx.gateway
                .break_role_inheritance(security.copy_role_assignments, security.clear_subscopes)
                .await?;
            tracing::info!(
                copy_role_assignments = security.copy_role_assignments,
                clear_subscopes = security.clear_subscopes,
                "Broke role inheritance"
            );
            web = ctx.gateway.web().await?;
        }

        groups::apply_associated_groups(ctx, &web, security, &mut parser).await?;
        groups::apply_additional_users(ctx, security, &parser).await?;
        groups::apply_site_groups(ctx, &security.site_groups, &mut parser).await?;
        groups::apply_administrators(ctx, security, &parser).await?;
        roles::apply_role_definitions(ctx, &security.permissions.role_definitions, &mut parser)
            .await?;
        roles::apply_role_assignments(ctx, &security.permissions.role_assignments, &parser)
            .await?;

        Ok(parser)
    }

    fn will_extract(&self, web: &WebInfo, _options: &ExtractOptions) -> bool {
        !web.is_sub_site || web.has_unique_role_assignments
    }

    #[instrument(skip_all, fields(web = %ctx.web.url))]
    async fn extract(
        &self,
        ctx: &ExtractContext<'_>,
        mut template: ProvisioningTemplate,
    ) -> ProvisioningResult<ProvisioningTemplate> {
        let mut security = extract::extract_security(ctx).await?;
        if let Some(base) = &ctx.options.base_template {
            security.prune_against(&base.security);
        }
        template.security = security;
        Ok(template)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ApplyOptions;
    use crate::model::{
        RoleAssignment, RoleDefinition, SiteGroup, SiteSecurity, SiteSecurityPermissions, User,
    };
    use crate::statistics::{ActionType, EntityKind, StatisticsTracker};
    use sitewright_gateway::prelude::*;

    fn web() -> WebInfo {
        WebInfo::new("Contoso HR", "https://contoso.example/sites/hr")
    }

    fn template(security: SiteSecurity) -> ProvisioningTemplate {
        ProvisioningTemplate {
            security,
            ..Default::default()
        }
    }

    async fn provision(
        gateway: &InMemoryGateway,
        template: &ProvisioningTemplate,
    ) -> (TokenParser, StatisticsTracker) {
        let web = gateway.web().await.unwrap();
        let options = ApplyOptions::default();
        let statistics = StatisticsTracker::new();
        let ctx = ApplyContext {
            gateway,
            web: &web,
            options: &options,
            statistics: &statistics,
        };
        let parser = TokenParser::for_site(gateway).await.unwrap();
        let parser = SiteSecurityHandler
            .provision(&ctx, template, parser)
            .await
            .unwrap();
        (parser, statistics)
    }

    #[test]
    fn test_will_provision_gate() {
        let handler = SiteSecurityHandler;
        let declared = template(SiteSecurity {
            site_groups: vec![SiteGroup::new("Approvers")],
            ..Default::default()
        });
        assert!(handler.will_provision(&web(), &declared));
        assert!(!handler.will_provision(&web(), &ProvisioningTemplate::default()));

        let mut inheriting = web();
        inheriting.is_sub_site = true;
        inheriting.has_unique_role_assignments = false;
        assert!(!handler.will_provision(&inheriting, &declared));

        let mut breaking = declared.clone();
        breaking.security.break_role_inheritance = true;
        assert!(handler.will_provision(&inheriting, &breaking));
    }

    #[test]
    fn test_will_extract_gate() {
        let handler = SiteSecurityHandler;
        let options = ExtractOptions::default();
        assert!(handler.will_extract(&web(), &options));

        let mut sub_site = web();
        sub_site.is_sub_site = true;
        sub_site.has_unique_role_assignments = false;
        assert!(!handler.will_extract(&sub_site, &options));
    }

    #[tokio::test]
    async fn test_created_group_registers_token() {
        let gateway = InMemoryGateway::new(web());
        let template = template(SiteSecurity {
            site_groups: vec![SiteGroup {
                only_allow_members_view_membership: true,
                ..SiteGroup::new("{sitetitle} Approvers").with_member("alice")
            }],
            ..Default::default()
        });

        let (parser, statistics) = provision(&gateway, &template).await;

        assert!(parser.is_registered("{groupid:Contoso HR Approvers}"));
        let group = gateway
            .get_group_by_name("Contoso HR Approvers")
            .await
            .unwrap()
            .unwrap();
        let members = gateway.group_members(group.id).await.unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].login_name, "alice");
        // Flags already match what the gateway creates.
        assert!(gateway.writes_for("update_group").await.is_empty());

        let stats = statistics.snapshot();
        assert_eq!(stats.action_count(EntityKind::Group, ActionType::Created), 1);
        assert_eq!(stats.action_count(EntityKind::Member, ActionType::Created), 1);
    }

    #[tokio::test]
    async fn test_self_owned_group() {
        let gateway = InMemoryGateway::new(web());
        let template = template(SiteSecurity {
            site_groups: vec![SiteGroup {
                only_allow_members_view_membership: true,
                ..SiteGroup::new("Approvers").with_owner("approvers")
            }],
            ..Default::default()
        });

        provision(&gateway, &template).await;

        let group = gateway.get_group_by_name("Approvers").await.unwrap().unwrap();
        assert_eq!(group.owner_id, Some(group.id));
        assert!(gateway.writes_for("update_group").await.is_empty());
    }

    #[tokio::test]
    async fn test_description_is_written_to_both_fields() {
        let gateway = InMemoryGateway::new(web());
        let template = template(SiteSecurity {
            site_groups: vec![SiteGroup {
                only_allow_members_view_membership: true,
                ..SiteGroup::new("Approvers").with_description("<p>Approves <b>orders</b></p>")
            }],
            ..Default::default()
        });

        provision(&gateway, &template).await;

        let group = gateway.get_group_by_name("Approvers").await.unwrap().unwrap();
        assert_eq!(group.description, "Approves orders");
        assert_eq!(
            gateway.group_notes(group.id).await.unwrap().as_deref(),
            Some("<p>Approves <b>orders</b></p>")
        );
    }

    #[tokio::test]
    async fn test_associated_groups() {
        let gateway = InMemoryGateway::new(web())
            .with_group(SiteGroupInfo::new("Old Visitors"))
            .with_associated_group(AssociatedGroupRole::Visitor, "Old Visitors");
        let template = template(SiteSecurity {
            associated_owner_group: Some("{sitetitle} Owners".to_string()),
            associated_visitor_group: Some(String::new()),
            additional_owners: vec![User::new("alice")],
            ..Default::default()
        });

        let (parser, _) = provision(&gateway, &template).await;

        let owners = gateway
            .associated_group(AssociatedGroupRole::Owner)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(owners.title, "Contoso HR Owners");
        assert!(gateway
            .associated_group(AssociatedGroupRole::Visitor)
            .await
            .unwrap()
            .is_none());
        assert_eq!(parser.parse("{associatedownergroup}"), "Contoso HR Owners");
        assert_eq!(parser.parse("{associatedvisitorgroup}"), "");

        let members = gateway.group_members(owners.id).await.unwrap();
        assert_eq!(members[0].login_name, "alice");
    }

    #[tokio::test]
    async fn test_associated_groups_untouched_on_no_script_web() {
        let mut no_script = web();
        no_script.is_no_script = true;
        let gateway = InMemoryGateway::new(no_script);
        let template = template(SiteSecurity {
            associated_owner_group: Some("Owners".to_string()),
            additional_administrators: vec![User::new("alice")],
            ..Default::default()
        });

        provision(&gateway, &template).await;

        assert!(gateway.writes_for("add_group").await.is_empty());
        assert!(gateway.writes_for("set_associated_group").await.is_empty());
    }

    #[tokio::test]
    async fn test_clear_existing_members_keeps_listed_users() {
        let gateway = InMemoryGateway::new(web())
            .with_group(SiteGroupInfo::new("Members"))
            .with_associated_group(AssociatedGroupRole::Member, "Members")
            .with_group_member("Members", "alice")
            .with_group_member("Members", "bob");
        let template = template(SiteSecurity {
            clear_existing_members: true,
            additional_members: vec![User::new("alice"), User::new("carol")],
            ..Default::default()
        });

        provision(&gateway, &template).await;

        let group = gateway.get_group_by_name("Members").await.unwrap().unwrap();
        let mut logins: Vec<String> = gateway
            .group_members(group.id)
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.login_name)
            .collect();
        logins.sort();
        assert_eq!(logins, vec!["alice", "carol"]);
        assert_eq!(gateway.writes_for("remove_group_member").await.len(), 1);
    }

    #[tokio::test]
    async fn test_administrators() {
        let gateway = InMemoryGateway::new(web())
            .with_admin("admin")
            .with_unresolvable_principal("ghost");
        let template = template(SiteSecurity {
            clear_existing_administrators: true,
            additional_administrators: vec![User::new("alice"), User::new("ghost")],
            ..Default::default()
        });

        let (_, statistics) = provision(&gateway, &template).await;

        let admins: Vec<String> = gateway
            .administrators()
            .await
            .unwrap()
            .into_iter()
            .map(|a| a.login_name)
            .collect();
        assert_eq!(admins, vec!["alice"]);
        let stats = statistics.snapshot();
        assert_eq!(
            stats.action_count(EntityKind::Administrator, ActionType::FailedSkipped),
            1
        );
        assert_eq!(
            stats.action_count(EntityKind::Administrator, ActionType::Removed),
            1
        );
    }

    #[tokio::test]
    async fn test_role_definition_permissions_are_additive() {
        let existing = BasePermissions::from_kinds(&[PermissionKind::ViewListItems]);
        let gateway = InMemoryGateway::new(web()).with_role_definition("Approve", "Approves", existing);
        let template = template(SiteSecurity {
            permissions: SiteSecurityPermissions {
                role_definitions: vec![
                    RoleDefinition::new("Approve", "Approves", [PermissionKind::ApproveItems]),
                    RoleDefinition::new("Review", "Reviews", [PermissionKind::ViewVersions]),
                ],
                ..Default::default()
            },
            ..Default::default()
        });

        let (parser, _) = provision(&gateway, &template).await;

        let definitions = gateway.role_definitions().await.unwrap();
        let approve = definitions.iter().find(|d| d.name == "Approve").unwrap();
        assert!(approve.permissions.has(PermissionKind::ViewListItems));
        assert!(approve.permissions.has(PermissionKind::ApproveItems));
        assert!(parser.is_registered("{roledefinitionid:Review}"));
        assert_eq!(gateway.writes_for("update_role_definition").await.len(), 1);
    }

    #[tokio::test]
    async fn test_role_assignments_grant_and_revoke() {
        let gateway = InMemoryGateway::new(web())
            .with_group(SiteGroupInfo::new("Reviewers"))
            .with_unresolvable_principal("ghost");
        let grant = template(SiteSecurity {
            permissions: SiteSecurityPermissions {
                role_assignments: vec![
                    RoleAssignment::grant("Reviewers", "{roledefinition:Reader}"),
                    RoleAssignment::grant("Reviewers", "Edit"),
                    RoleAssignment::grant("ghost", "Read"),
                    RoleAssignment::grant("Reviewers", "Missing"),
                ],
                ..Default::default()
            },
            ..Default::default()
        });

        let (_, statistics) = provision(&gateway, &grant).await;
        let stats = statistics.snapshot();
        assert_eq!(
            stats.action_count(EntityKind::RoleAssignment, ActionType::Created),
            2
        );
        assert_eq!(
            stats.action_count(EntityKind::RoleAssignment, ActionType::FailedSkipped),
            2
        );

        let revoke = template(SiteSecurity {
            permissions: SiteSecurityPermissions {
                role_assignments: vec![RoleAssignment::revoke("Reviewers", "Edit")],
                ..Default::default()
            },
            ..Default::default()
        });
        provision(&gateway, &revoke).await;

        let assignments = gateway.role_assignments().await.unwrap();
        assert_eq!(assignments.len(), 1);
        assert!(assignments[0].binds("Read"));
        assert!(!assignments[0].binds("Edit"));
    }

    #[tokio::test]
    async fn test_sub_site_breaks_inheritance_first() {
        let mut sub_site = web();
        sub_site.is_sub_site = true;
        sub_site.has_unique_role_assignments = false;
        let gateway = InMemoryGateway::new(sub_site);
        let template = template(SiteSecurity {
            break_role_inheritance: true,
            associated_member_group: Some("Members".to_string()),
            ..Default::default()
        });

        provision(&gateway, &template).await;

        let writes = gateway.writes().await;
        assert_eq!(writes[0].operation, "break_role_inheritance");
        // Unique permissions now, so the association is managed.
        assert!(gateway
            .associated_group(AssociatedGroupRole::Member)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_extract_tokenizes_and_filters() {
        let mut owned = SiteGroupInfo::new("Contoso HR Approvers");
        owned.owner_login_name = Some("Contoso HR Owners".to_string());
        let gateway = InMemoryGateway::new(web())
            .with_group(SiteGroupInfo::new("Contoso HR Owners"))
            .with_associated_group(AssociatedGroupRole::Owner, "Contoso HR Owners")
            .with_group_member("Contoso HR Owners", "alice")
            .with_group(owned)
            .with_admin("admin")
            .with_role_definition(
                "Approve",
                "Approves",
                BasePermissions::from_kinds(&[PermissionKind::ApproveItems]),
            );
        let web = gateway.web().await.unwrap();
        let options = ExtractOptions {
            include_default_associated_groups: true,
            ..Default::default()
        };
        let ctx = ExtractContext {
            gateway: &gateway,
            web: &web,
            options: &options,
        };

        let template = SiteSecurityHandler
            .extract(&ctx, ProvisioningTemplate::default())
            .await
            .unwrap();
        let security = template.security;

        assert_eq!(
            security.associated_owner_group.as_deref(),
            Some("{sitetitle} Owners")
        );
        assert_eq!(security.additional_owners, vec![User::new("alice")]);
        assert_eq!(security.additional_administrators, vec![User::new("admin")]);
        assert_eq!(security.site_groups.len(), 1);
        assert_eq!(security.site_groups[0].title, "{sitetitle} Approvers");
        assert_eq!(security.site_groups[0].owner, "{associatedownergroup}");
        let names: Vec<&str> = security
            .permissions
            .role_definitions
            .iter()
            .map(|d| d.name.as_str())
            .collect();
        assert_eq!(names, vec!["Approve"]);
    }
}

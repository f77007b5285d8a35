//! Snapshot of a web's security into template form.

use sitewright_gateway::ids::PrincipalId;
use sitewright_gateway::operation::{Principal, SiteGroupInfo};
use sitewright_gateway::types::{AssociatedGroupRole, PrincipalType, RoleType};
use sitewright_gateway::TargetGateway;

use crate::error::ProvisioningResult;
use crate::handlers::ExtractContext;
use crate::model::{RoleAssignment, RoleDefinition, SiteGroup, SiteSecurity, User};
use crate::token::definitions::role_definition_placeholder;
use crate::token::{replace_group_tokens, tokenize_site_title, AssociatedGroupTitles};

/// Principal excluded from extracted role assignments.
const EXCEL_SERVICES_VIEWERS: &str = "Excel Services Viewers";

fn users(principals: &[Principal]) -> Vec<User> {
    principals.iter().map(|p| User::new(&p.login_name)).collect()
}

async fn group_users(
    gateway: &dyn TargetGateway,
    group: Option<&SiteGroupInfo>,
) -> ProvisioningResult<Vec<User>> {
    match group {
        Some(group) => Ok(users(&gateway.group_members(group.id).await?)),
        None => Ok(Vec::new()),
    }
}

/// Read the security of the web into a [`SiteSecurity`].
pub(super) async fn extract_security(ctx: &ExtractContext<'_>) -> ProvisioningResult<SiteSecurity> {
    let gateway = ctx.gateway;
    let web = ctx.web;
    let mut security = SiteSecurity::default();

    let owner = gateway.associated_group(AssociatedGroupRole::Owner).await?;
    let member = gateway.associated_group(AssociatedGroupRole::Member).await?;
    let visitor = gateway.associated_group(AssociatedGroupRole::Visitor).await?;

    if ctx.options.include_default_associated_groups {
        let tokenized = |group: &Option<SiteGroupInfo>| {
            group
                .as_ref()
                .map(|g| tokenize_site_title(&g.title, &web.title))
        };
        security.associated_owner_group = tokenized(&owner);
        security.associated_member_group = tokenized(&member);
        security.associated_visitor_group = tokenized(&visitor);
    }

    security.additional_owners = group_users(gateway, owner.as_ref()).await?;
    security.additional_members = group_users(gateway, member.as_ref()).await?;
    security.additional_visitors = group_users(gateway, visitor.as_ref()).await?;
    security.additional_administrators = users(&gateway.administrators().await?);

    let associated_ids: Vec<PrincipalId> = [&owner, &member, &visitor]
        .into_iter()
        .flatten()
        .map(|g| g.id)
        .collect();
    let associated = AssociatedGroupTitles {
        owner: owner.map(|g| g.title),
        member: member.map(|g| g.title),
        visitor: visitor.map(|g| g.title),
    };

    if ctx.options.include_site_groups {
        if web.is_sub_site {
            tracing::warn!(
                web = %web.url,
                "Extracting site groups from a sub-site includes every group of the site collection"
            );
        }
        for group in gateway.site_groups().await? {
            if associated_ids.contains(&group.id) {
                continue;
            }
            security
                .site_groups
                .push(extract_group(gateway, group, &associated, &web.title).await?);
        }
    }

    if web.has_unique_role_assignments {
        if !web.is_sub_site {
            security.permissions.role_definitions = gateway
                .role_definitions()
                .await?
                .into_iter()
                .filter(|d| !d.role_type.is_built_in())
                .map(|d| RoleDefinition {
                    name: d.name,
                    description: d.description,
                    permissions: d.permissions.kinds(),
                })
                .collect();
        }
        security.permissions.role_assignments =
            extract_role_assignments(ctx, &associated).await?;
    }

    tracing::debug!(
        groups = security.site_groups.len(),
        administrators = security.additional_administrators.len(),
        role_definitions = security.permissions.role_definitions.len(),
        role_assignments = security.permissions.role_assignments.len(),
        "Extracted site security"
    );
    Ok(security)
}

async fn extract_group(
    gateway: &dyn TargetGateway,
    group: SiteGroupInfo,
    associated: &AssociatedGroupTitles,
    site_title: &str,
) -> ProvisioningResult<SiteGroup> {
    tracing::debug!(group = %group.title, "Extracting site group");
    let description = if group.description.is_empty() {
        gateway
            .group_notes(group.id)
            .await?
            .filter(|notes| !notes.is_empty())
    } else {
        Some(group.description.clone())
    };
    let members = users(&gateway.group_members(group.id).await?);

    Ok(SiteGroup {
        title: tokenize_site_title(&group.title, site_title),
        owner: replace_group_tokens(
            group.owner_login_name.as_deref().unwrap_or_default(),
            associated,
            site_title,
        ),
        description,
        allow_members_edit_membership: group.allow_members_edit_membership,
        allow_request_to_join_leave: group.allow_request_to_join_leave,
        auto_accept_request_to_join_leave: group.auto_accept_request_to_join_leave,
        only_allow_members_view_membership: group.only_allow_members_view_membership,
        request_to_join_leave_email_setting: group.request_to_join_leave_email_setting,
        members,
    })
}

async fn extract_role_assignments(
    ctx: &ExtractContext<'_>,
    associated: &AssociatedGroupTitles,
) -> ProvisioningResult<Vec<RoleAssignment>> {
    let mut assignments = Vec::new();
    for assignment in ctx.gateway.role_assignments().await? {
        let member = &assignment.member;
        let is_group = member.principal_type == PrincipalType::SiteGroup;
        if is_group && !ctx.options.include_site_groups {
            continue;
        }
        if member.login_name == EXCEL_SERVICES_VIEWERS {
            continue;
        }
        let principal = if is_group {
            replace_group_tokens(&member.login_name, associated, &ctx.web.title)
        } else {
            member.login_name.clone()
        };

        for binding in &assignment.bindings {
            let role_definition = match binding.role_type {
                RoleType::Guest => continue,
                RoleType::None => binding.name.clone(),
                built_in => role_definition_placeholder(built_in),
            };
            assignments.push(RoleAssignment::grant(principal.clone(), role_definition));
        }
    }
    Ok(assignments)
}

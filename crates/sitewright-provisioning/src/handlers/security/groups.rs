//! Associated groups, site groups, their members and site administrators.

use sitewright_gateway::ids::PrincipalId;
use sitewright_gateway::operation::{GroupChanges, Principal, SiteGroupInfo, WebInfo};
use sitewright_gateway::types::AssociatedGroupRole;
use sitewright_gateway::GatewayErrorKind;

use super::ordering::order_groups;
use crate::error::ProvisioningResult;
use crate::handlers::ApplyContext;
use crate::model::{SiteGroup, SiteSecurity, User};
use crate::statistics::{ActionType, EntityKind};
use crate::text::{html_to_plain_text, MAX_DESCRIPTION_LENGTH};
use crate::token::definitions::group_id_token;
use crate::token::TokenParser;

fn declared_association(security: &SiteSecurity, role: AssociatedGroupRole) -> Option<&str> {
    match role {
        AssociatedGroupRole::Owner => security.associated_owner_group.as_deref(),
        AssociatedGroupRole::Member => security.associated_member_group.as_deref(),
        AssociatedGroupRole::Visitor => security.associated_visitor_group.as_deref(),
    }
}

fn additional_users(security: &SiteSecurity, role: AssociatedGroupRole) -> (bool, &[User]) {
    match role {
        AssociatedGroupRole::Owner => (
            security.clear_existing_owners,
            &security.additional_owners,
        ),
        AssociatedGroupRole::Member => (
            security.clear_existing_members,
            &security.additional_members,
        ),
        AssociatedGroupRole::Visitor => (
            security.clear_existing_visitors,
            &security.additional_visitors,
        ),
    }
}

/// Ensure, replace or remove the owner, member and visitor associations.
///
/// Associations are only managed on webs with unique permissions that allow
/// custom script. The associated-group tokens are refreshed afterwards.
pub(super) async fn apply_associated_groups(
    ctx: &ApplyContext<'_>,
    web: &WebInfo,
    security: &SiteSecurity,
    parser: &mut TokenParser,
) -> ProvisioningResult<()> {
    if !web.has_unique_role_assignments || web.is_no_script {
        tracing::debug!(
            unique = web.has_unique_role_assignments,
            no_script = web.is_no_script,
            "Associated groups are not managed on this web"
        );
        return Ok(());
    }

    for role in AssociatedGroupRole::all() {
        let Some(declared) = declared_association(security, *role) else {
            continue;
        };
        let current = ctx.gateway.associated_group(*role).await?;
        let name = parser.parse(declared);

        if name.trim().is_empty() {
            if current.is_some() {
                ctx.gateway.set_associated_group(*role, None).await?;
                tracing::info!(role = %role, "Removed associated group");
                ctx.record(EntityKind::AssociatedGroup, ActionType::Removed);
            } else {
                ctx.record(EntityKind::AssociatedGroup, ActionType::Skipped);
            }
            continue;
        }

        let group = match ctx.gateway.get_group_by_name(&name).await? {
            Some(group) => group,
            None => {
                let group = ctx.gateway.add_group(&name, "", false).await?;
                parser.register(group_id_token(&group.title, group.id));
                tracing::info!(role = %role, group = %group.title, "Created associated group");
                ctx.record(EntityKind::Group, ActionType::Created);
                group
            }
        };

        if current.as_ref().map(|g| g.id) == Some(group.id) {
            ctx.record(EntityKind::AssociatedGroup, ActionType::Skipped);
            continue;
        }
        ctx.gateway.set_associated_group(*role, Some(group.id)).await?;
        tracing::info!(role = %role, group = %group.title, "Associated group");
        ctx.record(EntityKind::AssociatedGroup, ActionType::Updated);
    }

    for role in AssociatedGroupRole::all() {
        let title = ctx.gateway.associated_group(*role).await?.map(|g| g.title);
        parser.set_associated_group(*role, title.as_deref());
    }
    Ok(())
}

/// Resolve users to principals. Unresolvable names are logged and dropped.
async fn ensure_users(
    ctx: &ApplyContext<'_>,
    users: &[User],
    entity: EntityKind,
    parser: &TokenParser,
) -> ProvisioningResult<Vec<Principal>> {
    let mut principals = Vec::with_capacity(users.len());
    for user in users {
        let name = parser.parse(&user.name);
        if let Some(principal) =
            ctx.skip_unresolved(ctx.gateway.ensure_user(&name).await, entity, &name)?
        {
            principals.push(principal);
        }
    }
    Ok(principals)
}

/// Add the additional owners, members and visitors to the associated groups,
/// first removing current members that are not listed when asked to clear.
pub(super) async fn apply_additional_users(
    ctx: &ApplyContext<'_>,
    security: &SiteSecurity,
    parser: &TokenParser,
) -> ProvisioningResult<()> {
    for role in AssociatedGroupRole::all() {
        let (clear, users) = additional_users(security, *role);
        if !clear && users.is_empty() {
            continue;
        }
        let Some(group) = ctx.gateway.associated_group(*role).await? else {
            if !users.is_empty() {
                tracing::warn!(
                    role = %role,
                    users = users.len(),
                    "Web has no associated group for role, additional users ignored"
                );
            }
            continue;
        };

        let desired = ensure_users(ctx, users, EntityKind::Member, parser).await?;
        let mut members = ctx.gateway.group_members(group.id).await?;

        if clear {
            for member in members.iter().filter(|m| !desired.iter().any(|d| d.id == m.id)) {
                ctx.gateway.remove_group_member(group.id, member.id).await?;
                tracing::info!(
                    group = %group.title,
                    member = %member.login_name,
                    "Removed existing member"
                );
                ctx.record(EntityKind::Member, ActionType::Removed);
            }
            members.retain(|m| desired.iter().any(|d| d.id == m.id));
        }

        add_missing_members(ctx, &group, &mut members, desired).await?;
    }
    Ok(())
}

async fn add_missing_members(
    ctx: &ApplyContext<'_>,
    group: &SiteGroupInfo,
    members: &mut Vec<Principal>,
    desired: Vec<Principal>,
) -> ProvisioningResult<()> {
    for principal in desired {
        if members.iter().any(|m| m.id == principal.id) {
            ctx.record(EntityKind::Member, ActionType::Skipped);
            continue;
        }
        ctx.gateway.add_group_member(group.id, principal.id).await?;
        tracing::debug!(
            group = %group.title,
            member = %principal.login_name,
            "Added group member"
        );
        ctx.record(EntityKind::Member, ActionType::Created);
        members.push(principal);
    }
    Ok(())
}

/// Create or update every declared site group, owners before the groups
/// they own.
pub(super) async fn apply_site_groups(
    ctx: &ApplyContext<'_>,
    groups: &[SiteGroup],
    parser: &mut TokenParser,
) -> ProvisioningResult<()> {
    for group in order_groups(groups) {
        apply_site_group(ctx, group, parser).await?;
    }
    Ok(())
}

async fn apply_site_group(
    ctx: &ApplyContext<'_>,
    group: &SiteGroup,
    parser: &mut TokenParser,
) -> ProvisioningResult<()> {
    let title = parser.parse(&group.title);
    let owner = parser.parse(&group.owner).trim().to_string();
    let description = group.description.as_deref().map(|d| parser.parse(d));
    let plain_description = description
        .as_deref()
        .map(|d| html_to_plain_text(d, MAX_DESCRIPTION_LENGTH));
    let self_owned = owner.eq_ignore_ascii_case(title.trim());

    let (mut live, created) = match ctx.gateway.get_group_by_name(&title).await? {
        Some(live) => (live, false),
        None => {
            let live = ctx
                .gateway
                .add_group(&title, plain_description.as_deref().unwrap_or_default(), self_owned)
                .await?;
            parser.register(group_id_token(&live.title, live.id));
            tracing::info!(group = %title, self_owned, "Created site group");
            ctx.record(EntityKind::Group, ActionType::Created);
            (live, true)
        }
    };
    let mut updated = false;

    // The native description is length limited, the notes keep the rich text.
    if let Some(description) = &description {
        let notes = ctx.gateway.group_notes(live.id).await?;
        if notes.as_deref() != Some(description.as_str()) {
            ctx.gateway.set_group_notes(live.id, description).await?;
            updated = true;
        }
    }

    let mut changes = GroupChanges::default();
    if let Some(plain) = plain_description {
        if live.description != plain {
            changes.description = Some(plain);
        }
    }
    if live.allow_members_edit_membership != group.allow_members_edit_membership {
        changes.allow_members_edit_membership = Some(group.allow_members_edit_membership);
    }
    if live.allow_request_to_join_leave != group.allow_request_to_join_leave {
        changes.allow_request_to_join_leave = Some(group.allow_request_to_join_leave);
    }
    if live.auto_accept_request_to_join_leave != group.auto_accept_request_to_join_leave {
        changes.auto_accept_request_to_join_leave = Some(group.auto_accept_request_to_join_leave);
    }
    if live.only_allow_members_view_membership != group.only_allow_members_view_membership {
        changes.only_allow_members_view_membership =
            Some(group.only_allow_members_view_membership);
    }
    if let Some(email) = &group.request_to_join_leave_email_setting {
        let email = parser.parse(email);
        if live.request_to_join_leave_email_setting.as_deref() != Some(email.as_str()) {
            changes.request_to_join_leave_email_setting = Some(email);
        }
    }
    if !owner.is_empty() {
        changes.owner = owner_change(ctx, &live, &owner, self_owned).await?;
    }

    if !changes.is_empty() {
        tracing::debug!(
            group = %title,
            fields = ?changes.changed_fields(),
            "Updating site group"
        );
        live = ctx.gateway.update_group(live.id, &changes).await?;
        updated = true;
    }

    if !created {
        let action = if updated {
            ActionType::Updated
        } else {
            ActionType::Skipped
        };
        ctx.record(EntityKind::Group, action);
    }

    let mut members = ctx.gateway.group_members(live.id).await?;
    let desired = ensure_users(ctx, &group.members, EntityKind::Member, parser).await?;
    add_missing_members(ctx, &live, &mut members, desired).await
}

/// Principal to set as owner of `live`, `None` when it is already owned by
/// `owner` or the owner cannot be resolved.
async fn owner_change(
    ctx: &ApplyContext<'_>,
    live: &SiteGroupInfo,
    owner: &str,
    self_owned: bool,
) -> ProvisioningResult<Option<PrincipalId>> {
    if self_owned {
        return Ok((live.owner_id != Some(live.id)).then_some(live.id));
    }
    let current = live.owner_login_name.as_deref().unwrap_or_default();
    if current.eq_ignore_ascii_case(owner) {
        return Ok(None);
    }

    if let Some(group) = ctx.gateway.get_group_by_name(owner).await? {
        return Ok((live.owner_id != Some(group.id)).then_some(group.id));
    }
    match ctx.gateway.ensure_user(owner).await {
        Ok(user) => Ok((live.owner_id != Some(user.id)).then_some(user.id)),
        Err(err) if err.kind() == GatewayErrorKind::PrincipalNotResolved => {
            tracing::warn!(
                group = %live.title,
                owner = %owner,
                error = %err,
                "Group owner could not be resolved, owner left unchanged"
            );
            Ok(None)
        }
        Err(err) => Err(err.into()),
    }
}

/// Flag the declared administrators. With `clear_existing_administrators`
/// every other administrator is un-flagged first.
pub(super) async fn apply_administrators(
    ctx: &ApplyContext<'_>,
    security: &SiteSecurity,
    parser: &TokenParser,
) -> ProvisioningResult<()> {
    let clear = security.clear_existing_administrators;
    if !clear && security.additional_administrators.is_empty() {
        return Ok(());
    }

    let desired = ensure_users(
        ctx,
        &security.additional_administrators,
        EntityKind::Administrator,
        parser,
    )
    .await?;

    if clear {
        for admin in ctx.gateway.administrators().await? {
            if desired.iter().any(|d| d.id == admin.id) {
                continue;
            }
            ctx.gateway.set_site_admin(admin.id, false).await?;
            tracing::info!(admin = %admin.login_name, "Removed site administrator");
            ctx.record(EntityKind::Administrator, ActionType::Removed);
        }
    }

    for principal in desired {
        if principal.is_site_admin {
            ctx.record(EntityKind::Administrator, ActionType::Skipped);
            continue;
        }
        ctx.gateway.set_site_admin(principal.id, true).await?;
        tracing::info!(admin = %principal.login_name, "Added site administrator");
        ctx.record(EntityKind::Administrator, ActionType::Created);
    }
    Ok(())
}

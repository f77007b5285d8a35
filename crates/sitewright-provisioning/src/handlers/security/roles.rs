//! Role definitions and web role assignments.

use sitewright_gateway::operation::{
    Principal, RoleAssignmentInfo, RoleBinding, RoleDefinitionChanges, RoleDefinitionInfo,
};
use sitewright_gateway::types::BasePermissions;

use crate::error::ProvisioningResult;
use crate::handlers::ApplyContext;
use crate::model::{RoleAssignment, RoleDefinition};
use crate::statistics::{ActionType, EntityKind};
use crate::token::definitions::role_definition_id_token;
use crate::token::TokenParser;

/// Create missing role definitions and extend existing ones.
///
/// Declared permissions are added to the live mask, never removed from it.
pub(super) async fn apply_role_definitions(
    ctx: &ApplyContext<'_>,
    definitions: &[RoleDefinition],
    parser: &mut TokenParser,
) -> ProvisioningResult<()> {
    if definitions.is_empty() {
        return Ok(());
    }
    let live = ctx.gateway.role_definitions().await?;

    for definition in definitions {
        let name = parser.parse(&definition.name);
        let description = parser.parse(&definition.description);
        let declared = BasePermissions::from_kinds(definition.permissions.iter());

        let Some(existing) = live.iter().find(|d| d.name == name) else {
            let created = ctx
                .gateway
                .add_role_definition(&name, &description, declared)
                .await?;
            parser.register(role_definition_id_token(&created.name, created.id));
            tracing::info!(role_definition = %name, "Created role definition");
            ctx.record(EntityKind::RoleDefinition, ActionType::Created);
            continue;
        };

        let merged = existing.permissions.union(declared);
        let changes = RoleDefinitionChanges {
            description: (existing.description != description).then_some(description),
            permissions: (merged != existing.permissions).then_some(merged),
        };
        if changes.is_empty() {
            ctx.record(EntityKind::RoleDefinition, ActionType::Skipped);
            continue;
        }
        ctx.gateway
            .update_role_definition(existing.id, &changes)
            .await?;
        tracing::info!(
            role_definition = %name,
            description = changes.description.is_some(),
            permissions = changes.permissions.is_some(),
            "Updated role definition"
        );
        ctx.record(EntityKind::RoleDefinition, ActionType::Updated);
    }
    Ok(())
}

async fn resolve_principal(
    ctx: &ApplyContext<'_>,
    name: &str,
) -> ProvisioningResult<Option<Principal>> {
    if let Some(group) = ctx.gateway.get_group_by_name(name).await? {
        return Ok(Some(group.as_principal()));
    }
    ctx.skip_unresolved(
        ctx.gateway.ensure_user(name).await,
        EntityKind::RoleAssignment,
        name,
    )
}

/// Grant or revoke web role assignments.
pub(super) async fn apply_role_assignments(
    ctx: &ApplyContext<'_>,
    assignments: &[RoleAssignment],
    parser: &TokenParser,
) -> ProvisioningResult<()> {
    if assignments.is_empty() {
        return Ok(());
    }
    // Re-read so definitions created above are visible.
    let definitions = ctx.gateway.role_definitions().await?;
    let mut live = ctx.gateway.role_assignments().await?;

    for assignment in assignments {
        let role_name = parser.parse(&assignment.role_definition);
        let Some(definition) = definitions.iter().find(|d| d.name == role_name) else {
            tracing::warn!(
                role_definition = %role_name,
                principal = %assignment.principal,
                "Role definition not found, assignment skipped"
            );
            ctx.record(EntityKind::RoleAssignment, ActionType::FailedSkipped);
            continue;
        };

        let principal_name = parser.parse(&assignment.principal);
        let Some(principal) = resolve_principal(ctx, &principal_name).await? else {
            continue;
        };
        let bound = live
            .iter()
            .any(|a| a.member.id == principal.id && a.binds(&definition.name));

        if assignment.remove {
            if !bound {
                ctx.record(EntityKind::RoleAssignment, ActionType::Skipped);
                continue;
            }
            ctx.gateway
                .remove_role_assignment(principal.id, definition.id)
                .await?;
            unbind(&mut live, &principal, definition);
            tracing::info!(
                principal = %principal.login_name,
                role_definition = %definition.name,
                "Removed role assignment"
            );
            ctx.record(EntityKind::RoleAssignment, ActionType::Removed);
            continue;
        }

        if bound {
            ctx.record(EntityKind::RoleAssignment, ActionType::Skipped);
            continue;
        }
        ctx.gateway
            .add_role_assignment(principal.id, definition.id)
            .await?;
        bind(&mut live, principal, definition);
        tracing::info!(
            principal = %principal_name,
            role_definition = %definition.name,
            "Added role assignment"
        );
        ctx.record(EntityKind::RoleAssignment, ActionType::Created);
    }
    Ok(())
}

fn bind(live: &mut Vec<RoleAssignmentInfo>, principal: Principal, definition: &RoleDefinitionInfo) {
    let binding = RoleBinding {
        id: definition.id,
        name: definition.name.clone(),
        role_type: definition.role_type,
    };
    match live.iter_mut().find(|a| a.member.id == principal.id) {
        Some(assignment) => assignment.bindings.push(binding),
        None => live.push(RoleAssignmentInfo {
            member: principal,
            bindings: vec![binding],
        }),
    }
}

/// Drop the first binding of `definition` held by `principal`.
fn unbind(live: &mut [RoleAssignmentInfo], principal: &Principal, definition: &RoleDefinitionInfo) {
    if let Some(assignment) = live.iter_mut().find(|a| a.member.id == principal.id) {
        if let Some(index) = assignment.bindings.iter().position(|b| b.id == definition.id) {
            assignment.bindings.remove(index);
        }
    }
}

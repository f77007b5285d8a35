//! Gateway traits
//!
//! Capability-based trait definitions for reading and writing live site state.
//! The provisioning engine only consumes these traits; transport, retry and
//! batching policy belong to the implementation.

use async_trait::async_trait;

use crate::error::GatewayResult;
use crate::ids::{PrincipalId, RoleDefinitionId};
use crate::operation::{
    CustomActionInfo, FieldInfo, GroupChanges, ItemPermissions, ItemQuery, ListInfo, ListItem,
    Principal, RoleAssignmentInfo, RoleDefinitionChanges, RoleDefinitionInfo, SiteGroupInfo,
    WebInfo,
};
use crate::types::{AssociatedGroupRole, BasePermissions, CustomActionScope};

/// Base trait for all gateways.
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Get the display name for this gateway instance.
    fn display_name(&self) -> &str;

    /// Read the web the gateway is bound to.
    async fn web(&self) -> GatewayResult<WebInfo>;

    /// Stop inheriting role assignments from the parent web.
    async fn break_role_inheritance(
        &self,
        copy_role_assignments: bool,
        clear_subscopes: bool,
    ) -> GatewayResult<()>;
}

/// Capability for resolving users and managing site administrators.
#[async_trait]
pub trait PrincipalOp: Gateway {
    /// Resolve a login name to a user, adding the user to the site if needed.
    ///
    /// Fails with `PrincipalNotResolved` when the name is unknown to the
    /// directory.
    async fn ensure_user(&self, login_name: &str) -> GatewayResult<Principal>;

    /// All users known to the site.
    async fn site_users(&self) -> GatewayResult<Vec<Principal>>;

    /// Users flagged as site collection administrators.
    async fn administrators(&self) -> GatewayResult<Vec<Principal>> {
        Ok(self
            .site_users()
            .await?
            .into_iter()
            .filter(|user| user.is_site_admin)
            .collect())
    }

    /// Set or clear the administrator flag of a user.
    async fn set_site_admin(&self, principal: PrincipalId, is_admin: bool) -> GatewayResult<()>;
}

/// Capability for managing site groups.
#[async_trait]
pub trait GroupOp: Gateway {
    /// All site groups.
    async fn site_groups(&self) -> GatewayResult<Vec<SiteGroupInfo>>;

    /// Find a group by title or login name.
    async fn get_group_by_name(&self, name: &str) -> GatewayResult<Option<SiteGroupInfo>>;

    /// Check whether a group with this title exists.
    async fn group_exists(&self, name: &str) -> GatewayResult<bool> {
        Ok(self.get_group_by_name(name).await?.is_some())
    }

    /// Create a group. A self-owned group is its own owner.
    async fn add_group(
        &self,
        title: &str,
        description: &str,
        self_owned: bool,
    ) -> GatewayResult<SiteGroupInfo>;

    /// Write the fields carried by `changes`.
    async fn update_group(
        &self,
        group: PrincipalId,
        changes: &GroupChanges,
    ) -> GatewayResult<SiteGroupInfo>;

    /// Rich-text notes kept in the group's auxiliary metadata.
    async fn group_notes(&self, group: PrincipalId) -> GatewayResult<Option<String>>;

    /// Write the group's auxiliary notes.
    async fn set_group_notes(&self, group: PrincipalId, notes: &str) -> GatewayResult<()>;

    /// Members of a group.
    async fn group_members(&self, group: PrincipalId) -> GatewayResult<Vec<Principal>>;

    /// Add a principal to a group.
    async fn add_group_member(&self, group: PrincipalId, member: PrincipalId) -> GatewayResult<()>;

    /// Remove a principal from a group.
    async fn remove_group_member(
        &self,
        group: PrincipalId,
        member: PrincipalId,
    ) -> GatewayResult<()>;

    /// The group currently associated with a role, if any.
    async fn associated_group(
        &self,
        role: AssociatedGroupRole,
    ) -> GatewayResult<Option<SiteGroupInfo>>;

    /// Associate a group with a role, or clear the association.
    async fn set_associated_group(
        &self,
        role: AssociatedGroupRole,
        group: Option<PrincipalId>,
    ) -> GatewayResult<()>;
}

/// Capability for managing role definitions and web role assignments.
#[async_trait]
pub trait RoleOp: Gateway {
    /// All role definitions of the web, built-in ones included.
    async fn role_definitions(&self) -> GatewayResult<Vec<RoleDefinitionInfo>>;

    /// Create a custom role definition.
    async fn add_role_definition(
        &self,
        name: &str,
        description: &str,
        permissions: BasePermissions,
    ) -> GatewayResult<RoleDefinitionInfo>;

    /// Write the fields carried by `changes`.
    async fn update_role_definition(
        &self,
        id: RoleDefinitionId,
        changes: &RoleDefinitionChanges,
    ) -> GatewayResult<RoleDefinitionInfo>;

    /// Role assignments of the web, one entry per principal.
    async fn role_assignments(&self) -> GatewayResult<Vec<RoleAssignmentInfo>>;

    /// Bind a role definition to a principal.
    async fn add_role_assignment(
        &self,
        principal: PrincipalId,
        role_definition: RoleDefinitionId,
    ) -> GatewayResult<()>;

    /// Remove a single binding from a principal's role assignment.
    async fn remove_role_assignment(
        &self,
        principal: PrincipalId,
        role_definition: RoleDefinitionId,
    ) -> GatewayResult<()>;
}

/// Capability for reading and writing list items.
#[async_trait]
pub trait ListOp: Gateway {
    /// Find a list by title.
    async fn list_by_title(&self, title: &str) -> GatewayResult<Option<ListInfo>>;

    /// Fields of a list.
    async fn list_fields(&self, list: &ListInfo) -> GatewayResult<Vec<FieldInfo>>;

    /// Items matching a query, at most `query.row_limit`.
    async fn query_items(&self, list: &ListInfo, query: &ItemQuery)
        -> GatewayResult<Vec<ListItem>>;

    /// Create an empty item. Fields are written by a later `commit_item`.
    async fn create_item(&self, list: &ListInfo) -> GatewayResult<ListItem>;

    /// Flush the item's staged field writes as one call.
    async fn commit_item(&self, list: &ListInfo, item: &mut ListItem) -> GatewayResult<()>;

    /// Unique permissions of an item, `None` when it inherits.
    async fn item_security(
        &self,
        list: &ListInfo,
        item: &ListItem,
    ) -> GatewayResult<Option<ItemPermissions>>;

    /// Break inheritance on an item and apply role assignments.
    async fn set_item_security(
        &self,
        list: &ListInfo,
        item: &ListItem,
        security: &ItemPermissions,
    ) -> GatewayResult<()>;
}

/// Capability for managing custom actions.
#[async_trait]
pub trait CustomActionOp: Gateway {
    /// Custom actions registered at a scope.
    async fn custom_actions(&self, scope: CustomActionScope)
        -> GatewayResult<Vec<CustomActionInfo>>;

    /// Register a custom action.
    async fn add_custom_action(
        &self,
        scope: CustomActionScope,
        action: &CustomActionInfo,
    ) -> GatewayResult<CustomActionInfo>;

    /// Overwrite a registered custom action, matched by id.
    async fn update_custom_action(
        &self,
        scope: CustomActionScope,
        action: &CustomActionInfo,
    ) -> GatewayResult<()>;

    /// Remove a custom action.
    async fn remove_custom_action(
        &self,
        scope: CustomActionScope,
        action: &CustomActionInfo,
    ) -> GatewayResult<()>;
}

/// Marker trait for gateways that support every capability the provisioning
/// engine needs.
pub trait TargetGateway: PrincipalOp + GroupOp + RoleOp + ListOp + CustomActionOp {}

// Blanket implementation for any gateway that implements all capabilities
impl<T> TargetGateway for T where T: PrincipalOp + GroupOp + RoleOp + ListOp + CustomActionOp {}

//! # Target Gateway
//!
//! The interface through which the sitewright provisioning engine reads and
//! writes live site state.
//!
//! The engine never talks to a site directly. It consumes the capability
//! traits defined here and leaves the wire protocol, authentication and retry
//! policy to the implementation:
//!
//! - [`Gateway`] - Base trait every gateway implements
//! - [`PrincipalOp`] - Resolve users, manage site administrators
//! - [`GroupOp`] - Site groups, membership and associated groups
//! - [`RoleOp`] - Role definitions and web role assignments
//! - [`ListOp`] - Keyed item queries and batched field writes
//! - [`CustomActionOp`] - Site and web custom actions
//! - [`TargetGateway`] - Everything above, blanket-implemented
//!
//! Failures carry a closed [`GatewayErrorKind`] so callers can decide which
//! errors are recoverable without inspecting messages.
//!
//! ## Example
//!
//! ```ignore
//! use sitewright_gateway::prelude::*;
//!
//! let gateway = InMemoryGateway::new(WebInfo::new("Contoso", "https://contoso.example"))
//!     .with_user("alice")
//!     .with_group(SiteGroupInfo::new("Approvers"));
//!
//! let alice = gateway.ensure_user("alice").await?;
//! let approvers = gateway.get_group_by_name("Approvers").await?.unwrap();
//! gateway.add_group_member(approvers.id, alice.id).await?;
//! assert_eq!(gateway.write_count().await, 1);
//! ```

pub mod error;
pub mod ids;
pub mod memory;
pub mod operation;
pub mod traits;
pub mod types;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::error::{GatewayError, GatewayErrorKind, GatewayResult};
    pub use crate::ids::{CustomActionId, ItemId, ListId, PrincipalId, RoleDefinitionId};
    pub use crate::memory::{InMemoryGateway, WriteCall};
    pub use crate::operation::{
        CustomActionInfo, FieldInfo, GroupChanges, ItemPermissions, ItemQuery,
        ItemRoleAssignment, ListInfo, ListItem, Principal, RoleAssignmentInfo, RoleBinding,
        RoleDefinitionChanges, RoleDefinitionInfo, SiteGroupInfo, WebInfo,
    };
    pub use crate::traits::{
        CustomActionOp, Gateway, GroupOp, ListOp, PrincipalOp, RoleOp, TargetGateway,
    };
    pub use crate::types::{
        AssociatedGroupRole, BasePermissions, CustomActionScope, FieldType, PermissionKind,
        PrincipalType, QueryValueType, RoleType,
    };
}

pub use error::{GatewayError, GatewayErrorKind, GatewayResult};
pub use memory::InMemoryGateway;
pub use traits::{CustomActionOp, Gateway, GroupOp, ListOp, PrincipalOp, RoleOp, TargetGateway};

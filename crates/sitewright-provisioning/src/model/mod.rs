//! Provisioning template model.
//!
//! Plain owned data mirroring the template document. Templates are loaded
//! and persisted by the caller; the engine reads them on apply and builds them
//! on extract.

pub mod custom_action;
pub mod list;
pub mod security;

use serde::{Deserialize, Serialize};

pub use custom_action::{CustomAction, CustomActions};
pub use list::{DataRow, DataRows, ListInstance, UpdateBehavior};
pub use security::{
    ObjectSecurity, RoleAssignment, RoleDefinition, SiteGroup, SiteSecurity,
    SiteSecurityPermissions, User,
};

/// Root aggregate of a provisioning template.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProvisioningTemplate {
    pub id: Option<String>,
    pub security: SiteSecurity,
    pub lists: Vec<ListInstance>,
    pub custom_actions: CustomActions,
}

impl ProvisioningTemplate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a template from its JSON representation.
    pub fn from_json(json: &str) -> crate::error::ProvisioningResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serialize the template to pretty-printed JSON.
    pub fn to_json(&self) -> crate::error::ProvisioningResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

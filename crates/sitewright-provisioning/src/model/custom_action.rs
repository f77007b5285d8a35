//! Site and web custom actions.

use serde::{Deserialize, Serialize};
use sitewright_gateway::types::PermissionKind;
use std::collections::BTreeSet;

/// Custom actions at both registration scopes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CustomActions {
    pub site_custom_actions: Vec<CustomAction>,
    pub web_custom_actions: Vec<CustomAction>,
}

impl CustomActions {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.site_custom_actions.is_empty() && self.web_custom_actions.is_empty()
    }

    /// Remove actions equal to one in `base`.
    pub fn prune_against(&mut self, base: &CustomActions) {
        self.site_custom_actions
            .retain(|action| !base.site_custom_actions.contains(action));
        self.web_custom_actions
            .retain(|action| !base.web_custom_actions.contains(action));
    }
}

/// A user custom action, keyed by name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CustomAction {
    pub name: String,
    pub title: String,
    pub description: String,
    pub location: String,
    pub group: String,
    pub sequence: i32,
    pub url: String,
    pub script_block: String,
    pub script_src: String,
    pub image_url: String,
    pub registration_type: String,
    pub registration_id: String,
    pub rights: BTreeSet<PermissionKind>,
    /// Delete the action instead of ensuring it.
    pub remove: bool,
}

impl CustomAction {
    pub fn new(name: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            location: location.into(),
            ..Default::default()
        }
    }
}

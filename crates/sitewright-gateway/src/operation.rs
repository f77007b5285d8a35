//! Gateway operation types
//!
//! Snapshots of live objects read from the target and the change sets
//! written back to it.

use quick_xml::escape::escape;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::ids::{CustomActionId, ItemId, ListId, PrincipalId, RoleDefinitionId};
use crate::types::{
    BasePermissions, CustomActionScope, FieldType, PrincipalType, QueryValueType, RoleType,
};

/// The site (web) the gateway is bound to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebInfo {
    pub title: String,
    pub url: String,
    /// Whether this web is a sub-site of a site collection.
    pub is_sub_site: bool,
    /// Whether the web has its own role assignments instead of inheriting.
    pub has_unique_role_assignments: bool,
    /// Whether custom script is disabled on the web.
    pub is_no_script: bool,
}

impl WebInfo {
    /// Create a root web with unique permissions.
    pub fn new(title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            is_sub_site: false,
            has_unique_role_assignments: true,
            is_no_script: false,
        }
    }
}

/// A resolved user or group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: PrincipalId,
    pub login_name: String,
    pub title: String,
    pub principal_type: PrincipalType,
    pub is_site_admin: bool,
}

impl Principal {
    /// Create a user principal whose title equals its login name.
    pub fn user(login_name: impl Into<String>) -> Self {
        let login_name = login_name.into();
        Self {
            id: PrincipalId::new(),
            title: login_name.clone(),
            login_name,
            principal_type: PrincipalType::User,
            is_site_admin: false,
        }
    }
}

/// A site group as read from the target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteGroupInfo {
    pub id: PrincipalId,
    pub title: String,
    pub login_name: String,
    /// Plain-text description (length-limited on the target).
    pub description: String,
    pub owner_id: Option<PrincipalId>,
    pub owner_login_name: Option<String>,
    pub allow_members_edit_membership: bool,
    pub allow_request_to_join_leave: bool,
    pub auto_accept_request_to_join_leave: bool,
    pub only_allow_members_view_membership: bool,
    pub request_to_join_leave_email_setting: Option<String>,
}

impl SiteGroupInfo {
    /// Create a group snapshot with default settings and no owner.
    pub fn new(title: impl Into<String>) -> Self {
        let title = title.into();
        Self {
            id: PrincipalId::new(),
            login_name: title.clone(),
            title,
            description: String::new(),
            owner_id: None,
            owner_login_name: None,
            allow_members_edit_membership: false,
            allow_request_to_join_leave: false,
            auto_accept_request_to_join_leave: false,
            only_allow_members_view_membership: false,
            request_to_join_leave_email_setting: None,
        }
    }

    /// Principal view of this group.
    #[must_use]
    pub fn as_principal(&self) -> Principal {
        Principal {
            id: self.id,
            login_name: self.login_name.clone(),
            title: self.title.clone(),
            principal_type: PrincipalType::SiteGroup,
            is_site_admin: false,
        }
    }
}

/// Partial update of a site group. Only `Some` fields are written.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupChanges {
    pub description: Option<String>,
    pub owner: Option<PrincipalId>,
    pub allow_members_edit_membership: Option<bool>,
    pub allow_request_to_join_leave: Option<bool>,
    pub auto_accept_request_to_join_leave: Option<bool>,
    pub only_allow_members_view_membership: Option<bool>,
    pub request_to_join_leave_email_setting: Option<String>,
}

impl GroupChanges {
    /// Check if nothing would be written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changed_fields().is_empty()
    }

    /// Names of the fields carried by this change set.
    #[must_use]
    pub fn changed_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.description.is_some() {
            fields.push("description");
        }
        if self.owner.is_some() {
            fields.push("owner");
        }
        if self.allow_members_edit_membership.is_some() {
            fields.push("allow_members_edit_membership");
        }
        if self.allow_request_to_join_leave.is_some() {
            fields.push("allow_request_to_join_leave");
        }
        if self.auto_accept_request_to_join_leave.is_some() {
            fields.push("auto_accept_request_to_join_leave");
        }
        if self.only_allow_members_view_membership.is_some() {
            fields.push("only_allow_members_view_membership");
        }
        if self.request_to_join_leave_email_setting.is_some() {
            fields.push("request_to_join_leave_email_setting");
        }
        fields
    }

    /// Apply this change set to a group snapshot.
    pub fn apply_to(&self, group: &mut SiteGroupInfo) {
        if let Some(description) = &self.description {
            group.description.clone_from(description);
        }
        if let Some(owner) = self.owner {
            group.owner_id = Some(owner);
        }
        if let Some(value) = self.allow_members_edit_membership {
            group.allow_members_edit_membership = value;
        }
        if let Some(value) = self.allow_request_to_join_leave {
            group.allow_request_to_join_leave = value;
        }
        if let Some(value) = self.auto_accept_request_to_join_leave {
            group.auto_accept_request_to_join_leave = value;
        }
        if let Some(value) = self.only_allow_members_view_membership {
            group.only_allow_members_view_membership = value;
        }
        if let Some(value) = &self.request_to_join_leave_email_setting {
            group.request_to_join_leave_email_setting = Some(value.clone());
        }
    }
}

/// A role definition as read from the target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleDefinitionInfo {
    pub id: RoleDefinitionId,
    pub name: String,
    pub description: String,
    pub role_type: RoleType,
    pub permissions: BasePermissions,
}

/// Partial update of a role definition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleDefinitionChanges {
    pub description: Option<String>,
    pub permissions: Option<BasePermissions>,
}

impl RoleDefinitionChanges {
    /// Check if nothing would be written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.description.is_none() && self.permissions.is_none()
    }
}

/// A role definition bound to a principal through a role assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleBinding {
    pub id: RoleDefinitionId,
    pub name: String,
    pub role_type: RoleType,
}

/// All role definitions bound to one principal on the web.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleAssignmentInfo {
    pub member: Principal,
    pub bindings: Vec<RoleBinding>,
}

impl RoleAssignmentInfo {
    /// Check if the assignment binds the named role definition.
    #[must_use]
    pub fn binds(&self, role_definition: &str) -> bool {
        self.bindings.iter().any(|b| b.name == role_definition)
    }
}

/// A list on the web.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListInfo {
    pub id: ListId,
    pub title: String,
}

/// A field (column) of a list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldInfo {
    pub internal_name: String,
    pub title: String,
    pub field_type: FieldType,
}

impl FieldInfo {
    /// Check if the field is addressed by `name` (internal name or title).
    #[must_use]
    pub fn is_named(&self, name: &str) -> bool {
        self.internal_name == name || self.title == name
    }
}

/// A list item with locally staged field writes.
///
/// `set_field` only stages a value. Staged values reach the target when the
/// item is passed to `ListOp::commit_item`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListItem {
    pub id: ItemId,
    values: BTreeMap<String, String>,
    #[serde(skip)]
    pending: BTreeMap<String, String>,
}

impl ListItem {
    /// Create an item snapshot.
    #[must_use]
    pub fn new(id: ItemId, values: BTreeMap<String, String>) -> Self {
        Self {
            id,
            values,
            pending: BTreeMap::new(),
        }
    }

    /// Current value of a field, including staged writes.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&str> {
        self.pending
            .get(name)
            .or_else(|| self.values.get(name))
            .map(String::as_str)
    }

    /// Committed field values.
    #[must_use]
    pub fn values(&self) -> &BTreeMap<String, String> {
        &self.values
    }

    /// Stage a field write.
    pub fn set_field(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.pending.insert(name.into(), value.into());
    }

    /// Staged writes not yet committed.
    #[must_use]
    pub fn pending(&self) -> &BTreeMap<String, String> {
        &self.pending
    }

    /// Check if any write is staged.
    #[must_use]
    pub fn has_pending_changes(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Move staged writes into the committed values.
    pub fn mark_committed(&mut self) {
        let pending = std::mem::take(&mut self.pending);
        self.values.extend(pending);
    }
}

/// Single-key lookup of list items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemQuery {
    pub field: String,
    pub value: String,
    pub value_type: QueryValueType,
    pub row_limit: u32,
}

impl ItemQuery {
    /// Query for at most one item whose `field` equals `value`.
    pub fn key_equals(
        field: impl Into<String>,
        value: impl Into<String>,
        value_type: QueryValueType,
    ) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
            value_type,
            row_limit: 1,
        }
    }

    /// Render the query as a view document understood by the target.
    #[must_use]
    pub fn to_view_xml(&self) -> String {
        format!(
            "<View><Query><Where><Eq><FieldRef Name=\"{}\"/><Value Type=\"{}\">{}</Value></Eq></Where></Query><RowLimit>{}</RowLimit></View>",
            escape(self.field.as_str()),
            self.value_type,
            escape(self.value.as_str()),
            self.row_limit
        )
    }
}

/// A role assignment on a single list item.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemRoleAssignment {
    pub principal: String,
    pub role_definition: String,
}

/// Unique permissions of a list item, as last applied.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemPermissions {
    pub copy_role_assignments: bool,
    pub clear_subscopes: bool,
    pub role_assignments: Vec<ItemRoleAssignment>,
}

/// A custom action registered on the site or web.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomActionInfo {
    pub id: CustomActionId,
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
    pub rights: BasePermissions,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_changes_fields() {
        let changes = GroupChanges {
            allow_request_to_join_leave: Some(true),
            ..Default::default()
        };
        assert!(!changes.is_empty());
        assert_eq!(changes.changed_fields(), vec!["allow_request_to_join_leave"]);
        assert!(GroupChanges::default().is_empty());
    }

    #[test]
    fn test_list_item_staging() {
        let mut item = ListItem::new(
            ItemId::new(),
            BTreeMap::from([("Price".to_string(), "5.00".to_string())]),
        );
        item.set_field("Price", "9.99");
        assert_eq!(item.field("Price"), Some("9.99"));
        assert_eq!(item.values()["Price"], "5.00");
        assert!(item.has_pending_changes());

        item.mark_committed();
        assert!(!item.has_pending_changes());
        assert_eq!(item.values()["Price"], "9.99");
    }

    #[test]
    fn test_item_query_view_xml() {
        let query = ItemQuery::key_equals("SKU", "A&B<1>", QueryValueType::Text);
        assert_eq!(
            query.to_view_xml(),
            "<View><Query><Where><Eq><FieldRef Name=\"SKU\"/><Value Type=\"Text\">A&amp;B&lt;1&gt;</Value></Eq></Where></Query><RowLimit>1</RowLimit></View>"
        );
    }

    #[test]
    fn test_role_assignment_binds() {
        let assignment = RoleAssignmentInfo {
            member: Principal::user("alice"),
            bindings: vec![RoleBinding {
                id: RoleDefinitionId::new(),
                name: "Approve".to_string(),
                role_type: RoleType::None,
            }],
        };
        assert!(assignment.binds("Approve"));
        assert!(!assignment.binds("Read"));
    }
}

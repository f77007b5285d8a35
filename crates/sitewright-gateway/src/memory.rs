//! In-memory gateway
//!
//! A complete [`TargetGateway`](crate::traits::TargetGateway) backed by
//! process memory. Every mutating call is recorded so callers can assert on
//! the exact writes a reconciliation issued.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use tokio::sync::RwLock;

use crate::error::{GatewayError, GatewayResult};
use crate::ids::{CustomActionId, ItemId, ListId, PrincipalId, RoleDefinitionId};
use crate::operation::{
    CustomActionInfo, FieldInfo, GroupChanges, ItemPermissions, ItemQuery, ListInfo, ListItem,
    Principal, RoleAssignmentInfo, RoleBinding, RoleDefinitionChanges, RoleDefinitionInfo,
    SiteGroupInfo, WebInfo,
};
use crate::traits::{CustomActionOp, Gateway, GroupOp, ListOp, PrincipalOp, RoleOp};
use crate::types::{
    AssociatedGroupRole, BasePermissions, CustomActionScope, PermissionKind, RoleType,
};

/// A mutating call received by the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteCall {
    /// Trait method name, e.g. `update_group`.
    pub operation: &'static str,
    /// Name of the object written.
    pub target: String,
    /// Field names carried by the call, when it writes selected fields.
    pub fields: Vec<String>,
}

#[derive(Debug)]
struct ListState {
    info: ListInfo,
    fields: Vec<FieldInfo>,
    unique_fields: HashSet<String>,
    items: Vec<(ItemId, BTreeMap<String, String>)>,
    security: HashMap<ItemId, ItemPermissions>,
}

#[derive(Debug)]
struct SiteState {
    web: WebInfo,
    users: Vec<Principal>,
    unresolvable: HashSet<String>,
    failing: HashSet<String>,
    groups: Vec<SiteGroupInfo>,
    notes: HashMap<PrincipalId, String>,
    members: HashMap<PrincipalId, Vec<PrincipalId>>,
    associated: HashMap<AssociatedGroupRole, PrincipalId>,
    role_definitions: Vec<RoleDefinitionInfo>,
    role_assignments: Vec<(PrincipalId, Vec<RoleDefinitionId>)>,
    lists: Vec<ListState>,
    custom_actions: HashMap<CustomActionScope, Vec<CustomActionInfo>>,
    writes: Vec<WriteCall>,
}

impl SiteState {
    fn record(&mut self, operation: &'static str, target: impl Into<String>) {
        self.record_fields(operation, target, Vec::new());
    }

    fn record_fields(
        &mut self,
        operation: &'static str,
        target: impl Into<String>,
        fields: Vec<String>,
    ) {
        let target = target.into();
        tracing::debug!(operation, target = %target, "In-memory gateway write");
        self.writes.push(WriteCall {
            operation,
            target,
            fields,
        });
    }

    fn check_failure(&self, operation: &str) -> GatewayResult<()> {
        if self.failing.contains(operation) {
            return Err(GatewayError::operation_failed(format!(
                "injected failure in {operation}"
            )));
        }
        Ok(())
    }

    fn principal(&self, id: PrincipalId) -> Option<Principal> {
        self.users
            .iter()
            .find(|user| user.id == id)
            .cloned()
            .or_else(|| {
                self.groups
                    .iter()
                    .find(|group| group.id == id)
                    .map(SiteGroupInfo::as_principal)
            })
    }

    fn group(&self, id: PrincipalId) -> GatewayResult<&SiteGroupInfo> {
        self.groups
            .iter()
            .find(|group| group.id == id)
            .ok_or_else(|| GatewayError::GroupNotFound {
                name: id.to_string(),
            })
    }

    fn group_by_title(&self, title: &str) -> Option<&SiteGroupInfo> {
        self.groups.iter().find(|group| {
            group.title.eq_ignore_ascii_case(title) || group.login_name.eq_ignore_ascii_case(title)
        })
    }

    fn role_definition(&self, id: RoleDefinitionId) -> GatewayResult<&RoleDefinitionInfo> {
        self.role_definitions
            .iter()
            .find(|def| def.id == id)
            .ok_or_else(|| GatewayError::RoleDefinitionNotFound {
                name: id.to_string(),
            })
    }

    fn list(&self, id: ListId) -> GatewayResult<&ListState> {
        self.lists
            .iter()
            .find(|list| list.info.id == id)
            .ok_or_else(|| GatewayError::ListNotFound {
                title: id.to_string(),
            })
    }

    fn list_mut(&mut self, id: ListId) -> GatewayResult<&mut ListState> {
        self.lists
            .iter_mut()
            .find(|list| list.info.id == id)
            .ok_or_else(|| GatewayError::ListNotFound {
                title: id.to_string(),
            })
    }

    fn list_by_title_mut(&mut self, title: &str) -> Option<&mut ListState> {
        self.lists.iter_mut().find(|list| list.info.title == title)
    }

    fn add_user(&mut self, login_name: &str) -> Principal {
        let user = Principal::user(login_name);
        self.users.push(user.clone());
        user
    }

    fn find_or_add_user(&mut self, login_name: &str) -> Principal {
        match self
            .users
            .iter()
            .find(|user| user.login_name.eq_ignore_ascii_case(login_name))
        {
            Some(user) => user.clone(),
            None => self.add_user(login_name),
        }
    }
}

/// Gateway keeping a whole site in memory.
///
/// Built-in role definitions (Full Control, Design, Edit, Contribute, Read,
/// Limited Access) are present from the start. Builder methods seed the
/// remaining live state; inspection methods expose the write log.
#[derive(Debug)]
pub struct InMemoryGateway {
    name: String,
    state: RwLock<SiteState>,
}

impl InMemoryGateway {
    /// Create a gateway for the given web.
    #[must_use]
    pub fn new(web: WebInfo) -> Self {
        Self {
            name: format!("in-memory:{}", web.url),
            state: RwLock::new(SiteState {
                web,
                users: Vec::new(),
                unresolvable: HashSet::new(),
                failing: HashSet::new(),
                groups: Vec::new(),
                notes: HashMap::new(),
                members: HashMap::new(),
                associated: HashMap::new(),
                role_definitions: built_in_role_definitions(),
                role_assignments: Vec::new(),
                lists: Vec::new(),
                custom_actions: HashMap::new(),
                writes: Vec::new(),
            }),
        }
    }

    /// Add a site user.
    #[must_use]
    pub fn with_user(mut self, login_name: &str) -> Self {
        self.state.get_mut().find_or_add_user(login_name);
        self
    }

    /// Add a site user flagged as administrator.
    #[must_use]
    pub fn with_admin(mut self, login_name: &str) -> Self {
        let state = self.state.get_mut();
        let id = state.find_or_add_user(login_name).id;
        if let Some(user) = state.users.iter_mut().find(|user| user.id == id) {
            user.is_site_admin = true;
        }
        self
    }

    /// Make `ensure_user` fail for this login name.
    #[must_use]
    pub fn with_unresolvable_principal(mut self, login_name: &str) -> Self {
        self.state
            .get_mut()
            .unresolvable
            .insert(login_name.to_lowercase());
        self
    }

    /// Make every call of a mutating operation fail, e.g. `add_group`.
    #[must_use]
    pub fn with_failure(mut self, operation: &str) -> Self {
        self.state.get_mut().failing.insert(operation.to_string());
        self
    }

    /// Add a site group.
    #[must_use]
    pub fn with_group(mut self, group: SiteGroupInfo) -> Self {
        self.state.get_mut().groups.push(group);
        self
    }

    /// Add a user to a seeded group.
    #[must_use]
    pub fn with_group_member(mut self, group_title: &str, login_name: &str) -> Self {
        let state = self.state.get_mut();
        let member = state.find_or_add_user(login_name).id;
        if let Some(group) = state.group_by_title(group_title).map(|group| group.id) {
            state.members.entry(group).or_default().push(member);
        }
        self
    }

    /// Associate a seeded group with a role.
    #[must_use]
    pub fn with_associated_group(mut self, role: AssociatedGroupRole, group_title: &str) -> Self {
        let state = self.state.get_mut();
        if let Some(group) = state.group_by_title(group_title).map(|group| group.id) {
            state.associated.insert(role, group);
        }
        self
    }

    /// Add a custom role definition.
    #[must_use]
    pub fn with_role_definition(
        mut self,
        name: &str,
        description: &str,
        permissions: BasePermissions,
    ) -> Self {
        self.state.get_mut().role_definitions.push(RoleDefinitionInfo {
            id: RoleDefinitionId::new(),
            name: name.to_string(),
            description: description.to_string(),
            role_type: RoleType::None,
            permissions,
        });
        self
    }

    /// Add a list with the given fields.
    #[must_use]
    pub fn with_list(mut self, title: &str, fields: Vec<FieldInfo>) -> Self {
        self.state.get_mut().lists.push(ListState {
            info: ListInfo {
                id: ListId::new(),
                title: title.to_string(),
            },
            fields,
            unique_fields: HashSet::new(),
            items: Vec::new(),
            security: HashMap::new(),
        });
        self
    }

    /// Enforce unique values on a list field.
    #[must_use]
    pub fn with_unique_field(mut self, list_title: &str, field: &str) -> Self {
        if let Some(list) = self.state.get_mut().list_by_title_mut(list_title) {
            list.unique_fields.insert(field.to_string());
        }
        self
    }

    /// Add an item to a list.
    #[must_use]
    pub fn with_item(mut self, list_title: &str, values: &[(&str, &str)]) -> Self {
        if let Some(list) = self.state.get_mut().list_by_title_mut(list_title) {
            let values = values
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect();
            list.items.push((ItemId::new(), values));
        }
        self
    }

    /// Register a custom action.
    #[must_use]
    pub fn with_custom_action(mut self, scope: CustomActionScope, action: CustomActionInfo) -> Self {
        self.state
            .get_mut()
            .custom_actions
            .entry(scope)
            .or_default()
            .push(action);
        self
    }

    /// Every write received so far.
    pub async fn writes(&self) -> Vec<WriteCall> {
        self.state.read().await.writes.clone()
    }

    /// Number of writes received so far.
    pub async fn write_count(&self) -> usize {
        self.state.read().await.writes.len()
    }

    /// Writes of one operation.
    pub async fn writes_for(&self, operation: &str) -> Vec<WriteCall> {
        self.state
            .read()
            .await
            .writes
            .iter()
            .filter(|call| call.operation == operation)
            .cloned()
            .collect()
    }

    /// Forget recorded writes.
    pub async fn reset_writes(&self) {
        self.state.write().await.writes.clear();
    }

    /// Stop failing operations injected with [`InMemoryGateway::with_failure`].
    pub async fn clear_failures(&self) {
        self.state.write().await.failing.clear();
    }

    /// Field values of every item of a list.
    pub async fn items(&self, list_title: &str) -> Vec<BTreeMap<String, String>> {
        self.state
            .read()
            .await
            .lists
            .iter()
            .find(|list| list.info.title == list_title)
            .map(|list| list.items.iter().map(|(_, values)| values.clone()).collect())
            .unwrap_or_default()
    }
}

fn built_in_role_definitions() -> Vec<RoleDefinitionInfo> {
    use PermissionKind::*;

    let read = [
        ViewListItems,
        OpenItems,
        ViewVersions,
        CreateAlerts,
        ViewFormPages,
        Open,
        ViewPages,
        BrowseUserInfo,
        UseClientIntegration,
        UseRemoteAPIs,
    ];
    let contribute = [
        AddListItems,
        EditListItems,
        DeleteListItems,
        DeleteVersions,
        ManagePersonalViews,
        AddDelPrivateWebParts,
        UpdatePersonalWebParts,
        BrowseDirectories,
        EditMyUserInfo,
    ];
    let edit = [ManageLists];
    let design = [
        ApproveItems,
        CancelCheckout,
        AddAndCustomizePages,
        ApplyThemeAndBorder,
        ApplyStyleSheets,
    ];

    fn mask(groups: &[&[PermissionKind]]) -> BasePermissions {
        groups.iter().fold(BasePermissions::empty(), |acc, kinds| {
            acc.union(BasePermissions::from_kinds(kinds.iter()))
        })
    }

    let definition = |name: &str, description: &str, role_type, permissions| RoleDefinitionInfo {
        id: RoleDefinitionId::new(),
        name: name.to_string(),
        description: description.to_string(),
        role_type,
        permissions,
    };

    vec![
        definition(
            "Full Control",
            "Has full control.",
            RoleType::Administrator,
            BasePermissions::full(),
        ),
        definition(
            "Design",
            "Can view, add, update, delete, approve, and customize.",
            RoleType::WebDesigner,
            mask(&[&read[..], &contribute[..], &edit[..], &design[..]]),
        ),
        definition(
            "Edit",
            "Can add, edit and delete lists; can view, add, update and delete list items and documents.",
            RoleType::Editor,
            mask(&[&read[..], &contribute[..], &edit[..]]),
        ),
        definition(
            "Contribute",
            "Can view, add, update, and delete list items and documents.",
            RoleType::Contributor,
            mask(&[&read[..], &contribute[..]]),
        ),
        definition(
            "Read",
            "Can view pages and list items and download documents.",
            RoleType::Reader,
            mask(&[&read[..]]),
        ),
        definition(
            "Limited Access",
            "Can view specific lists, document libraries, list items, folders, or documents when given permissions.",
            RoleType::Guest,
            mask(&[&[Open, BrowseUserInfo, UseClientIntegration, UseRemoteAPIs][..]]),
        ),
    ]
}

#[async_trait]
impl Gateway for InMemoryGateway {
    fn display_name(&self) -> &str {
        &self.name
    }

    async fn web(&self) -> GatewayResult<WebInfo> {
        Ok(self.state.read().await.web.clone())
    }

    async fn break_role_inheritance(
        &self,
        copy_role_assignments: bool,
        _clear_subscopes: bool,
    ) -> GatewayResult<()> {
        let mut state = self.state.write().await;
        state.check_failure("break_role_inheritance")?;
        state.web.has_unique_role_assignments = true;
        if !copy_role_assignments {
            state.role_assignments.clear();
        }
        let url = state.web.url.clone();
        state.record("break_role_inheritance", url);
        Ok(())
    }
}

#[async_trait]
impl PrincipalOp for InMemoryGateway {
    async fn ensure_user(&self, login_name: &str) -> GatewayResult<Principal> {
        let mut state = self.state.write().await;
        state.check_failure("ensure_user")?;
        if login_name.trim().is_empty() || state.unresolvable.contains(&login_name.to_lowercase())
        {
            return Err(GatewayError::principal_not_resolved(login_name));
        }
        if let Some(user) = state
            .users
            .iter()
            .find(|user| user.login_name.eq_ignore_ascii_case(login_name))
        {
            return Ok(user.clone());
        }
        let user = state.add_user(login_name);
        state.record("ensure_user", login_name);
        Ok(user)
    }

    async fn site_users(&self) -> GatewayResult<Vec<Principal>> {
        Ok(self.state.read().await.users.clone())
    }

    async fn set_site_admin(&self, principal: PrincipalId, is_admin: bool) -> GatewayResult<()> {
        let mut state = self.state.write().await;
        state.check_failure("set_site_admin")?;
        let user = state
            .users
            .iter_mut()
            .find(|user| user.id == principal)
            .ok_or_else(|| GatewayError::not_found(principal.to_string()))?;
        user.is_site_admin = is_admin;
        let login_name = user.login_name.clone();
        state.record("set_site_admin", login_name);
        Ok(())
    }
}

#[async_trait]
impl GroupOp for InMemoryGateway {
    async fn site_groups(&self) -> GatewayResult<Vec<SiteGroupInfo>> {
        Ok(self.state.read().await.groups.clone())
    }

    async fn get_group_by_name(&self, name: &str) -> GatewayResult<Option<SiteGroupInfo>> {
        Ok(self.state.read().await.group_by_title(name).cloned())
    }

    async fn add_group(
        &self,
        title: &str,
        description: &str,
        self_owned: bool,
    ) -> GatewayResult<SiteGroupInfo> {
        let mut state = self.state.write().await;
        state.check_failure("add_group")?;
        if state.group_by_title(title).is_some() {
            return Err(GatewayError::ObjectAlreadyExists {
                identifier: title.to_string(),
            });
        }
        let mut group = SiteGroupInfo::new(title);
        group.description = description.to_string();
        group.only_allow_members_view_membership = true;
        if self_owned {
            group.owner_id = Some(group.id);
            group.owner_login_name = Some(group.login_name.clone());
        }
        state.groups.push(group.clone());
        state.record("add_group", title);
        Ok(group)
    }

    async fn update_group(
        &self,
        group: PrincipalId,
        changes: &GroupChanges,
    ) -> GatewayResult<SiteGroupInfo> {
        let mut state = self.state.write().await;
        state.check_failure("update_group")?;
        let owner_login_name = match changes.owner {
            Some(owner) => Some(
                state
                    .principal(owner)
                    .ok_or_else(|| GatewayError::not_found(owner.to_string()))?
                    .login_name,
            ),
            None => None,
        };
        let updated = {
            let target = state
                .groups
                .iter_mut()
                .find(|g| g.id == group)
                .ok_or_else(|| GatewayError::GroupNotFound {
                    name: group.to_string(),
                })?;
            changes.apply_to(target);
            if owner_login_name.is_some() {
                target.owner_login_name = owner_login_name;
            }
            target.clone()
        };
        let fields = changes
            .changed_fields()
            .into_iter()
            .map(str::to_string)
            .collect();
        state.record_fields("update_group", updated.title.clone(), fields);
        Ok(updated)
    }

    async fn group_notes(&self, group: PrincipalId) -> GatewayResult<Option<String>> {
        let state = self.state.read().await;
        state.group(group)?;
        Ok(state.notes.get(&group).cloned())
    }

    async fn set_group_notes(&self, group: PrincipalId, notes: &str) -> GatewayResult<()> {
        let mut state = self.state.write().await;
        state.check_failure("set_group_notes")?;
        let title = state.group(group)?.title.clone();
        state.notes.insert(group, notes.to_string());
        state.record("set_group_notes", title);
        Ok(())
    }

    async fn group_members(&self, group: PrincipalId) -> GatewayResult<Vec<Principal>> {
        let state = self.state.read().await;
        state.group(group)?;
        Ok(state
            .members
            .get(&group)
            .map(|members| {
                members
                    .iter()
                    .filter_map(|id| state.principal(*id))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn add_group_member(&self, group: PrincipalId, member: PrincipalId) -> GatewayResult<()> {
        let mut state = self.state.write().await;
        state.check_failure("add_group_member")?;
        let title = state.group(group)?.title.clone();
        let login_name = state
            .principal(member)
            .ok_or_else(|| GatewayError::not_found(member.to_string()))?
            .login_name;
        let members = state.members.entry(group).or_default();
        if !members.contains(&member) {
            members.push(member);
        }
        state.record("add_group_member", format!("{title}/{login_name}"));
        Ok(())
    }

    async fn remove_group_member(
        &self,
        group: PrincipalId,
        member: PrincipalId,
    ) -> GatewayResult<()> {
        let mut state = self.state.write().await;
        state.check_failure("remove_group_member")?;
        let title = state.group(group)?.title.clone();
        if let Some(members) = state.members.get_mut(&group) {
            members.retain(|id| *id != member);
        }
        state.record("remove_group_member", format!("{title}/{member}"));
        Ok(())
    }

    async fn associated_group(
        &self,
        role: AssociatedGroupRole,
    ) -> GatewayResult<Option<SiteGroupInfo>> {
        let state = self.state.read().await;
        Ok(state
            .associated
            .get(&role)
            .and_then(|id| state.group(*id).ok())
            .cloned())
    }

    async fn set_associated_group(
        &self,
        role: AssociatedGroupRole,
        group: Option<PrincipalId>,
    ) -> GatewayResult<()> {
        let mut state = self.state.write().await;
        state.check_failure("set_associated_group")?;
        match group {
            Some(id) => {
                let title = state.group(id)?.title.clone();
                state.associated.insert(role, id);
                state.record("set_associated_group", format!("{role}/{title}"));
            }
            None => {
                state.associated.remove(&role);
                state.record("set_associated_group", role.to_string());
            }
        }
        Ok(())
    }
}

#[async_trait]
impl RoleOp for InMemoryGateway {
    async fn role_definitions(&self) -> GatewayResult<Vec<RoleDefinitionInfo>> {
        Ok(self.state.read().await.role_definitions.clone())
    }

    async fn add_role_definition(
        &self,
        name: &str,
        description: &str,
        permissions: BasePermissions,
    ) -> GatewayResult<RoleDefinitionInfo> {
        let mut state = self.state.write().await;
        state.check_failure("add_role_definition")?;
        if state.role_definitions.iter().any(|def| def.name == name) {
            return Err(GatewayError::ObjectAlreadyExists {
                identifier: name.to_string(),
            });
        }
        let definition = RoleDefinitionInfo {
            id: RoleDefinitionId::new(),
            name: name.to_string(),
            description: description.to_string(),
            role_type: RoleType::None,
            permissions,
        };
        state.role_definitions.push(definition.clone());
        state.record("add_role_definition", name);
        Ok(definition)
    }

    async fn update_role_definition(
        &self,
        id: RoleDefinitionId,
        changes: &RoleDefinitionChanges,
    ) -> GatewayResult<RoleDefinitionInfo> {
        let mut state = self.state.write().await;
        state.check_failure("update_role_definition")?;
        let updated = {
            let definition = state
                .role_definitions
                .iter_mut()
                .find(|def| def.id == id)
                .ok_or_else(|| GatewayError::RoleDefinitionNotFound {
                    name: id.to_string(),
                })?;
            if let Some(description) = &changes.description {
                definition.description.clone_from(description);
            }
            if let Some(permissions) = changes.permissions {
                definition.permissions = permissions;
            }
            definition.clone()
        };
        state.record("update_role_definition", updated.name.clone());
        Ok(updated)
    }

    async fn role_assignments(&self) -> GatewayResult<Vec<RoleAssignmentInfo>> {
        let state = self.state.read().await;
        let mut assignments = Vec::new();
        for (principal, definitions) in &state.role_assignments {
            let Some(member) = state.principal(*principal) else {
                continue;
            };
            let bindings: Vec<RoleBinding> = definitions
                .iter()
                .filter_map(|id| state.role_definition(*id).ok())
                .map(|def| RoleBinding {
                    id: def.id,
                    name: def.name.clone(),
                    role_type: def.role_type,
                })
                .collect();
            if !bindings.is_empty() {
                assignments.push(RoleAssignmentInfo { member, bindings });
            }
        }
        Ok(assignments)
    }

    async fn add_role_assignment(
        &self,
        principal: PrincipalId,
        role_definition: RoleDefinitionId,
    ) -> GatewayResult<()> {
        let mut state = self.state.write().await;
        state.check_failure("add_role_assignment")?;
        let login_name = state
            .principal(principal)
            .ok_or_else(|| GatewayError::not_found(principal.to_string()))?
            .login_name;
        let role_name = state.role_definition(role_definition)?.name.clone();
        match state
            .role_assignments
            .iter_mut()
            .find(|(id, _)| *id == principal)
        {
            Some((_, definitions)) => {
                if !definitions.contains(&role_definition) {
                    definitions.push(role_definition);
                }
            }
            None => state
                .role_assignments
                .push((principal, vec![role_definition])),
        }
        state.record("add_role_assignment", format!("{login_name}/{role_name}"));
        Ok(())
    }

    async fn remove_role_assignment(
        &self,
        principal: PrincipalId,
        role_definition: RoleDefinitionId,
    ) -> GatewayResult<()> {
        let mut state = self.state.write().await;
        state.check_failure("remove_role_assignment")?;
        let role_name = state.role_definition(role_definition)?.name.clone();
        if let Some((_, definitions)) = state
            .role_assignments
            .iter_mut()
            .find(|(id, _)| *id == principal)
        {
            definitions.retain(|id| *id != role_definition);
        }
        state
            .role_assignments
            .retain(|(_, definitions)| !definitions.is_empty());
        state.record("remove_role_assignment", format!("{principal}/{role_name}"));
        Ok(())
    }
}

#[async_trait]
impl ListOp for InMemoryGateway {
    async fn list_by_title(&self, title: &str) -> GatewayResult<Option<ListInfo>> {
        Ok(self
            .state
            .read()
            .await
            .lists
            .iter()
            .find(|list| list.info.title == title)
            .map(|list| list.info.clone()))
    }

    async fn list_fields(&self, list: &ListInfo) -> GatewayResult<Vec<FieldInfo>> {
        Ok(self.state.read().await.list(list.id)?.fields.clone())
    }

    async fn query_items(
        &self,
        list: &ListInfo,
        query: &ItemQuery,
    ) -> GatewayResult<Vec<ListItem>> {
        let state = self.state.read().await;
        Ok(state
            .list(list.id)?
            .items
            .iter()
            .filter(|(_, values)| values.get(&query.field) == Some(&query.value))
            .take(query.row_limit as usize)
            .map(|(id, values)| ListItem::new(*id, values.clone()))
            .collect())
    }

    async fn create_item(&self, list: &ListInfo) -> GatewayResult<ListItem> {
        let mut state = self.state.write().await;
        state.check_failure("create_item")?;
        state.list(list.id)?;
        state.record("create_item", list.title.clone());
        Ok(ListItem::new(ItemId::new(), BTreeMap::new()))
    }

    async fn commit_item(&self, list: &ListInfo, item: &mut ListItem) -> GatewayResult<()> {
        let mut state = self.state.write().await;
        state.check_failure("commit_item")?;
        {
            let target = state.list_mut(list.id)?;
            for field in &target.unique_fields {
                if let Some(value) = item.pending().get(field) {
                    let clash = target.items.iter().any(|(id, values)| {
                        *id != item.id && values.get(field) == Some(value)
                    });
                    if clash {
                        return Err(GatewayError::duplicate_value(field, value));
                    }
                }
            }
            match target.items.iter_mut().find(|(id, _)| *id == item.id) {
                Some((_, values)) => values.extend(item.pending().clone()),
                None => target.items.push((item.id, item.pending().clone())),
            }
        }
        let fields = item.pending().keys().cloned().collect();
        state.record_fields("commit_item", list.title.clone(), fields);
        item.mark_committed();
        Ok(())
    }

    async fn item_security(
        &self,
        list: &ListInfo,
        item: &ListItem,
    ) -> GatewayResult<Option<ItemPermissions>> {
        let state = self.state.read().await;
        Ok(state.list(list.id)?.security.get(&item.id).cloned())
    }

    async fn set_item_security(
        &self,
        list: &ListInfo,
        item: &ListItem,
        security: &ItemPermissions,
    ) -> GatewayResult<()> {
        let mut state = self.state.write().await;
        state.check_failure("set_item_security")?;
        state
            .list_mut(list.id)?
            .security
            .insert(item.id, security.clone());
        state.record("set_item_security", format!("{}/{}", list.title, item.id));
        Ok(())
    }
}

#[async_trait]
impl CustomActionOp for InMemoryGateway {
    async fn custom_actions(
        &self,
        scope: CustomActionScope,
    ) -> GatewayResult<Vec<CustomActionInfo>> {
        Ok(self
            .state
            .read()
            .await
            .custom_actions
            .get(&scope)
            .cloned()
            .unwrap_or_default())
    }

    async fn add_custom_action(
        &self,
        scope: CustomActionScope,
        action: &CustomActionInfo,
    ) -> GatewayResult<CustomActionInfo> {
        let mut state = self.state.write().await;
        state.check_failure("add_custom_action")?;
        let mut added = action.clone();
        added.id = CustomActionId::new();
        state
            .custom_actions
            .entry(scope)
            .or_default()
            .push(added.clone());
        state.record("add_custom_action", format!("{scope}/{}", action.name));
        Ok(added)
    }

    async fn update_custom_action(
        &self,
        scope: CustomActionScope,
        action: &CustomActionInfo,
    ) -> GatewayResult<()> {
        let mut state = self.state.write().await;
        state.check_failure("update_custom_action")?;
        let existing = state
            .custom_actions
            .get_mut(&scope)
            .and_then(|actions| actions.iter_mut().find(|a| a.id == action.id))
            .ok_or_else(|| GatewayError::not_found(action.name.clone()))?;
        *existing = action.clone();
        state.record("update_custom_action", format!("{scope}/{}", action.name));
        Ok(())
    }

    async fn remove_custom_action(
        &self,
        scope: CustomActionScope,
        action: &CustomActionInfo,
    ) -> GatewayResult<()> {
        let mut state = self.state.write().await;
        state.check_failure("remove_custom_action")?;
        if let Some(actions) = state.custom_actions.get_mut(&scope) {
            actions.retain(|a| a.id != action.id);
        }
        state.record("remove_custom_action", format!("{scope}/{}", action.name));
        Ok(())
    }
}

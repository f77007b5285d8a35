//! Gateway type definitions
//!
//! Enums and small value types shared by the gateway interface and the
//! provisioning engine.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Error parsing one of the gateway enums from a string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseTypeError {
    type_name: &'static str,
    value: String,
}

impl ParseTypeError {
    fn new(type_name: &'static str, value: &str) -> Self {
        Self {
            type_name,
            value: value.to_string(),
        }
    }
}

impl fmt::Display for ParseTypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid {} '{}'", self.type_name, self.value)
    }
}

impl std::error::Error for ParseTypeError {}

/// A single right that can be granted through a role definition.
///
/// The discriminant is the position of the right in the permission mask,
/// offset by one (`EmptyMask` is 0 and grants nothing, `FullMask` grants
/// everything).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum PermissionKind {
    EmptyMask = 0,
    ViewListItems = 1,
    AddListItems = 2,
    EditListItems = 3,
    DeleteListItems = 4,
    ApproveItems = 5,
    OpenItems = 6,
    ViewVersions = 7,
    DeleteVersions = 8,
    CancelCheckout = 9,
    ManagePersonalViews = 10,
    ManageLists = 12,
    ViewFormPages = 13,
    AnonymousSearchAccessList = 14,
    Open = 17,
    ViewPages = 18,
    AddAndCustomizePages = 19,
    ApplyThemeAndBorder = 20,
    ApplyStyleSheets = 21,
    ViewUsageData = 22,
    CreateSSCSite = 23,
    ManageSubwebs = 24,
    CreateGroups = 25,
    ManagePermissions = 26,
    BrowseDirectories = 27,
    BrowseUserInfo = 28,
    AddDelPrivateWebParts = 29,
    UpdatePersonalWebParts = 30,
    ManageWeb = 31,
    AnonymousSearchAccessWebLists = 32,
    UseClientIntegration = 37,
    UseRemoteAPIs = 38,
    ManageAlerts = 39,
    CreateAlerts = 40,
    EditMyUserInfo = 41,
    EnumeratePermissions = 63,
    FullMask = 65,
}

impl PermissionKind {
    /// All rights that occupy a single bit of the mask.
    pub const GRANULAR: &'static [PermissionKind] = &[
        PermissionKind::ViewListItems,
        PermissionKind::AddListItems,
        PermissionKind::EditListItems,
        PermissionKind::DeleteListItems,
        PermissionKind::ApproveItems,
        PermissionKind::OpenItems,
        PermissionKind::ViewVersions,
        PermissionKind::DeleteVersions,
        PermissionKind::CancelCheckout,
        PermissionKind::ManagePersonalViews,
        PermissionKind::ManageLists,
        PermissionKind::ViewFormPages,
        PermissionKind::AnonymousSearchAccessList,
        PermissionKind::Open,
        PermissionKind::ViewPages,
        PermissionKind::AddAndCustomizePages,
        PermissionKind::ApplyThemeAndBorder,
        PermissionKind::ApplyStyleSheets,
        PermissionKind::ViewUsageData,
        PermissionKind::CreateSSCSite,
        PermissionKind::ManageSubwebs,
        PermissionKind::CreateGroups,
        PermissionKind::ManagePermissions,
        PermissionKind::BrowseDirectories,
        PermissionKind::BrowseUserInfo,
        PermissionKind::AddDelPrivateWebParts,
        PermissionKind::UpdatePersonalWebParts,
        PermissionKind::ManageWeb,
        PermissionKind::AnonymousSearchAccessWebLists,
        PermissionKind::UseClientIntegration,
        PermissionKind::UseRemoteAPIs,
        PermissionKind::ManageAlerts,
        PermissionKind::CreateAlerts,
        PermissionKind::EditMyUserInfo,
        PermissionKind::EnumeratePermissions,
    ];

    /// Mask bit for this right, `None` for the two aggregate values.
    #[must_use]
    pub fn bit(self) -> Option<u64> {
        match self {
            PermissionKind::EmptyMask | PermissionKind::FullMask => None,
            kind => Some(1u64 << ((kind as u32) - 1)),
        }
    }
}

impl fmt::Display for PermissionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

impl FromStr for PermissionKind {
    type Err = ParseTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("EmptyMask") {
            return Ok(PermissionKind::EmptyMask);
        }
        if s.eq_ignore_ascii_case("FullMask") {
            return Ok(PermissionKind::FullMask);
        }
        PermissionKind::GRANULAR
            .iter()
            .copied()
            .find(|kind| kind.to_string().eq_ignore_ascii_case(s))
            .ok_or_else(|| ParseTypeError::new("permission kind", s))
    }
}

/// Permission mask of a role definition or custom action.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BasePermissions(u64);

impl BasePermissions {
    /// Empty mask.
    #[must_use]
    pub fn empty() -> Self {
        Self(0)
    }

    /// Mask with every right set.
    #[must_use]
    pub fn full() -> Self {
        Self(u64::MAX)
    }

    /// Build a mask from a set of rights.
    pub fn from_kinds<'a>(kinds: impl IntoIterator<Item = &'a PermissionKind>) -> Self {
        let mut mask = Self::empty();
        for kind in kinds {
            mask.set(*kind);
        }
        mask
    }

    /// Grant a right.
    pub fn set(&mut self, kind: PermissionKind) {
        match kind {
            PermissionKind::FullMask => self.0 = u64::MAX,
            PermissionKind::EmptyMask => {}
            kind => {
                if let Some(bit) = kind.bit() {
                    self.0 |= bit;
                }
            }
        }
    }

    /// Check whether a right is granted.
    #[must_use]
    pub fn has(&self, kind: PermissionKind) -> bool {
        match kind {
            PermissionKind::EmptyMask => true,
            PermissionKind::FullMask => self.0 == u64::MAX,
            kind => kind.bit().is_some_and(|bit| self.0 & bit != 0),
        }
    }

    /// Rights granted by either mask.
    #[must_use]
    pub fn union(self, other: BasePermissions) -> Self {
        Self(self.0 | other.0)
    }

    /// Check whether no right is granted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Raw mask value.
    #[must_use]
    pub fn bits(&self) -> u64 {
        self.0
    }

    /// Granted rights as a set. A full mask is reported as `FullMask` only.
    #[must_use]
    pub fn kinds(&self) -> BTreeSet<PermissionKind> {
        if self.0 == u64::MAX {
            return BTreeSet::from([PermissionKind::FullMask]);
        }
        PermissionKind::GRANULAR
            .iter()
            .copied()
            .filter(|kind| self.has(*kind))
            .collect()
    }
}

/// Built-in kind of a role definition. `None` marks a custom definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum RoleType {
    #[default]
    None,
    Guest,
    Reader,
    Contributor,
    WebDesigner,
    Administrator,
    Editor,
}

impl RoleType {
    /// Get all role types.
    #[must_use]
    pub fn all() -> &'static [RoleType] {
        &[
            RoleType::None,
            RoleType::Guest,
            RoleType::Reader,
            RoleType::Contributor,
            RoleType::WebDesigner,
            RoleType::Administrator,
            RoleType::Editor,
        ]
    }

    /// Get the string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            RoleType::None => "None",
            RoleType::Guest => "Guest",
            RoleType::Reader => "Reader",
            RoleType::Contributor => "Contributor",
            RoleType::WebDesigner => "WebDesigner",
            RoleType::Administrator => "Administrator",
            RoleType::Editor => "Editor",
        }
    }

    /// Check if this is a built-in role.
    #[must_use]
    pub fn is_built_in(&self) -> bool {
        !matches!(self, RoleType::None)
    }
}

impl fmt::Display for RoleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for RoleType {
    type Err = ParseTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RoleType::all()
            .iter()
            .copied()
            .find(|role_type| role_type.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ParseTypeError::new("role type", s))
    }
}

/// Kind of principal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PrincipalType {
    #[default]
    User,
    SecurityGroup,
    SiteGroup,
}

impl PrincipalType {
    /// Get the string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            PrincipalType::User => "user",
            PrincipalType::SecurityGroup => "security_group",
            PrincipalType::SiteGroup => "site_group",
        }
    }
}

impl fmt::Display for PrincipalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Type of a list field as reported by the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum FieldType {
    #[default]
    Text,
    Note,
    Number,
    Counter,
    Currency,
    DateTime,
    Boolean,
    Choice,
    User,
    Lookup,
    #[serde(rename = "URL")]
    Url,
    Other,
}

impl FieldType {
    /// Value type used when this field is the key of an item query.
    #[must_use]
    pub fn query_value_type(&self) -> QueryValueType {
        match self {
            FieldType::User | FieldType::Lookup => QueryValueType::Lookup,
            FieldType::Url => QueryValueType::Url,
            FieldType::DateTime => QueryValueType::DateTime,
            FieldType::Number | FieldType::Counter => QueryValueType::Number,
            _ => QueryValueType::Text,
        }
    }
}

/// Encoding of a key value inside an item query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum QueryValueType {
    #[default]
    Text,
    Number,
    DateTime,
    Lookup,
    Url,
}

impl QueryValueType {
    /// Get the string representation used in the query document.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryValueType::Text => "Text",
            QueryValueType::Number => "Number",
            QueryValueType::DateTime => "DateTime",
            QueryValueType::Lookup => "Lookup",
            QueryValueType::Url => "URL",
        }
    }
}

impl fmt::Display for QueryValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Role a group plays as one of the site's associated groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssociatedGroupRole {
    Owner,
    Member,
    Visitor,
}

impl AssociatedGroupRole {
    /// Get all roles.
    #[must_use]
    pub fn all() -> &'static [AssociatedGroupRole] {
        &[
            AssociatedGroupRole::Owner,
            AssociatedGroupRole::Member,
            AssociatedGroupRole::Visitor,
        ]
    }

    /// Get the string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            AssociatedGroupRole::Owner => "owner",
            AssociatedGroupRole::Member => "member",
            AssociatedGroupRole::Visitor => "visitor",
        }
    }
}

impl fmt::Display for AssociatedGroupRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Scope a custom action is registered at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CustomActionScope {
    Site,
    Web,
}

impl CustomActionScope {
    /// Get the string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            CustomActionScope::Site => "site",
            CustomActionScope::Web => "web",
        }
    }
}

impl fmt::Display for CustomActionScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_bits() {
        assert_eq!(PermissionKind::ViewListItems.bit(), Some(1));
        assert_eq!(PermissionKind::AddListItems.bit(), Some(2));
        assert_eq!(PermissionKind::EnumeratePermissions.bit(), Some(1 << 62));
        assert_eq!(PermissionKind::FullMask.bit(), None);
    }

    #[test]
    fn test_mask_roundtrip_through_kinds() {
        let kinds = BTreeSet::from([
            PermissionKind::ViewListItems,
            PermissionKind::ApproveItems,
            PermissionKind::ManageWeb,
        ]);
        let mask = BasePermissions::from_kinds(&kinds);
        assert_eq!(mask.kinds(), kinds);
        assert!(mask.has(PermissionKind::ApproveItems));
        assert!(!mask.has(PermissionKind::DeleteListItems));
    }

    #[test]
    fn test_full_mask() {
        let mask = BasePermissions::from_kinds(&[PermissionKind::FullMask]);
        assert_eq!(mask, BasePermissions::full());
        assert!(mask.has(PermissionKind::ManagePermissions));
        assert_eq!(mask.kinds(), BTreeSet::from([PermissionKind::FullMask]));
    }

    #[test]
    fn test_union_is_additive() {
        let current = BasePermissions::from_kinds(&[PermissionKind::ViewListItems]);
        let declared = BasePermissions::from_kinds(&[PermissionKind::EditListItems]);
        let merged = current.union(declared);
        assert!(merged.has(PermissionKind::ViewListItems));
        assert!(merged.has(PermissionKind::EditListItems));
    }

    #[test]
    fn test_permission_kind_parse() {
        assert_eq!(
            "approveitems".parse::<PermissionKind>().unwrap(),
            PermissionKind::ApproveItems
        );
        assert!("Fly".parse::<PermissionKind>().is_err());
    }

    #[test]
    fn test_role_type_parse() {
        assert_eq!("Editor".parse::<RoleType>().unwrap(), RoleType::Editor);
        assert!(!RoleType::None.is_built_in());
        assert!(RoleType::Reader.is_built_in());
    }

    #[test]
    fn test_query_value_type_from_field() {
        assert_eq!(FieldType::User.query_value_type(), QueryValueType::Lookup);
        assert_eq!(FieldType::Url.query_value_type(), QueryValueType::Url);
        assert_eq!(FieldType::Counter.query_value_type(), QueryValueType::Number);
        assert_eq!(
            FieldType::DateTime.query_value_type(),
            QueryValueType::DateTime
        );
        assert_eq!(FieldType::Choice.query_value_type(), QueryValueType::Text);
    }
}

//! Test helpers for sitewright-provisioning integration tests.
//!
//! Every test runs against an `InMemoryGateway` seeded with the fixtures
//! below.

#![allow(dead_code)]

use std::collections::BTreeSet;

use sitewright_gateway::prelude::*;
use sitewright_provisioning::prelude::*;

pub const SITE_TITLE: &str = "Contoso HR";
pub const SITE_URL: &str = "https://contoso.example/sites/hr";

/// Install a test subscriber once; honours `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A root web with unique permissions.
pub fn site() -> InMemoryGateway {
    init_tracing();
    InMemoryGateway::new(WebInfo::new(SITE_TITLE, SITE_URL))
}

/// A site holding a Products list keyed by a unique SKU column.
pub fn products_site() -> InMemoryGateway {
    site()
        .with_list(
            "Products",
            vec![
                field("SKU", FieldType::Text),
                field("Code", FieldType::Text),
                field("Price", FieldType::Currency),
            ],
        )
        .with_unique_field("Products", "SKU")
        .with_unique_field("Products", "Code")
        .with_item("Products", &[("SKU", "ABC-1"), ("Code", "X"), ("Price", "5.00")])
}

pub fn field(name: &str, field_type: FieldType) -> FieldInfo {
    FieldInfo {
        internal_name: name.to_string(),
        title: name.to_string(),
        field_type,
    }
}

pub fn permissions(kinds: &[PermissionKind]) -> BTreeSet<PermissionKind> {
    kinds.iter().copied().collect()
}

/// Security block exercising groups, administrators, role definitions and
/// role assignments. Approvers is declared before its owner.
pub fn security_template() -> ProvisioningTemplate {
    let mut template = ProvisioningTemplate::new();
    template.security = SiteSecurity {
        additional_administrators: vec![User::new("carol")],
        site_groups: vec![
            SiteGroup::new("Approvers")
                .with_owner("Reviewers")
                .with_member("bob"),
            SiteGroup::new("Reviewers")
                .with_description("Reviews every policy draft")
                .with_member("alice"),
        ],
        permissions: SiteSecurityPermissions {
            role_definitions: vec![RoleDefinition::new(
                "Approve",
                "Approve policy drafts",
                permissions(&[PermissionKind::ViewListItems, PermissionKind::ApproveItems]),
            )],
            role_assignments: vec![
                RoleAssignment::grant("Approvers", "Approve"),
                RoleAssignment::grant("alice", "Approve"),
            ],
        },
        ..Default::default()
    };
    template
}

/// Data rows for the Products list.
pub fn products_template(behavior: UpdateBehavior, rows: Vec<DataRow>) -> ProvisioningTemplate {
    let mut template = ProvisioningTemplate::new();
    let mut list = ListInstance::new("Products");
    list.data_rows = DataRows {
        key_column: Some("SKU".to_string()),
        update_behavior: behavior,
        rows,
    };
    template.lists.push(list);
    template
}

/// Apply with default options, panicking on failure.
pub async fn apply(gateway: &InMemoryGateway, template: &ProvisioningTemplate) -> ApplyOutcome {
    ProvisioningEngine::new()
        .apply(gateway, template, &ApplyOptions::default())
        .await
        .expect("apply succeeds")
}

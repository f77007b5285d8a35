//! List data rows handler.
//!
//! Upserts declared rows into existing lists. A row is matched to an existing
//! item through the list's key column; unmatched rows become new items.

use async_trait::async_trait;
use sitewright_gateway::operation::{
    FieldInfo, ItemPermissions, ItemQuery, ItemRoleAssignment, ListInfo, ListItem, WebInfo,
};
use sitewright_gateway::types::QueryValueType;
use sitewright_gateway::{GatewayError, GatewayErrorKind};
use tracing::instrument;

use super::{ApplyContext, ExtractContext, HandlerKind, ObjectHandler};
use crate::config::ExtractOptions;
use crate::error::{ProvisioningError, ProvisioningResult};
use crate::model::{
    DataRow, DataRows, ListInstance, ObjectSecurity, ProvisioningTemplate, UpdateBehavior,
};
use crate::statistics::{ActionType, EntityKind};
use crate::token::TokenParser;

/// Handler for the rows declared on list instances.
#[derive(Debug, Clone, Copy, Default)]
pub struct DataRowsHandler;

/// Key column of a list as resolved against its live fields.
#[derive(Debug, Clone, PartialEq, Eq)]
struct KeyColumn {
    internal_name: String,
    value_type: QueryValueType,
}

impl KeyColumn {
    /// Match the declared key column against the live fields by internal
    /// name, ignoring case. Unknown columns are compared as text.
    fn resolve(declared: &str, fields: &[FieldInfo]) -> Self {
        match fields
            .iter()
            .find(|f| f.internal_name.eq_ignore_ascii_case(declared))
        {
            Some(field) => Self {
                internal_name: field.internal_name.clone(),
                value_type: field.field_type.query_value_type(),
            },
            None => {
                tracing::warn!(
                    key_column = %declared,
                    "Key column not found among list fields, comparing as text"
                );
                Self {
                    internal_name: declared.to_string(),
                    value_type: QueryValueType::Text,
                }
            }
        }
    }
}

/// Live internal name of a row column, matched ignoring case. Columns the
/// list does not know are kept as declared.
fn field_name<'a>(column: &'a str, fields: &'a [FieldInfo]) -> &'a str {
    fields
        .iter()
        .find(|f| f.internal_name.eq_ignore_ascii_case(column))
        .map_or(column, |f| f.internal_name.as_str())
}

/// What happened to a single row.
enum RowOutcome {
    Created,
    Updated,
    Unchanged,
    /// An existing item matched and the list asks to leave it alone.
    Skipped,
}

#[async_trait]
impl ObjectHandler for DataRowsHandler {
    fn kind(&self) -> HandlerKind {
        HandlerKind::ListDataRows
    }

    fn will_provision(&self, _web: &WebInfo, template: &ProvisioningTemplate) -> bool {
        template.lists.iter().any(|list| !list.data_rows.is_empty())
    }

    #[instrument(skip_all, fields(web = %ctx.web.url))]
    async fn provision(
        &self,
        ctx: &ApplyContext<'_>,
        template: &ProvisioningTemplate,
        parser: TokenParser,
    ) -> ProvisioningResult<TokenParser> {
        for instance in template.lists.iter().filter(|l| !l.data_rows.is_empty()) {
            provision_list(ctx, instance, &parser).await?;
        }
        Ok(parser)
    }

    fn will_extract(&self, _web: &WebInfo, _options: &ExtractOptions) -> bool {
        false
    }

    async fn extract(
        &self,
        _ctx: &ExtractContext<'_>,
        template: ProvisioningTemplate,
    ) -> ProvisioningResult<ProvisioningTemplate> {
        Ok(template)
    }
}

async fn provision_list(
    ctx: &ApplyContext<'_>,
    instance: &ListInstance,
    parser: &TokenParser,
) -> ProvisioningResult<()> {
    let title = parser.parse(&instance.title);
    let list = ctx
        .gateway
        .list_by_title(&title)
        .await?
        .ok_or_else(|| ProvisioningError::ListNotFound {
            title: title.clone(),
        })?;

    let data_rows = &instance.data_rows;
    let fields = ctx.gateway.list_fields(&list).await?;
    let key = data_rows
        .key_column
        .as_deref()
        .map(|column| parser.parse(column))
        .filter(|column| !column.trim().is_empty())
        .map(|column| KeyColumn::resolve(&column, &fields));

    tracing::info!(
        list = %title,
        rows = data_rows.rows.len(),
        key_column = ?key.as_ref().map(|k| k.internal_name.as_str()),
        "Processing data rows"
    );

    for (index, row) in data_rows.rows.iter().enumerate() {
        match provision_row(ctx, &list, &fields, data_rows, key.as_ref(), row, parser).await {
            Ok(outcome) => {
                let action = match outcome {
                    RowOutcome::Created => ActionType::Created,
                    RowOutcome::Updated => ActionType::Updated,
                    RowOutcome::Unchanged | RowOutcome::Skipped => ActionType::Skipped,
                };
                ctx.record(EntityKind::ListItem, action);
            }
            Err(ProvisioningError::Gateway(err))
                if err.kind() == GatewayErrorKind::DuplicateValue
                    && ctx.options.ignore_duplicate_data_row_errors =>
            {
                tracing::warn!(
                    list = %title,
                    row = index,
                    error = %err,
                    "Duplicate value, row skipped"
                );
                ctx.record(EntityKind::ListItem, ActionType::FailedSkipped);
            }
            Err(err) => {
                tracing::error!(
                    list = %title,
                    row = index,
                    error = %err,
                    "Data row failed"
                );
                return Err(err);
            }
        }
    }
    Ok(())
}

async fn provision_row(
    ctx: &ApplyContext<'_>,
    list: &ListInfo,
    fields: &[FieldInfo],
    data_rows: &DataRows,
    key: Option<&KeyColumn>,
    row: &DataRow,
    parser: &TokenParser,
) -> ProvisioningResult<RowOutcome> {
    let values: Vec<(String, String)> = row
        .values
        .iter()
        .map(|(column, value)| (field_name(column, fields).to_string(), parser.parse(value)))
        .collect();

    let existing = match key {
        Some(key) => find_existing(ctx, list, key, row, &values).await?,
        None => None,
    };

    let (mut item, created) = match existing {
        Some(_) if data_rows.update_behavior == UpdateBehavior::Skip => {
            tracing::debug!(list = %list.title, "Row exists, skipped");
            return Ok(RowOutcome::Skipped);
        }
        Some(item) => (item, false),
        None => (ctx.gateway.create_item(list).await?, true),
    };

    for (field, value) in values {
        if created || item.field(&field) != Some(value.as_str()) {
            item.set_field(field, value);
        }
    }

    let mut changed = created;
    if item.has_pending_changes() {
        tracing::debug!(
            list = %list.title,
            fields = ?item.pending().keys().collect::<Vec<_>>(),
            "Committing item"
        );
        ctx.gateway.commit_item(list, &mut item).await?;
        changed = true;
    }

    if let Some(security) = row.security.as_ref().filter(|s| s.is_declared()) {
        apply_item_security(ctx, list, &item, security, parser).await?;
    }

    Ok(match (created, changed) {
        (true, _) => RowOutcome::Created,
        (false, true) => RowOutcome::Updated,
        (false, false) => RowOutcome::Unchanged,
    })
}

async fn find_existing(
    ctx: &ApplyContext<'_>,
    list: &ListInfo,
    key: &KeyColumn,
    row: &DataRow,
    values: &[(String, String)],
) -> ProvisioningResult<Option<ListItem>> {
    let Some((_, value)) = values
        .iter()
        .find(|(field, _)| field.eq_ignore_ascii_case(&key.internal_name))
    else {
        tracing::debug!(
            list = %list.title,
            key_column = %key.internal_name,
            columns = row.values.len(),
            "Row has no key value, creating"
        );
        return Ok(None);
    };

    let query = ItemQuery::key_equals(key.internal_name.clone(), value.clone(), key.value_type);
    Ok(ctx.gateway.query_items(list, &query).await?.into_iter().next())
}

fn desired_permissions(security: &ObjectSecurity, parser: &TokenParser) -> ItemPermissions {
    ItemPermissions {
        copy_role_assignments: security.copy_role_assignments,
        clear_subscopes: security.clear_subscopes,
        role_assignments: security
            .role_assignments
            .iter()
            .filter(|a| !a.remove)
            .map(|a| ItemRoleAssignment {
                principal: parser.parse(&a.principal),
                role_definition: parser.parse(&a.role_definition),
            })
            .collect(),
    }
}

async fn apply_item_security(
    ctx: &ApplyContext<'_>,
    list: &ListInfo,
    item: &ListItem,
    security: &ObjectSecurity,
    parser: &TokenParser,
) -> Result<(), GatewayError> {
    let desired = desired_permissions(security, parser);
    if ctx.gateway.item_security(list, item).await?.as_ref() == Some(&desired) {
        ctx.record(EntityKind::ItemSecurity, ActionType::Skipped);
        return Ok(());
    }
    ctx.gateway.set_item_security(list, item, &desired).await?;
    tracing::debug!(
        list = %list.title,
        item = %item.id,
        assignments = desired.role_assignments.len(),
        "Applied item security"
    );
    ctx.record(EntityKind::ItemSecurity, ActionType::Updated);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ApplyOptions;
    use crate::model::RoleAssignment;
    use crate::statistics::StatisticsTracker;
    use crate::token::Token;
    use sitewright_gateway::prelude::*;

    fn products_fields() -> Vec<FieldInfo> {
        vec![
            FieldInfo {
                internal_name: "SKU".to_string(),
                title: "Stock keeping unit".to_string(),
                field_type: FieldType::Text,
            },
            FieldInfo {
                internal_name: "Price".to_string(),
                title: "Price".to_string(),
                field_type: FieldType::Currency,
            },
        ]
    }

    fn products() -> InMemoryGateway {
        InMemoryGateway::new(WebInfo::new("Contoso", "https://contoso.example"))
            .with_list("Products", products_fields())
            .with_unique_field("Products", "SKU")
            .with_item("Products", &[("SKU", "ABC-1"), ("Price", "5.00")])
    }

    fn template(behavior: UpdateBehavior, rows: Vec<DataRow>) -> ProvisioningTemplate {
        ProvisioningTemplate {
            lists: vec![ListInstance {
                title: "Products".to_string(),
                data_rows: DataRows {
                    key_column: Some("sku".to_string()),
                    update_behavior: behavior,
                    rows,
                },
            }],
            ..Default::default()
        }
    }

    async fn provision(
        gateway: &InMemoryGateway,
        template: &ProvisioningTemplate,
        options: &ApplyOptions,
    ) -> (ProvisioningResult<TokenParser>, StatisticsTracker) {
        let parser = TokenParser::for_site(gateway).await.unwrap();
        provision_with(gateway, template, options, parser).await
    }

    async fn provision_with(
        gateway: &InMemoryGateway,
        template: &ProvisioningTemplate,
        options: &ApplyOptions,
        parser: TokenParser,
    ) -> (ProvisioningResult<TokenParser>, StatisticsTracker) {
        let web = gateway.web().await.unwrap();
        let statistics = StatisticsTracker::new();
        let ctx = ApplyContext {
            gateway,
            web: &web,
            options,
            statistics: &statistics,
        };
        let result = DataRowsHandler
            .provision(&ctx, template, parser)
            .await;
        (result, statistics)
    }

    #[test]
    fn test_key_column_resolution() {
        let fields = vec![FieldInfo {
            internal_name: "Modified".to_string(),
            title: "Modified".to_string(),
            field_type: FieldType::DateTime,
        }];
        let key = KeyColumn::resolve("modified", &fields);
        assert_eq!(key.internal_name, "Modified");
        assert_eq!(key.value_type, QueryValueType::DateTime);

        let key = KeyColumn::resolve("Unknown", &fields);
        assert_eq!(key.value_type, QueryValueType::Text);
    }

    #[test]
    fn test_row_columns_take_live_field_names() {
        let fields = products_fields();
        assert_eq!(field_name("sku", &fields), "SKU");
        assert_eq!(field_name("PRICE", &fields), "Price");
        assert_eq!(field_name("Notes", &fields), "Notes");
    }

    #[tokio::test]
    async fn test_key_column_tokens_are_resolved() {
        let gateway = products();
        let mut template = template(
            UpdateBehavior::Update,
            vec![DataRow::new([("SKU", "ABC-1"), ("Price", "7.50")])],
        );
        template.lists[0].data_rows.key_column = Some("{keycolumn}".to_string());
        let mut parser = TokenParser::for_site(&gateway).await.unwrap();
        parser.register(Token::fixed(["{keycolumn}"], "SKU"));

        let (result, _) =
            provision_with(&gateway, &template, &ApplyOptions::default(), parser).await;
        result.unwrap();

        let items = gateway.items("Products").await;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["Price"], "7.50");
        assert!(gateway.writes_for("create_item").await.is_empty());
    }

    #[test]
    fn test_gates() {
        let handler = DataRowsHandler;
        let web = WebInfo::new("Contoso", "https://contoso.example");
        assert!(!handler.will_provision(&web, &ProvisioningTemplate::default()));
        assert!(handler.will_provision(
            &web,
            &template(UpdateBehavior::Update, vec![DataRow::new([("SKU", "X")])])
        ));
        assert!(!handler.will_extract(&web, &ExtractOptions::default()));
    }

    #[tokio::test]
    async fn test_update_writes_only_changed_fields() {
        let gateway = products();
        let template = template(
            UpdateBehavior::Update,
            vec![DataRow::new([("SKU", "ABC-1"), ("Price", "9.99")])],
        );

        let (result, statistics) = provision(&gateway, &template, &ApplyOptions::default()).await;
        result.unwrap();

        let commits = gateway.writes_for("commit_item").await;
        assert_eq!(commits.len(), 1);
        assert_eq!(commits[0].fields, vec!["Price".to_string()]);
        assert_eq!(gateway.items("Products").await[0]["Price"], "9.99");
        assert_eq!(
            statistics
                .snapshot()
                .action_count(EntityKind::ListItem, ActionType::Updated),
            1
        );
    }

    #[tokio::test]
    async fn test_skip_behavior_leaves_existing_item() {
        let gateway = products();
        let template = template(
            UpdateBehavior::Skip,
            vec![
                DataRow::new([("SKU", "ABC-1"), ("Price", "9.99")]),
                DataRow::new([("SKU", "XYZ-9"), ("Price", "1.00")]),
            ],
        );

        let (result, _) = provision(&gateway, &template, &ApplyOptions::default()).await;
        result.unwrap();

        let items = gateway.items("Products").await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0]["Price"], "5.00");
        assert_eq!(items[1]["SKU"], "XYZ-9");
    }

    #[tokio::test]
    async fn test_row_without_key_value_is_created() {
        let gateway = products();
        let template = template(UpdateBehavior::Update, vec![DataRow::new([("Price", "3.00")])]);

        let (result, _) = provision(&gateway, &template, &ApplyOptions::default()).await;
        result.unwrap();

        assert_eq!(gateway.items("Products").await.len(), 2);
        assert_eq!(gateway.writes_for("create_item").await.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_list_is_an_error() {
        let gateway = InMemoryGateway::new(WebInfo::new("Contoso", "https://contoso.example"));
        let template = template(UpdateBehavior::Update, vec![DataRow::new([("SKU", "X")])]);

        let (result, _) = provision(&gateway, &template, &ApplyOptions::default()).await;
        assert!(matches!(
            result.unwrap_err(),
            ProvisioningError::ListNotFound { title } if title == "Products"
        ));
    }

    #[tokio::test]
    async fn test_item_security_applied_once() {
        let gateway = products();
        let security = ObjectSecurity {
            role_assignments: vec![RoleAssignment::grant("alice", "{roledefinition:Reader}")],
            ..Default::default()
        };
        let template = template(
            UpdateBehavior::Update,
            vec![DataRow::new([("SKU", "ABC-1")]).with_security(security)],
        );

        let (result, _) = provision(&gateway, &template, &ApplyOptions::default()).await;
        result.unwrap();
        let (result, _) = provision(&gateway, &template, &ApplyOptions::default()).await;
        result.unwrap();

        let writes = gateway.writes_for("set_item_security").await;
        assert_eq!(writes.len(), 1);
        assert!(gateway.writes_for("commit_item").await.is_empty());
    }
}

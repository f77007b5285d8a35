//! Custom actions handler.
//!
//! Site-scoped and web-scoped user custom actions, matched by name.

use async_trait::async_trait;
use sitewright_gateway::ids::CustomActionId;
use sitewright_gateway::operation::{CustomActionInfo, WebInfo};
use sitewright_gateway::types::{BasePermissions, CustomActionScope};
use tracing::instrument;

use super::{ApplyContext, ExtractContext, HandlerKind, ObjectHandler};
use crate::config::ExtractOptions;
use crate::error::ProvisioningResult;
use crate::model::{CustomAction, CustomActions, ProvisioningTemplate};
use crate::statistics::{ActionType, EntityKind};
use crate::token::definitions::SITE_URL_PATTERN;
use crate::token::TokenParser;

/// Handler for site and web custom actions.
#[derive(Debug, Clone, Copy, Default)]
pub struct CustomActionsHandler;

fn scoped(actions: &CustomActions) -> [(CustomActionScope, &[CustomAction]); 2] {
    [
        (CustomActionScope::Site, actions.site_custom_actions.as_slice()),
        (CustomActionScope::Web, actions.web_custom_actions.as_slice()),
    ]
}

/// Desired state of an action with tokens resolved.
fn desired_info(action: &CustomAction, id: CustomActionId, parser: &TokenParser) -> CustomActionInfo {
    CustomActionInfo {
        id,
        name: action.name.clone(),
        title: parser.parse(&action.title),
        description: parser.parse(&action.description),
        location: action.location.clone(),
        group: action.group.clone(),
        sequence: action.sequence,
        url: parser.parse(&action.url),
        script_block: parser.parse(&action.script_block),
        script_src: parser.parse(&action.script_src),
        image_url: parser.parse(&action.image_url),
        registration_type: action.registration_type.clone(),
        registration_id: parser.parse(&action.registration_id),
        rights: BasePermissions::from_kinds(action.rights.iter()),
    }
}

fn tokenize_site_url(value: &str, site_url: &str) -> String {
    if site_url.is_empty() {
        return value.to_string();
    }
    value.replace(site_url, SITE_URL_PATTERN)
}

fn extracted_action(info: CustomActionInfo, site_url: &str) -> CustomAction {
    CustomAction {
        url: tokenize_site_url(&info.url, site_url),
        script_src: tokenize_site_url(&info.script_src, site_url),
        name: info.name,
        title: info.title,
        description: info.description,
        location: info.location,
        group: info.group,
        sequence: info.sequence,
        script_block: info.script_block,
        image_url: info.image_url,
        registration_type: info.registration_type,
        registration_id: info.registration_id,
        rights: info.rights.kinds(),
        remove: false,
    }
}

#[async_trait]
impl ObjectHandler for CustomActionsHandler {
    fn kind(&self) -> HandlerKind {
        HandlerKind::CustomActions
    }

    fn will_provision(&self, _web: &WebInfo, template: &ProvisioningTemplate) -> bool {
        !template.custom_actions.is_empty()
    }

    #[instrument(skip_all, fields(web = %ctx.web.url))]
    async fn provision(
        &self,
        ctx: &ApplyContext<'_>,
        template: &ProvisioningTemplate,
        parser: TokenParser,
    ) -> ProvisioningResult<TokenParser> {
        for (scope, actions) in scoped(&template.custom_actions) {
            if actions.is_empty() {
                continue;
            }
            let live = ctx.gateway.custom_actions(scope).await?;
            for action in actions {
                provision_action(ctx, scope, action, &live, &parser).await?;
            }
        }
        Ok(parser)
    }

    fn will_extract(&self, _web: &WebInfo, _options: &ExtractOptions) -> bool {
        true
    }

    #[instrument(skip_all, fields(web = %ctx.web.url))]
    async fn extract(
        &self,
        ctx: &ExtractContext<'_>,
        mut template: ProvisioningTemplate,
    ) -> ProvisioningResult<ProvisioningTemplate> {
        let site_url = ctx.web.url.as_str();
        let mut extracted = CustomActions::default();
        for (scope, target) in [
            (CustomActionScope::Site, &mut extracted.site_custom_actions),
            (CustomActionScope::Web, &mut extracted.web_custom_actions),
        ] {
            *target = ctx
                .gateway
                .custom_actions(scope)
                .await?
                .into_iter()
                .map(|info| extracted_action(info, site_url))
                .collect();
        }

        if let Some(base) = &ctx.options.base_template {
            extracted.prune_against(&base.custom_actions);
        }
        tracing::debug!(
            site = extracted.site_custom_actions.len(),
            web = extracted.web_custom_actions.len(),
            "Extracted custom actions"
        );
        template.custom_actions = extracted;
        Ok(template)
    }
}

async fn provision_action(
    ctx: &ApplyContext<'_>,
    scope: CustomActionScope,
    action: &CustomAction,
    live: &[CustomActionInfo],
    parser: &TokenParser,
) -> ProvisioningResult<()> {
    let existing = live.iter().find(|a| a.name == action.name);

    if action.remove {
        match existing {
            Some(existing) => {
                ctx.gateway.remove_custom_action(scope, existing).await?;
                tracing::info!(scope = %scope, action = %action.name, "Removed custom action");
                ctx.record(EntityKind::CustomAction, ActionType::Removed);
            }
            None => ctx.record(EntityKind::CustomAction, ActionType::Skipped),
        }
        return Ok(());
    }

    match existing {
        None => {
            let desired = desired_info(action, CustomActionId::new(), parser);
            ctx.gateway.add_custom_action(scope, &desired).await?;
            tracing::info!(scope = %scope, action = %action.name, "Added custom action");
            ctx.record(EntityKind::CustomAction, ActionType::Created);
        }
        Some(existing) => {
            let desired = desired_info(action, existing.id, parser);
            if desired == *existing {
                ctx.record(EntityKind::CustomAction, ActionType::Skipped);
                return Ok(());
            }
            ctx.gateway.update_custom_action(scope, &desired).await?;
            tracing::info!(scope = %scope, action = %action.name, "Updated custom action");
            ctx.record(EntityKind::CustomAction, ActionType::Updated);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ApplyOptions;
    use crate::statistics::StatisticsTracker;
    use sitewright_gateway::prelude::*;

    const SITE_URL: &str = "https://contoso.example/sites/hr";

    fn action(name: &str) -> CustomAction {
        CustomAction {
            title: "Help".to_string(),
            url: "{siteurl}/help".to_string(),
            sequence: 100,
            rights: [PermissionKind::ViewListItems].into_iter().collect(),
            ..CustomAction::new(name, "Microsoft.SharePoint.StandardMenu")
        }
    }

    async fn provision(gateway: &InMemoryGateway, actions: CustomActions) -> StatisticsTracker {
        let web = gateway.web().await.unwrap();
        let options = ApplyOptions::default();
        let statistics = StatisticsTracker::new();
        let ctx = ApplyContext {
            gateway,
            web: &web,
            options: &options,
            statistics: &statistics,
        };
        let template = ProvisioningTemplate {
            custom_actions: actions,
            ..Default::default()
        };
        CustomActionsHandler
            .provision(&ctx, &template, TokenParser::for_site(gateway).await.unwrap())
            .await
            .unwrap();
        statistics
    }

    #[tokio::test]
    async fn test_add_then_no_change() {
        let gateway = InMemoryGateway::new(WebInfo::new("HR", SITE_URL));
        let actions = CustomActions {
            web_custom_actions: vec![action("Help")],
            ..Default::default()
        };

        provision(&gateway, actions.clone()).await;
        let live = gateway.custom_actions(CustomActionScope::Web).await.unwrap();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].url, format!("{SITE_URL}/help"));

        gateway.reset_writes().await;
        let statistics = provision(&gateway, actions).await;
        assert_eq!(gateway.write_count().await, 0);
        assert_eq!(
            statistics
                .snapshot()
                .action_count(EntityKind::CustomAction, ActionType::Skipped),
            1
        );
    }

    #[tokio::test]
    async fn test_update_and_remove() {
        let gateway = InMemoryGateway::new(WebInfo::new("HR", SITE_URL));
        provision(
            &gateway,
            CustomActions {
                site_custom_actions: vec![action("Help"), action("Legacy")],
                ..Default::default()
            },
        )
        .await;

        let mut changed = action("Help");
        changed.sequence = 200;
        let removed = CustomAction {
            remove: true,
            ..action("Legacy")
        };
        let statistics = provision(
            &gateway,
            CustomActions {
                site_custom_actions: vec![changed, removed],
                ..Default::default()
            },
        )
        .await;

        let live = gateway.custom_actions(CustomActionScope::Site).await.unwrap();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].sequence, 200);
        let stats = statistics.snapshot();
        assert_eq!(stats.action_count(EntityKind::CustomAction, ActionType::Updated), 1);
        assert_eq!(stats.action_count(EntityKind::CustomAction, ActionType::Removed), 1);
    }

    #[tokio::test]
    async fn test_extract_tokenizes_site_url() {
        let gateway = InMemoryGateway::new(WebInfo::new("HR", SITE_URL));
        provision(
            &gateway,
            CustomActions {
                web_custom_actions: vec![action("Help")],
                ..Default::default()
            },
        )
        .await;

        let web = gateway.web().await.unwrap();
        let options = ExtractOptions::default();
        let ctx = ExtractContext {
            gateway: &gateway,
            web: &web,
            options: &options,
        };
        let template = CustomActionsHandler
            .extract(&ctx, ProvisioningTemplate::default())
            .await
            .unwrap();
        assert_eq!(template.custom_actions.web_custom_actions, vec![action("Help")]);

        let options = ExtractOptions::default().with_base_template(template);
        let ctx = ExtractContext {
            gateway: &gateway,
            web: &web,
            options: &options,
        };
        let pruned = CustomActionsHandler
            .extract(&ctx, ProvisioningTemplate::default())
            .await
            .unwrap();
        assert!(pruned.custom_actions.is_empty());
    }
}

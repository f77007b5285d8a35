//! Provisioning engine orchestrator.
//!
//! Main entry point for apply and extract runs. The engine walks the handler
//! pipeline in order, threads the token registry from one handler to the next
//! and stops at the first error. Whatever reached the target before the error
//! stays applied; re-running the same template converges.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use sitewright_gateway::TargetGateway;
use tracing::Instrument;

use crate::config::{ApplyOptions, ExtractOptions};
use crate::error::ProvisioningResult;
use crate::handlers::{default_handlers, ApplyContext, ExtractContext, HandlerKind, ObjectHandler};
use crate::model::ProvisioningTemplate;
use crate::statistics::{RunStatistics, StatisticsTracker};
use crate::token::TokenParser;

/// Result of an apply run.
#[derive(Debug)]
pub struct ApplyOutcome {
    /// The registry after the last handler, including tokens for every
    /// object created during the run.
    pub parser: TokenParser,
    pub statistics: RunStatistics,
    /// Handlers that passed their gate and ran, in order.
    pub handlers_run: Vec<HandlerKind>,
}

/// Summary of an apply run without the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplySummary {
    pub handlers_run: Vec<HandlerKind>,
    pub statistics: RunStatistics,
}

impl ApplyOutcome {
    #[must_use]
    pub fn summary(&self) -> ApplySummary {
        ApplySummary {
            handlers_run: self.handlers_run.clone(),
            statistics: self.statistics.clone(),
        }
    }
}

/// Gate results memoized for one run.
#[derive(Debug, Default)]
pub struct GateCache {
    gates: HashMap<HandlerKind, bool>,
}

impl GateCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached gate for `kind`, evaluating `gate` on first use.
    pub fn check(&mut self, kind: HandlerKind, gate: impl FnOnce() -> bool) -> bool {
        *self.gates.entry(kind).or_insert_with(gate)
    }

    /// Number of gates evaluated so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.gates.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.gates.is_empty()
    }
}

/// Runs the handler pipeline against a target.
pub struct ProvisioningEngine {
    handlers: Vec<Box<dyn ObjectHandler>>,
}

impl Default for ProvisioningEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ProvisioningEngine {
    /// Create an engine with the built-in handlers.
    #[must_use]
    pub fn new() -> Self {
        Self {
            handlers: default_handlers(),
        }
    }

    /// Create an engine running `handlers` in the given order.
    #[must_use]
    pub fn with_handlers(handlers: Vec<Box<dyn ObjectHandler>>) -> Self {
        Self { handlers }
    }

    /// Handler kinds in execution order.
    #[must_use]
    pub fn pipeline(&self) -> Vec<HandlerKind> {
        self.handlers.iter().map(|h| h.kind()).collect()
    }

    /// Apply `template` to the web behind `gateway`.
    pub async fn apply(
        &self,
        gateway: &dyn TargetGateway,
        template: &ProvisioningTemplate,
        options: &ApplyOptions,
    ) -> ProvisioningResult<ApplyOutcome> {
        let web = gateway.web().await?;
        let statistics = StatisticsTracker::new();
        let mut parser = TokenParser::for_site(gateway).await?;
        let mut gates = GateCache::new();
        let mut handlers_run = Vec::new();

        tracing::info!(
            target_name = %gateway.display_name(),
            web = %web.url,
            template = ?template.id,
            "Starting apply"
        );

        for handler in &self.handlers {
            let kind = handler.kind();
            if !options.runs(kind) {
                tracing::debug!(handler = handler.name(), "Handler disabled by options");
                continue;
            }
            if !gates.check(kind, || handler.will_provision(&web, template)) {
                tracing::debug!(handler = handler.name(), "Nothing to provision");
                continue;
            }

            let ctx = ApplyContext {
                gateway,
                web: &web,
                options,
                statistics: &statistics,
            };
            let span = tracing::info_span!("provision", handler = handler.name());
            parser = match handler.provision(&ctx, template, parser).instrument(span).await {
                Ok(parser) => parser,
                Err(err) => {
                    tracing::error!(
                        handler = handler.name(),
                        error = %err,
                        "Apply aborted"
                    );
                    return Err(err);
                }
            };
            handlers_run.push(kind);
        }

        let statistics = statistics.snapshot();
        tracing::info!(
            web = %web.url,
            handlers = handlers_run.len(),
            changes = statistics.changes(),
            processed = statistics.objects_processed,
            duration_ms = statistics.duration_ms,
            "Apply completed"
        );

        Ok(ApplyOutcome {
            parser,
            statistics,
            handlers_run,
        })
    }

    /// Read the web behind `gateway` into a new template.
    ///
    /// With a base template in `options`, entities equal to one in the base
    /// are left out.
    pub async fn extract(
        &self,
        gateway: &dyn TargetGateway,
        options: &ExtractOptions,
    ) -> ProvisioningResult<ProvisioningTemplate> {
        let web = gateway.web().await?;
        let mut template = ProvisioningTemplate::new();
        let mut gates = GateCache::new();

        tracing::info!(
            target_name = %gateway.display_name(),
            web = %web.url,
            pruned = options.base_template.is_some(),
            "Starting extract"
        );

        for handler in &self.handlers {
            let kind = handler.kind();
            if !options.runs(kind) || !gates.check(kind, || handler.will_extract(&web, options)) {
                continue;
            }
            let ctx = ExtractContext {
                gateway,
                web: &web,
                options,
            };
            let span = tracing::info_span!("extract", handler = handler.name());
            template = handler.extract(&ctx, template).instrument(span).await?;
        }

        tracing::info!(web = %web.url, "Extract completed");
        Ok(template)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CustomAction, CustomActions, SiteGroup, User};
    use crate::statistics::{ActionType, EntityKind};
    use sitewright_gateway::prelude::*;

    fn gateway() -> InMemoryGateway {
        InMemoryGateway::new(WebInfo::new("Contoso HR", "https://contoso.example/sites/hr"))
    }

    #[test]
    fn test_gate_cache_memoizes() {
        let mut gates = GateCache::new();
        let mut calls = 0;
        assert!(gates.check(HandlerKind::SiteSecurity, || {
            calls += 1;
            true
        }));
        assert!(gates.check(HandlerKind::SiteSecurity, || {
            calls += 1;
            false
        }));
        assert_eq!(calls, 1);
        assert_eq!(gates.len(), 1);
    }

    #[test]
    fn test_default_pipeline() {
        assert_eq!(ProvisioningEngine::new().pipeline(), HandlerKind::pipeline());
    }

    #[tokio::test]
    async fn test_empty_template_runs_nothing() {
        let gateway = gateway();
        let outcome = ProvisioningEngine::new()
            .apply(&gateway, &ProvisioningTemplate::new(), &ApplyOptions::default())
            .await
            .unwrap();
        assert!(outcome.handlers_run.is_empty());
        assert_eq!(outcome.statistics.changes(), 0);
        assert_eq!(gateway.write_count().await, 0);
    }

    #[tokio::test]
    async fn test_registry_flows_between_handlers() {
        let gateway = gateway();
        let mut template = ProvisioningTemplate::new();
        template.security.site_groups = vec![SiteGroup::new("Reviewers")];
        template.custom_actions = CustomActions {
            web_custom_actions: vec![CustomAction {
                url: "{siteurl}/review?group={groupid:Reviewers}".to_string(),
                ..CustomAction::new("Review", "Microsoft.SharePoint.StandardMenu")
            }],
            ..Default::default()
        };

        let outcome = ProvisioningEngine::new()
            .apply(&gateway, &template, &ApplyOptions::default())
            .await
            .unwrap();
        assert_eq!(
            outcome.handlers_run,
            vec![HandlerKind::SiteSecurity, HandlerKind::CustomActions]
        );

        let group = gateway.get_group_by_name("Reviewers").await.unwrap().unwrap();
        let actions = gateway.custom_actions(CustomActionScope::Web).await.unwrap();
        assert_eq!(
            actions[0].url,
            format!(
                "https://contoso.example/sites/hr/review?group={}",
                group.id
            )
        );
        assert_eq!(
            outcome.parser.resolve("{groupid:Reviewers}"),
            Some(group.id.to_string())
        );
    }

    #[tokio::test]
    async fn test_handler_allow_list() {
        let gateway = gateway();
        let mut template = ProvisioningTemplate::new();
        template.security.additional_administrators = vec![User::new("alice")];
        template.custom_actions.site_custom_actions =
            vec![CustomAction::new("Help", "ScriptLink")];

        let options = ApplyOptions {
            handlers: Some(vec![HandlerKind::CustomActions]),
            ..Default::default()
        };
        let outcome = ProvisioningEngine::new()
            .apply(&gateway, &template, &options)
            .await
            .unwrap();
        assert_eq!(outcome.handlers_run, vec![HandlerKind::CustomActions]);
        assert!(gateway.administrators().await.unwrap().is_empty());
        assert_eq!(
            outcome
                .statistics
                .action_count(EntityKind::CustomAction, ActionType::Created),
            1
        );
    }

    #[tokio::test]
    async fn test_failure_aborts_pipeline() {
        let gateway = gateway().with_failure("add_group");
        let mut template = ProvisioningTemplate::new();
        template.security.site_groups = vec![SiteGroup::new("Reviewers")];
        template.custom_actions.web_custom_actions =
            vec![CustomAction::new("Help", "ScriptLink")];

        let err = ProvisioningEngine::new()
            .apply(&gateway, &template, &ApplyOptions::default())
            .await
            .unwrap_err();
        assert!(err.gateway_kind().is_some());
        assert!(gateway
            .custom_actions(CustomActionScope::Web)
            .await
            .unwrap()
            .is_empty());
    }
}

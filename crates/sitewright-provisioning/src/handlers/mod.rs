//! Object handlers.
//!
//! Each handler reconciles one area of a template with the target: it reads
//! live state through the gateway, diffs it against the desired state and
//! writes only what differs. Extraction runs the same mapping backwards.
//!
//! The set of handlers is closed and runs in the order of
//! [`HandlerKind::pipeline`].

pub mod custom_actions;
pub mod data_rows;
pub mod security;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sitewright_gateway::operation::WebInfo;
use sitewright_gateway::{GatewayErrorKind, GatewayResult, TargetGateway};
use std::fmt;
use std::str::FromStr;

use crate::config::{ApplyOptions, ExtractOptions};
use crate::error::ProvisioningResult;
use crate::model::ProvisioningTemplate;
use crate::statistics::{ActionType, EntityKind, StatisticsTracker};
use crate::token::TokenParser;

pub use custom_actions::CustomActionsHandler;
pub use data_rows::DataRowsHandler;
pub use security::SiteSecurityHandler;

/// Identifies a handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HandlerKind {
    SiteSecurity,
    ListDataRows,
    CustomActions,
}

impl HandlerKind {
    /// All handlers in execution order.
    #[must_use]
    pub fn pipeline() -> &'static [HandlerKind] {
        &[
            HandlerKind::SiteSecurity,
            HandlerKind::ListDataRows,
            HandlerKind::CustomActions,
        ]
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            HandlerKind::SiteSecurity => "site_security",
            HandlerKind::ListDataRows => "list_data_rows",
            HandlerKind::CustomActions => "custom_actions",
        }
    }
}

impl fmt::Display for HandlerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for HandlerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "site_security" | "siteSecurity" => Ok(HandlerKind::SiteSecurity),
            "list_data_rows" | "listDataRows" => Ok(HandlerKind::ListDataRows),
            "custom_actions" | "customActions" => Ok(HandlerKind::CustomActions),
            _ => Err(format!("Unknown handler: {s}")),
        }
    }
}

/// Everything a handler needs during an apply run.
pub struct ApplyContext<'a> {
    pub gateway: &'a dyn TargetGateway,
    /// The web as read at the start of the run.
    pub web: &'a WebInfo,
    pub options: &'a ApplyOptions,
    pub statistics: &'a StatisticsTracker,
}

impl ApplyContext<'_> {
    /// Record an outcome.
    pub fn record(&self, entity: EntityKind, action: ActionType) {
        self.statistics.record(entity, action);
    }

    /// Turn an unresolvable principal into a logged skip. Every other error
    /// is returned.
    pub(crate) fn skip_unresolved<T>(
        &self,
        result: GatewayResult<T>,
        entity: EntityKind,
        name: &str,
    ) -> ProvisioningResult<Option<T>> {
        match result {
            Ok(value) => Ok(Some(value)),
            Err(err) if err.kind() == GatewayErrorKind::PrincipalNotResolved => {
                tracing::warn!(
                    principal = %name,
                    entity = %entity,
                    error = %err,
                    "Principal could not be resolved, skipping"
                );
                self.record(entity, ActionType::FailedSkipped);
                Ok(None)
            }
            Err(err) => Err(err.into()),
        }
    }
}

/// Everything a handler needs during an extract run.
pub struct ExtractContext<'a> {
    pub gateway: &'a dyn TargetGateway,
    pub web: &'a WebInfo,
    pub options: &'a ExtractOptions,
}

/// A reconciler for one area of a template.
#[async_trait]
pub trait ObjectHandler: Send + Sync {
    /// Which handler this is.
    fn kind(&self) -> HandlerKind;

    /// Display name used in logs.
    fn name(&self) -> &'static str {
        self.kind().as_str()
    }

    /// Check if applying `template` to `web` could change anything.
    fn will_provision(&self, web: &WebInfo, template: &ProvisioningTemplate) -> bool;

    /// Apply the handler's part of `template` and return the registry,
    /// enriched with tokens for every object created.
    async fn provision(
        &self,
        ctx: &ApplyContext<'_>,
        template: &ProvisioningTemplate,
        parser: TokenParser,
    ) -> ProvisioningResult<TokenParser>;

    /// Check if this handler has anything to extract from `web`.
    fn will_extract(&self, web: &WebInfo, options: &ExtractOptions) -> bool;

    /// Read the handler's part of the live state into `template`.
    async fn extract(
        &self,
        ctx: &ExtractContext<'_>,
        template: ProvisioningTemplate,
    ) -> ProvisioningResult<ProvisioningTemplate>;
}

/// The built-in handlers in pipeline order.
#[must_use]
pub fn default_handlers() -> Vec<Box<dyn ObjectHandler>> {
    HandlerKind::pipeline()
        .iter()
        .map(|kind| -> Box<dyn ObjectHandler> {
            match kind {
                HandlerKind::SiteSecurity => Box::new(SiteSecurityHandler),
                HandlerKind::ListDataRows => Box::new(DataRowsHandler),
                HandlerKind::CustomActions => Box::new(CustomActionsHandler),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_order() {
        let kinds: Vec<HandlerKind> = default_handlers().iter().map(|h| h.kind()).collect();
        assert_eq!(kinds, HandlerKind::pipeline());
    }

    #[test]
    fn test_handler_kind_roundtrip() {
        for kind in HandlerKind::pipeline() {
            assert_eq!(kind.as_str().parse::<HandlerKind>().unwrap(), *kind);
        }
        assert!("files".parse::<HandlerKind>().is_err());
        assert_eq!(
            serde_json::to_string(&HandlerKind::ListDataRows).unwrap(),
            "\"listDataRows\""
        );
    }
}

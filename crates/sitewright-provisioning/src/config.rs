//! Run configuration.

use serde::{Deserialize, Serialize};

use crate::error::{ProvisioningError, ProvisioningResult};
use crate::handlers::HandlerKind;
use crate::model::ProvisioningTemplate;

/// Options for an apply run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyOptions {
    /// Skip data rows whose write fails with a duplicate value instead of
    /// aborting the run.
    #[serde(default)]
    pub ignore_duplicate_data_row_errors: bool,
    /// Handlers to run (`None` = all). Order stays fixed.
    #[serde(default)]
    pub handlers: Option<Vec<HandlerKind>>,
}

impl ApplyOptions {
    /// Check if a handler is enabled by these options.
    #[must_use]
    pub fn runs(&self, kind: HandlerKind) -> bool {
        self.handlers
            .as_ref()
            .map_or(true, |handlers| handlers.contains(&kind))
    }
}

/// Options for an extract run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractOptions {
    /// Extract site groups and their members.
    #[serde(default = "default_include_site_groups")]
    pub include_site_groups: bool,
    /// Also extract the associated owner/member/visitor groups.
    #[serde(default)]
    pub include_default_associated_groups: bool,
    /// Handlers to run (`None` = all). Order stays fixed.
    #[serde(default)]
    pub handlers: Option<Vec<HandlerKind>>,
    /// Template whose entities are removed from the extracted result.
    #[serde(skip)]
    pub base_template: Option<ProvisioningTemplate>,
}

fn default_include_site_groups() -> bool {
    true
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            include_site_groups: default_include_site_groups(),
            include_default_associated_groups: false,
            handlers: None,
            base_template: None,
        }
    }
}

impl ExtractOptions {
    /// Check if a handler is enabled by these options.
    #[must_use]
    pub fn runs(&self, kind: HandlerKind) -> bool {
        self.handlers
            .as_ref()
            .map_or(true, |handlers| handlers.contains(&kind))
    }

    /// Prune the extracted template against `base`.
    #[must_use]
    pub fn with_base_template(mut self, base: ProvisioningTemplate) -> Self {
        self.base_template = Some(base);
        self
    }
}

/// Combined configuration as loaded by an embedding application.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisioningConfig {
    #[serde(default)]
    pub apply: ApplyOptions,
    #[serde(default)]
    pub extract: ExtractOptions,
}

impl ProvisioningConfig {
    /// Parse configuration from JSON and validate it.
    pub fn from_json(json: &str) -> ProvisioningResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> ProvisioningResult<()> {
        for (direction, handlers) in [
            ("apply", self.apply.handlers.as_ref()),
            ("extract", self.extract.handlers.as_ref()),
        ] {
            let Some(handlers) = handlers else {
                continue;
            };
            if handlers.is_empty() {
                return Err(ProvisioningError::configuration(format!(
                    "{direction}.handlers must not be empty; omit it to run every handler"
                )));
            }
            for (i, kind) in handlers.iter().enumerate() {
                if handlers[..i].contains(kind) {
                    return Err(ProvisioningError::configuration(format!(
                        "{direction}.handlers lists {kind} more than once"
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ProvisioningConfig::from_json("{}").unwrap();
        assert!(!config.apply.ignore_duplicate_data_row_errors);
        assert!(config.extract.include_site_groups);
        assert!(!config.extract.include_default_associated_groups);
        assert!(config.apply.runs(HandlerKind::CustomActions));
    }

    #[test]
    fn test_handler_allow_list() {
        let config = ProvisioningConfig::from_json(
            r#"{"apply": {"ignoreDuplicateDataRowErrors": true, "handlers": ["listDataRows"]}}"#,
        )
        .unwrap();
        assert!(config.apply.ignore_duplicate_data_row_errors);
        assert!(config.apply.runs(HandlerKind::ListDataRows));
        assert!(!config.apply.runs(HandlerKind::SiteSecurity));
        assert!(config.extract.runs(HandlerKind::SiteSecurity));
    }

    #[test]
    fn test_validate_rejects_bad_handler_lists() {
        let err = ProvisioningConfig::from_json(r#"{"extract": {"handlers": []}}"#).unwrap_err();
        assert!(matches!(err, ProvisioningError::Configuration { .. }));

        let err = ProvisioningConfig::from_json(
            r#"{"apply": {"handlers": ["siteSecurity", "siteSecurity"]}}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }

    #[test]
    fn test_unknown_handler_is_a_parse_error() {
        let err = ProvisioningConfig::from_json(r#"{"apply": {"handlers": ["files"]}}"#).unwrap_err();
        assert!(matches!(err, ProvisioningError::Serialization(_)));
    }
}

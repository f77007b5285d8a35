//! # Provisioning Engine
//!
//! Reconciles a declarative site template with a live site through a
//! [`TargetGateway`](sitewright_gateway::TargetGateway).
//!
//! - [`engine::ProvisioningEngine`] - Runs the handler pipeline for apply and extract
//! - [`handlers`] - Site security, list data rows and custom actions
//! - [`token::TokenParser`] - Placeholder registry threaded through a run
//! - [`validation`] - Equivalence checks between templates and extracted state
//!
//! Apply is idempotent: every handler diffs desired against live state and
//! writes only what differs, so a second run of the same template issues no
//! writes.
//!
//! ## Example
//!
//! ```ignore
//! use sitewright_gateway::prelude::*;
//! use sitewright_provisioning::prelude::*;
//!
//! let gateway = InMemoryGateway::new(WebInfo::new("Contoso HR", "https://contoso.example/sites/hr"));
//! let mut template = ProvisioningTemplate::new();
//! template.security.site_groups = vec![
//!     SiteGroup::new("Approvers").with_owner("Reviewers"),
//!     SiteGroup::new("Reviewers"),
//! ];
//!
//! let engine = ProvisioningEngine::new();
//! let outcome = engine.apply(&gateway, &template, &ApplyOptions::default()).await?;
//! assert_eq!(outcome.statistics.changes(), 2);
//!
//! let extracted = engine.extract(&gateway, &ExtractOptions::default()).await?;
//! assert!(SecurityValidator::new().validate(&template.security, &extracted.security, None));
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod handlers;
pub mod model;
pub mod statistics;
pub mod text;
pub mod token;
pub mod validation;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::config::{ApplyOptions, ExtractOptions, ProvisioningConfig};
    pub use crate::engine::{ApplyOutcome, ApplySummary, GateCache, ProvisioningEngine};
    pub use crate::error::{ProvisioningError, ProvisioningResult};
    pub use crate::handlers::{HandlerKind, ObjectHandler};
    pub use crate::model::{
        CustomAction, CustomActions, DataRow, DataRows, ListInstance, ObjectSecurity,
        ProvisioningTemplate, RoleAssignment, RoleDefinition, SiteGroup, SiteSecurity,
        SiteSecurityPermissions, UpdateBehavior, User,
    };
    pub use crate::statistics::{ActionType, EntityKind, RunStatistics};
    pub use crate::token::{Token, TokenParser};
    pub use crate::validation::{
        CollectionValidator, FieldAccessor, SecuritySection, SecurityValidator,
        StructuralValidator,
    };
}

pub use config::{ApplyOptions, ExtractOptions, ProvisioningConfig};
pub use engine::{ApplyOutcome, ProvisioningEngine};
pub use error::{ProvisioningError, ProvisioningResult};
pub use model::ProvisioningTemplate;

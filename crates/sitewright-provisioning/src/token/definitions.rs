//! Built-in token definitions and the reverse substitutions used on extract.

use sitewright_gateway::ids::{PrincipalId, RoleDefinitionId};
use sitewright_gateway::types::{AssociatedGroupRole, RoleType};
use sitewright_gateway::TargetGateway;
use tracing::instrument;

use super::{Token, TokenParser};
use crate::error::ProvisioningResult;

pub const SITE_TITLE_PATTERNS: [&str; 2] = ["{sitetitle}", "{sitename}"];
pub const SITE_URL_PATTERN: &str = "{siteurl}";
pub const TERM_GROUP_SITE_PATTERNS: [&str; 2] = ["{termgroupsite}", "~termgroupsite"];

/// Pattern of the token holding an associated group's title.
#[must_use]
pub fn associated_group_pattern(role: AssociatedGroupRole) -> &'static str {
    match role {
        AssociatedGroupRole::Owner => "{associatedownergroup}",
        AssociatedGroupRole::Member => "{associatedmembergroup}",
        AssociatedGroupRole::Visitor => "{associatedvisitorgroup}",
    }
}

/// `{groupid:<title>}` resolving to a group's principal id.
pub fn group_id_token(title: &str, id: PrincipalId) -> Token {
    Token::fixed([format!("{{groupid:{title}}}")], id.to_string())
}

/// `{roledefinitionid:<name>}` resolving to a role definition id.
pub fn role_definition_id_token(name: &str, id: RoleDefinitionId) -> Token {
    Token::fixed([format!("{{roledefinitionid:{name}}}")], id.to_string())
}

/// `{roledefinition:<RoleType>}` resolving to the name of a built-in role.
pub fn role_definition_token(role_type: RoleType, name: &str) -> Token {
    Token::fixed([role_definition_placeholder(role_type)], name)
}

/// Placeholder used for a built-in role definition in extracted templates.
#[must_use]
pub fn role_definition_placeholder(role_type: RoleType) -> String {
    format!("{{roledefinition:{role_type}}}")
}

/// Host and path of a site URL flattened into a term group name, e.g.
/// `https://contoso.example/sites/hr/` becomes `contoso.example-sites-hr`.
#[must_use]
pub fn term_group_site_name(url: &str) -> String {
    let without_scheme = url.split_once("://").map_or(url, |(_, rest)| rest);
    without_scheme.trim_end_matches('/').replace('/', "-")
}

impl TokenParser {
    /// Build the registry for a site with the built-in tokens.
    ///
    /// Reads the web, its groups, associated groups and role definitions once.
    #[instrument(skip(gateway), fields(gateway = %gateway.display_name()))]
    pub async fn for_site(gateway: &dyn TargetGateway) -> ProvisioningResult<Self> {
        let web = gateway.web().await?;
        let mut parser = TokenParser::new();

        parser.register(Token::fixed(SITE_TITLE_PATTERNS, web.title.clone()));
        parser.register(Token::fixed([SITE_URL_PATTERN], web.url.clone()));
        let url = web.url.clone();
        parser.register(Token::computed(TERM_GROUP_SITE_PATTERNS, move || {
            term_group_site_name(&url)
        }));

        for role in AssociatedGroupRole::all() {
            let token = parser.associated_group_token(*role);
            parser.register(token);
            let title = gateway.associated_group(*role).await?.map(|g| g.title);
            parser.set_associated_group(*role, title.as_deref());
        }

        for group in gateway.site_groups().await? {
            parser.register(group_id_token(&group.title, group.id));
        }

        for definition in gateway.role_definitions().await? {
            parser.register(role_definition_id_token(&definition.name, definition.id));
            if definition.role_type.is_built_in() {
                parser.register(role_definition_token(
                    definition.role_type,
                    &definition.name,
                ));
            }
        }

        tracing::debug!(patterns = parser.pattern_count(), "Built site token registry");
        Ok(parser)
    }
}

/// Titles of the site's associated groups, used when tokenizing extracted
/// principal names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssociatedGroupTitles {
    pub owner: Option<String>,
    pub member: Option<String>,
    pub visitor: Option<String>,
}

impl AssociatedGroupTitles {
    fn iter(&self) -> impl Iterator<Item = (AssociatedGroupRole, &str)> {
        [
            (AssociatedGroupRole::Owner, self.owner.as_deref()),
            (AssociatedGroupRole::Member, self.member.as_deref()),
            (AssociatedGroupRole::Visitor, self.visitor.as_deref()),
        ]
        .into_iter()
        .filter_map(|(role, title)| title.map(|t| (role, t)))
    }
}

/// Replace the site title inside `value` with `{sitetitle}`.
#[must_use]
pub fn tokenize_site_title(value: &str, site_title: &str) -> String {
    if site_title.is_empty() {
        return value.to_string();
    }
    value.replace(site_title, SITE_TITLE_PATTERNS[0])
}

/// Replace associated group titles and the site title inside a login name
/// with their tokens.
#[must_use]
pub fn replace_group_tokens(
    login_name: &str,
    associated: &AssociatedGroupTitles,
    site_title: &str,
) -> String {
    let mut login_name = login_name.to_string();
    for (role, title) in associated.iter() {
        if !title.is_empty() {
            login_name = login_name.replace(title, associated_group_pattern(role));
        }
    }
    if !site_title.is_empty() {
        login_name = login_name.replace(site_title, SITE_TITLE_PATTERNS[1]);
    }
    login_name
}

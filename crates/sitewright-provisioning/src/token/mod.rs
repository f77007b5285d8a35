//! Token registry.
//!
//! Template strings carry placeholders such as `{sitetitle}` or
//! `{groupid:Approvers}`. A [`TokenParser`] maps each placeholder pattern to a
//! [`Token`] and substitutes resolved values in a single left-to-right pass.
//!
//! The parser is owned by one run. Handlers receive it by value and hand it
//! back, enriched with tokens for the objects they created, so later handlers
//! (and later objects of the same handler) can reference them.

pub mod definitions;

use regex::{Captures, Regex, RegexBuilder};
use sitewright_gateway::types::AssociatedGroupRole;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, OnceLock, RwLock};

pub use definitions::{replace_group_tokens, tokenize_site_title, AssociatedGroupTitles};

type Resolver = Arc<dyn Fn() -> String + Send + Sync>;

/// A resolvable placeholder.
///
/// The value is computed on first use and cached until [`Token::clear_cache`]
/// is called.
pub struct Token {
    patterns: Vec<String>,
    resolver: Resolver,
    cache: RwLock<Option<String>>,
}

impl Token {
    /// Token with a value known up front.
    pub fn fixed<P, S>(patterns: P, value: impl Into<String>) -> Self
    where
        P: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let value = value.into();
        Self::computed(patterns, move || value.clone())
    }

    /// Token whose value is computed lazily.
    pub fn computed<P, S>(patterns: P, resolver: impl Fn() -> String + Send + Sync + 'static) -> Self
    where
        P: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            patterns: patterns.into_iter().map(Into::into).collect(),
            resolver: Arc::new(resolver),
            cache: RwLock::new(None),
        }
    }

    /// Patterns this token answers to.
    #[must_use]
    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    /// Resolved value, computed at most once per cache lifetime.
    pub fn resolve(&self) -> String {
        if let Ok(cache) = self.cache.read() {
            if let Some(value) = cache.as_ref() {
                return value.clone();
            }
        }
        let value = (self.resolver)();
        if let Ok(mut cache) = self.cache.write() {
            *cache = Some(value.clone());
        }
        value
    }

    /// Forget the cached value.
    pub fn clear_cache(&self) {
        if let Ok(mut cache) = self.cache.write() {
            *cache = None;
        }
    }

    /// Check if a value is cached.
    pub fn is_cached(&self) -> bool {
        self.cache.read().map(|c| c.is_some()).unwrap_or(false)
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("patterns", &self.patterns)
            .field("cached", &self.is_cached())
            .finish()
    }
}

/// Registry of tokens for one run.
pub struct TokenParser {
    tokens: Vec<Token>,
    /// Registered patterns in first-registration order with the token that
    /// currently answers to each.
    patterns: Vec<(String, usize)>,
    /// Lower-cased pattern to position in `patterns`.
    lookup: HashMap<String, usize>,
    /// Alternation of all patterns, compiled on the first parse after a
    /// registration.
    matcher: OnceLock<Option<Regex>>,
    associated_groups: Arc<RwLock<BTreeMap<AssociatedGroupRole, String>>>,
}

impl Default for TokenParser {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenParser {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tokens: Vec::new(),
            patterns: Vec::new(),
            lookup: HashMap::new(),
            matcher: OnceLock::new(),
            associated_groups: Arc::new(RwLock::new(BTreeMap::new())),
        }
    }

    /// Add a token.
    ///
    /// A pattern that is already registered is taken over by the new token
    /// and keeps its original matching priority.
    pub fn register(&mut self, token: Token) {
        let index = self.tokens.len();
        for pattern in token.patterns() {
            let key = pattern.to_lowercase();
            match self.lookup.get(&key) {
                Some(position) => {
                    tracing::debug!(pattern = %pattern, "Token pattern shadowed");
                    self.patterns[*position].1 = index;
                }
                None => {
                    self.lookup.insert(key, self.patterns.len());
                    self.patterns.push((pattern.clone(), index));
                }
            }
        }
        self.tokens.push(token);
        self.matcher = OnceLock::new();
    }

    /// Substitute every registered pattern in `text`.
    ///
    /// Unregistered placeholders are left verbatim.
    #[must_use]
    pub fn parse(&self, text: &str) -> String {
        self.parse_skipping(text, &[])
    }

    /// Substitute registered patterns except the ones listed in `skip`.
    #[must_use]
    pub fn parse_skipping(&self, text: &str, skip: &[&str]) -> String {
        let Some(matcher) = self.matcher.get_or_init(|| self.build_matcher()) else {
            return text.to_string();
        };
        matcher
            .replace_all(text, |caps: &Captures<'_>| {
                let matched = &caps[0];
                if skip.iter().any(|s| s.eq_ignore_ascii_case(matched)) {
                    return matched.to_string();
                }
                match self.token_for(matched) {
                    Some(token) => token.resolve(),
                    None => matched.to_string(),
                }
            })
            .into_owned()
    }

    /// Resolve a single pattern, `None` if it is not registered.
    #[must_use]
    pub fn resolve(&self, pattern: &str) -> Option<String> {
        self.token_for(pattern).map(Token::resolve)
    }

    /// Check if a pattern is registered.
    #[must_use]
    pub fn is_registered(&self, pattern: &str) -> bool {
        self.lookup.contains_key(&pattern.to_lowercase())
    }

    /// Force re-resolution of a pattern on next use. Returns `false` when the
    /// pattern is not registered.
    pub fn clear_cache(&self, pattern: &str) -> bool {
        match self.token_for(pattern) {
            Some(token) => {
                token.clear_cache();
                true
            }
            None => false,
        }
    }

    /// Number of registered patterns.
    #[must_use]
    pub fn pattern_count(&self) -> usize {
        self.patterns.len()
    }

    /// Record the current title of an associated group and invalidate the
    /// matching token.
    pub fn set_associated_group(&self, role: AssociatedGroupRole, title: Option<&str>) {
        if let Ok(mut groups) = self.associated_groups.write() {
            match title {
                Some(title) => {
                    groups.insert(role, title.to_string());
                }
                None => {
                    groups.remove(&role);
                }
            }
        }
        self.clear_cache(definitions::associated_group_pattern(role));
    }

    /// Token reading the shared associated-group titles.
    pub(crate) fn associated_group_token(&self, role: AssociatedGroupRole) -> Token {
        let groups = Arc::clone(&self.associated_groups);
        Token::computed([definitions::associated_group_pattern(role)], move || {
            groups
                .read()
                .ok()
                .and_then(|groups| groups.get(&role).cloned())
                .unwrap_or_default()
        })
    }

    fn token_for(&self, pattern: &str) -> Option<&Token> {
        self.lookup
            .get(&pattern.to_lowercase())
            .and_then(|position| self.patterns.get(*position))
            .and_then(|(_, index)| self.tokens.get(*index))
    }

    fn build_matcher(&self) -> Option<Regex> {
        if self.patterns.is_empty() {
            return None;
        }
        let alternation = self
            .patterns
            .iter()
            .map(|(pattern, _)| regex::escape(pattern))
            .collect::<Vec<_>>()
            .join("|");
        match RegexBuilder::new(&alternation)
            .case_insensitive(true)
            .size_limit(64 * (1 << 20))
            .build()
        {
            Ok(matcher) => Some(matcher),
            Err(err) => {
                tracing::error!(error = %err, patterns = self.patterns.len(), "Failed to compile token matcher");
                None
            }
        }
    }
}

impl fmt::Debug for TokenParser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenParser")
            .field(
                "patterns",
                &self.patterns.iter().map(|(p, _)| p).collect::<Vec<_>>(),
            )
            .finish()
    }
}

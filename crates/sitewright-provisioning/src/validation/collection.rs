//! Keyed collection comparison.

use std::collections::HashSet;
use std::fmt;

use crate::token::TokenParser;

/// A named projection of one field of `T` to its comparable string form.
pub struct FieldAccessor<T> {
    name: &'static str,
    get: fn(&T) -> String,
}

impl<T> FieldAccessor<T> {
    pub const fn new(name: &'static str, get: fn(&T) -> String) -> Self {
        Self { name, get }
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn value(&self, element: &T) -> String {
        (self.get)(element)
    }
}

impl<T> Clone for FieldAccessor<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for FieldAccessor<T> {}

impl<T> fmt::Debug for FieldAccessor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("FieldAccessor").field(&self.name).finish()
    }
}

/// How correlation keys are matched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum KeyMatch {
    #[default]
    Exact,
    IgnoreCase,
}

impl KeyMatch {
    fn matches(self, source: &str, target: &str) -> bool {
        match self {
            KeyMatch::Exact => source == target,
            KeyMatch::IgnoreCase => source.to_lowercase() == target.to_lowercase(),
        }
    }
}

/// Final count rule applied after every source element was looked up.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Cardinality {
    /// Every source element matched some target element. Extra target
    /// elements are allowed and one target may match several sources.
    #[default]
    MatchedOnly,
    /// Source and target correspond one to one.
    Exact,
}

/// Strategy that can declare a field pair equal regardless of raw values,
/// e.g. for server-assigned identifiers.
pub trait ComparisonOverride<T>: Send + Sync {
    /// Return `true` to accept `field` as equal for this element pair.
    fn forces_equal(&self, field: &str, source: &T, target: &T) -> bool;
}

impl<T, F> ComparisonOverride<T> for F
where
    F: Fn(&str, &T, &T) -> bool + Send + Sync,
{
    fn forces_equal(&self, field: &str, source: &T, target: &T) -> bool {
        self(field, source, target)
    }
}

/// First field that differed between two correlated elements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMismatch {
    pub key: String,
    pub field: &'static str,
    pub source: String,
    pub target: String,
}

/// Detailed result of a collection comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionOutcome {
    pub source_count: usize,
    pub target_count: usize,
    pub matched_count: usize,
    /// Source keys that found no target.
    pub unmatched: Vec<String>,
    pub mismatch: Option<FieldMismatch>,
    equivalent: bool,
}

impl CollectionOutcome {
    #[must_use]
    pub fn is_equivalent(&self) -> bool {
        self.equivalent
    }
}

/// Compares two collections of `T` correlated by a key field.
pub struct CollectionValidator<T> {
    key: FieldAccessor<T>,
    fields: Vec<FieldAccessor<T>>,
    key_match: KeyMatch,
    cardinality: Cardinality,
    comparison_override: Option<Box<dyn ComparisonOverride<T>>>,
    token_exceptions: HashSet<&'static str>,
    resolve_target_tokens: bool,
}

impl<T> CollectionValidator<T> {
    /// Create a validator correlating on `key` and comparing `fields`.
    pub fn new(key: FieldAccessor<T>, fields: Vec<FieldAccessor<T>>) -> Self {
        Self {
            key,
            fields,
            key_match: KeyMatch::default(),
            cardinality: Cardinality::default(),
            comparison_override: None,
            token_exceptions: HashSet::new(),
            resolve_target_tokens: false,
        }
    }

    #[must_use]
    pub fn key_match(mut self, key_match: KeyMatch) -> Self {
        self.key_match = key_match;
        self
    }

    #[must_use]
    pub fn cardinality(mut self, cardinality: Cardinality) -> Self {
        self.cardinality = cardinality;
        self
    }

    #[must_use]
    pub fn with_override(mut self, comparison_override: impl ComparisonOverride<T> + 'static) -> Self {
        self.comparison_override = Some(Box::new(comparison_override));
        self
    }

    /// Never token-resolve the named field.
    #[must_use]
    pub fn token_exception(mut self, field: &'static str) -> Self {
        self.token_exceptions.insert(field);
        self
    }

    /// Resolve tokens in target values as well. Needed when the target was
    /// itself produced by tokenizing extraction.
    #[must_use]
    pub fn resolve_target_tokens(mut self, resolve: bool) -> Self {
        self.resolve_target_tokens = resolve;
        self
    }

    /// Check if `target` is equivalent to `source`.
    pub fn validate(&self, source: &[T], target: &[T], tokens: Option<&TokenParser>) -> bool {
        self.compare(source, target, tokens).is_equivalent()
    }

    /// Compare and report counts and the first field mismatch.
    pub fn compare(&self, source: &[T], target: &[T], tokens: Option<&TokenParser>) -> CollectionOutcome {
        let mut matched_targets = vec![false; target.len()];
        let mut matched_count = 0;
        let mut unmatched = Vec::new();

        for source_element in source {
            let source_key = self.resolved(self.key.name, self.key.value(source_element), tokens);

            let found = target.iter().enumerate().find(|(index, target_element)| {
                if self.cardinality == Cardinality::Exact && matched_targets[*index] {
                    return false;
                }
                let target_key = self.target_value(self.key.name, self.key.value(target_element), tokens);
                self.key_match.matches(&source_key, &target_key)
            });

            let Some((index, target_element)) = found else {
                unmatched.push(source_key);
                continue;
            };
            matched_targets[index] = true;
            matched_count += 1;

            if let Some(mismatch) = self.first_mismatch(&source_key, source_element, target_element, tokens) {
                tracing::debug!(
                    key = %mismatch.key,
                    field = mismatch.field,
                    "Field mismatch"
                );
                return CollectionOutcome {
                    source_count: source.len(),
                    target_count: target.len(),
                    matched_count,
                    unmatched,
                    mismatch: Some(mismatch),
                    equivalent: false,
                };
            }
        }

        let equivalent = match self.cardinality {
            Cardinality::MatchedOnly => matched_count == source.len(),
            Cardinality::Exact => matched_count == source.len() && source.len() == target.len(),
        };
        CollectionOutcome {
            source_count: source.len(),
            target_count: target.len(),
            matched_count,
            unmatched,
            mismatch: None,
            equivalent,
        }
    }

    fn first_mismatch(
        &self,
        key: &str,
        source: &T,
        target: &T,
        tokens: Option<&TokenParser>,
    ) -> Option<FieldMismatch> {
        for field in &self.fields {
            let source_value = self.resolved(field.name, field.value(source), tokens);
            let target_value = self.target_value(field.name, field.value(target), tokens);
            if source_value == target_value {
                continue;
            }
            if let Some(comparison_override) = &self.comparison_override {
                if comparison_override.forces_equal(field.name, source, target) {
                    continue;
                }
            }
            return Some(FieldMismatch {
                key: key.to_string(),
                field: field.name,
                source: source_value,
                target: target_value,
            });
        }
        None
    }

    fn resolved(&self, field: &str, value: String, tokens: Option<&TokenParser>) -> String {
        match tokens {
            Some(parser) if !self.token_exceptions.contains(field) => parser.parse(&value),
            _ => value,
        }
    }

    fn target_value(&self, field: &str, value: String, tokens: Option<&TokenParser>) -> String {
        if self.resolve_target_tokens {
            self.resolved(field, value, tokens)
        } else {
            value
        }
    }
}

impl<T> fmt::Debug for CollectionValidator<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectionValidator")
            .field("key", &self.key)
            .field("fields", &self.fields)
            .field("key_match", &self.key_match)
            .field("cardinality", &self.cardinality)
            .field("has_override", &self.comparison_override.is_some())
            .finish()
    }
}

//! Equivalence validation.
//!
//! Token-aware comparison of two configurations, or of a template and the
//! state extracted after applying it:
//!
//! - [`CollectionValidator`] correlates typed elements by a key and compares
//!   a fixed list of named fields.
//! - [`StructuralValidator`] compares XML-like element trees.
//! - [`SecurityValidator`] composes collection validators for a whole
//!   security block.

pub mod collection;
pub mod security;
pub mod structural;

pub use collection::{
    Cardinality, CollectionOutcome, CollectionValidator, ComparisonOverride, FieldAccessor,
    FieldMismatch, KeyMatch,
};
pub use security::{validate_object_security, SecuritySection, SecurityValidator};
pub use structural::{StructuralValidator, XmlElement};

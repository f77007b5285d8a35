//! Structural comparison of XML fragments.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::error::{ProvisioningError, ProvisioningResult};
use crate::token::TokenParser;

/// An element tree parsed from an XML fragment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlElement {
    pub name: String,
    pub attributes: BTreeMap<String, String>,
    /// Concatenated, trimmed text content.
    pub text: String,
    pub children: Vec<XmlElement>,
}

impl XmlElement {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Parse a fragment with a single root element.
    pub fn parse(xml: &str) -> ProvisioningResult<Self> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut stack: Vec<XmlElement> = Vec::new();
        let mut root = None;

        loop {
            match reader.read_event() {
                Ok(Event::Start(e)) => stack.push(Self::from_start(&e)?),
                Ok(Event::Empty(e)) => {
                    let element = Self::from_start(&e)?;
                    Self::close(element, &mut stack, &mut root)?;
                }
                Ok(Event::Text(e)) => {
                    let text = e
                        .unescape()
                        .map_err(|err| ProvisioningError::xml_parse(err.to_string()))?;
                    if let Some(current) = stack.last_mut() {
                        current.text.push_str(text.trim());
                    }
                }
                Ok(Event::CData(e)) => {
                    if let Some(current) = stack.last_mut() {
                        current.text.push_str(String::from_utf8_lossy(&e).trim());
                    }
                }
                Ok(Event::End(_)) => {
                    let element = stack
                        .pop()
                        .ok_or_else(|| ProvisioningError::xml_parse("unbalanced end tag"))?;
                    Self::close(element, &mut stack, &mut root)?;
                }
                Ok(Event::Eof) => break,
                Err(e) => return Err(ProvisioningError::xml_parse(e.to_string())),
                _ => {}
            }
        }

        if !stack.is_empty() {
            return Err(ProvisioningError::xml_parse("unclosed element"));
        }
        root.ok_or_else(|| ProvisioningError::xml_parse("no root element"))
    }

    fn from_start(e: &BytesStart<'_>) -> ProvisioningResult<Self> {
        let mut element = XmlElement::new(String::from_utf8_lossy(e.name().as_ref()));
        for attr in e.attributes() {
            let attr = attr.map_err(|err| ProvisioningError::xml_parse(err.to_string()))?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr
                .unescape_value()
                .map_err(|err| ProvisioningError::xml_parse(err.to_string()))?;
            element.attributes.insert(key, value.into_owned());
        }
        Ok(element)
    }

    fn close(
        element: XmlElement,
        stack: &mut [XmlElement],
        root: &mut Option<XmlElement>,
    ) -> ProvisioningResult<()> {
        match stack.last_mut() {
            Some(parent) => parent.children.push(element),
            None if root.is_none() => *root = Some(element),
            None => return Err(ProvisioningError::xml_parse("more than one root element")),
        }
        Ok(())
    }

    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    #[must_use]
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_child(mut self, child: XmlElement) -> Self {
        self.children.push(child);
        self
    }

    /// Remove an attribute from this element.
    pub fn drop_attribute(&mut self, name: &str) {
        self.attributes.remove(name);
    }

    /// Upper-case the value of an attribute on this element.
    pub fn upper_case_attribute(&mut self, name: &str) {
        if let Some(value) = self.attributes.get_mut(name) {
            *value = value.to_uppercase();
        }
    }

    /// Deep equality ignoring attribute order. Children are compared in
    /// order within each tag name; the interleaving of different tags does
    /// not matter.
    #[must_use]
    pub fn structurally_equals(&self, other: &XmlElement) -> bool {
        if self.name != other.name || self.attributes != other.attributes || self.text != other.text {
            return false;
        }
        let tags: BTreeSet<&str> = self
            .children
            .iter()
            .chain(other.children.iter())
            .map(|child| child.name.as_str())
            .collect();
        tags.into_iter().all(|tag| {
            let mine: Vec<&XmlElement> = self.children.iter().filter(|c| c.name == tag).collect();
            let theirs: Vec<&XmlElement> = other.children.iter().filter(|c| c.name == tag).collect();
            mine.len() == theirs.len()
                && mine
                    .iter()
                    .zip(theirs.iter())
                    .all(|(a, b)| a.structurally_equals(b))
        })
    }
}

type Normalizer = Box<dyn Fn(&mut XmlElement, &mut XmlElement) + Send + Sync>;
type Acceptor = Box<dyn Fn(&XmlElement, &XmlElement) -> bool + Send + Sync>;

/// Compares element trees after optional normalization.
#[derive(Default)]
pub struct StructuralValidator {
    normalizer: Option<Normalizer>,
    acceptor: Option<Acceptor>,
}

impl StructuralValidator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Hook applied to copies of both trees before they are compared.
    #[must_use]
    pub fn with_normalizer(
        mut self,
        normalizer: impl Fn(&mut XmlElement, &mut XmlElement) + Send + Sync + 'static,
    ) -> Self {
        self.normalizer = Some(Box::new(normalizer));
        self
    }

    /// Hook that accepts a pair outright when it returns `true`.
    #[must_use]
    pub fn with_acceptor(
        mut self,
        acceptor: impl Fn(&XmlElement, &XmlElement) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.acceptor = Some(Box::new(acceptor));
        self
    }

    /// Check if two trees are equivalent.
    pub fn validate(&self, source: &XmlElement, target: &XmlElement) -> bool {
        let mut source = source.clone();
        let mut target = target.clone();
        if let Some(normalizer) = &self.normalizer {
            normalizer(&mut source, &mut target);
        }
        if let Some(acceptor) = &self.acceptor {
            if acceptor(&source, &target) {
                return true;
            }
        }
        source.structurally_equals(&target)
    }

    /// Parse and compare two fragments.
    pub fn validate_xml(&self, source: &str, target: &str) -> ProvisioningResult<bool> {
        Ok(self.validate(&XmlElement::parse(source)?, &XmlElement::parse(target)?))
    }

    /// Compare two collections of fragments correlated by `key_attribute`
    /// (case-insensitive). Tokens are resolved in both fragments before
    /// parsing. Every source fragment must find a target.
    pub fn validate_xml_collection<S, T>(
        &self,
        source: &[S],
        target: &[T],
        key_attribute: &str,
        tokens: Option<&TokenParser>,
    ) -> ProvisioningResult<bool>
    where
        S: AsRef<str>,
        T: AsRef<str>,
    {
        let parse = |xml: &str| -> ProvisioningResult<(String, XmlElement)> {
            let xml = match tokens {
                Some(parser) => parser.parse(xml),
                None => xml.to_string(),
            };
            let element = XmlElement::parse(&xml)?;
            let key = element
                .attribute(key_attribute)
                .ok_or_else(|| {
                    ProvisioningError::xml_parse(format!(
                        "<{}> has no {key_attribute} attribute",
                        element.name
                    ))
                })?
                .to_lowercase();
            Ok((key, element))
        };

        let targets = target
            .iter()
            .map(|xml| parse(xml.as_ref()))
            .collect::<ProvisioningResult<Vec<_>>>()?;

        let mut matched = 0;
        for xml in source {
            let (key, source_element) = parse(xml.as_ref())?;
            let Some((_, target_element)) = targets.iter().find(|(k, _)| *k == key) else {
                tracing::debug!(key = %key, "No target fragment for key");
                continue;
            };
            matched += 1;
            if !self.validate(&source_element, target_element) {
                tracing::debug!(key = %key, "Fragment differs");
                return Ok(false);
            }
        }
        Ok(matched == source.len())
    }
}

impl fmt::Debug for StructuralValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StructuralValidator")
            .field("has_normalizer", &self.normalizer.is_some())
            .field("has_acceptor", &self.acceptor.is_some())
            .finish()
    }
}

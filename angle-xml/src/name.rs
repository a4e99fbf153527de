use std::fmt;
use std::hash::{Hash, Hasher};

use ahash::AHashMap;

/// The `xml` namespace, implicitly in scope everywhere.
pub const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";
/// The XSLT namespace.
pub const XSL_NAMESPACE: &str = "http://www.w3.org/1999/XSL/Transform";
/// The default function namespace of XPath.
pub const FN_NAMESPACE: &str = "http://www.w3.org/2005/xpath-functions";
/// The XML Schema namespace, used for the atomic type names.
pub const XS_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema";
/// The namespace of the Angle extension functions.
pub const ANGLE_NAMESPACE: &str = "http://midbel.org/angle";
/// The ISO Schematron namespace.
pub const SCH_NAMESPACE: &str = "http://purl.oclc.org/dsdl/schematron";

/// A namespace-qualified name.
///
/// Two names are equal when their local parts are equal and they are in the
/// same namespace; the prefix is presentation only. [`QName::matches`]
/// additionally understands the `*` wildcard on either side.
#[derive(Debug, Clone)]
pub struct QName {
    pub local: String,
    pub prefix: Option<String>,
    pub uri: Option<String>,
}

impl QName {
    pub fn new(local: impl Into<String>) -> Self {
        QName {
            local: local.into(),
            prefix: None,
            uri: None,
        }
    }

    pub fn qualified(local: impl Into<String>, prefix: impl Into<String>, uri: impl Into<String>) -> Self {
        QName {
            local: local.into(),
            prefix: Some(prefix.into()),
            uri: Some(uri.into()),
        }
    }

    pub fn with_uri(local: impl Into<String>, uri: impl Into<String>) -> Self {
        QName {
            local: local.into(),
            prefix: None,
            uri: Some(uri.into()),
        }
    }

    /// The name as written, `prefix:local` or bare `local`.
    pub fn as_written(&self) -> String {
        match &self.prefix {
            Some(prefix) => format!("{}:{}", prefix, self.local),
            None => self.local.clone(),
        }
    }

    pub fn is_wildcard(&self) -> bool {
        self.local == "*"
    }

    /// Wildcard-aware name comparison.
    ///
    /// Local parts match when equal or either is `*`; namespaces match when
    /// equal, both absent, or either is the `*` wildcard.
    pub fn matches(&self, other: &QName) -> bool {
        let local = self.local == "*" || other.local == "*" || self.local == other.local;
        if !local {
            return false;
        }
        match (self.uri.as_deref(), other.uri.as_deref()) {
            (Some("*"), _) | (_, Some("*")) => true,
            (a, b) => a.unwrap_or("") == b.unwrap_or(""),
        }
    }
}

impl PartialEq for QName {
    fn eq(&self, other: &Self) -> bool {
        self.local == other.local
            && self.uri.as_deref().unwrap_or("") == other.uri.as_deref().unwrap_or("")
    }
}

impl Eq for QName {}

impl Hash for QName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.local.hash(state);
        self.uri.as_deref().unwrap_or("").hash(state);
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_written())
    }
}

/// Prefix to namespace URI table.
///
/// The `xml`, `xs`, `fn` and `angle` prefixes are always bound.
#[derive(Debug, Clone, Default)]
pub struct Namespaces {
    by_prefix: AHashMap<String, String>,
    default_element: Option<String>,
}

impl Namespaces {
    pub fn new() -> Self {
        let mut by_prefix = AHashMap::new();
        by_prefix.insert("xml".to_string(), XML_NAMESPACE.to_string());
        by_prefix.insert("xs".to_string(), XS_NAMESPACE.to_string());
        by_prefix.insert("fn".to_string(), FN_NAMESPACE.to_string());
        by_prefix.insert("angle".to_string(), ANGLE_NAMESPACE.to_string());
        Namespaces {
            by_prefix,
            default_element: None,
        }
    }

    pub fn declare(&mut self, prefix: impl Into<String>, uri: impl Into<String>) {
        self.by_prefix.insert(prefix.into(), uri.into());
    }

    pub fn set_default_element_namespace(&mut self, uri: impl Into<String>) {
        self.default_element = Some(uri.into());
    }

    pub fn default_element_namespace(&self) -> Option<&str> {
        self.default_element.as_deref()
    }

    pub fn resolve(&self, prefix: &str) -> Option<&str> {
        self.by_prefix.get(prefix).map(|s| s.as_str())
    }

    /// Fold the declarations of `other` into this table; `other` wins on
    /// conflicting prefixes.
    pub fn merge(&mut self, other: &Namespaces) {
        for (prefix, uri) in &other.by_prefix {
            self.by_prefix.insert(prefix.clone(), uri.clone());
        }
        if other.default_element.is_some() {
            self.default_element = other.default_element.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_ignores_prefix() {
        let a = QName::qualified("item", "a", "http://example.com");
        let b = QName::qualified("item", "b", "http://example.com");
        assert_eq!(a, b);
    }

    #[test]
    fn wildcard_local() {
        let any = QName::new("*");
        let named = QName::new("item");
        assert!(any.matches(&named));
        assert!(named.matches(&any));
    }

    #[test]
    fn wildcard_namespace() {
        let any = QName::with_uri("item", "*");
        let named = QName::with_uri("item", "http://example.com");
        assert!(any.matches(&named));
        let other = QName::new("other");
        assert!(!any.matches(&other));
    }

    #[test]
    fn absent_namespace_is_empty() {
        let a = QName::new("item");
        let b = QName::with_uri("item", "");
        assert_eq!(a, b);
        assert!(a.matches(&b));
    }
}

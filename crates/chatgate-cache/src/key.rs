//! Physical key construction.
//!
//! Every logical key is stored as `<prefix>:<namespace>:<key>`. The prefix is
//! fixed per deployment, the namespace is chosen by the calling subsystem.

/// Namespace used when the caller does not supply one.
pub const DEFAULT_NAMESPACE: &str = "default";

/// Builds physical keys for one deployment prefix.
#[derive(Debug, Clone)]
pub struct KeyBuilder {
    prefix: String,
}

impl KeyBuilder {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Physical key for `key` in `namespace` (or the default namespace).
    pub fn key(&self, key: &str, namespace: Option<&str>) -> String {
        format!("{}{}", self.namespace_prefix(namespace), key)
    }

    /// Physical prefix shared by every key in `namespace`, including the
    /// trailing separator.
    pub fn namespace_prefix(&self, namespace: Option<&str>) -> String {
        let namespace = encode_namespace(namespace.unwrap_or(DEFAULT_NAMESPACE));
        format!("{}:{}:", self.prefix, namespace)
    }

    /// Strips the namespace prefix from a physical key.
    pub fn logical<'a>(&self, physical: &'a str, namespace: Option<&str>) -> Option<&'a str> {
        let prefix = self.namespace_prefix(namespace);
        physical.strip_prefix(prefix.as_str())
    }
}

/// Namespaces may not contain the separator; `%` and `:` are percent-encoded
/// so `("a:b", "c")` and `("a", "b:c")` never map to the same physical key.
fn encode_namespace(namespace: &str) -> std::borrow::Cow<'_, str> {
    if namespace.contains([':', '%']) {
        namespace.replace('%', "%25").replace(':', "%3A").into()
    } else {
        namespace.into()
    }
}

/// Escapes glob metacharacters so a literal prefix can be used in `SCAN MATCH`.
pub fn escape_glob(literal: &str) -> String {
    let mut escaped = String::with_capacity(literal.len());
    for c in literal.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

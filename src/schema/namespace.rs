//! Namespaces
//!
//! A namespace prefixes table names as `namespace.table`. Dots are reserved
//! as the separator, so a namespace name may never contain one.

use std::borrow::Cow;
use std::fmt;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::{AtlasError, Result};

/// Which character set a namespace name is checked against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamePattern {
    /// Anything without dots or ASCII whitespace. Does not protect against names
    /// the underlying store rejects.
    Unchecked,

    /// ASCII letters, digits, underscores and hyphens
    LooselyChecked,

    /// ASCII letters, digits and single non-initial underscores
    StrictlyChecked,
}

impl NamePattern {
    fn matches(self, name: &str) -> bool {
        match self {
            NamePattern::Unchecked => unchecked_re().is_match(name),
            NamePattern::LooselyChecked => loose_re().is_match(name),
            // regex has no lookahead, the double underscore rule is separate
            NamePattern::StrictlyChecked => strict_re().is_match(name) && !name.contains("__"),
        }
    }
}

impl fmt::Display for NamePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NamePattern::Unchecked => f.write_str(unchecked_re().as_str()),
            NamePattern::LooselyChecked => f.write_str(loose_re().as_str()),
            NamePattern::StrictlyChecked => write!(f, "{} (no '__')", strict_re().as_str()),
        }
    }
}

fn unchecked_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[^. \t\n\x0B\x0C\r]+$").expect("static pattern"))
}

fn loose_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("static pattern"))
}

fn strict_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-zA-Z0-9][A-Za-z0-9_]*$").expect("static pattern"))
}

/// A validated table namespace
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Namespace {
    name: Cow<'static, str>,
}

impl Namespace {
    /// Tables without a namespace
    pub const EMPTY: Namespace = Namespace { name: Cow::Borrowed("") };

    /// The namespace used when none is given
    pub const DEFAULT: Namespace = Namespace { name: Cow::Borrowed("default") };

    /// Create a namespace checked against the strict pattern
    pub fn create(name: &str) -> Result<Self> {
        Self::create_with(name, NamePattern::StrictlyChecked)
    }

    /// Create a namespace checked against `pattern`
    pub fn create_with(name: &str, pattern: NamePattern) -> Result<Self> {
        if name.is_empty() {
            return Err(AtlasError::InvalidNamespace(
                "namespace name cannot be empty (use Namespace::EMPTY instead)".to_string(),
            ));
        }
        if name.contains('.') {
            return Err(AtlasError::InvalidNamespace(format!(
                "'{}' contains a dot, which is reserved",
                name
            )));
        }
        if !pattern.matches(name) {
            return Err(AtlasError::InvalidNamespace(format!(
                "'{}' does not match namespace pattern '{}'",
                name, pattern
            )));
        }
        Ok(Self { name: Cow::Owned(name.to_string()) })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_empty_namespace(&self) -> bool {
        self.name.is_empty()
    }

    /// Fully qualified name of `table` inside this namespace
    pub fn qualify(&self, table: &str) -> String {
        if self.is_empty_namespace() {
            table.to_string()
        } else {
            format!("{}.{}", self.name, table)
        }
    }

    /// True if `table` is a fully qualified name inside this namespace
    pub fn contains_table(&self, table: &str) -> bool {
        if self.is_empty_namespace() {
            return !table.contains('.');
        }
        table
            .strip_prefix(self.name.as_ref())
            .map_or(false, |rest| rest.starts_with('.'))
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Namespace [name={}]", self.name)
    }
}

//! Permission sets: which host types and capabilities module code may use.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use modgate_core::{Error, Result};

/// Fully-qualified, dot-separated type identity (e.g. `org.example.Vector3`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TypeName(String);

impl TypeName {
    pub fn parse(text: &str) -> Result<Self> {
        let text = text.trim();
        if text.is_empty()
            || text.chars().any(char::is_whitespace)
            || text.split('.').any(str::is_empty)
        {
            return Err(Error::parse(format!("invalid type name '{}'", text)));
        }
        Ok(Self(text.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The enclosing package; empty for types outside any package.
    pub fn package(&self) -> &str {
        self.0.rsplit_once('.').map(|(package, _)| package).unwrap_or("")
    }
}

impl fmt::Display for TypeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for TypeName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for TypeName {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<TypeName> for String {
    fn from(name: TypeName) -> Self {
        name.0
    }
}

/// A named runtime operation such as `fs.read` or `net.connect`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Capability(String);

impl Capability {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Whether `prefix` names `package` or one of its parents.
fn package_covers(prefix: &str, package: &str) -> bool {
    match package.strip_prefix(prefix) {
        Some("") => true,
        Some(rest) => !prefix.is_empty() && rest.starts_with('.'),
        None => false,
    }
}

/// Where a scoped capability grant applies.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum GrantScope {
    Type(TypeName),
    Package(String),
}

impl GrantScope {
    fn applies_to(&self, context: &TypeName) -> bool {
        match self {
            Self::Type(name) => name == context,
            Self::Package(prefix) => package_covers(prefix, context.package()),
        }
    }
}

/// Allowed types ∪ allowed package prefixes, plus capability grants.
///
/// Entries are only ever added.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermissionSet {
    types: HashSet<TypeName>,
    packages: BTreeSet<String>,
    capabilities: HashSet<Capability>,
    scoped: HashMap<Capability, BTreeSet<GrantScope>>,
}

impl PermissionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_type(&mut self, name: TypeName) -> &mut Self {
        self.types.insert(name);
        self
    }

    /// Allow every type in `package` and its sub-packages.
    pub fn add_package(&mut self, package: impl Into<String>) -> &mut Self {
        self.packages.insert(package.into());
        self
    }

    /// Grant `capability` to all code checked against this set.
    pub fn grant(&mut self, capability: Capability) -> &mut Self {
        self.capabilities.insert(capability);
        self
    }

    /// Grant `capability` only when exercised through `scope`.
    pub fn grant_scoped(&mut self, capability: Capability, scope: GrantScope) -> &mut Self {
        self.scoped.entry(capability).or_default().insert(scope);
        self
    }

    /// Add every entry of `other`.
    pub fn extend(&mut self, other: &PermissionSet) -> &mut Self {
        self.types.extend(other.types.iter().cloned());
        self.packages.extend(other.packages.iter().cloned());
        self.capabilities.extend(other.capabilities.iter().cloned());
        for (capability, scopes) in &other.scoped {
            self.scoped
                .entry(capability.clone())
                .or_default()
                .extend(scopes.iter().cloned());
        }
        self
    }

    /// True if the type is listed or lives under a listed package prefix.
    pub fn is_permitted(&self, name: &TypeName) -> bool {
        if self.types.contains(name) {
            return true;
        }
        let package = name.package();
        self.packages
            .iter()
            .any(|prefix| package_covers(prefix, package))
    }

    /// True if `capability` is granted outright, or granted to a scope that
    /// covers `context`.
    pub fn is_capability_permitted(
        &self,
        capability: &Capability,
        context: Option<&TypeName>,
    ) -> bool {
        if self.capabilities.contains(capability) {
            return true;
        }
        match (self.scoped.get(capability), context) {
            (Some(scopes), Some(context)) => scopes.iter().any(|scope| scope.applies_to(context)),
            _ => false,
        }
    }

    pub fn types(&self) -> impl Iterator<Item = &TypeName> {
        self.types.iter()
    }

    pub fn packages(&self) -> impl Iterator<Item = &str> {
        self.packages.iter().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
            && self.packages.is_empty()
            && self.capabilities.is_empty()
            && self.scoped.is_empty()
    }
}

/// Named permission sets available to a module environment.
#[derive(Debug, Clone, Default)]
pub struct PermissionSetRegistry {
    sets: BTreeMap<String, PermissionSet>,
}

impl PermissionSetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `set` under `name`, merging into an existing set of that name.
    pub fn insert(&mut self, name: impl Into<String>, set: PermissionSet) {
        let name = name.into();
        tracing::debug!(set = %name, "Registering permission set");
        self.sets.entry(name).or_default().extend(&set);
    }

    /// The set called `name`, created empty if it does not exist yet.
    pub fn get_or_create(&mut self, name: &str) -> &mut PermissionSet {
        self.sets.entry(name.to_string()).or_default()
    }

    pub fn get(&self, name: &str) -> Option<&PermissionSet> {
        self.sets.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut PermissionSet> {
        self.sets.get_mut(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.sets.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.sets.keys().map(String::as_str)
    }

    pub fn into_sets(self) -> BTreeMap<String, PermissionSet> {
        self.sets
    }
}

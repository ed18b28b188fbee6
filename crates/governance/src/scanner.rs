//! One-shot classification of host types into permission sets.
//!
//! Types are tagged explicitly in their descriptors. An inherited tag is
//! pushed down to every subtype that declares the tagged type as a supertype,
//! transitively. Only the batch handed to [`ApiScanner::scan`] is ever seen.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use modgate_core::{Error, Result};

use crate::permission::{PermissionSetRegistry, TypeName};

/// Public-API tag carried by a type or package descriptor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiMarker {
    /// Target set; the scanner's active set when absent.
    #[serde(default)]
    pub permission_set: Option<String>,
    /// Whether subtypes receive the same tag.
    #[serde(default)]
    pub inherited: bool,
}

impl ApiMarker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn in_set(mut self, set: impl Into<String>) -> Self {
        self.permission_set = Some(set.into());
        self
    }

    pub fn inherited(mut self) -> Self {
        self.inherited = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDescriptor {
    pub name: TypeName,
    #[serde(default)]
    pub supertypes: Vec<TypeName>,
    #[serde(default)]
    pub markers: Vec<ApiMarker>,
}

impl TypeDescriptor {
    pub fn new(name: TypeName) -> Self {
        Self {
            name,
            supertypes: Vec::new(),
            markers: Vec::new(),
        }
    }

    pub fn with_supertype(mut self, supertype: TypeName) -> Self {
        self.supertypes.push(supertype);
        self
    }

    pub fn with_marker(mut self, marker: ApiMarker) -> Self {
        self.markers.push(marker);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageDescriptor {
    pub name: String,
    #[serde(default)]
    pub marker: Option<ApiMarker>,
}

/// What a scan added, keyed by permission set name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReport {
    pub types: BTreeMap<String, BTreeSet<TypeName>>,
    pub packages: BTreeMap<String, BTreeSet<String>>,
    /// Types in the batch that ended up in no set.
    pub untagged: usize,
}

impl ScanReport {
    pub fn types_in(&self, set: &str) -> impl Iterator<Item = &TypeName> {
        self.types.get(set).into_iter().flatten()
    }

    pub fn total_types(&self) -> usize {
        self.types.values().map(BTreeSet::len).sum()
    }
}

/// Adds tagged types and packages to the sets of a [`PermissionSetRegistry`].
pub struct ApiScanner<'a> {
    sets: &'a mut PermissionSetRegistry,
    active: String,
}

impl<'a> ApiScanner<'a> {
    /// `active` is the set untargeted markers write into.
    pub fn new(sets: &'a mut PermissionSetRegistry, active: impl Into<String>) -> Self {
        Self {
            sets,
            active: active.into(),
        }
    }

    /// Run the single batch pass.
    ///
    /// Every marker is validated before anything is added, so a marker naming
    /// an unknown set leaves the registry untouched.
    pub fn scan(self, types: &[TypeDescriptor], packages: &[PackageDescriptor]) -> Result<ScanReport> {
        for marker in types
            .iter()
            .flat_map(|t| t.markers.iter())
            .chain(packages.iter().filter_map(|p| p.marker.as_ref()))
        {
            let target = self.target_of(marker);
            if !self.sets.contains(target) {
                return Err(Error::permission_configuration(format!(
                    "API marker names unknown permission set '{}'",
                    target
                )));
            }
        }

        // supertype -> subtypes declared in this batch
        let mut subtypes: HashMap<&TypeName, Vec<&TypeName>> = HashMap::new();
        for descriptor in types {
            for supertype in &descriptor.supertypes {
                subtypes.entry(supertype).or_default().push(&descriptor.name);
            }
        }

        let mut report = ScanReport::default();
        let mut tagged: HashSet<&TypeName> = HashSet::new();

        for descriptor in types {
            for marker in &descriptor.markers {
                let target = self.target_of(marker).to_string();
                let mut members = vec![&descriptor.name];
                if marker.inherited {
                    members.extend(descendants(&subtypes, &descriptor.name));
                }

                let set = self.sets.get_or_create(&target);
                let added = report.types.entry(target).or_default();
                for name in members {
                    set.add_type(name.clone());
                    added.insert(name.clone());
                    tagged.insert(name);
                }
            }
        }

        for package in packages {
            let Some(marker) = &package.marker else {
                continue;
            };
            let target = self.target_of(marker).to_string();
            self.sets.get_or_create(&target).add_package(package.name.clone());
            report
                .packages
                .entry(target)
                .or_default()
                .insert(package.name.clone());
        }

        report.untagged = types.iter().filter(|t| !tagged.contains(&t.name)).count();
        tracing::info!(
            types = report.total_types(),
            packages = report.packages.values().map(BTreeSet::len).sum::<usize>(),
            untagged = report.untagged,
            "API scan complete"
        );
        Ok(report)
    }

    fn target_of<'m>(&'m self, marker: &'m ApiMarker) -> &'m str {
        marker.permission_set.as_deref().unwrap_or(&self.active)
    }
}

/// Every transitive subtype of `root`, excluding `root` itself.
fn descendants<'t>(
    subtypes: &HashMap<&'t TypeName, Vec<&'t TypeName>>,
    root: &TypeName,
) -> Vec<&'t TypeName> {
    let mut seen: HashSet<&TypeName> = HashSet::new();
    let mut found = Vec::new();
    let mut stack: Vec<&'t TypeName> = subtypes.get(root).cloned().unwrap_or_default();

    while let Some(name) = stack.pop() {
        if name == root || !seen.insert(name) {
            continue;
        }
        found.push(name);
        if let Some(children) = subtypes.get(name) {
            stack.extend(children.iter().copied());
        }
    }
    found
}

//! Arena of loaded symbols tagged with the module that owns them.

use std::collections::HashMap;

use modgate_core::{Error, Name, Result};
use modgate_governance::TypeName;

use crate::environment::CallerToken;
use crate::gate::{Resolved, SandboxGate};

/// Reference to a symbol in a [`SymbolArena`], tagged with its owner.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SymbolHandle {
    owner: Option<Name>,
    index: usize,
}

impl SymbolHandle {
    /// Owning module; `None` for host symbols.
    pub fn owner(&self) -> Option<&Name> {
        self.owner.as_ref()
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn is_host(&self) -> bool {
        self.owner.is_none()
    }
}

#[derive(Debug)]
struct Symbol {
    name: TypeName,
    owner: Option<Name>,
}

/// Every symbol loaded into an environment.
///
/// Filled during bootstrap, read concurrently afterwards. A module sees its
/// own symbols and those of modules it depends on; host symbols are visible
/// only when the module's permissions allow the type.
pub struct SymbolArena {
    gate: SandboxGate,
    symbols: Vec<Symbol>,
    by_name: HashMap<TypeName, Vec<usize>>,
}

impl SymbolArena {
    pub(crate) fn new(gate: SandboxGate) -> Self {
        Self {
            gate,
            symbols: Vec::new(),
            by_name: HashMap::new(),
        }
    }

    pub fn register_host_symbol(&mut self, name: TypeName) -> SymbolHandle {
        self.insert(name, None)
    }

    /// Register `name` as defined by `owner`, which must be loaded in the
    /// arena's environment.
    pub fn register_module_symbol(&mut self, owner: &CallerToken, name: TypeName) -> Result<SymbolHandle> {
        match self.gate.resolve(owner, name.as_str())? {
            Resolved::Module(module, _) => {
                let module = module.clone();
                Ok(self.insert(name, Some(module)))
            }
            Resolved::Host => Ok(self.insert(name, None)),
        }
    }

    fn insert(&mut self, name: TypeName, owner: Option<Name>) -> SymbolHandle {
        let entries = self.by_name.entry(name.clone()).or_default();
        if let Some(&index) = entries.iter().find(|&&i| self.symbols[i].owner == owner) {
            return SymbolHandle { owner, index };
        }

        let index = self.symbols.len();
        entries.push(index);
        tracing::trace!(symbol = %name, owner = ?owner.as_ref().map(Name::as_str), index, "Registered symbol");
        self.symbols.push(Symbol {
            name,
            owner: owner.clone(),
        });
        SymbolHandle { owner, index }
    }

    /// The fully-qualified name behind `handle`.
    pub fn name_of(&self, handle: &SymbolHandle) -> Option<&TypeName> {
        self.symbols.get(handle.index).map(|symbol| &symbol.name)
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Look `name` up on behalf of the caller.
    ///
    /// Returns `Ok(None)` if nothing by that name is loaded and a security
    /// denial if symbols exist but none is visible to the caller. Lookup
    /// order: the caller's own symbol, then dependencies by name, then the
    /// host.
    pub fn lookup_symbol(&self, token: &CallerToken, name: &TypeName) -> Result<Option<SymbolHandle>> {
        let caller = self.gate.resolve(token, name.as_str())?;
        let Some(entries) = self.by_name.get(name) else {
            return Ok(None);
        };
        let candidates = entries.iter().map(|&index| (index, &self.symbols[index]));

        let found = match caller {
            Resolved::Host => candidates.min_by_key(|&(_, symbol)| symbol.owner.is_some()),
            Resolved::Module(module, binding) => candidates
                .filter(|&(_, symbol)| match &symbol.owner {
                    Some(owner) => owner == module || binding.closure.contains(owner),
                    None => binding.provider.is_permitted(name),
                })
                .min_by_key(|&(_, symbol)| match &symbol.owner {
                    Some(owner) if owner == module => (0, None),
                    Some(owner) => (1, Some(owner)),
                    None => (2, None),
                }),
        };

        match found {
            Some((index, symbol)) => Ok(Some(SymbolHandle {
                owner: symbol.owner.clone(),
                index,
            })),
            None => {
                tracing::warn!(
                    caller = %token.caller(),
                    symbol = %name,
                    "Symbol not visible to caller"
                );
                Err(Error::security_denial(token.caller(), format!("symbol {}", name)))
            }
        }
    }
}

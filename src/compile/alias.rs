//! Table aliases for one compile.

use std::cell::Cell;
use std::collections::HashMap;
use std::rc::Rc;

/// Logical identity of something that needs an alias.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SourceKey {
    /// A table by name.
    Table(String),
    /// A reference navigation: `"{owner alias}.{member}"`.
    Navigation(String),
}

/// Maps source identities to aliases (`t0`, `t1`, ..).
///
/// Children created with [`AliasRegistry::spawn_child`] draw from the same
/// counter, so aliases stay unique across the whole command, but start with
/// an empty map: nothing a nested select registers leaks back to its parent.
#[derive(Debug)]
pub struct AliasRegistry {
    next: Rc<Cell<usize>>,
    aliases: HashMap<SourceKey, String>,
}

impl AliasRegistry {
    pub fn new() -> Self {
        Self {
            next: Rc::new(Cell::new(0)),
            aliases: HashMap::new(),
        }
    }

    /// A fresh alias not bound to any key.
    pub fn fresh(&self) -> String {
        let n = self.next.get();
        self.next.set(n + 1);
        format!("t{n}")
    }

    /// The alias for `key`, allocated on first request.
    pub fn alias(&mut self, key: SourceKey) -> String {
        self.resolve(key).0
    }

    /// The alias for `key` and whether this call allocated it.
    pub fn resolve(&mut self, key: SourceKey) -> (String, bool) {
        if let Some(alias) = self.aliases.get(&key) {
            return (alias.clone(), false);
        }
        let alias = self.fresh();
        self.aliases.insert(key, alias.clone());
        (alias, true)
    }

    /// Bind `key` to an alias allocated elsewhere.
    pub fn preassign(&mut self, key: SourceKey, alias: &str) {
        self.aliases.insert(key, alias.to_string());
    }

    /// A registry for a nested select.
    pub fn spawn_child(&self) -> Self {
        Self {
            next: Rc::clone(&self.next),
            aliases: HashMap::new(),
        }
    }
}

impl Default for AliasRegistry {
    fn default() -> Self {
        Self::new()
    }
}

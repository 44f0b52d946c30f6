//! Symbol arena: interned named symbols plus anonymous labels.

use std::collections::HashMap;

use crate::section::SectionId;

/// Dense handle into the symbol arena.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct SymId(pub(crate) u32);

impl SymId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// One arena entry. Anonymous labels have no name and never reach the
/// output symbol table; references to them resolve through their section.
#[derive(Debug)]
pub(crate) struct SymbolEntry {
    pub(crate) name: Option<String>,
    pub(crate) binding: Option<(SectionId, u64)>,
}

#[derive(Debug, Default)]
pub(crate) struct SymbolArena {
    entries: Vec<SymbolEntry>,
    lookup: HashMap<String, SymId>,
}

impl SymbolArena {
    pub(crate) fn new() -> SymbolArena {
        SymbolArena::default()
    }

    /// Get or create the named symbol, leaving it unbound.
    pub(crate) fn intern(&mut self, name: &str) -> SymId {
        if let Some(&id) = self.lookup.get(name) {
            return id;
        }
        let id = SymId(self.entries.len() as u32);
        self.entries.push(SymbolEntry {
            name: Some(name.to_string()),
            binding: None,
        });
        self.lookup.insert(name.to_string(), id);
        id
    }

    /// Create an anonymous, unbound label.
    pub(crate) fn temp(&mut self) -> SymId {
        let id = SymId(self.entries.len() as u32);
        self.entries.push(SymbolEntry {
            name: None,
            binding: None,
        });
        id
    }

    /// Bind a symbol at a section offset. Rebinding panics.
    pub(crate) fn bind(&mut self, id: SymId, section: SectionId, offset: u64) {
        let entry = &mut self.entries[id.index()];
        assert!(
            entry.binding.is_none(),
            "symbol `{}` defined twice",
            entry.name.as_deref().unwrap_or("<label>")
        );
        entry.binding = Some((section, offset));
    }

    pub(crate) fn get(&self, id: SymId) -> &SymbolEntry {
        &self.entries[id.index()]
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn entries(&self) -> impl Iterator<Item = (SymId, &SymbolEntry)> {
        self.entries
            .iter()
            .enumerate()
            .map(|(index, entry)| (SymId(index as u32), entry))
    }
}

//! Section registry: per-section buffers, cursors and pending fixups.

use std::collections::HashMap;

use crate::reloc::Fixup;

/// Dense handle into the section registry.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct SectionId(pub(crate) u32);

impl SectionId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Placement class for custom data sections.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum DataKind {
    Writable,
    ReadOnly,
}

/// Sections the streamer creates on demand.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum WellKnown {
    Text = 0,
    Data = 1,
    ReadOnly = 2,
    Xdata = 3,
    Pdata = 4,
    DebugSymbols = 5,
}

impl WellKnown {
    fn index(self) -> usize {
        self as usize
    }

    fn registry_name(self) -> &'static str {
        match self {
            WellKnown::Text => "text",
            WellKnown::Data => "data",
            WellKnown::ReadOnly => "rdata",
            WellKnown::Xdata => "xdata",
            WellKnown::Pdata => "pdata",
            WellKnown::DebugSymbols => ".debug$S",
        }
    }
}

/// Names reachable through the switch-by-name surface. The unwind and
/// debug sections are internal and leave their names free for custom use.
const RESERVED_NAMES: [&str; 3] = ["text", "data", "rdata"];

/// Role a section plays when the container is assembled.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) enum SectionRole {
    Standard(WellKnown),
    Custom(DataKind),
    EhFrame,
}

#[derive(Debug)]
pub(crate) struct Section {
    pub(crate) name: String,
    pub(crate) role: SectionRole,
    pub(crate) data: Vec<u8>,
    pub(crate) fixups: Vec<Fixup>,
    pub(crate) align: u64,
    pub(crate) has_instructions: bool,
}

impl Section {
    /// Alignment handed to the container writer. Requests raised through
    /// the alignment directive win over the per-role floor.
    pub(crate) fn container_align(&self) -> u64 {
        let floor = match self.role {
            SectionRole::Standard(WellKnown::Text) => 16,
            SectionRole::Standard(
                WellKnown::Xdata | WellKnown::Pdata | WellKnown::DebugSymbols,
            ) => 4,
            SectionRole::EhFrame => 8,
            _ => 8,
        };
        self.align.max(floor)
    }
}

#[derive(Default)]
pub(crate) struct SectionTable {
    sections: Vec<Section>,
    by_name: HashMap<String, SectionId>,
    well_known: [Option<SectionId>; 6],
}

impl SectionTable {
    fn push(&mut self, name: &str, role: SectionRole, visible: bool) -> SectionId {
        let id = SectionId(self.sections.len() as u32);
        self.sections.push(Section {
            name: name.to_string(),
            role,
            data: Vec::new(),
            fixups: Vec::new(),
            align: 1,
            has_instructions: false,
        });
        if visible {
            self.by_name.insert(name.to_string(), id);
        }
        id
    }

    /// Get or create a well-known section.
    pub(crate) fn well_known(&mut self, section: WellKnown) -> SectionId {
        if let Some(id) = self.well_known[section.index()] {
            return id;
        }
        let visible = matches!(
            section,
            WellKnown::Text | WellKnown::Data | WellKnown::ReadOnly
        );
        let id = self.push(section.registry_name(), SectionRole::Standard(section), visible);
        self.well_known[section.index()] = Some(id);
        id
    }

    /// Register a custom data section. The name must be fresh.
    pub(crate) fn custom(&mut self, name: &str, kind: DataKind) -> SectionId {
        assert!(
            !RESERVED_NAMES.contains(&name),
            "section name `{name}` is reserved"
        );
        assert!(
            !self.by_name.contains_key(name),
            "section `{name}` already exists"
        );
        self.push(name, SectionRole::Custom(kind), true)
    }

    /// The synthesized unwind table section.
    pub(crate) fn eh_frame(&mut self) -> SectionId {
        self.push(".eh_frame", SectionRole::EhFrame, false)
    }

    pub(crate) fn lookup(&self, name: &str) -> Option<SectionId> {
        self.by_name.get(name).copied()
    }

    pub(crate) fn get(&self, id: SectionId) -> &Section {
        &self.sections[id.index()]
    }

    pub(crate) fn get_mut(&mut self, id: SectionId) -> &mut Section {
        &mut self.sections[id.index()]
    }

    pub(crate) fn len(&self) -> usize {
        self.sections.len()
    }
}

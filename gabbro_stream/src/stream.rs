//! The object stream: cursors, labels, fixups and container assembly.

use gimli::write::{CallFrameInstruction, RelocationTarget};
use object::write::{
    Mangling, Object, Relocation, StandardSection, StandardSegment, Symbol, SymbolId,
    SymbolSection,
};
use object::{BinaryFormat, SectionKind, SymbolFlags, SymbolKind, SymbolScope};
use thiserror::Error;
use tracing::{debug, trace};

use crate::expr::Expr;
use crate::frame::{build_eh_frame, FrameRecord, FrameRecorder, OpenFrame};
use crate::reloc::{flags_for, Fixup, FixupKind};
use crate::section::{DataKind, Section, SectionId, SectionRole, SectionTable, WellKnown};
use crate::symbol::{SymId, SymbolArena};
use crate::target::TargetSpec;

/// Failure while assembling the finished container.
#[derive(Debug, Error)]
pub enum EmitError {
    #[error("container assembly failed: {0}")]
    Object(#[from] object::write::Error),
    #[error("call-frame serialization failed: {0}")]
    Frame(#[from] gimli::write::Error),
}

/// Streams bytes, labels and fixups into named sections, then assembles a
/// relocatable object. The code section is current when the stream opens.
pub struct ObjectStream {
    pub(crate) target: TargetSpec,
    pub(crate) sections: SectionTable,
    pub(crate) symbols: SymbolArena,
    pub(crate) current: SectionId,
    pub(crate) frames: FrameRecorder,
}

impl ObjectStream {
    pub fn new(target: TargetSpec) -> ObjectStream {
        let mut sections = SectionTable::default();
        let current = sections.well_known(WellKnown::Text);
        sections.get_mut(current).has_instructions = true;
        ObjectStream {
            target,
            sections,
            symbols: SymbolArena::new(),
            current,
            frames: FrameRecorder::default(),
        }
    }

    pub fn target(&self) -> &TargetSpec {
        &self.target
    }

    pub fn format(&self) -> BinaryFormat {
        self.target.format
    }

    // --- sections ---

    /// Register a custom data section. Panics on duplicate or reserved
    /// names; the new section does not become current.
    pub fn create_custom_section(&mut self, name: &str, kind: DataKind) -> SectionId {
        let id = self.sections.custom(name, kind);
        debug!(section = name, ?kind, "created custom data section");
        id
    }

    /// Make a well-known ("text", "data", "rdata") or previously created
    /// custom section current.
    pub fn switch_section(&mut self, name: &str) -> SectionId {
        let id = match name {
            "text" => self.sections.well_known(WellKnown::Text),
            "data" => self.sections.well_known(WellKnown::Data),
            "rdata" => self.sections.well_known(WellKnown::ReadOnly),
            _ => self
                .sections
                .lookup(name)
                .unwrap_or_else(|| panic!("switch to unknown section `{name}`")),
        };
        self.switch_to(id);
        id
    }

    pub fn switch_well_known(&mut self, section: WellKnown) -> SectionId {
        let id = self.sections.well_known(section);
        self.switch_to(id);
        id
    }

    fn switch_to(&mut self, id: SectionId) {
        if self.sections.get(id).role == SectionRole::Standard(WellKnown::Text) {
            self.sections.get_mut(id).has_instructions = true;
        }
        self.current = id;
    }

    /// Current section and its cursor.
    pub fn position(&self) -> (SectionId, u64) {
        (self.current, self.sections.get(self.current).data.len() as u64)
    }

    // --- raw emission ---

    pub fn emit_bytes(&mut self, bytes: &[u8]) {
        self.sections.get_mut(self.current).data.extend_from_slice(bytes);
    }

    /// Append a little-endian integer of `size` bytes.
    pub fn emit_int(&mut self, value: u64, size: usize) {
        assert!((1..=8).contains(&size), "integer size {size} out of range");
        let bytes = value.to_le_bytes();
        self.emit_bytes(&bytes[..size]);
    }

    /// Pad the current section to a power-of-two boundary with `fill`.
    pub fn align(&mut self, align: u64, fill: u8) {
        assert!(align.is_power_of_two(), "alignment {align} is not a power of two");
        let section = self.sections.get_mut(self.current);
        let padded = (section.data.len() as u64).next_multiple_of(align);
        section.data.resize(padded as usize, fill);
        section.align = section.align.max(align);
    }

    // --- symbols and labels ---

    /// Get or create the named symbol without binding it.
    pub fn intern(&mut self, name: &str) -> SymId {
        self.symbols.intern(name)
    }

    /// Define `name` at the current cursor. Redefinition panics.
    pub fn define_symbol(&mut self, name: &str) -> SymId {
        let id = self.symbols.intern(name);
        let (section, offset) = self.position();
        self.symbols.bind(id, section, offset);
        id
    }

    /// Create an anonymous label, not yet bound anywhere.
    pub fn new_temp_label(&mut self) -> SymId {
        self.symbols.temp()
    }

    /// Bind a label at the current cursor.
    pub fn bind_label(&mut self, id: SymId) {
        let (section, offset) = self.position();
        self.symbols.bind(id, section, offset);
    }

    /// Create an anonymous label bound at the current cursor.
    pub fn define_temp_label(&mut self) -> SymId {
        let id = self.new_temp_label();
        self.bind_label(id);
        id
    }

    // --- value fixups ---

    /// Emit `size` placeholder bytes, patched from `expr` at finish.
    pub fn emit_value(&mut self, expr: Expr, size: usize, kind: FixupKind) {
        assert!((1..=8).contains(&size), "value size {size} out of range");
        let section = self.sections.get_mut(self.current);
        let offset = section.data.len() as u64;
        section.data.resize(section.data.len() + size, 0);
        section.fixups.push(Fixup {
            offset,
            size: size as u8,
            kind,
            expr,
        });
    }

    /// Emit the difference `to - from` as a `size`-byte constant.
    pub fn emit_label_diff(&mut self, to: SymId, from: SymId, size: usize) {
        self.emit_value(
            Expr::Symbol(to).sub(Expr::Symbol(from)),
            size,
            FixupKind::Abs,
        );
    }

    // --- call-frame directives ---

    /// Open a frame record at the current cursor.
    pub fn cfi_start_proc(&mut self) {
        assert!(self.frames.open.is_none(), "call-frame record already open");
        let start_label = self.define_temp_label();
        let (section, start_offset) = self.position();
        self.frames.open = Some(OpenFrame {
            start_label,
            section,
            start_offset,
            cfa_offset: self.target.cfi.initial_cfa_offset,
            instructions: Vec::new(),
        });
    }

    /// Close the open frame record at the current cursor.
    pub fn cfi_end_proc(&mut self) {
        let (section, offset) = self.position();
        let open = self.frames.open.take().expect("no call-frame record open");
        assert_eq!(section, open.section, "call-frame record closed in another section");
        self.frames.frames.push(FrameRecord {
            start_label: open.start_label,
            length: (offset - open.start_offset) as u32,
            instructions: open.instructions,
        });
    }

    /// The CFA moved relative to the stack pointer, e.g. after a push.
    pub fn cfi_adjust_cfa_offset(&mut self, delta: i32) {
        let (section, cursor) = self.position();
        let open = self.frames.open.as_mut().expect("no call-frame record open");
        assert_eq!(section, open.section, "call-frame directive outside the frame's section");
        open.cfa_offset += delta;
        let instruction = CallFrameInstruction::CfaOffset(open.cfa_offset);
        open.instructions
            .push(((cursor - open.start_offset) as u32, instruction));
    }

    /// `register` was stored at `offset` from the current CFA register.
    pub fn cfi_rel_offset(&mut self, register: u16, offset: i32) {
        let (section, cursor) = self.position();
        let open = self.frames.open.as_mut().expect("no call-frame record open");
        assert_eq!(section, open.section, "call-frame directive outside the frame's section");
        // The recorder tracks offsets relative to the CFA register; DWARF
        // wants them relative to the CFA itself.
        let instruction = CallFrameInstruction::Offset(
            gimli::Register(register),
            offset - open.cfa_offset,
        );
        open.instructions
            .push(((cursor - open.start_offset) as u32, instruction));
    }

    /// The CFA is computed from `register` from here on.
    pub fn cfi_def_cfa_register(&mut self, register: u16) {
        let (section, cursor) = self.position();
        let open = self.frames.open.as_mut().expect("no call-frame record open");
        assert_eq!(section, open.section, "call-frame directive outside the frame's section");
        let instruction = CallFrameInstruction::CfaRegister(gimli::Register(register));
        open.instructions
            .push(((cursor - open.start_offset) as u32, instruction));
    }

    // --- finalization ---

    /// Resolve every fixup, synthesize `.eh_frame` when frames were
    /// recorded, and assemble the container bytes.
    pub fn finish(self) -> Result<Vec<u8>, EmitError> {
        let ObjectStream {
            target,
            mut sections,
            symbols,
            frames,
            ..
        } = self;
        assert!(frames.open.is_none(), "call-frame record still open at finish");

        if !frames.frames.is_empty() {
            synthesize_eh_frame(&target, &frames.frames, &mut sections)?;
        }

        debug!(
            sections = sections.len(),
            symbols = symbols.len(),
            "assembling object container"
        );

        // Fold what can be folded in place; everything else becomes a
        // relocation against a named symbol or a section.
        let mut pending = Vec::new();
        for index in 0..sections.len() {
            let id = SectionId(index as u32);
            let section = sections.get_mut(id);
            for fixup in std::mem::take(&mut section.fixups) {
                resolve_fixup(id, fixup, &mut section.data, &symbols, &mut pending);
            }
        }

        let mut obj = Object::new(target.format, target.architecture, target.endianness);
        // Names arrive pre-decorated from the managed compiler.
        obj.set_mangling(Mangling::None);

        let mut out_sections = Vec::with_capacity(sections.len());
        for index in 0..sections.len() {
            let section = sections.get(SectionId(index as u32));
            let out = container_section(&mut obj, target.format, section);
            let base = obj.append_section_data(out, &section.data, section.container_align());
            trace!(
                section = section.name.as_str(),
                size = section.data.len(),
                "appended section data"
            );
            out_sections.push((out, base));
        }

        // Named, bound symbols become defined globals. Labels never reach
        // the symbol table.
        let mut sym_map: Vec<Option<SymbolId>> = vec![None; symbols.len()];
        for (id, entry) in symbols.entries() {
            let (Some(name), Some((section, offset))) = (&entry.name, entry.binding) else {
                continue;
            };
            let (out, base) = out_sections[section.index()];
            let kind = if sections.get(section).has_instructions {
                SymbolKind::Text
            } else {
                SymbolKind::Data
            };
            sym_map[id.index()] = Some(obj.add_symbol(Symbol {
                name: name.clone().into_bytes(),
                value: base + offset,
                size: 0,
                kind,
                scope: SymbolScope::Dynamic,
                weak: false,
                section: SymbolSection::Section(out),
                flags: SymbolFlags::None,
            }));
        }

        // Relocations; names that never got a definition become externals.
        for reloc in pending {
            let symbol = match reloc.target {
                RelocTarget::Named(id) => match sym_map[id.index()] {
                    Some(symbol) => symbol,
                    None => {
                        let name = symbols.get(id).name.clone().expect("named reloc target");
                        let symbol = obj.add_symbol(Symbol {
                            name: name.into_bytes(),
                            value: 0,
                            size: 0,
                            kind: SymbolKind::Text,
                            scope: SymbolScope::Unknown,
                            weak: false,
                            section: SymbolSection::Undefined,
                            flags: SymbolFlags::None,
                        });
                        sym_map[id.index()] = Some(symbol);
                        symbol
                    }
                },
                RelocTarget::Section(section) => {
                    obj.section_symbol(out_sections[section.index()].0)
                }
            };
            let (out, base) = out_sections[reloc.section.index()];
            obj.add_relocation(
                out,
                Relocation {
                    offset: base + reloc.offset,
                    symbol,
                    addend: reloc.addend,
                    flags: flags_for(reloc.kind, reloc.size),
                },
            )?;
        }

        let buf = obj.write()?;
        debug!(bytes = buf.len(), "assembled object container");
        Ok(buf)
    }
}

enum RelocTarget {
    Named(SymId),
    Section(SectionId),
}

struct PendingReloc {
    section: SectionId,
    offset: u64,
    size: u8,
    kind: FixupKind,
    target: RelocTarget,
    addend: i64,
}

fn resolve_fixup(
    section: SectionId,
    fixup: Fixup,
    data: &mut [u8],
    symbols: &SymbolArena,
    pending: &mut Vec<PendingReloc>,
) {
    let reduced = fixup.expr.reduce();
    match (reduced.plus, reduced.minus) {
        (None, None) => {
            assert_eq!(fixup.kind, FixupKind::Abs, "constant value in a relocated field");
            patch(data, fixup.offset, fixup.size, reduced.addend);
        }
        (Some(plus), Some(minus)) => {
            assert_eq!(fixup.kind, FixupKind::Abs, "label difference in a relocated field");
            let (plus_section, plus_offset) = symbols
                .get(plus)
                .binding
                .expect("label difference with an unbound symbol");
            let (minus_section, minus_offset) = symbols
                .get(minus)
                .binding
                .expect("label difference with an unbound symbol");
            assert_eq!(plus_section, minus_section, "label difference across sections");
            patch(
                data,
                fixup.offset,
                fixup.size,
                plus_offset as i64 - minus_offset as i64 + reduced.addend,
            );
        }
        (Some(plus), None) => {
            let entry = symbols.get(plus);
            if entry.name.is_some() {
                pending.push(PendingReloc {
                    section,
                    offset: fixup.offset,
                    size: fixup.size,
                    kind: fixup.kind,
                    target: RelocTarget::Named(plus),
                    addend: reduced.addend,
                });
                return;
            }
            let (target_section, target_offset) = entry
                .binding
                .expect("reference to an unbound label");
            if fixup.kind == FixupKind::PcRel && target_section == section {
                // Both ends are known, no relocation needed.
                patch(
                    data,
                    fixup.offset,
                    fixup.size,
                    target_offset as i64 + reduced.addend - fixup.offset as i64,
                );
                return;
            }
            pending.push(PendingReloc {
                section,
                offset: fixup.offset,
                size: fixup.size,
                kind: fixup.kind,
                target: RelocTarget::Section(target_section),
                addend: target_offset as i64 + reduced.addend,
            });
        }
        (None, Some(_)) => panic!("expression subtracts a symbol without adding one"),
    }
}

fn patch(data: &mut [u8], offset: u64, size: u8, value: i64) {
    let start = offset as usize;
    let end = start + size as usize;
    data[start..end].copy_from_slice(&value.to_le_bytes()[..size as usize]);
}

fn synthesize_eh_frame(
    target: &TargetSpec,
    frames: &[FrameRecord],
    sections: &mut SectionTable,
) -> Result<(), gimli::write::Error> {
    let (bytes, relocations) = build_eh_frame(target, frames)?;
    let id = sections.eh_frame();
    let section = sections.get_mut(id);
    section.data = bytes;
    for reloc in relocations {
        let RelocationTarget::Symbol(index) = reloc.target else {
            panic!("unexpected relocation target in frame table");
        };
        let expected = gimli::DwEhPe(
            gimli::constants::DW_EH_PE_pcrel.0 | gimli::constants::DW_EH_PE_sdata4.0,
        );
        assert_eq!(reloc.eh_pe, Some(expected), "unexpected frame pointer encoding");
        let mut expr = Expr::Symbol(frames[index].start_label);
        if reloc.addend != 0 {
            expr = expr.add(Expr::Const(reloc.addend));
        }
        section.fixups.push(Fixup {
            offset: reloc.offset as u64,
            size: reloc.size,
            kind: FixupKind::PcRel,
            expr,
        });
    }
    Ok(())
}

fn container_section(
    obj: &mut Object<'_>,
    format: BinaryFormat,
    section: &Section,
) -> object::write::SectionId {
    let macho_segment = |obj: &mut Object<'_>, segment: StandardSegment| {
        if format == BinaryFormat::MachO {
            obj.segment_name(segment).to_vec()
        } else {
            Vec::new()
        }
    };
    match section.role {
        SectionRole::Standard(WellKnown::Text) => obj.section_id(StandardSection::Text),
        SectionRole::Standard(WellKnown::Data) => obj.section_id(StandardSection::Data),
        SectionRole::Standard(WellKnown::ReadOnly) => {
            obj.section_id(StandardSection::ReadOnlyData)
        }
        SectionRole::Standard(WellKnown::Xdata) => {
            let segment = macho_segment(obj, StandardSegment::Data);
            obj.add_section(segment, b".xdata".to_vec(), SectionKind::ReadOnlyData)
        }
        SectionRole::Standard(WellKnown::Pdata) => {
            let segment = macho_segment(obj, StandardSegment::Data);
            obj.add_section(segment, b".pdata".to_vec(), SectionKind::ReadOnlyData)
        }
        SectionRole::Standard(WellKnown::DebugSymbols) => {
            let segment = macho_segment(obj, StandardSegment::Debug);
            obj.add_section(segment, b".debug$S".to_vec(), SectionKind::Debug)
        }
        SectionRole::Custom(kind) => {
            let section_kind = match kind {
                DataKind::Writable => SectionKind::Data,
                DataKind::ReadOnly => SectionKind::ReadOnlyData,
            };
            let segment = macho_segment(obj, StandardSegment::Data);
            obj.add_section(segment, section.name.clone().into_bytes(), section_kind)
        }
        SectionRole::EhFrame => {
            let segment = macho_segment(obj, StandardSegment::Text);
            let name = if format == BinaryFormat::MachO {
                b"__eh_frame".to_vec()
            } else {
                b".eh_frame".to_vec()
            };
            obj.add_section(segment, name, SectionKind::ReadOnlyData)
        }
    }
}

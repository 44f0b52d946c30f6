//! Streamer tests: expression folding, cursors, fixup resolution and
//! read-back of the assembled containers.

use gimli::write::CallFrameInstruction;
use object::{Object as _, ObjectSection as _, ObjectSymbol as _};

use crate::expr::Expr;
use crate::reloc::FixupKind;
use crate::section::{DataKind, WellKnown};
use crate::stream::ObjectStream;
use crate::symbol::SymId;
use crate::target::TargetSpec;

fn elf_stream() -> ObjectStream {
    ObjectStream::new(TargetSpec::parse("x86_64-unknown-linux-gnu").unwrap())
}

fn coff_stream() -> ObjectStream {
    ObjectStream::new(TargetSpec::parse("x86_64-pc-windows-msvc").unwrap())
}

// --- target mapping ---

#[test]
fn parses_common_triples() {
    let spec = TargetSpec::parse("x86_64-unknown-linux-gnu").unwrap();
    assert_eq!(spec.format, object::BinaryFormat::Elf);
    assert_eq!(spec.architecture, object::Architecture::X86_64);

    let spec = TargetSpec::parse("x86_64-pc-windows-msvc").unwrap();
    assert_eq!(spec.format, object::BinaryFormat::Coff);

    let spec = TargetSpec::parse("i686-pc-windows-msvc").unwrap();
    assert_eq!(spec.architecture, object::Architecture::I386);

    let spec = TargetSpec::parse("aarch64-apple-darwin").unwrap();
    assert_eq!(spec.format, object::BinaryFormat::MachO);
    assert_eq!(spec.architecture, object::Architecture::Aarch64);
}

#[test]
fn empty_triple_selects_host() {
    assert!(TargetSpec::parse("").is_ok());
}

#[test]
fn rejects_unsupported_targets() {
    assert!(TargetSpec::parse("powerpc64-unknown-linux-gnu").is_err());
    assert!(TargetSpec::parse("wasm32-unknown-unknown").is_err());
}

// --- expressions ---

#[test]
fn reduces_nested_sums() {
    let expr = Expr::Symbol(SymId(1))
        .add(Expr::Const(8))
        .sub(Expr::Symbol(SymId(2)).add(Expr::Const(3)));
    let reduced = expr.reduce();
    assert_eq!(reduced.addend, 5);
    assert_eq!(reduced.plus, Some(SymId(1)));
    assert_eq!(reduced.minus, Some(SymId(2)));
}

#[test]
#[should_panic(expected = "more than one symbol")]
fn rejects_two_added_symbols() {
    Expr::Symbol(SymId(1)).add(Expr::Symbol(SymId(2))).reduce();
}

// --- cursors and raw emission ---

#[test]
fn cursors_are_per_section() {
    let mut stream = elf_stream();
    stream.emit_bytes(&[1, 2, 3]);
    stream.switch_section("data");
    stream.emit_bytes(&[9]);
    stream.switch_section("text");
    assert_eq!(stream.position().1, 3);
    stream.switch_section("data");
    assert_eq!(stream.position().1, 1);
}

#[test]
fn alignment_pads_with_fill() {
    let mut stream = elf_stream();
    stream.emit_bytes(&[0xCC]);
    stream.align(4, 0x90);
    assert_eq!(stream.position().1, 4);
    stream.align(4, 0x90);
    assert_eq!(stream.position().1, 4);
    let (id, _) = stream.position();
    assert_eq!(stream.sections.get(id).data, [0xCC, 0x90, 0x90, 0x90]);
}

#[test]
fn integers_are_little_endian() {
    let mut stream = elf_stream();
    stream.emit_int(0x1122_3344, 4);
    stream.emit_int(0xFF, 2);
    let (id, _) = stream.position();
    assert_eq!(stream.sections.get(id).data, [0x44, 0x33, 0x22, 0x11, 0xFF, 0x00]);
}

#[test]
#[should_panic(expected = "out of range")]
fn oversized_int_panics() {
    elf_stream().emit_int(1, 9);
}

#[test]
#[should_panic(expected = "power of two")]
fn non_power_of_two_alignment_panics() {
    elf_stream().align(3, 0);
}

// --- section registry ---

#[test]
#[should_panic(expected = "already exists")]
fn duplicate_custom_section_panics() {
    let mut stream = elf_stream();
    stream.create_custom_section("managed", DataKind::ReadOnly);
    stream.create_custom_section("managed", DataKind::Writable);
}

#[test]
#[should_panic(expected = "reserved")]
fn reserved_section_name_panics() {
    elf_stream().create_custom_section("text", DataKind::Writable);
}

#[test]
#[should_panic(expected = "unknown section")]
fn switching_to_unknown_section_panics() {
    elf_stream().switch_section("noexist");
}

#[test]
fn custom_section_may_reuse_unwind_section_names() {
    let mut stream = coff_stream();
    stream.switch_well_known(WellKnown::Xdata);
    stream.emit_bytes(&[1]);
    stream.create_custom_section("xdata", DataKind::ReadOnly);
    stream.switch_section("xdata");
    stream.emit_bytes(&[2, 3]);
    assert_eq!(stream.position().1, 2);
}

#[test]
#[should_panic(expected = "unknown section")]
fn unwind_sections_are_not_name_switchable() {
    elf_stream().switch_section("pdata");
}

#[test]
fn custom_sections_are_switchable_by_name() {
    let mut stream = elf_stream();
    stream.create_custom_section("frozen", DataKind::ReadOnly);
    stream.switch_section("frozen");
    stream.emit_bytes(&[1, 2]);
    assert_eq!(stream.position().1, 2);
}

// --- symbols and labels ---

#[test]
#[should_panic(expected = "defined twice")]
fn redefining_a_symbol_panics() {
    let mut stream = elf_stream();
    stream.define_symbol("f");
    stream.define_symbol("f");
}

#[test]
fn label_diff_folds_to_a_constant() {
    let mut stream = elf_stream();
    stream.emit_bytes(&[0x90]);
    let from = stream.define_temp_label();
    stream.emit_bytes(&[1, 2, 3]);
    let to = stream.define_temp_label();
    stream.emit_label_diff(to, from, 4);
    let bytes = stream.finish().unwrap();

    let file = object::File::parse(&*bytes).unwrap();
    let text = file.section_by_name(".text").unwrap();
    assert_eq!(text.data().unwrap()[4..8], [3, 0, 0, 0]);
    assert_eq!(text.relocations().count(), 0);
}

#[test]
fn forward_label_diff_resolves_at_finish() {
    let mut stream = elf_stream();
    let begin = stream.new_temp_label();
    let end = stream.new_temp_label();
    stream.emit_label_diff(end, begin, 2);
    stream.bind_label(begin);
    stream.emit_bytes(&[0; 5]);
    stream.bind_label(end);
    let bytes = stream.finish().unwrap();

    let file = object::File::parse(&*bytes).unwrap();
    let text = file.section_by_name(".text").unwrap();
    assert_eq!(text.data().unwrap()[0..2], [5, 0]);
}

#[test]
#[should_panic(expected = "unbound label")]
fn referencing_an_unbound_label_panics() {
    let mut stream = elf_stream();
    let label = stream.new_temp_label();
    stream.emit_value(Expr::Symbol(label), 4, FixupKind::Abs);
    let _ = stream.finish();
}

// --- fixup resolution ---

#[test]
fn named_symbols_relocate_with_addends() {
    let mut stream = elf_stream();
    stream.define_symbol("local_fn");
    stream.emit_bytes(&[0xC3; 4]);
    let ext = stream.intern("ext");
    stream.emit_value(Expr::Symbol(ext).add(Expr::Const(16)), 8, FixupKind::Abs);
    let bytes = stream.finish().unwrap();

    let file = object::File::parse(&*bytes).unwrap();
    let local = file.symbols().find(|s| s.name() == Ok("local_fn")).unwrap();
    assert!(local.is_global());
    assert_eq!(local.address(), 0);

    let text = file.section_by_name(".text").unwrap();
    let (offset, reloc) = text.relocations().next().unwrap();
    assert_eq!(offset, 4);
    assert_eq!(reloc.kind(), object::RelocationKind::Absolute);
    assert_eq!(reloc.addend(), 16);
    let object::RelocationTarget::Symbol(index) = reloc.target() else {
        panic!("expected a symbol target");
    };
    let target = file.symbol_by_index(index).unwrap();
    assert_eq!(target.name(), Ok("ext"));
    assert!(target.is_undefined());
}

#[test]
fn temp_labels_relocate_through_section_symbols() {
    let mut stream = elf_stream();
    stream.switch_section("data");
    stream.emit_bytes(&[0; 8]);
    let label = stream.define_temp_label();
    stream.emit_int(7, 4);
    stream.switch_section("text");
    stream.emit_value(Expr::Symbol(label), 8, FixupKind::Abs);
    let bytes = stream.finish().unwrap();

    let file = object::File::parse(&*bytes).unwrap();
    let text = file.section_by_name(".text").unwrap();
    let (_, reloc) = text.relocations().next().unwrap();
    assert_eq!(reloc.kind(), object::RelocationKind::Absolute);
    assert_eq!(reloc.addend(), 8);
    let object::RelocationTarget::Symbol(index) = reloc.target() else {
        panic!("expected a symbol target");
    };
    assert_eq!(
        file.symbol_by_index(index).unwrap().kind(),
        object::SymbolKind::Section
    );
}

#[test]
#[should_panic(expected = "constant value in a relocated field")]
fn pcrel_constant_expression_panics() {
    let mut stream = elf_stream();
    stream.emit_value(Expr::Const(16), 4, FixupKind::PcRel);
    let _ = stream.finish();
}

#[test]
#[should_panic(expected = "label difference across sections")]
fn label_diff_across_sections_panics() {
    let mut stream = elf_stream();
    let from = stream.define_temp_label();
    stream.switch_section("data");
    let to = stream.define_temp_label();
    stream.switch_section("text");
    stream.emit_label_diff(to, from, 4);
    let _ = stream.finish();
}

#[test]
fn pcrel_to_a_local_label_folds() {
    let mut stream = elf_stream();
    let label = stream.define_temp_label();
    stream.emit_bytes(&[0x90; 4]);
    stream.emit_value(Expr::Symbol(label), 4, FixupKind::PcRel);
    let bytes = stream.finish().unwrap();

    let file = object::File::parse(&*bytes).unwrap();
    let text = file.section_by_name(".text").unwrap();
    assert_eq!(text.relocations().count(), 0);
    assert_eq!(text.data().unwrap()[4..8], (-4i32).to_le_bytes());
}

#[test]
fn coff_fixups_lower_to_coff_relocation_types() {
    let mut stream = coff_stream();
    let foo = stream.define_symbol("Foo");
    stream.emit_bytes(&[0x33, 0xC0]);
    stream.switch_well_known(WellKnown::DebugSymbols);
    stream.emit_value(Expr::Symbol(foo), 4, FixupKind::SecRel);
    stream.emit_value(Expr::Symbol(foo), 2, FixupKind::SecIdx);
    stream.emit_value(Expr::Symbol(foo).add(Expr::Const(4)), 4, FixupKind::ImageRel);
    let bytes = stream.finish().unwrap();

    let file = object::File::parse(&*bytes).unwrap();
    let debug = file.section_by_name(".debug$S").unwrap();
    let types: Vec<u16> = debug
        .relocations()
        .map(|(_, r)| match r.flags() {
            object::RelocationFlags::Coff { typ } => typ,
            other => panic!("unexpected flags {other:?}"),
        })
        .collect();
    assert_eq!(
        types,
        [
            object::pe::IMAGE_REL_AMD64_SECREL,
            object::pe::IMAGE_REL_AMD64_SECTION,
            object::pe::IMAGE_REL_AMD64_ADDR32NB,
        ]
    );
    // the image-relative slot keeps its addend in the field bytes
    assert_eq!(debug.data().unwrap()[6..10], [4, 0, 0, 0]);
}

// --- call frames ---

#[test]
fn frame_directives_translate_to_cfa_instructions() {
    let mut stream = elf_stream();
    stream.emit_bytes(&[0x55]);
    stream.cfi_start_proc();
    stream.cfi_adjust_cfa_offset(8);
    stream.cfi_rel_offset(6, 0);
    stream.emit_bytes(&[0x48, 0x89, 0xE5]);
    stream.cfi_def_cfa_register(6);
    stream.cfi_end_proc();

    let frame = &stream.frames.frames[0];
    assert_eq!(frame.length, 3);
    assert!(matches!(
        frame.instructions[0],
        (0, CallFrameInstruction::CfaOffset(16))
    ));
    assert!(matches!(
        frame.instructions[1],
        (0, CallFrameInstruction::Offset(gimli::Register(6), -16))
    ));
    assert!(matches!(
        frame.instructions[2],
        (3, CallFrameInstruction::CfaRegister(gimli::Register(6)))
    ));
}

#[test]
#[should_panic(expected = "already open")]
fn opening_a_frame_twice_panics() {
    let mut stream = elf_stream();
    stream.cfi_start_proc();
    stream.cfi_start_proc();
}

#[test]
#[should_panic(expected = "no call-frame record open")]
fn frame_directive_without_a_frame_panics() {
    elf_stream().cfi_adjust_cfa_offset(8);
}

#[test]
#[should_panic(expected = "still open")]
fn finishing_with_an_open_frame_panics() {
    let mut stream = elf_stream();
    stream.cfi_start_proc();
    let _ = stream.finish();
}

#[test]
fn eh_frame_is_written_when_frames_exist() {
    let mut stream = elf_stream();
    stream.define_symbol("f");
    stream.cfi_start_proc();
    stream.emit_bytes(&[0x55]);
    stream.cfi_adjust_cfa_offset(8);
    stream.emit_bytes(&[0x5D, 0xC3]);
    stream.cfi_end_proc();
    let bytes = stream.finish().unwrap();

    let file = object::File::parse(&*bytes).unwrap();
    let eh = file.section_by_name(".eh_frame").unwrap();
    let data = eh.data().unwrap();
    assert_eq!(data[4..8], [0, 0, 0, 0]); // CIE id
    assert_eq!(data[8], 1); // CIE version

    let relocs: Vec<_> = eh.relocations().collect();
    assert_eq!(relocs.len(), 1);
    assert_eq!(relocs[0].1.kind(), object::RelocationKind::Relative);
    let object::RelocationTarget::Symbol(index) = relocs[0].1.target() else {
        panic!("expected a symbol target");
    };
    assert_eq!(
        file.symbol_by_index(index).unwrap().kind(),
        object::SymbolKind::Section
    );
}

#[test]
fn no_eh_frame_without_frames() {
    let mut stream = elf_stream();
    stream.define_symbol("f");
    stream.emit_bytes(&[0xC3]);
    let bytes = stream.finish().unwrap();

    let file = object::File::parse(&*bytes).unwrap();
    assert!(file.section_by_name(".eh_frame").is_none());
}

//! Session contract tests: argument validation, frame state machine and
//! format gating.

use tempfile::{tempdir, TempDir};

use crate::{CfiCode, CfiOpcode, DebugVarRange, ObjectWriter, VarLocation, DWARF_REG_ILLEGAL};

fn coff_writer(dir: &TempDir) -> ObjectWriter {
    ObjectWriter::create(dir.path().join("out.obj"), "x86_64-pc-windows-msvc").unwrap()
}

fn elf_writer(dir: &TempDir) -> ObjectWriter {
    ObjectWriter::create(dir.path().join("out.o"), "x86_64-unknown-linux-gnu").unwrap()
}

fn range(var_number: u32, location: VarLocation) -> DebugVarRange {
    DebugVarRange {
        var_number,
        start_offset: 0,
        end_offset: 4,
        location,
    }
}

// --- session open ---

#[test]
fn open_rejects_unsupported_triples() {
    let dir = tempdir().unwrap();
    assert!(ObjectWriter::create(dir.path().join("out.o"), "sparc64-unknown-linux-gnu").is_err());
}

#[test]
fn open_reports_uncreatable_output() {
    let dir = tempdir().unwrap();
    let missing = dir.path().join("no_such_dir").join("out.o");
    assert!(ObjectWriter::create(missing, "x86_64-unknown-linux-gnu").is_err());
}

#[test]
fn empty_triple_selects_host() {
    let dir = tempdir().unwrap();
    assert!(ObjectWriter::create(dir.path().join("host.o"), "").is_ok());
}

// --- symbol references ---

#[test]
#[should_panic(expected = "size must be 4 or 8")]
fn symbol_ref_with_odd_size_panics() {
    let dir = tempdir().unwrap();
    elf_writer(&dir).emit_symbol_ref("f", 2, false, 0);
}

#[test]
#[should_panic(expected = "8-byte PC-relative")]
fn eight_byte_pcrel_symbol_ref_panics() {
    let dir = tempdir().unwrap();
    elf_writer(&dir).emit_symbol_ref("f", 8, true, 0);
}

// --- call-frame state machine ---

#[test]
#[should_panic(expected = "already open")]
fn cfi_start_twice_panics() {
    let dir = tempdir().unwrap();
    let mut writer = elf_writer(&dir);
    writer.emit_cfi_start();
    writer.emit_cfi_start();
}

#[test]
#[should_panic(expected = "no call-frame record open")]
fn cfi_end_without_start_panics() {
    let dir = tempdir().unwrap();
    elf_writer(&dir).emit_cfi_end();
}

#[test]
#[should_panic(expected = "carries no register")]
fn adjust_cfa_with_register_panics() {
    let dir = tempdir().unwrap();
    let mut writer = elf_writer(&dir);
    writer.emit_cfi_start();
    writer.emit_cfi_code(CfiCode {
        opcode: CfiOpcode::AdjustCfaOffset,
        dwarf_reg: 6,
        offset: 8,
    });
}

#[test]
#[should_panic(expected = "requires a register")]
fn rel_offset_without_register_panics() {
    let dir = tempdir().unwrap();
    let mut writer = elf_writer(&dir);
    writer.emit_cfi_start();
    writer.emit_cfi_code(CfiCode {
        opcode: CfiOpcode::RelOffset,
        dwarf_reg: DWARF_REG_ILLEGAL,
        offset: 0,
    });
}

#[test]
#[should_panic(expected = "carries no offset")]
fn def_cfa_register_with_offset_panics() {
    let dir = tempdir().unwrap();
    let mut writer = elf_writer(&dir);
    writer.emit_cfi_start();
    writer.emit_cfi_code(CfiCode {
        opcode: CfiOpcode::DefCfaRegister,
        dwarf_reg: 6,
        offset: 8,
    });
}

// --- windows unwind ---

#[test]
#[should_panic(expected = "requires a COFF target")]
fn win_frame_info_on_elf_panics() {
    let dir = tempdir().unwrap();
    let mut writer = elf_writer(&dir);
    writer.emit_symbol_def("f");
    writer.emit_win_frame_info("f", 0, 8, &[0x01], None, &[]);
}

#[test]
#[should_panic(expected = "chained unwind")]
fn chained_unwind_info_panics() {
    let dir = tempdir().unwrap();
    let mut writer = coff_writer(&dir);
    writer.emit_symbol_def("f");
    writer.emit_win_frame_info("f", 0, 8, &[0x01 | (0x04 << 3)], None, &[]);
}

#[test]
#[should_panic(expected = "personality")]
fn handler_flags_without_personality_panic() {
    let dir = tempdir().unwrap();
    let mut writer = coff_writer(&dir);
    writer.emit_symbol_def("f");
    writer.emit_win_frame_info("f", 0, 8, &[0x01 | (0x01 << 3)], None, &[]);
}

// --- debug info ---

#[test]
fn empty_variable_ranges_are_dropped() {
    let dir = tempdir().unwrap();
    let mut writer = coff_writer(&dir);
    writer.emit_debug_var("x", 0x74, false, &[]);
    assert!(writer.cv.vars.is_empty());
}

#[test]
#[should_panic(expected = "mixes var numbers")]
fn mismatched_var_numbers_panic() {
    let dir = tempdir().unwrap();
    let mut writer = coff_writer(&dir);
    writer.emit_debug_var(
        "x",
        0x74,
        false,
        &[
            range(0, VarLocation::Register(0)),
            range(1, VarLocation::Register(1)),
        ],
    );
}

#[test]
#[should_panic(expected = "must be positive")]
fn zero_file_id_panics() {
    let dir = tempdir().unwrap();
    coff_writer(&dir).emit_debug_file_info(0, "a.cs");
}

#[test]
#[should_panic(expected = "must be positive")]
fn zero_file_id_panics_off_coff_too() {
    let dir = tempdir().unwrap();
    elf_writer(&dir).emit_debug_file_info(0, "a.cs");
}

#[test]
#[should_panic(expected = "registered twice")]
fn duplicate_file_id_panics() {
    let dir = tempdir().unwrap();
    let mut writer = coff_writer(&dir);
    writer.emit_debug_file_info(1, "a.cs");
    writer.emit_debug_file_info(1, "b.cs");
}

#[test]
#[should_panic(expected = "emitted twice")]
fn module_info_twice_panics() {
    let dir = tempdir().unwrap();
    let mut writer = coff_writer(&dir);
    writer.emit_debug_module_info();
    writer.emit_debug_module_info();
}

#[test]
fn debug_calls_are_inert_off_coff() {
    let dir = tempdir().unwrap();
    let mut writer = elf_writer(&dir);
    writer.emit_debug_file_info(1, "a.cs");
    writer.emit_symbol_def("f");
    writer.emit_blob(&[0xC3]);
    writer.emit_debug_loc(0, 1, 5, 0);
    writer.emit_debug_var("x", 0x74, false, &[range(0, VarLocation::Register(0))]);
    writer.emit_debug_function_info("f", 1);
    writer.emit_debug_module_info();

    // writer state is untouched, and the object still writes
    assert_eq!(writer.cv.vars.len(), 1);
    assert_eq!(writer.cv.func_id, 1);
    writer.finish().unwrap();
}

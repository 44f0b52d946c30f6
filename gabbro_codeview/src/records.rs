//! CodeView symbol records and subsection framing constants.
//!
//! Records that interleave with relocated fields (section-relative
//! addresses, section indices) are split into pure byte prefixes here; the
//! caller appends the relocated parts.

/// Subsection kinds of a `.debug$S` section (C13 format).
pub const DEBUG_S_SYMBOLS: u32 = 0xF1;
pub const DEBUG_S_LINES: u32 = 0xF2;
pub const DEBUG_S_STRINGTABLE: u32 = 0xF3;
pub const DEBUG_S_FILECHKSMS: u32 = 0xF4;

/// Leading signature of a `.debug$S` section.
pub const DEBUG_SECTION_MAGIC: u32 = 4;

/// Symbol record kinds.
pub const S_LOCAL: u16 = 0x113E;
pub const S_DEFRANGE_REGISTER: u16 = 0x1141;
pub const S_DEFRANGE_REGISTER_REL: u16 = 0x1145;
pub const S_GPROC32_ID: u16 = 0x1147;
pub const S_PROC_ID_END: u16 = 0x114F;

/// `S_LOCAL` flag: the variable is a parameter.
pub const LOCAL_IS_PARAM: u16 = 0x0001;

/// Procedure flag byte: debug info describes optimized code.
pub const PROC_HAS_OPTIMIZED_DEBUG_INFO: u8 = 0x80;

/// Lines subsection flag: column entries follow each line entry.
pub const LINES_HAVE_COLUMNS: u16 = 0x0001;

/// Fixed part of an `S_GPROC32_ID` record between the record kind and the
/// relocated code address: parent/end/next pointers (zero in a single
/// object), code length, debug start/end offsets, type index.
pub fn gproc32_header(code_size: u32) -> Vec<u8> {
    let mut out = Vec::with_capacity(28);
    out.extend_from_slice(&[0u8; 12]);
    out.extend_from_slice(&code_size.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(&code_size.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
    out
}

/// Complete `S_LOCAL` record, length prefix through name terminator.
pub fn local_record(name: &str, type_index: u32, is_param: bool) -> Vec<u8> {
    let flags: u16 = if is_param { LOCAL_IS_PARAM } else { 0 };
    let record_len = (2 + 4 + 2 + name.len() + 1) as u16;
    let mut out = Vec::with_capacity(2 + record_len as usize);
    out.extend_from_slice(&record_len.to_le_bytes());
    out.extend_from_slice(&S_LOCAL.to_le_bytes());
    out.extend_from_slice(&type_index.to_le_bytes());
    out.extend_from_slice(&flags.to_le_bytes());
    out.extend_from_slice(name.as_bytes());
    out.push(0);
    out
}

/// `S_DEFRANGE_REGISTER` prefix: length, kind, CodeView register,
/// attributes. The caller appends the 8-byte relocated address range.
pub fn defrange_register_prefix(cv_reg: u16) -> Vec<u8> {
    let record_len: u16 = 2 + 4 + 8;
    let mut out = Vec::with_capacity(8);
    out.extend_from_slice(&record_len.to_le_bytes());
    out.extend_from_slice(&S_DEFRANGE_REGISTER.to_le_bytes());
    out.extend_from_slice(&cv_reg.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());
    out
}

/// `S_DEFRANGE_REGISTER_REL` prefix: length, kind, CodeView base register,
/// flags, offset from the base register. The caller appends the range.
pub fn defrange_register_rel_prefix(cv_base_reg: u16, base_offset: i32) -> Vec<u8> {
    let record_len: u16 = 2 + 8 + 8;
    let mut out = Vec::with_capacity(12);
    out.extend_from_slice(&record_len.to_le_bytes());
    out.extend_from_slice(&S_DEFRANGE_REGISTER_REL.to_le_bytes());
    out.extend_from_slice(&cv_base_reg.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(&base_offset.to_le_bytes());
    out
}

/// Procedure-end trailer record.
pub fn proc_end_record() -> [u8; 4] {
    let mut out = [0u8; 4];
    out[..2].copy_from_slice(&2u16.to_le_bytes());
    out[2..].copy_from_slice(&S_PROC_ID_END.to_le_bytes());
    out
}

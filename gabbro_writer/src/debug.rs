//! CodeView debug info: procedure records, variable ranges, line mappings
//! and the module-level tables, all landing in `.debug$S`.
//!
//! Functions are identified by a session-scoped id that starts at 1 and
//! advances every time a function is finalized; line mappings recorded
//! before the boundary belong to the function being closed. On non-COFF
//! targets every call validates its arguments and otherwise does nothing.

use gabbro_codeview::lines::{LineEntry, LineTable};
use gabbro_codeview::records;
use gabbro_codeview::register::cv_amd64_reg;
use gabbro_stream::{BinaryFormat, Expr, FixupKind, SymId, WellKnown};
use tracing::trace;

use crate::ObjectWriter;

/// Where a variable lives over one code range.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum VarLocation {
    /// In a register.
    Register(u8),
    /// At an offset from a base register.
    RegisterRelative { base_reg: u8, offset: i32 },
    /// A location shape CodeView emission does not represent (byref
    /// flavors, split registers); ranges carrying it are dropped.
    Unsupported,
}

/// One live range of a variable, in function-relative code offsets.
#[derive(Clone, Copy, Debug)]
pub struct DebugVarRange {
    pub var_number: u32,
    pub start_offset: u32,
    pub end_offset: u32,
    pub location: VarLocation,
}

/// One variable of the function being emitted.
#[derive(Clone, Debug)]
pub struct DebugVarInfo {
    pub name: String,
    pub type_index: u32,
    pub is_param: bool,
    pub ranges: Vec<DebugVarRange>,
}

/// Debug state carried across function boundaries.
pub(crate) struct DebugState {
    pub(crate) func_id: u32,
    pub(crate) vars: Vec<DebugVarInfo>,
    pub(crate) lines: LineTable,
    pub(crate) module_emitted: bool,
}

impl DebugState {
    pub(crate) fn new() -> DebugState {
        DebugState {
            func_id: 1,
            vars: Vec::new(),
            lines: LineTable::new(),
            module_emitted: false,
        }
    }
}

impl ObjectWriter {
    fn is_coff(&self) -> bool {
        self.stream.format() == BinaryFormat::Coff
    }

    /// Register a source file under a caller-assigned positive id. Ids must
    /// end up dense starting at 1 by the time module info is emitted.
    pub fn emit_debug_file_info(&mut self, file_id: u32, file_name: &str) {
        assert!(file_id > 0, "file id must be positive");
        if self.is_coff() {
            self.cv.lines.add_file(file_id, file_name);
        }
    }

    /// Record a line mapping for the current function at a
    /// function-relative code offset.
    pub fn emit_debug_loc(&mut self, native_offset: u32, file_id: u32, line: u32, column: u32) {
        if self.is_coff() {
            let func_id = self.cv.func_id;
            self.cv.lines.add_entry(LineEntry {
                func_id,
                offset: native_offset,
                file_id,
                line,
                column,
            });
        }
    }

    /// Queue one variable of the function being emitted. All ranges must
    /// agree on their variable number; an empty range list is dropped.
    pub fn emit_debug_var(
        &mut self,
        name: &str,
        type_index: u32,
        is_param: bool,
        ranges: &[DebugVarRange],
    ) {
        if ranges.is_empty() {
            return;
        }
        let var_number = ranges[0].var_number;
        for range in ranges {
            assert_eq!(
                range.var_number, var_number,
                "variable `{name}` mixes var numbers across ranges"
            );
        }
        self.cv.vars.push(DebugVarInfo {
            name: name.to_string(),
            type_index,
            is_param,
            ranges: ranges.to_vec(),
        });
    }

    /// Close out the current function: its procedure record, the queued
    /// variables and its line subsection. The cursor must still be at the
    /// end of the function's code. Leaves the debug section current. On
    /// non-COFF targets nothing happens, queued variables included.
    pub fn emit_debug_function_info(&mut self, function_name: &str, function_size: u32) {
        if !self.is_coff() {
            return;
        }
        let vars = std::mem::take(&mut self.cv.vars);

        // The end label binds in the function's section before emission
        // moves to the debug section.
        let fn_end = self.stream.define_temp_label();
        let fn_sym = self.stream.intern(function_name);

        self.stream.switch_well_known(WellKnown::DebugSymbols);
        if self.cv.func_id == 1 {
            self.stream
                .emit_int(u64::from(records::DEBUG_SECTION_MAGIC), 4);
        }

        // Symbols subsection wrapping the procedure and variable records.
        self.stream.emit_int(u64::from(records::DEBUG_S_SYMBOLS), 4);
        let symbols_begin = self.stream.new_temp_label();
        let symbols_end = self.stream.new_temp_label();
        self.stream.emit_label_diff(symbols_end, symbols_begin, 4);
        self.stream.bind_label(symbols_begin);

        // S_GPROC32_ID, length-prefixed through the terminated name.
        let proc_begin = self.stream.new_temp_label();
        let proc_end = self.stream.new_temp_label();
        self.stream.emit_label_diff(proc_end, proc_begin, 2);
        self.stream.bind_label(proc_begin);
        self.stream.emit_int(u64::from(records::S_GPROC32_ID), 2);
        self.stream
            .emit_bytes(&records::gproc32_header(function_size));
        self.emit_secrel_pair(fn_sym, 0);
        self.stream
            .emit_int(u64::from(records::PROC_HAS_OPTIMIZED_DEBUG_INFO), 1);
        self.stream.emit_bytes(function_name.as_bytes());
        self.stream.emit_int(0, 1);
        self.stream.bind_label(proc_end);

        for var in &vars {
            self.stream.emit_bytes(&records::local_record(
                &var.name,
                var.type_index,
                var.is_param,
            ));
            for range in &var.ranges {
                self.emit_defrange(fn_sym, range);
            }
        }

        self.stream.emit_bytes(&records::proc_end_record());
        self.stream.bind_label(symbols_end);
        self.stream.align(4, 0);

        self.emit_line_subsection(fn_sym, fn_end);

        self.cv.func_id += 1;
        trace!(
            function = function_name,
            size = function_size,
            "emitted function debug records"
        );
    }

    /// Emit the module-level tables after all functions: file checksums
    /// and the string table. Once per session.
    pub fn emit_debug_module_info(&mut self) {
        if !self.is_coff() {
            return;
        }
        assert!(!self.cv.module_emitted, "module debug info emitted twice");
        self.cv.module_emitted = true;
        if self.cv.lines.file_count() == 0 {
            return;
        }

        self.stream.switch_well_known(WellKnown::DebugSymbols);

        let checksums = self.cv.lines.checksum_payload();
        self.stream
            .emit_int(u64::from(records::DEBUG_S_FILECHKSMS), 4);
        self.stream.emit_int(checksums.len() as u64, 4);
        self.stream.emit_bytes(&checksums);
        self.stream.align(4, 0);

        let strings = self.cv.lines.string_payload().to_vec();
        self.stream
            .emit_int(u64::from(records::DEBUG_S_STRINGTABLE), 4);
        self.stream.emit_int(strings.len() as u64, 4);
        self.stream.emit_bytes(&strings);
        self.stream.align(4, 0);

        trace!(
            files = self.cv.lines.file_count(),
            "emitted module debug tables"
        );
    }

    /// The relocated pair CodeView uses for code addresses: a 32-bit
    /// section-relative offset of `symbol + offset`, then the 16-bit
    /// section index.
    fn emit_secrel_pair(&mut self, symbol: SymId, offset: u32) {
        let mut expr = Expr::Symbol(symbol);
        if offset != 0 {
            expr = expr.add(Expr::Const(i64::from(offset)));
        }
        self.stream.emit_value(expr, 4, FixupKind::SecRel);
        self.stream
            .emit_value(Expr::Symbol(symbol), 2, FixupKind::SecIdx);
    }

    fn emit_defrange(&mut self, fn_sym: SymId, range: &DebugVarRange) {
        let prefix = match range.location {
            VarLocation::Register(reg) => records::defrange_register_prefix(cv_amd64_reg(reg)),
            VarLocation::RegisterRelative { base_reg, offset } => {
                records::defrange_register_rel_prefix(cv_amd64_reg(base_reg), offset)
            }
            VarLocation::Unsupported => return,
        };
        assert!(
            range.end_offset >= range.start_offset,
            "variable range ends before it starts"
        );
        self.stream.emit_bytes(&prefix);
        self.emit_secrel_pair(fn_sym, range.start_offset);
        self.stream
            .emit_int(u64::from(range.end_offset - range.start_offset), 2);
    }

    fn emit_line_subsection(&mut self, fn_sym: SymId, fn_end: SymId) {
        let blocks = self.cv.lines.blocks_for(self.cv.func_id);

        self.stream.emit_int(u64::from(records::DEBUG_S_LINES), 4);
        let lines_begin = self.stream.new_temp_label();
        let lines_end = self.stream.new_temp_label();
        self.stream.emit_label_diff(lines_end, lines_begin, 4);
        self.stream.bind_label(lines_begin);

        self.emit_secrel_pair(fn_sym, 0);
        let flags = if blocks.have_columns {
            records::LINES_HAVE_COLUMNS
        } else {
            0
        };
        self.stream.emit_int(u64::from(flags), 2);
        self.stream.emit_label_diff(fn_end, fn_sym, 4); // code length
        self.stream.emit_bytes(&blocks.bytes);

        self.stream.bind_label(lines_end);
        self.stream.align(4, 0);
    }
}

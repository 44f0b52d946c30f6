//! DWARF call-frame directives.
//!
//! The code generator describes prologues with a compact opcode stream;
//! each code lands on the streamer's frame recorder at the current code
//! position and surfaces in `.eh_frame` at finish.

use crate::ObjectWriter;

/// Register payload value meaning "no register".
pub const DWARF_REG_ILLEGAL: i16 = -1;

/// Call-frame opcodes accepted from the code generator.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum CfiOpcode {
    /// The CFA offset from the stack pointer changed by a delta.
    AdjustCfaOffset,
    /// A register was saved at an offset from the CFA register.
    RelOffset,
    /// The CFA is computed from a new register.
    DefCfaRegister,
}

/// One call-frame instruction: opcode plus register/offset payload.
#[derive(Clone, Copy, Debug)]
pub struct CfiCode {
    pub opcode: CfiOpcode,
    pub dwarf_reg: i16,
    pub offset: i32,
}

impl ObjectWriter {
    /// Open the call-frame record of the function being emitted. Panics if
    /// one is already open.
    pub fn emit_cfi_start(&mut self) {
        self.stream.cfi_start_proc();
    }

    /// Close the open call-frame record. Panics without one.
    pub fn emit_cfi_end(&mut self) {
        self.stream.cfi_end_proc();
    }

    /// Record one call-frame instruction at the current code position.
    pub fn emit_cfi_code(&mut self, code: CfiCode) {
        match code.opcode {
            CfiOpcode::AdjustCfaOffset => {
                assert_eq!(
                    code.dwarf_reg, DWARF_REG_ILLEGAL,
                    "AdjustCfaOffset carries no register"
                );
                self.stream.cfi_adjust_cfa_offset(code.offset);
            }
            CfiOpcode::RelOffset => {
                assert_ne!(
                    code.dwarf_reg, DWARF_REG_ILLEGAL,
                    "RelOffset requires a register"
                );
                self.stream.cfi_rel_offset(code.dwarf_reg as u16, code.offset);
            }
            CfiOpcode::DefCfaRegister => {
                assert_eq!(code.offset, 0, "DefCfaRegister carries no offset");
                assert_ne!(
                    code.dwarf_reg, DWARF_REG_ILLEGAL,
                    "DefCfaRegister requires a register"
                );
                self.stream.cfi_def_cfa_register(code.dwarf_reg as u16);
            }
        }
    }
}

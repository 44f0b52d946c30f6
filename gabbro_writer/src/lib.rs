//! gabbro_writer: session-oriented object emission for managed-code
//! compilers.
//!
//! A session is opened against an output path and a target triple, streamed
//! full of code, data, symbols, unwind and debug metadata through simple
//! imperative calls, and finished into a relocatable ELF, COFF or Mach-O
//! object. Backends stay byte-oriented: they pass finished machine code and
//! compact side tables, never IR.

pub mod cfi;
pub mod debug;
mod error;
pub mod unwind;

use std::fs::File;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use gabbro_stream::{DataKind, Expr, FixupKind, ObjectStream, TargetSpec};
use tracing::debug;

pub use cfi::{CfiCode, CfiOpcode, DWARF_REG_ILLEGAL};
pub use debug::{DebugVarInfo, DebugVarRange, VarLocation};
pub use error::SessionError;
pub use gabbro_stream::BinaryFormat;

/// An open emission session. Dropped without [`finish`](Self::finish), the
/// output file is left behind empty.
pub struct ObjectWriter {
    pub(crate) stream: ObjectStream,
    pub(crate) cv: debug::DebugState,
    out_path: PathBuf,
    out_file: File,
}

impl ObjectWriter {
    /// Open a session writing a relocatable object for `triple` to `path`.
    /// An empty triple selects the host target.
    pub fn create(path: impl AsRef<Path>, triple: &str) -> Result<ObjectWriter, SessionError> {
        let path = path.as_ref().to_path_buf();
        let target = TargetSpec::parse(triple)?;
        let out_file = File::create(&path).map_err(|source| SessionError::Create {
            path: path.clone(),
            source,
        })?;
        debug!(
            triple = %target.triple,
            format = ?target.format,
            path = %path.display(),
            "opened object writer session"
        );
        Ok(ObjectWriter {
            stream: ObjectStream::new(target),
            cv: debug::DebugState::new(),
            out_path: path,
            out_file,
        })
    }

    /// Resolve everything still pending and write the object file.
    pub fn finish(mut self) -> Result<(), SessionError> {
        let bytes = self.stream.finish()?;
        self.out_file
            .write_all(&bytes)
            .map_err(|source| SessionError::Write {
                path: self.out_path.clone(),
                source,
            })?;
        debug!(
            bytes = bytes.len(),
            path = %self.out_path.display(),
            "wrote object file"
        );
        Ok(())
    }

    /// The container format this session emits.
    pub fn format(&self) -> BinaryFormat {
        self.stream.format()
    }

    // --- sections ---

    /// Register a custom data section. The name must not collide with a
    /// well-known section or an earlier custom one.
    pub fn create_data_section(&mut self, name: &str, read_only: bool) {
        let kind = if read_only {
            DataKind::ReadOnly
        } else {
            DataKind::Writable
        };
        self.stream.create_custom_section(name, kind);
    }

    /// Make a well-known ("text", "data", "rdata") or custom section
    /// current. Unknown names panic.
    pub fn switch_section(&mut self, name: &str) {
        self.stream.switch_section(name);
    }

    /// Pad the current section to a power-of-two boundary. The padding is
    /// nop bytes, matching what code sections want.
    pub fn emit_alignment(&mut self, align: u64) {
        self.stream.align(align, 0x90);
    }

    // --- data and symbols ---

    /// Append raw bytes at the current cursor.
    pub fn emit_blob(&mut self, blob: &[u8]) {
        self.stream.emit_bytes(blob);
    }

    /// Append a little-endian integer of `size` bytes (1 through 8).
    pub fn emit_int_value(&mut self, value: u64, size: usize) {
        self.stream.emit_int(value, size);
    }

    /// Define `name` at the current cursor with global visibility.
    pub fn emit_symbol_def(&mut self, name: &str) {
        self.stream.define_symbol(name);
    }

    /// Emit a `size`-byte reference to `name`, with `delta` added to the
    /// target address.
    ///
    /// PC-relative references are 4 bytes wide; the consumer measures the
    /// displacement from the end of the field while relocations measure
    /// from its start, so the emitted expression is biased by the field
    /// size.
    pub fn emit_symbol_ref(&mut self, name: &str, size: usize, is_pc_relative: bool, delta: i64) {
        let symbol = self.stream.intern(name);
        let mut expr = Expr::Symbol(symbol);
        match (size, is_pc_relative) {
            (4, true) => expr = expr.sub(Expr::Const(4)),
            (8, true) => panic!("8-byte PC-relative symbol references are not supported"),
            (4 | 8, false) => {}
            _ => panic!("symbol reference size must be 4 or 8, got {size}"),
        }
        if delta != 0 {
            expr = expr.add(Expr::Const(delta));
        }
        let kind = if is_pc_relative {
            FixupKind::PcRel
        } else {
            FixupKind::Abs
        };
        self.stream.emit_value(expr, size, kind);
    }
}

#[cfg(test)]
mod tests;

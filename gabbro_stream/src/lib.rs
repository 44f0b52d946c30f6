//! gabbro_stream: section/symbol streamer with deferred fixup resolution.
//!
//! Sits between an emission surface and the `object` crate: callers stream
//! bytes, labels, value fixups and call-frame directives into named
//! sections, and `finish` folds what it can, relocates the rest and
//! assembles a relocatable ELF, COFF or Mach-O container.

pub mod expr;
pub mod frame;
pub mod reloc;
pub mod section;
pub mod stream;
pub mod symbol;
pub mod target;

pub use expr::Expr;
pub use reloc::FixupKind;
pub use section::{DataKind, SectionId, WellKnown};
pub use stream::{EmitError, ObjectStream};
pub use symbol::SymId;
pub use target::{CfiSpec, TargetError, TargetSpec};

pub use object::{Architecture, BinaryFormat, Endianness};

#[cfg(test)]
mod tests;

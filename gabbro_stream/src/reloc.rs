//! Fixups: deferred field patches resolved during container assembly.

use object::{RelocationEncoding, RelocationFlags, RelocationKind};

use crate::expr::Expr;

/// How an emitted value field relates to its target address.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum FixupKind {
    /// Absolute address, or a plain constant after folding.
    Abs,
    /// PC-relative displacement measured from the start of the field.
    PcRel,
    /// 32-bit offset from the image base (COFF).
    ImageRel,
    /// 32-bit offset from the start of the target's section (COFF).
    SecRel,
    /// 16-bit index of the target's section (COFF).
    SecIdx,
}

/// A pending patch at `offset` within its section.
#[derive(Debug)]
pub(crate) struct Fixup {
    pub(crate) offset: u64,
    pub(crate) size: u8,
    pub(crate) kind: FixupKind,
    pub(crate) expr: Expr,
}

/// Generic relocation parameters for the container writer; the writer
/// lowers them to the format-specific relocation type.
pub(crate) fn flags_for(kind: FixupKind, size: u8) -> RelocationFlags {
    let (kind, bits) = match kind {
        FixupKind::Abs => (RelocationKind::Absolute, u32::from(size) * 8),
        FixupKind::PcRel => (RelocationKind::Relative, 32),
        FixupKind::ImageRel => (RelocationKind::ImageOffset, 32),
        FixupKind::SecRel => (RelocationKind::SectionOffset, 32),
        FixupKind::SecIdx => (RelocationKind::SectionIndex, 16),
    };
    RelocationFlags::Generic {
        kind,
        encoding: RelocationEncoding::Generic,
        size: bits as u8,
    }
}

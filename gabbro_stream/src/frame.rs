//! Call-frame recording and `.eh_frame` synthesis.
//!
//! Frame directives accumulate per-function instruction lists while code is
//! streamed; the table itself is serialized once at finish.

use gimli::write::{
    Address, CallFrameInstruction, CommonInformationEntry, EhFrame, EndianVec,
    FrameDescriptionEntry, FrameTable, RelocateWriter, Relocation,
};

use crate::section::SectionId;
use crate::symbol::SymId;
use crate::target::TargetSpec;

/// A frame currently being recorded.
#[derive(Debug)]
pub(crate) struct OpenFrame {
    pub(crate) start_label: SymId,
    pub(crate) section: SectionId,
    pub(crate) start_offset: u64,
    pub(crate) cfa_offset: i32,
    pub(crate) instructions: Vec<(u32, CallFrameInstruction)>,
}

/// A closed frame, ready for serialization.
#[derive(Debug)]
pub(crate) struct FrameRecord {
    pub(crate) start_label: SymId,
    pub(crate) length: u32,
    pub(crate) instructions: Vec<(u32, CallFrameInstruction)>,
}

#[derive(Debug, Default)]
pub(crate) struct FrameRecorder {
    pub(crate) open: Option<OpenFrame>,
    pub(crate) frames: Vec<FrameRecord>,
}

/// Serialization sink: frame table bytes plus symbol-addressed relocations
/// for each frame's start address.
struct EhFrameSink {
    data: EndianVec<gimli::LittleEndian>,
    relocations: Vec<Relocation>,
}

impl RelocateWriter for EhFrameSink {
    type Writer = EndianVec<gimli::LittleEndian>;

    fn writer(&self) -> &Self::Writer {
        &self.data
    }

    fn writer_mut(&mut self) -> &mut Self::Writer {
        &mut self.data
    }

    fn relocate(&mut self, relocation: Relocation) {
        self.relocations.push(relocation);
    }
}

/// Serialize the recorded frames into `.eh_frame` bytes. Relocation targets
/// index into `frames` (each frame is addressed by its start label).
pub(crate) fn build_eh_frame(
    target: &TargetSpec,
    frames: &[FrameRecord],
) -> Result<(Vec<u8>, Vec<Relocation>), gimli::write::Error> {
    let encoding = gimli::Encoding {
        format: gimli::Format::Dwarf32,
        version: 1,
        address_size: target.cfi.address_size,
    };
    let mut cie = CommonInformationEntry::new(
        encoding,
        1,
        target.cfi.data_alignment_factor,
        gimli::Register(target.cfi.return_address_register),
    );
    cie.fde_address_encoding = gimli::DwEhPe(
        gimli::constants::DW_EH_PE_pcrel.0 | gimli::constants::DW_EH_PE_sdata4.0,
    );
    for instruction in target.cfi.initial_instructions() {
        cie.add_instruction(instruction);
    }

    let mut table = FrameTable::default();
    let cie_id = table.add_cie(cie);
    for (index, frame) in frames.iter().enumerate() {
        let mut fde = FrameDescriptionEntry::new(
            Address::Symbol {
                symbol: index,
                addend: 0,
            },
            frame.length,
        );
        for (offset, instruction) in &frame.instructions {
            fde.add_instruction(*offset, instruction.clone());
        }
        table.add_fde(cie_id, fde);
    }

    let mut sink = EhFrame(EhFrameSink {
        data: EndianVec::new(gimli::LittleEndian),
        relocations: Vec::new(),
    });
    table.write_eh_frame(&mut sink)?;
    let EhFrameSink { data, relocations } = sink.0;
    Ok((data.into_vec(), relocations))
}

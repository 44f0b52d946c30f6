//! Target triple parsing and the properties the streamer derives from it.

use gimli::write::CallFrameInstruction;
use object::{Architecture, BinaryFormat, Endianness};
use target_lexicon::Triple;
use thiserror::Error;

/// Call-frame personality of an architecture: everything needed to build
/// the common information entry of `.eh_frame`.
#[derive(Clone, Copy, Debug)]
pub struct CfiSpec {
    pub stack_pointer: u16,
    pub return_address_register: u16,
    pub data_alignment_factor: i8,
    /// CFA distance from the stack pointer at function entry.
    pub initial_cfa_offset: i32,
    pub address_size: u8,
}

impl CfiSpec {
    /// Initial instructions shared by every frame of the module.
    pub(crate) fn initial_instructions(&self) -> Vec<CallFrameInstruction> {
        let mut instructions = vec![CallFrameInstruction::Cfa(
            gimli::Register(self.stack_pointer),
            self.initial_cfa_offset,
        )];
        if self.initial_cfa_offset != 0 {
            // The call pushed the return address just below the entry CFA.
            instructions.push(CallFrameInstruction::Offset(
                gimli::Register(self.return_address_register),
                -self.initial_cfa_offset,
            ));
        }
        instructions
    }
}

/// A parsed target triple plus the container parameters it maps to.
#[derive(Clone, Debug)]
pub struct TargetSpec {
    pub triple: Triple,
    pub format: BinaryFormat,
    pub architecture: Architecture,
    pub endianness: Endianness,
    pub cfi: CfiSpec,
}

#[derive(Debug, Error)]
pub enum TargetError {
    #[error("cannot parse target triple `{0}`")]
    Parse(String),
    #[error("unsupported architecture `{0}`")]
    Architecture(String),
    #[error("no relocatable container format for `{0}`")]
    Format(String),
    #[error("big-endian target `{0}` is not supported")]
    Endianness(String),
}

impl TargetSpec {
    /// Parse a target triple. An empty string selects the host.
    pub fn parse(triple: &str) -> Result<TargetSpec, TargetError> {
        let triple: Triple = if triple.is_empty() {
            Triple::host()
        } else {
            triple
                .parse()
                .map_err(|_| TargetError::Parse(triple.to_string()))?
        };

        let architecture = match triple.architecture {
            target_lexicon::Architecture::X86_64 => Architecture::X86_64,
            target_lexicon::Architecture::X86_32(_) => Architecture::I386,
            target_lexicon::Architecture::Aarch64(_) => Architecture::Aarch64,
            other => return Err(TargetError::Architecture(other.to_string())),
        };

        let format = match triple.binary_format {
            target_lexicon::BinaryFormat::Elf => BinaryFormat::Elf,
            target_lexicon::BinaryFormat::Coff => BinaryFormat::Coff,
            target_lexicon::BinaryFormat::Macho => BinaryFormat::MachO,
            _ => return Err(TargetError::Format(triple.to_string())),
        };

        let endianness = match triple.endianness() {
            Ok(target_lexicon::Endianness::Little) => Endianness::Little,
            _ => return Err(TargetError::Endianness(triple.to_string())),
        };

        let cfi = match architecture {
            Architecture::X86_64 => CfiSpec {
                stack_pointer: 7,
                return_address_register: 16,
                data_alignment_factor: -8,
                initial_cfa_offset: 8,
                address_size: 8,
            },
            Architecture::I386 => CfiSpec {
                stack_pointer: 4,
                return_address_register: 8,
                data_alignment_factor: -4,
                initial_cfa_offset: 4,
                address_size: 4,
            },
            Architecture::Aarch64 => CfiSpec {
                stack_pointer: 31,
                return_address_register: 30,
                data_alignment_factor: -8,
                initial_cfa_offset: 0,
                address_size: 8,
            },
            _ => unreachable!(),
        };

        Ok(TargetSpec {
            triple,
            format,
            architecture,
            endianness,
            cfi,
        })
    }
}

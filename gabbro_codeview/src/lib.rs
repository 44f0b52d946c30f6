//! gabbro_codeview: byte-level CodeView encoders.
//!
//! Symbol records, line blocks, file checksums and the string table, kept
//! free of any dependency on the streaming layer. Fields that need
//! relocations are left to the caller.

pub mod lines;
pub mod records;
pub mod register;

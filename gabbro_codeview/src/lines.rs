//! CodeView line tables: registered source files, the string table and
//! per-function line mappings.

use std::collections::{BTreeMap, HashMap};

/// One line mapping, tagged with the function it belongs to.
#[derive(Clone, Copy, Debug)]
pub struct LineEntry {
    pub func_id: u32,
    /// Code offset relative to the function start.
    pub offset: u32,
    pub file_id: u32,
    pub line: u32,
    pub column: u32,
}

/// Encoded per-file blocks of one function's lines subsection.
#[derive(Debug)]
pub struct LineBlocks {
    pub have_columns: bool,
    pub bytes: Vec<u8>,
}

/// Module-wide line-mapping state. File ids are caller-assigned and must
/// be dense starting at 1; the checksum table is indexed by `8 * (id - 1)`.
#[derive(Debug, Default)]
pub struct LineTable {
    strings: StringTable,
    files: BTreeMap<u32, u32>,
    entries: Vec<LineEntry>,
}

impl LineTable {
    pub fn new() -> LineTable {
        LineTable::default()
    }

    /// Register a source file under a caller-assigned positive id.
    pub fn add_file(&mut self, file_id: u32, name: &str) {
        assert!(file_id > 0, "file ids are 1-based");
        let offset = self.strings.intern(name);
        let previous = self.files.insert(file_id, offset);
        assert!(previous.is_none(), "file id {file_id} registered twice");
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    /// Record a line mapping. The file must be registered.
    pub fn add_entry(&mut self, entry: LineEntry) {
        assert!(
            self.files.contains_key(&entry.file_id),
            "line mapping references unregistered file id {}",
            entry.file_id
        );
        self.entries.push(entry);
    }

    /// Encode the line blocks of one function: runs of entries sharing a
    /// file become one block each, in recording order.
    pub fn blocks_for(&self, func_id: u32) -> LineBlocks {
        let entries: Vec<&LineEntry> = self
            .entries
            .iter()
            .filter(|entry| entry.func_id == func_id)
            .collect();
        let have_columns = entries.iter().any(|entry| entry.column != 0);

        let mut bytes = Vec::new();
        let mut start = 0;
        while start < entries.len() {
            let file_id = entries[start].file_id;
            let mut end = start;
            while end < entries.len() && entries[end].file_id == file_id {
                end += 1;
            }
            let run = &entries[start..end];
            let count = run.len() as u32;
            let block_size = 12 + 8 * count + if have_columns { 4 * count } else { 0 };
            push_u32(&mut bytes, 8 * (file_id - 1));
            push_u32(&mut bytes, count);
            push_u32(&mut bytes, block_size);
            for entry in run {
                push_u32(&mut bytes, entry.offset);
                // 24-bit start line plus the statement bit
                push_u32(&mut bytes, (entry.line & 0x00FF_FFFF) | 0x8000_0000);
            }
            if have_columns {
                for entry in run {
                    push_u16(&mut bytes, entry.column as u16);
                    push_u16(&mut bytes, 0);
                }
            }
            start = end;
        }
        LineBlocks { have_columns, bytes }
    }

    /// Encode the file checksum table: one fixed-width entry per file in
    /// ascending id order, each pointing into the string table and carrying
    /// no checksum bytes.
    pub fn checksum_payload(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        for (index, (&file_id, &name_offset)) in self.files.iter().enumerate() {
            assert_eq!(
                file_id as usize,
                index + 1,
                "file ids must be dense starting at 1"
            );
            push_u32(&mut bytes, name_offset);
            bytes.push(0); // checksum size
            bytes.push(0); // checksum kind: none
            bytes.extend_from_slice(&[0, 0]); // pad entry to 4
        }
        bytes
    }

    pub fn string_payload(&self) -> &[u8] {
        self.strings.bytes()
    }
}

/// CodeView string table: a leading NUL, then each name stored once.
#[derive(Debug)]
struct StringTable {
    bytes: Vec<u8>,
    offsets: HashMap<String, u32>,
}

impl Default for StringTable {
    fn default() -> StringTable {
        StringTable {
            bytes: vec![0],
            offsets: HashMap::new(),
        }
    }
}

impl StringTable {
    fn intern(&mut self, name: &str) -> u32 {
        if let Some(&offset) = self.offsets.get(name) {
            return offset;
        }
        let offset = self.bytes.len() as u32;
        self.bytes.extend_from_slice(name.as_bytes());
        self.bytes.push(0);
        self.offsets.insert(name.to_string(), offset);
        offset
    }

    fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

fn push_u16(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn push_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}

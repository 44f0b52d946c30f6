//! Windows x64 unwind metadata: `.xdata` records and `.pdata` function
//! table entries.

use gabbro_stream::{BinaryFormat, Expr, FixupKind, WellKnown};
use tracing::trace;

use crate::ObjectWriter;

// UNWIND_INFO flags, stored in bits 3..7 of the first blob byte.
const UNW_FLAG_EHANDLER: u8 = 0x01;
const UNW_FLAG_UHANDLER: u8 = 0x02;
const UNW_FLAG_CHAININFO: u8 = 0x04;

impl ObjectWriter {
    /// Attach Windows unwind metadata to `function_name` for the code range
    /// `[start_offset, end_offset)`.
    ///
    /// `blob` is the UNWIND_INFO record produced by the code generator;
    /// its first byte carries version and flags. When the handler flags are
    /// set, `personality` names the routine referenced after the record and
    /// `lsda` bytes (if any) follow it. Chained unwind info is not
    /// supported. Leaves the `.pdata` section current.
    pub fn emit_win_frame_info(
        &mut self,
        function_name: &str,
        start_offset: u32,
        end_offset: u32,
        blob: &[u8],
        personality: Option<&str>,
        lsda: &[u8],
    ) {
        assert_eq!(
            self.stream.format(),
            BinaryFormat::Coff,
            "windows unwind info requires a COFF target"
        );
        assert!(!blob.is_empty(), "unwind blob is missing its version/flags byte");
        let flags = blob[0];
        assert_eq!(
            flags & (UNW_FLAG_CHAININFO << 3),
            0,
            "chained unwind info is not supported"
        );

        // The unwind record itself, with the personality address and LSDA
        // payload appended when handlers are present.
        self.stream.switch_well_known(WellKnown::Xdata);
        self.stream.align(4, 0);
        let unwind_label = self.stream.define_temp_label();
        self.stream.emit_bytes(blob);
        self.stream.align(4, 0);
        if flags & ((UNW_FLAG_EHANDLER | UNW_FLAG_UHANDLER) << 3) != 0 {
            let personality =
                personality.expect("unwind info with handlers requires a personality routine");
            let symbol = self.stream.intern(personality);
            self.stream
                .emit_value(Expr::Symbol(symbol), 4, FixupKind::ImageRel);
        }
        if !lsda.is_empty() {
            self.stream.emit_bytes(lsda);
        }

        // Function table entry: start, end and unwind-record addresses.
        let function = self.stream.intern(function_name);
        self.stream.switch_well_known(WellKnown::Pdata);
        self.stream.align(4, 0);
        self.stream.emit_value(
            Expr::Symbol(function).add(Expr::Const(i64::from(start_offset))),
            4,
            FixupKind::ImageRel,
        );
        self.stream.emit_value(
            Expr::Symbol(function).add(Expr::Const(i64::from(end_offset))),
            4,
            FixupKind::ImageRel,
        );
        self.stream
            .emit_value(Expr::Symbol(unwind_label), 4, FixupKind::ImageRel);

        trace!(
            function = function_name,
            start_offset,
            end_offset,
            "emitted windows unwind info"
        );
    }
}

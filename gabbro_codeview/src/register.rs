//! CodeView register codes.

/// `CV_AMD64_*` codes for the code generator's AMD64 register numbers
/// (RAX, RCX, RDX, RBX, RSP, RBP, RSI, RDI, R8..R15).
const CV_AMD64_REG_MAP: [u16; 16] = [
    328, // rax
    330, // rcx
    331, // rdx
    329, // rbx
    335, // rsp
    334, // rbp
    332, // rsi
    333, // rdi
    336, // r8
    337, // r9
    338, // r10
    339, // r11
    340, // r12
    341, // r13
    342, // r14
    343, // r15
];

/// Map an AMD64 register number to its CodeView code.
pub fn cv_amd64_reg(reg: u8) -> u16 {
    assert!(
        usize::from(reg) < CV_AMD64_REG_MAP.len(),
        "amd64 register number {reg} out of range"
    );
    CV_AMD64_REG_MAP[usize::from(reg)]
}

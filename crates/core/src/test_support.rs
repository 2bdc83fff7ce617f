//! Hand-assembled RV32I programs for exercising the simulator.
//!
//! Shared by the core tests and the CLI integration tests.

/// Minimal RV32I encoder, just the instructions the greeting loop needs.
pub mod rv {
    pub const ZERO: u32 = 0;
    pub const T0: u32 = 5;
    pub const S0: u32 = 8;
    pub const A0: u32 = 10;
    pub const A1: u32 = 11;
    pub const A2: u32 = 12;

    pub const EBREAK: u32 = 0x0010_0073;

    fn i_type(imm: i32, rs1: u32, f3: u32, rd: u32, op: u32) -> u32 {
        ((imm as u32 & 0xfff) << 20) | (rs1 << 15) | (f3 << 12) | (rd << 7) | op
    }

    fn b_type(f3: u32, rs1: u32, rs2: u32, imm: i32) -> u32 {
        let imm = imm as u32;
        (((imm >> 12) & 1) << 31)
            | (((imm >> 5) & 0x3f) << 25)
            | (rs2 << 20)
            | (rs1 << 15)
            | (f3 << 12)
            | (((imm >> 1) & 0xf) << 8)
            | (((imm >> 11) & 1) << 7)
            | 0x63
    }

    pub fn lui(rd: u32, imm: u32) -> u32 {
        (imm & 0xffff_f000) | (rd << 7) | 0x37
    }

    pub fn auipc(rd: u32, imm: u32) -> u32 {
        (imm & 0xffff_f000) | (rd << 7) | 0x17
    }

    pub fn addi(rd: u32, rs1: u32, imm: i32) -> u32 {
        i_type(imm, rs1, 0, rd, 0x13)
    }

    pub fn andi(rd: u32, rs1: u32, imm: i32) -> u32 {
        i_type(imm, rs1, 7, rd, 0x13)
    }

    pub fn lbu(rd: u32, rs1: u32, imm: i32) -> u32 {
        i_type(imm, rs1, 4, rd, 0x03)
    }

    pub fn lw(rd: u32, rs1: u32, imm: i32) -> u32 {
        i_type(imm, rs1, 2, rd, 0x03)
    }

    pub fn sb(rs2: u32, rs1: u32, imm: i32) -> u32 {
        let imm = imm as u32;
        (((imm >> 5) & 0x7f) << 25) | (rs2 << 20) | (rs1 << 15) | ((imm & 0x1f) << 7) | 0x23
    }

    pub fn beq(rs1: u32, rs2: u32, imm: i32) -> u32 {
        b_type(0, rs1, rs2, imm)
    }

    pub fn bne(rs1: u32, rs2: u32, imm: i32) -> u32 {
        b_type(1, rs1, rs2, imm)
    }

    pub fn jal(rd: u32, imm: i32) -> u32 {
        let imm = imm as u32;
        (((imm >> 20) & 1) << 31)
            | (((imm >> 1) & 0x3ff) << 21)
            | (((imm >> 11) & 1) << 20)
            | (((imm >> 12) & 0xff) << 12)
            | (rd << 7)
            | 0x6f
    }

    /// Byte distance between two instruction slots.
    pub fn off(from: usize, to: usize) -> i32 {
        (to as i32 - from as i32) * 4
    }
}

/// Little-endian bytes of a sequence of instruction words.
pub fn assemble(words: &[u32]) -> Vec<u8> {
    words.iter().flat_map(|w| w.to_le_bytes()).collect()
}

/// Machine code equivalent of the bring-up image: position independent,
/// UART at 0x8000, `message` and its NUL stored right after the code.
pub fn greeter_code(message: &[u8], polled: bool) -> Vec<u8> {
    use rv::*;

    let mut code = vec![
        lui(S0, 0x8000), // s0 = UART base
        auipc(A1, 0),
        0, // addi a1, a1, <message>
    ];
    let top = code.len();
    code.push(lbu(A2, A1, 0));
    let exit_branch = code.len();
    code.push(0); // beq a2, zero, <done>
    if polled {
        let wait = code.len();
        code.push(lbu(T0, S0, 8));
        code.push(andi(T0, T0, 8));
        let here = code.len();
        code.push(bne(T0, ZERO, off(here, wait)));
    }
    code.push(sb(A2, S0, 4));
    code.push(addi(A1, A1, 1));
    let here = code.len();
    code.push(jal(ZERO, off(here, top)));
    let done = code.len();
    code.push(addi(A0, ZERO, 0));
    code.push(EBREAK);

    code[exit_branch] = beq(A2, ZERO, off(exit_branch, done));
    code[2] = addi(A1, A1, off(1, code.len()));

    let mut bytes = assemble(&code);
    bytes.extend_from_slice(message);
    bytes.push(0);
    bytes
}

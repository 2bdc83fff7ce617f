//! RV32I decoder, plus the Zicsr encodings that startup code touches.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchCond {
    Eq,
    Ne,
    Lt,
    Ge,
    Ltu,
    Geu,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadKind {
    Byte,
    Half,
    Word,
    ByteUnsigned,
    HalfUnsigned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Byte,
    Half,
    Word,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AluOp {
    Add,
    Sub,
    Sll,
    Slt,
    Sltu,
    Xor,
    Srl,
    Sra,
    Or,
    And,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    Lui { rd: u8, imm: u32 },
    Auipc { rd: u8, imm: u32 },
    Jal { rd: u8, imm: i32 },
    Jalr { rd: u8, rs1: u8, imm: i32 },
    Branch { cond: BranchCond, rs1: u8, rs2: u8, imm: i32 },
    Load { kind: LoadKind, rd: u8, rs1: u8, imm: i32 },
    Store { kind: StoreKind, rs1: u8, rs2: u8, imm: i32 },
    /// Register-immediate ALU op. Shift amounts live in the low 5 bits of `imm`.
    OpImm { op: AluOp, rd: u8, rs1: u8, imm: i32 },
    Op { op: AluOp, rd: u8, rs1: u8, rs2: u8 },
    Fence,
    Ecall,
    Ebreak,
    Wfi,
    /// Any CSR access. The core has no CSR file, so only `rd` matters.
    Csr { rd: u8, csr: u16 },
    Unknown(u32),
}

const OPCODE_LOAD: u32 = 0x03;
const OPCODE_MISC_MEM: u32 = 0x0f;
const OPCODE_OP_IMM: u32 = 0x13;
const OPCODE_AUIPC: u32 = 0x17;
const OPCODE_STORE: u32 = 0x23;
const OPCODE_OP: u32 = 0x33;
const OPCODE_LUI: u32 = 0x37;
const OPCODE_BRANCH: u32 = 0x63;
const OPCODE_JALR: u32 = 0x67;
const OPCODE_JAL: u32 = 0x6f;
const OPCODE_SYSTEM: u32 = 0x73;

const INST_ECALL: u32 = 0x0000_0073;
const INST_EBREAK: u32 = 0x0010_0073;
const INST_WFI: u32 = 0x1050_0073;

fn rd(inst: u32) -> u8 {
    ((inst >> 7) & 0x1f) as u8
}

fn rs1(inst: u32) -> u8 {
    ((inst >> 15) & 0x1f) as u8
}

fn rs2(inst: u32) -> u8 {
    ((inst >> 20) & 0x1f) as u8
}

fn funct3(inst: u32) -> u32 {
    (inst >> 12) & 0x7
}

fn funct7(inst: u32) -> u32 {
    inst >> 25
}

fn imm_i(inst: u32) -> i32 {
    (inst as i32) >> 20
}

fn imm_s(inst: u32) -> i32 {
    (((inst as i32) >> 20) & !0x1f) | ((inst >> 7) & 0x1f) as i32
}

fn imm_b(inst: u32) -> i32 {
    (((inst as i32 >> 19) as u32 & 0xffff_f000)
        | ((inst << 4) & 0x800)
        | ((inst >> 20) & 0x7e0)
        | ((inst >> 7) & 0x1e)) as i32
}

fn imm_j(inst: u32) -> i32 {
    (((inst as i32 >> 11) as u32 & 0xfff0_0000)
        | (inst & 0x000f_f000)
        | ((inst >> 9) & 0x800)
        | ((inst >> 20) & 0x7fe)) as i32
}

fn imm_u(inst: u32) -> u32 {
    inst & 0xffff_f000
}

fn alu_op(funct3: u32, alt: bool) -> AluOp {
    match (funct3, alt) {
        (0, false) => AluOp::Add,
        (0, true) => AluOp::Sub,
        (1, _) => AluOp::Sll,
        (2, _) => AluOp::Slt,
        (3, _) => AluOp::Sltu,
        (4, _) => AluOp::Xor,
        (5, false) => AluOp::Srl,
        (5, true) => AluOp::Sra,
        (6, _) => AluOp::Or,
        _ => AluOp::And,
    }
}

pub fn decode_rv32(inst: u32) -> Instruction {
    let f3 = funct3(inst);

    match inst & 0x7f {
        OPCODE_LUI => Instruction::Lui {
            rd: rd(inst),
            imm: imm_u(inst),
        },
        OPCODE_AUIPC => Instruction::Auipc {
            rd: rd(inst),
            imm: imm_u(inst),
        },
        OPCODE_JAL => Instruction::Jal {
            rd: rd(inst),
            imm: imm_j(inst),
        },
        OPCODE_JALR if f3 == 0 => Instruction::Jalr {
            rd: rd(inst),
            rs1: rs1(inst),
            imm: imm_i(inst),
        },
        OPCODE_BRANCH => {
            let cond = match f3 {
                0 => BranchCond::Eq,
                1 => BranchCond::Ne,
                4 => BranchCond::Lt,
                5 => BranchCond::Ge,
                6 => BranchCond::Ltu,
                7 => BranchCond::Geu,
                _ => return Instruction::Unknown(inst),
            };
            Instruction::Branch {
                cond,
                rs1: rs1(inst),
                rs2: rs2(inst),
                imm: imm_b(inst),
            }
        }
        OPCODE_LOAD => {
            let kind = match f3 {
                0 => LoadKind::Byte,
                1 => LoadKind::Half,
                2 => LoadKind::Word,
                4 => LoadKind::ByteUnsigned,
                5 => LoadKind::HalfUnsigned,
                _ => return Instruction::Unknown(inst),
            };
            Instruction::Load {
                kind,
                rd: rd(inst),
                rs1: rs1(inst),
                imm: imm_i(inst),
            }
        }
        OPCODE_STORE => {
            let kind = match f3 {
                0 => StoreKind::Byte,
                1 => StoreKind::Half,
                2 => StoreKind::Word,
                _ => return Instruction::Unknown(inst),
            };
            Instruction::Store {
                kind,
                rs1: rs1(inst),
                rs2: rs2(inst),
                imm: imm_s(inst),
            }
        }
        OPCODE_OP_IMM => {
            let f7 = funct7(inst);
            let alt = match f3 {
                1 if f7 == 0 => false,
                5 if f7 == 0 => false,
                5 if f7 == 0x20 => true,
                1 | 5 => return Instruction::Unknown(inst),
                _ => false,
            };
            let mut imm = imm_i(inst);
            if f3 == 1 || f3 == 5 {
                imm &= 0x1f;
            }
            Instruction::OpImm {
                op: alu_op(f3, alt),
                rd: rd(inst),
                rs1: rs1(inst),
                imm,
            }
        }
        OPCODE_OP => {
            // funct7 0x01 is the M extension, which this core lacks.
            let alt = match (funct7(inst), f3) {
                (0, _) => false,
                (0x20, 0) | (0x20, 5) => true,
                _ => return Instruction::Unknown(inst),
            };
            Instruction::Op {
                op: alu_op(f3, alt),
                rd: rd(inst),
                rs1: rs1(inst),
                rs2: rs2(inst),
            }
        }
        OPCODE_MISC_MEM => Instruction::Fence,
        OPCODE_SYSTEM => match (inst, f3) {
            (INST_ECALL, _) => Instruction::Ecall,
            (INST_EBREAK, _) => Instruction::Ebreak,
            (INST_WFI, _) => Instruction::Wfi,
            (_, 1..=3) | (_, 5..=7) => Instruction::Csr {
                rd: rd(inst),
                csr: (inst >> 20) as u16,
            },
            _ => Instruction::Unknown(inst),
        },
        _ => Instruction::Unknown(inst),
    }
}

use crate::decoder::riscv::{decode_rv32, AluOp, BranchCond, Instruction, LoadKind, StoreKind};
use crate::{Bus, Cpu, SimResult, SimulationError, StepOutcome};

/// `a0`: first argument and return value.
pub const REG_A0: u8 = 10;

/// Single-hart RV32I core with no privilege or CSR state.
#[derive(Debug, Default)]
pub struct RiscV {
    pub x: [u32; 32], // x0 reads as zero through `read_reg`
    pub pc: u32,
}

impl RiscV {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read_reg(&self, n: u8) -> u32 {
        if n == 0 {
            0
        } else {
            self.x[n as usize]
        }
    }

    pub fn write_reg(&mut self, n: u8, val: u32) {
        if n != 0 {
            self.x[n as usize] = val;
        }
    }

    fn effective_addr(&self, rs1: u8, imm: i32) -> u64 {
        self.read_reg(rs1).wrapping_add(imm as u32) as u64
    }
}

fn alu(op: AluOp, a: u32, b: u32) -> u32 {
    let shamt = b & 0x1f;
    match op {
        AluOp::Add => a.wrapping_add(b),
        AluOp::Sub => a.wrapping_sub(b),
        AluOp::Sll => a << shamt,
        AluOp::Slt => ((a as i32) < (b as i32)) as u32,
        AluOp::Sltu => (a < b) as u32,
        AluOp::Xor => a ^ b,
        AluOp::Srl => a >> shamt,
        AluOp::Sra => ((a as i32) >> shamt) as u32,
        AluOp::Or => a | b,
        AluOp::And => a & b,
    }
}

fn branch_taken(cond: BranchCond, a: u32, b: u32) -> bool {
    match cond {
        BranchCond::Eq => a == b,
        BranchCond::Ne => a != b,
        BranchCond::Lt => (a as i32) < (b as i32),
        BranchCond::Ge => (a as i32) >= (b as i32),
        BranchCond::Ltu => a < b,
        BranchCond::Geu => a >= b,
    }
}

impl Cpu for RiscV {
    fn reset(&mut self) {
        self.x = [0; 32];
    }

    fn step(&mut self, bus: &mut dyn Bus) -> SimResult<StepOutcome> {
        let opcode = bus.read_u32(self.pc as u64)?;
        let instruction = decode_rv32(opcode);
        tracing::debug!("PC={:#x}, Op={:#010x}, Instr={:?}", self.pc, opcode, instruction);

        let mut next_pc = self.pc.wrapping_add(4);

        match instruction {
            Instruction::Lui { rd, imm } => self.write_reg(rd, imm),
            Instruction::Auipc { rd, imm } => self.write_reg(rd, self.pc.wrapping_add(imm)),
            Instruction::Jal { rd, imm } => {
                self.write_reg(rd, next_pc);
                next_pc = self.pc.wrapping_add(imm as u32);
            }
            Instruction::Jalr { rd, rs1, imm } => {
                let target = self.read_reg(rs1).wrapping_add(imm as u32) & !1;
                self.write_reg(rd, next_pc);
                next_pc = target;
            }
            Instruction::Branch {
                cond,
                rs1,
                rs2,
                imm,
            } => {
                if branch_taken(cond, self.read_reg(rs1), self.read_reg(rs2)) {
                    next_pc = self.pc.wrapping_add(imm as u32);
                }
            }
            Instruction::Load { kind, rd, rs1, imm } => {
                let addr = self.effective_addr(rs1, imm);
                let val = match kind {
                    LoadKind::Byte => bus.read_u8(addr)? as i8 as i32 as u32,
                    LoadKind::Half => bus.read_u16(addr)? as i16 as i32 as u32,
                    LoadKind::Word => bus.read_u32(addr)?,
                    LoadKind::ByteUnsigned => bus.read_u8(addr)? as u32,
                    LoadKind::HalfUnsigned => bus.read_u16(addr)? as u32,
                };
                self.write_reg(rd, val);
            }
            Instruction::Store {
                kind,
                rs1,
                rs2,
                imm,
            } => {
                let addr = self.effective_addr(rs1, imm);
                let val = self.read_reg(rs2);
                match kind {
                    StoreKind::Byte => bus.write_u8(addr, val as u8)?,
                    StoreKind::Half => bus.write_u16(addr, val as u16)?,
                    StoreKind::Word => bus.write_u32(addr, val)?,
                }
            }
            Instruction::OpImm { op, rd, rs1, imm } => {
                let res = alu(op, self.read_reg(rs1), imm as u32);
                self.write_reg(rd, res);
            }
            Instruction::Op { op, rd, rs1, rs2 } => {
                let res = alu(op, self.read_reg(rs1), self.read_reg(rs2));
                self.write_reg(rd, res);
            }
            // Single hart, in-order: ordering and sleep hints are no-ops.
            Instruction::Fence | Instruction::Wfi => {}
            Instruction::Csr { rd, csr } => {
                tracing::trace!("CSR {:#05x} access at {:#x} reads as zero", csr, self.pc);
                self.write_reg(rd, 0);
            }
            Instruction::Ecall | Instruction::Ebreak => {
                let exit_code = self.read_reg(REG_A0) as i32;
                tracing::info!(
                    "{:?} at {:#x}, exit code {}",
                    instruction,
                    self.pc,
                    exit_code
                );
                self.pc = next_pc;
                return Ok(StepOutcome::Halt { exit_code });
            }
            Instruction::Unknown(inst) => {
                tracing::error!("Unknown instruction {:#x} at {:#x}", inst, self.pc);
                return Err(SimulationError::DecodeError(self.pc as u64));
            }
        }

        self.pc = next_pc;
        Ok(StepOutcome::Continue)
    }

    fn set_pc(&mut self, val: u32) {
        self.pc = val;
    }

    fn get_pc(&self) -> u32 {
        self.pc
    }
}

pub mod bus;
pub mod cpu;
pub mod decoder;
pub mod memory;
pub mod peripherals;
#[doc(hidden)]
pub mod test_support;

use std::any::Any;
use std::time::{Duration, Instant};

use serde::Serialize;

pub use uartcheck_config::StopReason;

mod tests;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SimulationError {
    #[error("Memory access violation at {0:#x}")]
    MemoryViolation(u64),
    #[error("Instruction decoding error at {0:#x}")]
    DecodeError(u64),
}

pub type SimResult<T> = Result<T, SimulationError>;

/// What a single instruction did to the control flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Continue,
    /// ECALL/EBREAK: the image handed control back with an exit code.
    Halt { exit_code: i32 },
}

/// Trait representing a CPU architecture
pub trait Cpu {
    fn reset(&mut self);
    fn step(&mut self, bus: &mut dyn Bus) -> SimResult<StepOutcome>;
    fn set_pc(&mut self, val: u32);
    fn get_pc(&self) -> u32;
}

/// Trait representing a memory-mapped peripheral.
///
/// Reads take `&mut self`: on the SysUart a status read is an observable
/// event.
pub trait Peripheral: std::fmt::Debug + Send {
    fn read(&mut self, offset: u64) -> SimResult<u8>;
    fn write(&mut self, offset: u64, value: u8) -> SimResult<()>;
    fn tick(&mut self) {}
    fn reset(&mut self) {}
    fn as_any(&self) -> Option<&dyn Any> {
        None
    }
    fn as_any_mut(&mut self) -> Option<&mut dyn Any> {
        None
    }
}

/// Trait representing the system bus
pub trait Bus {
    fn read_u8(&mut self, addr: u64) -> SimResult<u8>;
    fn write_u8(&mut self, addr: u64, value: u8) -> SimResult<()>;
    fn tick_peripherals(&mut self);

    fn read_u16(&mut self, addr: u64) -> SimResult<u16> {
        let b0 = self.read_u8(addr)? as u16;
        let b1 = self.read_u8(addr + 1)? as u16;
        // Little Endian
        Ok(b0 | (b1 << 8))
    }

    fn read_u32(&mut self, addr: u64) -> SimResult<u32> {
        let lo = self.read_u16(addr)? as u32;
        let hi = self.read_u16(addr + 2)? as u32;
        Ok(lo | (hi << 16))
    }

    fn write_u16(&mut self, addr: u64, value: u16) -> SimResult<()> {
        self.write_u8(addr, (value & 0xFF) as u8)?;
        self.write_u8(addr + 1, (value >> 8) as u8)
    }

    fn write_u32(&mut self, addr: u64, value: u32) -> SimResult<()> {
        self.write_u16(addr, (value & 0xFFFF) as u16)?;
        self.write_u16(addr + 2, (value >> 16) as u16)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RunLimits {
    pub max_steps: u64,
    pub wall_time: Option<Duration>,
}

impl RunLimits {
    pub fn steps(max_steps: u64) -> Self {
        Self {
            max_steps,
            wall_time: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RunOutcome {
    pub stop_reason: StopReason,
    pub steps: u64,
    pub exit_code: Option<i32>,
}

pub struct Machine<C: Cpu> {
    pub cpu: C,
    pub bus: bus::SystemBus,
    entry_point: u32,
}

impl<C: Cpu + Default> Machine<C> {
    pub fn new() -> Self {
        Self::with_bus(bus::SystemBus::new())
    }

    pub fn with_bus(bus: bus::SystemBus) -> Self {
        let mut cpu = C::default();
        let entry_point = bus.ram.base_addr as u32;
        cpu.set_pc(entry_point);
        Self {
            cpu,
            bus,
            entry_point,
        }
    }
}

impl<C: Cpu + Default> Default for Machine<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Cpu> Machine<C> {
    pub fn load_firmware(&mut self, image: &memory::ProgramImage) -> SimResult<()> {
        for segment in &image.segments {
            if !self.bus.ram.load_from_segment(segment) {
                tracing::warn!(
                    "Failed to load segment at {:#x} ({} bytes) - outside of memory map",
                    segment.start_addr,
                    segment.data.len()
                );
            }
        }

        self.entry_point = image.entry_point as u32;
        self.reset();
        Ok(())
    }

    /// Back to the entry point with the peripherals in power-on state.
    /// Memory is left as loaded.
    pub fn reset(&mut self) {
        self.cpu.reset();
        self.cpu.set_pc(self.entry_point);
        self.bus.reset_peripherals();
    }

    /// Execute one instruction, then tick every peripheral once. Fetches and
    /// data accesses within the instruction do not tick.
    pub fn step(&mut self) -> SimResult<StepOutcome> {
        let res = self.cpu.step(&mut self.bus);
        self.bus.tick_peripherals();
        res
    }

    pub fn run(&mut self, limits: &RunLimits) -> RunOutcome {
        let start = Instant::now();
        let mut steps = 0;

        let (stop_reason, exit_code) = loop {
            if steps >= limits.max_steps {
                break (StopReason::MaxSteps, None);
            }
            if let Some(budget) = limits.wall_time {
                if start.elapsed() >= budget {
                    break (StopReason::WallTime, None);
                }
            }

            let pc = self.cpu.get_pc();
            match self.step() {
                Ok(StepOutcome::Continue) => {
                    steps += 1;
                    if self.cpu.get_pc() == pc {
                        tracing::debug!("PC stuck at {:#x}", pc);
                        break (StopReason::NoProgress, None);
                    }
                }
                Ok(StepOutcome::Halt { exit_code }) => {
                    steps += 1;
                    break (StopReason::Halt, Some(exit_code));
                }
                Err(e) => {
                    tracing::info!("Simulation Error at step {}: {}", steps, e);
                    let reason = match e {
                        SimulationError::MemoryViolation(_) => StopReason::MemoryViolation,
                        SimulationError::DecodeError(_) => StopReason::DecodeError,
                    };
                    break (reason, None);
                }
            }
        };

        RunOutcome {
            stop_reason,
            steps,
            exit_code,
        }
    }
}

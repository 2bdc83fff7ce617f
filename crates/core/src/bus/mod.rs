use crate::memory::LinearMemory;
use crate::peripherals::SysUart;
use crate::{Peripheral, SimResult, SimulationError};
use uartcheck_config::PlatformDescriptor;

#[derive(Debug)]
pub struct PeripheralEntry {
    pub name: String,
    pub base: u64,
    pub size: u64,
    pub dev: Box<dyn Peripheral>,
}

impl PeripheralEntry {
    fn contains(&self, addr: u64) -> bool {
        addr >= self.base && addr < self.base + self.size
    }
}

pub struct SystemBus {
    pub ram: LinearMemory,
    pub peripherals: Vec<PeripheralEntry>,
    faults: Vec<SimulationError>,
}

impl Default for SystemBus {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemBus {
    /// The bring-up board described by [`PlatformDescriptor::default`].
    pub fn new() -> Self {
        Self::from_config(&PlatformDescriptor::default())
            .expect("default platform descriptor is valid")
    }

    pub fn from_config(platform: &PlatformDescriptor) -> anyhow::Result<Self> {
        platform.validate()?;
        let ram_size = platform.memory_size()? as usize;
        tracing::debug!(
            "Platform '{}': RAM {:#x} ({} bytes), UART {:#x}",
            platform.name,
            platform.memory.base,
            ram_size,
            platform.uart.base
        );
        Ok(Self::with_uart(
            LinearMemory::new(ram_size, platform.memory.base),
            SysUart::new(platform.uart.clone()),
            platform.uart.base,
        ))
    }

    fn with_uart(ram: LinearMemory, uart: SysUart, uart_base: u64) -> Self {
        Self {
            ram,
            peripherals: vec![PeripheralEntry {
                name: "uart".to_string(),
                base: uart_base,
                size: sysuart::regs::UART_SPAN as u64,
                dev: Box::new(uart),
            }],
            faults: Vec::new(),
        }
    }

    pub fn uart(&self) -> Option<&SysUart> {
        self.peripherals
            .iter()
            .filter_map(|p| p.dev.as_any())
            .find_map(|d| d.downcast_ref::<SysUart>())
    }

    pub fn uart_mut(&mut self) -> Option<&mut SysUart> {
        self.peripherals
            .iter_mut()
            .filter_map(|p| p.dev.as_any_mut())
            .find_map(|d| d.downcast_mut::<SysUart>())
    }

    pub fn reset_peripherals(&mut self) {
        for p in &mut self.peripherals {
            p.dev.reset();
        }
        self.faults.clear();
    }

    /// Faults raised through the [`sysuart::Mmio`] interface, which has no
    /// error path of its own.
    pub fn faults(&self) -> &[SimulationError] {
        &self.faults
    }

    fn peripheral_at(&mut self, addr: u64) -> Option<&mut PeripheralEntry> {
        self.peripherals.iter_mut().find(|p| p.contains(addr))
    }
}

impl crate::Bus for SystemBus {
    fn read_u8(&mut self, addr: u64) -> SimResult<u8> {
        if let Some(p) = self.peripheral_at(addr) {
            let offset = addr - p.base;
            return p.dev.read(offset);
        }
        self.ram
            .read_u8(addr)
            .ok_or(SimulationError::MemoryViolation(addr))
    }

    fn write_u8(&mut self, addr: u64, value: u8) -> SimResult<()> {
        if let Some(p) = self.peripheral_at(addr) {
            let offset = addr - p.base;
            return p.dev.write(offset, value);
        }
        if self.ram.write_u8(addr, value) {
            return Ok(());
        }
        Err(SimulationError::MemoryViolation(addr))
    }

    fn tick_peripherals(&mut self) {
        for p in &mut self.peripherals {
            p.dev.tick();
        }
    }
}

/// Lets the `sysuart` driver run directly against the model. Each register
/// access stands for the one load or store instruction that performs it, so
/// it ticks the peripherals once, matching [`crate::Machine::step`].
impl sysuart::Mmio for SystemBus {
    fn read_u8(&mut self, addr: usize) -> u8 {
        let res = crate::Bus::read_u8(self, addr as u64);
        crate::Bus::tick_peripherals(self);
        res.unwrap_or_else(|e| {
            tracing::warn!("MMIO read fault: {}", e);
            self.faults.push(e);
            0
        })
    }

    fn write_u8(&mut self, addr: usize, value: u8) {
        let res = crate::Bus::write_u8(self, addr as u64, value);
        crate::Bus::tick_peripherals(self);
        if let Err(e) = res {
            tracing::warn!("MMIO write fault: {}", e);
            self.faults.push(e);
        }
    }
}

use crate::SimResult;
use serde::Serialize;
use std::any::Any;
use std::io::{self, Write};
use sysuart::{Register, Status};
use uartcheck_config::UartModelConfig;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UartStats {
    pub stat_reads: u64,
    pub tx_writes: u64,
    /// TX writes dropped because the FIFO had no room.
    pub overruns: u64,
    /// TX writes issued while STAT was reporting TX-full.
    pub flagged_writes: u64,
}

/// Model of the SysUart soft peripheral.
///
/// Offsets follow the register map in the `sysuart` crate. The TX FIFO
/// drains one byte every `drain_interval` ticks; a write with no room is
/// dropped. RX always reads empty and CTRL is a plain latch.
#[derive(Debug)]
pub struct SysUart {
    config: UartModelConfig,
    fifo_level: usize,
    ticks: u32,
    stall_remaining: u32,
    ctrl: u8,
    accepted: Vec<u8>,
    stats: UartStats,
    echo_stdout: bool,
}

impl Default for SysUart {
    fn default() -> Self {
        Self::new(UartModelConfig::default())
    }
}

impl SysUart {
    pub fn new(config: UartModelConfig) -> Self {
        let stall_remaining = config.stall_polls;
        Self {
            config,
            fifo_level: 0,
            ticks: 0,
            stall_remaining,
            ctrl: 0,
            accepted: Vec::new(),
            stats: UartStats::default(),
            echo_stdout: false,
        }
    }

    /// Mirror every accepted byte to the host's stdout.
    pub fn set_echo(&mut self, echo: bool) {
        self.echo_stdout = echo;
    }

    /// Bytes accepted into the TX FIFO, in arrival order.
    pub fn transmitted(&self) -> &[u8] {
        &self.accepted
    }

    pub fn transmitted_lossy(&self) -> String {
        String::from_utf8_lossy(&self.accepted).into_owned()
    }

    pub fn stats(&self) -> UartStats {
        self.stats
    }

    pub fn fifo_level(&self) -> usize {
        self.fifo_level
    }

    pub fn config(&self) -> &UartModelConfig {
        &self.config
    }

    fn fifo_full(&self) -> bool {
        self.fifo_level >= self.config.fifo_depth
    }

    /// Current STAT value without side effects.
    pub fn status(&self) -> Status {
        let mut status = Status::empty();
        if self.config.stall_forever || self.stall_remaining > 0 || self.fifo_full() {
            status |= Status::TX_FIFO_FULL;
        }
        status
    }

    fn read_stat(&mut self) -> u8 {
        self.stats.stat_reads += 1;
        let status = self.status();
        if self.stall_remaining > 0 {
            self.stall_remaining -= 1;
        }
        tracing::trace!("STAT read #{} -> {:?}", self.stats.stat_reads, status);
        status.bits()
    }

    fn write_tx(&mut self, value: u8) {
        self.stats.tx_writes += 1;
        if self.status().contains(Status::TX_FIFO_FULL) {
            self.stats.flagged_writes += 1;
        }

        if self.fifo_full() {
            self.stats.overruns += 1;
            tracing::warn!(
                "TX FIFO overrun: dropped {:#04x} ({} bytes queued)",
                value,
                self.fifo_level
            );
            return;
        }

        self.fifo_level += 1;
        self.accepted.push(value);
        if self.echo_stdout {
            print!("{}", value as char);
            let _ = io::stdout().flush();
        }
    }
}

impl crate::Peripheral for SysUart {
    fn read(&mut self, offset: u64) -> SimResult<u8> {
        match Register::from_offset(offset as usize) {
            Some(Register::Stat) => Ok(self.read_stat()),
            Some(Register::Ctrl) => Ok(self.ctrl),
            // No receive path: RX FIFO reads as empty, TX FIFO is write-only.
            Some(Register::RxFifo) | Some(Register::TxFifo) | None => Ok(0),
        }
    }

    fn write(&mut self, offset: u64, value: u8) -> SimResult<()> {
        match Register::from_offset(offset as usize) {
            Some(Register::TxFifo) => self.write_tx(value),
            Some(Register::Ctrl) => self.ctrl = value,
            Some(reg) => tracing::debug!("Ignoring write of {:#04x} to {}", value, reg.name()),
            None => {}
        }
        Ok(())
    }

    fn tick(&mut self) {
        if self.fifo_level == 0 {
            self.ticks = 0;
            return;
        }
        self.ticks += 1;
        if self.ticks >= self.config.drain_interval {
            self.ticks = 0;
            self.fifo_level -= 1;
        }
    }

    fn reset(&mut self) {
        let echo = self.echo_stdout;
        *self = Self::new(self.config.clone());
        self.echo_stdout = echo;
    }

    fn as_any(&self) -> Option<&dyn Any> {
        Some(self)
    }

    fn as_any_mut(&mut self) -> Option<&mut dyn Any> {
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Peripheral;

    fn model(fifo_depth: usize, drain_interval: u32, stall_polls: u32) -> SysUart {
        SysUart::new(UartModelConfig {
            fifo_depth,
            drain_interval,
            stall_polls,
            ..UartModelConfig::default()
        })
    }

    #[test]
    fn test_stall_polls_then_clear() {
        let mut uart = model(16, 1, 2);
        assert_eq!(uart.read(0x8).unwrap(), 0x08);
        assert_eq!(uart.read(0x8).unwrap(), 0x08);
        assert_eq!(uart.read(0x8).unwrap(), 0x00);
        assert_eq!(uart.stats().stat_reads, 3);
    }

    #[test]
    fn test_fifo_fills_and_drains() {
        let mut uart = model(2, 3, 0);
        uart.write(0x4, b'a').unwrap();
        uart.write(0x4, b'b').unwrap();
        assert!(uart.status().contains(Status::TX_FIFO_FULL));

        uart.write(0x4, b'c').unwrap();
        assert_eq!(uart.stats().overruns, 1);
        assert_eq!(uart.stats().flagged_writes, 1);
        assert_eq!(uart.transmitted(), b"ab");

        for _ in 0..3 {
            uart.tick();
        }
        assert_eq!(uart.fifo_level(), 1);
        assert!(uart.status().is_empty());
    }

    #[test]
    fn test_rx_and_ctrl() {
        let mut uart = SysUart::default();
        assert_eq!(uart.read(0x0).unwrap(), 0);
        uart.write(0xc, 0x5a).unwrap();
        assert_eq!(uart.read(0xc).unwrap(), 0x5a);
        uart.write(0x0, 0x11).unwrap();
        assert!(uart.transmitted().is_empty());
    }

    #[test]
    fn test_reset_restores_power_on_state() {
        let mut uart = model(4, 1, 1);
        uart.read(0x8).unwrap();
        uart.write(0x4, b'x').unwrap();
        uart.reset();
        assert!(uart.transmitted().is_empty());
        assert_eq!(uart.stats(), UartStats::default());
        assert_eq!(uart.read(0x8).unwrap(), 0x08);
    }
}

use core::fmt;

use crate::mmio::Mmio;
use crate::regs::{Register, Status};

/// Whether the transmit routine waits for room in the TX FIFO.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowControl {
    /// Spin on STAT until the TX-full bit clears, then write.
    Polled,
    /// Write straight away. Overflow behaviour belongs to the hardware.
    Unconditional,
}

/// The bounded transmit gave up with the TX FIFO still full.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxStalled {
    pub polls: u32,
}

impl fmt::Display for TxStalled {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TX FIFO still full after {} status polls", self.polls)
    }
}

/// Send one character.
///
/// With [`FlowControl::Polled`] this blocks until the peripheral clears its
/// TX-full flag. There is no timeout.
#[inline]
pub fn put_char<M: Mmio>(uart: &mut M, c: u8, flow: FlowControl) {
    if flow == FlowControl::Polled {
        while uart.status().contains(Status::TX_FIFO_FULL) {
            core::hint::spin_loop();
        }
    }
    uart.write_reg(Register::TxFifo, c);
}

/// Polled transmit that reads STAT at most `max_polls` times.
///
/// Returns the number of status reads performed before the write. Only meant
/// for simulated peripherals, real hardware uses [`put_char`].
pub fn put_char_bounded<M: Mmio>(uart: &mut M, c: u8, max_polls: u32) -> Result<u32, TxStalled> {
    let mut polls = 0;
    while polls < max_polls {
        polls += 1;
        if !uart.status().contains(Status::TX_FIFO_FULL) {
            uart.write_reg(Register::TxFifo, c);
            return Ok(polls);
        }
    }
    Err(TxStalled { polls })
}

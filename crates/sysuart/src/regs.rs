//! SysUart register map.

use bitflags::bitflags;

/// Receive FIFO. Declared for completeness, never touched.
pub const UART_RX_FIFO: usize = 0x8000;
/// Transmit FIFO. A byte store enqueues one character.
pub const UART_TX_FIFO: usize = 0x8004;
/// Status register (read-only).
pub const UART_STAT: usize = 0x8008;
/// Control register. Declared for completeness, never touched.
pub const UART_CTRL: usize = 0x800c;

/// Base address of the register block.
pub const UART_BASE: usize = UART_RX_FIFO;
/// Size of the register block in bytes.
pub const UART_SPAN: usize = 0x10;

bitflags! {
    /// Bits of the STAT register.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Status: u8 {
        const TX_FIFO_FULL = 0x1 << 3;
    }
}

/// One register of the SysUart block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Register {
    RxFifo,
    TxFifo,
    Stat,
    Ctrl,
}

impl Register {
    pub const ALL: [Register; 4] = [
        Register::RxFifo,
        Register::TxFifo,
        Register::Stat,
        Register::Ctrl,
    ];

    /// Absolute address on the bring-up platform.
    pub const fn addr(self) -> usize {
        match self {
            Register::RxFifo => UART_RX_FIFO,
            Register::TxFifo => UART_TX_FIFO,
            Register::Stat => UART_STAT,
            Register::Ctrl => UART_CTRL,
        }
    }

    /// Offset from the start of the register block.
    pub const fn offset(self) -> usize {
        self.addr() - UART_BASE
    }

    /// Decode a byte offset within the block. Only the first byte of each
    /// 32-bit slot is backed by a register.
    pub const fn from_offset(offset: usize) -> Option<Register> {
        match offset {
            0x0 => Some(Register::RxFifo),
            0x4 => Some(Register::TxFifo),
            0x8 => Some(Register::Stat),
            0xc => Some(Register::Ctrl),
            _ => None,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Register::RxFifo => "RX_FIFO",
            Register::TxFifo => "TX_FIFO",
            Register::Stat => "STAT",
            Register::Ctrl => "CTRL",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_addresses() {
        assert_eq!(Register::RxFifo.addr(), 0x8000);
        assert_eq!(Register::TxFifo.addr(), 0x8004);
        assert_eq!(Register::Stat.addr(), 0x8008);
        assert_eq!(Register::Ctrl.addr(), 0x800c);
    }

    #[test]
    fn test_offset_decoding() {
        for reg in Register::ALL {
            assert_eq!(Register::from_offset(reg.offset()), Some(reg));
        }
        assert_eq!(Register::from_offset(0x1), None);
        assert_eq!(Register::from_offset(UART_SPAN), None);
    }

    #[test]
    fn test_tx_full_bit() {
        assert_eq!(Status::TX_FIFO_FULL.bits(), 8);
        assert!(Status::from_bits_truncate(0xff).contains(Status::TX_FIFO_FULL));
        assert!(!Status::from_bits_truncate(0xf7).contains(Status::TX_FIFO_FULL));
    }
}

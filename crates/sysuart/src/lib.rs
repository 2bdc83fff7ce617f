//! Sanity check for the SysUart soft peripheral.
//!
//! The firmware writes a fixed greeting to the TX FIFO at `0x8004`, one byte
//! at a time, optionally waiting on the TX-full bit of `STAT` before each
//! byte. Everything here is `no_std`; the register accesses go through
//! [`Mmio`] so the same code runs on the soft-core and against the host
//! model in `uartcheck-core`.

#![no_std]

pub mod mmio;
pub mod regs;
pub mod transmit;

use core::ffi::CStr;

pub use mmio::{Mmio, Volatile};
pub use regs::{Register, Status};
pub use transmit::{put_char, put_char_bounded, FlowControl, TxStalled};

/// Greeting sent by the flow-controlled image.
pub const FLOW_CONTROLLED_GREETING: &CStr = c"Hello, World! Hello, World!\r\n";
/// Greeting sent by the unconditional image.
pub const UNCONDITIONAL_GREETING: &CStr = c"Hello, World!\r\n";

/// The two builds of the bring-up image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    FlowControlled,
    Unconditional,
}

impl Variant {
    pub const fn flow_control(self) -> FlowControl {
        match self {
            Variant::FlowControlled => FlowControl::Polled,
            Variant::Unconditional => FlowControl::Unconditional,
        }
    }

    pub const fn greeting(self) -> &'static CStr {
        match self {
            Variant::FlowControlled => FLOW_CONTROLLED_GREETING,
            Variant::Unconditional => UNCONDITIONAL_GREETING,
        }
    }
}

/// Transmit `message` up to its terminator and return the exit code.
///
/// The code is always 0.
pub fn run<M: Mmio>(uart: &mut M, message: &CStr, flow: FlowControl) -> i32 {
    for &c in message.to_bytes() {
        put_char(uart, c, flow);
    }
    0
}

/// Run the image for `variant` with its own greeting.
pub fn run_variant<M: Mmio>(uart: &mut M, variant: Variant) -> i32 {
    run(uart, variant.greeting(), variant.flow_control())
}

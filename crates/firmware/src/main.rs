#![no_std]
#![no_main]

use panic_halt as _;
use riscv_rt::entry;
use sysuart::{Variant, Volatile};

#[cfg(not(feature = "unconditional"))]
const VARIANT: Variant = Variant::FlowControlled;
#[cfg(feature = "unconditional")]
const VARIANT: Variant = Variant::Unconditional;

#[entry]
fn main() -> ! {
    // SAFETY: the SysUart block is mapped at 0x8000..0x8010 on this board.
    let mut uart = unsafe { Volatile::new() };
    let code = sysuart::run_variant(&mut uart, VARIANT);
    exit(code)
}

/// Hand the exit code to an attached debugger or simulator in `a0`.
fn exit(code: i32) -> ! {
    // SAFETY: `ebreak` only traps; without a debugger the default trap
    // handler parks the hart.
    unsafe { core::arch::asm!("ebreak", in("a0") code) };
    loop {}
}

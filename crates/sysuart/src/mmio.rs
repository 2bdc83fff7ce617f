use crate::regs::{Register, Status};

/// Byte-wide access to memory-mapped registers.
///
/// Every call must reach the device: implementations may not cache reads or
/// merge writes.
pub trait Mmio {
    fn read_u8(&mut self, addr: usize) -> u8;
    fn write_u8(&mut self, addr: usize, value: u8);

    fn read_reg(&mut self, reg: Register) -> u8 {
        self.read_u8(reg.addr())
    }

    fn write_reg(&mut self, reg: Register, value: u8) {
        self.write_u8(reg.addr(), value)
    }

    /// Sample the status register once.
    fn status(&mut self) -> Status {
        Status::from_bits_truncate(self.read_reg(Register::Stat))
    }
}

/// Direct volatile loads and stores on the physical address space.
#[derive(Debug)]
pub struct Volatile {
    _private: (),
}

impl Volatile {
    /// # Safety
    ///
    /// Every address passed to [`Mmio::read_u8`] and [`Mmio::write_u8`] MUST
    /// be backed by a memory-mapped device (or memory) for the lifetime of
    /// the returned value.
    pub const unsafe fn new() -> Self {
        Volatile { _private: () }
    }
}

impl Mmio for Volatile {
    #[inline(always)]
    fn read_u8(&mut self, addr: usize) -> u8 {
        // SAFETY: guaranteed by the caller of `Volatile::new`.
        unsafe { core::ptr::read_volatile(addr as *const u8) }
    }

    #[inline(always)]
    fn write_u8(&mut self, addr: usize, value: u8) {
        // SAFETY: guaranteed by the caller of `Volatile::new`.
        unsafe { core::ptr::write_volatile(addr as *mut u8, value) }
    }
}

impl<M: Mmio + ?Sized> Mmio for &mut M {
    fn read_u8(&mut self, addr: usize) -> u8 {
        (**self).read_u8(addr)
    }

    fn write_u8(&mut self, addr: usize, value: u8) {
        (**self).write_u8(addr, value)
    }
}

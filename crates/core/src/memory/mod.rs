use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};

/// Largest span `ProgramImage::flatten` will materialize.
pub const MAX_FLAT_SPAN: u64 = 16 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub start_addr: u64,
    pub data: Vec<u8>,
}

impl Segment {
    /// One past the last byte, or `None` if that wraps the address space.
    pub fn end_addr(&self) -> Option<u64> {
        self.start_addr.checked_add(self.data.len() as u64)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramImage {
    pub entry_point: u64,
    pub segments: Vec<Segment>,
}

impl ProgramImage {
    pub fn new(entry_point: u64) -> Self {
        Self {
            entry_point,
            segments: Vec::new(),
        }
    }

    pub fn add_segment(&mut self, start_addr: u64, data: Vec<u8>) {
        self.segments.push(Segment { start_addr, data });
    }

    /// Lowest address covered by any segment.
    pub fn base_addr(&self) -> Option<u64> {
        self.segments.iter().map(|s| s.start_addr).min()
    }

    /// Lay all segments out in one buffer starting at [`Self::base_addr`].
    /// Gaps are zero-filled; later segments win where they overlap.
    pub fn flatten(&self) -> anyhow::Result<(u64, Vec<u8>)> {
        let base = self.base_addr().context("Image has no loadable data")?;
        let mut end = base;
        for segment in &self.segments {
            let seg_end = segment.end_addr().with_context(|| {
                format!("Segment at {:#x} wraps the address space", segment.start_addr)
            })?;
            end = end.max(seg_end);
        }
        if end - base > MAX_FLAT_SPAN {
            bail!(
                "Image spans {:#x}..{:#x}, more than {} bytes",
                base,
                end,
                MAX_FLAT_SPAN
            );
        }

        let mut data = vec![0; (end - base) as usize];
        for segment in &self.segments {
            let offset = (segment.start_addr - base) as usize;
            data[offset..offset + segment.data.len()].copy_from_slice(&segment.data);
        }
        Ok((base, data))
    }
}

/// A simple flat memory storage
pub struct LinearMemory {
    pub data: Vec<u8>,
    pub base_addr: u64,
}

impl LinearMemory {
    pub fn new(size: usize, base_addr: u64) -> Self {
        Self {
            data: vec![0; size],
            base_addr,
        }
    }

    pub fn contains(&self, addr: u64) -> bool {
        addr >= self.base_addr && addr < self.base_addr + self.data.len() as u64
    }

    pub fn read_u8(&self, addr: u64) -> Option<u8> {
        if self.contains(addr) {
            Some(self.data[(addr - self.base_addr) as usize])
        } else {
            None
        }
    }

    pub fn write_u8(&mut self, addr: u64, value: u8) -> bool {
        if self.contains(addr) {
            self.data[(addr - self.base_addr) as usize] = value;
            true
        } else {
            false
        }
    }

    pub fn load_from_segment(&mut self, segment: &Segment) -> bool {
        let mem_end = self.base_addr + self.data.len() as u64;

        let fits = segment.end_addr().is_some_and(|end| end <= mem_end);
        if segment.start_addr >= self.base_addr && fits {
            let offset = (segment.start_addr - self.base_addr) as usize;
            self.data[offset..offset + segment.data.len()].copy_from_slice(&segment.data);
            return true;
        }
        false
    }
}

pub mod hex;

use anyhow::{anyhow, Context, Result};
use goblin::elf::header::ELFMAG;
use goblin::elf::program_header::PT_LOAD;
use goblin::elf::Elf;
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};
use uartcheck_core::memory::ProgramImage;

/// Images are for an RV32 core: segments must end at or below 4 GiB.
const ADDRESS_SPACE_END: u64 = 1 << 32;

pub fn load_elf(path: &Path) -> Result<ProgramImage> {
    let buffer = fs::read(path).with_context(|| format!("Failed to read ELF file: {:?}", path))?;
    parse_elf(&buffer)
}

pub fn parse_elf(buffer: &[u8]) -> Result<ProgramImage> {
    let elf = Elf::parse(buffer).context("Failed to parse ELF binary")?;

    info!("ELF Entry Point: {:#x}", elf.entry);

    let mut program_image = ProgramImage::new(elf.entry);

    for ph in &elf.program_headers {
        if ph.p_type != PT_LOAD {
            continue;
        }

        // LMA: where the bytes sit in the memory image.
        let start_addr = ph.p_paddr;
        let size = ph.p_filesz as usize;
        let offset = ph.p_offset as usize;

        if size == 0 {
            continue;
        }

        debug!(
            "Found Loadable Segment: Addr={:#x}, Size={} bytes, Offset={:#x}",
            start_addr, size, offset
        );

        let end = offset
            .checked_add(size)
            .filter(|&end| end <= buffer.len())
            .ok_or_else(|| anyhow!("Segment at {:#x} out of bounds in ELF file", start_addr))?;

        start_addr
            .checked_add(size as u64)
            .filter(|&seg_end| seg_end <= ADDRESS_SPACE_END)
            .ok_or_else(|| {
                anyhow!(
                    "Segment at {:#x} ({} bytes) is outside the 32-bit address space",
                    start_addr,
                    size
                )
            })?;

        program_image.add_segment(start_addr, buffer[offset..end].to_vec());
    }

    if program_image.segments.is_empty() {
        warn!("No loadable segments found in ELF file");
    }

    Ok(program_image)
}

/// ELF if the file carries the ELF magic, otherwise a raw image at `raw_base`.
pub fn load_image(path: &Path, raw_base: u64) -> Result<ProgramImage> {
    let buffer = fs::read(path).with_context(|| format!("Failed to read firmware: {:?}", path))?;
    if buffer.starts_with(ELFMAG) {
        return parse_elf(&buffer);
    }
    debug!("{:?} has no ELF header, loading as raw binary", path);
    Ok(raw_image(buffer, raw_base))
}

fn raw_image(data: Vec<u8>, base: u64) -> ProgramImage {
    info!("Raw image: {} bytes at {:#x}", data.len(), base);
    let mut image = ProgramImage::new(base);
    if data.is_empty() {
        warn!("Raw image is empty");
    } else {
        image.add_segment(base, data);
    }
    image
}

/// Raw memory image: the whole file as one segment at `base`, entry at `base`.
pub fn load_raw(path: &Path, base: u64) -> Result<ProgramImage> {
    let data = fs::read(path).with_context(|| format!("Failed to read binary: {:?}", path))?;
    Ok(raw_image(data, base))
}

//! Verilog `$readmemh` images for the soft-core's program RAM.
//!
//! The memory is 32 bits wide, so the image starts with a word address
//! (`@` + byte offset / 4) followed by one little-endian word per line.

use anyhow::{bail, Result};
use std::fmt::Write;
use uartcheck_core::memory::ProgramImage;

/// Default load offset of the bring-up RAM.
pub const DEFAULT_OFFSET: u64 = 0x1000;

pub fn to_readmemh(data: &[u8], offset: u64) -> Result<String> {
    if offset % 4 != 0 {
        bail!("Offset {:#x} is not word aligned", offset);
    }

    let mut out = String::with_capacity(10 + data.len() / 4 * 9);
    // Writing to a String cannot fail.
    let _ = writeln!(out, "@{:08x}", offset >> 2);
    for chunk in data.chunks(4) {
        let mut word = [0u8; 4];
        word[..chunk.len()].copy_from_slice(chunk);
        let _ = writeln!(out, "{:08x}", u32::from_le_bytes(word));
    }
    Ok(out)
}

/// Flatten an image and render it. `offset` overrides the image's lowest
/// address; the flattened bytes are placed there unchanged.
pub fn image_to_readmemh(image: &ProgramImage, offset: Option<u64>) -> Result<String> {
    let (base, data) = image.flatten()?;
    tracing::debug!("Flattened image: {} bytes from {:#x}", data.len(), base);
    to_readmemh(&data, offset.unwrap_or(base))
}

#![allow(dead_code)]

use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

pub use uartcheck_core::test_support::greeter_code;

pub const POLLED_GREETING: &[u8] = b"Hello, World! Hello, World!\r\n";
pub const UNCONDITIONAL_GREETING: &[u8] = b"Hello, World!\r\n";

/// Fresh directory under the system temp dir.
pub fn scratch_dir(prefix: &str) -> PathBuf {
    let nonce = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let dir = std::env::temp_dir()
        .join("uartcheck-tests")
        .join(format!("{}-{}", prefix, nonce));
    std::fs::create_dir_all(&dir).expect("Failed to create scratch dir");
    dir
}

/// Little-endian ELF32 RISC-V executable with a single PT_LOAD segment.
pub fn build_elf(addr: u32, payload: &[u8]) -> Vec<u8> {
    let ehsize = 52u32;
    let phentsize = 32u32;
    let data_offset = ehsize + phentsize;

    let mut out = Vec::new();
    out.extend_from_slice(&[0x7f, b'E', b'L', b'F', 1, 1, 1, 0]);
    out.extend_from_slice(&[0; 8]);
    out.extend_from_slice(&2u16.to_le_bytes()); // ET_EXEC
    out.extend_from_slice(&0xf3u16.to_le_bytes()); // EM_RISCV
    out.extend_from_slice(&1u32.to_le_bytes());
    out.extend_from_slice(&addr.to_le_bytes()); // e_entry
    out.extend_from_slice(&ehsize.to_le_bytes()); // e_phoff
    out.extend_from_slice(&0u32.to_le_bytes()); // e_shoff
    out.extend_from_slice(&0u32.to_le_bytes()); // e_flags
    out.extend_from_slice(&(ehsize as u16).to_le_bytes());
    out.extend_from_slice(&(phentsize as u16).to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes()); // e_phnum
    out.extend_from_slice(&40u16.to_le_bytes()); // e_shentsize
    out.extend_from_slice(&0u16.to_le_bytes()); // e_shnum
    out.extend_from_slice(&0u16.to_le_bytes()); // e_shstrndx

    let len = payload.len() as u32;
    for field in [1, data_offset, addr, addr, len, len, 5, 4] {
        out.extend_from_slice(&field.to_le_bytes());
    }
    out.extend_from_slice(payload);
    out
}

/// Writes the polled or unconditional greeter ELF into `dir`.
pub fn write_greeter_elf(dir: &std::path::Path, polled: bool) -> PathBuf {
    let (name, message) = if polled {
        ("hello-polled.elf", POLLED_GREETING)
    } else {
        ("hello-unconditional.elf", UNCONDITIONAL_GREETING)
    };
    let path = dir.join(name);
    std::fs::write(&path, build_elf(0x1000, &greeter_code(message, polled)))
        .expect("Failed to write firmware");
    path
}

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct MemoryRange {
    pub base: u64,
    pub size: String, // e.g. "28KiB"
}

/// Behaviour of the simulated SysUart block.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct UartModelConfig {
    #[serde(default = "default_uart_base")]
    pub base: u64,
    /// Bytes the TX FIFO holds before STAT reports full.
    #[serde(default = "default_fifo_depth")]
    pub fifo_depth: usize,
    /// Peripheral ticks per byte shifted out of the TX FIFO.
    #[serde(default = "default_drain_interval")]
    pub drain_interval: u32,
    /// Force TX-full for this many STAT reads after reset.
    #[serde(default)]
    pub stall_polls: u32,
    /// Keep TX-full set forever.
    #[serde(default)]
    pub stall_forever: bool,
}

fn default_uart_base() -> u64 {
    0x8000
}

fn default_fifo_depth() -> usize {
    16
}

fn default_drain_interval() -> u32 {
    1
}

impl Default for UartModelConfig {
    fn default() -> Self {
        Self {
            base: default_uart_base(),
            fifo_depth: default_fifo_depth(),
            drain_interval: default_drain_interval(),
            stall_polls: 0,
            stall_forever: false,
        }
    }
}

/// Memory map of the board the image runs on.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PlatformDescriptor {
    pub name: String,
    pub memory: MemoryRange,
    #[serde(default)]
    pub uart: UartModelConfig,
}

impl Default for PlatformDescriptor {
    fn default() -> Self {
        Self {
            name: "sysuart-bringup".to_string(),
            memory: MemoryRange {
                base: 0x1000,
                size: "28KiB".to_string(),
            },
            uart: UartModelConfig::default(),
        }
    }
}

/// Bytes decoded by the SysUart register block.
const UART_BLOCK_SIZE: u64 = 0x10;

/// The simulated core is RV32: everything must sit below 4 GiB.
const ADDRESS_SPACE_END: u64 = 1 << 32;

fn region_end(what: &str, base: u64, size: u64) -> Result<u64> {
    base.checked_add(size)
        .filter(|&end| end <= ADDRESS_SPACE_END)
        .with_context(|| {
            format!(
                "{} region {:#x} + {:#x} does not fit the 32-bit address space",
                what, base, size
            )
        })
}

impl PlatformDescriptor {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let f = std::fs::File::open(&path)
            .with_context(|| format!("Failed to open platform descriptor at {:?}", path.as_ref()))?;
        let platform: Self =
            serde_yaml::from_reader(f).context("Failed to parse Platform Descriptor")?;
        platform.validate()?;
        Ok(platform)
    }

    pub fn memory_size(&self) -> Result<u64> {
        parse_size(&self.memory.size)
    }

    pub fn validate(&self) -> Result<()> {
        let mem_size = self.memory_size()?;
        if mem_size == 0 {
            anyhow::bail!("Memory size must be greater than zero");
        }
        if self.uart.fifo_depth == 0 {
            anyhow::bail!("UART 'fifo_depth' must be greater than zero");
        }
        if self.uart.drain_interval == 0 {
            anyhow::bail!("UART 'drain_interval' must be greater than zero");
        }

        let mem_end = region_end("Memory", self.memory.base, mem_size)?;
        let uart_end = region_end("UART", self.uart.base, UART_BLOCK_SIZE)?;
        if self.uart.base < mem_end && self.memory.base < uart_end {
            anyhow::bail!(
                "UART block at {:#x} overlaps memory {:#x}..{:#x}",
                self.uart.base,
                self.memory.base,
                mem_end
            );
        }
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct CheckInputs {
    pub firmware: String,
    pub platform: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct CheckLimits {
    pub max_steps: u64,
    #[serde(default)]
    pub wall_time_ms: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    MaxSteps,
    WallTime,
    MemoryViolation,
    DecodeError,
    Halt,
    NoProgress,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct UartContainsAssertion {
    pub uart_contains: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct UartEqualsAssertion {
    pub uart_equals: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct StopReasonAssertion {
    pub expected_stop_reason: StopReason,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct ExitCodeAssertion {
    pub expected_exit_code: i32,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct MaxOverrunsAssertion {
    pub max_overruns: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(untagged)]
pub enum CheckAssertion {
    UartContains(UartContainsAssertion),
    UartEquals(UartEqualsAssertion),
    ExpectedStopReason(StopReasonAssertion),
    ExpectedExitCode(ExitCodeAssertion),
    MaxOverruns(MaxOverrunsAssertion),
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct CheckScript {
    pub schema_version: String,
    pub inputs: CheckInputs,
    pub limits: CheckLimits,
    #[serde(default)]
    pub assertions: Vec<CheckAssertion>,
}

impl CheckScript {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let f = std::fs::File::open(&path)
            .with_context(|| format!("Failed to open check script at {:?}", path.as_ref()))?;
        let script: Self =
            serde_yaml::from_reader(f).context("Failed to parse Check Script YAML")?;
        script.validate()?;
        Ok(script)
    }

    pub fn validate(&self) -> Result<()> {
        if self.schema_version != "1.0" {
            anyhow::bail!(
                "Unsupported schema_version '{}'. Supported versions: '1.0'",
                self.schema_version
            );
        }

        if self.inputs.firmware.trim().is_empty() {
            anyhow::bail!("Input 'firmware' path cannot be empty");
        }

        if self.limits.max_steps == 0 {
            anyhow::bail!("Limit 'max_steps' must be greater than zero");
        }

        Ok(())
    }

    /// Firmware path, relative paths taken from the script's directory.
    pub fn firmware_path(&self, script_path: &Path) -> PathBuf {
        resolve_relative(script_path, &self.inputs.firmware)
    }

    pub fn platform_path(&self, script_path: &Path) -> Option<PathBuf> {
        self.inputs
            .platform
            .as_deref()
            .map(|p| resolve_relative(script_path, p))
    }
}

fn resolve_relative(script_path: &Path, target: &str) -> PathBuf {
    let target = Path::new(target);
    if target.is_absolute() {
        return target.to_path_buf();
    }
    script_path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(target)
}

pub fn parse_size(size_str: &str) -> Result<u64> {
    use human_size::{Byte, Size, SpecificSize};
    let s: Size = size_str
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid size format: {}", e))?;
    let bytes: SpecificSize<Byte> = s.into();
    Ok(bytes.value() as u64)
}

/// Parse an address written as hex, with or without a `0x` prefix.
pub fn parse_hex_u64(s: &str) -> Result<u64> {
    let digits = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    u64::from_str_radix(digits, 16).with_context(|| format!("Invalid hex number '{}'", s))
}

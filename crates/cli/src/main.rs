use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use tracing::{error, info};

use uartcheck_config::{CheckAssertion, CheckScript, PlatformDescriptor, StopReason};
use uartcheck_core::bus::SystemBus;
use uartcheck_core::cpu::RiscV;
use uartcheck_core::peripherals::UartStats;
use uartcheck_core::{Machine, RunLimits, RunOutcome};
use uartcheck_loader::hex;

const EXIT_PASS: u8 = 0;
const EXIT_ASSERT_FAIL: u8 = 1;
const EXIT_CONFIG_ERROR: u8 = 2;

const MAX_ALLOWED_STEPS: u64 = 50_000_000;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "uartcheck - SysUart bring-up simulator",
    long_about = None
)]
struct Cli {
    /// Enable instruction-level execution tracing
    #[arg(short, long, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a firmware image on the simulated platform
    Run(RunArgs),
    /// Run a check script and evaluate its assertions
    Test(TestArgs),
    /// Convert a raw binary to a $readmemh image
    Bin2hex(HexArgs),
    /// Convert the loadable segments of an ELF to a $readmemh image
    Elf2hex(HexArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Path to the firmware (ELF, or a raw binary loaded at the RAM base)
    #[arg(short, long)]
    firmware: PathBuf,

    /// Path to the platform descriptor (YAML)
    #[arg(short, long)]
    platform: Option<PathBuf>,

    /// Maximum number of steps to execute
    #[arg(long, default_value = "1000000")]
    max_steps: u64,

    /// Do not mirror UART output to stdout
    #[arg(long)]
    no_uart_stdout: bool,
}

#[derive(Args, Debug)]
struct TestArgs {
    /// Path to the check script (YAML)
    #[arg(short, long)]
    script: PathBuf,

    /// Directory for result.json
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Do not mirror UART output to stdout
    #[arg(long)]
    no_uart_stdout: bool,
}

#[derive(Args, Debug)]
struct HexArgs {
    #[arg(short, long)]
    input: PathBuf,

    #[arg(short, long)]
    output: PathBuf,

    /// Load offset in hex (default: 0x1000 for raw, lowest segment for ELF)
    #[arg(long)]
    offset: Option<String>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.trace {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .with_writer(std::io::stderr)
            .init();
    }

    let result = match cli.command {
        Command::Run(args) => run_interactive(args),
        Command::Test(args) => Ok(run_test(args)),
        Command::Bin2hex(args) => bin2hex(args),
        Command::Elf2hex(args) => elf2hex(args),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            error!("{:#}", e);
            ExitCode::from(EXIT_CONFIG_ERROR)
        }
    }
}

fn load_platform(path: Option<&Path>) -> anyhow::Result<PlatformDescriptor> {
    match path {
        Some(path) => {
            info!("Loading platform descriptor: {:?}", path);
            PlatformDescriptor::from_file(path)
        }
        None => {
            info!("Using default platform");
            Ok(PlatformDescriptor::default())
        }
    }
}

fn build_machine(
    platform: &PlatformDescriptor,
    firmware: &Path,
    echo: bool,
) -> anyhow::Result<Machine<RiscV>> {
    let mut bus = SystemBus::from_config(platform)?;
    if let Some(uart) = bus.uart_mut() {
        uart.set_echo(echo);
    }

    info!("Loading firmware: {:?}", firmware);
    let program = uartcheck_loader::load_image(firmware, platform.memory.base)?;
    info!("Entry Point: {:#x}", program.entry_point);

    let mut machine = Machine::<RiscV>::with_bus(bus);
    machine
        .load_firmware(&program)
        .context("Failed to load firmware into memory")?;
    Ok(machine)
}

fn run_interactive(args: RunArgs) -> anyhow::Result<u8> {
    if args.max_steps > MAX_ALLOWED_STEPS {
        anyhow::bail!(
            "max_steps {} exceeds the limit of {}",
            args.max_steps,
            MAX_ALLOWED_STEPS
        );
    }

    let platform = load_platform(args.platform.as_deref())?;
    let mut machine = build_machine(&platform, &args.firmware, !args.no_uart_stdout)?;

    info!("Running for at most {} steps...", args.max_steps);
    let outcome = machine.run(&RunLimits::steps(args.max_steps));
    report(&machine, &outcome);

    Ok(EXIT_PASS)
}

fn report(machine: &Machine<RiscV>, outcome: &RunOutcome) {
    info!(
        "Stopped: {:?} after {} steps, exit code {:?}",
        outcome.stop_reason, outcome.steps, outcome.exit_code
    );
    if let Some(uart) = machine.bus.uart() {
        let stats = uart.stats();
        info!(
            "UART: {} bytes sent, {} STAT polls, {} overruns",
            uart.transmitted().len(),
            stats.stat_reads,
            stats.overruns
        );
    }
}

#[derive(Debug, Serialize)]
struct AssertionResult {
    assertion: CheckAssertion,
    passed: bool,
}

#[derive(Debug, Serialize)]
struct ResultConfig {
    firmware: String,
    platform: Option<String>,
    max_steps: u64,
    wall_time_ms: Option<u64>,
}

#[derive(Debug, Serialize)]
struct TestResult {
    status: &'static str,
    stop_reason: StopReason,
    steps: u64,
    exit_code: Option<i32>,
    uart_output: String,
    #[serde(flatten)]
    uart_stats: UartStats,
    assertions: Vec<AssertionResult>,
    firmware_hash: String,
    config: ResultConfig,
}

fn evaluate(
    assertion: &CheckAssertion,
    outcome: &RunOutcome,
    uart_output: &str,
    stats: &UartStats,
) -> bool {
    match assertion {
        CheckAssertion::UartContains(a) => uart_output.contains(&a.uart_contains),
        CheckAssertion::UartEquals(a) => uart_output == a.uart_equals,
        CheckAssertion::ExpectedStopReason(a) => outcome.stop_reason == a.expected_stop_reason,
        CheckAssertion::ExpectedExitCode(a) => outcome.exit_code == Some(a.expected_exit_code),
        CheckAssertion::MaxOverruns(a) => stats.overruns <= a.max_overruns,
    }
}

fn run_test(args: TestArgs) -> u8 {
    let script = match CheckScript::from_file(&args.script) {
        Ok(script) => script,
        Err(e) => {
            error!("{:#}", e);
            return EXIT_CONFIG_ERROR;
        }
    };

    if script.limits.max_steps > MAX_ALLOWED_STEPS {
        error!(
            "max_steps {} exceeds the limit of {}",
            script.limits.max_steps, MAX_ALLOWED_STEPS
        );
        return EXIT_CONFIG_ERROR;
    }

    match execute_script(&script, &args) {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            EXIT_CONFIG_ERROR
        }
    }
}

fn execute_script(script: &CheckScript, args: &TestArgs) -> anyhow::Result<u8> {
    let firmware_path = script.firmware_path(&args.script);
    let platform_path = script.platform_path(&args.script);

    let firmware_bytes = std::fs::read(&firmware_path)
        .with_context(|| format!("Failed to read firmware: {:?}", firmware_path))?;
    let firmware_hash = format!("{:x}", Sha256::digest(&firmware_bytes));

    let platform = load_platform(platform_path.as_deref())?;
    let mut machine = build_machine(&platform, &firmware_path, !args.no_uart_stdout)?;

    let limits = RunLimits {
        max_steps: script.limits.max_steps,
        wall_time: script.limits.wall_time_ms.map(Duration::from_millis),
    };
    let outcome = machine.run(&limits);
    report(&machine, &outcome);

    let (uart_output, uart_stats) = match machine.bus.uart() {
        Some(uart) => (uart.transmitted_lossy(), uart.stats()),
        None => (String::new(), UartStats::default()),
    };

    let assertions: Vec<AssertionResult> = script
        .assertions
        .iter()
        .map(|assertion| {
            let passed = evaluate(assertion, &outcome, &uart_output, &uart_stats);
            if !passed {
                error!("Assertion failed: {:?}", assertion);
            }
            AssertionResult {
                assertion: assertion.clone(),
                passed,
            }
        })
        .collect();

    let passed = assertions.iter().all(|a| a.passed);
    let result = TestResult {
        status: if passed { "pass" } else { "fail" },
        stop_reason: outcome.stop_reason,
        steps: outcome.steps,
        exit_code: outcome.exit_code,
        uart_output,
        uart_stats,
        assertions,
        firmware_hash,
        config: ResultConfig {
            firmware: firmware_path.display().to_string(),
            platform: platform_path.map(|p| p.display().to_string()),
            max_steps: script.limits.max_steps,
            wall_time_ms: script.limits.wall_time_ms,
        },
    };

    if let Some(dir) = &args.output_dir {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create output directory {:?}", dir))?;
        let path = dir.join("result.json");
        let json = serde_json::to_string_pretty(&result)?;
        std::fs::write(&path, json).with_context(|| format!("Failed to write {:?}", path))?;
        info!("Wrote {:?}", path);
    }

    info!("Test {}", result.status.to_uppercase());
    Ok(if passed { EXIT_PASS } else { EXIT_ASSERT_FAIL })
}

fn parse_offset(offset: Option<&str>) -> anyhow::Result<Option<u64>> {
    offset
        .map(|s| uartcheck_config::parse_hex_u64(s).with_context(|| format!("Bad offset '{}'", s)))
        .transpose()
}

fn write_hex(path: &Path, text: &str) -> anyhow::Result<u8> {
    std::fs::write(path, text).with_context(|| format!("Failed to write {:?}", path))?;
    info!("Wrote {:?}", path);
    Ok(EXIT_PASS)
}

fn bin2hex(args: HexArgs) -> anyhow::Result<u8> {
    let offset = parse_offset(args.offset.as_deref())?.unwrap_or(hex::DEFAULT_OFFSET);
    let data = std::fs::read(&args.input)
        .with_context(|| format!("Failed to read binary: {:?}", args.input))?;
    info!("Converting {:?} at offset {:#x}", args.input, offset);
    write_hex(&args.output, &hex::to_readmemh(&data, offset)?)
}

fn elf2hex(args: HexArgs) -> anyhow::Result<u8> {
    let offset = parse_offset(args.offset.as_deref())?;
    let image = uartcheck_loader::load_elf(&args.input)?;
    write_hex(&args.output, &hex::image_to_readmemh(&image, offset)?)
}

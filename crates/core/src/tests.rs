#[cfg(test)]
mod tests {
    use crate::bus::SystemBus;
    use crate::cpu::RiscV;
    use crate::memory::ProgramImage;
    use crate::{Machine, RunLimits, StopReason};
    use std::ffi::CStr;
    use sysuart::{FlowControl, Variant, FLOW_CONTROLLED_GREETING, UNCONDITIONAL_GREETING};
    use uartcheck_config::{PlatformDescriptor, UartModelConfig};

    fn bus_with(uart: UartModelConfig) -> SystemBus {
        let platform = PlatformDescriptor {
            uart,
            ..PlatformDescriptor::default()
        };
        SystemBus::from_config(&platform).unwrap()
    }

    fn slow_uart() -> UartModelConfig {
        UartModelConfig {
            fifo_depth: 2,
            drain_interval: 50,
            ..UartModelConfig::default()
        }
    }

    // Driver running directly against the model.

    #[test]
    fn test_unconditional_three_bytes() {
        let mut bus = SystemBus::new();
        let code = sysuart::run(&mut bus, c"A\r\n", FlowControl::Unconditional);

        let uart = bus.uart().unwrap();
        assert_eq!(code, 0);
        assert_eq!(uart.transmitted(), b"A\r\n");
        assert_eq!(uart.stats().tx_writes, 3);
        assert_eq!(uart.stats().stat_reads, 0);
    }

    #[test]
    fn test_empty_string_writes_nothing() {
        for flow in [FlowControl::Polled, FlowControl::Unconditional] {
            let mut bus = SystemBus::new();
            assert_eq!(sysuart::run(&mut bus, c"", flow), 0);
            let stats = bus.uart().unwrap().stats();
            assert_eq!(stats.tx_writes, 0);
            assert_eq!(stats.stat_reads, 0);
        }
    }

    #[test]
    fn test_polled_reads_status_until_clear() {
        let mut bus = bus_with(UartModelConfig {
            stall_polls: 2,
            ..UartModelConfig::default()
        });
        sysuart::put_char(&mut bus, b'H', FlowControl::Polled);

        let uart = bus.uart().unwrap();
        assert_eq!(uart.stats().stat_reads, 3);
        assert_eq!(uart.stats().tx_writes, 1);
        assert_eq!(uart.stats().flagged_writes, 0);
        assert_eq!(uart.transmitted(), b"H");
    }

    #[test]
    fn test_variants_emit_their_greeting() {
        for (variant, greeting) in [
            (Variant::FlowControlled, FLOW_CONTROLLED_GREETING),
            (Variant::Unconditional, UNCONDITIONAL_GREETING),
        ] {
            let mut bus = SystemBus::new();
            assert_eq!(sysuart::run_variant(&mut bus, variant), 0);
            let uart = bus.uart().unwrap();
            assert_eq!(uart.transmitted(), greeting.to_bytes());
            assert_eq!(uart.stats().tx_writes, greeting.to_bytes().len() as u64);
        }
        assert_eq!(
            FLOW_CONTROLLED_GREETING.to_bytes(),
            b"Hello, World! Hello, World!\r\n"
        );
        assert_eq!(UNCONDITIONAL_GREETING.to_bytes(), b"Hello, World!\r\n");
    }

    #[test]
    fn test_flow_control_survives_slow_line() {
        let mut bus = bus_with(slow_uart());
        sysuart::run_variant(&mut bus, Variant::FlowControlled);

        let uart = bus.uart().unwrap();
        assert_eq!(uart.transmitted(), FLOW_CONTROLLED_GREETING.to_bytes());
        assert_eq!(uart.stats().overruns, 0);
        assert_eq!(uart.stats().flagged_writes, 0);
    }

    #[test]
    fn test_unconditional_overruns_slow_line() {
        let mut bus = bus_with(slow_uart());
        sysuart::run(&mut bus, FLOW_CONTROLLED_GREETING, FlowControl::Unconditional);

        let uart = bus.uart().unwrap();
        assert!(uart.stats().overruns > 0);
        assert_eq!(uart.transmitted(), b"He");
    }

    #[test]
    fn test_rerun_after_reset_is_identical() {
        let mut bus = bus_with(UartModelConfig {
            stall_polls: 3,
            ..slow_uart()
        });
        sysuart::run_variant(&mut bus, Variant::FlowControlled);
        let first = bus.uart().unwrap().transmitted().to_vec();
        let first_stats = bus.uart().unwrap().stats();

        bus.reset_peripherals();
        sysuart::run_variant(&mut bus, Variant::FlowControlled);

        assert_eq!(bus.uart().unwrap().transmitted(), first.as_slice());
        assert_eq!(bus.uart().unwrap().stats(), first_stats);
    }

    #[test]
    fn test_bounded_transmit_reports_stuck_flag() {
        let mut bus = bus_with(UartModelConfig {
            stall_forever: true,
            ..UartModelConfig::default()
        });
        let err = sysuart::put_char_bounded(&mut bus, b'x', 100).unwrap_err();
        assert_eq!(err.polls, 100);
        assert!(bus.uart().unwrap().transmitted().is_empty());
    }

    // The same transmit loop as machine code on the RV32I core.

    use crate::test_support::{assemble, greeter_code, rv};

    fn greeter(message: &CStr, flow: FlowControl) -> ProgramImage {
        let mut image = ProgramImage::new(0x1000);
        image.add_segment(
            0x1000,
            greeter_code(message.to_bytes(), flow == FlowControl::Polled),
        );
        image
    }

    fn load(bus: SystemBus, image: &ProgramImage) -> Machine<RiscV> {
        let mut machine = Machine::<RiscV>::with_bus(bus);
        machine.load_firmware(image).unwrap();
        machine
    }

    #[test]
    fn test_machine_runs_polled_greeter() {
        let bus = bus_with(UartModelConfig {
            stall_polls: 2,
            ..UartModelConfig::default()
        });
        let mut machine = load(bus, &greeter(FLOW_CONTROLLED_GREETING, FlowControl::Polled));

        let outcome = machine.run(&RunLimits::steps(10_000));
        assert_eq!(outcome.stop_reason, StopReason::Halt);
        assert_eq!(outcome.exit_code, Some(0));

        let uart = machine.bus.uart().unwrap();
        let len = FLOW_CONTROLLED_GREETING.to_bytes().len() as u64;
        assert_eq!(uart.transmitted(), FLOW_CONTROLLED_GREETING.to_bytes());
        assert_eq!(uart.stats().stat_reads, len + 2);
        assert_eq!(uart.stats().flagged_writes, 0);
    }

    #[test]
    fn test_machine_polled_greeter_on_slow_line() {
        let mut machine = load(
            bus_with(slow_uart()),
            &greeter(FLOW_CONTROLLED_GREETING, FlowControl::Polled),
        );

        let outcome = machine.run(&RunLimits::steps(100_000));
        assert_eq!(outcome.stop_reason, StopReason::Halt);

        let uart = machine.bus.uart().unwrap();
        assert_eq!(uart.transmitted(), FLOW_CONTROLLED_GREETING.to_bytes());
        assert_eq!(uart.stats().overruns, 0);
        assert_eq!(uart.stats().flagged_writes, 0);
    }

    #[test]
    fn test_machine_unconditional_greeter() {
        let mut machine = load(
            SystemBus::new(),
            &greeter(c"A\r\n", FlowControl::Unconditional),
        );

        let outcome = machine.run(&RunLimits::steps(1_000));
        assert_eq!(outcome.stop_reason, StopReason::Halt);
        assert_eq!(outcome.exit_code, Some(0));

        let uart = machine.bus.uart().unwrap();
        assert_eq!(uart.transmitted(), b"A\r\n");
        assert_eq!(uart.stats().stat_reads, 0);
    }

    #[test]
    fn test_machine_empty_message() {
        let mut machine = load(SystemBus::new(), &greeter(c"", FlowControl::Polled));
        let outcome = machine.run(&RunLimits::steps(1_000));
        assert_eq!(outcome.exit_code, Some(0));
        assert_eq!(machine.bus.uart().unwrap().stats().tx_writes, 0);
    }

    #[test]
    fn test_machine_reset_reproduces_output() {
        let image = greeter(UNCONDITIONAL_GREETING, FlowControl::Polled);
        let mut machine = load(bus_with(slow_uart()), &image);

        let first = machine.run(&RunLimits::steps(100_000));
        let first_output = machine.bus.uart().unwrap().transmitted().to_vec();

        machine.reset();
        let second = machine.run(&RunLimits::steps(100_000));

        assert_eq!(first, second);
        assert_eq!(machine.bus.uart().unwrap().transmitted(), first_output.as_slice());
        assert_eq!(first_output, UNCONDITIONAL_GREETING.to_bytes());
    }

    #[test]
    fn test_machine_stall_forever_hits_step_limit() {
        let bus = bus_with(UartModelConfig {
            stall_forever: true,
            ..UartModelConfig::default()
        });
        let mut machine = load(bus, &greeter(c"A", FlowControl::Polled));

        let outcome = machine.run(&RunLimits::steps(500));
        assert_eq!(outcome.stop_reason, StopReason::MaxSteps);
        assert_eq!(outcome.steps, 500);
        assert!(machine.bus.uart().unwrap().transmitted().is_empty());
    }

    #[test]
    fn test_machine_wall_time_limit() {
        let bus = bus_with(UartModelConfig {
            stall_forever: true,
            ..UartModelConfig::default()
        });
        let mut machine = load(bus, &greeter(c"A", FlowControl::Polled));

        let outcome = machine.run(&RunLimits {
            max_steps: u64::MAX,
            wall_time: Some(std::time::Duration::ZERO),
        });
        assert_eq!(outcome.stop_reason, StopReason::WallTime);
    }

    #[test]
    fn test_machine_detects_self_loop() {
        let mut image = ProgramImage::new(0x1000);
        image.add_segment(0x1000, rv::jal(rv::ZERO, 0).to_le_bytes().to_vec());
        let mut machine = load(SystemBus::new(), &image);

        let outcome = machine.run(&RunLimits::steps(1_000));
        assert_eq!(outcome.stop_reason, StopReason::NoProgress);
        assert_eq!(outcome.steps, 1);
    }

    #[test]
    fn test_machine_memory_violation() {
        let mut image = ProgramImage::new(0x1000);
        // lw a0, 0(zero)
        image.add_segment(0x1000, rv::lw(rv::A0, rv::ZERO, 0).to_le_bytes().to_vec());
        let mut machine = load(SystemBus::new(), &image);

        let outcome = machine.run(&RunLimits::steps(1_000));
        assert_eq!(outcome.stop_reason, StopReason::MemoryViolation);
        assert_eq!(outcome.exit_code, None);
    }

    // Drain timing: one peripheral tick per instruction on the core, one per
    // register access through `Mmio`. Both paths see the same rate.

    /// Two back-to-back stores of 'A' to TX, then halt.
    fn double_store() -> ProgramImage {
        use rv::*;
        let mut image = ProgramImage::new(0x1000);
        image.add_segment(
            0x1000,
            assemble(&[
                lui(S0, 0x8000),
                addi(A2, ZERO, b'A' as i32),
                sb(A2, S0, 4),
                sb(A2, S0, 4),
                EBREAK,
            ]),
        );
        image
    }

    fn one_slot_uart(drain_interval: u32) -> UartModelConfig {
        UartModelConfig {
            fifo_depth: 1,
            drain_interval,
            ..UartModelConfig::default()
        }
    }

    #[test]
    fn test_machine_ticks_once_per_instruction() {
        // The tick after the first store frees the slot only when a single
        // tick drains a byte.
        let mut machine = load(bus_with(one_slot_uart(1)), &double_store());
        assert_eq!(machine.run(&RunLimits::steps(100)).stop_reason, StopReason::Halt);
        let uart = machine.bus.uart().unwrap();
        assert_eq!(uart.transmitted(), b"AA");
        assert_eq!(uart.stats().overruns, 0);

        // Instruction fetches do not count as extra ticks.
        let mut machine = load(bus_with(one_slot_uart(2)), &double_store());
        machine.run(&RunLimits::steps(100));
        let uart = machine.bus.uart().unwrap();
        assert_eq!(uart.transmitted(), b"A");
        assert_eq!(uart.stats().overruns, 1);
        assert_eq!(uart.stats().flagged_writes, 1);
    }

    #[test]
    fn test_mmio_drain_rate_matches_machine() {
        for (drain_interval, expected) in [(1, &b"AA"[..]), (2, &b"A"[..])] {
            let mut bus = bus_with(one_slot_uart(drain_interval));
            sysuart::put_char(&mut bus, b'A', FlowControl::Unconditional);
            sysuart::put_char(&mut bus, b'A', FlowControl::Unconditional);

            let mut machine = load(bus_with(one_slot_uart(drain_interval)), &double_store());
            machine.run(&RunLimits::steps(100));

            let direct = bus.uart().unwrap();
            let simulated = machine.bus.uart().unwrap();
            assert_eq!(direct.transmitted(), expected);
            assert_eq!(direct.transmitted(), simulated.transmitted());
            assert_eq!(direct.stats(), simulated.stats());
        }
    }
}

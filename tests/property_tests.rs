//! Property and fuzz-style tests for the timer clock-path search and the
//! facade state machine.
//!
//! Everything runs on the host against the in-crate mock channels; no
//! board is involved.

use nanopin::adapters::mock::{MockRegs, MockSysfs};
use nanopin::{BoardConfig, Direction, Level, PinHub, TimerBlock, TimerConfig, Trigger};
use proptest::prelude::*;

// ── Clock-path search ─────────────────────────────────────────

/// 1 MHz base clock: a base-clock cycle is exactly 1000 ns, so every
/// candidate tick is a round number and the bounds below are exact.
fn test_block() -> TimerBlock {
    let mut block = BoardConfig::nanopi().timers.unwrap();
    block.base_clock_hz = 1_000_000;
    block
}

proptest! {
    /// Whatever the search picks must be real hardware: the divider
    /// selector indexes the board table, the realized period matches the
    /// reported drift, and the drift never exceeds half the winning tick.
    #[test]
    fn search_lands_on_programmable_hardware(period in 2_000u64..100_000_000) {
        let block = test_block();
        let (config, drift) = TimerConfig::for_period(&block, period).unwrap();

        let div = config.divider(&block).unwrap();
        prop_assert!(block.dividers.contains(&div));

        let realized = config.period_ns(&block).unwrap();
        prop_assert_eq!(realized as i64, period as i64 + drift);

        let tick_ns = (u64::from(config.prescaler) + 1) * u64::from(div) * 1_000;
        prop_assert!(
            drift.unsigned_abs() <= tick_ns / 2,
            "drift {} exceeds half a {}ns tick",
            drift,
            tick_ns
        );
    }

    /// With the prescaler pinned for a sibling, no search result may move
    /// it, whatever period gets requested.
    #[test]
    fn pinned_prescaler_never_moves(
        pre in 0u8..16,
        period in 32_000u64..10_000_000,
    ) {
        let block = test_block();
        let (config, drift) =
            TimerConfig::for_period_with_prescaler(&block, pre, period).unwrap();

        prop_assert_eq!(config.prescaler, pre);
        let realized = config.period_ns(&block).unwrap();
        prop_assert_eq!(realized as i64, period as i64 + drift);
    }

    /// On the stock 66.5 MHz block the realized period converts back to
    /// exactly the programmed tick count.
    #[test]
    fn realized_period_round_trips_to_ticks(period in 1_000u64..50_000_000) {
        let block = BoardConfig::nanopi().timers.unwrap();
        let (config, _) = TimerConfig::for_period(&block, period).unwrap();

        let realized = config.period_ns(&block).unwrap();
        prop_assert_eq!(
            config.ticks_for(&block, realized).unwrap(),
            u64::from(config.counter) + 1
        );
    }
}

// ── Facade state machine ──────────────────────────────────────

#[derive(Debug, Clone)]
enum HubOp {
    GpioInit(u32, bool), // pin, output?
    GpioWrite(u32, bool),
    GpioToggle(u32),
    PwmInit(u32, u64, u64), // pin, period_ns, duty_ns
    PwmStart(u32),
    PwmStop(u32),
    EintInit(u32, bool), // pin, both-edges?
    EintEvent(u32),
    RaiseEdge(u32), // kernel GPIO id
    Close(u32),
}

fn arb_pin() -> impl Strategy<Value = u32> {
    // GPIO, PWM and EINT pins from the NanoPi table, mixed.
    proptest::sample::select(vec![7u32, 11, 22, 24, 26, 27])
}

fn arb_op() -> impl Strategy<Value = HubOp> {
    prop_oneof![
        (arb_pin(), any::<bool>()).prop_map(|(p, out)| HubOp::GpioInit(p, out)),
        (arb_pin(), any::<bool>()).prop_map(|(p, high)| HubOp::GpioWrite(p, high)),
        arb_pin().prop_map(HubOp::GpioToggle),
        (arb_pin(), 1_000u64..10_000_000, 0u64..1_000)
            .prop_map(|(p, per, duty)| HubOp::PwmInit(p, per, duty)),
        arb_pin().prop_map(HubOp::PwmStart),
        arb_pin().prop_map(HubOp::PwmStop),
        (arb_pin(), any::<bool>()).prop_map(|(p, both)| HubOp::EintInit(p, both)),
        arb_pin().prop_map(HubOp::EintEvent),
        proptest::sample::select(vec![161u32, 162]).prop_map(HubOp::RaiseEdge),
        arb_pin().prop_map(HubOp::Close),
    ]
}

proptest! {
    /// Arbitrary call sequences must never wedge the hub: wrong-role and
    /// wrong-mode calls fail typed, and afterwards a full teardown and a
    /// fresh claim always work.
    #[test]
    fn hub_survives_arbitrary_call_sequences(
        ops in proptest::collection::vec(arb_op(), 1..=20),
    ) {
        let mut hub =
            PinHub::new(BoardConfig::nanopi(), MockSysfs::new(), MockRegs::new()).unwrap();

        for op in &ops {
            match op {
                HubOp::GpioInit(pin, out) => {
                    let dir = if *out { Direction::Out } else { Direction::In };
                    let _ = hub.gpio_init(*pin, dir, None);
                }
                HubOp::GpioWrite(pin, high) => {
                    let level = if *high { Level::High } else { Level::Low };
                    let _ = hub.gpio_write(*pin, level);
                }
                HubOp::GpioToggle(pin) => {
                    let _ = hub.gpio_toggle(*pin);
                }
                HubOp::PwmInit(pin, period, duty) => {
                    let _ = hub.pwm_init(*pin, *period, *duty);
                }
                HubOp::PwmStart(pin) => {
                    let _ = hub.pwm_start(*pin);
                }
                HubOp::PwmStop(pin) => {
                    let _ = hub.pwm_stop(*pin);
                }
                HubOp::EintInit(pin, both) => {
                    let trigger = if *both { Trigger::Both } else { Trigger::Rising };
                    let _ = hub.eint_init(*pin, trigger);
                }
                HubOp::EintEvent(pin) => {
                    let _ = hub.eint_event(*pin);
                }
                HubOp::RaiseEdge(kernel_id) => {
                    hub.sysfs_mut().raise_edge(*kernel_id);
                }
                HubOp::Close(pin) => {
                    let _ = hub.gpio_close(*pin);
                    let _ = hub.pwm_close(*pin);
                    let _ = hub.eint_close(*pin);
                }
            }
        }

        prop_assert!(
            hub.close_all().is_ok(),
            "teardown must succeed after any sequence"
        );
        prop_assert!(hub.claimed_pins().is_empty());
        prop_assert!(
            hub.gpio_init(24, Direction::Out, None).is_ok(),
            "a fresh claim must succeed after teardown"
        );
    }
}

//! PWM flows through the full facade, covering both drive paths: the
//! kernel PWM class (chip-addressed pins) and the S3C timer block
//! (timer-addressed pins).
//!
//! The board table swaps the stock clock for 1 MHz so every expected
//! register value is a round number: prescaler 0 with divider /2 gives a
//! 2 us tick.

use std::collections::BTreeMap;

use nanopin::adapters::mock::{MockRegs, MockSysfs};
use nanopin::ports::RegisterChannel;
use nanopin::{BoardConfig, Error, HwAddress, PinCapability, PinHub, PinMode};

const CHIP_PIN_ADDR: HwAddress = HwAddress::PwmChip { chip: 0, channel: 0 };

/// NanoPi timer layout on a 1 MHz base clock, plus one kernel-class pin.
fn board() -> BoardConfig {
    let mut block = BoardConfig::nanopi().timers.unwrap();
    block.base_clock_hz = 1_000_000;
    BoardConfig {
        name: "pwmtest".to_string(),
        pins: BTreeMap::from([
            (5, PinCapability::pwm_chip(0, 0)),
            (22, PinCapability::pwm_timer(0, 0)),
            (26, PinCapability::pwm_timer(1, 0)),
            (16, PinCapability::pwm_timer(2, 1)),
        ]),
        timers: Some(block),
    }
}

fn hub() -> PinHub<MockSysfs, MockRegs> {
    PinHub::new(board(), MockSysfs::new(), MockRegs::new()).unwrap()
}

// ── Timer path ─────────────────────────────────────────────────────────

#[test]
fn timer_lifecycle_through_the_facade() {
    let mut hub = hub();
    hub.pwm_init(22, 1_000_000, 250_000).unwrap();

    let state = hub.state(22).unwrap();
    assert_eq!(state.mode, PinMode::PwmIdle);
    assert_eq!(state.period_ns, Some(1_000_000));
    assert_eq!(state.duty_ns, Some(250_000));

    // 500 ticks of 2 us, duty a quarter of that.
    assert_eq!(hub.pwm_get_counter(22).unwrap(), 499);
    assert_eq!(hub.pwm_get_compare(22).unwrap(), 125);
    assert_eq!(hub.pwm_get_period(22).unwrap(), 1_000_000);
    assert_eq!(hub.pwm_get_duty_cycle(22).unwrap(), 250_000);

    hub.pwm_start(22).unwrap();
    assert_eq!(hub.state(22).unwrap().mode, PinMode::PwmRunning);
    hub.pwm_stop(22).unwrap();
    assert_eq!(hub.state(22).unwrap().mode, PinMode::PwmIdle);

    hub.pwm_close(22).unwrap();
    assert!(hub.state(22).is_none());
    assert_eq!(hub.pwm_get_period(22).unwrap_err(), Error::NotClaimed(22));
}

#[test]
fn enable_sequence_reaches_the_timer_block() {
    let mut hub = hub();
    hub.pwm_init(22, 1_000_000, 250_000).unwrap();
    hub.pwm_start(22).unwrap();

    // Manual-update latch first, then run with auto-reload.
    assert_eq!(hub.regs_mut().tcon_writes(0), vec![0b1010, 0b1001]);
    assert_eq!(hub.pwm_get_tcon(22).unwrap(), 0b1001);

    hub.pwm_stop(22).unwrap();
    assert_eq!(hub.regs_mut().tcon_writes(0), vec![0b1010, 0b1001, 0]);
    assert_eq!(hub.pwm_get_tcon(22).unwrap(), 0);
}

#[test]
fn shared_lane_pins_sibling_periods() {
    let mut hub = hub();
    hub.pwm_init(22, 100_000, 0).unwrap();
    assert_eq!(hub.pwm_get_counter(22).unwrap(), 49);

    // Raw lane write: pin 22's 50 ticks now last 20 us each, and the
    // period read tracks the hardware rather than the bookkeeping.
    hub.pwm_set_prescaler(22, 9).unwrap();
    assert_eq!(hub.pwm_get_period(22).unwrap(), 1_000_000);
    assert_eq!(hub.state(22).unwrap().period_ns, Some(100_000));

    // A sibling joining the lane has to take the 20 us tick as given.
    hub.pwm_init(26, 1_000_000, 0).unwrap();
    assert_eq!(hub.pwm_get_counter(26).unwrap(), 49);
    assert_eq!(hub.pwm_get_prescaler(26).unwrap(), 9);

    // Closing one member keeps the lane; closing the last parks it.
    hub.pwm_close(22).unwrap();
    assert_eq!(hub.pwm_get_prescaler(26).unwrap(), 9);
    hub.pwm_close(26).unwrap();
    assert_eq!(hub.regs_mut().prescaler(0).unwrap(), 0);
}

#[test]
fn direct_register_surface_is_gated() {
    let mut hub = hub();

    // Unclaimed timer pin: the claim check fires first.
    assert_eq!(hub.pwm_get_counter(22).unwrap_err(), Error::NotClaimed(22));
    assert_eq!(hub.pwm_start(22).unwrap_err(), Error::NotClaimed(22));

    // Chip-addressed pin: claimed, but there is no register behind it.
    hub.pwm_init(5, 1_000, 0).unwrap();
    assert!(matches!(
        hub.pwm_get_counter(5).unwrap_err(),
        Error::InvalidConfiguration(_)
    ));
    assert!(matches!(
        hub.pwm_set_tcon(5, 0b1001).unwrap_err(),
        Error::InvalidConfiguration(_)
    ));
}

// ── Kernel class path ──────────────────────────────────────────────────

#[test]
fn chip_lifecycle_drives_the_kernel_class() {
    let mut hub = hub();
    hub.pwm_init(5, 1_000, 400).unwrap();
    assert!(hub.sysfs_mut().is_exported(&CHIP_PIN_ADDR));

    let drift = hub.pwm_set_duty_cycle(5, 600).unwrap();
    assert_eq!(drift, 0);
    assert_eq!(hub.pwm_get_duty_cycle(5).unwrap(), 600);

    hub.pwm_start(5).unwrap();
    assert_eq!(
        hub.sysfs_mut().attr(&CHIP_PIN_ADDR, "enable").as_deref(),
        Some("1")
    );
    hub.pwm_stop(5).unwrap();
    assert_eq!(
        hub.sysfs_mut().attr(&CHIP_PIN_ADDR, "enable").as_deref(),
        Some("0")
    );

    hub.pwm_close(5).unwrap();
    assert!(hub.state(5).is_none());
    assert!(!hub.sysfs_mut().is_exported(&CHIP_PIN_ADDR));
}

#[test]
fn kernel_rounding_surfaces_as_drift() {
    let mut hub = hub();
    // This kernel's clock only does multiples of 700 ns.
    hub.sysfs_mut().set_period_quantum(700);
    hub.pwm_init(5, 1_400, 0).unwrap();

    let drift = hub.pwm_set_period(5, 1_000).unwrap();
    assert_eq!(drift, -300);
    assert_eq!(hub.pwm_get_period(5).unwrap(), 700);
}

// ── Bulk teardown ──────────────────────────────────────────────────────

#[test]
fn close_all_sweeps_both_drive_paths() {
    let mut hub = hub();
    hub.pwm_init(5, 1_000, 500).unwrap();
    hub.pwm_init(22, 1_000_000, 250_000).unwrap();
    hub.pwm_start(5).unwrap();
    hub.pwm_start(22).unwrap();

    hub.pwm_close_all().unwrap();
    assert!(hub.claimed_pins().is_empty());
    assert_eq!(hub.sysfs_mut().writes(&CHIP_PIN_ADDR, "enable"), ["1", "0"]);
    assert_eq!(hub.regs_mut().tcon_writes(0).last(), Some(&0));
    assert_eq!(hub.regs_mut().prescaler(0).unwrap(), 0);

    // Nothing left: a second sweep is a no-op.
    hub.pwm_close_all().unwrap();
}

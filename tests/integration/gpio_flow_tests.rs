//! GPIO flows through the full facade: claim, drive, reconfigure, release.
//!
//! Uses the NanoPi table; pin 24 and pin 27 are the plain GPIO breakouts,
//! pin 7 is interrupt-capable and must stay out of reach for GPIO calls.

use nanopin::adapters::mock::{MockRegs, MockSysfs};
use nanopin::ports::SysfsChannel;
use nanopin::{
    BoardConfig, Direction, Error, HwAddress, Level, PinHub, PinMode, PinRole, Pull,
};

fn hub() -> PinHub<MockSysfs, MockRegs> {
    PinHub::new(BoardConfig::nanopi(), MockSysfs::new(), MockRegs::new()).unwrap()
}

// ── Output lifecycle ───────────────────────────────────────────────────

#[test]
fn output_lifecycle_drives_and_releases() {
    let mut hub = hub();

    hub.gpio_init(24, Direction::Out, None).unwrap();
    assert_eq!(hub.state(24).unwrap().mode, PinMode::GpioOut);

    hub.gpio_write(24, Level::High).unwrap();
    assert_eq!(hub.gpio_read(24).unwrap(), Level::High);
    assert_eq!(hub.gpio_toggle(24).unwrap(), Level::Low);
    assert_eq!(hub.gpio_read(24).unwrap(), Level::Low);

    hub.gpio_close(24).unwrap();
    assert!(hub.state(24).is_none());
    assert_eq!(hub.gpio_close(24).unwrap_err(), Error::NotClaimed(24));
}

// ── Input flows ────────────────────────────────────────────────────────

#[test]
fn input_follows_the_external_line() {
    let mut hub = hub();

    hub.gpio_init(27, Direction::In, Some(Pull::Down)).unwrap();
    let state = hub.state(27).unwrap();
    assert_eq!(state.direction, Some(Direction::In));
    assert_eq!(state.pull, Some(Pull::Down));
    assert_eq!(hub.gpio_read(27).unwrap(), Level::Low);

    // Something outside drives the wire high; pin 27 is kernel GPIO 39.
    let addr = HwAddress::Sysfs { kernel_id: 39 };
    hub.sysfs_mut().write_attr(&addr, "value", "1").unwrap();
    assert_eq!(hub.gpio_read(27).unwrap(), Level::High);
}

#[test]
fn writes_need_an_output() {
    let mut hub = hub();
    hub.gpio_init(27, Direction::In, None).unwrap();

    assert_eq!(
        hub.gpio_write(27, Level::High).unwrap_err(),
        Error::InvalidTransition {
            pin: 27,
            from: PinMode::GpioIn,
            to: PinMode::GpioOut,
        }
    );

    hub.gpio_set_direction(27, Direction::Out).unwrap();
    hub.gpio_write(27, Level::High).unwrap();

    // Outputs have no pull stage to program.
    assert!(matches!(
        hub.gpio_set_pull(27, Pull::Up).unwrap_err(),
        Error::InvalidConfiguration(_)
    ));
}

// ── Rejections ─────────────────────────────────────────────────────────

#[test]
fn pull_on_output_is_rejected_before_claiming() {
    let mut hub = hub();

    assert!(matches!(
        hub.gpio_init(24, Direction::Out, Some(Pull::Up)).unwrap_err(),
        Error::InvalidConfiguration(_)
    ));
    // The pin was never claimed, so a clean init still works.
    assert!(hub.state(24).is_none());
    hub.gpio_init(24, Direction::Out, None).unwrap();
}

#[test]
fn unknown_and_wrong_role_pins_fail_typed() {
    let mut hub = hub();

    assert_eq!(hub.gpio_read(9).unwrap_err(), Error::UnknownPin(9));
    assert_eq!(
        hub.gpio_init(7, Direction::Out, None).unwrap_err(),
        Error::CapabilityMismatch {
            pin: 7,
            role: PinRole::Eint,
            requested: PinRole::Gpio,
        }
    );
}

// ── Bulk teardown ──────────────────────────────────────────────────────

#[test]
fn close_all_spares_other_subsystems() {
    let mut hub = hub();
    hub.gpio_init(24, Direction::Out, None).unwrap();
    hub.gpio_init(27, Direction::In, None).unwrap();
    hub.eint_init(7, nanopin::Trigger::Rising).unwrap();

    hub.gpio_close_all().unwrap();
    assert_eq!(hub.claimed_pins(), vec![(7, PinMode::EintArmed)]);
}

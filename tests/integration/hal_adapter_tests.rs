//! The `embedded-hal` wrappers exercised against the facade, checking
//! that trait calls and direct hub calls observe the same pin.

use std::collections::BTreeMap;

use embedded_hal::digital::{InputPin, OutputPin};
use embedded_hal::pwm::SetDutyCycle;

use nanopin::adapters::mock::{MockRegs, MockSysfs};
use nanopin::ports::SysfsChannel;
use nanopin::{
    BoardConfig, DigitalPin, Direction, Error, HwAddress, Level, PinCapability, PinHub, PwmPin,
};

fn hub() -> PinHub<MockSysfs, MockRegs> {
    PinHub::new(BoardConfig::nanopi(), MockSysfs::new(), MockRegs::new()).unwrap()
}

/// One timer pin on a 1 MHz clock, so a 1 ms period is 500 ticks of 2 us.
fn pwm_hub() -> PinHub<MockSysfs, MockRegs> {
    let mut block = BoardConfig::nanopi().timers.unwrap();
    block.base_clock_hz = 1_000_000;
    let board = BoardConfig {
        name: "haltest".to_string(),
        pins: BTreeMap::from([(22, PinCapability::pwm_timer(0, 0))]),
        timers: Some(block),
    };
    PinHub::new(board, MockSysfs::new(), MockRegs::new()).unwrap()
}

#[test]
fn output_writes_land_in_the_facade() {
    let mut hub = hub();
    hub.gpio_init(24, Direction::Out, None).unwrap();

    DigitalPin::new(&mut hub, 24).set_high().unwrap();
    assert_eq!(hub.gpio_read(24).unwrap(), Level::High);
    DigitalPin::new(&mut hub, 24).set_low().unwrap();
    assert_eq!(hub.gpio_read(24).unwrap(), Level::Low);
}

#[test]
fn input_reads_follow_the_external_line() {
    let mut hub = hub();
    hub.gpio_init(27, Direction::In, None).unwrap();
    assert!(DigitalPin::new(&mut hub, 27).is_low().unwrap());

    // Something outside drives the line; kernel GPIO 39 backs pin 27.
    hub.sysfs_mut()
        .write_attr(&HwAddress::Sysfs { kernel_id: 39 }, "value", "1")
        .unwrap();
    assert!(DigitalPin::new(&mut hub, 27).is_high().unwrap());
}

#[test]
fn duty_fraction_rounds_through_both_quantizers() {
    let mut hub = pwm_hub();
    hub.pwm_init(22, 1_000_000, 0).unwrap();

    // 32768/65535 of 1 ms is 500008 ns; the 2 us tick then grinds it to
    // an even half.
    PwmPin::new(&mut hub, 22).set_duty_cycle(32768).unwrap();
    assert_eq!(hub.pwm_get_compare(22).unwrap(), 250);
    assert_eq!(hub.pwm_get_duty_cycle(22).unwrap(), 500_000);
}

#[test]
fn wrapper_errors_keep_the_hal_kind() {
    let mut hub = hub();

    let err = DigitalPin::new(&mut hub, 24).is_high().unwrap_err();
    assert_eq!(err, Error::NotClaimed(24));
    assert_eq!(
        embedded_hal::digital::Error::kind(&err),
        embedded_hal::digital::ErrorKind::Other
    );

    let err = PwmPin::new(&mut hub, 22).set_duty_cycle(1).unwrap_err();
    assert_eq!(err, Error::NotClaimed(22));
    assert_eq!(
        embedded_hal::pwm::Error::kind(&err),
        embedded_hal::pwm::ErrorKind::Other
    );
}

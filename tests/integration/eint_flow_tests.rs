//! Interrupt flows through the full facade. On the NanoPi table pin 7
//! (kernel GPIO 161) and pin 11 (kernel GPIO 162) are the EINT-capable
//! lines; edges arrive via the mock's `raise_edge` hook.

use nanopin::adapters::mock::{MockRegs, MockSysfs};
use nanopin::{BoardConfig, Error, PinHub, PinMode, Trigger};

fn hub() -> PinHub<MockSysfs, MockRegs> {
    PinHub::new(BoardConfig::nanopi(), MockSysfs::new(), MockRegs::new()).unwrap()
}

#[test]
fn latch_sticks_until_cleared() {
    let mut hub = hub();
    hub.eint_init(7, Trigger::Rising).unwrap();

    let state = hub.state(7).unwrap();
    assert_eq!(state.mode, PinMode::EintArmed);
    assert_eq!(state.trigger, Some(Trigger::Rising));
    assert!(!hub.eint_event(7).unwrap());

    hub.sysfs_mut().raise_edge(161);
    assert!(hub.eint_event(7).unwrap());
    // Reading does not consume the latch.
    assert!(hub.eint_event(7).unwrap());

    hub.eint_clear(7).unwrap();
    assert!(!hub.eint_event(7).unwrap());
    // The trigger survives the clear.
    assert_eq!(hub.state(7).unwrap().trigger, Some(Trigger::Rising));
}

#[test]
fn arming_discards_stale_events() {
    let mut hub = hub();
    // An edge queued before anyone was listening must not leak into the
    // fresh latch.
    hub.sysfs_mut().seed_pending(161);

    hub.eint_init(7, Trigger::Rising).unwrap();
    assert!(!hub.eint_event(7).unwrap());
}

#[test]
fn lines_latch_independently() {
    let mut hub = hub();
    hub.eint_init(7, Trigger::Rising).unwrap();
    hub.eint_init(11, Trigger::Both).unwrap();

    hub.sysfs_mut().raise_edge(161);
    assert!(hub.eint_event(7).unwrap());
    assert!(!hub.eint_event(11).unwrap());

    hub.eint_clear(7).unwrap();
    hub.sysfs_mut().raise_edge(162);
    assert!(hub.eint_event(11).unwrap());
    assert!(!hub.eint_event(7).unwrap());
}

#[test]
fn close_releases_and_rearms_fresh() {
    let mut hub = hub();
    hub.eint_init(7, Trigger::Both).unwrap();
    hub.sysfs_mut().raise_edge(161);
    assert!(hub.eint_event(7).unwrap());

    hub.eint_close(7).unwrap();
    assert!(hub.state(7).is_none());
    assert_eq!(hub.eint_event(7).unwrap_err(), Error::NotClaimed(7));

    // A new claim starts with a clean latch and its own trigger.
    hub.eint_init(7, Trigger::Falling).unwrap();
    assert!(!hub.eint_event(7).unwrap());
    assert_eq!(hub.state(7).unwrap().trigger, Some(Trigger::Falling));
}

#[test]
fn close_all_disarms_every_line() {
    let mut hub = hub();
    hub.eint_init(7, Trigger::Rising).unwrap();
    hub.eint_init(11, Trigger::Falling).unwrap();

    hub.eint_close_all().unwrap();
    assert!(hub.claimed_pins().is_empty());
    assert_eq!(hub.eint_event(7).unwrap_err(), Error::NotClaimed(7));
    assert_eq!(hub.eint_event(11).unwrap_err(), Error::NotClaimed(11));
}

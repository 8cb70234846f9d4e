//! `embedded-hal` 1.0 adapters so generic drivers can run over hub pins.
//!
//! The wrappers borrow the hub for their lifetime and assume the pin was
//! already initialized through the matching `*_init` call; they add no
//! claiming or mode logic of their own, so every registry rule still
//! applies through them.

use embedded_hal::digital::{self, InputPin, OutputPin};
use embedded_hal::pwm::{self, SetDutyCycle};

use crate::error::Error;
use crate::gpio::Level;
use crate::hub::PinHub;
use crate::ports::{RegisterChannel, SysfsChannel};

impl digital::Error for Error {
    fn kind(&self) -> digital::ErrorKind {
        digital::ErrorKind::Other
    }
}

impl pwm::Error for Error {
    fn kind(&self) -> pwm::ErrorKind {
        pwm::ErrorKind::Other
    }
}

// ---------------------------------------------------------------------------
// Digital pin
// ---------------------------------------------------------------------------

/// One GPIO-claimed pin viewed through the `embedded-hal` digital traits.
pub struct DigitalPin<'a, S: SysfsChannel, R: RegisterChannel> {
    hub: &'a mut PinHub<S, R>,
    pin: u32,
}

impl<'a, S: SysfsChannel, R: RegisterChannel> DigitalPin<'a, S, R> {
    /// Wrap a pin previously set up with `gpio_init`.
    pub fn new(hub: &'a mut PinHub<S, R>, pin: u32) -> Self {
        Self { hub, pin }
    }
}

impl<S: SysfsChannel, R: RegisterChannel> digital::ErrorType for DigitalPin<'_, S, R> {
    type Error = Error;
}

impl<S: SysfsChannel, R: RegisterChannel> InputPin for DigitalPin<'_, S, R> {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        Ok(self.hub.gpio_read(self.pin)? == Level::High)
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        Ok(self.hub.gpio_read(self.pin)? == Level::Low)
    }
}

impl<S: SysfsChannel, R: RegisterChannel> OutputPin for DigitalPin<'_, S, R> {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.hub.gpio_write(self.pin, Level::Low)
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.hub.gpio_write(self.pin, Level::High)
    }
}

// ---------------------------------------------------------------------------
// PWM pin
// ---------------------------------------------------------------------------

/// One PWM-claimed pin viewed through `embedded-hal`'s duty-cycle trait.
///
/// Duty is a fraction of the live period: `max_duty_cycle` is the full
/// `u16` range and the nanosecond value is derived from the period at call
/// time, so period changes do not invalidate the wrapper.
pub struct PwmPin<'a, S: SysfsChannel, R: RegisterChannel> {
    hub: &'a mut PinHub<S, R>,
    pin: u32,
}

impl<'a, S: SysfsChannel, R: RegisterChannel> PwmPin<'a, S, R> {
    /// Wrap a pin previously set up with `pwm_init`.
    pub fn new(hub: &'a mut PinHub<S, R>, pin: u32) -> Self {
        Self { hub, pin }
    }
}

impl<S: SysfsChannel, R: RegisterChannel> pwm::ErrorType for PwmPin<'_, S, R> {
    type Error = Error;
}

impl<S: SysfsChannel, R: RegisterChannel> SetDutyCycle for PwmPin<'_, S, R> {
    fn max_duty_cycle(&self) -> u16 {
        u16::MAX
    }

    fn set_duty_cycle(&mut self, duty: u16) -> Result<(), Self::Error> {
        let period = self.hub.pwm_get_period(self.pin)?;
        let scaled = u128::from(period) * u128::from(duty);
        let denom = u128::from(u16::MAX);
        let duty_ns = ((scaled + denom / 2) / denom) as u64;
        self.hub.pwm_set_duty_cycle(self.pin, duty_ns)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

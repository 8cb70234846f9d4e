//! Board capability tables.
//!
//! Single source of truth for what each header pin can do; every controller
//! consults the table instead of hard-coding pin numbers or addresses. A
//! table is immutable once handed to a [`crate::hub::PinHub`]; to run a
//! different board, build a different table (or load one from JSON).
//!
//! Pin data for the shipped NanoPi table matches the FriendlyARM schematic
//! (S3C2451 SoC, 40-pin header).

use std::collections::BTreeMap;

use core::fmt;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// Roles and addressing
// ---------------------------------------------------------------------------

/// What the board wiring allows a pin to be claimed as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PinRole {
    /// Plain digital input/output.
    Gpio,
    /// Pulse-width modulation output.
    Pwm,
    /// Edge/level-triggered external interrupt input.
    Eint,
}

impl PinRole {
    /// Whether a pin declared with this role accepts operations from the
    /// given subsystem. Roles map one-to-one onto subsystems: a table that
    /// wants a TOUT pin usable as plain GPIO lists it under `Gpio`.
    pub fn supports(self, requested: PinRole) -> bool {
        self == requested
    }
}

impl fmt::Display for PinRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Gpio => write!(f, "gpio"),
            Self::Pwm => write!(f, "pwm"),
            Self::Eint => write!(f, "eint"),
        }
    }
}

/// How the hardware behind a pin is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HwAddress {
    /// Kernel GPIO number under `/sys/class/gpio` (GPIO and EINT roles).
    Sysfs { kernel_id: u32 },
    /// Kernel PWM class channel under `/sys/class/pwm/pwmchip{chip}`.
    PwmChip { chip: u32, channel: u32 },
    /// Register-driven timer channel on the board's timer block.
    Timer { channel: u8, prescaler_unit: u8 },
}

/// One row of the capability table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinCapability {
    pub role: PinRole,
    pub address: HwAddress,
}

impl PinCapability {
    /// Plain GPIO pin reached through sysfs.
    pub fn gpio(kernel_id: u32) -> Self {
        Self {
            role: PinRole::Gpio,
            address: HwAddress::Sysfs { kernel_id },
        }
    }

    /// Interrupt-capable input reached through sysfs.
    pub fn eint(kernel_id: u32) -> Self {
        Self {
            role: PinRole::Eint,
            address: HwAddress::Sysfs { kernel_id },
        }
    }

    /// PWM output on a kernel PWM class channel.
    pub fn pwm_chip(chip: u32, channel: u32) -> Self {
        Self {
            role: PinRole::Pwm,
            address: HwAddress::PwmChip { chip, channel },
        }
    }

    /// PWM output driven directly on a timer-block channel.
    pub fn pwm_timer(channel: u8, prescaler_unit: u8) -> Self {
        Self {
            role: PinRole::Pwm,
            address: HwAddress::Timer {
                channel,
                prescaler_unit,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Timer block description (direct PWM)
// ---------------------------------------------------------------------------

/// Physical layout of an S3C-style timer control block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerRegisterMap {
    /// Physical base address of the block.
    pub phys_base: u64,
    /// Bytes to map from the base.
    pub window_len: usize,
    /// Prescaler register offset (8-bit lane per prescaler unit).
    pub tcfg0: usize,
    /// Divider-select register offset (4-bit nibble per channel).
    pub tcfg1: usize,
    /// Timer control word offset (4-bit nibble per channel).
    pub tcon: usize,
    /// Offset of channel 0's count buffer (TCNTB0); compare sits one word
    /// after the count within each channel's slot.
    pub count_base: usize,
    /// Byte stride between consecutive channels' buffer slots.
    pub count_stride: usize,
}

/// Clocking and register description for boards with direct PWM.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerBlock {
    /// Clock feeding the prescalers (PCLK on S3C-style SoCs).
    pub base_clock_hz: u64,
    /// Divider values selectable per channel, indexed by the TCFG1
    /// nibble written to hardware.
    pub dividers: Vec<u32>,
    /// Width of the count/compare registers.
    pub counter_bits: u32,
    pub registers: TimerRegisterMap,
}

impl TimerBlock {
    /// Largest tick count one period may span (`counter` stores ticks-1).
    pub fn max_ticks(&self) -> u64 {
        1u64 << self.counter_bits
    }
}

// ---------------------------------------------------------------------------
// Board table
// ---------------------------------------------------------------------------

/// Immutable capability table for one board model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoardConfig {
    /// Human-readable board name, used in log lines.
    pub name: String,
    /// Header pin number → capability.
    pub pins: BTreeMap<u32, PinCapability>,
    /// Present when any pin is register-driven.
    pub timers: Option<TimerBlock>,
}

impl BoardConfig {
    /// Look up a pin, rejecting pins the board does not list.
    pub fn capability(&self, pin: u32) -> Result<&PinCapability> {
        self.pins.get(&pin).ok_or(Error::UnknownPin(pin))
    }

    /// Pins driving timer channels on the given prescaler unit.
    pub fn unit_members(&self, unit: u8) -> Vec<(u32, u8)> {
        self.pins
            .iter()
            .filter_map(|(&pin, cap)| match cap.address {
                HwAddress::Timer {
                    channel,
                    prescaler_unit,
                } if prescaler_unit == unit => Some((pin, channel)),
                _ => None,
            })
            .collect()
    }

    /// Check the table for internal coherence. Runs before any pin
    /// operation; a table that fails here is never consulted again.
    pub fn validate(&self) -> Result<()> {
        let mut sysfs_ids = Vec::new();
        let mut chip_channels = Vec::new();
        let mut timer_channels = Vec::new();

        for cap in self.pins.values() {
            match (cap.role, cap.address) {
                (PinRole::Gpio | PinRole::Eint, HwAddress::Sysfs { kernel_id }) => {
                    if sysfs_ids.contains(&kernel_id) {
                        return Err(Error::InvalidConfiguration(
                            "two pins share one kernel GPIO id",
                        ));
                    }
                    sysfs_ids.push(kernel_id);
                }
                (PinRole::Pwm, HwAddress::PwmChip { chip, channel }) => {
                    if chip_channels.contains(&(chip, channel)) {
                        return Err(Error::InvalidConfiguration(
                            "two pins share one PWM chip channel",
                        ));
                    }
                    chip_channels.push((chip, channel));
                }
                (PinRole::Pwm, HwAddress::Timer { channel, .. }) => {
                    if self.timers.is_none() {
                        return Err(Error::InvalidConfiguration(
                            "timer-addressed pin on a board without a timer block",
                        ));
                    }
                    if timer_channels.contains(&channel) {
                        return Err(Error::InvalidConfiguration(
                            "two pins share one timer channel",
                        ));
                    }
                    timer_channels.push(channel);
                }
                _ => {
                    return Err(Error::InvalidConfiguration(
                        "pin role does not match its address kind",
                    ));
                }
            }
        }

        if let Some(block) = &self.timers {
            if block.base_clock_hz == 0 {
                return Err(Error::InvalidConfiguration("timer base clock is zero"));
            }
            if block.dividers.is_empty() || block.dividers.contains(&0) {
                return Err(Error::InvalidConfiguration("timer divider table is empty or has a zero"));
            }
            if block.counter_bits == 0 || block.counter_bits > 16 {
                return Err(Error::InvalidConfiguration(
                    "counter width must be between 1 and 16 bits",
                ));
            }
        }
        Ok(())
    }

    /// Load a caller-supplied table from JSON and validate it.
    pub fn from_json(json: &str) -> Result<Self> {
        let board: Self = serde_json::from_str(json).map_err(|e| {
            log::debug!("board: table rejected by serde: {e}");
            Error::InvalidConfiguration("board table is not valid JSON")
        })?;
        board.validate()?;
        Ok(board)
    }

    /// Serialise the table, e.g. to seed a customised variant.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| {
            log::debug!("board: table failed to serialise: {e}");
            Error::InvalidConfiguration("board table failed to serialise")
        })
    }

    /// Capability table for the FriendlyARM NanoPi (S3C2451, 40-pin header).
    ///
    /// EINT-labelled header pins are listed as interrupt-capable, the three
    /// TOUT pins as register-driven PWM on the SoC timer block, and the
    /// remaining breakout pins as plain GPIO. Kernel GPIO ids follow the
    /// s3c2410 gpiolib numbering.
    pub fn nanopi() -> Self {
        let pins = BTreeMap::from([
            (7, PinCapability::eint(161)),         // EINT1/GPF1
            (11, PinCapability::eint(162)),        // EINT2/GPF2
            (12, PinCapability::eint(163)),        // EINT3/GPF3
            (13, PinCapability::eint(164)),        // EINT4/GPF4
            (15, PinCapability::eint(165)),        // EINT5/GPF5
            (16, PinCapability::pwm_timer(2, 1)),  // TOUT2/GPB2
            (18, PinCapability::eint(193)),        // EINT9/GPG1
            (22, PinCapability::pwm_timer(0, 0)),  // TOUT0/GPB0
            (24, PinCapability::gpio(333)),        // SS0/GPL13
            (26, PinCapability::pwm_timer(1, 0)),  // TOUT1/GPB1
            (27, PinCapability::gpio(39)),         // SDA1/GPB7
            (28, PinCapability::gpio(40)),         // SCL1/GPB8
            (29, PinCapability::eint(195)),        // EINT11/GPG3
            (31, PinCapability::eint(196)),        // EINT12/GPG4
            (32, PinCapability::eint(197)),        // EINT13/GPG5
            (33, PinCapability::eint(198)),        // EINT14/GPG6
            (35, PinCapability::eint(199)),        // EINT15/GPG7
            (36, PinCapability::eint(200)),        // EINT16/GPG8
            (37, PinCapability::eint(201)),        // EINT17/GPG9
            (38, PinCapability::eint(202)),        // EINT18/GPG10
            (40, PinCapability::eint(203)),        // EINT19/GPG11
        ]);

        Self {
            name: "nanopi".to_string(),
            pins,
            timers: Some(TimerBlock {
                base_clock_hz: 66_500_000, // PCLK
                dividers: vec![2, 4, 8, 16],
                counter_bits: 16,
                registers: TimerRegisterMap {
                    phys_base: 0x5100_0000,
                    window_len: 0x100,
                    tcfg0: 0x00,
                    tcfg1: 0x04,
                    tcon: 0x08,
                    count_base: 0x0C, // TCNTB0
                    count_stride: 0x0C,
                },
            }),
        }
    }
}

//! Period/duty to register-field conversion for timer-driven PWM.
//!
//! The timer tick is `base_clock / (prescaler + 1) / divider`; a period
//! spans `counter + 1` ticks (the counter register holds ticks minus one).
//! Requested nanosecond values rarely land exactly on a tick boundary, so
//! every conversion here reports how far off the achievable value is and
//! the search picks the combination with the smallest error.

use crate::board::TimerBlock;
use crate::error::{Error, Result};

const NS_PER_SEC: u128 = 1_000_000_000;

/// One concrete programming of a timer channel's clock path.
///
/// `divider_sel` indexes the board's divider table; `counter` is the raw
/// register value (ticks minus one).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerConfig {
    pub prescaler: u8,
    pub divider_sel: u8,
    pub counter: u16,
}

impl TimerConfig {
    /// Search every prescaler and divider combination for the one whose
    /// achievable period is closest to `period_ns`. Ties go to the finer
    /// tick, which leaves more duty-cycle resolution.
    ///
    /// Returns the winning configuration and the signed quantization
    /// difference (achievable minus requested) in nanoseconds.
    pub fn for_period(block: &TimerBlock, period_ns: u64) -> Result<(Self, i64)> {
        Self::search(block, 0, u8::MAX, period_ns)
    }

    /// Like [`Self::for_period`], but with the prescaler pinned. Used when
    /// the prescaler unit is shared with a sibling channel that is already
    /// claimed and must not be retimed.
    pub fn for_period_with_prescaler(
        block: &TimerBlock,
        prescaler: u8,
        period_ns: u64,
    ) -> Result<(Self, i64)> {
        Self::search(block, prescaler, prescaler, period_ns)
    }

    fn search(block: &TimerBlock, pre_min: u8, pre_max: u8, period_ns: u64) -> Result<(Self, i64)> {
        let (min_ns, max_ns) = period_range_ns(block, pre_min, pre_max);
        if period_ns < min_ns || period_ns > max_ns {
            return Err(Error::InvalidValue(format!(
                "period {period_ns}ns out of range: min {min_ns}ns max {max_ns}ns"
            )));
        }

        let base = u128::from(block.base_clock_hz);
        // Errors are compared scaled by the base clock so they stay exact
        // integers; the scale factor is common to every candidate.
        let want = u128::from(period_ns) * base;
        let max_ticks = u128::from(block.max_ticks());

        let mut best: Option<(Self, u128, u128)> = None;
        for (sel, &div) in block.dividers.iter().enumerate() {
            for pre in pre_min..=pre_max {
                // Tick length in base-clock cycles.
                let weight = u128::from(u32::from(pre) + 1) * u128::from(div);
                let den = weight * NS_PER_SEC;
                let ticks = (u128::from(period_ns) * base + den / 2) / den;
                if ticks < 1 || ticks > max_ticks {
                    continue;
                }
                let err = (ticks * den).abs_diff(want);
                let better = match &best {
                    None => true,
                    Some((_, best_err, best_weight)) => {
                        err < *best_err || (err == *best_err && weight < *best_weight)
                    }
                };
                if better {
                    best = Some((
                        Self {
                            prescaler: pre,
                            divider_sel: sel as u8,
                            counter: (ticks - 1) as u16,
                        },
                        err,
                        weight,
                    ));
                }
            }
        }

        // The range check above guarantees at least one candidate fits.
        let Some((config, ..)) = best else {
            return Err(Error::InvalidValue(format!(
                "period {period_ns}ns out of range: min {min_ns}ns max {max_ns}ns"
            )));
        };
        let actual = config.period_ns(block)?;
        Ok((config, actual as i64 - period_ns as i64))
    }

    /// Divider value selected from the board table.
    pub fn divider(&self, block: &TimerBlock) -> Result<u32> {
        block
            .dividers
            .get(usize::from(self.divider_sel))
            .copied()
            .ok_or(Error::InvalidConfiguration(
                "divider selector outside the board divider table",
            ))
    }

    /// Period this configuration realizes, rounded to nanoseconds.
    pub fn period_ns(&self, block: &TimerBlock) -> Result<u64> {
        self.ns_for(block, u64::from(self.counter) + 1)
    }

    /// Nearest whole number of ticks covering `ns` at this tick rate.
    pub fn ticks_for(&self, block: &TimerBlock, ns: u64) -> Result<u64> {
        let den = self.tick_weight(block)? * NS_PER_SEC;
        let num = u128::from(ns) * u128::from(block.base_clock_hz);
        Ok(((num + den / 2) / den) as u64)
    }

    /// Nanoseconds that `ticks` ticks span at this tick rate, rounded.
    pub fn ns_for(&self, block: &TimerBlock, ticks: u64) -> Result<u64> {
        let base = u128::from(block.base_clock_hz);
        let num = u128::from(ticks) * self.tick_weight(block)? * NS_PER_SEC;
        Ok(((num + base / 2) / base) as u64)
    }

    fn tick_weight(&self, block: &TimerBlock) -> Result<u128> {
        let div = self.divider(block)?;
        Ok(u128::from(u32::from(self.prescaler) + 1) * u128::from(div))
    }
}

/// Achievable period bounds over a prescaler range: one tick at the fastest
/// clock up to a full counter at the slowest. The minimum is rounded up and
/// the maximum down so that every value inside the bounds is realizable.
fn period_range_ns(block: &TimerBlock, pre_min: u8, pre_max: u8) -> (u64, u64) {
    let base = u128::from(block.base_clock_hz);
    let div_min = u128::from(block.dividers.iter().copied().min().unwrap_or(1));
    let div_max = u128::from(block.dividers.iter().copied().max().unwrap_or(1));

    let fine = (u128::from(pre_min) + 1) * div_min * NS_PER_SEC;
    let coarse = (u128::from(pre_max) + 1) * div_max * NS_PER_SEC;

    let min_ns = fine.div_ceil(base) as u64;
    let max_ns = (u128::from(block.max_ticks()) * coarse / base) as u64;
    (min_ns, max_ns)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

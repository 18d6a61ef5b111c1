// IAMF-RS
// Copyright (c) 2024 The IAMF-RS Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `units` module provides definitions for common units.

/// A `TimeStamp` represents an instant in time since the start of a stream. One `TimeStamp`
/// "tick" is equivalent to the stream's `TimeBase` in seconds.
pub type TimeStamp = u64;

/// A `Duration` indicates a positive span of time.
pub type Duration = u64;

/// `Time` represents a duration of time in seconds, stored as an integer number of seconds plus
/// any remaining fraction of a second as a floating point value.
#[derive(Copy, Clone, Debug, Default, PartialEq, PartialOrd)]
pub struct Time {
    pub seconds: u64,
    pub frac: f64,
}

impl Time {
    pub fn new(seconds: u64, frac: f64) -> Self {
        Time { seconds, frac }
    }
}

/// A `TimeBase` is the length in seconds of one tick of a `TimeStamp` or `Duration`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct TimeBase {
    /// The numerator.
    pub numer: u32,
    /// The denominator.
    pub denom: u32,
}

impl Default for TimeBase {
    fn default() -> Self {
        // Audio sample clock of the default IAMF output rate.
        TimeBase { numer: 1, denom: 48_000 }
    }
}

impl TimeBase {
    /// Creates a new `TimeBase`. Returns `None` if either the numerator or denominator is 0.
    pub fn new(numer: u32, denom: u32) -> Option<Self> {
        if numer == 0 || denom == 0 {
            return None;
        }

        Some(TimeBase { numer, denom })
    }

    /// Calculates a `Time` using the `TimeBase` and the provided `TimeStamp`.
    pub fn calc_time(&self, ts: TimeStamp) -> Time {
        // Up-to 96-bits are required (32-bit timebase numerator * 64-bit timestamp).
        let dividend = u128::from(ts) * u128::from(self.numer);

        let quotient = dividend / u128::from(self.denom);

        // The remainder is always smaller than the 32-bit denominator.
        let rem = (dividend - (quotient * u128::from(self.denom))) as u32;

        Time::new(quotient as u64, f64::from(rem) / f64::from(self.denom))
    }

    /// Calculates the `Duration`, in ticks of the `TimeBase`, of `samples` audio samples at
    /// `sample_rate` Hz. The result is truncated.
    pub fn calc_duration(&self, samples: u64, sample_rate: u32) -> Duration {
        if sample_rate == 0 {
            return 0;
        }

        let numer = u128::from(samples) * u128::from(self.denom);
        let denom = u128::from(sample_rate) * u128::from(self.numer);

        (numer / denom) as Duration
    }
}

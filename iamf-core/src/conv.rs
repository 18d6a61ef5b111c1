// IAMF-RS
// Copyright (c) 2024 The IAMF-RS Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `conv` module provides conversion of the decoder's floating point output to the sample
//! formats it can be delivered in.

use std::fmt;
use std::str::FromStr;

/// The format of the interleaved output samples. All integer formats are little-endian.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum SampleFormat {
    /// Signed 16-bit integer.
    #[default]
    S16,
    /// Signed 24-bit integer packed into 3 bytes.
    S24,
    /// Signed 32-bit integer.
    S32,
    /// 32-bit floating point.
    F32,
}

impl SampleFormat {
    /// Get the sample format for a bit depth. A bit depth of 32 selects the integer format.
    pub fn from_bit_depth(bits: u32) -> Option<Self> {
        match bits {
            16 => Some(SampleFormat::S16),
            24 => Some(SampleFormat::S24),
            32 => Some(SampleFormat::S32),
            _ => None,
        }
    }

    /// Gets the number of bytes used by one sample.
    pub fn bytes_per_sample(&self) -> usize {
        match self {
            SampleFormat::S16 => 2,
            SampleFormat::S24 => 3,
            SampleFormat::S32 | SampleFormat::F32 => 4,
        }
    }

    /// Gets the number of significant bits of one sample.
    pub fn bits_per_sample(&self) -> u32 {
        match self {
            SampleFormat::S16 => 16,
            SampleFormat::S24 => 24,
            SampleFormat::S32 | SampleFormat::F32 => 32,
        }
    }
}

impl fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SampleFormat::S16 => "s16",
            SampleFormat::S24 => "s24",
            SampleFormat::S32 => "s32",
            SampleFormat::F32 => "f32",
        };
        f.write_str(name)
    }
}

impl FromStr for SampleFormat {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "16" | "s16" => Ok(SampleFormat::S16),
            "24" | "s24" => Ok(SampleFormat::S24),
            "32" | "s32" => Ok(SampleFormat::S32),
            "f32" | "float" => Ok(SampleFormat::F32),
            _ => Err("unknown sample format"),
        }
    }
}

/// `FromSample` implements a conversion from a floating point sample to `Self`.
///
/// The conversion is lossy and clamps to the range of `Self`. No dithering is applied.
pub trait FromSample<F> {
    fn from_sample(val: F) -> Self;
}

// As of Rust 1.45 a `<float> as <integer>` cast saturates, so only the input range is clamped.

macro_rules! impl_convert {
    ($from:ty, $to:ty, $sample:ident, $func:expr) => {
        impl FromSample<$from> for $to {
            #[inline(always)]
            fn from_sample($sample: $from) -> Self {
                $func
            }
        }
    };
}

#[inline(always)]
fn clamped(s: f32) -> f32 {
    s.clamp(-1.0, 1.0)
}

impl_convert!(f32, i16, s, (clamped(s) * 32_768.0) as i16);
impl_convert!(f32, i32, s, (f64::from(clamped(s)) * 2_147_483_648.0) as i32);
impl_convert!(f32, f32, s, s);

/// Convert a sample to a signed 24-bit integer held in an `i32`.
#[inline(always)]
fn to_i24(s: f32) -> i32 {
    ((clamped(s) * 8_388_608.0) as i32).clamp(-8_388_608, 8_388_607)
}

/// Appends interleaved samples to `out` in the given sample format.
pub fn write_samples(samples: &[f32], format: SampleFormat, out: &mut Vec<u8>) {
    out.reserve(samples.len() * format.bytes_per_sample());

    match format {
        SampleFormat::S16 => {
            for &s in samples {
                out.extend_from_slice(&i16::from_sample(s).to_le_bytes());
            }
        }
        SampleFormat::S24 => {
            for &s in samples {
                out.extend_from_slice(&to_i24(s).to_le_bytes()[..3]);
            }
        }
        SampleFormat::S32 => {
            for &s in samples {
                out.extend_from_slice(&i32::from_sample(s).to_le_bytes());
            }
        }
        SampleFormat::F32 => {
            for &s in samples {
                out.extend_from_slice(&f32::from_sample(s).to_le_bytes());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_i16_from_sample() {
        assert_eq!(i16::from_sample(1.0f32), i16::MAX);
        assert_eq!(i16::from_sample(-1.0f32), i16::MIN);
        assert_eq!(i16::from_sample(0.0f32), 0);
        assert_eq!(i16::from_sample(0.5f32), 16384);
        assert_eq!(i16::from_sample(4.0f32), i16::MAX);
    }

    #[test]
    fn verify_write_samples() {
        let mut out = Vec::new();
        write_samples(&[0.5, -1.0], SampleFormat::S24, &mut out);
        assert_eq!(out, vec![0x00, 0x00, 0x40, 0x00, 0x00, 0x80]);

        out.clear();
        write_samples(&[1.0], SampleFormat::S16, &mut out);
        assert_eq!(out, vec![0xff, 0x7f]);

        out.clear();
        write_samples(&[0.25], SampleFormat::F32, &mut out);
        assert_eq!(out, 0.25f32.to_le_bytes().to_vec());
    }

    #[test]
    fn verify_sample_format_from_str() {
        assert_eq!("24".parse::<SampleFormat>(), Ok(SampleFormat::S24));
        assert_eq!("f32".parse::<SampleFormat>(), Ok(SampleFormat::F32));
        assert!("8".parse::<SampleFormat>().is_err());
    }
}

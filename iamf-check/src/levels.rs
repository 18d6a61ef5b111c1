// IAMF-RS
// Copyright (c) 2024 The IAMF-RS Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Per-channel level statistics of decoded output.

use iamf::core::conv::SampleFormat;
use serde::Serialize;

/// Converts interleaved output PCM back to floating point samples.
pub fn read_samples(data: &[u8], format: SampleFormat, out: &mut Vec<f32>) {
    out.clear();

    match format {
        SampleFormat::S16 => out.extend(
            data.chunks_exact(2).map(|b| f32::from(i16::from_le_bytes([b[0], b[1]])) / 32_768.0),
        ),
        SampleFormat::S24 => out.extend(data.chunks_exact(3).map(|b| {
            // Sign extend through the top byte of an i32.
            let s = i32::from_le_bytes([0, b[0], b[1], b[2]]) >> 8;
            s as f32 / 8_388_608.0
        })),
        SampleFormat::S32 => out.extend(data.chunks_exact(4).map(|b| {
            let s = i32::from_le_bytes([b[0], b[1], b[2], b[3]]);
            (f64::from(s) / 2_147_483_648.0) as f32
        })),
        SampleFormat::F32 => {
            out.extend(data.chunks_exact(4).map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]])))
        }
    }
}

fn to_dbfs(level: f64) -> f64 {
    if level > 0.0 {
        20.0 * level.log10()
    }
    else {
        f64::NEG_INFINITY
    }
}

/// The levels of one output channel.
#[derive(Clone, Debug, Serialize)]
pub struct ChannelLevels {
    pub peak_dbfs: f64,
    pub rms_dbfs: f64,
    pub clipped: u64,
}

/// Accumulates level statistics over interleaved frames.
#[derive(Default)]
pub struct LevelMeter {
    peak: Vec<f32>,
    sum_sq: Vec<f64>,
    clipped: Vec<u64>,
    samples: u64,
}

impl LevelMeter {
    pub fn new(channels: usize) -> Self {
        LevelMeter {
            peak: vec![0.0; channels],
            sum_sq: vec![0.0; channels],
            clipped: vec![0; channels],
            samples: 0,
        }
    }

    pub fn channels(&self) -> usize {
        self.peak.len()
    }

    /// Gets the number of samples per channel measured.
    pub fn samples(&self) -> u64 {
        self.samples
    }

    pub fn update(&mut self, interleaved: &[f32]) {
        let channels = self.peak.len();

        if channels == 0 {
            return;
        }

        for frame in interleaved.chunks_exact(channels) {
            for (ch, &s) in frame.iter().enumerate() {
                let abs = s.abs();

                self.peak[ch] = self.peak[ch].max(abs);
                self.sum_sq[ch] += f64::from(s) * f64::from(s);

                if abs >= 1.0 {
                    self.clipped[ch] += 1;
                }
            }
            self.samples += 1;
        }
    }

    pub fn levels(&self) -> Vec<ChannelLevels> {
        (0..self.peak.len())
            .map(|ch| {
                let rms = if self.samples > 0 {
                    (self.sum_sq[ch] / self.samples as f64).sqrt()
                }
                else {
                    0.0
                };

                ChannelLevels {
                    peak_dbfs: to_dbfs(f64::from(self.peak[ch])),
                    rms_dbfs: to_dbfs(rms),
                    clipped: self.clipped[ch],
                }
            })
            .collect()
    }
}

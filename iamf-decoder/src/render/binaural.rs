// IAMF-RS
// Copyright (c) 2024 The IAMF-RS Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Binaural rendering of loudspeaker layouts by virtual loudspeakers.
//!
//! Each loudspeaker is panned to the two ears with a constant-power law and the signal to the far
//! ear is delayed by the interaural time difference of a spherical head.

use std::f32::consts::FRAC_PI_4;

use iamf_core::audio::LoudspeakerLayout;

use crate::frame::Frame;

const HEAD_RADIUS: f32 = 0.0875;
const SPEED_OF_SOUND: f32 = 343.0;

/// The gain of an LFE channel to each ear.
const LFE_GAIN: f32 = 0.5;

/// Gets the lateral position of a direction in the range [-1, 1]. Positive is to the left.
fn lateral(azimuth: f32, elevation: f32) -> f32 {
    (azimuth.to_radians().sin() * elevation.to_radians().cos()).clamp(-1.0, 1.0)
}

/// Gets the interaural time difference, in samples, of a source at the given direction.
pub fn itd_samples(azimuth: f32, elevation: f32, sample_rate: u32) -> usize {
    let theta = lateral(azimuth, elevation).abs().asin();
    let itd = (HEAD_RADIUS / SPEED_OF_SOUND) * (theta + theta.sin());
    (itd * sample_rate as f32).round() as usize
}

#[derive(Copy, Clone, Debug)]
struct VirtualSpeaker {
    input: usize,
    near_gain: f32,
    far_gain: f32,
    /// The far ear is the left ear.
    far_is_left: bool,
    delay: usize,
}

/// Renders a loudspeaker layout to two ears.
#[derive(Clone, Debug)]
pub struct BinauralRenderer {
    speakers: Vec<VirtualSpeaker>,
    lfe: Vec<usize>,
    /// The most recent input samples of each channel, oldest first.
    history: Vec<Vec<f32>>,
    max_delay: usize,
}

impl BinauralRenderer {
    pub fn new(layout: LoudspeakerLayout, sample_rate: u32) -> Self {
        let mut speakers = Vec::new();
        let mut lfe = Vec::new();

        for (input, ch) in layout.channels().iter().enumerate() {
            if ch.is_lfe() {
                lfe.push(input);
                continue;
            }

            let (azimuth, elevation) = ch.direction();
            let pan = lateral(azimuth, elevation);

            let left_gain = ((1.0 - pan) * FRAC_PI_4).cos();
            let right_gain = ((1.0 + pan) * FRAC_PI_4).cos();

            let far_is_left = pan < 0.0;

            let (near_gain, far_gain) =
                if far_is_left { (right_gain, left_gain) } else { (left_gain, right_gain) };

            speakers.push(VirtualSpeaker {
                input,
                near_gain,
                far_gain,
                far_is_left,
                delay: itd_samples(azimuth, elevation, sample_rate),
            });
        }

        let max_delay = speakers.iter().map(|s| s.delay).max().unwrap_or(0);

        BinauralRenderer {
            speakers,
            lfe,
            history: vec![vec![0.0; max_delay]; layout.channel_count()],
            max_delay,
        }
    }

    /// Clears the delay lines.
    pub fn reset(&mut self) {
        self.history.iter_mut().for_each(|h| h.fill(0.0));
    }

    pub fn render(&mut self, input: &Frame, output: &mut Frame) {
        let n = input.samples();

        output.set_samples(n);
        output.clear();

        for speaker in self.speakers.iter() {
            let src = input.plane(speaker.input);
            let history = &self.history[speaker.input];

            let (near, far) = if speaker.far_is_left { (1, 0) } else { (0, 1) };

            for (d, s) in output.plane_mut(near).iter_mut().zip(src) {
                *d += speaker.near_gain * s;
            }

            let delay = speaker.delay;
            let far_out = output.plane_mut(far);

            for (i, d) in far_out.iter_mut().enumerate() {
                let s = if i >= delay {
                    src[i - delay]
                }
                else {
                    history[self.max_delay - delay + i]
                };
                *d += speaker.far_gain * s;
            }
        }

        for &ch in self.lfe.iter() {
            for ear in 0..2 {
                for (d, s) in output.plane_mut(ear).iter_mut().zip(input.plane(ch)) {
                    *d += LFE_GAIN * s;
                }
            }
        }

        // Keep the tail of each channel for the delay lines of the next frame.
        if self.max_delay > 0 {
            for (ch, history) in self.history.iter_mut().enumerate() {
                let src = input.plane(ch);

                if n >= self.max_delay {
                    history.copy_from_slice(&src[n - self.max_delay..]);
                }
                else {
                    history.rotate_left(n);
                    history[self.max_delay - n..].copy_from_slice(src);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_itd() {
        assert_eq!(itd_samples(0.0, 0.0, 48_000), 0);
        // About 0.66 ms at 90 degrees.
        let itd = itd_samples(90.0, 0.0, 48_000);
        assert!(itd >= 30 && itd <= 33);
        assert_eq!(itd_samples(90.0, 0.0, 48_000), itd_samples(-90.0, 0.0, 48_000));
    }

    #[test]
    fn verify_center_is_balanced() {
        let mut renderer = BinauralRenderer::new(LoudspeakerLayout::Mono, 48_000);

        let mut input = Frame::new(1, 4);
        input.set_samples(4);
        input.plane_mut(0).fill(1.0);

        let mut output = Frame::new(2, 4);
        renderer.render(&input, &mut output);

        assert_eq!(output.plane(0), output.plane(1));
        assert!((output.plane(0)[0] - FRAC_PI_4.cos()).abs() < 1e-6);
    }

    #[test]
    fn verify_far_ear_is_delayed_across_frames() {
        let mut renderer = BinauralRenderer::new(LoudspeakerLayout::Surround5_1, 48_000);

        // An impulse on the left surround loudspeaker in the last sample of the first frame.
        let ls5 = 4;
        let delay = itd_samples(110.0, 0.0, 48_000);

        let mut input = Frame::new(6, 16);
        input.set_samples(16);
        input.plane_mut(ls5)[15] = 1.0;

        let mut output = Frame::new(2, 16);
        renderer.render(&input, &mut output);

        // The near (left) ear hears it immediately, the far (right) ear not at all.
        assert!(output.plane(0)[15] > 0.9);
        assert!(output.plane(1).iter().all(|&s| s == 0.0));

        let mut next = Frame::new(6, 48);
        next.set_samples(48);
        renderer.render(&next, &mut output);

        let right = output.plane(1);
        let peak = right.iter().position(|&s| s != 0.0).unwrap();
        assert_eq!(peak, delay - 1);
        assert!(output.plane(0).iter().all(|&s| s == 0.0));
    }

    #[test]
    fn verify_reset_clears_delay_lines() {
        let mut renderer = BinauralRenderer::new(LoudspeakerLayout::Stereo, 48_000);

        let mut input = Frame::new(2, 8);
        input.set_samples(8);
        input.plane_mut(0).fill(1.0);

        let mut output = Frame::new(2, 8);
        renderer.render(&input, &mut output);
        renderer.reset();

        input.clear();
        renderer.render(&input, &mut output);
        assert!(output.planes().all(|p| p.iter().all(|&s| s == 0.0)));
    }
}

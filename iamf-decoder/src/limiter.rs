// IAMF-RS
// Copyright (c) 2024 The IAMF-RS Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! A peak limiter for the presentation output.

use iamf_format_obu::param::db_to_linear;

use crate::frame::Frame;
use crate::options::LimiterOptions;

/// Gets the one-pole smoothing coefficient for a time constant in milliseconds.
fn time_coeff(ms: f32, sample_rate: u32) -> f32 {
    if ms <= 0.0 || sample_rate == 0 {
        return 0.0;
    }
    (-1.0 / (ms / 1000.0 * sample_rate as f32)).exp()
}

/// A peak limiter with an attack and release envelope. All channels share one gain.
///
/// The gain starts falling up to one attack time before a peak within the frame. The gain
/// applied to a sample never exceeds `threshold / peak`, so the output never exceeds the
/// threshold.
#[derive(Clone, Debug)]
pub struct Limiter {
    enabled: bool,
    threshold: f32,
    attack: f32,
    release: f32,
    lookahead: usize,
    gain: f32,
    targets: Vec<f32>,
}

impl Limiter {
    pub fn new(options: &LimiterOptions, sample_rate: u32) -> Self {
        let lookahead = (options.attack_ms.max(0.0) / 1000.0 * sample_rate as f32) as usize;

        Limiter {
            enabled: options.enabled,
            threshold: db_to_linear(options.threshold_db),
            attack: time_coeff(options.attack_ms, sample_rate),
            release: time_coeff(options.release_ms, sample_rate),
            lookahead,
            gain: 1.0,
            targets: Vec::new(),
        }
    }

    /// Gets the current gain.
    pub fn gain(&self) -> f32 {
        self.gain
    }

    pub fn reset(&mut self) {
        self.gain = 1.0;
    }

    pub fn process(&mut self, frame: &mut Frame) {
        if !self.enabled {
            return;
        }

        let n = frame.samples();

        // The peak of each sample across all channels.
        self.targets.clear();
        self.targets.resize(n, 0.0);

        for plane in frame.planes() {
            for (peak, s) in self.targets.iter_mut().zip(plane) {
                *peak = peak.max(s.abs());
            }
        }

        // The largest gain each sample may have.
        for t in self.targets.iter_mut() {
            *t = if *t > self.threshold { self.threshold / *t } else { 1.0 };
        }

        for i in 0..n {
            let end = (i + self.lookahead + 1).min(n);
            let ahead = self.targets[i..end].iter().fold(1.0f32, |a, &b| a.min(b));

            let coeff = if ahead < self.gain { self.attack } else { self.release };
            self.gain += (1.0 - coeff) * (ahead - self.gain);

            let gain = self.gain.min(self.targets[i]);

            for ch in 0..frame.channel_count() {
                let s = &mut frame.plane_mut(ch)[i];
                *s = (*s * gain).clamp(-self.threshold, self.threshold);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn constant(value: f32, samples: usize) -> Frame {
        let mut frame = Frame::new(2, samples);
        frame.set_samples(samples);
        frame.plane_mut(0).fill(value);
        frame.plane_mut(1).fill(-value);
        frame
    }

    #[test]
    fn verify_quiet_signal_is_untouched() {
        let mut limiter = Limiter::new(&LimiterOptions::default(), 48_000);

        let mut frame = constant(0.25, 480);
        limiter.process(&mut frame);

        assert!(frame.plane(0).iter().all(|&s| s == 0.25));
    }

    #[test]
    fn verify_loud_signal_is_limited() {
        let options = LimiterOptions { threshold_db: -6.0, ..Default::default() };
        let mut limiter = Limiter::new(&options, 48_000);

        let mut frame = constant(1.0, 4800);
        limiter.process(&mut frame);

        let threshold = db_to_linear(-6.0);
        let last = frame.plane(0)[4799];
        assert!((last - threshold).abs() < 1e-3);
        assert!((frame.plane(1)[4799] + threshold).abs() < 1e-3);
    }

    #[test]
    fn verify_instant_attack() {
        let options = LimiterOptions { attack_ms: 0.0, threshold_db: -6.0, ..Default::default() };
        let mut limiter = Limiter::new(&options, 48_000);

        let mut frame = constant(1.0, 4);
        limiter.process(&mut frame);

        assert!((frame.plane(0)[0] - db_to_linear(-6.0)).abs() < 1e-6);
    }

    #[test]
    fn verify_step_never_exceeds_threshold() {
        let mut limiter = Limiter::new(&LimiterOptions::default(), 48_000);
        let threshold = db_to_linear(-1.0);

        // Silence, then a full scale step half way through the frame.
        let mut frame = constant(0.0, 960);
        frame.plane_mut(0)[480..].fill(1.0);
        frame.plane_mut(1)[480..].fill(-1.0);
        limiter.process(&mut frame);

        for plane in frame.planes() {
            assert!(plane.iter().all(|s| s.abs() <= threshold));
        }

        // The gain falls ahead of the step.
        assert!(limiter.gain() < 1.0);
        assert!(frame.plane(0)[479] == 0.0);

        // A step at the start of the next frame.
        limiter.reset();
        let mut frame = constant(1.0, 16);
        limiter.process(&mut frame);
        assert!(frame.plane(0).iter().all(|s| s.abs() <= threshold));
        assert!(frame.plane(1).iter().all(|s| s.abs() <= threshold));
    }

    #[test]
    fn verify_reset() {
        let mut limiter = Limiter::new(&LimiterOptions::default(), 48_000);

        let mut frame = constant(1.0, 480);
        limiter.process(&mut frame);
        assert!(limiter.gain() < 1.0);

        limiter.reset();
        assert_eq!(limiter.gain(), 1.0);
    }

    #[test]
    fn verify_disabled() {
        let options = LimiterOptions { enabled: false, ..Default::default() };
        let mut limiter = Limiter::new(&options, 48_000);

        let mut frame = constant(1.0, 16);
        limiter.process(&mut frame);
        assert!(frame.plane(0).iter().all(|&s| s == 1.0));
    }
}

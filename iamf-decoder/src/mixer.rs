// IAMF-RS
// Copyright (c) 2024 The IAMF-RS Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Mixing of rendered element frames into the presentation output.

use iamf_core::errors::{topology_error, Result};

use crate::frame::Frame;
use crate::parameters::MixGainUnit;

/// Sums the rendered frames of every element of a presentation.
pub struct Mixer {
    out: Frame,
}

impl Mixer {
    pub fn new(channels: usize, capacity: usize) -> Self {
        Mixer { out: Frame::new(channels, capacity) }
    }

    /// Mix `inputs`, each with its element mix gain, then apply the output mix gain.
    ///
    /// Every input must have the channel count of the mixer and the same length and trim
    /// window as the first input.
    pub fn mix(
        &mut self,
        inputs: &[(&Frame, &MixGainUnit)],
        output_gain: &MixGainUnit,
    ) -> Result<&Frame> {
        let first = match inputs.first() {
            Some((first, _)) => *first,
            None => return topology_error("mixer: no input frames"),
        };

        for (frame, _) in inputs.iter() {
            if frame.samples() != first.samples()
                || frame.strim != first.strim
                || frame.etrim != first.etrim
            {
                return topology_error("mixer: frames are not aligned");
            }

            if frame.channel_count() != self.out.channel_count() {
                return topology_error("mixer: channel count mismatch");
            }
        }

        self.out.set_samples(first.samples());
        self.out.copy_timing(first);
        self.out.clear();

        for (frame, gain) in inputs.iter() {
            for ch in 0..frame.channel_count() {
                let src = frame.plane(ch);
                let dst = self.out.plane_mut(ch);

                match gain {
                    MixGainUnit::Constant(g) => {
                        for (d, s) in dst.iter_mut().zip(src) {
                            *d += g * s;
                        }
                    }
                    MixGainUnit::PerSample(_) => {
                        for (i, (d, s)) in dst.iter_mut().zip(src).enumerate() {
                            *d += gain.gain(i) * s;
                        }
                    }
                }
            }
        }

        if !output_gain.is_unity() {
            for ch in 0..self.out.channel_count() {
                for (i, d) in self.out.plane_mut(ch).iter_mut().enumerate() {
                    *d *= output_gain.gain(i);
                }
            }
        }

        Ok(&self.out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use rand::rngs::SmallRng;
    use rand::{Rng, SeedableRng};

    fn noise(rng: &mut SmallRng, channels: usize, samples: usize) -> Frame {
        let mut frame = Frame::new(channels, samples);
        frame.set_samples(samples);
        for ch in 0..channels {
            frame.plane_mut(ch).iter_mut().for_each(|s| *s = rng.random_range(-0.5..0.5));
        }
        frame
    }

    #[test]
    fn verify_mix_is_order_independent() {
        let mut rng = SmallRng::seed_from_u64(0x1a3f);

        let a = noise(&mut rng, 2, 256);
        let b = noise(&mut rng, 2, 256);
        let c = noise(&mut rng, 2, 256);

        let ga = MixGainUnit::Constant(0.5);
        let gb = MixGainUnit::PerSample((0..256).map(|i| i as f32 / 256.0).collect());
        let gc = MixGainUnit::default();
        let out_gain = MixGainUnit::Constant(0.8);

        let mut mixer = Mixer::new(2, 256);
        let forward: Vec<Vec<f32>> = mixer
            .mix(&[(&a, &ga), (&b, &gb), (&c, &gc)], &out_gain)
            .unwrap()
            .planes()
            .map(|p| p.to_vec())
            .collect();

        let reverse = mixer.mix(&[(&c, &gc), (&b, &gb), (&a, &ga)], &out_gain).unwrap();

        for (fwd, rev) in forward.iter().zip(reverse.planes()) {
            for (x, y) in fwd.iter().zip(rev) {
                assert!((x - y).abs() < 1e-5);
            }
        }
    }

    #[test]
    fn verify_gains_are_applied() {
        let mut a = Frame::new(1, 2);
        a.set_samples(2);
        a.plane_mut(0).copy_from_slice(&[1.0, -1.0]);

        let mut mixer = Mixer::new(1, 2);
        let out = mixer
            .mix(&[(&a, &MixGainUnit::PerSample(vec![0.5, 0.25]))], &MixGainUnit::Constant(2.0))
            .unwrap();

        assert_eq!(out.plane(0), &[1.0, -0.5]);
    }

    #[test]
    fn verify_misaligned_frames() {
        let a = {
            let mut f = Frame::new(2, 8);
            f.set_samples(8);
            f
        };
        let mut b = a.clone();
        b.strim = 2;

        let gain = MixGainUnit::default();
        let mut mixer = Mixer::new(2, 8);

        let err = mixer.mix(&[(&a, &gain), (&b, &gain)], &gain).err().unwrap();
        assert!(matches!(err, iamf_core::errors::Error::TopologyError(_)));

        let mut c = a.clone();
        c.set_samples(4);
        assert!(mixer.mix(&[(&a, &gain), (&c, &gain)], &gain).is_err());
    }
}

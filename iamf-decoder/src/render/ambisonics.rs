// IAMF-RS
// Copyright (c) 2024 The IAMF-RS Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Scene-based audio rendering to loudspeakers.

use iamf_core::audio::{Channel, LoudspeakerLayout};

use crate::frame::Frame;
use crate::stream::MAX_AMBISONICS_ORDER;

/// The number of ambisonics components that are rendered.
pub const MAX_COMPONENTS: usize = (MAX_AMBISONICS_ORDER + 1) * (MAX_AMBISONICS_ORDER + 1);

/// Evaluates the real SN3D-normalized spherical harmonics, in ACN order, for a direction given
/// as an azimuth and elevation in degrees.
pub fn spherical_harmonics(azimuth: f32, elevation: f32) -> [f32; MAX_COMPONENTS] {
    let (sin_az, cos_az) = azimuth.to_radians().sin_cos();
    let (sin_el, cos_el) = elevation.to_radians().sin_cos();

    let x = cos_el * cos_az;
    let y = cos_el * sin_az;
    let z = sin_el;

    [
        // Order 0.
        1.0,
        // Order 1.
        y,
        z,
        x,
        // Order 2.
        1.732051 * x * y,
        1.732051 * y * z,
        0.5 * (3.0 * z * z - 1.0),
        1.732051 * x * z,
        0.866025 * (x * x - y * y),
        // Order 3.
        0.790569 * y * (3.0 * x * x - y * y),
        3.872983 * x * y * z,
        0.612372 * y * (5.0 * z * z - 1.0),
        0.5 * z * (5.0 * z * z - 3.0),
        0.612372 * x * (5.0 * z * z - 1.0),
        1.936492 * z * (x * x - y * y),
        0.790569 * x * (x * x - 3.0 * y * y),
    ]
}

/// A sampling decoder from ambisonics to a loudspeaker layout.
#[derive(Clone, Debug)]
pub struct AmbisonicsRenderer {
    /// Decoding gains per output channel. LFE channels have no row.
    rows: Vec<(usize, [f32; MAX_COMPONENTS])>,
    components: usize,
}

impl AmbisonicsRenderer {
    pub fn new(channels: usize, layout: LoudspeakerLayout) -> Self {
        let speakers: Vec<(usize, Channel)> =
            layout.channels().iter().copied().enumerate().filter(|(_, ch)| !ch.is_lfe()).collect();

        let norm = 1.0 / (speakers.len().max(1) as f32).sqrt();

        let rows = speakers
            .into_iter()
            .map(|(idx, ch)| {
                let (azimuth, elevation) = ch.direction();
                let mut row = spherical_harmonics(azimuth, elevation);
                row.iter_mut().for_each(|g| *g *= norm);
                (idx, row)
            })
            .collect();

        AmbisonicsRenderer { rows, components: channels.min(MAX_COMPONENTS) }
    }

    pub fn render(&self, input: &Frame, output: &mut Frame) {
        output.set_samples(input.samples());
        output.clear();

        let components = self.components.min(input.channel_count());

        for (out_ch, row) in self.rows.iter() {
            let out = output.plane_mut(*out_ch);

            for (acn, &gain) in row.iter().enumerate().take(components) {
                if gain == 0.0 {
                    continue;
                }

                for (d, s) in out.iter_mut().zip(input.plane(acn)) {
                    *d += gain * s;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_spherical_harmonics() {
        // Front.
        let sh = spherical_harmonics(0.0, 0.0);
        assert_eq!(sh[0], 1.0);
        assert!(sh[1].abs() < 1e-6);
        assert!(sh[2].abs() < 1e-6);
        assert!((sh[3] - 1.0).abs() < 1e-6);

        // Left.
        let sh = spherical_harmonics(90.0, 0.0);
        assert!((sh[1] - 1.0).abs() < 1e-6);
        assert!(sh[3].abs() < 1e-6);

        // Zenith.
        let sh = spherical_harmonics(0.0, 90.0);
        assert!((sh[2] - 1.0).abs() < 1e-6);
        assert!((sh[6] - 1.0).abs() < 1e-5);
        assert!((sh[12] - 1.0).abs() < 1e-5);
    }

    #[test]
    fn verify_omni_decode() {
        let renderer = AmbisonicsRenderer::new(4, LoudspeakerLayout::Surround5_1);

        let mut input = Frame::new(4, 8);
        input.set_samples(8);
        input.plane_mut(0).fill(1.0);

        let mut output = Frame::new(6, 8);
        renderer.render(&input, &mut output);

        let expected = 1.0 / 5f32.sqrt();

        for ch in 0..6 {
            let value = output.plane(ch)[0];
            if ch == 3 {
                assert_eq!(value, 0.0);
            }
            else {
                assert!((value - expected).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn verify_directional_decode() {
        let renderer = AmbisonicsRenderer::new(16, LoudspeakerLayout::Stereo);

        // A third-order source encoded at the left loudspeaker.
        let sh = spherical_harmonics(30.0, 0.0);

        let mut input = Frame::new(16, 1);
        input.set_samples(1);
        for (acn, gain) in sh.iter().enumerate() {
            input.plane_mut(acn)[0] = *gain;
        }

        let mut output = Frame::new(2, 1);
        renderer.render(&input, &mut output);

        assert!(output.plane(0)[0] > output.plane(1)[0]);
    }
}

// IAMF-RS
// Copyright (c) 2024 The IAMF-RS Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Rendering of decoded streams to the output layout.

mod ambisonics;
mod binaural;
mod matrix;

pub use ambisonics::{spherical_harmonics, AmbisonicsRenderer};
pub use binaural::{itd_samples, BinauralRenderer};
pub use matrix::MixMatrix;

use iamf_core::audio::LoudspeakerLayout;

use crate::frame::Frame;
use crate::stream::{RenderTarget, StreamLayout};

/// The loudspeaker layout scene-based audio is decoded to before binaural rendering.
const VIRTUAL_LAYOUT: LoudspeakerLayout = LoudspeakerLayout::Surround7_1_4;

enum Kernel {
    /// The stream is already in the output layout.
    Identity,
    Matrix(MixMatrix),
    Ambisonics(AmbisonicsRenderer),
    Binaural(BinauralRenderer),
    AmbisonicsBinaural { decoder: AmbisonicsRenderer, scratch: Frame, binaural: BinauralRenderer },
}

/// Renders the frames of one stream to its render target.
pub struct StreamRenderer {
    kernel: Kernel,
    channels: usize,
}

impl StreamRenderer {
    pub fn new(
        layout: StreamLayout,
        target: RenderTarget,
        sample_rate: u32,
        frame_size: usize,
    ) -> Self {
        let kernel = match (layout, target) {
            (StreamLayout::Channel(src), RenderTarget::Loudspeakers(dst)) => {
                if src.channels() == dst.channels() {
                    Kernel::Identity
                }
                else {
                    Kernel::Matrix(MixMatrix::new(src, dst))
                }
            }
            (StreamLayout::Channel(src), RenderTarget::Binaural) => {
                Kernel::Binaural(BinauralRenderer::new(src, sample_rate))
            }
            (StreamLayout::Ambisonics { channels }, RenderTarget::Loudspeakers(dst)) => {
                Kernel::Ambisonics(AmbisonicsRenderer::new(channels, dst))
            }
            (StreamLayout::Ambisonics { channels }, RenderTarget::Binaural) => {
                Kernel::AmbisonicsBinaural {
                    decoder: AmbisonicsRenderer::new(channels, VIRTUAL_LAYOUT),
                    scratch: Frame::new(VIRTUAL_LAYOUT.channel_count(), frame_size),
                    binaural: BinauralRenderer::new(VIRTUAL_LAYOUT, sample_rate),
                }
            }
        };

        StreamRenderer { kernel, channels: target.channel_count() }
    }

    /// Gets the number of rendered channels.
    pub fn channel_count(&self) -> usize {
        self.channels
    }

    /// Render a frame. The output frame takes the timing of the input.
    pub fn render(&mut self, input: &Frame, output: &mut Frame) {
        match &mut self.kernel {
            Kernel::Identity => {
                output.set_samples(input.samples());
                for (ch, src) in input.planes().enumerate().take(output.channel_count()) {
                    output.plane_mut(ch).copy_from_slice(src);
                }
            }
            Kernel::Matrix(matrix) => matrix.apply(input, output),
            Kernel::Ambisonics(decoder) => decoder.render(input, output),
            Kernel::Binaural(binaural) => binaural.render(input, output),
            Kernel::AmbisonicsBinaural { decoder, scratch, binaural } => {
                decoder.render(input, scratch);
                binaural.render(scratch, output);
            }
        }

        output.copy_timing(input);
    }

    /// Clears the state carried between frames.
    pub fn reset(&mut self) {
        match &mut self.kernel {
            Kernel::Binaural(binaural) => binaural.reset(),
            Kernel::AmbisonicsBinaural { binaural, .. } => binaural.reset(),
            _ => (),
        }
    }
}

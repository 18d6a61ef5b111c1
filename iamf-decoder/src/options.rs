// IAMF-RS
// Copyright (c) 2024 The IAMF-RS Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use iamf_core::audio::OutputLayout;
use iamf_core::conv::SampleFormat;
use iamf_format_obu::HeadphonesRenderingMode;

/// `LimiterOptions` configures the peak limiter at the end of the output chain.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct LimiterOptions {
    /// Enable the limiter. Default: `true`.
    pub enabled: bool,
    /// The limiting threshold in dBFS. Default: `-1.0`.
    pub threshold_db: f32,
    /// Attack time in milliseconds. Default: `1.0`.
    pub attack_ms: f32,
    /// Release time in milliseconds. Default: `200.0`.
    pub release_ms: f32,
}

impl Default for LimiterOptions {
    fn default() -> Self {
        LimiterOptions { enabled: true, threshold_db: -1.0, attack_ms: 1.0, release_ms: 200.0 }
    }
}

/// `DecoderOptions` is a common set of options that the decoder uses to build a presentation.
///
/// All options take effect on the next (re)configuration of the decoder.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct DecoderOptions {
    /// The layout to render the output to. Default: stereo (sound system A).
    pub output_layout: OutputLayout,
    /// The mix presentation to decode. Default: the first mix presentation of the stream.
    pub mix_presentation_id: Option<u64>,
    /// The output sample rate in Hz. Default: the sample rate of the coded audio.
    pub sampling_rate: Option<u32>,
    /// Normalize the program loudness to this target in LKFS. Default: disabled.
    pub normalization_loudness: Option<f32>,
    /// The sample format of the output PCM. Default: signed 16-bit.
    pub bit_depth: SampleFormat,
    /// Override the headphones rendering mode of every audio element when rendering for
    /// headphones. Default: use the mode signalled by the mix presentation.
    pub headphones_rendering_mode: Option<HeadphonesRenderingMode>,
    /// Peak limiter options.
    pub limiter: LimiterOptions,
}
